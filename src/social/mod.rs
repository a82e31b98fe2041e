pub mod domain;
pub mod repository;

pub use domain::{Effect, FollowEdge, FollowError, FollowEvent, FollowState, Transition, Username};
pub use repository::{SocialGraphRepository, SqliteSocialGraphRepository};
