pub mod repository;

pub use repository::{NewPost, PostRepository, SqlitePostRepository};
