pub mod repository;

pub use repository::{AccountRepository, NewAccount, ProfileUpdate, SqliteAccountRepository};
