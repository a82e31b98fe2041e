pub mod repository;

pub use repository::{NotificationFilter, NotificationRepository, SqliteNotificationRepository};
