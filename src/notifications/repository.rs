use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::db::models::{Notification, NotificationKind};
use crate::db::{self, RepositoryError};
use crate::state::DbPool;

/// Matches notifications on any combination of fields; `None` matches all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationFilter {
    pub kind: Option<NotificationKind>,
    pub from_user: Option<String>,
    pub to_user: Option<String>,
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn append(
        &self,
        kind: NotificationKind,
        from_user: &str,
        to_user: &str,
    ) -> Result<i64, RepositoryError>;

    /// Newest first
    async fn list_for(&self, username: &str) -> Result<Vec<Notification>, RepositoryError>;

    /// Returns the number of notifications removed
    async fn delete_matching(&self, filter: &NotificationFilter) -> Result<usize, RepositoryError>;
}

pub struct SqliteNotificationRepository {
    pool: DbPool,
}

impl SqliteNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Connection-level helpers so the follow graph can write notifications inside
/// its own transaction.
pub(crate) fn insert(
    conn: &Connection,
    kind: NotificationKind,
    from_user: &str,
    to_user: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO notifications (kind, from_user, to_user, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![kind, from_user, to_user, db::timestamp()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn delete_matching(
    conn: &Connection,
    filter: &NotificationFilter,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM notifications
         WHERE (?1 IS NULL OR kind = ?1)
           AND (?2 IS NULL OR from_user = ?2)
           AND (?3 IS NULL OR to_user = ?3)",
        params![filter.kind, filter.from_user, filter.to_user],
    )
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    async fn append(
        &self,
        kind: NotificationKind,
        from_user: &str,
        to_user: &str,
    ) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(insert(&conn, kind, from_user, to_user)?)
    }

    async fn list_for(&self, username: &str) -> Result<Vec<Notification>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, from_user, to_user, created_at FROM notifications
             WHERE to_user = ?1
             ORDER BY created_at DESC, id DESC",
        )?;

        let notifications = stmt
            .query_map(params![username], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    from_user: row.get(2)?,
                    to_user: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(notifications)
    }

    async fn delete_matching(&self, filter: &NotificationFilter) -> Result<usize, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(delete_matching(&conn, filter)?)
    }
}
