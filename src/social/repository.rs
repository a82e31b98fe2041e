// Repository pattern - isolates all database side effects of the follow graph
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::NotificationKind;
use crate::db::{self, RepositoryError};
use crate::notifications::repository::{delete_matching, insert, NotificationFilter};
use crate::social::domain::{Effect, FollowEdge, FollowError, FollowEvent, FollowState, Transition};
use crate::state::DbPool;

#[async_trait]
pub trait SocialGraphRepository: Send + Sync {
    /// Current state of an edge, read from the target's followers record
    async fn state(&self, edge: &FollowEdge) -> Result<FollowState, RepositoryError>;

    /// Load, transition and persist an edge as one atomic unit
    async fn transition(
        &self,
        edge: &FollowEdge,
        event: FollowEvent,
    ) -> Result<Transition, RepositoryError>;

    async fn followers(&self, username: &str) -> Result<Vec<String>, RepositoryError>;

    async fn requests(&self, username: &str) -> Result<Vec<String>, RepositoryError>;

    async fn following(&self, username: &str) -> Result<Vec<String>, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteSocialGraphRepository {
    pool: DbPool,
}

impl SqliteSocialGraphRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn load_state(conn: &Connection, edge: &FollowEdge) -> Result<FollowState, rusqlite::Error> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM followers WHERE target = ?1 AND username = ?2",
            params![edge.target.as_str(), edge.follower.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(FollowState::from_record(
        status.as_deref() == Some("follower"),
        status.as_deref() == Some("request"),
    ))
}

fn apply_effect(conn: &Connection, edge: &FollowEdge, effect: Effect) -> Result<(), RepositoryError> {
    let follower = edge.follower.as_str();
    let target = edge.target.as_str();

    match effect {
        Effect::AddFollower => {
            conn.execute(
                "INSERT INTO followers (target, username, status) VALUES (?1, ?2, 'follower')
                 ON CONFLICT(target, username) DO UPDATE SET status = 'follower'",
                params![target, follower],
            )?;
        }
        Effect::RemoveFollower => {
            conn.execute(
                "DELETE FROM followers WHERE target = ?1 AND username = ?2 AND status = 'follower'",
                params![target, follower],
            )?;
        }
        Effect::AddRequest => {
            conn.execute(
                "INSERT INTO followers (target, username, status) VALUES (?1, ?2, 'request')
                 ON CONFLICT(target, username) DO NOTHING",
                params![target, follower],
            )?;
        }
        Effect::RemoveRequest => {
            conn.execute(
                "DELETE FROM followers WHERE target = ?1 AND username = ?2 AND status = 'request'",
                params![target, follower],
            )?;
        }
        Effect::AddFollowing => {
            conn.execute(
                "INSERT OR IGNORE INTO following (username, target) VALUES (?1, ?2)",
                params![follower, target],
            )?;
        }
        Effect::RemoveFollowing => {
            conn.execute(
                "DELETE FROM following WHERE username = ?1 AND target = ?2",
                params![follower, target],
            )?;
        }
        Effect::Notify(kind) => {
            let (from, to) = notification_direction(edge, kind);
            insert(conn, kind, from, to)?;
        }
        Effect::Retract(kind) => {
            let (from, to) = notification_direction(edge, kind);
            delete_matching(
                conn,
                &NotificationFilter {
                    kind: Some(kind),
                    from_user: Some(from.to_string()),
                    to_user: Some(to.to_string()),
                },
            )?;
        }
    }

    Ok(())
}

fn notification_direction(edge: &FollowEdge, kind: NotificationKind) -> (&str, &str) {
    match kind {
        NotificationKind::FollowRequest => (edge.follower.as_str(), edge.target.as_str()),
        NotificationKind::RequestAccepted => (edge.target.as_str(), edge.follower.as_str()),
    }
}

fn list_column(conn: &Connection, sql: &str, username: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![username], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

#[async_trait]
impl SocialGraphRepository for SqliteSocialGraphRepository {
    async fn state(&self, edge: &FollowEdge) -> Result<FollowState, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(load_state(&conn, edge)?)
    }

    async fn transition(
        &self,
        edge: &FollowEdge,
        event: FollowEvent,
    ) -> Result<Transition, RepositoryError> {
        if edge.is_self_loop() {
            return Err(FollowError::SelfFollow.into());
        }

        let conn = self.pool.get()?;

        // Both halves of the edge and the notification change together
        let transition = db::with_transaction(&conn, |tx| {
            let current = load_state(tx, edge)?;
            let transition = current.apply(event)?;
            for effect in &transition.effects {
                apply_effect(tx, edge, *effect)?;
            }
            Ok::<_, RepositoryError>(transition)
        })?;

        tracing::info!(
            "Follow {} on {}: {} -> {}",
            event.event_name(),
            edge,
            transition.from.state_name(),
            transition.to.state_name()
        );

        Ok(transition)
    }

    async fn followers(&self, username: &str) -> Result<Vec<String>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(list_column(
            &conn,
            "SELECT username FROM followers WHERE target = ?1 AND status = 'follower'
             ORDER BY created_at, username",
            username,
        )?)
    }

    async fn requests(&self, username: &str) -> Result<Vec<String>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(list_column(
            &conn,
            "SELECT username FROM followers WHERE target = ?1 AND status = 'request'
             ORDER BY created_at, username",
            username,
        )?)
    }

    async fn following(&self, username: &str) -> Result<Vec<String>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(list_column(
            &conn,
            "SELECT target FROM following WHERE username = ?1 ORDER BY created_at, target",
            username,
        )?)
    }
}
