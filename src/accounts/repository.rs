use async_trait::async_trait;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use crate::db::models::{Privacy, User};
use crate::db::RepositoryError;
use crate::state::DbPool;

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub description: String,
    pub privacy: Privacy,
    pub avatar: String,
}

/// Partial profile update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub description: Option<String>,
    pub privacy: Option<Privacy>,
    pub avatar: Option<String>,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Fails with `Conflict` when the username is taken
    async fn create(&self, account: &NewAccount) -> Result<User, RepositoryError>;

    /// Fails with `InvalidCredentials` for an unknown user or a wrong password
    async fn verify(&self, username: &str, password: &str) -> Result<User, RepositoryError>;

    async fn get(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    async fn update(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, RepositoryError>;

    /// Case-insensitive substring match on username
    async fn search(&self, query: &str, exclude: Option<&str>) -> Result<Vec<User>, RepositoryError>;

    /// Usernames of public accounts, minus `exclude`
    async fn public_usernames(&self, exclude: &[String]) -> Result<Vec<String>, RepositoryError>;
}

pub struct SqliteAccountRepository {
    pool: DbPool,
    bcrypt_cost: u32,
}

impl SqliteAccountRepository {
    pub fn new(pool: DbPool, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }
}

const USER_COLUMNS: &str = "username, description, privacy, avatar";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get(0)?,
        description: row.get(1)?,
        privacy: row.get(2)?,
        avatar: row.get(3)?,
    })
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn create(&self, account: &NewAccount) -> Result<User, RepositoryError> {
        // bcrypt is deliberately slow; keep it off the async workers
        let password = account.password.clone();
        let cost = self.bcrypt_cost;
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;

        let conn = self.pool.get()?;

        let inserted = conn.execute(
            "INSERT INTO users (username, password_hash, description, privacy, avatar)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(username) DO NOTHING",
            params![
                account.username,
                password_hash,
                account.description,
                account.privacy,
                account.avatar
            ],
        )?;

        if inserted == 0 {
            return Err(RepositoryError::Conflict("Username already exists".into()));
        }

        tracing::info!("Registered user {}", account.username);

        Ok(User {
            username: account.username.clone(),
            description: account.description.clone(),
            privacy: account.privacy,
            avatar: account.avatar.clone(),
        })
    }

    async fn verify(&self, username: &str, password: &str) -> Result<User, RepositoryError> {
        let found = {
            let conn = self.pool.get()?;
            conn.query_row(
                &format!("SELECT {}, password_hash FROM users WHERE username = ?1", USER_COLUMNS),
                params![username],
                |row| Ok((user_from_row(row)?, row.get::<_, String>(4)?)),
            )
            .optional()?
        };

        let (user, password_hash) = found.ok_or(RepositoryError::InvalidCredentials)?;

        // A malformed stored hash counts as a mismatch
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || {
            bcrypt::verify(password, &password_hash).unwrap_or(false)
        })
        .await?;
        if !matches {
            return Err(RepositoryError::InvalidCredentials);
        }

        Ok(user)
    }

    async fn get(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn update(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;

        let matched = conn.execute(
            "UPDATE users SET
                description = COALESCE(?2, description),
                privacy = COALESCE(?3, privacy),
                avatar = COALESCE(?4, avatar)
             WHERE username = ?1",
            params![username, update.description, update.privacy, update.avatar],
        )?;

        if matched == 0 {
            return Ok(None);
        }

        let user = conn.query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
            params![username],
            user_from_row,
        )?;
        Ok(Some(user))
    }

    async fn search(&self, query: &str, exclude: Option<&str>) -> Result<Vec<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users
             WHERE instr(unicode_lower(username), unicode_lower(?1)) > 0
               AND (?2 IS NULL OR username != ?2)
             ORDER BY username",
            USER_COLUMNS
        ))?;

        let users = stmt
            .query_map(params![query, exclude], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    async fn public_usernames(&self, exclude: &[String]) -> Result<Vec<String>, RepositoryError> {
        let conn = self.pool.get()?;

        let sql = if exclude.is_empty() {
            "SELECT username FROM users WHERE privacy = 'public' ORDER BY username".to_string()
        } else {
            let placeholders = vec!["?"; exclude.len()].join(", ");
            format!(
                "SELECT username FROM users WHERE privacy = 'public' AND username NOT IN ({})
                 ORDER BY username",
                placeholders
            )
        };

        let mut stmt = conn.prepare(&sql)?;
        let usernames = stmt
            .query_map(params_from_iter(exclude.iter()), |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(usernames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn create_test_repo() -> (SqliteAccountRepository, tempfile::TempDir) {
        let (pool, temp_dir) = db::test_pool();
        // Lowest cost bcrypt accepts, tests only
        (SqliteAccountRepository::new(pool, 4), temp_dir)
    }

    fn account(username: &str, privacy: Privacy) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            password: "hunter2".to_string(),
            description: String::new(),
            privacy,
            avatar: String::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let (repo, _temp) = create_test_repo();
        repo.create(&account("alice", Privacy::Public)).await.unwrap();

        let result = repo.create(&account("alice", Privacy::Private)).await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn verify_checks_password_against_stored_hash() {
        let (repo, _temp) = create_test_repo();
        repo.create(&account("alice", Privacy::Private)).await.unwrap();

        let user = repo.verify("alice", "hunter2").await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.privacy, Privacy::Private);

        assert!(matches!(
            repo.verify("alice", "wrong").await,
            Err(RepositoryError::InvalidCredentials)
        ));
        assert!(matches!(
            repo.verify("nobody", "hunter2").await,
            Err(RepositoryError::InvalidCredentials)
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hashing_does_not_block_the_runtime() {
        let (repo, _temp) = create_test_repo();

        // On a single-threaded runtime a ticker only advances while bcrypt
        // runs if hashing happens off the runtime thread
        let ticks = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = ticks.clone();
        let ticker = tokio::spawn(async move {
            loop {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
        });

        let slow = SqliteAccountRepository::new(repo.pool.clone(), 10);
        slow.create(&account("alice", Privacy::Public)).await.unwrap();
        slow.verify("alice", "hunter2").await.unwrap();
        ticker.abort();

        assert!(ticks.load(std::sync::atomic::Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn password_is_not_stored_in_plaintext() {
        let (repo, _temp) = create_test_repo();
        repo.create(&account("alice", Privacy::Public)).await.unwrap();

        let conn = repo.pool.get().unwrap();
        let stored: String = conn
            .query_row(
                "SELECT password_hash FROM users WHERE username = 'alice'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_ne!(stored, "hunter2");
        assert!(stored.starts_with("$2"));
    }

    #[tokio::test]
    async fn update_changes_only_provided_fields() {
        let (repo, _temp) = create_test_repo();
        let mut new = account("alice", Privacy::Public);
        new.description = "jazz head".into();
        repo.create(&new).await.unwrap();

        let updated = repo
            .update(
                "alice",
                &ProfileUpdate {
                    privacy: Some(Privacy::Private),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.privacy, Privacy::Private);
        assert_eq!(updated.description, "jazz head");

        let missing = repo.update("nobody", &ProfileUpdate::default()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_excludes_current_user() {
        let (repo, _temp) = create_test_repo();
        for name in ["DJ_Alice", "alicia", "bob"] {
            repo.create(&account(name, Privacy::Public)).await.unwrap();
        }

        let found = repo.search("ALI", None).await.unwrap();
        let names: Vec<_> = found.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["DJ_Alice", "alicia"]);

        let found = repo.search("ali", Some("alicia")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "DJ_Alice");

        repo.create(&account("ÉLODIE", Privacy::Public)).await.unwrap();
        let found = repo.search("élo", None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "ÉLODIE");
    }

    #[tokio::test]
    async fn public_usernames_skips_private_and_excluded() {
        let (repo, _temp) = create_test_repo();
        repo.create(&account("alice", Privacy::Public)).await.unwrap();
        repo.create(&account("bob", Privacy::Public)).await.unwrap();
        repo.create(&account("carol", Privacy::Private)).await.unwrap();

        assert_eq!(repo.public_usernames(&[]).await.unwrap(), vec!["alice", "bob"]);
        assert_eq!(
            repo.public_usernames(&["alice".to_string()]).await.unwrap(),
            vec!["bob"]
        );
    }
}
