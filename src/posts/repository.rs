use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::db::models::{Comment, Post};
use crate::db::{self, RepositoryError};
use crate::state::DbPool;

#[derive(Debug, Clone)]
pub struct NewPost {
    pub username: String,
    pub item_title: String,
    pub artist_name: String,
    pub review: String,
    pub rating: u8,
    pub item_cover: String,
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &NewPost) -> Result<Post, RepositoryError>;

    async fn get(&self, id: &str) -> Result<Option<Post>, RepositoryError>;

    /// Fails with `NotFound` when nothing was deleted
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    async fn list_by_author(&self, username: &str) -> Result<Vec<Post>, RepositoryError>;

    async fn list_by_authors(&self, usernames: &[String]) -> Result<Vec<Post>, RepositoryError>;

    /// Case-insensitive substring match on title, artist or author
    async fn search(&self, query: &str, exclude: Option<&str>) -> Result<Vec<Post>, RepositoryError>;

    /// Idempotent add (`liked = true`) or remove of a like; returns the likes after the write
    async fn set_like(
        &self,
        id: &str,
        username: &str,
        liked: bool,
    ) -> Result<Vec<String>, RepositoryError>;

    async fn append_comment(
        &self,
        id: &str,
        username: &str,
        text: &str,
    ) -> Result<Comment, RepositoryError>;
}

pub struct SqlitePostRepository {
    pool: DbPool,
}

impl SqlitePostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const POST_COLUMNS: &str =
    "id, username, item_title, artist_name, review, rating, item_cover, created_at";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        username: row.get(1)?,
        item_title: row.get(2)?,
        artist_name: row.get(3)?,
        review: row.get(4)?,
        rating: row.get(5)?,
        item_cover: row.get(6)?,
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: row.get(7)?,
    })
}

fn likes_for(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT username FROM post_likes WHERE post_id = ?1 ORDER BY created_at, username",
    )?;
    let likes = stmt
        .query_map(params![post_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(likes)
}

fn comments_for(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT username, text, created_at FROM post_comments WHERE post_id = ?1 ORDER BY id",
    )?;
    let comments = stmt
        .query_map(params![post_id], |row| {
            Ok(Comment {
                username: row.get(0)?,
                text: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

/// Run a post query and attach likes and comments to every row.
fn query_posts<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(sql)?;
    let mut posts = stmt
        .query_map(params, post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for post in &mut posts {
        post.likes = likes_for(conn, &post.id)?;
        post.comments = comments_for(conn, &post.id)?;
    }
    Ok(posts)
}

fn post_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn create(&self, post: &NewPost) -> Result<Post, RepositoryError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let created_at = db::timestamp();

        conn.execute(
            "INSERT INTO posts (id, username, item_title, artist_name, review, rating, item_cover, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                post.username,
                post.item_title,
                post.artist_name,
                post.review,
                post.rating,
                post.item_cover,
                created_at
            ],
        )?;

        Ok(Post {
            id,
            username: post.username.clone(),
            item_title: post.item_title.clone(),
            artist_name: post.artist_name.clone(),
            review: post.review.clone(),
            rating: post.rating,
            item_cover: post.item_cover.clone(),
            likes: Vec::new(),
            comments: Vec::new(),
            created_at,
        })
    }

    async fn get(&self, id: &str) -> Result<Option<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
                params![id],
                post_from_row,
            )
            .optional()?;

        match post {
            Some(mut post) => {
                post.likes = likes_for(&conn, &post.id)?;
                post.comments = comments_for(&conn, &post.id)?;
                Ok(Some(post))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;

        if rows == 0 {
            return Err(RepositoryError::NotFound("Post not found".into()));
        }
        Ok(())
    }

    async fn list_by_author(&self, username: &str) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(query_posts(
            &conn,
            &format!(
                "SELECT {} FROM posts WHERE username = ?1 ORDER BY created_at DESC, id DESC",
                POST_COLUMNS
            ),
            params![username],
        )?)
    }

    async fn list_by_authors(&self, usernames: &[String]) -> Result<Vec<Post>, RepositoryError> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.pool.get()?;
        let placeholders = vec!["?"; usernames.len()].join(", ");
        Ok(query_posts(
            &conn,
            &format!(
                "SELECT {} FROM posts WHERE username IN ({}) ORDER BY created_at DESC, id DESC",
                POST_COLUMNS, placeholders
            ),
            params_from_iter(usernames.iter()),
        )?)
    }

    async fn search(&self, query: &str, exclude: Option<&str>) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(query_posts(
            &conn,
            &format!(
                "SELECT {} FROM posts
                 WHERE (instr(unicode_lower(item_title), unicode_lower(?1)) > 0
                     OR instr(unicode_lower(artist_name), unicode_lower(?1)) > 0
                     OR instr(unicode_lower(username), unicode_lower(?1)) > 0)
                   AND (?2 IS NULL OR username != ?2)
                 ORDER BY created_at DESC, id DESC",
                POST_COLUMNS
            ),
            params![query, exclude],
        )?)
    }

    async fn set_like(
        &self,
        id: &str,
        username: &str,
        liked: bool,
    ) -> Result<Vec<String>, RepositoryError> {
        let conn = self.pool.get()?;
        if !post_exists(&conn, id)? {
            return Err(RepositoryError::NotFound("Post not found".into()));
        }

        if liked {
            conn.execute(
                "INSERT OR IGNORE INTO post_likes (post_id, username) VALUES (?1, ?2)",
                params![id, username],
            )?;
        } else {
            conn.execute(
                "DELETE FROM post_likes WHERE post_id = ?1 AND username = ?2",
                params![id, username],
            )?;
        }

        Ok(likes_for(&conn, id)?)
    }

    async fn append_comment(
        &self,
        id: &str,
        username: &str,
        text: &str,
    ) -> Result<Comment, RepositoryError> {
        let conn = self.pool.get()?;
        if !post_exists(&conn, id)? {
            return Err(RepositoryError::NotFound("Post not found".into()));
        }

        let comment = Comment {
            username: username.to_string(),
            text: text.to_string(),
            created_at: db::timestamp(),
        };

        conn.execute(
            "INSERT INTO post_comments (post_id, username, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, comment.username, comment.text, comment.created_at],
        )?;

        Ok(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_repo() -> (SqlitePostRepository, tempfile::TempDir) {
        let (pool, temp_dir) = db::test_pool();
        {
            let conn = pool.get().unwrap();
            for name in ["alice", "bob", "carol"] {
                conn.execute(
                    "INSERT INTO users (username, password_hash) VALUES (?1, 'x')",
                    params![name],
                )
                .unwrap();
            }
        }
        (SqlitePostRepository::new(pool), temp_dir)
    }

    fn review(username: &str, title: &str, artist: &str) -> NewPost {
        NewPost {
            username: username.to_string(),
            item_title: title.to_string(),
            artist_name: artist.to_string(),
            review: "Great record".to_string(),
            rating: 4,
            item_cover: "data:image/png;base64,AAAA".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let (repo, _temp) = create_test_repo();
        let created = repo.create(&review("alice", "Kind of Blue", "Miles Davis")).await.unwrap();

        let loaded = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert!(loaded.likes.is_empty());
        assert!(loaded.comments.is_empty());

        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_missing_post_is_not_found() {
        let (repo, _temp) = create_test_repo();
        let created = repo.create(&review("alice", "Blue Train", "John Coltrane")).await.unwrap();

        repo.delete(&created.id).await.unwrap();
        assert!(matches!(
            repo.delete(&created.id).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn liking_twice_leaves_one_like() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create(&review("alice", "Ok Computer", "Radiohead")).await.unwrap();

        repo.set_like(&post.id, "bob", true).await.unwrap();
        let likes = repo.set_like(&post.id, "bob", true).await.unwrap();
        assert_eq!(likes, vec!["bob"]);

        repo.set_like(&post.id, "bob", false).await.unwrap();
        let likes = repo.set_like(&post.id, "bob", false).await.unwrap();
        assert!(likes.is_empty());

        assert!(matches!(
            repo.set_like("missing", "bob", true).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn comments_keep_insertion_order() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create(&review("alice", "Blonde", "Frank Ocean")).await.unwrap();

        repo.append_comment(&post.id, "bob", "first").await.unwrap();
        repo.append_comment(&post.id, "carol", "second").await.unwrap();

        let loaded = repo.get(&post.id).await.unwrap().unwrap();
        let texts: Vec<_> = loaded.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(loaded.comments[0].username, "bob");
    }

    #[tokio::test]
    async fn deleting_a_post_removes_its_likes_and_comments() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create(&review("alice", "Blonde", "Frank Ocean")).await.unwrap();
        repo.set_like(&post.id, "bob", true).await.unwrap();
        repo.append_comment(&post.id, "bob", "nice").await.unwrap();

        repo.delete(&post.id).await.unwrap();

        let conn = repo.pool.get().unwrap();
        let leftovers: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM post_likes) + (SELECT COUNT(*) FROM post_comments)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn search_matches_title_artist_and_author_case_insensitively() {
        let (repo, _temp) = create_test_repo();
        repo.create(&review("alice", "ABCdef", "Someone")).await.unwrap();
        repo.create(&review("bob", "Other", "The abc Band")).await.unwrap();
        repo.create(&review("carol", "Nothing", "Nobody")).await.unwrap();

        let found = repo.search("abc", None).await.unwrap();
        assert_eq!(found.len(), 2);

        let found = repo.search("ALICE", None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "alice");

        // The requesting user's own posts are excluded
        let found = repo.search("abc", Some("alice")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "bob");

        // Folding is not limited to ASCII
        repo.create(&review("carol", "Homogenic", "BJÖRK")).await.unwrap();
        let found = repo.search("björk", None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].item_title, "Homogenic");
    }

    #[tokio::test]
    async fn list_by_authors_is_newest_first() {
        let (repo, _temp) = create_test_repo();
        let first = repo.create(&review("alice", "One", "A")).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = repo.create(&review("bob", "Two", "B")).await.unwrap();
        repo.create(&review("carol", "Three", "C")).await.unwrap();

        let posts = repo
            .list_by_authors(&["alice".to_string(), "bob".to_string()])
            .await
            .unwrap();
        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);

        assert!(repo.list_by_authors(&[]).await.unwrap().is_empty());
        assert_eq!(repo.list_by_author("carol").await.unwrap().len(), 1);
    }
}
