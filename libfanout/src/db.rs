//! Database operations for Fanout
//!
//! The store owns every persisted post and audit entry. Each operation is a
//! single SQLite statement (or a read followed by a guarded write), so updates to
//! one post are atomic and `mark_published` can only ever report one
//! transition.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, warn};

use crate::error::{DbError, FanoutError, Result};
use crate::types::{
    actions, normalize_platforms, validate_content, LogEntry, LogFilter, NewPost, Post,
    PostFilter, PostUpdate, Schedule,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        // Forward slashes keep the URL valid on Windows too
        let db_url = format!("sqlite://{}", expanded_path.replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(DbError::SqlxError)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// A private in-memory database, mostly useful in tests.
    ///
    /// Limited to one connection: every SQLite `:memory:` connection is its own
    /// database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DbError::SqlxError)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;
        Ok(Self { pool })
    }

    /// Create a new post and return its id
    pub async fn create_post(&self, new_post: NewPost) -> Result<String> {
        let post = new_post.into_post(chrono::Utc::now().timestamp())?;
        let platforms = encode_platforms(&post.platforms)?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, title, content, platforms, scheduled_at, published, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(platforms)
        .bind(post.scheduled_at.map(|s| s.to_storage()))
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        debug!("Created post {}", post.id);
        self.append_log(
            actions::POST_CREATED,
            Some(&post.id),
            json!({
                "platforms": post.platforms,
                "scheduled_at": post.scheduled_at,
            }),
        )
        .await;

        Ok(post.id)
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, content, platforms, scheduled_at, published, created_at, updated_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(row_to_post).transpose()
    }

    /// List posts ordered by schedule, unscheduled first.
    ///
    /// Ties (including all unscheduled posts) keep insertion order.
    pub async fn list_posts(&self, filter: PostFilter) -> Result<Vec<Post>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, title, content, platforms, scheduled_at, published, created_at, updated_at FROM posts",
        );
        if let Some(published) = filter.published {
            query.push(" WHERE published = ").push_bind(published as i64);
        }
        query.push(" ORDER BY scheduled_at IS NOT NULL, scheduled_at ASC, rowid ASC");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    /// Apply a whitelisted partial update.
    ///
    /// Returns `false` for an empty update or an unknown post. Editing a
    /// published post is an invariant violation.
    pub async fn update_post(&self, post_id: &str, update: &PostUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let Some(existing) = self.get_post(post_id).await? else {
            return Ok(false);
        };
        if existing.published {
            return Err(FanoutError::InvariantViolation(format!(
                "Post {} is published and can no longer be edited",
                post_id
            )));
        }

        if let Some(content) = &update.content {
            validate_content(content)?;
        }
        let platforms = update
            .platforms
            .as_ref()
            .map(|p| normalize_platforms(p).and_then(|p| encode_platforms(&p)))
            .transpose()?;

        let now = chrono::Utc::now().timestamp();
        let mut query = QueryBuilder::<Sqlite>::new("UPDATE posts SET ");
        let mut fields = query.separated(", ");
        if let Some(title) = &update.title {
            fields.push("title = ").push_bind_unseparated(title.clone());
        }
        if let Some(content) = &update.content {
            fields.push("content = ").push_bind_unseparated(content.clone());
        }
        if let Some(platforms) = platforms {
            fields.push("platforms = ").push_bind_unseparated(platforms);
        }
        if let Some(schedule) = &update.scheduled_at {
            fields
                .push("scheduled_at = ")
                .push_bind_unseparated(schedule.map(|s| s.to_storage()));
        }
        fields.push("updated_at = ").push_bind_unseparated(now);
        query
            .push(" WHERE id = ")
            .push_bind(post_id)
            .push(" AND published = 0");

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            // Deleted or published between the read and the write
            return Ok(false);
        }

        self.append_log(
            actions::POST_UPDATED,
            Some(post_id),
            json!({ "fields": update.field_names() }),
        )
        .await;

        Ok(true)
    }

    /// Flip `published` to true.
    ///
    /// Returns `true` only for the call that performed the transition;
    /// `updated_at` is refreshed either way. Unknown ids return `false`.
    pub async fn mark_published(&self, post_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let transitioned = sqlx::query(
            r#"
            UPDATE posts SET published = 1, updated_at = ? WHERE id = ? AND published = 0
            "#,
        )
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?
        .rows_affected()
            == 1;

        if !transitioned {
            sqlx::query("UPDATE posts SET updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(post_id)
                .execute(&self.pool)
                .await
                .map_err(DbError::SqlxError)?;
        }

        Ok(transitioned)
    }

    /// Delete a post. The audit trail is kept.
    pub async fn delete_post(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.append_log(actions::POST_DELETED, Some(post_id), json!({}))
                .await;
        }
        Ok(deleted)
    }

    /// Append an audit entry.
    ///
    /// Best effort: a failed write is logged and swallowed so it can never undo
    /// the mutation it describes.
    pub async fn append_log(&self, action: &str, post_id: Option<&str>, details: Value) {
        if let Err(e) = self.try_append_log(action, post_id, &details).await {
            warn!("Failed to append '{}' to action log: {}", action, e);
        }
    }

    async fn try_append_log(
        &self,
        action: &str,
        post_id: Option<&str>,
        details: &Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO action_log (action, post_id, details, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(action)
        .bind(post_id)
        .bind(details.to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Read audit entries in append order
    pub async fn list_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, action, post_id, details, timestamp FROM action_log WHERE 1=1",
        );
        if let Some(action) = &filter.action {
            query.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(post_id) = &filter.post_id {
            query.push(" AND post_id = ").push_bind(post_id.clone());
        }
        query.push(" ORDER BY id ASC");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| -> Result<LogEntry> {
                let details: String = r.get("details");
                Ok(LogEntry {
                    id: r.get("id"),
                    action: r.get("action"),
                    post_id: r.get("post_id"),
                    details: serde_json::from_str(&details)
                        .map_err(|e| DbError::Corrupt(format!("log details: {}", e)))?,
                    timestamp: r.get("timestamp"),
                })
            })
            .collect()
    }
}

fn encode_platforms(platforms: &[String]) -> Result<String> {
    serde_json::to_string(platforms)
        .map_err(|e| DbError::Corrupt(format!("platforms: {}", e)).into())
}

fn row_to_post(r: &SqliteRow) -> Result<Post> {
    let id: String = r.get("id");
    let platforms: String = r.get("platforms");
    let platforms: Vec<String> = serde_json::from_str(&platforms)
        .map_err(|e| DbError::Corrupt(format!("platforms of post {}: {}", id, e)))?;
    let scheduled_at = r
        .get::<Option<String>, _>("scheduled_at")
        .map(|s| {
            Schedule::from_storage(&s)
                .map_err(|e| DbError::Corrupt(format!("schedule of post {}: {}", id, e)))
        })
        .transpose()?;

    Ok(Post {
        id,
        title: r.get("title"),
        content: r.get("content"),
        platforms,
        scheduled_at,
        published: r.get::<i64, _>("published") != 0,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}
