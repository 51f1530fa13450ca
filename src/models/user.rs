use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgConnection};

/// An account that owns api tokens and meetings.
/// Maps to the `users` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub max_concurrent_bots: i32,
    pub data: Value,
}

/// New User for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    /// Defaults to 1 when not given.
    pub max_concurrent_bots: Option<i32>,
    pub data: Option<Value>,
}

impl NewUser {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            image_url: None,
            max_concurrent_bots: None,
            data: None,
        }
    }
}

const USER_COLUMNS: &str = "id, email, name, image_url, created_at, max_concurrent_bots, data";

impl User {
    /// Insert a user. Fails with a unique violation when the email is taken.
    pub async fn create(conn: &mut PgConnection, new_user: NewUser) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, name, image_url, max_concurrent_bots, data)
            VALUES ($1, $2, $3, COALESCE($4, 1), COALESCE($5, '{{}}'::jsonb))
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new_user.email)
        .bind(new_user.name)
        .bind(new_user.image_url)
        .bind(new_user.max_concurrent_bots)
        .bind(new_user.data)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: i32) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    pub async fn find_by_email(
        conn: &mut PgConnection,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(conn)
            .await
    }

    /// List users, oldest first
    pub async fn list(conn: &mut PgConnection, limit: i64) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(conn)
        .await
    }

    /// Merge `patch` into the user's `data` document.
    pub async fn merge_data(
        conn: &mut PgConnection,
        id: i32,
        patch: &Value,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET data = data || $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(patch)
        .fetch_one(conn)
        .await
    }
}
