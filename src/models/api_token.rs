use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

/// A bearer token issued to a user.
/// Maps to the `api_tokens` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ApiToken {
    pub id: i32,
    pub token: String,
    pub user_id: i32,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApiToken {
    pub token: String,
    pub user_id: i32,
}

impl ApiToken {
    /// Insert a token. Token values are globally unique and the owner must
    /// exist.
    pub async fn create(conn: &mut PgConnection, new_token: NewApiToken) -> Result<ApiToken, sqlx::Error> {
        sqlx::query_as::<_, ApiToken>(
            r#"
            INSERT INTO api_tokens (token, user_id)
            VALUES ($1, $2)
            RETURNING id, token, user_id, created_at
            "#,
        )
        .bind(new_token.token)
        .bind(new_token.user_id)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_token(
        conn: &mut PgConnection,
        token: &str,
    ) -> Result<Option<ApiToken>, sqlx::Error> {
        sqlx::query_as::<_, ApiToken>(
            "SELECT id, token, user_id, created_at FROM api_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(conn)
        .await
    }

    pub async fn list_for_user(
        conn: &mut PgConnection,
        user_id: i32,
    ) -> Result<Vec<ApiToken>, sqlx::Error> {
        sqlx::query_as::<_, ApiToken>(
            "SELECT id, token, user_id, created_at FROM api_tokens WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(conn)
        .await
    }

    /// Revoke a token. Returns whether a row was removed.
    pub async fn delete(conn: &mut PgConnection, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE token = $1")
            .bind(token)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
