use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgConnection};

/// A bot's attendance of one meeting on a conferencing platform.
/// Maps to the `meetings` table
///
/// `start_time <= end_time` is not enforced by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Meeting {
    pub id: i32,
    pub user_id: i32,
    pub platform: String,
    /// Meeting id native to the platform
    pub platform_specific_id: Option<String>,
    pub status: String,
    pub bot_container_id: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub data: Value,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMeeting {
    pub user_id: i32,
    pub platform: String,
    pub platform_specific_id: Option<String>,
    pub status: String,
    pub bot_container_id: Option<String>,
    pub data: Option<Value>,
}

const MEETING_COLUMNS: &str = "id, user_id, platform, platform_specific_id, status, \
    bot_container_id, start_time, end_time, data, created_at, updated_at";

impl Meeting {
    /// Insert a meeting. The owning user must exist.
    pub async fn create(conn: &mut PgConnection, new_meeting: NewMeeting) -> Result<Meeting, sqlx::Error> {
        sqlx::query_as::<_, Meeting>(&format!(
            r#"
            INSERT INTO meetings (user_id, platform, platform_specific_id, status, bot_container_id, data)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, '{{}}'::jsonb))
            RETURNING {MEETING_COLUMNS}
            "#
        ))
        .bind(new_meeting.user_id)
        .bind(new_meeting.platform)
        .bind(new_meeting.platform_specific_id)
        .bind(new_meeting.status)
        .bind(new_meeting.bot_container_id)
        .bind(new_meeting.data)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: i32) -> Result<Option<Meeting>, sqlx::Error> {
        sqlx::query_as::<_, Meeting>(&format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE id = $1"))
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Most recent meeting a user has on a platform for a native meeting id
    pub async fn find_latest_by_platform_id(
        conn: &mut PgConnection,
        user_id: i32,
        platform: &str,
        platform_specific_id: &str,
    ) -> Result<Option<Meeting>, sqlx::Error> {
        sqlx::query_as::<_, Meeting>(&format!(
            r#"
            SELECT {MEETING_COLUMNS}
            FROM meetings
            WHERE user_id = $1 AND platform = $2 AND platform_specific_id = $3
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(platform)
        .bind(platform_specific_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn list_for_user(
        conn: &mut PgConnection,
        user_id: i32,
    ) -> Result<Vec<Meeting>, sqlx::Error> {
        sqlx::query_as::<_, Meeting>(&format!(
            "SELECT {MEETING_COLUMNS} FROM meetings WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(conn)
        .await
    }

    /// Meetings whose `data` document contains `fragment` (served by the GIN
    /// index).
    pub async fn find_by_data(
        conn: &mut PgConnection,
        fragment: &Value,
    ) -> Result<Vec<Meeting>, sqlx::Error> {
        sqlx::query_as::<_, Meeting>(&format!(
            "SELECT {MEETING_COLUMNS} FROM meetings WHERE data @> $1 ORDER BY id"
        ))
        .bind(fragment)
        .fetch_all(conn)
        .await
    }

    /// Move a meeting to `status`, stamping `updated_at`.
    pub async fn update_status(
        conn: &mut PgConnection,
        id: i32,
        status: &str,
    ) -> Result<Meeting, sqlx::Error> {
        sqlx::query_as::<_, Meeting>(&format!(
            r#"
            UPDATE meetings
            SET status = $2, updated_at = now()
            WHERE id = $1
            RETURNING {MEETING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_one(conn)
        .await
    }

    /// Record when the bot joined and left.
    pub async fn set_times(
        conn: &mut PgConnection,
        id: i32,
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
    ) -> Result<Meeting, sqlx::Error> {
        sqlx::query_as::<_, Meeting>(&format!(
            r#"
            UPDATE meetings
            SET start_time = COALESCE($2, start_time),
                end_time = COALESCE($3, end_time),
                updated_at = now()
            WHERE id = $1
            RETURNING {MEETING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(start_time)
        .bind(end_time)
        .fetch_one(conn)
        .await
    }
}
