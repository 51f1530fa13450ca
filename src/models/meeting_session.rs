use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

/// One bot connection to a meeting. A meeting may be joined several times;
/// `session_uid` is unique within its meeting.
/// Maps to the `meeting_sessions` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MeetingSession {
    pub id: i32,
    pub meeting_id: i32,
    pub session_uid: String,
    pub session_start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMeetingSession {
    pub meeting_id: i32,
    pub session_uid: String,
    /// Server time when `None`.
    pub session_start_time: Option<DateTime<Utc>>,
}

impl MeetingSession {
    /// Insert a session. A repeated `(meeting_id, session_uid)` pair violates
    /// `_meeting_session_uc`.
    pub async fn create(
        conn: &mut PgConnection,
        new_session: NewMeetingSession,
    ) -> Result<MeetingSession, sqlx::Error> {
        sqlx::query_as::<_, MeetingSession>(
            r#"
            INSERT INTO meeting_sessions (meeting_id, session_uid, session_start_time)
            VALUES ($1, $2, COALESCE($3, now()))
            RETURNING id, meeting_id, session_uid, session_start_time
            "#,
        )
        .bind(new_session.meeting_id)
        .bind(new_session.session_uid)
        .bind(new_session.session_start_time)
        .fetch_one(conn)
        .await
    }

    pub async fn find(
        conn: &mut PgConnection,
        meeting_id: i32,
        session_uid: &str,
    ) -> Result<Option<MeetingSession>, sqlx::Error> {
        sqlx::query_as::<_, MeetingSession>(
            r#"
            SELECT id, meeting_id, session_uid, session_start_time
            FROM meeting_sessions
            WHERE meeting_id = $1 AND session_uid = $2
            "#,
        )
        .bind(meeting_id)
        .bind(session_uid)
        .fetch_optional(conn)
        .await
    }

    pub async fn list_for_meeting(
        conn: &mut PgConnection,
        meeting_id: i32,
    ) -> Result<Vec<MeetingSession>, sqlx::Error> {
        sqlx::query_as::<_, MeetingSession>(
            r#"
            SELECT id, meeting_id, session_uid, session_start_time
            FROM meeting_sessions
            WHERE meeting_id = $1
            ORDER BY session_start_time, id
            "#,
        )
        .bind(meeting_id)
        .fetch_all(conn)
        .await
    }
}
