use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

/// One transcribed utterance.
/// Maps to the `transcriptions` table
///
/// `start_time` and `end_time` are seconds relative to the session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Transcription {
    pub id: i32,
    pub meeting_id: i32,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub speaker: Option<String>,
    pub language: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub session_uid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTranscription {
    pub meeting_id: i32,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub speaker: Option<String>,
    pub language: Option<String>,
    pub session_uid: Option<String>,
}

impl Transcription {
    pub async fn create(
        conn: &mut PgConnection,
        new_segment: NewTranscription,
    ) -> Result<Transcription, sqlx::Error> {
        sqlx::query_as::<_, Transcription>(
            r#"
            INSERT INTO transcriptions (meeting_id, start_time, end_time, text, speaker, language, session_uid, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            RETURNING id, meeting_id, start_time, end_time, text, speaker, language, created_at, session_uid
            "#,
        )
        .bind(new_segment.meeting_id)
        .bind(new_segment.start_time)
        .bind(new_segment.end_time)
        .bind(new_segment.text)
        .bind(new_segment.speaker)
        .bind(new_segment.language)
        .bind(new_segment.session_uid)
        .fetch_one(conn)
        .await
    }

    /// Segments of a meeting in playback order
    pub async fn list_for_meeting(
        conn: &mut PgConnection,
        meeting_id: i32,
    ) -> Result<Vec<Transcription>, sqlx::Error> {
        sqlx::query_as::<_, Transcription>(
            r#"
            SELECT id, meeting_id, start_time, end_time, text, speaker, language, created_at, session_uid
            FROM transcriptions
            WHERE meeting_id = $1
            ORDER BY start_time, id
            "#,
        )
        .bind(meeting_id)
        .fetch_all(conn)
        .await
    }

    pub async fn list_for_session(
        conn: &mut PgConnection,
        session_uid: &str,
    ) -> Result<Vec<Transcription>, sqlx::Error> {
        sqlx::query_as::<_, Transcription>(
            r#"
            SELECT id, meeting_id, start_time, end_time, text, speaker, language, created_at, session_uid
            FROM transcriptions
            WHERE session_uid = $1
            ORDER BY start_time, id
            "#,
        )
        .bind(session_uid)
        .fetch_all(conn)
        .await
    }
}
