//! Row types for the meeting store.
//!
//! Every query takes the `&mut PgConnection` of a [`Session`](crate::database::Session)
//! (`session.conn().await?`), so it runs inside that session's transaction.
//! Returned rows are owned values and stay valid after commit.

pub mod api_token;
pub mod meeting;
pub mod meeting_session;
pub mod transcription;
pub mod user;

// Re-export models for easy access
pub use api_token::{ApiToken, NewApiToken};
pub use meeting::{Meeting, NewMeeting};
pub use meeting_session::{MeetingSession, NewMeetingSession};
pub use transcription::{NewTranscription, Transcription};
pub use user::{NewUser, User};
