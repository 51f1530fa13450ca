//! Integrity rules enforced by the store.

use crate::common::{create_meeting, create_user, provisioned};
use shared_models::models::{
    ApiToken, MeetingSession, NewApiToken, NewMeetingSession, NewTranscription, Transcription,
};
use shared_models::{DbError, SessionError};
use sqlx::PgPool;

fn classify(err: sqlx::Error) -> SessionError {
    SessionError::from(err)
}

#[sqlx::test(migrations = false)]
async fn test_duplicate_email_is_rejected(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;
    let mut session = db.session().await?;
    let conn = session.conn().await?;

    create_user(&mut *conn, "dup@example.com").await?;
    let err = classify(create_user(&mut *conn, "dup@example.com").await.unwrap_err());

    assert!(err.is_unique_violation(), "{err:?}");
    session.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_duplicate_token_is_rejected(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;
    let mut session = db.session().await?;
    let conn = session.conn().await?;

    let alice = create_user(&mut *conn, "alice@example.com").await?;
    let bob = create_user(&mut *conn, "bob@example.com").await?;
    ApiToken::create(
        &mut *conn,
        NewApiToken {
            token: "tok_shared".to_string(),
            user_id: alice.id,
        },
    )
    .await?;

    // Token values are unique across all users, not per user.
    let err = classify(
        ApiToken::create(
            &mut *conn,
            NewApiToken {
                token: "tok_shared".to_string(),
                user_id: bob.id,
            },
        )
        .await
        .unwrap_err(),
    );
    match err {
        SessionError::UniqueViolation { constraint, .. } => {
            assert_eq!(constraint, "ix_api_tokens_token");
        }
        other => panic!("expected unique violation, got {other:?}"),
    }
    session.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_meeting_requires_existing_user(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;
    let mut session = db.session().await?;

    let err = classify(
        create_meeting(session.conn().await?, 4242, "no-owner")
            .await
            .unwrap_err(),
    );
    match err {
        SessionError::ForeignKeyViolation { constraint, .. } => {
            assert_eq!(constraint, "meetings_user_id_fkey");
        }
        other => panic!("expected foreign key violation, got {other:?}"),
    }
    session.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_children_require_existing_meeting(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;

    let mut session = db.session().await?;
    let err = classify(
        Transcription::create(
            session.conn().await?,
            NewTranscription {
                meeting_id: 999,
                start_time: 0.0,
                end_time: 1.5,
                text: "hello".to_string(),
                speaker: None,
                language: Some("en".to_string()),
                session_uid: None,
            },
        )
        .await
        .unwrap_err(),
    );
    assert!(err.is_foreign_key_violation(), "{err:?}");
    session.release().await?;

    let mut session = db.session().await?;
    let err = classify(
        MeetingSession::create(
            session.conn().await?,
            NewMeetingSession {
                meeting_id: 999,
                session_uid: "uid-1".to_string(),
                session_start_time: None,
            },
        )
        .await
        .unwrap_err(),
    );
    assert!(err.is_foreign_key_violation(), "{err:?}");
    session.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_session_uid_is_unique_per_meeting(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;
    let mut session = db.session().await?;
    let conn = session.conn().await?;

    let user = create_user(&mut *conn, "host@example.com").await?;
    let first = create_meeting(&mut *conn, user.id, "aaa-bbbb-ccc").await?;
    let second = create_meeting(&mut *conn, user.id, "ddd-eeee-fff").await?;

    let session_for = |meeting_id: i32| NewMeetingSession {
        meeting_id,
        session_uid: "shared-uid".to_string(),
        session_start_time: None,
    };

    MeetingSession::create(&mut *conn, session_for(first.id)).await?;
    // The same uid under another meeting is fine.
    MeetingSession::create(&mut *conn, session_for(second.id)).await?;

    let err = classify(
        MeetingSession::create(&mut *conn, session_for(first.id))
            .await
            .unwrap_err(),
    );
    match err {
        SessionError::UniqueViolation { constraint, .. } => {
            assert_eq!(constraint, "_meeting_session_uc");
        }
        other => panic!("expected unique violation, got {other:?}"),
    }
    session.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_required_columns_are_enforced(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;
    let mut session = db.session().await?;

    let err = classify(
        sqlx::query("INSERT INTO users (email) VALUES (NULL)")
            .execute(session.conn().await?)
            .await
            .unwrap_err(),
    );
    assert!(matches!(err, SessionError::NotNullViolation { .. }), "{err:?}");
    session.release().await?;
    Ok(())
}
