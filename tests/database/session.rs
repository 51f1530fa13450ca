//! Session scope: nothing is committed implicitly and every exit path
//! releases.

use crate::common::{create_user, provisioned, row_count};
use shared_models::database::Database;
use shared_models::models::User;
use shared_models::{DbError, SessionError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[sqlx::test(migrations = false)]
async fn test_released_session_discards_uncommitted_writes(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;

    let mut session = db.session().await?;
    create_user(session.conn().await?, "draft@example.com").await?;
    assert!(session.in_transaction());
    session.release().await?;

    let mut observer = db.session().await?;
    assert_eq!(row_count(observer.conn().await?, "users").await?, 0);
    observer.release().await?;
    assert_eq!(db.active_sessions(), 0);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_dropped_session_rolls_back(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;

    {
        let mut session = db.session().await?;
        create_user(session.conn().await?, "dropped@example.com").await?;
        assert_eq!(db.active_sessions(), 1);
    }
    assert_eq!(db.active_sessions(), 0);

    let mut observer = db.session().await?;
    let found = User::find_by_email(observer.conn().await?, "dropped@example.com").await?;
    assert!(found.is_none());
    observer.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_commit_is_visible_to_later_sessions(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;

    let mut writer = db.session().await?;
    let user = create_user(writer.conn().await?, "kept@example.com").await?;
    writer.commit().await?;
    assert!(!writer.in_transaction());
    assert_eq!(writer.commits(), 1);

    // Work after the commit runs in a fresh transaction and is discarded.
    create_user(writer.conn().await?, "discarded@example.com").await?;
    writer.release().await?;

    // The row read before commit is still usable without a refetch.
    assert_eq!(user.email, "kept@example.com");

    let mut reader = db.session().await?;
    let conn = reader.conn().await?;
    assert!(User::find_by_email(&mut *conn, "kept@example.com").await?.is_some());
    assert!(User::find_by_email(&mut *conn, "discarded@example.com").await?.is_none());
    reader.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_uncommitted_writes_are_invisible_to_other_sessions(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;

    let mut writer = db.session().await?;
    create_user(writer.conn().await?, "pending@example.com").await?;

    let mut reader = db.session().await?;
    assert_eq!(row_count(reader.conn().await?, "users").await?, 0);
    assert_eq!(db.active_sessions(), 2);

    writer.commit().await?;
    reader.rollback().await?;
    assert_eq!(row_count(reader.conn().await?, "users").await?, 1);

    writer.release().await?;
    reader.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_scoped_releases_on_error(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;

    let result: Result<(), DbError> = db
        .scoped(|session| {
            Box::pin(async move {
                create_user(session.conn().await?, "scoped@example.com").await?;
                // Same email again: unique violation mid unit of work.
                create_user(session.conn().await?, "scoped@example.com").await?;
                Ok(())
            })
        })
        .await;

    match result {
        Err(DbError::Session(SessionError::UniqueViolation { constraint, .. })) => {
            assert_eq!(constraint, "ix_users_email");
        }
        other => panic!("expected unique violation, got {other:?}"),
    }
    assert_eq!(db.active_sessions(), 0);

    let users = db
        .scoped(|session| Box::pin(async move { Ok(User::list(session.conn().await?, 10).await?) }))
        .await?;
    assert!(users.is_empty());
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_scoped_keeps_explicit_commits(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;

    let id = db
        .scoped(|session| {
            Box::pin(async move {
                let user = create_user(session.conn().await?, "committed@example.com").await?;
                session.commit().await?;
                Ok(user.id)
            })
        })
        .await?;

    let found = db
        .scoped(|session| Box::pin(async move { Ok(User::find_by_id(session.conn().await?, id).await?) }))
        .await?;
    assert_eq!(found.map(|u| u.email).as_deref(), Some("committed@example.com"));
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_each_session_gets_its_own_identity(pool: PgPool) -> Result<(), DbError> {
    let db = Database::from_pool(pool);
    let session = db.session().await?;
    let id = session.id();
    session.release().await?;
    assert_eq!(db.active_sessions(), 0);

    let next = db.session().await?;
    assert_ne!(next.id(), id);
    next.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_commit_after_failed_statement_is_refused(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;

    let mut session = db.session().await?;
    create_user(session.conn().await?, "kept@example.com").await?;
    // The caller swallows the unique violation and carries on.
    assert!(create_user(session.conn().await?, "kept@example.com").await.is_err());

    let err = session.commit().await.unwrap_err();
    assert!(
        matches!(err, DbError::Session(SessionError::Aborted { session_id }) if session_id == session.id()),
        "{err:?}"
    );
    assert_eq!(session.commits(), 0);
    assert!(!session.in_transaction());

    // The session stays usable with a fresh transaction.
    assert_eq!(row_count(session.conn().await?, "users").await?, 0);
    session.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_exhausted_pool_fails_the_borrower(pool: PgPool) -> Result<(), DbError> {
    let single = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy_with((*pool.connect_options()).clone());
    let db = Database::from_pool(single);

    let mut holder = db.session().await?;
    holder.conn().await?;

    let mut waiter = db.session().await?;
    let err = waiter.conn().await.unwrap_err();
    assert!(matches!(err, DbError::PoolExhausted { timeout_ms: 200 }), "{err:?}");
    assert!(err.is_retryable());
    assert!(!waiter.in_transaction());

    holder.release().await?;
    waiter.conn().await?;
    waiter.release().await?;
    db.close().await;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_cancelled_unit_of_work_is_released(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;
    let inserted = Arc::new(Notify::new());
    let signal = Arc::clone(&inserted);

    let work = db.scoped(move |session| {
        Box::pin(async move {
            create_user(session.conn().await?, "cancelled@example.com").await?;
            signal.notify_one();
            futures::future::pending::<()>().await;
            session.commit().await?;
            Ok(())
        })
    });

    tokio::select! {
        result = work => panic!("unit of work finished unexpectedly: {result:?}"),
        _ = inserted.notified() => {}
    }
    assert_eq!(db.active_sessions(), 0);

    let mut observer = db.session().await?;
    let found = User::find_by_email(observer.conn().await?, "cancelled@example.com").await?;
    assert!(found.is_none());
    observer.release().await?;
    Ok(())
}
