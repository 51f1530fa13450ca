//! Schema initializer and recreator against a live database.

use crate::common::{create_meeting, create_user, provisioned, row_count};
use shared_models::database::{Database, RecreateIntent};
use shared_models::error::{Phase, SchemaOperationError};
use shared_models::{DbError, SCHEMA};
use sqlx::PgPool;

async fn current_database(db: &Database) -> Result<String, DbError> {
    let mut conn = db.engine().await?.acquire().await?;
    Ok(sqlx::query_scalar("SELECT current_database()")
        .fetch_one(&mut *conn)
        .await?)
}

#[sqlx::test(migrations = false)]
async fn test_init_creates_every_table(pool: PgPool) -> Result<(), DbError> {
    let db = Database::from_pool(pool);
    assert!(db.snapshot().await?.is_empty());

    db.init_schema().await?;

    let snapshot = db.snapshot().await?;
    assert_eq!(
        snapshot.tables.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["api_tokens", "meeting_sessions", "meetings", "transcriptions", "users"]
    );
    assert!(snapshot.drift_from(&SCHEMA).is_empty(), "{:?}", snapshot.drift_from(&SCHEMA));
    assert!(snapshot
        .indexes
        .iter()
        .any(|i| i.index_name == "ix_meeting_data_gin" && i.definition.contains("USING gin")));
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_init_is_idempotent_and_keeps_data(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;
    let before = db.snapshot().await?;

    let mut session = db.session().await?;
    create_user(session.conn().await?, "survivor@example.com").await?;
    session.commit().await?;
    session.release().await?;

    db.init_schema().await?;
    db.init_schema().await?;

    assert_eq!(db.snapshot().await?, before);
    let mut session = db.session().await?;
    assert_eq!(row_count(session.conn().await?, "users").await?, 1);
    session.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_init_completes_a_partial_schema(pool: PgPool) -> Result<(), DbError> {
    let db = Database::from_pool(pool);
    {
        let mut conn = db.engine().await?.acquire().await?;
        sqlx::raw_sql(
            "CREATE TABLE users (
                id SERIAL NOT NULL,
                email VARCHAR(255) NOT NULL,
                name VARCHAR(100),
                image_url TEXT,
                created_at TIMESTAMP WITHOUT TIME ZONE DEFAULT now(),
                max_concurrent_bots INTEGER NOT NULL DEFAULT 1,
                data JSONB NOT NULL DEFAULT '{}'::jsonb,
                CONSTRAINT users_pkey PRIMARY KEY (id)
            )",
        )
        .execute(&mut *conn)
        .await?;
    }

    db.init_schema().await?;

    let snapshot = db.snapshot().await?;
    assert_eq!(snapshot.tables.len(), 5);
    assert!(snapshot.drift_from(&SCHEMA).is_empty());
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_recreate_empties_every_table(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;
    let initialized = db.snapshot().await?;

    let mut session = db.session().await?;
    let user = create_user(session.conn().await?, "doomed@example.com").await?;
    create_meeting(session.conn().await?, user.id, "abc-defg-hij").await?;
    session.commit().await?;
    session.release().await?;

    let name = current_database(&db).await?;
    db.recreate_schema(&RecreateIntent::confirm(name)).await?;

    assert_eq!(db.snapshot().await?, initialized);
    let mut session = db.session().await?;
    for table in SCHEMA.table_names() {
        assert_eq!(row_count(session.conn().await?, table).await?, 0, "{table}");
    }
    session.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_recreate_grants_only_usage_to_public(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;
    let name = current_database(&db).await?;
    db.recreate_schema(&RecreateIntent::confirm(name)).await?;

    let mut conn = db.engine().await?.acquire().await?;
    let (usage, create): (bool, bool) = sqlx::query_as(
        "SELECT has_schema_privilege('public', 'public', 'USAGE'),
                has_schema_privilege('public', 'public', 'CREATE')",
    )
    .fetch_one(&mut *conn)
    .await?;
    assert!(usage);
    assert!(!create, "every role may create objects in the rebuilt schema");
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_recreate_refuses_other_database(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;

    let mut session = db.session().await?;
    create_user(session.conn().await?, "safe@example.com").await?;
    session.commit().await?;
    session.release().await?;

    let err = db
        .recreate_schema(&RecreateIntent::confirm("production_meetings"))
        .await
        .unwrap_err();
    match &err {
        DbError::Schema(SchemaOperationError::ConfirmationMismatch { confirmed, .. }) => {
            assert_eq!(confirmed, "production_meetings");
        }
        other => panic!("expected confirmation mismatch, got {other:?}"),
    }
    assert_eq!(err.phase(), Some(Phase::Validate));

    let mut session = db.session().await?;
    assert_eq!(row_count(session.conn().await?, "users").await?, 1);
    session.release().await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_failed_init_reports_apply_phase(pool: PgPool) -> Result<(), DbError> {
    let db = Database::from_pool(pool);
    {
        let mut conn = db.engine().await?.acquire().await?;
        // A view squatting on a table name makes table creation fail.
        sqlx::raw_sql("CREATE VIEW meetings AS SELECT 1 AS id")
            .execute(&mut *conn)
            .await?;
    }

    let err = db.init_schema().await.unwrap_err();
    assert_eq!(err.phase(), Some(Phase::ApplySchema));
    assert!(err.to_string().contains("apply-schema"), "{err}");

    // The whole attempt was rolled back.
    let snapshot = db.snapshot().await?;
    assert!(snapshot.tables.is_empty());
    Ok(())
}
