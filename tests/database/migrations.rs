//! Revision chain against a live database.

use crate::common::{create_user, provisioned};
use shared_models::database::{
    Database, MigrationLedger, MigrationStep, SqlMigration, INITIAL_SCHEMA,
};
use shared_models::error::MigrationError;
use shared_models::{DbError, SCHEMA};
use sqlx::PgPool;
use std::sync::Arc;

const HEAD: &str = "0001_initial_schema";

#[sqlx::test(migrations = false)]
async fn test_upgrade_converges_with_init(pool: PgPool) -> Result<(), DbError> {
    let db = Database::from_pool(pool);

    let applied = db.upgrade(None).await?;
    assert_eq!(applied, vec![HEAD]);
    let migrated = db.snapshot().await?;
    assert!(migrated.drift_from(&SCHEMA).is_empty(), "{:?}", migrated.drift_from(&SCHEMA));

    let reverted = db.downgrade(None).await?;
    assert_eq!(reverted, vec![HEAD]);
    assert!(db.snapshot().await?.is_empty());

    db.init_schema().await?;
    assert_eq!(db.snapshot().await?, migrated);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_upgrade_is_recorded_and_repeatable(pool: PgPool) -> Result<(), DbError> {
    let db = Database::from_pool(pool);

    let status = db.migration_status().await?;
    assert_eq!(status.current, None);
    assert_eq!(status.pending, vec![HEAD]);

    db.upgrade(None).await?;
    assert!(db.upgrade(None).await?.is_empty());

    let status = db.migration_status().await?;
    assert_eq!(status.current.as_deref(), Some(HEAD));
    assert!(status.is_up_to_date());
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_stamp_adopts_initialized_database(pool: PgPool) -> Result<(), DbError> {
    let db = provisioned(pool).await?;

    // Running the root step over existing tables fails and changes nothing.
    let err = db.upgrade(None).await.unwrap_err();
    assert!(matches!(err, DbError::Migration(MigrationError::Failed { .. })), "{err:?}");
    assert_eq!(db.migration_status().await?.current, None);

    db.stamp(Some(HEAD)).await?;
    assert!(db.migration_status().await?.is_up_to_date());
    assert!(db.upgrade(None).await?.is_empty());
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_downgrade_removes_tables_with_data(pool: PgPool) -> Result<(), DbError> {
    let db = Database::from_pool(pool);
    db.upgrade(None).await?;

    let mut session = db.session().await?;
    create_user(session.conn().await?, "gone@example.com").await?;
    session.commit().await?;
    session.release().await?;

    db.downgrade(None).await?;
    let snapshot = db.snapshot().await?;
    assert!(snapshot.is_empty());
    assert!(snapshot.indexes.is_empty());
    assert_eq!(db.migration_status().await?.current, None);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_stamp_rejects_unknown_revision(pool: PgPool) -> Result<(), DbError> {
    let db = Database::from_pool(pool);
    let err = db.stamp(Some("9999_missing")).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::Migration(MigrationError::UnknownRevision { ref revision }) if revision == "9999_missing"
    ));
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_custom_chain_applies_in_order(pool: PgPool) -> Result<(), DbError> {
    let db = Database::from_pool(pool);
    let engine = db.admin_engine().await?;

    let add_column: Arc<dyn MigrationStep> = Arc::new(SqlMigration {
        revision: "0002_users_timezone",
        down_revision: Some(HEAD),
        description: "Add users.timezone",
        up: "ALTER TABLE users ADD COLUMN timezone VARCHAR(64)",
        down: None,
    });
    let ledger = MigrationLedger::new(vec![
        add_column,
        Arc::new(INITIAL_SCHEMA) as Arc<dyn MigrationStep>,
    ])?;
    assert_eq!(ledger.revisions(), vec![HEAD, "0002_users_timezone"]);

    let applied = ledger.upgrade(engine, None).await?;
    assert_eq!(applied, vec![HEAD, "0002_users_timezone"]);
    assert_eq!(ledger.current(engine).await?.as_deref(), Some("0002_users_timezone"));

    let snapshot = db.snapshot().await?;
    assert!(snapshot
        .columns
        .iter()
        .any(|c| c.table_name == "users" && c.column_name == "timezone"));

    // The newest step has no downgrade, so nothing is undone.
    let err = ledger.downgrade(engine, None).await.unwrap_err();
    assert!(matches!(err, DbError::Migration(MigrationError::Irreversible { .. })));
    assert_eq!(ledger.current(engine).await?.as_deref(), Some("0002_users_timezone"));
    Ok(())
}
