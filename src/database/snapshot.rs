//! Catalog snapshots of the live `public` schema.
//!
//! Used to check that the ledger head and the metadata model produce the same
//! structure, and by `db-admin check` to detect drift.

use crate::database::migrations::REVISION_TABLE;
use crate::schema::{SchemaModel, SCHEMA_NAMESPACE};
use serde::Serialize;
use sqlx::{FromRow, PgConnection};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, FromRow)]
pub struct ColumnSnapshot {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub character_maximum_length: Option<i32>,
    pub is_nullable: String,
    pub column_default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, FromRow)]
pub struct ConstraintSnapshot {
    pub table_name: String,
    pub constraint_name: String,
    pub constraint_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, FromRow)]
pub struct IndexSnapshot {
    pub table_name: String,
    pub index_name: String,
    pub definition: String,
}

/// Structure of every user table in the namespace, revision table excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    pub tables: BTreeSet<String>,
    pub columns: BTreeSet<ColumnSnapshot>,
    pub constraints: BTreeSet<ConstraintSnapshot>,
    pub indexes: BTreeSet<IndexSnapshot>,
}

impl SchemaSnapshot {
    pub async fn capture(conn: &mut PgConnection) -> Result<Self, sqlx::Error> {
        let tables: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE' AND table_name <> $2
            "#,
        )
        .bind(SCHEMA_NAMESPACE)
        .bind(REVISION_TABLE)
        .fetch_all(&mut *conn)
        .await?;

        let columns: Vec<ColumnSnapshot> = sqlx::query_as(
            r#"
            SELECT table_name::text AS table_name,
                   column_name::text AS column_name,
                   data_type::text AS data_type,
                   character_maximum_length::int4 AS character_maximum_length,
                   is_nullable::text AS is_nullable,
                   column_default::text AS column_default
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name <> $2
            "#,
        )
        .bind(SCHEMA_NAMESPACE)
        .bind(REVISION_TABLE)
        .fetch_all(&mut *conn)
        .await?;

        let constraints: Vec<ConstraintSnapshot> = sqlx::query_as(
            r#"
            SELECT table_name::text AS table_name,
                   constraint_name::text AS constraint_name,
                   constraint_type::text AS constraint_type
            FROM information_schema.table_constraints
            WHERE table_schema = $1 AND table_name <> $2 AND constraint_type <> 'CHECK'
            "#,
        )
        .bind(SCHEMA_NAMESPACE)
        .bind(REVISION_TABLE)
        .fetch_all(&mut *conn)
        .await?;

        let indexes: Vec<IndexSnapshot> = sqlx::query_as(
            r#"
            SELECT tablename::text AS table_name,
                   indexname::text AS index_name,
                   indexdef AS definition
            FROM pg_indexes
            WHERE schemaname = $1 AND tablename <> $2
            "#,
        )
        .bind(SCHEMA_NAMESPACE)
        .bind(REVISION_TABLE)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Self {
            tables: tables.into_iter().map(|(name,)| name).collect(),
            columns: columns.into_iter().collect(),
            constraints: constraints.into_iter().collect(),
            indexes: indexes.into_iter().collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Differences between the live schema and `model`, by object name.
    /// Empty when they agree.
    pub fn drift_from(&self, model: &SchemaModel) -> Vec<String> {
        let mut drift = Vec::new();

        for table in model.tables {
            if !self.tables.contains(table.name) {
                drift.push(format!("missing table {}", table.name));
                continue;
            }
            for column in table.columns {
                let live = self
                    .columns
                    .iter()
                    .find(|c| c.table_name == table.name && c.column_name == column.name);
                match live {
                    None => drift.push(format!("missing column {}.{}", table.name, column.name)),
                    Some(live) if (live.is_nullable == "YES") != column.nullable => drift.push(
                        format!("nullability differs on {}.{}", table.name, column.name),
                    ),
                    Some(_) => {}
                }
            }
            for constraint in table.constraints {
                let present = self
                    .constraints
                    .iter()
                    .any(|c| c.table_name == table.name && c.constraint_name == constraint.name());
                if !present {
                    drift.push(format!("missing constraint {}", constraint.name()));
                }
            }
            for index in table.indexes {
                let present = self
                    .indexes
                    .iter()
                    .any(|i| i.table_name == table.name && i.index_name == index.name);
                if !present {
                    drift.push(format!("missing index {}", index.name));
                }
            }
        }

        let modeled = model.table_names();
        for table in &self.tables {
            if !modeled.contains(&table.as_str()) {
                drift.push(format!("unexpected table {table}"));
            }
        }
        drift
    }
}
