//! # Schema Metadata Model
//!
//! The single, process-wide description of every table, column, constraint
//! and index this crate governs. The initializer renders it into idempotent
//! DDL, the recreator into strict DDL after the namespace is rebuilt, and the
//! migration ledger is checked against it.
//!
//! Tables are declared parents first. Creation follows declaration order and
//! dropping follows the reverse, so foreign keys never point forward.

mod tables;

pub use tables::{API_TOKENS, MEETINGS, MEETING_SESSIONS, TABLES, TRANSCRIPTIONS, USERS};

/// Namespace the model lives in.
pub const SCHEMA_NAMESPACE: &str = "public";

/// Column storage types used by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing integer key assigned by the store.
    Serial,
    Integer,
    /// `VARCHAR(n)`, or unbounded `VARCHAR` when `None`.
    Varchar(Option<u32>),
    Text,
    /// `TIMESTAMP WITHOUT TIME ZONE`
    Timestamp,
    /// `TIMESTAMP WITH TIME ZONE`
    TimestampTz,
    DoublePrecision,
    Jsonb,
}

impl ColumnType {
    pub fn sql(&self) -> String {
        match self {
            ColumnType::Serial => "SERIAL".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Varchar(Some(len)) => format!("VARCHAR({len})"),
            ColumnType::Varchar(None) => "VARCHAR".to_string(),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Timestamp => "TIMESTAMP WITHOUT TIME ZONE".to_string(),
            ColumnType::TimestampTz => "TIMESTAMP WITH TIME ZONE".to_string(),
            ColumnType::DoublePrecision => "DOUBLE PRECISION".to_string(),
            ColumnType::Jsonb => "JSONB".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    /// Server-side default expression.
    pub default: Option<&'static str>,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            default: None,
        }
    }

    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub const fn server_default(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    pub fn sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.ty.sql());
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

/// Table-level constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    PrimaryKey {
        name: &'static str,
        column: &'static str,
    },
    ForeignKey {
        name: &'static str,
        column: &'static str,
        references: &'static str,
        referenced_column: &'static str,
    },
    Unique {
        name: &'static str,
        columns: &'static [&'static str],
    },
}

impl Constraint {
    pub fn name(&self) -> &'static str {
        match self {
            Constraint::PrimaryKey { name, .. }
            | Constraint::ForeignKey { name, .. }
            | Constraint::Unique { name, .. } => name,
        }
    }

    pub fn sql(&self) -> String {
        match self {
            Constraint::PrimaryKey { name, column } => {
                format!("CONSTRAINT {name} PRIMARY KEY ({column})")
            }
            Constraint::ForeignKey {
                name,
                column,
                references,
                referenced_column,
            } => format!(
                "CONSTRAINT {name} FOREIGN KEY ({column}) REFERENCES {references} ({referenced_column})"
            ),
            Constraint::Unique { name, columns } => {
                format!("CONSTRAINT {name} UNIQUE ({})", columns.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMethod {
    BTree,
    Gin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Index {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub unique: bool,
    pub method: IndexMethod,
}

impl Index {
    pub const fn on(name: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            name,
            columns,
            unique: false,
            method: IndexMethod::BTree,
        }
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn gin(mut self) -> Self {
        self.method = IndexMethod::Gin;
        self
    }

    pub fn create_sql(&self, table: &str, check_first: bool) -> String {
        let unique = if self.unique { "UNIQUE " } else { "" };
        let guard = if check_first { "IF NOT EXISTS " } else { "" };
        let using = match self.method {
            IndexMethod::BTree => "",
            IndexMethod::Gin => " USING gin",
        };
        format!(
            "CREATE {unique}INDEX {guard}{} ON {table}{using} ({})",
            self.name,
            self.columns.join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub constraints: &'static [Constraint],
    pub indexes: &'static [Index],
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Tables this one references through foreign keys.
    pub fn parents(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constraints.iter().filter_map(|c| match c {
            Constraint::ForeignKey { references, .. } => Some(*references),
            _ => None,
        })
    }

    pub fn create_sql(&self, check_first: bool) -> String {
        let guard = if check_first { "IF NOT EXISTS " } else { "" };
        let body: Vec<String> = self
            .columns
            .iter()
            .map(Column::sql)
            .chain(self.constraints.iter().map(Constraint::sql))
            .collect();
        format!(
            "CREATE TABLE {guard}{} (\n    {}\n)",
            self.name,
            body.join(",\n    ")
        )
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name)
    }
}

/// The complete model: tables in dependency order.
#[derive(Debug, Clone, Copy)]
pub struct SchemaModel {
    pub tables: &'static [Table],
}

/// The model every component of this crate works from.
pub static SCHEMA: SchemaModel = SchemaModel { tables: TABLES };

impl SchemaModel {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        self.tables.iter().map(|t| t.name).collect()
    }

    /// Every statement needed to materialize the model, tables before their
    /// indexes, parents before children.
    ///
    /// With `check_first` each statement only creates what is missing.
    pub fn create_statements(&self, check_first: bool) -> Vec<String> {
        let mut statements = Vec::new();
        for table in self.tables {
            statements.push(table.create_sql(check_first));
            for index in table.indexes {
                statements.push(index.create_sql(table.name, check_first));
            }
        }
        statements
    }

    /// Drop statements, children before parents.
    pub fn drop_statements(&self) -> Vec<String> {
        self.tables.iter().rev().map(Table::drop_sql).collect()
    }

    /// Check the model is internally consistent: unique names, foreign keys
    /// only pointing at tables declared earlier, and every referenced column
    /// present.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen: Vec<&str> = Vec::new();
        let mut object_names: Vec<&str> = Vec::new();
        for table in self.tables {
            if seen.contains(&table.name) {
                return Err(format!("table {} declared twice", table.name));
            }
            for constraint in table.constraints {
                if let Constraint::ForeignKey {
                    column,
                    references,
                    referenced_column,
                    ..
                } = constraint
                {
                    if table.column(column).is_none() {
                        return Err(format!("{}.{column} does not exist", table.name));
                    }
                    if !seen.contains(references) {
                        return Err(format!(
                            "{} references {references}, which is not declared before it",
                            table.name
                        ));
                    }
                    let parent_has_column = self
                        .table(references)
                        .and_then(|parent| parent.column(referenced_column))
                        .is_some();
                    if !parent_has_column {
                        return Err(format!("{references}.{referenced_column} does not exist"));
                    }
                }
            }
            let names = table
                .constraints
                .iter()
                .map(Constraint::name)
                .chain(table.indexes.iter().map(|i| i.name));
            for name in names {
                if object_names.contains(&name) {
                    return Err(format!("object name {name} used twice"));
                }
                object_names.push(name);
            }
            for index in table.indexes {
                if let Some(missing) = index.columns.iter().find(|c| table.column(c).is_none()) {
                    return Err(format!("index {} uses unknown column {missing}", index.name));
                }
            }
            seen.push(table.name);
        }
        Ok(())
    }
}
