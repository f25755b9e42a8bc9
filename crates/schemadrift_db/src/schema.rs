//! Table definitions and the live column snapshot.
//!
//! The definition file only seeds the table at bootstrap. After that the
//! store is the source of truth and `SchemaSnapshot` is re-read from it.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DbError, Result};
use crate::migration::{Direction, MigrationStep};
use crate::store::{quote_ident, Store};
use crate::value::{DbTimestamp, DbValue};

const USERS_DEFINITION: &str = include_str!("../schema/users.json");

/// One column of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Raw SQL default expression.
    #[serde(default)]
    pub default: Option<String>,
}

fn default_nullable() -> bool {
    true
}

/// Declarative table definition, as stored in the schema file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    /// The bundled `users` table.
    pub fn users() -> Result<Self> {
        Self::from_json(USERS_DEFINITION)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(raw)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DbError::invalid_state("table definition has no name"));
        }
        if self.columns.is_empty() {
            return Err(DbError::invalid_state(format!("table {} has no columns", self.name)));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DbError::invalid_state(format!(
                    "table {} declares column {} twice",
                    self.name, column.name
                )));
            }
        }
        Ok(())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn create_table_sql(&self) -> String {
        let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (", quote_ident(&self.name));
        for (index, column) in self.columns.iter().enumerate() {
            if index > 0 {
                sql.push_str(", ");
            }
            let _ = write!(sql, "{} {}", quote_ident(&column.name), column.sql_type);
            if !column.nullable {
                sql.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                let _ = write!(sql, " DEFAULT {}", default);
            }
        }
        sql.push(')');
        sql
    }
}

/// Column names of one table, in declaration order, as of the last read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    table: String,
    columns: Vec<String>,
}

impl SchemaSnapshot {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Read the live column list of `table`.
    pub async fn capture(store: &Store, table: &str) -> Result<Self> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let rows = store.fetch_rows(&sql).await?;
        if rows.is_empty() {
            return Err(DbError::not_found(format!("table {}", table)));
        }
        let columns = rows
            .iter()
            .map(|row| row.get_by_name::<String>("name"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DbError::invalid_state(format!("unreadable table_info for {}: {}", table, e)))?;
        Ok(Self::new(table, columns))
    }

    /// Run `step` in `direction`, then replace this snapshot with the
    /// resulting schema. On failure the snapshot is left as it was.
    pub async fn apply(&mut self, store: &Store, step: &MigrationStep, direction: Direction) -> Result<()> {
        step.run(store, direction).await?;
        *self = Self::capture(store, &self.table).await?;
        Ok(())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Column-set equality; order is ignored.
    pub fn same_columns(&self, other: &SchemaSnapshot) -> bool {
        let mine: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let theirs: HashSet<&str> = other.columns.iter().map(String::as_str).collect();
        self.table == other.table && mine == theirs
    }

    /// Columns the given field set does not know about, in snapshot order.
    pub fn drift_from(&self, fields: &[&str]) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !fields.contains(&c.as_str()))
            .cloned()
            .collect()
    }
}

impl Store {
    /// Create the table if needed and return its snapshot.
    pub async fn bootstrap(&self, definition: &TableDefinition) -> Result<SchemaSnapshot> {
        definition.validate()?;
        self.execute_batch(&definition.create_table_sql()).await?;

        let snapshot = SchemaSnapshot::capture(self, &definition.name).await?;
        let expected = SchemaSnapshot::new(definition.name.clone(), definition.column_names());
        if !snapshot.same_columns(&expected) {
            warn!(
                table = %definition.name,
                live = ?snapshot.columns(),
                "Existing table differs from its definition"
            );
        }
        info!(table = %definition.name, columns = snapshot.columns().len(), "Table ready");
        Ok(snapshot)
    }
}

/// Timestamp of the demonstration row.
pub const DEMO_TIMESTAMP: &str = "2022-06-14 11:36:41";

/// Insert the single demonstration user if it is not there yet.
pub async fn seed_demo_user(store: &Store) -> Result<bool> {
    let at = DbTimestamp::parse(DEMO_TIMESTAMP).map_err(|e| DbError::invalid_state(e.to_string()))?;
    let inserted = store
        .execute(
            "INSERT OR IGNORE INTO users (id, full_name, address, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
            &[
                DbValue::Integer(1),
                DbValue::from("John Doe"),
                DbValue::from("Singapore"),
                DbValue::from(at.clone()),
                DbValue::from(at),
            ],
        )
        .await?;
    Ok(inserted > 0)
}
