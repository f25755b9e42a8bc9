//! A single forward/reverse DDL pair.
//!
//! There is no version table and no chaining. Running `down` without a
//! preceding `up`, or either direction while another process is reading, is
//! left to the store: SQLite rejects dropping a missing column, and a reader
//! sees whichever schema is committed when its fetch executes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DbError, Result};
use crate::store::Store;

/// Which statement of a step to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named migration: an additive `up` statement and its exact inverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub name: String,
    pub up_sql: String,
    pub down_sql: String,
}

impl MigrationStep {
    pub fn new(name: impl Into<String>, up_sql: impl Into<String>, down_sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }

    /// Adds the nullable `users.phone_number` column.
    pub fn add_phone_number() -> Self {
        Self::new(
            "add_phone_number",
            "ALTER TABLE users ADD COLUMN phone_number VARCHAR(127)",
            "ALTER TABLE users DROP COLUMN phone_number",
        )
    }

    pub fn statement(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.up_sql,
            Direction::Down => &self.down_sql,
        }
    }

    pub async fn up(&self, store: &Store) -> Result<()> {
        self.run(store, Direction::Up).await
    }

    pub async fn down(&self, store: &Store) -> Result<()> {
        self.run(store, Direction::Down).await
    }

    /// Execute one direction in its own transaction. No retry.
    pub async fn run(&self, store: &Store, direction: Direction) -> Result<()> {
        let sql = self.statement(direction);
        match execute_in_transaction(store, sql).await {
            Ok(()) => {
                info!(step = %self.name, %direction, "Migration applied");
                Ok(())
            }
            Err(err) => {
                let message = match &err {
                    sqlx::Error::Database(db) => db.message().to_string(),
                    other => other.to_string(),
                };
                warn!(step = %self.name, %direction, error = %message, "Migration failed");
                Err(DbError::Migration {
                    step: self.name.clone(),
                    direction,
                    message,
                })
            }
        }
    }
}

async fn execute_in_transaction(store: &Store, sql: &str) -> std::result::Result<(), sqlx::Error> {
    let mut tx = store.pool().begin().await?;
    sqlx::query(sql).persistent(false).execute(&mut *tx).await?;
    tx.commit().await
}
