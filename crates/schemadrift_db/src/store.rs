//! Store session: an explicitly owned SQLite pool handed to every operation.
//!
//! Each SQLite connection caches the schema it last read. After another
//! connection runs `ALTER TABLE`, a statement prepared on a stale connection
//! describes the old column set while stepping returns the new one, so reads
//! refresh the schema inside their own read transaction before preparing.

use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::Deserialize;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use tracing::{debug_span, info, Instrument};

use crate::error::{DbError, Result};
use crate::value::{DbRow, DbValue};

/// Environment variable holding the database URL.
pub const DATABASE_URL_ENV: &str = "SCHEMADRIFT_DATABASE_URL";
/// Environment variable overriding the pool size.
pub const MAX_CONNECTIONS_ENV: &str = "SCHEMADRIFT_MAX_CONNECTIONS";

const MEMORY_URL: &str = "sqlite::memory:";

/// Column set never changes, so it is safe to prepare on a stale connection.
/// Stepping it checks the schema cookie and reloads the cached schema.
const SCHEMA_REFRESH_SQL: &str = "SELECT count(*) FROM sqlite_master";

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl StoreConfig {
    /// SQLite database file, created if missing.
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref()),
            max_connections: default_max_connections(),
        }
    }

    /// In-memory SQLite (for testing). One connection, or each would see its
    /// own empty database.
    pub fn sqlite_memory() -> Self {
        Self {
            url: MEMORY_URL.to_string(),
            max_connections: 1,
        }
    }

    /// Read `SCHEMADRIFT_DATABASE_URL` / `SCHEMADRIFT_MAX_CONNECTIONS`,
    /// falling back to an in-memory database.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            std::env::var(DATABASE_URL_ENV).ok(),
            std::env::var(MAX_CONNECTIONS_ENV).ok(),
        )
    }

    fn from_vars(url: Option<String>, max_connections: Option<String>) -> Result<Self> {
        let mut config = match url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Self::from_url(url),
            _ => Self::sqlite_memory(),
        };
        if let Some(raw) = max_connections {
            let max = raw.trim().parse::<u32>().map_err(|_| {
                DbError::invalid_state(format!("{} must be a positive integer, got {:?}", MAX_CONNECTIONS_ENV, raw))
            })?;
            config = config.with_max_connections(max);
        }
        Ok(config)
    }

    /// Configuration for an explicit URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        if is_memory_url(&url) {
            return Self {
                url,
                max_connections: 1,
            };
        }
        Self {
            url,
            max_connections: default_max_connections(),
        }
    }

    /// Set maximum connections. In-memory databases stay at one.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        if !self.is_memory() {
            self.max_connections = max.max(1);
        }
        self
    }

    pub fn is_memory(&self) -> bool {
        is_memory_url(&self.url)
    }
}

fn is_memory_url(url: &str) -> bool {
    url.starts_with(MEMORY_URL) || url.contains("mode=memory")
}

/// Owned handle to the backing store.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the pool described by `config`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::StoreConnection(format!("invalid url {}: {}", config.url, e)))?;
        if !config.is_memory() {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.is_memory() {
            pool_options = pool_options
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DbError::StoreConnection(e.to_string()))?;

        info!(url = %config.url, max_connections = config.max_connections, "Store connected");
        Ok(Self { pool })
    }

    /// Shorthand for a fresh in-memory store.
    pub async fn open_memory() -> Result<Self> {
        Self::connect(&StoreConfig::sqlite_memory()).await
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection. Waits for checked-out connections to return.
    pub async fn close(self) {
        self.pool.close().await;
        info!("Store closed");
    }

    /// Execute one statement with positional parameters.
    pub async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64> {
        let span = debug_span!(
            "db.exec",
            op = sql_op_name(sql),
            sql_hash = %hash_sql(sql),
            duration_ms = tracing::field::Empty
        );
        let start = Instant::now();

        let result = bind_params(sqlx::query(sql).persistent(false), params)
            .execute(&self.pool)
            .instrument(span.clone())
            .await?;

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(result.rows_affected())
    }

    /// Execute a parameterless script.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let span = debug_span!(
            "db.exec_batch",
            op = "BATCH",
            sql_hash = %hash_sql(sql),
            duration_ms = tracing::field::Empty
        );
        let start = Instant::now();

        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .instrument(span.clone())
            .await?;

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Run `sql` and return every row with its column names.
    ///
    /// The statement runs in a read transaction on one pooled connection. A
    /// fixed-shape read of `sqlite_master` goes first so the connection
    /// reloads a schema changed by another connection, and the real statement
    /// is then prepared against the same snapshot it reads. The connection
    /// goes back to the pool when it leaves scope, on success and on error.
    pub async fn fetch_rows(&self, sql: &str) -> Result<Vec<DbRow>> {
        let span = debug_span!(
            "db.query",
            op = sql_op_name(sql),
            sql_hash = %hash_sql(sql),
            duration_ms = tracing::field::Empty
        );
        let start = Instant::now();

        let rows = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(SCHEMA_REFRESH_SQL)
                .persistent(false)
                .fetch_one(&mut *tx)
                .await?;
            let rows = sqlx::query(sql).persistent(false).fetch_all(&mut *tx).await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(rows)
        }
        .instrument(span.clone())
        .await?;

        let rows = span.in_scope(|| rows.iter().map(decode_row).collect::<Result<Vec<_>>>())?;
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(rows)
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_params<'q>(mut query: SqliteQuery<'q>, params: &'q [DbValue]) -> SqliteQuery<'q> {
    for param in params {
        query = match param {
            DbValue::Null => query.bind(None::<String>),
            DbValue::Integer(v) => query.bind(*v),
            DbValue::Real(v) => query.bind(*v),
            DbValue::Text(v) => query.bind(v.as_str()),
            DbValue::Blob(v) => query.bind(v.as_slice()),
            DbValue::Boolean(v) => query.bind(*v),
            DbValue::Timestamp(v) => query.bind(v.to_sql_text()),
        };
    }
    query
}

/// Convert a SQLite row using each cell's storage class, not the declared
/// column type.
fn decode_row(row: &SqliteRow) -> Result<DbRow> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut values = Vec::with_capacity(columns.len());

    for index in 0..columns.len() {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            values.push(DbValue::Null);
            continue;
        }
        let storage = raw.type_info().name().to_ascii_uppercase();
        let value = match storage.as_str() {
            "INTEGER" | "BIGINT" | "INT8" | "BOOLEAN" => DbValue::Integer(row.try_get_unchecked(index)?),
            "REAL" | "NUMERIC" => DbValue::Real(row.try_get_unchecked(index)?),
            "BLOB" => DbValue::Blob(row.try_get_unchecked(index)?),
            _ => DbValue::Text(row.try_get_unchecked(index)?),
        };
        values.push(value);
    }

    Ok(DbRow::new(columns, values))
}

fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit hash for low-cardinality, stable identification.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}

/// Double-quote an identifier for SQLite.
pub(crate) fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_config_pins_single_connection() {
        let config = StoreConfig::sqlite_memory().with_max_connections(8);
        assert_eq!(config.max_connections, 1);
        assert!(config.is_memory());

        let file = StoreConfig::sqlite("/tmp/drift.db").with_max_connections(3);
        assert_eq!(file.url, "sqlite:/tmp/drift.db?mode=rwc");
        assert_eq!(file.max_connections, 3);
    }

    #[test]
    fn env_config_falls_back_to_memory() {
        let config = StoreConfig::from_vars(None, None).unwrap();
        assert_eq!(config, StoreConfig::sqlite_memory());

        let blank = StoreConfig::from_vars(Some("  ".to_string()), Some("4".to_string())).unwrap();
        assert!(blank.is_memory());
        assert_eq!(blank.max_connections, 1);
    }

    #[test]
    fn env_config_reads_url_and_pool_size() {
        let config = StoreConfig::from_vars(
            Some(" sqlite:/tmp/env.db?mode=rwc ".to_string()),
            Some(" 3 ".to_string()),
        )
        .unwrap();
        assert_eq!(config.url, "sqlite:/tmp/env.db?mode=rwc");
        assert_eq!(config.max_connections, 3);

        let err = StoreConfig::from_vars(None, Some("many".to_string())).unwrap_err();
        assert!(matches!(err, DbError::InvalidState(ref msg) if msg.contains(MAX_CONNECTIONS_ENV)));
    }

    #[tokio::test]
    async fn env_config_from_process_environment() {
        std::env::remove_var(DATABASE_URL_ENV);
        std::env::remove_var(MAX_CONNECTIONS_ENV);
        let config = StoreConfig::from_env().unwrap();
        assert!(config.is_memory());
        let store = Store::connect(&config).await.unwrap();
        store.close().await;
    }

    #[test]
    fn config_deserializes_with_default_pool_size() {
        let config: StoreConfig = serde_json::from_str(r#"{"url":"sqlite:a.db"}"#).unwrap();
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn fetch_rows_decodes_storage_classes() {
        let store = Store::open_memory().await.unwrap();
        store
            .execute_batch("CREATE TABLE t (i INTEGER, r REAL, s TEXT, b BLOB, n TEXT)")
            .await
            .unwrap();
        store
            .execute(
                "INSERT INTO t (i, r, s, b, n) VALUES (?, ?, ?, ?, ?)",
                &[
                    DbValue::from(42_i64),
                    DbValue::from(1.5),
                    DbValue::from("hi"),
                    DbValue::from(vec![1_u8, 2]),
                    DbValue::Null,
                ],
            )
            .await
            .unwrap();

        let rows = store.fetch_rows("SELECT * FROM t").await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.column_names(), ["i", "r", "s", "b", "n"]);
        assert_eq!(row.get_raw_by_name("i"), Some(&DbValue::Integer(42)));
        assert_eq!(row.get_raw_by_name("r"), Some(&DbValue::Real(1.5)));
        assert_eq!(row.get_raw_by_name("s"), Some(&DbValue::Text("hi".to_string())));
        assert_eq!(row.get_raw_by_name("b"), Some(&DbValue::Blob(vec![1, 2])));
        assert_eq!(row.get_raw_by_name("n"), Some(&DbValue::Null));
    }

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let config = StoreConfig::from_url("postgres://nowhere/db");
        let err = Store::connect(&config).await.unwrap_err();
        assert!(matches!(err, DbError::StoreConnection(_)));
    }
}
