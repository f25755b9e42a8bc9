//! Row mapping across live schema migrations.
//!
//! An additive migration (`ALTER TABLE users ADD COLUMN phone_number`) can
//! land while instances built against the old schema are still serving
//! reads. Whether those instances survive depends on how they map rows:
//! a strict mapper fails on the unknown column, a lenient one drops it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use schemadrift_db::{Direction, MappingPolicy, MigrationStep, QuerySession, Store, StoreConfig, TableDefinition, User};
//!
//! let store = Store::connect(&StoreConfig::sqlite_memory()).await?;
//! let mut snapshot = store.bootstrap(&TableDefinition::users()?).await?;
//!
//! let step = MigrationStep::add_phone_number();
//! snapshot.apply(&store, &step, Direction::Up).await?;
//!
//! // Old code, strict: fails with UnmappedColumn("phone_number").
//! let err = QuerySession::new(&store).list_all::<User>(MappingPolicy::Strict).await;
//! // Old code, lenient: still works.
//! let users = QuerySession::new(&store).list_all::<User>(MappingPolicy::Lenient).await?;
//! ```

mod error;
mod mapper;
mod migration;
mod record;
mod schema;
mod session;
mod store;
mod value;

pub use error::{DbError, Result};
pub use mapper::{MappingPolicy, RecordMapper};
pub use migration::{Direction, MigrationStep};
pub use record::{Assign, Field, MappedRecord, User, UserWithPhone};
pub use schema::{seed_demo_user, ColumnDefinition, SchemaSnapshot, TableDefinition, DEMO_TIMESTAMP};
pub use session::QuerySession;
pub use store::{Store, StoreConfig, DATABASE_URL_ENV, MAX_CONNECTIONS_ENV};
pub use value::{ConversionError, DbRow, DbTimestamp, DbValue, FromDbValue};
