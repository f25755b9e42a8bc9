//! Full-table reads mapped through a `RecordMapper`.

use tracing::debug;

use crate::error::Result;
use crate::mapper::{MappingPolicy, RecordMapper};
use crate::record::MappedRecord;
use crate::store::{quote_ident, Store};

/// Reads records through a borrowed store handle.
#[derive(Debug, Clone, Copy)]
pub struct QuerySession<'a> {
    store: &'a Store,
}

impl<'a> QuerySession<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// `SELECT *` from `R::TABLE`, mapping rows in the order received.
    ///
    /// All or nothing: the first row that fails to map aborts the call.
    pub async fn list_all<R: MappedRecord>(self, policy: MappingPolicy) -> Result<Vec<R>> {
        let mapper = RecordMapper::<R>::new(policy);
        self.list_with(&mapper).await
    }

    /// Same as `list_all`, reusing an existing mapper.
    pub async fn list_with<R: MappedRecord>(self, mapper: &RecordMapper<R>) -> Result<Vec<R>> {
        let sql = format!("SELECT * FROM {}", quote_ident(R::TABLE));
        let rows = self.store.fetch_rows(&sql).await?;
        let records = mapper.map_rows(&rows)?;
        debug!(
            record = R::RECORD_NAME,
            policy = %mapper.policy(),
            rows = records.len(),
            "Listed records"
        );
        Ok(records)
    }

    pub async fn list_all_strict<R: MappedRecord>(self) -> Result<Vec<R>> {
        self.list_all(MappingPolicy::Strict).await
    }

    pub async fn list_all_lenient<R: MappedRecord>(self) -> Result<Vec<R>> {
        self.list_all(MappingPolicy::Lenient).await
    }
}
