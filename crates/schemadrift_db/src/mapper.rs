//! Row → record mapping under a strictness policy.
//!
//! `Strict` refuses any row column the record does not declare, so schema
//! drift surfaces as an error on the first read after an additive migration.
//! `Lenient` drops such columns. Both match columns by exact name, never by
//! position, and both fail when a matched value cannot be converted.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};
use crate::record::{Assign, MappedRecord};
use crate::value::DbRow;

/// How to treat row columns the target record does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingPolicy {
    /// Fail with `UnmappedColumn` on the first unknown column.
    #[default]
    Strict,
    /// Ignore unknown columns.
    Lenient,
}

impl MappingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingPolicy::Strict => "strict",
            MappingPolicy::Lenient => "lenient",
        }
    }
}

impl fmt::Display for MappingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps rows onto `R`. Build once per record shape and reuse.
pub struct RecordMapper<R: MappedRecord> {
    policy: MappingPolicy,
    setters: HashMap<&'static str, Assign<R>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: MappedRecord> RecordMapper<R> {
    pub fn new(policy: MappingPolicy) -> Self {
        let setters = R::fields()
            .iter()
            .map(|field| (field.name, field.assign))
            .collect();
        Self {
            policy,
            setters,
            _record: PhantomData,
        }
    }

    pub fn strict() -> Self {
        Self::new(MappingPolicy::Strict)
    }

    pub fn lenient() -> Self {
        Self::new(MappingPolicy::Lenient)
    }

    pub fn policy(&self) -> MappingPolicy {
        self.policy
    }

    /// Field names of `R` in declaration order.
    pub fn field_names(&self) -> Vec<&'static str> {
        R::fields().iter().map(|field| field.name).collect()
    }

    /// Map one row. Columns are visited in the order the store returned them.
    pub fn map_row(&self, row: &DbRow) -> Result<R> {
        let mut record = R::default();

        for (column, value) in row.iter() {
            let Some(assign) = self.setters.get(column) else {
                match self.policy {
                    MappingPolicy::Strict => {
                        return Err(DbError::UnmappedColumn {
                            column: column.to_string(),
                            record: R::RECORD_NAME,
                        })
                    }
                    MappingPolicy::Lenient => continue,
                }
            };

            assign(&mut record, value).map_err(|e| DbError::TypeMismatch {
                column: column.to_string(),
                record: R::RECORD_NAME,
                reason: e.to_string(),
            })?;
        }

        Ok(record)
    }

    /// Map every row in order, stopping at the first failure.
    pub fn map_rows<'a>(&self, rows: impl IntoIterator<Item = &'a DbRow>) -> Result<Vec<R>> {
        rows.into_iter().map(|row| self.map_row(row)).collect()
    }
}

impl<R: MappedRecord> Default for RecordMapper<R> {
    fn default() -> Self {
        Self::new(MappingPolicy::default())
    }
}

impl<R: MappedRecord> fmt::Debug for RecordMapper<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordMapper")
            .field("record", &R::RECORD_NAME)
            .field("policy", &self.policy)
            .finish()
    }
}
