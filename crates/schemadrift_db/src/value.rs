//! Raw values as they come back from the store, and conversion into the
//! semantic types record fields declare.

use std::fmt;

/// Text layout SQLite uses for `DATETIME` / `CURRENT_TIMESTAMP`.
const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A raw value could not be converted to the requested type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn null_into(type_name: &str) -> Self {
        Self::new(format!(
            "{} field is NULL - use Option<{}> for nullable columns",
            type_name, type_name
        ))
    }

    fn expected(type_name: &str, found: &DbValue) -> Self {
        Self::new(format!("expected {}, found {}", type_name, found.kind()))
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConversionError {}

/// Timestamp wrapper for database values. Defaults to the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DbTimestamp {
    inner: chrono::DateTime<chrono::Utc>,
}

impl DbTimestamp {
    /// Parse an RFC3339 timestamp string.
    pub fn from_rfc3339(value: &str) -> Result<Self, ConversionError> {
        chrono::DateTime::parse_from_rfc3339(value)
            .map(|dt| Self {
                inner: dt.with_timezone(&chrono::Utc),
            })
            .map_err(|e| ConversionError::new(format!("invalid timestamp {:?}: {}", value, e)))
    }

    /// Parse `YYYY-MM-DD HH:MM:SS[.fff]` as UTC.
    pub fn from_sql_text(value: &str) -> Result<Self, ConversionError> {
        chrono::NaiveDateTime::parse_from_str(value, SQL_DATETIME_FORMAT)
            .map(|naive| Self {
                inner: naive.and_utc(),
            })
            .map_err(|e| ConversionError::new(format!("invalid timestamp {:?}: {}", value, e)))
    }

    /// Parse either RFC3339 or the SQL datetime layout.
    pub fn parse(value: &str) -> Result<Self, ConversionError> {
        Self::from_rfc3339(value).or_else(|_| Self::from_sql_text(value))
    }

    /// RFC3339 string representation.
    pub fn to_rfc3339(&self) -> String {
        self.inner.to_rfc3339()
    }

    /// SQL datetime text, the layout written back to the store.
    pub fn to_sql_text(&self) -> String {
        self.inner.format(SQL_DATETIME_FORMAT).to_string()
    }
}

impl fmt::Display for DbTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sql_text())
    }
}

impl serde::Serialize for DbTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> serde::Deserialize<'de> for DbTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
        DbTimestamp::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Value type for query parameters and row cells.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    Timestamp(DbTimestamp),
}

impl DbValue {
    /// Short name of the value's kind, used in conversion messages.
    pub fn kind(&self) -> &'static str {
        match self {
            DbValue::Null => "NULL",
            DbValue::Integer(_) => "integer",
            DbValue::Real(_) => "real",
            DbValue::Text(_) => "text",
            DbValue::Blob(_) => "blob",
            DbValue::Boolean(_) => "boolean",
            DbValue::Timestamp(_) => "timestamp",
        }
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Integer(v as i64)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Integer(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Real(v)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Boolean(v)
    }
}

impl From<DbTimestamp> for DbValue {
    fn from(v: DbTimestamp) -> Self {
        DbValue::Timestamp(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        DbValue::Blob(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DbValue::Null,
        }
    }
}

/// Row data from a query result, columns in the order the store returned them.
#[derive(Debug, Clone, PartialEq)]
pub struct DbRow {
    columns: Vec<String>,
    values: Vec<DbValue>,
}

impl DbRow {
    /// Create a new row with column names and values.
    pub fn new(columns: Vec<String>, values: Vec<DbValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, DbValue)>,
        S: Into<String>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .unzip();
        Self { columns, values }
    }

    /// Get a value by column name. Matching is exact and case-sensitive.
    pub fn get_by_name<T: FromDbValue>(&self, name: &str) -> Result<T, ConversionError> {
        let value = self
            .get_raw_by_name(name)
            .ok_or_else(|| ConversionError::new(format!("column '{}' not found", name)))?;
        T::from_db_value(value)
    }

    pub fn get_raw_by_name(&self, name: &str) -> Option<&DbValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|index| self.values.get(index))
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the column names.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Iterate `(column, value)` pairs in store order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DbValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Trait for converting from DbValue.
pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self, ConversionError>;
}

impl FromDbValue for i64 {
    fn from_db_value(value: &DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Integer(v) => Ok(*v),
            DbValue::Null => Err(ConversionError::null_into("i64")),
            other => Err(ConversionError::expected("integer", other)),
        }
    }
}

impl FromDbValue for i32 {
    fn from_db_value(value: &DbValue) -> Result<Self, ConversionError> {
        let wide = i64::from_db_value(value).map_err(|_| match value {
            DbValue::Null => ConversionError::null_into("i32"),
            other => ConversionError::expected("integer", other),
        })?;
        i32::try_from(wide).map_err(|_| ConversionError::new(format!("{} out of range for i32", wide)))
    }
}

impl FromDbValue for u64 {
    fn from_db_value(value: &DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Integer(v) => u64::try_from(*v)
                .map_err(|_| ConversionError::new(format!("{} out of range for u64", v))),
            DbValue::Null => Err(ConversionError::null_into("u64")),
            other => Err(ConversionError::expected("integer", other)),
        }
    }
}

impl FromDbValue for f64 {
    fn from_db_value(value: &DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Real(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v as f64),
            DbValue::Null => Err(ConversionError::null_into("f64")),
            other => Err(ConversionError::expected("real", other)),
        }
    }
}

impl FromDbValue for DbTimestamp {
    fn from_db_value(value: &DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Timestamp(v) => Ok(v.clone()),
            DbValue::Text(v) => DbTimestamp::parse(v),
            DbValue::Null => Err(ConversionError::null_into("DbTimestamp")),
            other => Err(ConversionError::expected("timestamp", other)),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Text(v) => Ok(v.clone()),
            DbValue::Null => Err(ConversionError::null_into("String")),
            other => Err(ConversionError::expected("text", other)),
        }
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: &DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Boolean(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v != 0),
            DbValue::Null => Err(ConversionError::null_into("bool")),
            other => Err(ConversionError::expected("boolean", other)),
        }
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Null => Ok(None),
            _ => T::from_db_value(value).map(Some),
        }
    }
}

impl FromDbValue for Vec<u8> {
    fn from_db_value(value: &DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Blob(v) => Ok(v.clone()),
            DbValue::Null => Err(ConversionError::null_into("Vec<u8>")),
            other => Err(ConversionError::expected("blob", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_parses_sql_and_rfc3339_layouts() {
        let sql = DbTimestamp::parse("2022-06-14 11:36:41").unwrap();
        let rfc = DbTimestamp::parse("2022-06-14T11:36:41Z").unwrap();
        assert_eq!(sql, rfc);
        assert_eq!(sql.to_sql_text(), "2022-06-14 11:36:41");
    }

    #[test]
    fn timestamp_rejects_garbage() {
        let err = DbTimestamp::parse("yesterday").unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"));
    }

    #[test]
    fn timestamp_default_is_epoch() {
        assert_eq!(DbTimestamp::default().to_sql_text(), "1970-01-01 00:00:00");
    }

    #[test]
    fn null_into_required_type_fails() {
        let err = String::from_db_value(&DbValue::Null).unwrap_err();
        assert!(err.to_string().contains("Option<String>"));
        assert_eq!(Option::<String>::from_db_value(&DbValue::Null).unwrap(), None);
    }

    #[test]
    fn negative_integer_is_not_u64() {
        assert!(u64::from_db_value(&DbValue::Integer(-1)).is_err());
        assert_eq!(u64::from_db_value(&DbValue::Integer(7)).unwrap(), 7);
    }

    #[test]
    fn narrow_integers_check_range() {
        assert_eq!(i32::from_db_value(&DbValue::Integer(-5)).unwrap(), -5);
        let err = i32::from_db_value(&DbValue::Integer(i64::from(i32::MAX) + 1)).unwrap_err();
        assert!(err.to_string().contains("out of range for i32"));
        let err = i32::from_db_value(&DbValue::from("5")).unwrap_err();
        assert!(err.to_string().contains("expected integer"));
        assert!(i32::from_db_value(&DbValue::Null).is_err());
    }

    #[test]
    fn real_and_boolean_conversions() {
        assert_eq!(f64::from_db_value(&DbValue::Real(2.5)).unwrap(), 2.5);
        assert_eq!(f64::from_db_value(&DbValue::Integer(3)).unwrap(), 3.0);
        assert!(f64::from_db_value(&DbValue::from("2.5")).is_err());

        assert!(bool::from_db_value(&DbValue::Boolean(true)).unwrap());
        assert!(bool::from_db_value(&DbValue::Integer(1)).unwrap());
        assert!(!bool::from_db_value(&DbValue::Integer(0)).unwrap());
        assert_eq!(Option::<bool>::from_db_value(&DbValue::Null).unwrap(), None);
    }

    #[test]
    fn row_lookup_is_case_sensitive() {
        let row = DbRow::from_pairs([("full_name", DbValue::from("John Doe"))]);
        assert_eq!(row.get_by_name::<String>("full_name").unwrap(), "John Doe");
        assert!(row.get_by_name::<String>("Full_Name").is_err());
    }
}
