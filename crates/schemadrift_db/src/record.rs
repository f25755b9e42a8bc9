//! Record shapes and their static field tables.
//!
//! A field table is the explicit association of column name → setter for one
//! record type. `RecordMapper` resolves it into a lookup index once, so rows
//! are never bound by reflection.

use serde::Serialize;

use crate::value::{ConversionError, DbTimestamp, DbValue, FromDbValue};

/// Writes one converted value into a record.
pub type Assign<R> = fn(&mut R, &DbValue) -> std::result::Result<(), ConversionError>;

/// One named, settable field of a record shape.
pub struct Field<R> {
    pub name: &'static str,
    pub assign: Assign<R>,
}

impl<R> Field<R> {
    pub const fn new(name: &'static str, assign: Assign<R>) -> Self {
        Self { name, assign }
    }
}

impl<R> Clone for Field<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Field<R> {}

impl<R> std::fmt::Debug for Field<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

/// A record type that rows of `TABLE` can be mapped onto.
///
/// Fields the row does not supply keep their `Default` value.
pub trait MappedRecord: Default + Sized + 'static {
    /// Type name used in mapping errors.
    const RECORD_NAME: &'static str;
    /// Table the record is read from.
    const TABLE: &'static str;

    fn fields() -> &'static [Field<Self>];
}

fn set<T: FromDbValue>(slot: &mut T, value: &DbValue) -> std::result::Result<(), ConversionError> {
    *slot = T::from_db_value(value)?;
    Ok(())
}

/// A user as known to code deployed before `phone_number` existed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: u64,
    pub full_name: Option<String>,
    pub address: Option<String>,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

const USER_FIELDS: &[Field<User>] = &[
    Field::<User>::new("id", |u, v| set(&mut u.id, v)),
    Field::<User>::new("full_name", |u, v| set(&mut u.full_name, v)),
    Field::<User>::new("address", |u, v| set(&mut u.address, v)),
    Field::<User>::new("created_at", |u, v| set(&mut u.created_at, v)),
    Field::<User>::new("updated_at", |u, v| set(&mut u.updated_at, v)),
];

impl MappedRecord for User {
    const RECORD_NAME: &'static str = "User";
    const TABLE: &'static str = "users";

    fn fields() -> &'static [Field<Self>] {
        USER_FIELDS
    }
}

/// A user as known to code deployed after `phone_number` was added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserWithPhone {
    pub id: u64,
    pub full_name: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

const USER_WITH_PHONE_FIELDS: &[Field<UserWithPhone>] = &[
    Field::<UserWithPhone>::new("id", |u, v| set(&mut u.id, v)),
    Field::<UserWithPhone>::new("full_name", |u, v| set(&mut u.full_name, v)),
    Field::<UserWithPhone>::new("address", |u, v| set(&mut u.address, v)),
    Field::<UserWithPhone>::new("phone_number", |u, v| set(&mut u.phone_number, v)),
    Field::<UserWithPhone>::new("created_at", |u, v| set(&mut u.created_at, v)),
    Field::<UserWithPhone>::new("updated_at", |u, v| set(&mut u.updated_at, v)),
];

impl MappedRecord for UserWithPhone {
    const RECORD_NAME: &'static str = "UserWithPhone";
    const TABLE: &'static str = "users";

    fn fields() -> &'static [Field<Self>] {
        USER_WITH_PHONE_FIELDS
    }
}

impl From<UserWithPhone> for User {
    fn from(user: UserWithPhone) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            address: user.address,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
