//! Application instances sharing one database file while a migration runs
//! from another, uncoordinated handle.
//!
//! Readers hold a single pooled connection, so the connection that cached the
//! old schema is the one that serves the read after the migration.

use schemadrift_db::{
    seed_demo_user, DbError, MappingPolicy, MigrationStep, QuerySession, SchemaSnapshot, Store,
    StoreConfig, TableDefinition, User, UserWithPhone,
};
use tempfile::TempDir;

async fn open(path: &str) -> Store {
    Store::connect(&StoreConfig::sqlite(path).with_max_connections(1))
        .await
        .unwrap()
}

async fn seeded_file(tmp: &TempDir) -> (String, Store) {
    let path = tmp.path().join("auth.db");
    let path = path.to_str().unwrap().to_string();
    let migrator = open(&path).await;
    migrator.bootstrap(&TableDefinition::users().unwrap()).await.unwrap();
    assert!(seed_demo_user(&migrator).await.unwrap());
    (path, migrator)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_old_and_new_instances_across_migration() {
    let tmp = TempDir::new().unwrap();
    let (path, migrator) = seeded_file(&tmp).await;

    let old_strict = open(&path).await;
    let old_lenient = open(&path).await;
    let new_version = open(&path).await;

    // Warm every instance before the schema changes.
    assert_eq!(QuerySession::new(&old_strict).list_all_strict::<User>().await.unwrap().len(), 1);
    assert_eq!(QuerySession::new(&old_lenient).list_all_lenient::<User>().await.unwrap().len(), 1);
    assert_eq!(QuerySession::new(&new_version).list_all_strict::<UserWithPhone>().await.unwrap().len(), 1);

    MigrationStep::add_phone_number().up(&migrator).await.unwrap();

    let strict = QuerySession::new(&old_strict).list_all::<User>(MappingPolicy::Strict);
    let lenient = QuerySession::new(&old_lenient).list_all::<User>(MappingPolicy::Lenient);
    let newer = QuerySession::new(&new_version).list_all::<UserWithPhone>(MappingPolicy::Strict);
    let (strict, lenient, newer) = tokio::join!(strict, lenient, newer);

    let err = strict.unwrap_err();
    assert!(err.is_schema_drift(), "{err}");

    let lenient = lenient.unwrap();
    assert_eq!(lenient.len(), 1);
    assert_eq!(lenient[0].full_name.as_deref(), Some("John Doe"));

    let newer = newer.unwrap();
    assert_eq!(newer.len(), 1);
    assert_eq!(newer[0].address.as_deref(), Some("Singapore"));
    assert_eq!(newer[0].phone_number, None);

    MigrationStep::add_phone_number().down(&migrator).await.unwrap();
    assert_eq!(QuerySession::new(&old_strict).list_all_strict::<User>().await.unwrap().len(), 1);
    assert_eq!(QuerySession::new(&new_version).list_all_strict::<UserWithPhone>().await.unwrap().len(), 1);

    for store in [migrator, old_strict, old_lenient, new_version] {
        store.close().await;
    }
}

#[tokio::test]
async fn test_stale_reader_sees_column_added_elsewhere() {
    let tmp = TempDir::new().unwrap();
    let (path, migrator) = seeded_file(&tmp).await;
    let reader = open(&path).await;
    let session = QuerySession::new(&reader);

    assert_eq!(session.list_all_strict::<User>().await.unwrap().len(), 1);

    MigrationStep::add_phone_number().up(&migrator).await.unwrap();

    let err = session.list_all_strict::<User>().await.unwrap_err();
    match err {
        DbError::UnmappedColumn { column, record } => {
            assert_eq!(column, "phone_number");
            assert_eq!(record, "User");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Same connection stays usable after the strict failure.
    let users = session.list_all_lenient::<User>().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].full_name.as_deref(), Some("John Doe"));

    let users = session.list_all_strict::<UserWithPhone>().await.unwrap();
    assert_eq!(users.len(), 1);

    let snapshot = SchemaSnapshot::capture(&reader, "users").await.unwrap();
    assert!(snapshot.contains("phone_number"));

    reader.close().await;
    migrator.close().await;
}

#[tokio::test]
async fn test_stale_reader_sees_column_dropped_elsewhere() {
    let tmp = TempDir::new().unwrap();
    let (path, migrator) = seeded_file(&tmp).await;
    let step = MigrationStep::add_phone_number();
    step.up(&migrator).await.unwrap();

    let reader = open(&path).await;
    let session = QuerySession::new(&reader);
    assert!(session.list_all_strict::<User>().await.is_err());

    step.down(&migrator).await.unwrap();

    let users = session.list_all_strict::<User>().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].address.as_deref(), Some("Singapore"));

    reader.close().await;
    migrator.close().await;
}
