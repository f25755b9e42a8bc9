//! Command implementations.

pub mod output;

use std::path::Path;

use anyhow::{Context, Result};
use schemadrift_db::{
    seed_demo_user, DbError, Direction, MappedRecord, MappingPolicy, MigrationStep, QuerySession,
    RecordMapper, SchemaSnapshot, Store, TableDefinition, User, UserWithPhone,
};
use tracing::info;

use output::{opt, print_json, print_table};

/// Create the table. The `users` table also gets the demonstration row.
pub async fn init(store: &Store, schema: Option<&Path>) -> Result<()> {
    let definition = match schema {
        Some(path) => TableDefinition::load(path)
            .with_context(|| format!("Failed to load table definition {}", path.display()))?,
        None => TableDefinition::users()?,
    };
    let snapshot = store.bootstrap(&definition).await?;

    let status = if definition.name == User::TABLE {
        let seeded = seed_demo_user(store).await?;
        info!(table = snapshot.table(), seeded, "Initialized");
        if seeded { "seeded demo row" } else { "demo row already present" }
    } else {
        info!(table = snapshot.table(), "Initialized without demo row");
        "no demo row for this table"
    };
    println!("{}: {} ({})", snapshot.table(), snapshot.columns().join(", "), status);
    Ok(())
}

/// List users as either the old or the new code version would.
pub async fn list(store: &Store, policy: MappingPolicy, with_phone: bool, json: bool) -> Result<()> {
    let session = QuerySession::new(store);
    if with_phone {
        let users = session.list_all::<UserWithPhone>(policy).await?;
        if json {
            return print_json(&users);
        }
        let rows = users
            .iter()
            .map(|u| {
                vec![
                    u.id.to_string(),
                    opt(&u.full_name),
                    opt(&u.address),
                    opt(&u.phone_number),
                    u.created_at.to_string(),
                    u.updated_at.to_string(),
                ]
            })
            .collect();
        print_table(
            &["id", "full_name", "address", "phone_number", "created_at", "updated_at"],
            rows,
        );
    } else {
        let users = session.list_all::<User>(policy).await?;
        if json {
            return print_json(&users);
        }
        let rows = users
            .iter()
            .map(|u| {
                vec![
                    u.id.to_string(),
                    opt(&u.full_name),
                    opt(&u.address),
                    u.created_at.to_string(),
                    u.updated_at.to_string(),
                ]
            })
            .collect();
        print_table(&["id", "full_name", "address", "created_at", "updated_at"], rows);
    }
    Ok(())
}

/// Apply one direction of the bundled migration.
pub async fn migrate(store: &Store, direction: Direction) -> Result<()> {
    let step = MigrationStep::add_phone_number();
    let mut snapshot = SchemaSnapshot::capture(store, "users").await?;
    snapshot.apply(store, &step, direction).await?;
    println!("{} {}: {}", step.name, direction, snapshot.columns().join(", "));
    Ok(())
}

/// Show live columns and which of them the old record would not understand.
pub async fn columns(store: &Store, json: bool) -> Result<()> {
    let snapshot = SchemaSnapshot::capture(store, "users").await?;
    let drift = snapshot.drift_from(&RecordMapper::<User>::strict().field_names());
    if json {
        return print_json(&serde_json::json!({
            "table": snapshot.table(),
            "columns": snapshot.columns(),
            "unknown_to_user": drift,
        }));
    }
    let rows = snapshot
        .columns()
        .iter()
        .map(|c| vec![c.clone(), if drift.contains(c) { "no" } else { "yes" }.to_string()])
        .collect();
    print_table(&["column", "known to User"], rows);
    Ok(())
}

/// Suggestions printed after a failed command.
pub fn hints(err: &anyhow::Error) -> Vec<String> {
    match err.downcast_ref::<DbError>() {
        Some(DbError::UnmappedColumn { column, .. }) => vec![
            format!("The store has a column ({}) this record version does not declare", column),
            "TRY: schemadrift list --lenient".to_string(),
            "TRY: schemadrift list --with-phone".to_string(),
        ],
        Some(DbError::Migration { direction: Direction::Up, .. }) => vec![
            "TRY: schemadrift columns   (the column may already exist)".to_string(),
        ],
        Some(DbError::Migration { direction: Direction::Down, .. }) => vec![
            "TRY: schemadrift columns   (the column may already be gone)".to_string(),
        ],
        Some(DbError::NotFound(_)) => vec!["TRY: schemadrift init".to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_error_suggests_lenient_listing() {
        let err = anyhow::Error::new(DbError::UnmappedColumn {
            column: "phone_number".to_string(),
            record: "User",
        });
        let hints = hints(&err);
        assert!(hints[0].contains("phone_number"));
        assert!(hints.iter().any(|h| h.contains("--lenient")));
    }

    #[tokio::test]
    async fn commands_run_against_memory_store() {
        let store = Store::open_memory().await.unwrap();
        init(&store, None).await.unwrap();
        migrate(&store, Direction::Up).await.unwrap();

        let err = list(&store, MappingPolicy::Strict, false, true).await.unwrap_err();
        assert!(!hints(&err).is_empty());
        list(&store, MappingPolicy::Lenient, false, true).await.unwrap();
        list(&store, MappingPolicy::Strict, true, true).await.unwrap();

        migrate(&store, Direction::Down).await.unwrap();
        columns(&store, true).await.unwrap();
    }

    #[tokio::test]
    async fn init_with_other_table_skips_demo_row() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("audit.json");
        std::fs::write(
            &path,
            r#"{"name":"audit_log","columns":[
                {"name":"id","sql_type":"INTEGER PRIMARY KEY","nullable":false},
                {"name":"message","sql_type":"TEXT"}
            ]}"#,
        )
        .unwrap();

        let store = Store::open_memory().await.unwrap();
        init(&store, Some(&path)).await.unwrap();

        let snapshot = SchemaSnapshot::capture(&store, "audit_log").await.unwrap();
        assert_eq!(snapshot.columns(), ["id", "message"]);
        let err = SchemaSnapshot::capture(&store, "users").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }
}
