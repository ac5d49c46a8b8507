use gatekeep::adapters::sqlite::{
    all_embedded_migrations, database_url, initialize_database, Migrator,
};
use sqlx::Row;

#[tokio::test]
async fn test_database_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".gatekeep/gatekeep.db");
    let pool = initialize_database(&database_url(&path.display().to_string()), None)
        .await
        .expect("failed to initialize database");

    assert!(path.exists());
    assert!(!pool.is_closed());
    pool.close().await;
    assert!(pool.is_closed());
}

#[tokio::test]
async fn test_migrations_create_all_tables() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(&dir.path().join("gatekeep.db").display().to_string());
    let pool = initialize_database(&url, None).await.unwrap();

    let rows = sqlx::query(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    let tables: Vec<String> = rows.iter().map(|r| r.get("name")).collect();

    for table in [
        "captures",
        "drift_records",
        "feedback",
        "fixtures",
        "human_checkpoints",
        "improvement_cycles",
        "leases",
        "output_contracts",
        "regression_runs",
        "schema_migrations",
    ] {
        assert!(tables.iter().any(|t| t == table), "missing table {table}: {tables:?}");
    }
}

#[tokio::test]
async fn test_reopening_applies_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(&dir.path().join("gatekeep.db").display().to_string());
    let pool = initialize_database(&url, None).await.unwrap();
    pool.close().await;

    let pool = initialize_database(&url, None).await.unwrap();
    let migrator = Migrator::new(pool.clone());
    let latest = all_embedded_migrations()
        .iter()
        .map(|m| m.version)
        .max()
        .unwrap();
    assert_eq!(migrator.get_current_version().await.unwrap(), latest);
    assert_eq!(
        migrator
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .unwrap(),
        0
    );
}
