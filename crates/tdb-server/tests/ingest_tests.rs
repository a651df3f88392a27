//! Integration tests for CSV ingestion and schema bootstrap

mod helpers;

use helpers::{exec, numbered_records, people_gateway, rows, write_csv, NUMBERED_HEADER};
use std::time::Duration;
use tdb_common::SqlValue;
use tdb_server::db::load_schemas;
use tdb_server::ingest::{self, BatchIngestor, BATCH_SIZE};

#[tokio::test]
async fn test_large_file_is_flushed_in_batches() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = helpers::memory_gateway().await;
    exec(&gateway, "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT, even BOOLEAN)").await;
    let path = write_csv(dir.path(), "items.csv", NUMBERED_HEADER, &numbered_records(1203));

    let report = BatchIngestor::new(gateway.clone(), &path).ingest().await.unwrap();

    assert_eq!(report.table, "items");
    assert_eq!(report.rows_read, 1203);
    assert_eq!(report.records, 1203);
    assert_eq!(report.batch_sizes, vec![BATCH_SIZE, BATCH_SIZE, 203]);
    assert_eq!(rows(&gateway, "SELECT id FROM items").await.len(), 1203);

    let last = rows(&gateway, "SELECT id, label, even FROM items WHERE id = 1203").await;
    assert_eq!(last[0]["label"], SqlValue::Text("item-1203".to_string()));
    assert_eq!(last[0]["even"], SqlValue::Boolean(false));
}

#[tokio::test]
async fn test_exact_multiple_has_no_trailing_flush() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = helpers::memory_gateway().await;
    exec(&gateway, "CREATE TABLE items (id INTEGER, label TEXT, even BOOLEAN)").await;
    let path = write_csv(dir.path(), "items.csv", NUMBERED_HEADER, &numbered_records(1000));

    let report = BatchIngestor::new(gateway, &path).ingest().await.unwrap();

    assert_eq!(report.batch_sizes, vec![BATCH_SIZE, BATCH_SIZE]);
    assert_eq!(report.records, 1000);
}

#[tokio::test]
async fn test_header_columns_may_be_reordered() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = people_gateway().await;
    let path = write_csv(
        dir.path(),
        "people.csv",
        "name,active,id",
        &["ada,true,1".to_string(), "alan,false,2".to_string()],
    );

    let report = BatchIngestor::new(gateway.clone(), &path).ingest().await.unwrap();
    assert_eq!(report.records, 2);

    let found = rows(&gateway, "SELECT id, name FROM people ORDER BY id").await;
    assert_eq!(found[0]["name"], SqlValue::Text("ada".to_string()));
    assert_eq!(found[1]["id"], SqlValue::Integer(2));
}

#[tokio::test]
async fn test_records_with_wrong_field_count_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = people_gateway().await;
    let path = write_csv(
        dir.path(),
        "people.csv",
        "id,name,active",
        &[
            "1,ada,1".to_string(),
            "2,short".to_string(),
            "3,grace,0".to_string(),
        ],
    );

    let report = BatchIngestor::new(gateway.clone(), &path).ingest().await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.rows_read, 2);
    assert_eq!(report.records, 2);
    assert_eq!(rows(&gateway, "SELECT id FROM people").await.len(), 2);
}

#[tokio::test]
async fn test_failing_rows_do_not_stop_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = people_gateway().await;
    // Duplicate primary key on the second record
    let path = write_csv(
        dir.path(),
        "people.csv",
        "id,name",
        &["1,ada".to_string(), "1,again".to_string(), "2,alan".to_string()],
    );

    let report = BatchIngestor::new(gateway, &path).ingest().await.unwrap();

    assert_eq!(report.rows_read, 3);
    assert_eq!(report.records, 2);
}

#[tokio::test]
async fn test_empty_and_header_only_files_insert_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = people_gateway().await;
    let empty = dir.path().join("people.csv");
    std::fs::write(&empty, "").unwrap();
    let header_only = write_csv(dir.path(), "people2.csv", "id,name", &[]);

    let report = BatchIngestor::new(gateway.clone(), &empty).ingest().await.unwrap();
    assert_eq!(report.records, 0);
    assert!(report.batch_sizes.is_empty());

    let report = BatchIngestor::new(gateway, &header_only).ingest().await.unwrap();
    assert_eq!(report.records, 0);
    assert!(report.batch_sizes.is_empty());
}

#[tokio::test]
async fn test_missing_file_is_an_error() {
    let gateway = people_gateway().await;

    let result = BatchIngestor::new(gateway, "/no/such/people.csv").ingest().await;

    assert!(matches!(result, Err(ingest::IngestError::Open { .. })));
}

#[tokio::test]
async fn test_unknown_table_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = people_gateway().await;
    let path = write_csv(dir.path(), "ghosts.csv", "id", &["1".to_string()]);

    let report = BatchIngestor::new(gateway, &path).ingest().await.unwrap();

    assert_eq!(report.records, 0);
    assert_eq!(report.batch_sizes, vec![1]);
}

#[tokio::test]
async fn test_spawn_folder_loads_only_csv_files() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = helpers::memory_gateway().await;
    exec(&gateway, "CREATE TABLE alpha (id INTEGER, label TEXT, even BOOLEAN)").await;
    exec(&gateway, "CREATE TABLE beta (id INTEGER, label TEXT, even BOOLEAN)").await;
    write_csv(dir.path(), "alpha.csv", NUMBERED_HEADER, &numbered_records(10));
    write_csv(dir.path(), "beta.csv", NUMBERED_HEADER, &numbered_records(700));
    write_csv(dir.path(), "notes.txt", NUMBERED_HEADER, &numbered_records(3));

    let handle = ingest::spawn_folder(gateway.clone(), dir.path()).await;
    assert_eq!(handle.len(), 2);

    let mut reports = handle.join().await;
    reports.sort_by(|a, b| a.table.cmp(&b.table));

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].records, 10);
    assert_eq!(reports[1].records, 700);
    assert_eq!(reports[1].batch_sizes, vec![500, 200]);
    assert_eq!(rows(&gateway, "SELECT id FROM beta").await.len(), 700);
}

#[tokio::test]
async fn test_spawn_folder_missing_folder_is_empty() {
    let gateway = helpers::memory_gateway().await;

    let handle = ingest::spawn_folder(gateway, std::path::Path::new("/no/such/folder")).await;

    assert!(handle.is_empty());
    assert!(handle.join().await.is_empty());
}

#[tokio::test]
async fn test_shutdown_waits_for_running_files() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = helpers::memory_gateway().await;
    exec(&gateway, "CREATE TABLE items (id INTEGER, label TEXT, even BOOLEAN)").await;
    write_csv(dir.path(), "items.csv", NUMBERED_HEADER, &numbered_records(50));

    let handle = ingest::spawn_folder(gateway.clone(), dir.path()).await;
    let reports = handle.shutdown(Duration::from_secs(30)).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].records, 50);
}

#[tokio::test]
async fn test_schemas_then_data() {
    let schemas = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    std::fs::write(
        schemas.path().join("schema.sql"),
        "CREATE TABLE cities (name TEXT, population INTEGER);\n\
         CREATE INDEX idx_cities_name ON cities (name);\n",
    )
    .unwrap();
    write_csv(
        data.path(),
        "cities.csv",
        "name,population",
        &["Lisbon,545000".to_string(), "Porto,232000".to_string()],
    );

    let gateway = helpers::memory_gateway().await;
    assert_eq!(load_schemas(&gateway, schemas.path()).await, 2);

    let reports = ingest::spawn_folder(gateway.clone(), data.path()).await.join().await;
    assert_eq!(reports[0].records, 2);

    let found = rows(&gateway, "SELECT population FROM cities WHERE name = 'Porto'").await;
    assert_eq!(found[0]["population"], SqlValue::Integer(232000));
}
