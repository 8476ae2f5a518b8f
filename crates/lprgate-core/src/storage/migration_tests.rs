use super::Storage;

#[test]
fn init_tracks_schema_migrations_and_is_idempotent() {
    let storage = Storage::open_in_memory().expect("open in memory");
    storage.init().expect("first init");
    storage.init().expect("second init");

    for version in [
        "001_plate_logs",
        "002_api_keys",
        "003_plate_logs_search_indexes",
        "004_users",
    ] {
        let applied: i64 = storage
            .conn
            .query_row(
                "SELECT COUNT(1) FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .expect("count migration");
        assert_eq!(applied, 1, "migration {version}");
    }
}

#[test]
fn init_upgrades_legacy_plate_logs_table_without_image_url() {
    let storage = Storage::open_in_memory().expect("open in memory");
    storage
        .conn
        .execute_batch(
            "CREATE TABLE plate_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location_code TEXT NOT NULL,
                camera_id TEXT NOT NULL,
                plate TEXT NOT NULL,
                captured_at INTEGER NOT NULL,
                request_data TEXT NOT NULL DEFAULT '',
                response_data TEXT NOT NULL DEFAULT '',
                response_final TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            );",
        )
        .expect("create legacy table");

    storage.init().expect("init over legacy schema");

    assert!(storage.has_column("plate_logs", "image_url").expect("image_url"));
    assert!(storage.has_column("plate_logs", "accuracy").expect("accuracy"));
    assert!(storage
        .has_column("plate_logs", "transaction_no")
        .expect("transaction_no"));
}

#[test]
fn legacy_upgrade_keeps_rows_and_records_the_migration() {
    let storage = Storage::open_in_memory().expect("open in memory");
    storage
        .conn
        .execute_batch(
            "CREATE TABLE plate_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location_code TEXT NOT NULL,
                camera_id TEXT NOT NULL,
                plate TEXT NOT NULL,
                captured_at INTEGER NOT NULL,
                request_data TEXT NOT NULL DEFAULT '',
                response_data TEXT NOT NULL DEFAULT '',
                response_final TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            );
            INSERT INTO plate_logs (location_code, camera_id, plate, captured_at, created_at)
            VALUES ('LOC1', 'CAM1', 'OLD001', 1, 1);",
        )
        .expect("create legacy table");

    storage.init().expect("init over legacy schema");
    storage.init().expect("second init");

    let loaded = storage
        .get_plate_log(1)
        .expect("load legacy row")
        .expect("legacy row kept");
    assert_eq!(loaded.plate, "OLD001");
    assert_eq!(loaded.image_url, "");
    assert_eq!(loaded.accuracy, "");
    assert!(storage.has_migration("001_plate_logs").expect("migration flag"));
}
