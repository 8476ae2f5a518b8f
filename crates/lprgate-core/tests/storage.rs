use lprgate_core::storage::{now_ts, ApiKey, NewPlateLog, Storage};

fn sample_log(plate: &str, camera_id: &str, created_at: i64) -> NewPlateLog {
    NewPlateLog {
        location_code: "LOC1".to_string(),
        camera_id: camera_id.to_string(),
        transaction_no: Some("TRX-001".to_string()),
        plate: plate.to_string(),
        accuracy: "0.91".to_string(),
        captured_at: created_at,
        request_data: r#"{"camera_id":"CAM1","location_code":"LOC1","mmc":""}"#.to_string(),
        response_data: String::new(),
        response_final: "{}".to_string(),
        image_url: String::new(),
        created_at,
    }
}

#[test]
fn storage_can_insert_and_read_plate_log() {
    let storage = Storage::open_in_memory().expect("open in memory");
    storage.init().expect("init schema");

    let id = storage
        .insert_plate_log(&sample_log("ABC123", "CAM1", now_ts()))
        .expect("insert plate log");
    assert!(id > 0);
    assert_eq!(storage.plate_log_count().expect("count"), 1);

    let loaded = storage
        .get_plate_log(id)
        .expect("load plate log")
        .expect("plate log exists");
    assert_eq!(loaded.plate, "ABC123");
    assert_eq!(loaded.transaction_no.as_deref(), Some("TRX-001"));
    assert_eq!(loaded.image_url, "");
}

#[test]
fn update_request_data_rewrites_only_metadata() {
    let storage = Storage::open_in_memory().expect("open in memory");
    storage.init().expect("init schema");

    let id = storage
        .insert_plate_log(&sample_log("ABC123", "CAM1", now_ts()))
        .expect("insert plate log");
    storage
        .update_plate_log_request_data(id, r#"{"image_url":"http://minio/lpr/a.jpg"}"#)
        .expect("update request data");

    let loaded = storage
        .get_plate_log(id)
        .expect("load plate log")
        .expect("plate log exists");
    assert_eq!(loaded.request_data, r#"{"image_url":"http://minio/lpr/a.jpg"}"#);
    assert_eq!(loaded.plate, "ABC123");
    assert_eq!(loaded.response_final, "{}");
}

#[test]
fn update_request_data_on_missing_row_is_an_error() {
    let storage = Storage::open_in_memory().expect("open in memory");
    storage.init().expect("init schema");

    let err = storage
        .update_plate_log_request_data(42, "{}")
        .expect_err("missing row");
    assert!(matches!(err, rusqlite::Error::QueryReturnedNoRows));
}

#[test]
fn list_plate_logs_filters_and_orders_newest_first() {
    let storage = Storage::open_in_memory().expect("open in memory");
    storage.init().expect("init schema");

    let base = now_ts();
    storage
        .insert_plate_log(&sample_log("AAA111", "CAM1", base - 20))
        .expect("insert first");
    storage
        .insert_plate_log(&sample_log("BBB222", "CAM2", base - 10))
        .expect("insert second");
    storage
        .insert_plate_log(&sample_log("AAA111", "CAM2", base))
        .expect("insert third");

    let all = storage.list_plate_logs(None, 10).expect("list all");
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].created_at, base);

    let by_plate = storage
        .list_plate_logs(Some("plate:aaa111"), 10)
        .expect("list by plate");
    assert_eq!(by_plate.len(), 2);
    assert!(by_plate.iter().all(|log| log.plate == "AAA111"));

    let by_camera = storage
        .list_plate_logs(Some("camera:CAM2"), 10)
        .expect("list by camera");
    assert_eq!(by_camera.len(), 2);

    let free_text = storage
        .list_plate_logs(Some("BBB"), 10)
        .expect("list free text");
    assert_eq!(free_text.len(), 1);

    let limited = storage.list_plate_logs(None, 1).expect("list limited");
    assert_eq!(limited.len(), 1);
}

#[test]
fn api_key_lookup_by_hash() {
    let storage = Storage::open_in_memory().expect("open in memory");
    storage.init().expect("init schema");

    storage
        .insert_api_key(&ApiKey {
            id: "key-1".to_string(),
            name: Some("gate-1".to_string()),
            key_hash: "hash-1".to_string(),
            status: "active".to_string(),
            created_at: now_ts(),
            last_used_at: None,
        })
        .expect("insert api key");

    let found = storage
        .find_api_key_by_hash("hash-1")
        .expect("find api key")
        .expect("api key exists");
    assert_eq!(found.id, "key-1");
    assert!(found.last_used_at.is_none());

    storage
        .update_api_key_last_used("hash-1")
        .expect("touch last used");
    storage
        .update_api_key_status("key-1", "disabled")
        .expect("disable key");
    let found = storage
        .find_api_key_by_hash("hash-1")
        .expect("find api key")
        .expect("api key exists");
    assert_eq!(found.status, "disabled");
    assert!(found.last_used_at.is_some());

    assert!(storage
        .find_api_key_by_hash("missing")
        .expect("find missing")
        .is_none());
}

#[test]
fn users_are_unique_and_can_be_deactivated() {
    let storage = Storage::open_in_memory().expect("open in memory");
    storage.init().expect("init schema");

    let user = storage
        .insert_user("gate-operator", "$2b$04$hash")
        .expect("insert user");
    assert!(user.id > 0);
    assert!(user.is_active);
    assert!(storage.insert_user("gate-operator", "$2b$04$other").is_err());

    assert!(storage
        .set_user_active("gate-operator", false)
        .expect("deactivate"));
    let loaded = storage
        .find_user_by_username("gate-operator")
        .expect("find user")
        .expect("user exists");
    assert!(!loaded.is_active);
    assert_eq!(loaded.password_hash, "$2b$04$hash");

    assert!(storage
        .find_user_by_username("nobody")
        .expect("find missing")
        .is_none());
    assert!(!storage.set_user_active("nobody", true).expect("missing user"));
}
