use std::path::PathBuf;

use async_trait::async_trait;
use lprgate_core::storage::{NewPlateLog, Storage};

/// Persistence seam of the orchestrator.
#[async_trait]
pub trait PlateLogStore: Send + Sync {
    async fn create_record(&self, record: &NewPlateLog) -> Result<i64, String>;
    async fn update_request_data(&self, id: i64, request_data: &str) -> Result<(), String>;
}

/// `PlateLogStore` over the SQLite file. Every call opens its own connection
/// on the blocking pool; create and update are independent statements.
pub struct SqlitePlateLogStore {
    db_path: PathBuf,
}

impl SqlitePlateLogStore {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    async fn with_storage<T, F>(&self, op: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&Storage) -> rusqlite::Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let storage = Storage::open(&db_path).map_err(|err| format!("open storage failed: {err}"))?;
            op(&storage).map_err(|err| err.to_string())
        })
        .await
        .map_err(|err| format!("storage task failed: {err}"))?
    }
}

#[async_trait]
impl PlateLogStore for SqlitePlateLogStore {
    async fn create_record(&self, record: &NewPlateLog) -> Result<i64, String> {
        let record = record.clone();
        self.with_storage(move |storage| storage.insert_plate_log(&record))
            .await
    }

    async fn update_request_data(&self, id: i64, request_data: &str) -> Result<(), String> {
        let request_data = request_data.to_string();
        self.with_storage(move |storage| storage.update_plate_log_request_data(id, &request_data))
            .await
    }
}
