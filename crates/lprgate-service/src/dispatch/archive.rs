use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use super::{with_cancel, ObjectStore};

/// Best-effort copy of the recognized image into object storage.
pub struct ArchivalUploader {
    bucket: Option<String>,
    store: Option<Arc<dyn ObjectStore>>,
}

impl ArchivalUploader {
    pub fn new(bucket: Option<String>, store: Option<Arc<dyn ObjectStore>>) -> Self {
        let bucket = bucket
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self { bucket, store }
    }

    #[cfg(test)]
    pub(crate) fn disabled() -> Self {
        Self {
            bucket: None,
            store: None,
        }
    }

    /// Returns the public URL of the stored image, or `None` when archival is
    /// not configured or failed. Never fails the caller.
    pub async fn archive(&self, image_path: &Path, camera_id: &str, cancel: &CancellationToken) -> Option<String> {
        let bucket = self.bucket.as_deref()?;
        let Some(store) = self.store.as_ref() else {
            log::warn!("archive skipped: bucket={bucket} configured without object store");
            return None;
        };

        let key = object_key(camera_id, unix_secs(), image_path);
        match with_cancel(cancel, store.upload(bucket, &key, image_path)).await {
            Ok(Ok(url)) => {
                log::info!("archive stored: bucket={bucket}, key={key}");
                Some(url)
            }
            Ok(Err(err)) => {
                crate::metrics::record_archive_failure();
                log::warn!("archive failed: bucket={bucket}, key={key}, err={err}");
                None
            }
            Err(err) => {
                crate::metrics::record_archive_failure();
                log::warn!("archive aborted: bucket={bucket}, key={key}, err={err}");
                None
            }
        }
    }
}

/// `<camera_id>-<unix_seconds>-<file name>`.
pub fn object_key(camera_id: &str, unix_secs: u64, image_path: &Path) -> String {
    let basename = image_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("{camera_id}-{unix_secs}-{basename}")
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct RecordingStore {
        fail: bool,
        uploads: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn upload(&self, bucket: &str, object_key: &str, _local_path: &Path) -> Result<String, String> {
            self.uploads
                .lock()
                .expect("lock uploads")
                .push((bucket.to_string(), object_key.to_string()));
            if self.fail {
                Err("connection refused".to_string())
            } else {
                Ok(format!("http://minio:9000/{bucket}/{object_key}"))
            }
        }
    }

    fn store(fail: bool) -> Arc<RecordingStore> {
        Arc::new(RecordingStore {
            fail,
            uploads: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn object_key_uses_camera_time_and_basename() {
        assert_eq!(
            object_key("CAM1", 1_700_000_000, &PathBuf::from("/tmp/uploads/plate-7.jpg")),
            "CAM1-1700000000-plate-7.jpg"
        );
    }

    #[tokio::test]
    async fn unset_bucket_skips_upload() {
        let store = store(false);
        let uploader = ArchivalUploader::new(Some("  ".to_string()), Some(store.clone()));
        let url = uploader
            .archive(Path::new("/tmp/a.jpg"), "CAM1", &CancellationToken::new())
            .await;
        assert!(url.is_none());
        assert!(store.uploads.lock().expect("lock uploads").is_empty());
    }

    #[tokio::test]
    async fn successful_upload_returns_url() {
        let store = store(false);
        let uploader = ArchivalUploader::new(Some("lpr".to_string()), Some(store.clone()));
        let url = uploader
            .archive(Path::new("/tmp/a.jpg"), "CAM1", &CancellationToken::new())
            .await
            .expect("url");
        assert!(url.starts_with("http://minio:9000/lpr/CAM1-"));
        assert!(url.ends_with("-a.jpg"));
        let uploads = store.uploads.lock().expect("lock uploads");
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "lpr");
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let uploader = ArchivalUploader::new(Some("lpr".to_string()), Some(store(true)));
        let url = uploader
            .archive(Path::new("/tmp/a.jpg"), "CAM1", &CancellationToken::new())
            .await;
        assert!(url.is_none());
    }

    #[tokio::test]
    async fn bucket_without_store_is_skipped() {
        let uploader = ArchivalUploader::new(Some("lpr".to_string()), None);
        assert!(uploader
            .archive(Path::new("/tmp/a.jpg"), "CAM1", &CancellationToken::new())
            .await
            .is_none());
    }
}
