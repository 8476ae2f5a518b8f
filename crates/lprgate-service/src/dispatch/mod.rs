use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RuntimeConfig;

mod archive;
mod error;
mod health;
mod membership;
mod object_store;
mod orchestrator;
mod plate_log_store;
mod recognizer;
mod selector;

#[cfg(test)]
mod test_support;

pub use archive::{object_key, ArchivalUploader};
pub use error::{DispatchError, ErrorKind};
pub use health::{classify_probe_response, CachedHealthProbe, HealthProbe, HttpHealthProbe};
pub use membership::{HttpMembershipLookup, MembershipLookup, DEFAULT_MEMBER_CATEGORY};
pub use object_store::{MinioSettings, MinioStore, ObjectStore};
pub use orchestrator::RecognitionOrchestrator;
pub use plate_log_store::{PlateLogStore, SqlitePlateLogStore};
pub use recognizer::{RecognitionClient, Recognizer};
pub use selector::EndpointSelector;

/// Path every plate-recognizer backend serves inference (and health) on.
pub const INFERENCE_PATH: &str = "/v1/plate-reader/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    base_address: String,
}

impl BackendEndpoint {
    pub fn new(base_address: impl Into<String>) -> Self {
        let base_address = base_address.into();
        Self {
            base_address: base_address.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    pub fn inference_url(&self) -> String {
        format!("{}{}", self.base_address, INFERENCE_PATH)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub plate: String,
    pub score: f64,
}

/// Static inputs of one recognition run, as handed over by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionJob {
    pub image_path: PathBuf,
    pub location_code: String,
    pub camera_id: String,
    pub transaction_no: Option<String>,
    pub mmc: String,
}

/// `request_data` blob of a plate log. Keys serialize in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    fields: BTreeMap<String, String>,
}

impl RequestMetadata {
    pub fn from_job(job: &RecognitionJob) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("location_code".to_string(), job.location_code.clone());
        fields.insert("camera_id".to_string(), job.camera_id.clone());
        fields.insert("mmc".to_string(), job.mmc.clone());
        Self { fields }
    }

    pub fn set_image_url(&mut self, url: impl Into<String>) {
        self.fields.insert("image_url".to_string(), url.into());
    }

    pub fn image_url(&self) -> Option<&str> {
        self.fields.get("image_url").map(String::as_str)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Races `fut` against the cancellation token; a cancelled request drops the
/// in-flight future, which aborts the underlying connection.
pub(crate) async fn with_cancel<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, DispatchError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DispatchError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Wires prober, selector, recognition client, archival and persistence from
/// the runtime configuration. Called once at startup; the result is shared by
/// every request worker.
pub fn build_orchestrator(config: &RuntimeConfig) -> Result<RecognitionOrchestrator, String> {
    let http_probe = HttpHealthProbe::new(config.probe_timeout)
        .map_err(|err| format!("build probe client failed: {err}"))?;
    let probe: Arc<dyn HealthProbe> = if config.health_cache_ttl.is_zero() {
        Arc::new(http_probe)
    } else {
        Arc::new(CachedHealthProbe::new(Arc::new(http_probe), config.health_cache_ttl))
    };
    let selector = Arc::new(EndpointSelector::new(config.endpoints.clone(), probe));
    let recognizer = RecognitionClient::new(selector, config.recognize_timeout)
        .map_err(|err| format!("build recognizer client failed: {err}"))?;

    let object_store: Option<Arc<dyn ObjectStore>> = match &config.minio {
        Some(settings) => match MinioStore::new(settings.clone()) {
            Ok(store) => Some(Arc::new(store)),
            Err(err) => {
                log::warn!("object store init failed: endpoint={}, err={}", settings.endpoint, err);
                None
            }
        },
        None => None,
    };
    let archiver = ArchivalUploader::new(config.archive_bucket.clone(), object_store);
    let store = Arc::new(SqlitePlateLogStore::new(config.db_path.clone()));

    let mut orchestrator = RecognitionOrchestrator::new(Arc::new(recognizer), archiver, store);
    if let Some(base_url) = config.member_service_url.as_deref() {
        let lookup = HttpMembershipLookup::new(base_url)
            .map_err(|err| format!("build membership client failed: {err}"))?;
        orchestrator = orchestrator.with_membership(Arc::new(lookup));
    }
    Ok(orchestrator)
}
