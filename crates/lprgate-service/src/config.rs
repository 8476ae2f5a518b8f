use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::{BackendEndpoint, MinioSettings};

pub const DEFAULT_ADDR: &str = "0.0.0.0:48780";
const DEFAULT_DB_PATH: &str = "lprgate.db";
pub(crate) const DEFAULT_RECOGNIZER_ENDPOINTS: [&str; 4] = [
    "http://plate-recognizer-1:8080",
    "http://plate-recognizer-2:8081",
    "http://plate-recognizer-3:8082",
    "http://plate-recognizer-4:8083",
];
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;
const DEFAULT_RECOGNIZE_TIMEOUT_SECS: u64 = 15;
const DEFAULT_HEALTH_CACHE_TTL_MS: u64 = 0;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_MINIO_REGION: &str = "us-east-1";
const MIN_PASSWORD_HASH_COST: u32 = 4;
const MAX_PASSWORD_HASH_COST: u32 = 31;

pub const ENV_ADDR: &str = "LPRGATE_ADDR";
const ENV_DB_PATH: &str = "LPRGATE_DB_PATH";
const ENV_RECOGNIZER_ENDPOINTS: &str = "LPRGATE_RECOGNIZER_ENDPOINTS";
const ENV_RECOGNIZER_TOKEN: &str = "LPRGATE_RECOGNIZER_TOKEN";
const ENV_RECOGNIZER_TOKEN_COMPAT: &str = "PLATE_RECOGNIZER_TOKEN";
const ENV_PROBE_TIMEOUT_MS: &str = "LPRGATE_PROBE_TIMEOUT_MS";
const ENV_RECOGNIZE_TIMEOUT_SECS: &str = "LPRGATE_RECOGNIZE_TIMEOUT_SECS";
const ENV_HEALTH_CACHE_TTL_MS: &str = "LPRGATE_HEALTH_CACHE_TTL_MS";
const ENV_ARCHIVE_BUCKET: &str = "LPRGATE_ARCHIVE_BUCKET";
const ENV_ARCHIVE_BUCKET_COMPAT: &str = "MINIO_BUCKET_IMAGE_LPR";
const ENV_MINIO_ENDPOINT: &str = "MINIO_ENDPOINT";
const ENV_MINIO_ACCESS_KEY: &str = "MINIO_ACCESS_KEY";
const ENV_MINIO_SECRET_KEY: &str = "MINIO_SECRET_KEY";
const ENV_MINIO_USE_SSL: &str = "MINIO_USE_SSL";
const ENV_MINIO_REGION: &str = "MINIO_REGION";
const ENV_MEMBER_SERVICE_URL: &str = "LPRGATE_MEMBER_SERVICE_URL";
const ENV_MAX_UPLOAD_BYTES: &str = "LPRGATE_MAX_UPLOAD_BYTES";
const ENV_PASSWORD_HASH_COST: &str = "LPRGATE_BCRYPT_COST";

/// Everything the gateway reads from the environment, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub endpoints: Vec<BackendEndpoint>,
    pub recognizer_token: String,
    pub probe_timeout: Duration,
    pub recognize_timeout: Duration,
    pub health_cache_ttl: Duration,
    pub archive_bucket: Option<String>,
    pub minio: Option<MinioSettings>,
    pub member_service_url: Option<String>,
    pub max_upload_bytes: usize,
    pub password_hash_cost: u32,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let endpoints = match env_string(ENV_RECOGNIZER_ENDPOINTS) {
            Some(raw) => parse_endpoints(&raw),
            None => DEFAULT_RECOGNIZER_ENDPOINTS
                .iter()
                .map(|addr| BackendEndpoint::new(*addr))
                .collect(),
        };
        if endpoints.is_empty() {
            log::warn!("no valid recognizer endpoints configured; every recognition will fail");
        }

        Self {
            db_path: PathBuf::from(env_string(ENV_DB_PATH).unwrap_or_else(|| DEFAULT_DB_PATH.to_string())),
            endpoints,
            recognizer_token: env_string(ENV_RECOGNIZER_TOKEN)
                .or_else(|| env_string(ENV_RECOGNIZER_TOKEN_COMPAT))
                .unwrap_or_default(),
            probe_timeout: Duration::from_millis(env_u64_or(ENV_PROBE_TIMEOUT_MS, DEFAULT_PROBE_TIMEOUT_MS)),
            recognize_timeout: Duration::from_secs(env_u64_or(
                ENV_RECOGNIZE_TIMEOUT_SECS,
                DEFAULT_RECOGNIZE_TIMEOUT_SECS,
            )),
            health_cache_ttl: Duration::from_millis(env_u64_or(
                ENV_HEALTH_CACHE_TTL_MS,
                DEFAULT_HEALTH_CACHE_TTL_MS,
            )),
            archive_bucket: env_string(ENV_ARCHIVE_BUCKET).or_else(|| env_string(ENV_ARCHIVE_BUCKET_COMPAT)),
            minio: minio_settings_from_env(),
            member_service_url: env_string(ENV_MEMBER_SERVICE_URL),
            max_upload_bytes: env_usize_or(ENV_MAX_UPLOAD_BYTES, DEFAULT_MAX_UPLOAD_BYTES),
            password_hash_cost: password_hash_cost_from_env(),
        }
    }
}

fn password_hash_cost_from_env() -> u32 {
    let cost = env_u64_or(ENV_PASSWORD_HASH_COST, u64::from(bcrypt::DEFAULT_COST));
    u32::try_from(cost)
        .unwrap_or(MAX_PASSWORD_HASH_COST)
        .clamp(MIN_PASSWORD_HASH_COST, MAX_PASSWORD_HASH_COST)
}

fn minio_settings_from_env() -> Option<MinioSettings> {
    let endpoint = env_string(ENV_MINIO_ENDPOINT)?;
    let (endpoint, scheme_ssl) = match endpoint.split_once("://") {
        Some((scheme, rest)) => (rest.trim_end_matches('/').to_string(), Some(scheme.eq_ignore_ascii_case("https"))),
        None => (endpoint.trim_end_matches('/').to_string(), None),
    };
    Some(MinioSettings {
        endpoint,
        access_key: env_string(ENV_MINIO_ACCESS_KEY).unwrap_or_default(),
        secret_key: env_string(ENV_MINIO_SECRET_KEY).unwrap_or_default(),
        use_ssl: env_string(ENV_MINIO_USE_SSL)
            .map(|value| parse_bool(&value))
            .or(scheme_ssl)
            .unwrap_or(false),
        region: env_string(ENV_MINIO_REGION).unwrap_or_else(|| DEFAULT_MINIO_REGION.to_string()),
    })
}

/// Comma-separated base addresses; entries that are not absolute http(s)
/// URLs are logged and dropped.
pub(crate) fn parse_endpoints(raw: &str) -> Vec<BackendEndpoint> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| match url::Url::parse(item) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => {
                Some(BackendEndpoint::new(item))
            }
            Ok(_) => {
                log::warn!("recognizer endpoint skipped: addr={item}, reason=unsupported scheme");
                None
            }
            Err(err) => {
                log::warn!("recognizer endpoint skipped: addr={item}, reason={err}");
                None
            }
        })
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

pub(crate) fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64_or(name: &str, default: u64) -> u64 {
    env_string(name)
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize_or(name: &str, default: usize) -> usize {
    env_string(name)
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}
