use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use reqwest::{Client, Method, StatusCode};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const STORE_TIMEOUT_SECS: u64 = 30;
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";
const S3_SERVICE: &str = "s3";

/// Puts a local file into a bucket and returns the object's public URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, bucket: &str, object_key: &str, local_path: &Path) -> Result<String, String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinioSettings {
    /// `host[:port]`, no scheme.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
    pub region: String,
}

impl MinioSettings {
    fn scheme(&self) -> &'static str {
        if self.use_ssl {
            "https"
        } else {
            "http"
        }
    }
}

/// S3-compatible store speaking path-style requests signed with SigV4.
pub struct MinioStore {
    settings: MinioSettings,
    client: Client,
    known_buckets: Mutex<HashSet<String>>,
}

impl MinioStore {
    pub fn new(settings: MinioSettings) -> Result<Self, String> {
        if settings.endpoint.trim().is_empty() {
            return Err("object store endpoint is empty".to_string());
        }
        if settings.access_key.is_empty() || settings.secret_key.is_empty() {
            return Err("object store credentials missing".to_string());
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(STORE_TIMEOUT_SECS))
            .build()
            .map_err(|err| format!("build object store client failed: {err}"))?;
        Ok(Self {
            settings,
            client,
            known_buckets: Mutex::new(HashSet::new()),
        })
    }

    pub fn object_url(&self, bucket: &str, object_key: &str) -> String {
        format!(
            "{}://{}{}",
            self.settings.scheme(),
            self.settings.endpoint,
            canonical_uri(bucket, Some(object_key))
        )
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), String> {
        if self.bucket_known(bucket) {
            return Ok(());
        }
        let uri = canonical_uri(bucket, None);
        let status = self.send_signed(Method::HEAD, &uri, Vec::new(), None).await?;
        if status == StatusCode::NOT_FOUND {
            let status = self.send_signed(Method::PUT, &uri, Vec::new(), None).await?;
            if !status.is_success() {
                return Err(format!("create bucket {bucket} failed: status={}", status.as_u16()));
            }
            log::info!("object store bucket created: bucket={bucket}");
        } else if !status.is_success() {
            return Err(format!("check bucket {bucket} failed: status={}", status.as_u16()));
        }
        if let Ok(mut known) = self.known_buckets.lock() {
            known.insert(bucket.to_string());
        }
        Ok(())
    }

    fn bucket_known(&self, bucket: &str) -> bool {
        self.known_buckets
            .lock()
            .map(|known| known.contains(bucket))
            .unwrap_or(false)
    }

    async fn send_signed(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<StatusCode, String> {
        let now = Utc::now();
        let payload_hash = hex_sha256(&body);
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let authorization = authorization_header(&self.settings, method.as_str(), uri, &payload_hash, now)?;

        let url = format!("{}://{}{}", self.settings.scheme(), self.settings.endpoint, uri);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(HOST, self.settings.endpoint.as_str())
            .header("x-amz-content-sha256", payload_hash.as_str())
            .header("x-amz-date", amz_date.as_str())
            .header(AUTHORIZATION, authorization);
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if !body.is_empty() || method == Method::PUT {
            request = request.body(body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| format!("object store {method} {uri} failed: {err}"))?;
        Ok(response.status())
    }
}

#[async_trait]
impl ObjectStore for MinioStore {
    async fn upload(&self, bucket: &str, object_key: &str, local_path: &Path) -> Result<String, String> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|err| format!("read {} failed: {err}", local_path.display()))?;
        self.ensure_bucket(bucket).await?;

        let uri = canonical_uri(bucket, Some(object_key));
        let status = self
            .send_signed(Method::PUT, &uri, bytes, Some(content_type_for(local_path)))
            .await?;
        if !status.is_success() {
            return Err(format!(
                "put object {bucket}/{object_key} failed: status={}",
                status.as_u16()
            ));
        }
        Ok(self.object_url(bucket, object_key))
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Path-style `/<bucket>[/<key>]`, each segment percent-encoded the way SigV4
/// expects (unreserved characters kept, `/` inside the key preserved).
fn canonical_uri(bucket: &str, object_key: Option<&str>) -> String {
    let mut uri = format!("/{}", urlencoding::encode(bucket));
    if let Some(key) = object_key {
        for segment in key.split('/') {
            uri.push('/');
            uri.push_str(&urlencoding::encode(segment));
        }
    }
    uri
}

fn authorization_header(
    settings: &MinioSettings,
    method: &str,
    uri: &str,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> Result<String, String> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let canonical_request = format!(
        "{method}\n{uri}\n\nhost:{}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{payload_hash}",
        settings.endpoint
    );
    let scope = format!("{date}/{}/{S3_SERVICE}/aws4_request", settings.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );
    let key = signing_key(&settings.secret_key, &date, &settings.region, S3_SERVICE)?;
    let signature = hex_encode(&hmac_sha256(&key, string_to_sign.as_bytes())?);
    Ok(format!(
        "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
        settings.access_key
    ))
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>, String> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|err| format!("hmac key rejected: {err}"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex_sha256(data: &[u8]) -> String {
    hex_encode(&Sha256::digest(data))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
