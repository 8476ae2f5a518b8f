use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{with_cancel, DispatchError, EndpointSelector, RecognitionResult};

const UPLOAD_FILE_NAME: &str = "image.jpg";
const UPLOAD_MIME: &str = "image/jpeg";
const BODY_PREVIEW_MAX_CHARS: usize = 256;

/// Sends one image to a plate-recognizer backend and returns the best candidate.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(
        &self,
        token: &str,
        image_path: &Path,
        mmc: &str,
        camera_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult, DispatchError>;
}

pub struct RecognitionClient {
    selector: Arc<EndpointSelector>,
    client: Client,
    timeout: Duration,
}

impl RecognitionClient {
    pub fn new(selector: Arc<EndpointSelector>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            selector,
            client,
            timeout,
        })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> DispatchError {
        if err.is_timeout() {
            DispatchError::Timeout(self.timeout)
        } else {
            DispatchError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Recognizer for RecognitionClient {
    async fn recognize(
        &self,
        token: &str,
        image_path: &Path,
        mmc: &str,
        camera_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult, DispatchError> {
        let url = self.selector.pick_endpoint(cancel).await?;

        let image = tokio::fs::read(image_path).await.map_err(|err| {
            DispatchError::ImageRead(format!("{}: {err}", image_path.display()))
        })?;
        let body_size = image.len();
        let upload = Part::bytes(image)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(UPLOAD_MIME)
            .map_err(|err| DispatchError::Transport(err.to_string()))?;
        let form = Form::new()
            .part("upload", upload)
            .text("timestamp", chrono::Utc::now().to_rfc3339())
            .text("mmc", mmc.to_string())
            .text("camera_id", camera_id.to_string());

        log::info!(
            "recognize request: url={}, camera_id={}, mmc={}, body_size={}",
            url,
            camera_id,
            mmc,
            body_size
        );
        let started_at = Instant::now();
        let request = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Token {token}"))
            .multipart(form);

        let response = match with_cancel(cancel, request.send()).await? {
            Ok(response) => response,
            Err(err) => {
                let err = self.map_transport_error(err);
                log::error!(
                    "recognize transport failed: url={}, camera_id={}, duration_ms={}, err={}",
                    url,
                    camera_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };
        let status = response.status();
        let body = with_cancel(cancel, response.text())
            .await?
            .map_err(|err| self.map_transport_error(err))?;
        log::info!(
            "recognize response: url={}, camera_id={}, status={}, duration_ms={}",
            url,
            camera_id,
            status.as_u16(),
            started_at.elapsed().as_millis()
        );

        if !status.is_success() {
            return Err(DispatchError::UpstreamStatus {
                status: status.as_u16(),
                body: body_preview(&body),
            });
        }
        parse_recognition_body(&body)
    }
}

#[derive(Debug, Deserialize)]
struct RecognizerReply {
    results: Vec<PlateCandidate>,
}

#[derive(Debug, Deserialize)]
struct PlateCandidate {
    plate: String,
    score: f64,
}

/// Decodes `{"results":[{"plate":..,"score":..}]}` and keeps the first
/// candidate. An empty list is the "nothing on the photo" outcome.
pub(crate) fn parse_recognition_body(body: &str) -> Result<RecognitionResult, DispatchError> {
    let reply: RecognizerReply = serde_json::from_str(body)
        .map_err(|err| DispatchError::InvalidResponse(format!("{err}; body={}", body_preview(body))))?;
    let Some(first) = reply.results.into_iter().next() else {
        return Err(DispatchError::NoPlateDetected);
    };
    Ok(RecognitionResult {
        plate: first.plate.to_uppercase(),
        score: first.score,
    })
}

fn body_preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_PREVIEW_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut preview: String = trimmed.chars().take(BODY_PREVIEW_MAX_CHARS).collect();
    preview.push_str("...");
    preview
}
