use std::io::Write;
use std::path::Path;

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use tokio_util::sync::CancellationToken;

use super::auth::{extract_api_key, require_api_key, require_user};
use super::reply::{dispatch_error_reply, error_reply, json_reply};
use super::server::AppState;
use crate::dispatch::{DispatchError, RecognitionJob};

const DEFAULT_IMAGE_SUFFIX: &str = ".jpg";

#[derive(Debug, Default)]
struct RecognizeForm {
    image: Option<(Option<String>, Bytes)>,
    location_code: Option<String>,
    camera_id: Option<String>,
    transaction_no: Option<String>,
    mmc: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<RecognizeForm, DispatchError> {
    let mut form = RecognizeForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| DispatchError::Validation(format!("malformed multipart body: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| DispatchError::Validation(format!("read image failed: {err}")))?;
                form.image = Some((file_name, bytes));
            }
            "location_code" | "camera_id" | "transaction_no" | "mmc" | "username" | "password" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| DispatchError::Validation(format!("read {name} failed: {err}")))?;
                if name == "password" {
                    form.password = Some(value).filter(|value| !value.is_empty());
                    continue;
                }
                let value = Some(value.trim().to_string()).filter(|value| !value.is_empty());
                match name.as_str() {
                    "location_code" => form.location_code = value,
                    "camera_id" => form.camera_id = value,
                    "transaction_no" => form.transaction_no = value,
                    "username" => form.username = value,
                    _ => form.mmc = value,
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

fn image_suffix(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_IMAGE_SUFFIX.to_string())
}

async fn spool_image(bytes: Bytes, suffix: String) -> Result<tempfile::NamedTempFile, DispatchError> {
    tokio::task::spawn_blocking(move || {
        let mut file = tempfile::Builder::new()
            .prefix("lprgate-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|err| DispatchError::ImageRead(format!("create temp image failed: {err}")))?;
        file.write_all(&bytes)
            .and_then(|_| file.flush())
            .map_err(|err| DispatchError::ImageRead(format!("write temp image failed: {err}")))?;
        Ok(file)
    })
    .await
    .map_err(|err| DispatchError::ImageRead(format!("spool task failed: {err}")))?
}

pub(crate) async fn handle_recognize(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    // 中文注释：带 API key 的请求先验 key；否则按表单里的 username/password 验用户，所以要先读完表单。
    let uses_api_key = extract_api_key(&headers).is_some();
    if uses_api_key {
        if let Err(response) = require_api_key(&state.db_path, &headers).await {
            return response;
        }
    }
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            return error_reply(400, "BAD_REQUEST", format!("multipart body required: {rejection}"));
        }
    };
    let mut form = match read_form(multipart).await {
        Ok(form) => form,
        Err(err) => return dispatch_error_reply(&err),
    };
    if !uses_api_key {
        let username = form.username.take();
        let password = form.password.take();
        match require_user(&state.db_path, username.as_deref(), password.as_deref()).await {
            Ok(username) => log::debug!("recognize authorized: username={username}"),
            Err(response) => return response,
        }
    }

    let Some((file_name, bytes)) = form.image.filter(|(_, bytes)| !bytes.is_empty()) else {
        return error_reply(400, "BAD_REQUEST", "image is required");
    };
    let Some(location_code) = form.location_code else {
        return error_reply(400, "BAD_REQUEST", "location_code is required");
    };
    let Some(camera_id) = form.camera_id else {
        return error_reply(400, "BAD_REQUEST", "camera_id is required");
    };

    // Removed from disk when dropped at the end of the handler.
    let image = match spool_image(bytes, image_suffix(file_name.as_deref())).await {
        Ok(image) => image,
        Err(err) => return dispatch_error_reply(&err),
    };
    let job = RecognitionJob {
        image_path: image.path().to_path_buf(),
        location_code,
        camera_id,
        transaction_no: form.transaction_no,
        mmc: form.mmc.unwrap_or_default(),
    };

    // 中文注释：客户端断开时 axum 会直接丢弃这个 future；drop guard 随之触发取消，让选路/识别/归档尽快停下。
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match state.orchestrator.process(&state.recognizer_token, &job, &cancel).await {
        Ok(final_response) => json_reply(200, &final_response),
        Err(err) => dispatch_error_reply(&err),
    }
}
