use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use lprgate_core::api::types::ApiReply;
use serde::Serialize;

use crate::dispatch::DispatchError;

pub(crate) fn json_reply<T: Serialize>(status: u16, body: &T) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match serde_json::to_value(body) {
        Ok(value) => (status, Json(value)).into_response(),
        Err(err) => {
            log::error!("encode reply failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub(crate) fn error_reply(status: u16, code: &str, message: impl Into<String>) -> Response {
    json_reply(status, &ApiReply::error(status, code, message))
}

pub(crate) fn dispatch_error_reply(err: &DispatchError) -> Response {
    error_reply(err.http_status(), err.code(), err.to_string())
}

pub(crate) fn text_response(status: StatusCode, body: impl Into<String>, content_type: &'static str) -> Response {
    let mut response = (status, body.into()).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
