use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::reply::{error_reply, text_response};

pub(crate) async fn handle_root() -> Response {
    Json(json!({ "message": "OK" })).into_response()
}

pub(crate) async fn handle_health() -> Response {
    Json(json!({ "status": "healthy" })).into_response()
}

pub(crate) async fn handle_metrics() -> Response {
    text_response(
        StatusCode::OK,
        crate::metrics::dispatch_metrics_prometheus(),
        "text/plain; version=0.0.4",
    )
}

/// Loopback-only; remote callers cannot stop the gateway.
pub(crate) async fn handle_shutdown(ConnectInfo(peer): ConnectInfo<SocketAddr>) -> Response {
    if !peer.ip().is_loopback() {
        log::warn!("shutdown refused: peer={peer}");
        return error_reply(403, "FORBIDDEN", "shutdown is loopback only");
    }
    crate::mark_shutdown_requested();
    text_response(StatusCode::OK, "shutdown", "text/plain; charset=utf-8")
}
