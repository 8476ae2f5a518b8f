use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use lprgate_core::api::types::{ApiReply, PlateLogListResult, PlateLogSummary};
use lprgate_core::storage::PlateLog;
use serde::Deserialize;

use super::auth::require_api_key;
use super::reply::{error_reply, json_reply};
use super::server::AppState;
use crate::storage_helpers::open_storage;

const DEFAULT_LIST_LIMIT: i64 = 50;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PlateLogListParams {
    query: Option<String>,
    limit: Option<i64>,
}

fn to_summary(log: PlateLog) -> PlateLogSummary {
    PlateLogSummary {
        id: log.id,
        location_code: log.location_code,
        camera_id: log.camera_id,
        transaction_no: log.transaction_no,
        plate: log.plate,
        accuracy: log.accuracy,
        image_url: log.image_url,
        captured_at: log.captured_at,
        created_at: log.created_at,
    }
}

pub(crate) async fn handle_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PlateLogListParams>,
) -> Response {
    if let Err(response) = require_api_key(&state.db_path, &headers).await {
        return response;
    }
    let db_path = state.db_path.to_path_buf();
    let query = params.query.filter(|value| !value.trim().is_empty());
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let listed = tokio::task::spawn_blocking(move || {
        let storage = open_storage(&db_path).ok_or_else(|| "storage unavailable".to_string())?;
        storage
            .list_plate_logs(query.as_deref(), limit)
            .map_err(|err| format!("list plate logs failed: {err}"))
    })
    .await;

    match listed {
        Ok(Ok(items)) => {
            let result = PlateLogListResult {
                items: items.into_iter().map(to_summary).collect(),
            };
            match serde_json::to_value(result) {
                Ok(data) => json_reply(200, &ApiReply::success(200, "ok", data)),
                Err(err) => error_reply(500, "INTERNAL_ERROR", err.to_string()),
            }
        }
        Ok(Err(err)) => error_reply(500, "INTERNAL_ERROR", err),
        Err(err) => error_reply(500, "INTERNAL_ERROR", format!("list task failed: {err}")),
    }
}
