use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use lprgate_core::api::types::{ApiKeyCreateResult, ApiReply};
use lprgate_core::storage::{now_ts, ApiKey};
use serde::Deserialize;

use super::reply::{error_reply, json_reply};
use super::server::AppState;
use crate::storage_helpers::{generate_api_key, hash_api_key, open_storage, random_hex};

#[derive(Debug, Default, Deserialize)]
struct CreateKeyParams {
    #[serde(default)]
    name: Option<String>,
}

fn parse_params(body: &[u8]) -> Result<CreateKeyParams, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CreateKeyParams::default());
    }
    serde_json::from_slice(body).map_err(|err| format!("invalid json body: {err}"))
}

/// Admin-only. The plaintext key is returned once and only its hash is stored.
pub(crate) async fn handle_create(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let presented = headers
        .get(crate::ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if presented.is_empty() || !crate::admin_token_matches(presented) {
        return error_reply(401, "UNAUTHORIZED", "admin token required");
    }
    let params = match parse_params(&body) {
        Ok(params) => params,
        Err(err) => return error_reply(400, "BAD_REQUEST", err),
    };

    let name = params
        .name
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let key = generate_api_key();
    let record = ApiKey {
        id: format!("key-{}", random_hex(8)),
        name: name.clone(),
        key_hash: hash_api_key(&key),
        status: "active".to_string(),
        created_at: now_ts(),
        last_used_at: None,
    };
    let db_path = state.db_path.to_path_buf();
    let key_id = record.id.clone();

    let inserted = tokio::task::spawn_blocking(move || {
        let storage = open_storage(&db_path).ok_or_else(|| "storage unavailable".to_string())?;
        storage
            .insert_api_key(&record)
            .map_err(|err| format!("insert api key failed: {err}"))
    })
    .await;

    match inserted {
        Ok(Ok(())) => {
            log::info!("api key created: key_id={key_id}");
            let result = ApiKeyCreateResult { id: key_id, name, key };
            match serde_json::to_value(result) {
                Ok(data) => json_reply(201, &ApiReply::success(201, "api key created", data)),
                Err(err) => error_reply(500, "INTERNAL_ERROR", err.to_string()),
            }
        }
        Ok(Err(err)) => error_reply(500, "INTERNAL_ERROR", err),
        Err(err) => error_reply(500, "INTERNAL_ERROR", format!("create task failed: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_params;

    #[test]
    fn empty_body_means_unnamed_key() {
        assert!(parse_params(b"").expect("empty").name.is_none());
        assert!(parse_params(b"  \n").expect("blank").name.is_none());
        assert_eq!(
            parse_params(br#"{"name":"gate-1"}"#).expect("named").name.as_deref(),
            Some("gate-1")
        );
        assert!(parse_params(b"{").is_err());
    }
}
