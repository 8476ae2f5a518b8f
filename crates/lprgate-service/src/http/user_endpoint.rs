use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use lprgate_core::api::types::{ApiReply, UserSummary};
use lprgate_core::storage::User;
use serde::Deserialize;

use super::reply::{error_reply, json_reply};
use super::server::AppState;
use crate::storage_helpers::{hash_password, open_storage};

const USERNAME_TAKEN: &str = "username already exists";

#[derive(Debug, Deserialize)]
struct RegisterParams {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

enum RegisterOutcome {
    Created(User),
    Taken,
}

fn user_summary(user: User) -> UserSummary {
    UserSummary {
        id: user.id,
        username: user.username,
        is_active: user.is_active,
        created_at: user.created_at,
        updated_at: user.updated_at,
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Open registration. New users start active.
pub(crate) async fn handle_register(State(state): State<AppState>, body: Bytes) -> Response {
    let params: RegisterParams = match serde_json::from_slice(&body) {
        Ok(params) => params,
        Err(_) => return error_reply(400, "BAD_REQUEST", "invalid request"),
    };
    let username = params.username.trim().to_string();
    if username.is_empty() || params.password.is_empty() {
        return error_reply(400, "BAD_REQUEST", "username and password are required");
    }
    let db_path = state.db_path.to_path_buf();
    let cost = state.password_hash_cost;

    let registered = tokio::task::spawn_blocking(move || {
        let storage = open_storage(&db_path).ok_or_else(|| "storage unavailable".to_string())?;
        let existing = storage
            .find_user_by_username(&username)
            .map_err(|err| format!("storage read failed: {err}"))?;
        if existing.is_some() {
            return Ok(RegisterOutcome::Taken);
        }
        let password_hash = hash_password(&params.password, cost)?;
        match storage.insert_user(&username, &password_hash) {
            Ok(user) => Ok(RegisterOutcome::Created(user)),
            // 中文注释：并发注册同名用户时，查重和插入之间可能被抢先；以唯一约束为准。
            Err(err) if is_unique_violation(&err) => Ok(RegisterOutcome::Taken),
            Err(err) => Err(format!("insert user failed: {err}")),
        }
    })
    .await;

    match registered {
        Ok(Ok(RegisterOutcome::Created(user))) => {
            log::info!("user registered: id={}, username={}", user.id, user.username);
            match serde_json::to_value(user_summary(user)) {
                Ok(data) => json_reply(200, &ApiReply::success(200, "user created", data)),
                Err(err) => error_reply(500, "INTERNAL_ERROR", err.to_string()),
            }
        }
        Ok(Ok(RegisterOutcome::Taken)) => error_reply(400, "BAD_REQUEST", USERNAME_TAKEN),
        Ok(Err(err)) => error_reply(500, "INTERNAL_ERROR", err),
        Err(err) => error_reply(500, "INTERNAL_ERROR", format!("register task failed: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_params_tolerate_missing_fields() {
        let params: RegisterParams = serde_json::from_slice(br#"{"username":"op"}"#).expect("parse");
        assert_eq!(params.username, "op");
        assert!(params.password.is_empty());
        assert!(serde_json::from_slice::<RegisterParams>(b"not json").is_err());
    }

    #[test]
    fn summary_drops_the_password_hash() {
        let summary = user_summary(User {
            id: 7,
            username: "op".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            is_active: true,
            created_at: 1,
            updated_at: 2,
        });
        let value = serde_json::to_value(summary).expect("encode");
        assert_eq!(
            value,
            serde_json::json!({
                "id": 7,
                "username": "op",
                "is_active": true,
                "created_at": 1,
                "updated_at": 2
            })
        );
    }
}
