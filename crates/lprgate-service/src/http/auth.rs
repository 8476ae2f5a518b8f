use std::path::Path;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::Response;
use lprgate_core::storage::ApiKey;

use super::reply::error_reply;
use crate::storage_helpers::{hash_api_key, open_storage, verify_password};

const API_KEY_HEADER: &str = "x-api-key";
const KEY_STATUS_ACTIVE: &str = "active";

pub(crate) fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()) {
        if let Some(rest) = value.trim().strip_prefix("Bearer ") {
            let key = rest.trim();
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
    }
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Resolves the caller's API key. Missing or unknown keys are 401, a known
/// but disabled key is 403.
pub(crate) async fn require_api_key(db_path: &Path, headers: &HeaderMap) -> Result<ApiKey, Response> {
    let Some(platform_key) = extract_api_key(headers) else {
        return Err(error_reply(401, "UNAUTHORIZED", "missing api key"));
    };
    let key_hash = hash_api_key(&platform_key);
    let db_path = db_path.to_path_buf();

    let lookup = tokio::task::spawn_blocking(move || {
        let storage = open_storage(&db_path).ok_or_else(|| "storage unavailable".to_string())?;
        let found = storage
            .find_api_key_by_hash(&key_hash)
            .map_err(|err| format!("storage read failed: {err}"))?;
        if let Some(api_key) = found.as_ref().filter(|key| key.status == KEY_STATUS_ACTIVE) {
            if let Err(err) = storage.update_api_key_last_used(&api_key.key_hash) {
                log::warn!("api key touch failed: key_id={}, err={}", api_key.id, err);
            }
        }
        Ok::<_, String>(found)
    })
    .await;

    let found = match lookup {
        Ok(Ok(found)) => found,
        Ok(Err(err)) => return Err(error_reply(500, "INTERNAL_ERROR", err)),
        Err(err) => return Err(error_reply(500, "INTERNAL_ERROR", format!("auth task failed: {err}"))),
    };
    let Some(api_key) = found else {
        log::warn!("api key rejected: reason=unknown");
        return Err(error_reply(401, "UNAUTHORIZED", "invalid api key"));
    };
    if api_key.status != KEY_STATUS_ACTIVE {
        log::warn!("api key rejected: key_id={}, status={}", api_key.id, api_key.status);
        return Err(error_reply(403, "FORBIDDEN", "api key disabled"));
    }
    Ok(api_key)
}

enum UserCheck {
    Unknown,
    Inactive,
    BadPassword,
    Passed,
}

/// Form-field credentials. Missing fields are 400; an unknown user or a
/// wrong password is 401; an inactive user is 403.
pub(crate) async fn require_user(
    db_path: &Path,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<String, Response> {
    let (Some(username), Some(password)) = (username, password) else {
        return Err(error_reply(400, "INVALID_REQUEST", "username and password are required"));
    };
    let db_path = db_path.to_path_buf();
    let lookup_name = username.to_string();
    let password = password.to_string();

    // 中文注释：bcrypt 校验是纯 CPU 计算，和 SQLite 查询一起放到阻塞线程，避免卡住 async worker。
    let checked = tokio::task::spawn_blocking(move || {
        let storage = open_storage(&db_path).ok_or_else(|| "storage unavailable".to_string())?;
        let found = storage
            .find_user_by_username(&lookup_name)
            .map_err(|err| format!("storage read failed: {err}"))?;
        let check = match found {
            None => UserCheck::Unknown,
            Some(user) if !user.is_active => UserCheck::Inactive,
            Some(user) if !verify_password(&password, &user.password_hash) => UserCheck::BadPassword,
            Some(_) => UserCheck::Passed,
        };
        Ok::<_, String>(check)
    })
    .await;

    match checked {
        Ok(Ok(UserCheck::Passed)) => Ok(username.to_string()),
        Ok(Ok(UserCheck::Inactive)) => {
            log::warn!("user rejected: username={username}, reason=inactive");
            Err(error_reply(403, "FORBIDDEN", "user is inactive"))
        }
        Ok(Ok(UserCheck::Unknown | UserCheck::BadPassword)) => {
            log::warn!("user rejected: username={username}, reason=bad credentials");
            Err(error_reply(401, "UNAUTHORIZED", "invalid username or password"))
        }
        Ok(Err(err)) => Err(error_reply(500, "INTERNAL_ERROR", err)),
        Err(err) => Err(error_reply(500, "INTERNAL_ERROR", format!("auth task failed: {err}"))),
    }
}
