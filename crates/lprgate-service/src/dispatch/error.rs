use std::time::Duration;

use thiserror::Error;

/// Coarse class of a [`DispatchError`], what the HTTP layer and metrics branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NoHealthyBackend,
    NoPlateDetected,
    Upstream,
    Persistence,
    Internal,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("no healthy plate-recognizer available after {attempts} attempts")]
    NoHealthyBackend { attempts: usize },

    #[error("no plate detected")]
    NoPlateDetected,

    #[error("plate-recognizer request failed: {0}")]
    Transport(String),

    #[error("plate-recognizer request timed out after {0:?}")]
    Timeout(Duration),

    #[error("plate-recognizer returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("plate-recognizer response invalid: {0}")]
    InvalidResponse(String),

    #[error("image read failed: {0}")]
    ImageRead(String),

    #[error("plate log persistence failed: {0}")]
    Persistence(String),

    #[error("request cancelled")]
    Cancelled,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NoHealthyBackend { .. } => ErrorKind::NoHealthyBackend,
            Self::NoPlateDetected => ErrorKind::NoPlateDetected,
            Self::Transport(_)
            | Self::Timeout(_)
            | Self::UpstreamStatus { .. }
            | Self::InvalidResponse(_) => ErrorKind::Upstream,
            Self::ImageRead(_) => ErrorKind::Internal,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NoHealthyBackend { .. } => 503,
            // 中文注释：“没识别到车牌”是正常业务结果（请重拍），必须和上游故障（请稍后重试）区分开。
            Self::NoPlateDetected => 422,
            Self::Timeout(_) => 504,
            Self::Transport(_) | Self::UpstreamStatus { .. } | Self::InvalidResponse(_) => 502,
            Self::ImageRead(_) | Self::Persistence(_) => 500,
            Self::Cancelled => 499,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "BAD_REQUEST",
            Self::NoHealthyBackend { .. } => "NO_HEALTHY_BACKEND",
            Self::NoPlateDetected => "NO_PLATE_DETECTED",
            Self::Timeout(_) => "UPSTREAM_TIMEOUT",
            Self::Transport(_) | Self::UpstreamStatus { .. } => "UPSTREAM_ERROR",
            Self::InvalidResponse(_) => "UPSTREAM_INVALID_RESPONSE",
            Self::ImageRead(_) => "INTERNAL_ERROR",
            Self::Persistence(_) => "PERSISTENCE_FAILED",
            Self::Cancelled => "CLIENT_CLOSED_REQUEST",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_detection_is_distinct_from_upstream_failures() {
        assert_eq!(DispatchError::NoPlateDetected.kind(), ErrorKind::NoPlateDetected);
        assert_eq!(
            DispatchError::Transport("connection refused".to_string()).kind(),
            ErrorKind::Upstream
        );
        assert_eq!(
            DispatchError::Timeout(Duration::from_secs(15)).kind(),
            ErrorKind::Upstream
        );
        assert_ne!(
            DispatchError::NoPlateDetected.http_status(),
            DispatchError::NoHealthyBackend { attempts: 4 }.http_status()
        );
    }

    #[test]
    fn status_and_code_mapping() {
        assert_eq!(DispatchError::NoHealthyBackend { attempts: 2 }.http_status(), 503);
        assert_eq!(DispatchError::NoHealthyBackend { attempts: 2 }.code(), "NO_HEALTHY_BACKEND");
        assert_eq!(DispatchError::Validation("x".into()).http_status(), 400);
        assert_eq!(DispatchError::Persistence("disk full".into()).code(), "PERSISTENCE_FAILED");
        assert_eq!(
            DispatchError::UpstreamStatus {
                status: 401,
                body: "{}".into()
            }
            .http_status(),
            502
        );
    }
}
