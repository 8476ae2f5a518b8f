use serde::{Deserialize, Serialize};

pub const SUCCESS_CODE: &str = "SUCCESS";
pub const RECOGNIZED_MESSAGE: &str = "plate recognized successfully";

/// Payload of a successful recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionData {
    pub plate: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_member: Option<String>,
}

/// Envelope returned by the orchestrator and stored verbatim in
/// `plate_logs.response_final`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub status: u16,
    pub code: String,
    pub message: String,
    pub data: RecognitionData,
}

impl FinalResponse {
    pub fn recognized(data: RecognitionData) -> Self {
        Self {
            status: 200,
            code: SUCCESS_CODE.to_string(),
            message: RECOGNIZED_MESSAGE.to_string(),
            data,
        }
    }
}

/// Body of every JSON reply on the public HTTP surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiReply {
    pub status: u16,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiReply {
    pub fn success(status: u16, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            status,
            code: SUCCESS_CODE.to_string(),
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateLogSummary {
    pub id: i64,
    pub location_code: String,
    pub camera_id: String,
    pub transaction_no: Option<String>,
    pub plate: String,
    pub accuracy: String,
    pub image_url: String,
    pub captured_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateLogListResult {
    pub items: Vec<PlateLogSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyCreateResult {
    pub id: String,
    pub name: Option<String>,
    pub key: String,
}

/// Public view of a registered user; never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_response_omits_missing_member_status() {
        let resp = FinalResponse::recognized(RecognitionData {
            plate: "XYZ789".to_string(),
            score: 0.8,
            status_member: None,
        });
        let value = serde_json::to_value(&resp).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "status": 200,
                "code": "SUCCESS",
                "message": "plate recognized successfully",
                "data": { "plate": "XYZ789", "score": 0.8 }
            })
        );
    }

    #[test]
    fn error_reply_has_no_data_field() {
        let value = serde_json::to_value(ApiReply::error(400, "BAD_REQUEST", "image is required"))
            .expect("serialize");
        assert!(value.get("data").is_none());
        assert_eq!(value["code"], "BAD_REQUEST");
    }
}
