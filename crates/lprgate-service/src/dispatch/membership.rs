use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Category reported when the member service knows nothing about a plate.
pub const DEFAULT_MEMBER_CATEGORY: &str = "CASUAL";

const LOOKUP_TIMEOUT_SECS: u64 = 5;

/// Resolves the membership category of a recognized plate.
#[async_trait]
pub trait MembershipLookup: Send + Sync {
    /// Never fails: unknown plates and lookup errors both resolve to
    /// [`DEFAULT_MEMBER_CATEGORY`].
    async fn category(&self, plate: &str) -> String;
}

pub struct HttpMembershipLookup {
    base_url: String,
    client: Client,
}

impl HttpMembershipLookup {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn fetch_category(&self, plate: &str) -> Result<Option<String>, String> {
        let url = format!(
            "{}/api/members/check-plat/{}",
            self.base_url,
            urlencoding::encode(plate)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("status={}", status.as_u16()));
        }
        let body: Value = response.json().await.map_err(|err| err.to_string())?;
        Ok(body
            .get("data")
            .and_then(|data| data.get("category"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string))
    }
}

#[async_trait]
impl MembershipLookup for HttpMembershipLookup {
    async fn category(&self, plate: &str) -> String {
        match self.fetch_category(plate).await {
            Ok(Some(category)) => category,
            Ok(None) => DEFAULT_MEMBER_CATEGORY.to_string(),
            Err(err) => {
                log::warn!("membership lookup failed: plate={plate}, err={err}");
                DEFAULT_MEMBER_CATEGORY.to_string()
            }
        }
    }
}
