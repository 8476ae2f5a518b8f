use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};

use super::BackendEndpoint;

/// Decides whether a backend currently accepts work. Implementations fail
/// closed: any transport problem is reported as "unhealthy", never as an error.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self, endpoint: &BackendEndpoint) -> bool;
}

pub struct HttpHealthProbe {
    client: Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn send_probe(&self, method: Method, url: &str) -> Option<(StatusCode, Option<String>)> {
        match self.client.request(method.clone(), url).send().await {
            Ok(response) => {
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                Some((response.status(), content_type))
            }
            Err(err) => {
                log::debug!("probe transport failed: method={method}, url={url}, err={err}");
                None
            }
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_healthy(&self, endpoint: &BackendEndpoint) -> bool {
        let url = endpoint.inference_url();
        let Some((mut status, mut content_type)) = self.send_probe(Method::HEAD, &url).await else {
            return false;
        };

        // 中文注释：部分识别后端不支持 HEAD，但服务本身是活的；405 时改用 GET 再判一次，避免误判为下线。
        if status == StatusCode::METHOD_NOT_ALLOWED {
            let Some(retried) = self.send_probe(Method::GET, &url).await else {
                return false;
            };
            (status, content_type) = retried;
        }

        let healthy = classify_probe_response(status.as_u16(), content_type.as_deref());
        log::debug!(
            "probe verdict: url={}, status={}, content_type={}, healthy={}",
            url,
            status.as_u16(),
            content_type.as_deref().unwrap_or("-"),
            healthy
        );
        healthy
    }
}

/// Anything below 500 means the recognizer process is alive (401/403/405
/// included). A present content type must be JSON: reverse proxies answer
/// 200 with an HTML placeholder page when the backend behind them is gone.
pub fn classify_probe_response(status: u16, content_type: Option<&str>) -> bool {
    if status >= 500 {
        return false;
    }
    match content_type.map(str::trim).filter(|value| !value.is_empty()) {
        None => true,
        Some(value) => is_json_content_type(value),
    }
}

pub(crate) fn is_json_content_type(value: &str) -> bool {
    let media_type = value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    media_type == "application/json"
        || (media_type.starts_with("application/") && media_type.ends_with("+json"))
}

/// Remembers verdicts for `ttl` so hot-path selection does not probe every
/// backend on every call.
pub struct CachedHealthProbe {
    inner: Arc<dyn HealthProbe>,
    ttl: Duration,
    verdicts: Mutex<HashMap<String, (bool, Instant)>>,
}

impl CachedHealthProbe {
    pub fn new(inner: Arc<dyn HealthProbe>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    fn cached_verdict(&self, key: &str) -> Option<bool> {
        let Ok(mut map) = self.verdicts.lock() else {
            return None;
        };
        let now = Instant::now();
        map.retain(|_, (_, checked_at)| now.duration_since(*checked_at) < self.ttl);
        map.get(key).map(|(healthy, _)| *healthy)
    }

    fn store_verdict(&self, key: &str, healthy: bool) {
        if let Ok(mut map) = self.verdicts.lock() {
            map.insert(key.to_string(), (healthy, Instant::now()));
        }
    }
}

#[async_trait]
impl HealthProbe for CachedHealthProbe {
    async fn is_healthy(&self, endpoint: &BackendEndpoint) -> bool {
        if let Some(healthy) = self.cached_verdict(endpoint.base_address()) {
            return healthy;
        }
        let healthy = self.inner.is_healthy(endpoint).await;
        self.store_verdict(endpoint.base_address(), healthy);
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::test_support::{MockBackend, MockReply};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn html_placeholder_page_is_unhealthy() {
        assert!(!classify_probe_response(200, Some("text/html; charset=utf-8")));
        assert!(!classify_probe_response(200, Some("TEXT/HTML")));
    }

    #[test]
    fn client_errors_with_json_or_no_content_type_are_healthy() {
        assert!(classify_probe_response(401, Some("application/json")));
        assert!(classify_probe_response(401, None));
        assert!(classify_probe_response(403, Some("application/json; charset=utf-8")));
        assert!(classify_probe_response(405, Some("")));
        assert!(classify_probe_response(200, Some("application/problem+json")));
    }

    #[test]
    fn server_errors_are_unhealthy() {
        assert!(!classify_probe_response(503, None));
        assert!(!classify_probe_response(500, Some("application/json")));
    }

    #[tokio::test]
    async fn head_probe_against_json_backend_is_healthy() {
        let backend = MockBackend::start(|req| match req.method.as_str() {
            "HEAD" => MockReply::json(200, "{}"),
            _ => MockReply::json(500, "{}"),
        });
        let probe = HttpHealthProbe::new(Duration::from_secs(2)).expect("probe client");
        assert!(probe.is_healthy(&BackendEndpoint::new(backend.base_url())).await);
        let seen = backend.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "HEAD");
        assert_eq!(seen[0].url, "/v1/plate-reader/");
    }

    #[tokio::test]
    async fn method_not_allowed_falls_back_to_get() {
        let backend = MockBackend::start(|req| match req.method.as_str() {
            "HEAD" => MockReply::json(405, ""),
            "GET" => MockReply::json(401, r#"{"detail":"Authentication credentials were not provided."}"#),
            _ => MockReply::json(500, "{}"),
        });
        let probe = HttpHealthProbe::new(Duration::from_secs(2)).expect("probe client");
        assert!(probe.is_healthy(&BackendEndpoint::new(backend.base_url())).await);
        let methods: Vec<String> = backend.requests().into_iter().map(|r| r.method).collect();
        assert_eq!(methods, vec!["HEAD".to_string(), "GET".to_string()]);
    }

    #[tokio::test]
    async fn get_fallback_serving_html_is_unhealthy() {
        let backend = MockBackend::start(|req| match req.method.as_str() {
            "HEAD" => MockReply::json(405, ""),
            _ => MockReply::html(200, "<html>502 Bad Gateway</html>"),
        });
        let probe = HttpHealthProbe::new(Duration::from_secs(2)).expect("probe client");
        assert!(!probe.is_healthy(&BackendEndpoint::new(backend.base_url())).await);
    }

    #[tokio::test]
    async fn unreachable_backend_is_unhealthy() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let probe = HttpHealthProbe::new(Duration::from_millis(500)).expect("probe client");
        assert!(
            !probe
                .is_healthy(&BackendEndpoint::new(format!("http://127.0.0.1:{port}")))
                .await
        );
    }

    struct CountingProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HealthProbe for CountingProbe {
        async fn is_healthy(&self, _endpoint: &BackendEndpoint) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn cached_probe_reuses_verdict_within_ttl() {
        let inner = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedHealthProbe::new(inner.clone(), Duration::from_secs(60));
        let endpoint = BackendEndpoint::new("http://plate-recognizer-1:8080");
        assert!(cached.is_healthy(&endpoint).await);
        assert!(cached.is_healthy(&endpoint).await);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        let other = BackendEndpoint::new("http://plate-recognizer-2:8081");
        assert!(cached.is_healthy(&other).await);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cached_probe_expires_verdicts() {
        let inner = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedHealthProbe::new(inner.clone(), Duration::from_millis(20));
        let endpoint = BackendEndpoint::new("http://plate-recognizer-1:8080");
        assert!(cached.is_healthy(&endpoint).await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cached.is_healthy(&endpoint).await);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
