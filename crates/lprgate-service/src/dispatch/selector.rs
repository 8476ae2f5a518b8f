use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{with_cancel, BackendEndpoint, DispatchError, HealthProbe};

/// Round-robin over the configured backends, skipping the ones the probe
/// rejects. Built once at startup and shared by every request worker; the
/// cursor is the only mutable state and is advanced with fetch-and-add.
pub struct EndpointSelector {
    endpoints: Vec<BackendEndpoint>,
    cursor: AtomicU64,
    probe: Arc<dyn HealthProbe>,
}

impl EndpointSelector {
    pub fn new(endpoints: Vec<BackendEndpoint>, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            endpoints,
            cursor: AtomicU64::new(0),
            probe,
        }
    }

    /// Returns the inference URL of the first healthy backend found within
    /// one pass (`endpoints.len()` probes at most).
    pub async fn pick_endpoint(&self, cancel: &CancellationToken) -> Result<String, DispatchError> {
        let total = self.endpoints.len();
        if total == 0 {
            log::error!("endpoint selection failed: no recognizer endpoints configured");
            crate::metrics::record_backend_exhausted();
            return Err(DispatchError::NoHealthyBackend { attempts: 0 });
        }

        for attempt in 1..=total {
            if cancel.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }
            // 中文注释：每次尝试都重新自增游标，并发请求会交错推进，不会有单个调用在一轮里反复探测同一个下标。
            let endpoint = &self.endpoints[self.next_index(total)];
            if with_cancel(cancel, self.probe.is_healthy(endpoint)).await? {
                log::info!(
                    "endpoint selected: base={}, attempt={}/{}",
                    endpoint.base_address(),
                    attempt,
                    total
                );
                return Ok(endpoint.inference_url());
            }
            crate::metrics::record_probe_unhealthy();
            log::warn!(
                "endpoint unhealthy, skipping: base={}, attempt={}/{}",
                endpoint.base_address(),
                attempt,
                total
            );
        }

        crate::metrics::record_backend_exhausted();
        log::error!("endpoint selection failed: all {total} recognizer endpoints unhealthy");
        Err(DispatchError::NoHealthyBackend { attempts: total })
    }

    fn next_index(&self, total: usize) -> usize {
        let value = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        (value % total as u64) as usize
    }
}
