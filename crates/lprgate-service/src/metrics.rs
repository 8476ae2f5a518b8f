use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

static RECOGNIZE_TOTAL_REQUESTS: AtomicUsize = AtomicUsize::new(0);
static RECOGNIZE_ACTIVE_REQUESTS: AtomicUsize = AtomicUsize::new(0);
static RECOGNIZE_SUCCESSES: AtomicUsize = AtomicUsize::new(0);
static RECOGNIZE_FAILURES: AtomicUsize = AtomicUsize::new(0);
static RECOGNIZE_DURATION_MS_TOTAL: AtomicU64 = AtomicU64::new(0);
static NO_PLATE_RESULTS: AtomicUsize = AtomicUsize::new(0);
static BACKEND_EXHAUSTED: AtomicUsize = AtomicUsize::new(0);
static PROBE_UNHEALTHY: AtomicUsize = AtomicUsize::new(0);
static ARCHIVE_FAILURES: AtomicUsize = AtomicUsize::new(0);
static RECONCILE_FAILURES: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DispatchMetricsSnapshot {
    pub total_requests: usize,
    pub active_requests: usize,
    pub successes: usize,
    pub failures: usize,
    pub duration_ms_total: u64,
    pub no_plate: usize,
    pub backend_exhausted: usize,
    pub probe_unhealthy: usize,
    pub archive_failures: usize,
    pub reconcile_failures: usize,
}

/// Counts one recognition while alive; anything not marked successful on
/// drop is a failure (errors and dropped/cancelled calls alike).
pub(crate) struct RecognizeRequestGuard {
    started_at: Instant,
    failed: bool,
}

impl RecognizeRequestGuard {
    pub(crate) fn mark_success(&mut self) {
        self.failed = false;
    }
}

impl Drop for RecognizeRequestGuard {
    fn drop(&mut self) {
        RECOGNIZE_ACTIVE_REQUESTS.fetch_sub(1, Ordering::Relaxed);
        RECOGNIZE_DURATION_MS_TOTAL.fetch_add(duration_to_millis(self.started_at.elapsed()), Ordering::Relaxed);
        if self.failed {
            RECOGNIZE_FAILURES.fetch_add(1, Ordering::Relaxed);
        } else {
            RECOGNIZE_SUCCESSES.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub(crate) fn begin_recognize_request() -> RecognizeRequestGuard {
    RECOGNIZE_TOTAL_REQUESTS.fetch_add(1, Ordering::Relaxed);
    RECOGNIZE_ACTIVE_REQUESTS.fetch_add(1, Ordering::Relaxed);
    RecognizeRequestGuard {
        started_at: Instant::now(),
        failed: true,
    }
}

pub(crate) fn record_no_plate() {
    NO_PLATE_RESULTS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_backend_exhausted() {
    BACKEND_EXHAUSTED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_probe_unhealthy() {
    PROBE_UNHEALTHY.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_archive_failure() {
    ARCHIVE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_reconcile_failure() {
    RECONCILE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn duration_to_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

pub(crate) fn dispatch_metrics_snapshot() -> DispatchMetricsSnapshot {
    DispatchMetricsSnapshot {
        total_requests: RECOGNIZE_TOTAL_REQUESTS.load(Ordering::Relaxed),
        active_requests: RECOGNIZE_ACTIVE_REQUESTS.load(Ordering::Relaxed),
        successes: RECOGNIZE_SUCCESSES.load(Ordering::Relaxed),
        failures: RECOGNIZE_FAILURES.load(Ordering::Relaxed),
        duration_ms_total: RECOGNIZE_DURATION_MS_TOTAL.load(Ordering::Relaxed),
        no_plate: NO_PLATE_RESULTS.load(Ordering::Relaxed),
        backend_exhausted: BACKEND_EXHAUSTED.load(Ordering::Relaxed),
        probe_unhealthy: PROBE_UNHEALTHY.load(Ordering::Relaxed),
        archive_failures: ARCHIVE_FAILURES.load(Ordering::Relaxed),
        reconcile_failures: RECONCILE_FAILURES.load(Ordering::Relaxed),
    }
}

pub(crate) fn dispatch_metrics_prometheus() -> String {
    render_prometheus(&dispatch_metrics_snapshot())
}

// 中文注释：_count 只统计已结束的请求，和 _total 耗时的累计口径一致；进行中的请求不计入。
fn render_prometheus(m: &DispatchMetricsSnapshot) -> String {
    format!(
        "lprgate_recognize_requests_total {}\n\
lprgate_recognize_requests_active {}\n\
lprgate_recognize_success_total {}\n\
lprgate_recognize_failures_total {}\n\
lprgate_recognize_duration_milliseconds_total {}\n\
lprgate_recognize_duration_milliseconds_count {}\n\
lprgate_no_plate_total {}\n\
lprgate_backend_exhausted_total {}\n\
lprgate_probe_unhealthy_total {}\n\
lprgate_archive_failures_total {}\n\
lprgate_reconcile_failures_total {}\n",
        m.total_requests,
        m.active_requests,
        m.successes,
        m.failures,
        m.duration_ms_total,
        m.successes + m.failures,
        m.no_plate,
        m.backend_exhausted,
        m.probe_unhealthy,
        m.archive_failures,
        m.reconcile_failures,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_counts_unmarked_requests_as_failures() {
        let before = dispatch_metrics_snapshot();
        {
            let _guard = begin_recognize_request();
        }
        {
            let mut guard = begin_recognize_request();
            guard.mark_success();
        }
        let after = dispatch_metrics_snapshot();
        assert!(after.total_requests >= before.total_requests + 2);
        assert!(after.failures > before.failures);
        assert!(after.successes > before.successes);
    }

    #[test]
    fn prometheus_text_lists_every_counter() {
        let text = dispatch_metrics_prometheus();
        for name in [
            "lprgate_recognize_requests_total",
            "lprgate_recognize_requests_active",
            "lprgate_recognize_success_total",
            "lprgate_recognize_failures_total",
            "lprgate_no_plate_total",
            "lprgate_backend_exhausted_total",
            "lprgate_probe_unhealthy_total",
            "lprgate_archive_failures_total",
            "lprgate_reconcile_failures_total",
            "lprgate_recognize_duration_milliseconds_total",
        ] {
            assert!(text.contains(&format!("{name} ")), "missing {name}");
        }
    }

    #[test]
    fn duration_count_excludes_in_flight_requests() {
        let snapshot = DispatchMetricsSnapshot {
            total_requests: 5,
            active_requests: 2,
            successes: 2,
            failures: 1,
            duration_ms_total: 900,
            no_plate: 0,
            backend_exhausted: 0,
            probe_unhealthy: 0,
            archive_failures: 0,
            reconcile_failures: 0,
        };
        let text = render_prometheus(&snapshot);
        assert!(text.contains("lprgate_recognize_duration_milliseconds_count 3\n"));
        assert!(text.contains("lprgate_recognize_duration_milliseconds_total 900\n"));
        assert!(text.contains("lprgate_recognize_requests_total 5\n"));
    }
}
