use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tracing::info;

/// Which fetch path served a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Http,
    Rendered,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rendered_pages: u64,
    pub requests_per_minute: f64,
    pub avg_response_time_ms: f64,
    pub rate_limiter_wait_time_ms: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

/// Shared request counters for every fetcher in a run.
#[derive(Clone)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<FetchMetrics>>,
    started: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(Mutex::new(FetchMetrics::default())),
            started: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FetchMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_request_start(&self, kind: FetchKind) -> RequestTracker {
        RequestTracker {
            start_time: Instant::now(),
            kind,
            collector: self.clone(),
        }
    }

    /// Adds to the total time spent waiting on the rate limiter.
    pub fn record_rate_limit_wait(&self, duration: Duration) {
        self.lock().rate_limiter_wait_time_ms += duration.as_secs_f64() * 1000.0;
    }

    pub fn get_metrics(&self) -> FetchMetrics {
        let mut metrics = self.lock().clone();
        let minutes = self.started.elapsed().as_secs_f64() / 60.0;
        if minutes > 0.0 {
            metrics.requests_per_minute = metrics.total_requests as f64 / minutes;
        }
        metrics
    }

    pub fn log_summary(&self) {
        let metrics = self.get_metrics();
        info!(
            "Fetch summary: {} requests ({} ok, {} failed, {} rendered), avg {:.0}ms, {:.1}s waiting on rate limit",
            metrics.total_requests,
            metrics.successful_requests,
            metrics.failed_requests,
            metrics.rendered_pages,
            metrics.avg_response_time_ms,
            metrics.rate_limiter_wait_time_ms / 1000.0
        );
        if let Some(error) = &metrics.last_error {
            info!("Last fetch error: {}", error);
        }
    }
}

/// Times one request; consumed by `succeed` or `fail`.
pub struct RequestTracker {
    start_time: Instant,
    kind: FetchKind,
    collector: MetricsCollector,
}

impl RequestTracker {
    pub fn succeed(self) {
        self.finish(None);
    }

    pub fn fail(self, error: impl ToString) {
        self.finish(Some(error.to_string()));
    }

    fn finish(self, error: Option<String>) {
        let duration = self.start_time.elapsed();
        let mut metrics = self.collector.lock();

        metrics.total_requests += 1;
        if self.kind == FetchKind::Rendered {
            metrics.rendered_pages += 1;
        }
        match error {
            None => metrics.successful_requests += 1,
            Some(error) => {
                metrics.failed_requests += 1;
                metrics.last_error = Some(error);
                metrics.last_error_time = Some(Utc::now());
            }
        }

        // Exponential moving average
        let alpha = 0.1;
        let sample = duration.as_secs_f64() * 1000.0;
        metrics.avg_response_time_ms = if metrics.total_requests == 1 {
            sample
        } else {
            metrics.avg_response_time_ms * (1.0 - alpha) + sample * alpha
        };
    }
}
