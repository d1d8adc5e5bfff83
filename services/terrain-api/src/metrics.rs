//! Application metrics collection and reporting.

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;

/// Request kinds counted separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    View,
    Dem,
    Profile,
    Sheet,
    Capabilities,
    Monitor,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::View => "view",
            RequestKind::Dem => "dem",
            RequestKind::Profile => "profile",
            RequestKind::Sheet => "sheet",
            RequestKind::Capabilities => "capabilities",
            RequestKind::Monitor => "monitor",
        }
    }
}

/// Metrics collector for the terrain API.
#[derive(Debug)]
pub struct MetricsCollector {
    pub view_requests: AtomicU64,
    pub dem_requests: AtomicU64,
    pub profile_requests: AtomicU64,
    pub other_requests: AtomicU64,
    pub request_errors: AtomicU64,

    pub renders_total: AtomicU64,
    pub render_errors: AtomicU64,

    /// Timing stats (stored as microseconds)
    render_times: RwLock<TimingStats>,
    assembly_times: RwLock<TimingStats>,

    start_time: Instant,
}

#[derive(Debug, Default)]
struct TimingStats {
    count: u64,
    total_us: u64,
    min_us: u64,
    max_us: u64,
    last_us: u64,
}

impl TimingStats {
    fn record(&mut self, duration_us: u64) {
        self.count += 1;
        self.total_us += duration_us;
        self.last_us = duration_us;
        if self.count == 1 || duration_us < self.min_us {
            self.min_us = duration_us;
        }
        self.max_us = self.max_us.max(duration_us);
    }

    fn summary(&self) -> TimingSummary {
        let avg_ms = if self.count == 0 {
            0.0
        } else {
            self.total_us as f64 / self.count as f64 / 1000.0
        };
        TimingSummary {
            count: self.count,
            avg_ms,
            min_ms: self.min_us as f64 / 1000.0,
            max_ms: self.max_us as f64 / 1000.0,
            last_ms: self.last_us as f64 / 1000.0,
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            view_requests: AtomicU64::new(0),
            dem_requests: AtomicU64::new(0),
            profile_requests: AtomicU64::new(0),
            other_requests: AtomicU64::new(0),
            request_errors: AtomicU64::new(0),
            renders_total: AtomicU64::new(0),
            render_errors: AtomicU64::new(0),
            render_times: RwLock::new(TimingStats::default()),
            assembly_times: RwLock::new(TimingStats::default()),
            start_time: Instant::now(),
        }
    }

    pub fn record_request(&self, kind: RequestKind) {
        match kind {
            RequestKind::View => &self.view_requests,
            RequestKind::Dem => &self.dem_requests,
            RequestKind::Profile => &self.profile_requests,
            _ => &self.other_requests,
        }
        .fetch_add(1, Ordering::Relaxed);
        counter!("terrain_requests_total", "request" => kind.as_str()).increment(1);
    }

    /// Record a request that ended with an error response.
    pub fn record_error(&self, code: u16) {
        self.request_errors.fetch_add(1, Ordering::Relaxed);
        counter!("terrain_request_errors_total", "code" => code.to_string()).increment(1);
    }

    /// Record a renderer run.
    pub async fn record_render(&self, duration_us: u64, success: bool) {
        self.renders_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.render_errors.fetch_add(1, Ordering::Relaxed);
        }
        histogram!("terrain_render_duration_ms").record(duration_us as f64 / 1000.0);
        self.render_times.write().await.record(duration_us);
    }

    /// Record a terrain assembly.
    pub async fn record_assembly(&self, duration_us: u64) {
        histogram!("terrain_assembly_duration_ms").record(duration_us as f64 / 1000.0);
        self.assembly_times.write().await.record(duration_us);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            view_requests: self.view_requests.load(Ordering::Relaxed),
            dem_requests: self.dem_requests.load(Ordering::Relaxed),
            profile_requests: self.profile_requests.load(Ordering::Relaxed),
            other_requests: self.other_requests.load(Ordering::Relaxed),
            request_errors: self.request_errors.load(Ordering::Relaxed),
            renders_total: self.renders_total.load(Ordering::Relaxed),
            render_errors: self.render_errors.load(Ordering::Relaxed),
            render: self.render_times.read().await.summary(),
            assembly: self.assembly_times.read().await.summary(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Count and duration figures of one timed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSummary {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub last_ms: f64,
}

/// Snapshot of current metrics for JSON serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub view_requests: u64,
    pub dem_requests: u64,
    pub profile_requests: u64,
    pub other_requests: u64,
    pub request_errors: u64,
    pub renders_total: u64,
    pub render_errors: u64,
    pub render: TimingSummary,
    pub assembly: TimingSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_render_timing_summary() {
        let metrics = MetricsCollector::new();
        metrics.record_render(2_000, true).await;
        metrics.record_render(4_000, false).await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.renders_total, 2);
        assert_eq!(snap.render_errors, 1);
        assert_eq!(snap.render.count, 2);
        assert_eq!(snap.render.avg_ms, 3.0);
        assert_eq!(snap.render.min_ms, 2.0);
        assert_eq!(snap.render.max_ms, 4.0);
        assert_eq!(snap.render.last_ms, 4.0);
    }

    #[test]
    fn test_request_counters() {
        let metrics = MetricsCollector::new();
        metrics.record_request(RequestKind::View);
        metrics.record_request(RequestKind::Sheet);
        metrics.record_request(RequestKind::Monitor);
        assert_eq!(metrics.view_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.other_requests.load(Ordering::Relaxed), 2);
    }
}
