//! Per-request processing phase timing.

use metrics::histogram;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

/// Records how long the named phases of one request took.
///
/// Phases are logged together with the request's temp name when the
/// request finishes, successfully or not.
#[derive(Debug)]
pub struct StageTimer {
    tmp_name: String,
    started: Instant,
    stages: Mutex<Vec<(&'static str, Duration)>>,
}

impl StageTimer {
    pub fn new(tmp_name: impl Into<String>) -> Self {
        Self {
            tmp_name: tmp_name.into(),
            started: Instant::now(),
            stages: Mutex::new(Vec::new()),
        }
    }

    pub fn tmp_name(&self) -> &str {
        &self.tmp_name
    }

    /// Record a finished phase. Repeated phases add up.
    pub fn record(&self, stage: &'static str, elapsed: Duration) {
        histogram!("terrain_stage_duration_ms", "stage" => stage).record(elapsed.as_secs_f64() * 1000.0);
        let mut stages = self
            .stages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match stages.iter_mut().find(|(name, _)| *name == stage) {
            Some((_, total)) => *total += elapsed,
            None => stages.push((stage, elapsed)),
        }
    }

    /// Run `fut` as the phase `stage`.
    pub async fn measure<F, T>(&self, stage: &'static str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();
        let out = fut.await;
        self.record(stage, start.elapsed());
        out
    }

    /// Run `f` as the phase `stage`.
    pub fn measure_sync<T>(&self, stage: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(stage, start.elapsed());
        out
    }

    /// Recorded phases in the order they finished.
    pub fn stages(&self) -> Vec<(&'static str, Duration)> {
        self.stages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn total(&self) -> Duration {
        self.started.elapsed()
    }

    /// `stage=ms` pairs, e.g. `init=0 dem_access=412 rendering=3012`.
    pub fn protocol(&self) -> String {
        self.stages()
            .iter()
            .map(|(stage, d)| format!("{}={}", stage, d.as_millis()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Log all phases of the request.
    pub fn log(&self, request: &str, outcome: &str) {
        info!(
            tmp_name = %self.tmp_name,
            request = request,
            outcome = outcome,
            stages = %self.protocol(),
            total_ms = self.total().as_millis() as u64,
            "Request finished"
        );
    }
}
