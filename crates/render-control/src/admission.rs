//! Admission control for the external renderer.
//!
//! Two independent layers of back-pressure guard the renderer:
//!
//! 1. an optional [`TimeSliceAssigner`] that spaces render starts apart and
//!    rejects requests once its queue is full, and
//! 2. a hard ceiling on concurrently running renderer processes.
//!
//! A request that got a slice can still be rejected by the ceiling; the
//! slice is then lost.

use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::timeslice::TimeSliceAssigner;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use terrain_common::BusyReason;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info};

/// Admission counters, readable without locking.
#[derive(Debug, Default)]
pub struct AdmissionStats {
    pub admitted: AtomicU64,
    pub rejected_no_slice: AtomicU64,
    pub rejected_ceiling: AtomicU64,
    pub delayed: AtomicU64,
}

/// Point-in-time view of the controller for status pages.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionSnapshot {
    pub active: usize,
    pub max_instances: usize,
    pub time_slices_enabled: bool,
    pub slice_ms: Option<u64>,
    pub max_wait_slices: Option<u32>,
    pub pending_slices: u32,
    pub admitted: u64,
    pub rejected_no_slice: u64,
    pub rejected_ceiling: u64,
    pub delayed: u64,
}

/// Gate in front of the renderer, shared by all request handlers.
#[derive(Debug)]
pub struct RenderAdmissionController {
    slices: Option<TimeSliceAssigner>,
    instances: Arc<Semaphore>,
    max_instances: usize,
    stats: Arc<AdmissionStats>,
}

impl RenderAdmissionController {
    pub fn new(max_instances: usize, slices: Option<TimeSliceAssigner>) -> Self {
        Self {
            slices,
            instances: Arc::new(Semaphore::new(max_instances)),
            max_instances,
            stats: Arc::new(AdmissionStats::default()),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        let slices = config
            .use_time_slices
            .then(|| TimeSliceAssigner::new(config.time_slice(), config.max_wait_slices));
        Self::new(config.max_instances, slices)
    }

    pub fn stats(&self) -> &AdmissionStats {
        &self.stats
    }

    /// Renderer processes currently admitted.
    pub fn active(&self) -> usize {
        self.max_instances - self.instances.available_permits()
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Wait for a time slice (when enabled) and take one renderer instance.
    ///
    /// The returned permit gives the instance back when dropped, on every
    /// exit path of the caller.
    pub async fn admit(&self, request_id: &str) -> Result<RenderPermit> {
        let mut waited = Duration::ZERO;

        if let Some(slices) = &self.slices {
            let Some(start) = slices.assign() else {
                self.reject(request_id, BusyReason::NoTimeSlice);
                return Err(RenderError::Busy(BusyReason::NoTimeSlice));
            };
            let now = Instant::now();
            if start > now {
                waited = start - now;
                self.stats.delayed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    tmp_name = request_id,
                    delay_ms = waited.as_millis() as u64,
                    "Rendering delayed until time slice"
                );
                tokio::time::sleep_until(start).await;
            }
        }

        let permit = match self.instances.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.reject(request_id, BusyReason::InstanceCeiling);
                return Err(RenderError::Busy(BusyReason::InstanceCeiling));
            }
        };

        self.stats.admitted.fetch_add(1, Ordering::Relaxed);
        counter!("terrain_render_admitted_total").increment(1);
        let active = self.active();
        gauge!("terrain_render_active").set(active as f64);
        debug!(tmp_name = request_id, active = active, "Render admitted");

        Ok(RenderPermit {
            permit: Some(permit),
            instances: self.instances.clone(),
            max_instances: self.max_instances,
            admitted_at: Instant::now(),
            waited,
        })
    }

    fn reject(&self, request_id: &str, reason: BusyReason) {
        match reason {
            BusyReason::NoTimeSlice => &self.stats.rejected_no_slice,
            BusyReason::InstanceCeiling => &self.stats.rejected_ceiling,
        }
        .fetch_add(1, Ordering::Relaxed);
        counter!("terrain_render_rejected_total", "reason" => reason.as_str()).increment(1);
        info!(tmp_name = request_id, reason = %reason, "Render rejected, server busy");
    }

    pub fn snapshot(&self) -> AdmissionSnapshot {
        AdmissionSnapshot {
            active: self.active(),
            max_instances: self.max_instances,
            time_slices_enabled: self.slices.is_some(),
            slice_ms: self.slices.as_ref().map(|s| s.slice().as_millis() as u64),
            max_wait_slices: self.slices.as_ref().map(|s| s.max_wait_slices()),
            pending_slices: self.slices.as_ref().map(|s| s.pending()).unwrap_or(0),
            admitted: self.stats.admitted.load(Ordering::Relaxed),
            rejected_no_slice: self.stats.rejected_no_slice.load(Ordering::Relaxed),
            rejected_ceiling: self.stats.rejected_ceiling.load(Ordering::Relaxed),
            delayed: self.stats.delayed.load(Ordering::Relaxed),
        }
    }
}

/// One admitted renderer instance.
#[derive(Debug)]
pub struct RenderPermit {
    permit: Option<OwnedSemaphorePermit>,
    instances: Arc<Semaphore>,
    max_instances: usize,
    admitted_at: Instant,
    waited: Duration,
}

impl RenderPermit {
    /// Time spent waiting for the time slice.
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl Drop for RenderPermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        let active = self.max_instances - self.instances.available_permits();
        gauge!("terrain_render_active").set(active as f64);
        histogram!("terrain_render_duration_ms")
            .record(self.admitted_at.elapsed().as_secs_f64() * 1000.0);
    }
}
