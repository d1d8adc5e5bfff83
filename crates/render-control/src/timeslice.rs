//! Fair scheduling of render starts.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Hands out render start times one slice apart, first come first served.
///
/// At most `max_wait_slices` slices may be outstanding; a request arriving
/// when the queue reaches that far ahead gets no slice.
#[derive(Debug)]
pub struct TimeSliceAssigner {
    slice: Duration,
    max_wait_slices: u32,
    next_free: Mutex<Option<Instant>>,
}

impl TimeSliceAssigner {
    pub fn new(slice: Duration, max_wait_slices: u32) -> Self {
        Self {
            slice,
            max_wait_slices,
            next_free: Mutex::new(None),
        }
    }

    pub fn slice(&self) -> Duration {
        self.slice
    }

    pub fn max_wait_slices(&self) -> u32 {
        self.max_wait_slices
    }

    /// Longest a granted request may have to wait.
    pub fn max_wait(&self) -> Duration {
        self.slice * self.max_wait_slices
    }

    /// Reserve the next free slice and return its start, or `None` when the
    /// queue is full.
    pub fn assign(&self) -> Option<Instant> {
        let now = Instant::now();
        let mut next_free = self
            .next_free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let start = match *next_free {
            Some(t) if t > now => t,
            _ => now,
        };
        if start - now >= self.max_wait() {
            return None;
        }
        *next_free = Some(start + self.slice);
        Some(start)
    }

    /// Slices currently reserved ahead of now.
    pub fn pending(&self) -> u32 {
        let now = Instant::now();
        let next_free = self
            .next_free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *next_free {
            Some(t) if t > now => {
                let ahead = (t - now).as_nanos();
                let slice = self.slice.as_nanos().max(1);
                ahead.div_ceil(slice) as u32
            }
            _ => 0,
        }
    }
}
