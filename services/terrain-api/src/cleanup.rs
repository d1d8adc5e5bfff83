//! Session expiry and preserved file cleanup background task.
//!
//! Idle sessions are dropped together with the files cached in them.
//! Optionally, request files kept after failed renders are purged through
//! their ledgers once they are old enough. Files tracked by a live request
//! or session are never touched.

use anyhow::Result;
use render_control::SessionConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::state::AppState;

/// Configuration for the sweep task.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Whether the sweep is enabled
    pub enabled: bool,
    /// How often to sweep (in seconds)
    pub interval_secs: u64,
    /// Age after which files kept after failed renders are deleted; 0 keeps them
    pub stale_file_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::from_session_config(&SessionConfig::default())
    }
}

impl SweepConfig {
    pub fn from_session_config(session: &SessionConfig) -> Self {
        Self {
            enabled: true,
            interval_secs: session.sweep_interval_secs,
            stale_file_secs: 0,
        }
    }

    /// Apply `SESSION_SWEEP_ENABLED` and `RENDER_STALE_FILE_SECS`.
    pub fn from_env(session: &SessionConfig) -> Self {
        let mut config = Self::from_session_config(session);

        if let Ok(val) = std::env::var("SESSION_SWEEP_ENABLED") {
            config.enabled = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("RENDER_STALE_FILE_SECS") {
            if let Ok(secs) = val.parse() {
                config.stale_file_secs = secs;
            }
        }

        config
    }
}

/// Statistics from a sweep run.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SweepStats {
    /// Number of sessions expired
    pub sessions_expired: usize,
    /// Number of preserved request files deleted
    pub files_deleted: usize,
}

/// Background task expiring sessions and preserved request files.
pub struct SweepTask {
    state: Arc<AppState>,
    config: SweepConfig,
}

impl SweepTask {
    pub fn new(state: Arc<AppState>, config: SweepConfig) -> Self {
        Self { state, config }
    }

    /// Run the sweep once.
    pub async fn run_once(&self) -> Result<SweepStats> {
        let mut stats = SweepStats {
            sessions_expired: self.state.sessions.sweep_expired().await,
            ..Default::default()
        };

        if self.config.stale_file_secs > 0 {
            let max_age = Duration::from_secs(self.config.stale_file_secs);
            stats.files_deleted = self.state.preserved.expire(max_age);
        }

        if stats != SweepStats::default() {
            info!(
                sessions = stats.sessions_expired,
                files = stats.files_deleted,
                "Sweep complete"
            );
        } else {
            debug!("Sweep found nothing to remove");
        }

        Ok(stats)
    }

    /// Run the sweep in a loop.
    pub async fn run_forever(self) {
        if !self.config.enabled {
            info!("Session sweep disabled");
            return;
        }

        info!(
            interval_secs = self.config.interval_secs,
            stale_file_secs = self.config.stale_file_secs,
            "Starting session sweep background task"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        loop {
            // The first tick completes immediately.
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Sweep failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_config_follows_session_config() {
        let session = SessionConfig {
            sweep_interval_secs: 7,
            ..Default::default()
        };
        let config = SweepConfig::from_session_config(&session);
        assert!(config.enabled);
        assert_eq!(config.interval_secs, 7);
        assert_eq!(config.stale_file_secs, 0);
    }
}
