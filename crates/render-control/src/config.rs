//! Configuration for rendering and client sessions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Renderer and admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Directory for scenes, height fields, drapes and rendered images.
    pub working_dir: PathBuf,

    /// POV-Ray executable.
    pub povray_exec: PathBuf,

    /// Program the executable is launched through, e.g. `/bin/sh`.
    pub shell_command: Option<String>,

    /// Ceiling on concurrently running renderer processes.
    pub max_instances: usize,

    /// Hand out time slices before admitting renders.
    pub use_time_slices: bool,

    /// Number of slices a request may be scheduled ahead.
    pub max_wait_slices: u32,

    /// Length of one time slice in milliseconds.
    pub time_slice_ms: u64,

    /// Upper bound for one renderer run in milliseconds.
    pub timeout_ms: u64,

    /// How many times the output image is polled within the timeout.
    pub output_poll_checks: u32,

    /// Do not wait for the renderer to exit; poll for its image instead.
    pub immediate_termination: bool,

    /// Drape used when a request names none.
    pub default_drape: Option<PathBuf>,

    /// Keep a request's temp files when the renderer fails.
    pub keep_temp_on_error: bool,

    /// Proxy for drape downloads.
    pub http_proxy: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("./work"),
            povray_exec: PathBuf::from("povray"),
            shell_command: None,
            max_instances: 3,
            use_time_slices: true,
            max_wait_slices: 5,
            time_slice_ms: 4000,
            timeout_ms: 20000,
            output_poll_checks: 40,
            immediate_termination: false,
            default_drape: None,
            keep_temp_on_error: false,
            http_proxy: None,
        }
    }
}

impl RenderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RENDER_WORKING_DIR") {
            config.working_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("RENDER_POVRAY_EXEC") {
            config.povray_exec = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("RENDER_SHELL_COMMAND") {
            if !val.is_empty() {
                config.shell_command = Some(val);
            }
        }

        if let Ok(val) = std::env::var("RENDER_MAX_INSTANCES") {
            if let Ok(n) = val.parse() {
                config.max_instances = n;
            }
        }

        if let Ok(val) = std::env::var("RENDER_USE_TIME_SLICES") {
            config.use_time_slices = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("RENDER_MAX_WAIT_SLICES") {
            if let Ok(n) = val.parse() {
                config.max_wait_slices = n;
            }
        }

        if let Ok(val) = std::env::var("RENDER_TIME_SLICE_MS") {
            if let Ok(ms) = val.parse() {
                config.time_slice_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("RENDER_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.timeout_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("RENDER_OUTPUT_POLL_CHECKS") {
            if let Ok(n) = val.parse() {
                config.output_poll_checks = n;
            }
        }

        if let Ok(val) = std::env::var("RENDER_IMMEDIATE_TERMINATION") {
            config.immediate_termination = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("RENDER_DEFAULT_DRAPE") {
            if !val.is_empty() {
                config.default_drape = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("RENDER_KEEP_TEMP_ON_ERROR") {
            config.keep_temp_on_error = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("RENDER_HTTP_PROXY") {
            if !val.is_empty() {
                config.http_proxy = Some(val);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_instances == 0 {
            return Err("max_instances must be > 0".to_string());
        }
        if self.use_time_slices && self.max_wait_slices == 0 {
            return Err("max_wait_slices must be > 0 when time slices are used".to_string());
        }
        if self.use_time_slices && self.time_slice_ms == 0 {
            return Err("time_slice_ms must be > 0 when time slices are used".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be > 0".to_string());
        }
        if self.output_poll_checks == 0 {
            return Err("output_poll_checks must be > 0".to_string());
        }
        Ok(())
    }

    pub fn time_slice(&self) -> Duration {
        Duration::from_millis(self.time_slice_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Pause between two checks for the output image.
    pub fn poll_interval(&self) -> Duration {
        self.timeout() / self.output_poll_checks.max(1)
    }
}

/// Client session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session and its files are discarded.
    pub max_inactive_secs: u64,

    /// Interval of the background sweep for expired sessions.
    pub sweep_interval_secs: u64,

    /// Most sessions kept at once; the least recently used one is dropped
    /// beyond this.
    pub max_count: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_inactive_secs: 300,
            sweep_interval_secs: 30,
            max_count: 1000,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SESSION_MAX_INACTIVE_SECS") {
            if let Ok(secs) = val.parse() {
                config.max_inactive_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("SESSION_SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = val.parse() {
                config.sweep_interval_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("SESSION_MAX_COUNT") {
            if let Ok(n) = val.parse() {
                config.max_count = n;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_inactive_secs == 0 {
            return Err("max_inactive_secs must be > 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be > 0".to_string());
        }
        if self.max_count == 0 {
            return Err("max_count must be > 0".to_string());
        }
        Ok(())
    }

    pub fn max_inactive(&self) -> Duration {
        Duration::from_secs(self.max_inactive_secs)
    }
}
