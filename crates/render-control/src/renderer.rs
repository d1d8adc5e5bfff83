//! Renderer abstraction and the POV-Ray subprocess implementation.
//!
//! A finished process does not mean the image is visible yet, so after the
//! process exits the output file is polled with the same deadline
//! discipline as the process itself.

use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One render invocation.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub scene_path: PathBuf,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Temporary artifact name of the request, for log correlation.
    pub tmp_name: String,
}

/// Turns a scene description into an image file.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `job` and return the path of the finished image.
    async fn render(&self, job: &RenderJob) -> Result<PathBuf>;
}

/// Runs POV-Ray as an external process.
#[derive(Debug, Clone)]
pub struct PovrayRenderer {
    executable: PathBuf,
    shell_command: Option<String>,
    working_dir: PathBuf,
    timeout: Duration,
    poll_checks: u32,
    immediate_termination: bool,
    quality: u8,
}

impl PovrayRenderer {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            executable: config.povray_exec.clone(),
            shell_command: config.shell_command.clone(),
            working_dir: config.working_dir.clone(),
            timeout: config.timeout(),
            poll_checks: config.output_poll_checks.max(1),
            immediate_termination: config.immediate_termination,
            quality: 3,
        }
    }

    fn arguments(&self, job: &RenderJob) -> Vec<String> {
        vec![
            format!("+I{}", job.scene_path.display()),
            format!("+O{}", job.output_path.display()),
            format!("+W{}", job.width),
            format!("+H{}", job.height),
            "+FN".to_string(),
            format!("+Q{}", self.quality),
            "+A".to_string(),
            "-D".to_string(),
        ]
    }

    fn command(&self, job: &RenderJob) -> Command {
        let mut cmd = match &self.shell_command {
            Some(shell) => {
                let mut cmd = Command::new(shell);
                cmd.arg(&self.executable);
                cmd
            }
            None => Command::new(&self.executable),
        };
        cmd.args(self.arguments(job))
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(!self.immediate_termination);
        cmd
    }

    fn poll_interval(&self) -> Duration {
        self.timeout / self.poll_checks
    }

    /// Wait until the output file exists and is not empty.
    async fn wait_for_output(&self, path: &Path) -> bool {
        for _ in 0..self.poll_checks {
            if let Ok(meta) = tokio::fs::metadata(path).await {
                if meta.len() > 0 {
                    return true;
                }
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
        false
    }

    /// Wait until the output file exists and its size stopped changing.
    async fn wait_for_stable_output(&self, path: &Path) -> bool {
        let mut last_len = 0;
        for _ in 0..self.poll_checks {
            if let Ok(meta) = tokio::fs::metadata(path).await {
                if meta.len() > 0 && meta.len() == last_len {
                    return true;
                }
                last_len = meta.len();
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
        false
    }
}

#[async_trait]
impl Renderer for PovrayRenderer {
    async fn render(&self, job: &RenderJob) -> Result<PathBuf> {
        let mut child = self
            .command(job)
            .spawn()
            .map_err(|e| RenderError::Spawn(format!("{}: {}", self.executable.display(), e)))?;

        debug!(tmp_name = %job.tmp_name, pid = ?child.id(), "Renderer started");

        if self.immediate_termination {
            // The process is left running; the image is picked up as soon
            // as it is complete.
            if self.wait_for_stable_output(&job.output_path).await {
                return Ok(job.output_path.clone());
            }
            warn!(tmp_name = %job.tmp_name, "Renderer output did not settle");
            return Err(RenderError::Timeout(self.timeout));
        }

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(RenderError::Failed(e.to_string())),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(tmp_name = %job.tmp_name, error = %e, "Failed to kill renderer");
                }
                warn!(tmp_name = %job.tmp_name, timeout_ms = self.timeout.as_millis() as u64, "Renderer timed out");
                return Err(RenderError::Timeout(self.timeout));
            }
        };

        if !status.success() {
            warn!(tmp_name = %job.tmp_name, status = %status, "Renderer exited unsuccessfully");
            return Err(RenderError::Failed(status.to_string()));
        }

        if !self.wait_for_output(&job.output_path).await {
            return Err(RenderError::NoImage(job.output_path.clone()));
        }

        info!(tmp_name = %job.tmp_name, output = %job.output_path.display(), "Render finished");
        Ok(job.output_path.clone())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;

    /// Renderer running `script` through `/bin/sh`. The script receives the
    /// POV-Ray arguments; `$2` is `+O<output>`.
    fn renderer(dir: &Path, script: &str, timeout_ms: u64) -> PovrayRenderer {
        let path = dir.join("fake-povray.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", script).unwrap();

        let config = RenderConfig {
            working_dir: dir.to_path_buf(),
            povray_exec: path,
            shell_command: Some("/bin/sh".to_string()),
            timeout_ms,
            output_poll_checks: 10,
            ..Default::default()
        };
        PovrayRenderer::from_config(&config)
    }

    fn job(dir: &Path) -> RenderJob {
        RenderJob {
            scene_path: dir.join("~1_1.pov"),
            output_path: dir.join("~1_1.png"),
            width: 64,
            height: 48,
            tmp_name: "~1_1".to_string(),
        }
    }

    #[test]
    fn test_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path(), "exit 0", 1000);
        let args = r.arguments(&job(dir.path()));
        assert!(args[0].starts_with("+I") && args[0].ends_with("~1_1.pov"));
        assert!(args[1].starts_with("+O") && args[1].ends_with("~1_1.png"));
        assert_eq!(&args[2..], &["+W64", "+H48", "+FN", "+Q3", "+A", "-D"]);
    }

    #[tokio::test]
    async fn test_render_success() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path(), r#"printf png > "${2#+O}""#, 5000);
        let job = job(dir.path());

        let out = r.render(&job).await.unwrap();
        assert_eq!(out, job.output_path);
        assert_eq!(std::fs::read(&out).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_render_failure_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path(), "exit 3", 5000);
        let err = r.render(&job(dir.path())).await.unwrap_err();
        assert!(matches!(err, RenderError::Failed(_)));
        assert!(err.is_renderer_fault());
    }

    #[tokio::test]
    async fn test_render_without_image() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path(), "exit 0", 200);
        let err = r.render(&job(dir.path())).await.unwrap_err();
        assert!(matches!(err, RenderError::NoImage(_)));
    }

    #[tokio::test]
    async fn test_render_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path(), "sleep 5", 200);
        let err = r.render(&job(dir.path())).await.unwrap_err();
        assert!(matches!(err, RenderError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig {
            working_dir: dir.path().to_path_buf(),
            povray_exec: dir.path().join("no-such-povray"),
            ..Default::default()
        };
        let err = PovrayRenderer::from_config(&config)
            .render(&job(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Spawn(_)));
    }
}
