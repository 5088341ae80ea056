//! systemd implementation of the supervisor bridge

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::{ServiceStatus, Supervisor};
use crate::core::settings::SupervisorSettings;
use crate::core::{CleanupWarning, InstanceError};

/// `systemctl is-active` exit code for a loaded but inactive unit
const IS_ACTIVE_INACTIVE: i32 = 3;

/// Shells out to `systemctl`, optionally through `sudo`
#[derive(Debug, Clone)]
pub struct SystemdSupervisor {
    unit_dir: PathBuf,
    systemctl: String,
    use_sudo: bool,
    timeout: Duration,
}

impl SystemdSupervisor {
    pub fn new(settings: &SupervisorSettings) -> Self {
        Self {
            unit_dir: settings.unit_dir.clone(),
            systemctl: settings.systemctl.clone(),
            use_sudo: settings.use_sudo,
            timeout: settings.command_timeout(),
        }
    }

    /// `<unit dir>/<name>.service`
    pub fn unit_path(&self, name: &str) -> PathBuf {
        unit_file_path(&self.unit_dir, name)
    }

    /// Program and arguments for one systemctl invocation
    fn command_line(&self, args: &[&str]) -> Vec<String> {
        let mut line = Vec::with_capacity(args.len() + 2);
        if self.use_sudo {
            line.push("sudo".to_string());
        }
        line.push(self.systemctl.clone());
        line.extend(args.iter().map(|a| a.to_string()));
        line
    }

    /// Run systemctl under the configured timeout and return its exit status
    async fn run(&self, args: &[&str]) -> Result<ExitStatus, InstanceError> {
        let line = self.command_line(args);
        let rendered = line.join(" ");
        debug!("run: {}", rendered);

        let mut cmd = Command::new(&line[0]);
        cmd.args(&line[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.status()).await {
            Ok(status) => status.map_err(|e| InstanceError::io(format!("spawning `{rendered}`"), e)),
            Err(_) => Err(InstanceError::SupervisorUnresponsive {
                command: rendered,
                timeout: self.timeout,
            }),
        }
    }

    /// Run and require a zero exit
    async fn run_checked(&self, args: &[&str]) -> Result<(), InstanceError> {
        let status = self.run(args).await?;
        if status.success() {
            Ok(())
        } else {
            Err(InstanceError::CommandFailed {
                command: self.command_line(args).join(" "),
                status,
            })
        }
    }

    /// Run as a best-effort step, turning any failure into a warning
    async fn run_step(&self, step: &'static str, args: &[&str], name: &str) -> Option<CleanupWarning> {
        match self.run_checked(args).await {
            Ok(()) => None,
            Err(e) => {
                warn!("{} {} failed: {}", step, name, e);
                Some(CleanupWarning::new(step, name, e))
            }
        }
    }
}

impl Supervisor for SystemdSupervisor {
    #[instrument(skip(self, contents))]
    async fn install_unit(&self, name: &str, contents: &str) -> Result<PathBuf, InstanceError> {
        let path = self.unit_path(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| InstanceError::io(format!("writing unit {}", path.display()), e))?;
        info!("Wrote unit file {:?}", path);
        Ok(path)
    }

    #[instrument(skip(self))]
    async fn reload_and_enable(&self, name: &str) -> Result<(), InstanceError> {
        self.run_checked(&["daemon-reload"]).await?;
        self.run_checked(&["enable", name]).await?;
        self.run_checked(&["start", name]).await?;
        info!("Enabled and started {}", name);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn restart(&self, name: &str) -> Result<(), InstanceError> {
        self.run_checked(&["restart", name]).await?;
        info!("Restarted {}", name);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_and_disable(&self, name: &str) -> Vec<CleanupWarning> {
        let mut warnings = Vec::new();
        warnings.extend(self.run_step("stop", &["stop", name], name).await);
        warnings.extend(self.run_step("disable", &["disable", name], name).await);

        let path = self.unit_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed unit file {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove unit file {:?}: {}", path, e);
                warnings.push(CleanupWarning::new("remove unit file", name, e));
            }
        }

        warnings.extend(self.run_step("daemon-reload", &["daemon-reload"], name).await);
        info!("Stopped and disabled {}", name);
        warnings
    }

    #[instrument(skip(self))]
    async fn status(&self, name: &str) -> Result<ServiceStatus, InstanceError> {
        if name.is_empty() {
            return Ok(ServiceStatus::Unknown);
        }
        let status = self.run(&["is-active", name]).await?;
        Ok(status_from_exit_code(status.code()))
    }
}

/// `<unit dir>/<name>.service`
pub fn unit_file_path(unit_dir: &Path, name: &str) -> PathBuf {
    unit_dir.join(format!("{name}.service"))
}

/// Map an `is-active` exit code: 0 is active, 3 is inactive, anything else
/// (including death by signal) is unknown.
pub fn status_from_exit_code(code: Option<i32>) -> ServiceStatus {
    match code {
        Some(0) => ServiceStatus::Active,
        Some(IS_ACTIVE_INACTIVE) => ServiceStatus::Inactive,
        _ => ServiceStatus::Unknown,
    }
}
