//! In-memory supervisor used by orchestrator tests

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use super::systemd::unit_file_path;
use super::{ServiceStatus, Supervisor};
use crate::core::{CleanupWarning, InstanceError};

/// Records every call, writes unit files into a scratch directory and
/// tracks which units are running.
#[derive(Debug)]
pub struct RecordingSupervisor {
    pub unit_dir: PathBuf,
    pub calls: Mutex<Vec<String>>,
    running: Mutex<HashSet<String>>,
    /// `reload_and_enable` reports the supervisor as unresponsive
    pub fail_enable: bool,
    /// `stop` and `disable` steps report failures
    pub fail_stop: bool,
}

impl RecordingSupervisor {
    pub fn new(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
            calls: Mutex::new(Vec::new()),
            running: Mutex::new(HashSet::new()),
            fail_enable: false,
            fail_stop: false,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn unit_file_count(&self) -> usize {
        std::fs::read_dir(&self.unit_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn unresponsive(command: String) -> InstanceError {
        InstanceError::SupervisorUnresponsive {
            command,
            timeout: std::time::Duration::from_secs(1),
        }
    }
}

impl Supervisor for RecordingSupervisor {
    async fn install_unit(&self, name: &str, contents: &str) -> Result<PathBuf, InstanceError> {
        self.record(format!("install {name}"));
        std::fs::create_dir_all(&self.unit_dir).unwrap();
        let path = unit_file_path(&self.unit_dir, name);
        std::fs::write(&path, contents).unwrap();
        Ok(path)
    }

    async fn reload_and_enable(&self, name: &str) -> Result<(), InstanceError> {
        self.record(format!("enable {name}"));
        if self.fail_enable {
            return Err(Self::unresponsive(format!("systemctl enable {name}")));
        }
        self.running.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<(), InstanceError> {
        self.record(format!("restart {name}"));
        self.running.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn stop_and_disable(&self, name: &str) -> Vec<CleanupWarning> {
        self.record(format!("stop {name}"));
        let mut warnings = Vec::new();
        if self.fail_stop {
            warnings.push(CleanupWarning::new("stop", name, "exit status: 5"));
            warnings.push(CleanupWarning::new("disable", name, "exit status: 1"));
        }
        self.running.lock().unwrap().remove(name);
        let _ = std::fs::remove_file(unit_file_path(&self.unit_dir, name));
        warnings
    }

    async fn status(&self, name: &str) -> Result<ServiceStatus, InstanceError> {
        self.record(format!("status {name}"));
        if self.running.lock().unwrap().contains(name) {
            Ok(ServiceStatus::Active)
        } else if unit_file_path(&self.unit_dir, name).exists() {
            Ok(ServiceStatus::Inactive)
        } else {
            Ok(ServiceStatus::Unknown)
        }
    }
}
