//! Process supervisor integration
//!
//! The orchestrator only talks to the OS supervisor through [`Supervisor`].

pub mod systemd;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::{CleanupWarning, InstanceError};

pub use systemd::SystemdSupervisor;

/// Live state of a unit as reported by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Inactive,
    Unknown,
}

impl ServiceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Unknown => "unknown",
        }
    }
}

/// Operations against named supervisor units.
///
/// Everything except [`Supervisor::stop_and_disable`] propagates failures.
pub trait Supervisor: Send + Sync {
    /// Write the unit definition for `name`, returning its path
    fn install_unit(
        &self,
        name: &str,
        contents: &str,
    ) -> impl Future<Output = Result<PathBuf, InstanceError>> + Send;

    /// Reload manager state, enable the unit, then start it
    fn reload_and_enable(&self, name: &str)
        -> impl Future<Output = Result<(), InstanceError>> + Send;

    fn restart(&self, name: &str) -> impl Future<Output = Result<(), InstanceError>> + Send;

    /// Stop, disable, delete the unit file and reload. Each step is
    /// attempted regardless of earlier failures; failures come back as
    /// warnings.
    fn stop_and_disable(&self, name: &str) -> impl Future<Output = Vec<CleanupWarning>> + Send;

    /// Never fails for a unit that does not exist; that maps to `Unknown`
    fn status(&self, name: &str)
        -> impl Future<Output = Result<ServiceStatus, InstanceError>> + Send;
}
