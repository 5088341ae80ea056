//! Error taxonomy for instance management

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use super::instance::{InstanceId, PortFamily};

/// Errors raised by the registry, allocator, provisioner, supervisor bridge
/// and orchestrator.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// Durable registry data exists but cannot be parsed into records
    #[error("instance registry at {path:?} is corrupt: {source}")]
    StoreCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no instance with id {0}")]
    InstanceNotFound(InstanceId),

    /// The registry already holds the largest representable id
    #[error("no instance id left after {0}")]
    IdSpaceExhausted(InstanceId),

    #[error("no free {family} port found after probing upward from {base}")]
    PortSpaceExhausted { family: PortFamily, base: u16 },

    #[error("supervisor did not answer `{command}` within {timeout:?}")]
    SupervisorUnresponsive { command: String, timeout: Duration },

    /// An installer script or template source that an operation needs is absent
    #[error("required resource is missing: {}", .0.display())]
    ResourceMissing(PathBuf),

    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: ExitStatus },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl InstanceError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the operator may simply try the command again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PortSpaceExhausted { .. } | Self::SupervisorUnresponsive { .. }
        )
    }
}

/// A failed best-effort cleanup step. Collected instead of aborting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub step: &'static str,
    pub target: String,
    pub message: String,
}

impl CleanupWarning {
    pub fn new(step: &'static str, target: impl Into<String>, message: impl ToString) -> Self {
        Self {
            step,
            target: target.into(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.step, self.target, self.message)
    }
}
