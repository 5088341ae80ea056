//! Core module - Instance records, allocation, provisioning and lifecycle orchestration

pub mod allocator;
mod error;
mod instance;
mod orchestrator;
pub mod provision;
pub mod settings;
pub mod units;

pub use error::{CleanupWarning, InstanceError};
pub use instance::{InstanceId, InstanceRecord};
pub use orchestrator::{
    CreateOptions, DeleteOutcome, DiagnosticReport, Orchestrator, PathCheck, RestartOutcome,
};
pub use provision::GitFetcher;
pub use settings::Settings;
