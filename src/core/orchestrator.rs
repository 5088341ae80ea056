//! Lifecycle orchestration - Create, list, restart, delete, diagnose, install

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::allocator;
use super::error::{CleanupWarning, InstanceError};
use super::instance::{InstanceId, InstanceRecord, InstanceSummary};
use super::provision::{CodeFetcher, Provisioner, PRIMARY_CONFIG_FILE};
use super::settings::Settings;
use super::units::UnitRenderer;
use crate::persistence::Registry;
use crate::platform::{ServiceStatus, Supervisor};

/// Options for `create`
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Skip all supervisor integration
    pub sandbox: bool,
    /// Display name; defaults to `instance_{id}`
    pub name: Option<String>,
}

/// Result of `restart`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted,
    /// Sandbox instances have no units to restart
    SkippedSandbox,
}

/// Result of `delete`
#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    /// Refused because `force` was not given; nothing was touched
    Refused,
    Deleted {
        record: InstanceRecord,
        /// Cleanup steps that failed but did not block the registry update
        warnings: Vec<CleanupWarning>,
    },
}

/// A path and whether it currently exists
#[derive(Debug, Clone, Serialize)]
pub struct PathCheck {
    pub path: PathBuf,
    pub present: bool,
}

impl PathCheck {
    fn of(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            present: path.exists(),
        }
    }
}

/// Live status of one unit
#[derive(Debug, Clone, Serialize)]
pub struct UnitCheck {
    pub name: String,
    pub status: ServiceStatus,
}

/// Observations gathered by `diagnose`
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub id: InstanceId,
    pub name: String,
    pub config_dir: PathCheck,
    pub controller_dir: PathCheck,
    /// `None` for sandbox instances, which have no services
    pub services: Option<Vec<UnitCheck>>,
    pub primary_config: PathCheck,
    pub secondary_config: PathCheck,
}

/// Composes the registry, allocator, provisioner, unit renderer and
/// supervisor. Constructed once per process and passed to command handlers.
pub struct Orchestrator<S> {
    registry: Registry,
    provisioner: Provisioner,
    units: UnitRenderer,
    supervisor: S,
    ports: (u16, u16),
    installer: PathBuf,
    /// Serializes registry mutations (create, delete)
    write_lock: Mutex<()>,
}

impl<S: Supervisor> Orchestrator<S> {
    pub fn new(settings: &Settings, supervisor: S, fetcher: Arc<dyn CodeFetcher>) -> Self {
        Self {
            registry: Registry::new(settings.paths.registry.clone()),
            provisioner: Provisioner::new(settings, fetcher),
            units: UnitRenderer::new(settings.units.clone()),
            supervisor,
            ports: (settings.ports.primary_base, settings.ports.secondary_base),
            installer: settings.paths.installer.clone(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Provision a new instance and, unless sandboxed, install and start its units.
    ///
    /// Failures after the filesystem step leave an orphan behind (directories,
    /// possibly units) that is not recorded in the registry.
    pub async fn create(&self, opts: CreateOptions) -> Result<InstanceRecord, InstanceError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.registry.load()?;
        let id = allocator::next_id(&records)?;
        let ports = allocator::allocate_ports(&records, self.ports.0, self.ports.1)?;
        let root = self.provisioner.create_instance_tree(id)?;

        let provisioned = async {
            let controller_dir = self.provisioner.acquire_controller_code(id).await?;
            let config_dir = root.join("config");
            self.provisioner.write_default_config(&config_dir)?;

            let mut record = InstanceRecord::new(
                id,
                opts.name.clone(),
                config_dir,
                controller_dir,
                ports,
                opts.sandbox,
            );
            if opts.sandbox {
                warn!("Creating sandbox instance {} (no services)", id);
            } else {
                self.bring_up(&record).await?;
                record.active = true;
            }

            records.push(record.clone());
            self.registry.save(&records)?;
            Ok::<_, InstanceError>(record)
        }
        .await;

        match provisioned {
            Ok(record) => {
                info!(
                    "Created instance {} (ports {}/{}, sandbox={})",
                    record.id, record.primary_port, record.secondary_port, record.sandbox
                );
                Ok(record)
            }
            Err(e) => {
                error!(
                    "Create of instance {} failed; {:?} orphaned until removed by hand: {}",
                    id,
                    self.orphaned_paths(id),
                    e
                );
                Err(e)
            }
        }
    }

    /// Filesystem state of `id` that a failed create left behind
    fn orphaned_paths(&self, id: InstanceId) -> Vec<PathBuf> {
        [
            self.provisioner.instance_root(id),
            self.provisioner.controller_dir(id),
        ]
        .into_iter()
        .filter(|path| path.exists())
        .collect()
    }

    async fn bring_up(&self, record: &InstanceRecord) -> Result<(), InstanceError> {
        let primary = self.units.render_primary_unit(record);
        self.supervisor
            .install_unit(&record.primary_service_name, &primary)
            .await?;
        self.supervisor
            .reload_and_enable(&record.primary_service_name)
            .await?;

        let secondary = self.units.render_secondary_unit(record)?;
        self.supervisor
            .install_unit(&record.secondary_service_name, &secondary)
            .await?;
        self.supervisor
            .reload_and_enable(&record.secondary_service_name)
            .await?;
        Ok(())
    }

    /// All records with their status derived from the stored flag
    pub fn list(&self) -> Result<Vec<InstanceSummary>, InstanceError> {
        Ok(self
            .registry
            .load()?
            .into_iter()
            .map(InstanceSummary::from)
            .collect())
    }

    /// Restart both units of a live instance, without checking current status
    pub async fn restart(&self, id: InstanceId) -> Result<RestartOutcome, InstanceError> {
        let records = self.registry.load()?;
        let record = Registry::find(&records, id)?;

        if record.sandbox {
            warn!("Instance {} is sandboxed (no services to restart)", id);
            return Ok(RestartOutcome::SkippedSandbox);
        }

        for unit in record.unit_names() {
            self.supervisor.restart(unit).await?;
        }
        info!("Restarted services for instance {}", id);
        Ok(RestartOutcome::Restarted)
    }

    /// Tear down an instance. Without `force` nothing happens.
    ///
    /// Supervisor and filesystem cleanup are best-effort; their failures are
    /// returned as warnings and never keep the record in the registry.
    pub async fn delete(&self, id: InstanceId, force: bool) -> Result<DeleteOutcome, InstanceError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.registry.load()?;
        let position = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(InstanceError::InstanceNotFound(id))?;

        if !force {
            warn!("Refusing to delete instance {} without --force", id);
            return Ok(DeleteOutcome::Refused);
        }

        let record = records.remove(position);
        let mut warnings = Vec::new();
        if !record.sandbox {
            for unit in record.unit_names() {
                warnings.extend(self.supervisor.stop_and_disable(unit).await);
            }
        }
        warnings.extend(self.provisioner.remove_instance(&record));

        self.registry.save(&records)?;

        for warning in &warnings {
            warn!("Cleanup of instance {} incomplete: {}", id, warning);
        }
        info!("Deleted instance {}", id);
        Ok(DeleteOutcome::Deleted { record, warnings })
    }

    /// Report directory, unit and config-file state without changing anything
    pub async fn diagnose(&self, id: InstanceId) -> Result<DiagnosticReport, InstanceError> {
        let records = self.registry.load()?;
        let record = Registry::find(&records, id)?;

        let services = if record.sandbox {
            None
        } else {
            let mut checks = Vec::with_capacity(2);
            for unit in record.unit_names() {
                checks.push(UnitCheck {
                    name: unit.to_string(),
                    status: self.supervisor.status(unit).await?,
                });
            }
            Some(checks)
        };

        Ok(DiagnosticReport {
            id: record.id,
            name: record.name.clone(),
            config_dir: PathCheck::of(&record.config_dir),
            controller_dir: PathCheck::of(&record.controller_dir),
            services,
            primary_config: PathCheck::of(&record.config_dir.join(PRIMARY_CONFIG_FILE)),
            secondary_config: PathCheck::of(&self.units.secondary_config_path(record)),
        })
    }

    /// Run the installer script against an instance's config directory
    pub async fn install(&self, id: InstanceId) -> Result<(), InstanceError> {
        let records = self.registry.load()?;
        let record = Registry::find(&records, id)?;

        if !self.installer.exists() {
            return Err(InstanceError::ResourceMissing(self.installer.clone()));
        }

        let command = format!("bash {}", self.installer.display());
        info!("Running installer with CONFIG_DIR={:?}", record.config_dir);
        let status = tokio::process::Command::new("bash")
            .arg(&self.installer)
            .env("CONFIG_DIR", &record.config_dir)
            .status()
            .await
            .map_err(|e| InstanceError::io(format!("spawning `{command}`"), e))?;
        if !status.success() {
            return Err(InstanceError::CommandFailed { command, status });
        }

        info!("Installed into instance {} ({})", record.id, record.name);
        Ok(())
    }
}
