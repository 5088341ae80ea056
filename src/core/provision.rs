//! Filesystem provisioning - Instance trees, controller clones, default configs

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::{debug, info};

use super::error::{CleanupWarning, InstanceError};
use super::instance::{InstanceId, InstanceRecord};
use super::settings::Settings;

/// Name of the base configuration file in every config directory
pub const PRIMARY_CONFIG_FILE: &str = "primary.cfg";

/// Subdirectories created under each instance root
const INSTANCE_SUBDIRS: [&str; 3] = ["config", "logs", "comms"];

/// Obtains a working copy of the controller codebase
pub trait CodeFetcher: Send + Sync + 'static {
    fn fetch(&self, source: &Path, dest: &Path) -> Result<(), InstanceError>;
}

/// Shallow `git clone` of the template repository
#[derive(Debug, Clone, Default)]
pub struct GitFetcher;

impl GitFetcher {
    /// git ignores `--depth` for plain local paths, so local templates are
    /// addressed as `file://` URLs
    fn clone_url(source: &Path) -> Result<String, InstanceError> {
        let absolute = source
            .canonicalize()
            .map_err(|e| InstanceError::io(format!("resolving {}", source.display()), e))?;
        Ok(format!("file://{}", absolute.display()))
    }
}

impl CodeFetcher for GitFetcher {
    fn fetch(&self, source: &Path, dest: &Path) -> Result<(), InstanceError> {
        let url = Self::clone_url(source)?;
        let mut cmd = Command::new("git");
        cmd.arg("clone").arg("--depth").arg("1").arg(&url).arg(dest);
        let command = format!("git clone --depth 1 {} {}", url, dest.display());
        debug!("run: {}", command);

        let status = cmd
            .stdin(Stdio::null())
            .status()
            .map_err(|e| InstanceError::io("spawning git", e))?;
        if !status.success() {
            return Err(InstanceError::CommandFailed { command, status });
        }
        Ok(())
    }
}

/// Creates and removes per-instance filesystem state
#[derive(Clone)]
pub struct Provisioner {
    instance_base: PathBuf,
    code_base: PathBuf,
    controller_template: PathBuf,
    primary_config: String,
    fetcher: Arc<dyn CodeFetcher>,
}

impl Provisioner {
    pub fn new(settings: &Settings, fetcher: Arc<dyn CodeFetcher>) -> Self {
        Self {
            instance_base: settings.paths.instance_base.clone(),
            code_base: settings.paths.code_base.clone(),
            controller_template: settings.paths.controller_template.clone(),
            primary_config: settings.defaults.primary_config.clone(),
            fetcher,
        }
    }

    /// `<instance base>/instance_{id}`
    pub fn instance_root(&self, id: InstanceId) -> PathBuf {
        self.instance_base.join(format!("instance_{}", id.0))
    }

    /// `<code base>/controller_{id}`
    pub fn controller_dir(&self, id: InstanceId) -> PathBuf {
        self.code_base.join(format!("controller_{}", id.0))
    }

    /// Ensure `instance_{id}/{config,logs,comms}` exist. Never deletes.
    pub fn create_instance_tree(&self, id: InstanceId) -> Result<PathBuf, InstanceError> {
        let root = self.instance_root(id);
        for sub in INSTANCE_SUBDIRS {
            let dir = root.join(sub);
            std::fs::create_dir_all(&dir)
                .map_err(|e| InstanceError::io(format!("creating {}", dir.display()), e))?;
        }
        info!("Instance tree ready at {:?}", root);
        Ok(root)
    }

    /// Clone the controller template for `id`.
    ///
    /// An existing target directory is returned as-is, without re-cloning or
    /// checking what it contains.
    pub async fn acquire_controller_code(&self, id: InstanceId) -> Result<PathBuf, InstanceError> {
        let target = self.controller_dir(id);
        if target.exists() {
            info!("Controller code already present at {:?}", target);
            return Ok(target);
        }
        if !self.controller_template.exists() {
            return Err(InstanceError::ResourceMissing(
                self.controller_template.clone(),
            ));
        }

        let fetcher = Arc::clone(&self.fetcher);
        let source = self.controller_template.clone();
        let dest = target.clone();
        tokio::task::spawn_blocking(move || fetcher.fetch(&source, &dest))
            .await
            .map_err(|e| InstanceError::io("controller clone task", std::io::Error::other(e)))??;

        info!("Cloned controller code into {:?}", target);
        Ok(target)
    }

    /// Write the base configuration unless one is already there.
    ///
    /// An existing file is never replaced, even if the configured default
    /// content has changed since it was written.
    pub fn write_default_config(&self, config_dir: &Path) -> Result<bool, InstanceError> {
        write_once(&config_dir.join(PRIMARY_CONFIG_FILE), &self.primary_config)
    }

    /// Remove the instance root and controller clone, collecting failures.
    pub fn remove_instance(&self, record: &InstanceRecord) -> Vec<CleanupWarning> {
        let mut warnings = Vec::new();
        for (step, dir) in [
            ("remove instance tree", record.instance_root()),
            ("remove controller code", record.controller_dir.as_path()),
        ] {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => info!("Removed {:?}", dir),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warnings.push(CleanupWarning::new(step, dir.display().to_string(), e)),
            }
        }
        warnings
    }
}

/// Create `path` with `contents` if it does not exist. Returns whether it wrote.
pub fn write_once(path: &Path, contents: &str) -> Result<bool, InstanceError> {
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, contents)
        .map_err(|e| InstanceError::io(format!("writing {}", path.display()), e))?;
    info!("Wrote {:?}", path);
    Ok(true)
}

/// Test fetcher that creates the destination directory and counts calls
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct DirFetcher {
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl CodeFetcher for DirFetcher {
    fn fetch(&self, _source: &Path, dest: &Path) -> Result<(), InstanceError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        std::fs::create_dir_all(dest.join(".git"))
            .map_err(|e| InstanceError::io("fake clone", e))
    }
}
