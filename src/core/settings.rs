//! Tool settings, loaded from TOML

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

/// Application name, used for default config and data locations
pub const APP_DIR: &str = "instancectl";

/// Base configuration written into every new instance's config directory
pub const DEFAULT_PRIMARY_CONFIG: &str = "# instance base config\n[include extras/main.cfg]\n";

/// All settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub ports: PortSettings,
    pub supervisor: SupervisorSettings,
    pub units: UnitSettings,
    pub defaults: DefaultFiles,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Registry file
    pub registry: PathBuf,
    /// Parent of every `instance_{id}` tree
    pub instance_base: PathBuf,
    /// Parent of every `controller_{id}` clone
    pub code_base: PathBuf,
    /// Repository cloned for each new instance
    pub controller_template: PathBuf,
    /// Script run by `install`
    pub installer: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs::data_dir().unwrap_or_else(|| home.join(".local").join("share"));
        Self {
            registry: data_dir.join(APP_DIR).join("instances.json"),
            instance_base: home.join("instance_data"),
            code_base: home.clone(),
            controller_template: home.join("controller"),
            installer: home.join("installer.sh"),
        }
    }
}

/// Port allocation bases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    pub primary_base: u16,
    pub secondary_base: u16,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            primary_base: 7125,
            secondary_base: 7126,
        }
    }
}

/// Process supervisor access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Where unit files are written
    pub unit_dir: PathBuf,
    /// Supervisor control binary
    pub systemctl: String,
    /// Prefix every supervisor command with `sudo`
    pub use_sudo: bool,
    /// Per-command timeout in seconds
    pub command_timeout_secs: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            unit_dir: PathBuf::from("/etc/systemd/system"),
            systemctl: "systemctl".into(),
            use_sudo: true,
            command_timeout_secs: 30,
        }
    }
}

impl SupervisorSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Values substituted into unit templates and the companion config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitSettings {
    /// Account the units run as
    pub user: String,
    pub python: String,
    /// Controller entry point, relative to the controller clone
    pub primary_entry: String,
    /// Python module started by the management API unit
    pub secondary_module: String,
    pub secondary_host: String,
    pub trusted_clients: String,
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self {
            user: std::env::var("USER").unwrap_or_else(|_| "root".into()),
            python: "/usr/bin/python3".into(),
            primary_entry: "klippy/klippy.py".into(),
            secondary_module: "moonraker".into(),
            secondary_host: "0.0.0.0".into(),
            trusted_clients: "127.0.0.1".into(),
        }
    }
}

/// Contents of files written once per instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultFiles {
    pub primary_config: String,
}

impl Default for DefaultFiles {
    fn default() -> Self {
        Self {
            primary_config: DEFAULT_PRIMARY_CONFIG.into(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location if it exists,
    /// or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    /// `<config dir>/instancectl/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    }

    /// Reject values no operation can work with
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.ports.primary_base > 0, "ports.primary_base must be > 0");
        anyhow::ensure!(
            self.ports.secondary_base > 0,
            "ports.secondary_base must be > 0"
        );
        anyhow::ensure!(
            self.ports.primary_base != self.ports.secondary_base,
            "ports.primary_base and ports.secondary_base must differ"
        );
        anyhow::ensure!(
            self.supervisor.command_timeout_secs >= 1,
            "supervisor.command_timeout_secs must be >= 1"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.ports.primary_base, 7125);
        assert_eq!(settings.ports.secondary_base, 7126);
        assert_eq!(settings.supervisor.command_timeout(), Duration::from_secs(30));
        assert!(settings.paths.registry.ends_with("instancectl/instances.json"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let toml = r#"
[ports]
primary_base = 8000

[supervisor]
use_sudo = false
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.ports.primary_base, 8000);
        assert_eq!(settings.ports.secondary_base, 7126);
        assert!(!settings.supervisor.use_sudo);
        assert_eq!(settings.supervisor.systemctl, "systemctl");
        assert_eq!(settings.defaults.primary_config, DEFAULT_PRIMARY_CONFIG);
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[paths]\nregistry = \"/tmp/reg.json\"\n[ports]\nsecondary_base = 9001\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.paths.registry, PathBuf::from("/tmp/reg.json"));
        assert_eq!(settings.ports.secondary_base, 9001);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.supervisor.command_timeout_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.ports.secondary_base = settings.ports.primary_base;
        assert!(settings.validate().is_err());
    }
}
