//! Supervisor unit rendering

use std::path::PathBuf;

use super::error::InstanceError;
use super::instance::InstanceRecord;
use super::provision::{write_once, PRIMARY_CONFIG_FILE};
use super::settings::UnitSettings;

/// Companion configuration consumed by the management API process
pub const SECONDARY_CONFIG_FILE: &str = "secondary.conf";

/// Renders unit definitions from instance records
#[derive(Debug, Clone)]
pub struct UnitRenderer {
    settings: UnitSettings,
}

impl UnitRenderer {
    pub fn new(settings: UnitSettings) -> Self {
        Self { settings }
    }

    /// Unit for the controller process. Pure: same record, same text.
    pub fn render_primary_unit(&self, record: &InstanceRecord) -> String {
        let s = &self.settings;
        let controller_dir = record.controller_dir.display();
        format!(
            "[Unit]
Description=Controller instance {id}
After=network.target

[Service]
Type=simple
User={user}
Environment=INSTANCE_ID={id}
Environment=INSTANCE_PORT={port}
ExecStart={python} {controller_dir}/{entry} {config} -l {log}
Restart=always
WorkingDirectory={controller_dir}

[Install]
WantedBy=multi-user.target
",
            id = record.id,
            user = s.user,
            port = record.primary_port,
            python = s.python,
            entry = s.primary_entry,
            config = record.config_dir.join(PRIMARY_CONFIG_FILE).display(),
            log = record.logs_dir().join("controller.log").display(),
        )
    }

    /// Unit for the management API process.
    ///
    /// Also writes `secondary.conf` bound to the record's secondary port if
    /// the config directory does not have one yet; an existing file is left
    /// untouched.
    pub fn render_secondary_unit(&self, record: &InstanceRecord) -> Result<String, InstanceError> {
        let companion = self.secondary_config_path(record);
        write_once(&companion, &self.render_secondary_config(record))?;

        let s = &self.settings;
        Ok(format!(
            "[Unit]
Description=Management API instance {id}
After=network.target

[Service]
Type=simple
User={user}
ExecStart={python} -m {module} -c {companion}
Restart=always
WorkingDirectory={config_dir}

[Install]
WantedBy=multi-user.target
",
            id = record.id,
            user = s.user,
            python = s.python,
            module = s.secondary_module,
            companion = companion.display(),
            config_dir = record.config_dir.display(),
        ))
    }

    pub fn secondary_config_path(&self, record: &InstanceRecord) -> PathBuf {
        record.config_dir.join(SECONDARY_CONFIG_FILE)
    }

    fn render_secondary_config(&self, record: &InstanceRecord) -> String {
        format!(
            "[server]\nhost: {}\nport: {}\n\n[authorization]\ntrusted_clients: {}\n",
            self.settings.secondary_host, record.secondary_port, self.settings.trusted_clients
        )
    }
}
