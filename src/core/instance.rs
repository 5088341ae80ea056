//! Instance records - The only persisted entity

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Unique, monotonically assigned identifier for an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u32);

impl InstanceId {
    /// Default display name, e.g. `instance_3`
    pub fn default_name(&self) -> String {
        format!("instance_{}", self.0)
    }

    /// Unit name of the controller process, e.g. `ctrl3`
    pub fn primary_service_name(&self) -> String {
        format!("ctrl{}", self.0)
    }

    /// Unit name of the management API process, e.g. `mgr3`
    pub fn secondary_service_name(&self) -> String {
        format!("mgr{}", self.0)
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two independently allocated port families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFamily {
    Primary,
    Secondary,
}

impl std::fmt::Display for PortFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

/// Status shown by `list`, derived from the stored `active` flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Active,
    Inactive,
}

impl DisplayStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// A provisioned controller/management-API pair.
///
/// Field names are part of the on-disk format read by external tooling and
/// must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub name: String,
    /// Always `<instance root>/config`
    pub config_dir: PathBuf,
    pub controller_dir: PathBuf,
    pub primary_service_name: String,
    pub secondary_service_name: String,
    pub primary_port: u16,
    pub secondary_port: u16,
    /// Units were created and started
    pub active: bool,
    /// Created without any supervisor units; fixed at creation
    pub sandbox: bool,
}

impl InstanceRecord {
    pub fn new(
        id: InstanceId,
        name: Option<String>,
        config_dir: PathBuf,
        controller_dir: PathBuf,
        ports: (u16, u16),
        sandbox: bool,
    ) -> Self {
        Self {
            id,
            name: name.unwrap_or_else(|| id.default_name()),
            config_dir,
            controller_dir,
            primary_service_name: id.primary_service_name(),
            secondary_service_name: id.secondary_service_name(),
            primary_port: ports.0,
            secondary_port: ports.1,
            active: false,
            sandbox,
        }
    }

    /// The per-instance root holding `config`, `logs` and `comms`
    pub fn instance_root(&self) -> &Path {
        self.config_dir.parent().unwrap_or(&self.config_dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.instance_root().join("logs")
    }

    /// Both unit names, controller first
    pub fn unit_names(&self) -> [&str; 2] {
        [self.primary_service_name.as_str(), self.secondary_service_name.as_str()]
    }

    pub fn display_status(&self) -> DisplayStatus {
        if self.active {
            DisplayStatus::Active
        } else {
            DisplayStatus::Inactive
        }
    }
}

/// A record plus its derived display status, as returned by `list`
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    #[serde(flatten)]
    pub record: InstanceRecord,
    pub status: DisplayStatus,
}

impl From<InstanceRecord> for InstanceSummary {
    fn from(record: InstanceRecord) -> Self {
        let status = record.display_status();
        Self { record, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32) -> InstanceRecord {
        InstanceRecord::new(
            InstanceId(id),
            None,
            PathBuf::from(format!("/srv/instance_{id}/config")),
            PathBuf::from(format!("/home/op/controller_{id}")),
            (7125, 7126),
            false,
        )
    }

    #[test]
    fn names_are_derived_from_id() {
        let rec = record(3);
        assert_eq!(rec.name, "instance_3");
        assert_eq!(rec.primary_service_name, "ctrl3");
        assert_eq!(rec.secondary_service_name, "mgr3");
        assert_eq!(rec.instance_root(), Path::new("/srv/instance_3"));
        assert_eq!(rec.logs_dir(), PathBuf::from("/srv/instance_3/logs"));
    }

    #[test]
    fn name_override_keeps_unit_names() {
        let rec = InstanceRecord::new(
            InstanceId(5),
            Some("bench".into()),
            PathBuf::from("/srv/instance_5/config"),
            PathBuf::from("/home/op/controller_5"),
            (7165, 7166),
            true,
        );
        assert_eq!(rec.name, "bench");
        assert_eq!(rec.unit_names(), ["ctrl5", "mgr5"]);
        assert_eq!(rec.display_status(), DisplayStatus::Inactive);
    }

    #[test]
    fn field_names_are_stable() {
        let value = serde_json::to_value(record(1)).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            [
                "active",
                "config_dir",
                "controller_dir",
                "id",
                "name",
                "primary_port",
                "primary_service_name",
                "sandbox",
                "secondary_port",
                "secondary_service_name",
            ]
        );
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn summary_flattens_record() {
        let mut rec = record(2);
        rec.active = true;
        let value = serde_json::to_value(InstanceSummary::from(rec)).unwrap();
        assert_eq!(value["status"], "active");
        assert_eq!(value["primary_port"], 7125);
    }
}
