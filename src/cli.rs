//! Subcommand handlers and console output
//!
//! Handlers receive the orchestrator built in `main`; results go to stdout,
//! logs go to stderr.

use anyhow::Result;

use crate::core::{
    CreateOptions, DeleteOutcome, DiagnosticReport, InstanceId, InstanceRecord, Orchestrator,
    PathCheck, RestartOutcome,
};
use crate::platform::Supervisor;

pub async fn create<S: Supervisor>(
    orchestrator: &Orchestrator<S>,
    sandbox: bool,
    name: Option<String>,
) -> Result<()> {
    let record = orchestrator.create(CreateOptions { sandbox, name }).await?;

    println!("== Instance created ==");
    println!("  id:         {}", record.id);
    println!("  name:       {}", record.name);
    println!("  config:     {}", record.config_dir.display());
    println!("  controller: {}", record.controller_dir.display());
    println!(
        "  services:   {} / {} (sandbox={})",
        record.primary_service_name, record.secondary_service_name, record.sandbox
    );
    println!(
        "  ports:      primary={}, secondary={}",
        record.primary_port, record.secondary_port
    );
    Ok(())
}

pub fn list<S: Supervisor>(orchestrator: &Orchestrator<S>, json: bool) -> Result<()> {
    let summaries = orchestrator.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No instances registered.");
        return Ok(());
    }

    println!("== Registered instances ==");
    for summary in &summaries {
        let r = &summary.record;
        println!(
            "  [{}] {} | cfg={} | svc={} | p={} s={} | {}",
            r.id,
            r.name,
            r.config_dir.display(),
            r.primary_service_name,
            r.primary_port,
            r.secondary_port,
            summary.status.label()
        );
    }
    Ok(())
}

pub async fn install<S: Supervisor>(orchestrator: &Orchestrator<S>, id: InstanceId) -> Result<()> {
    orchestrator.install(id).await?;
    println!("Installed into instance {}", id);
    Ok(())
}

pub async fn restart<S: Supervisor>(orchestrator: &Orchestrator<S>, id: InstanceId) -> Result<()> {
    match orchestrator.restart(id).await? {
        RestartOutcome::Restarted => println!("Restarted services for instance {}", id),
        RestartOutcome::SkippedSandbox => {
            println!("Instance {} is sandboxed (no services to restart)", id)
        }
    }
    Ok(())
}

pub async fn delete<S: Supervisor>(
    orchestrator: &Orchestrator<S>,
    id: InstanceId,
    force: bool,
) -> Result<()> {
    match orchestrator.delete(id, force).await? {
        DeleteOutcome::Refused => {
            println!("Refusing to delete instance {} without --force", id);
        }
        DeleteOutcome::Deleted { record, warnings } => {
            println!("{}", deleted_summary(&record));
            for warning in warnings {
                println!("  warning: {}", warning);
            }
        }
    }
    Ok(())
}

pub async fn diagnose<S: Supervisor>(
    orchestrator: &Orchestrator<S>,
    id: InstanceId,
    json: bool,
) -> Result<()> {
    let report = orchestrator.diagnose(id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn deleted_summary(record: &InstanceRecord) -> String {
    let services = if record.sandbox {
        "no services".to_string()
    } else {
        format!(
            "services {}/{}",
            record.primary_service_name, record.secondary_service_name
        )
    };
    format!(
        "Deleted instance {} ({}): {}, ports {}/{}, removed {} and {}",
        record.id,
        record.name,
        services,
        record.primary_port,
        record.secondary_port,
        record.instance_root().display(),
        record.controller_dir.display()
    )
}

fn print_report(report: &DiagnosticReport) {
    println!("== Diagnostics for instance {} ({}) ==", report.id, report.name);
    println!("  config dir:     {}", describe(&report.config_dir, "ok"));
    println!("  controller dir: {}", describe(&report.controller_dir, "ok"));

    match &report.services {
        Some(units) => {
            for unit in units {
                println!("  service {:<8} {}", unit.name, unit.status.label());
            }
        }
        None => println!("  sandbox instance: no services"),
    }

    println!("  primary config:   {}", describe(&report.primary_config, "present"));
    println!("  secondary config: {}", describe(&report.secondary_config, "present"));
}

fn describe(check: &PathCheck, ok: &str) -> String {
    let state = if check.present { ok } else { "missing" };
    format!("{} ({})", check.path.display(), state)
}
