//! instancectl - Provision and manage controller/management-API instance pairs
//!
//! Each instance gets its own directory tree, controller clone, port pair and
//! (unless sandboxed) a pair of systemd units. The registry of instances is a
//! JSON file that is the single source of truth for what exists.

mod cli;
mod core;
mod persistence;
mod platform;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use single_instance::SingleInstance;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::{GitFetcher, InstanceError, InstanceId, Orchestrator, Settings};
use crate::platform::SystemdSupervisor;

/// Application name constant
pub const APP_NAME: &str = "instancectl";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code for failures worth retrying (EX_TEMPFAIL)
const EXIT_RETRYABLE: u8 = 75;

#[derive(Parser)]
#[command(name = "instancectl", version, about = "Multi-instance controller manager")]
struct Cli {
    /// Path to config file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new instance
    InstanceCreate {
        /// Create only directories and configs (no supervisor units)
        #[arg(long)]
        sandbox: bool,
        /// Display name (default: instance_<id>)
        #[arg(long)]
        name: Option<String>,
    },
    /// List all managed instances
    InstanceList {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run the installer against an instance's config directory
    Install {
        #[arg(long)]
        instance: u32,
    },
    /// Restart both services of an instance
    InstanceRestart {
        #[arg(long)]
        instance: u32,
    },
    /// Delete an instance and its resources
    InstanceDelete {
        #[arg(long)]
        instance: u32,
        /// Confirm deletion
        #[arg(long)]
        force: bool,
    },
    /// Run diagnostics on an instance
    InstanceDiag {
        #[arg(long)]
        instance: u32,
        /// Print JSON instead of a report
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Whether the command rewrites the registry
    fn mutates_registry(&self) -> bool {
        matches!(
            self,
            Self::InstanceCreate { .. } | Self::InstanceDelete { .. }
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!("{} v{} starting", APP_NAME, APP_VERSION);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            let retryable = e
                .downcast_ref::<InstanceError>()
                .is_some_and(InstanceError::is_retryable);
            if retryable {
                ExitCode::from(EXIT_RETRYABLE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;

    // Only one mutating invocation at a time per registry
    let _writer = if cli.command.mutates_registry() {
        Some(acquire_writer_lock(&settings.paths.registry)?)
    } else {
        None
    };

    let orchestrator = Orchestrator::new(
        &settings,
        SystemdSupervisor::new(&settings.supervisor),
        Arc::new(GitFetcher),
    );
    info!("Using registry {:?}", orchestrator.registry().path());

    match cli.command {
        Commands::InstanceCreate { sandbox, name } => {
            cli::create(&orchestrator, sandbox, name).await?;
        }
        Commands::InstanceList { json } => cli::list(&orchestrator, json)?,
        Commands::Install { instance } => {
            cli::install(&orchestrator, InstanceId(instance)).await?;
        }
        Commands::InstanceRestart { instance } => {
            cli::restart(&orchestrator, InstanceId(instance)).await?;
        }
        Commands::InstanceDelete { instance, force } => {
            cli::delete(&orchestrator, InstanceId(instance), force).await?;
        }
        Commands::InstanceDiag { instance, json } => {
            cli::diagnose(&orchestrator, InstanceId(instance), json).await?;
        }
    }
    Ok(())
}

/// Initialize the logging system
fn init_logging(verbose: bool) {
    let default = if verbose {
        "instancectl=debug"
    } else {
        "instancectl=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Take the host-wide writer lock for `registry`
fn acquire_writer_lock(registry: &Path) -> Result<SingleInstance> {
    let name = writer_lock_name(registry);
    let lock = SingleInstance::new(&name).context("Failed to create registry writer lock")?;
    anyhow::ensure!(
        lock.is_single(),
        "another {} command is modifying {}; retry once it finishes",
        APP_NAME,
        registry.display()
    );
    Ok(lock)
}

/// Lock name shared by every build and every spelling of the same registry
/// path: FNV-1a over the path with its parent directory canonicalized.
fn writer_lock_name(registry: &Path) -> String {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let resolved = match (registry.parent(), registry.file_name()) {
        (Some(parent), Some(file)) => parent
            .canonicalize()
            .map(|dir| dir.join(file))
            .unwrap_or_else(|_| registry.to_path_buf()),
        _ => registry.to_path_buf(),
    };

    let hash = resolved
        .as_os_str()
        .as_encoded_bytes()
        .iter()
        .fold(FNV_OFFSET, |acc, &b| (acc ^ u64::from(b)).wrapping_mul(FNV_PRIME));
    format!("{}-{:016x}", APP_NAME, hash)
}
