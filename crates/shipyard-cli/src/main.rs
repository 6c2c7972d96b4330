//! Shipyard - package-based deployment with manual rollback
//!
//! Usage:
//!   shipyard upload site-1.2.0.zip
//!   shipyard deploy site@1.2.0 --verify
//!   shipyard history
//!   shipyard rollback <deployment-id>

mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipyard_core::config::{ConfigStore, Overrides, parse_endpoint};
use shipyard_core::context::AppContext;
use shipyard_core::deploy::{CancelFlag, DeployOptions, RollbackOptions};
use shipyard_core::error::ShipyardError;
use shipyard_core::types::{DeploymentId, DeploymentStatus, PackageId};

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(about = "Package-based deployment with snapshots and rollback", long_about = None)]
struct Cli {
    /// Read this config file instead of the global and project layers
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where packages, snapshots and history are stored
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Directory tree packages are deployed onto
    #[arg(long, global = true)]
    target_root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a package archive
    Upload {
        /// Zip archive, named <name>-<version>.zip unless it carries package.toml
        archive: PathBuf,
    },

    /// Deploy a registered package onto the target root
    Deploy {
        /// Package id (name@version)
        package: String,

        /// Check the configured health endpoints after applying
        #[arg(long)]
        verify: bool,

        /// Health endpoint to check (repeatable; implies --verify)
        #[arg(long = "endpoint", value_name = "URL")]
        endpoints: Vec<String>,

        /// Roll back automatically if verification fails
        #[arg(long)]
        auto_rollback: bool,
    },

    /// Check health endpoints without deploying
    Verify {
        /// Endpoints to check (defaults to the configured ones)
        urls: Vec<String>,
    },

    /// Restore the files a deployment replaced
    Rollback {
        /// Deployment id from `shipyard history`
        deployment: String,

        /// Restore even if a later deployment overlaps the same files
        #[arg(long)]
        force: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List registered packages
    Packages,

    /// List deployment records
    History,

    /// Show one deployment record with its logs
    Show {
        deployment: String,
    },

    /// Delete old snapshots no longer needed for rollback
    Prune {
        /// Snapshots to keep (defaults to snapshots.keep)
        #[arg(long)]
        keep: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shipyard=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(err) = run_cli(cli).await {
        eprintln!("{} {:#}", style("error:").red().bold(), err);
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<ShipyardError>()
        .map(ShipyardError::exit_code)
        .unwrap_or(1)
}

fn build_context(cli: &Cli) -> Result<AppContext> {
    let store = match &cli.config {
        Some(path) => ConfigStore::from_file(path.clone()),
        None => ConfigStore::from_defaults()?,
    };
    let settings = store.resolve(&Overrides {
        target_root: cli.target_root.clone(),
        state_dir: cli.state_dir.clone(),
    })?;
    tracing::debug!(state_dir = %settings.state_dir.display(), "resolved settings");
    Ok(AppContext::new(settings))
}

async fn run_cli(cli: Cli) -> Result<()> {
    let ctx = build_context(&cli)?;
    let format = cli.format;
    match cli.command {
        Commands::Upload { archive } => run_upload(&ctx, archive, format),
        Commands::Deploy {
            package,
            verify,
            endpoints,
            auto_rollback,
        } => run_deploy(&ctx, package, verify, endpoints, auto_rollback, format).await,
        Commands::Verify { urls } => run_verify(&ctx, urls, format).await,
        Commands::Rollback {
            deployment,
            force,
            yes,
        } => run_rollback(&ctx, deployment, force, yes, format),
        Commands::Packages => {
            let packages = ctx.package_registry().list()?;
            output::print_packages(&packages, format)
        }
        Commands::History => {
            let store = ctx.deployment_store();
            let history = store.load()?;
            output::print_history(&history, format)
        }
        Commands::Show { deployment } => {
            let record = ctx
                .deployment_store()
                .get(&DeploymentId::from(deployment))?;
            output::print_record(&record, format)
        }
        Commands::Prune { keep } => {
            let removed = ctx.prune_snapshots(keep)?;
            output::print_pruned(&removed, format)
        }
    }
}

fn run_upload(ctx: &AppContext, archive: PathBuf, format: OutputFormat) -> Result<()> {
    let (package, outcome) = ctx.package_registry().register(&archive)?;
    output::print_registered(&package, outcome, format)
}

async fn run_deploy(
    ctx: &AppContext,
    package: String,
    verify: bool,
    endpoints: Vec<String>,
    auto_rollback: bool,
    format: OutputFormat,
) -> Result<()> {
    let endpoints = if !endpoints.is_empty() {
        endpoints
            .iter()
            .map(|raw| parse_endpoint(raw))
            .collect::<Result<Vec<_>>>()?
    } else if verify {
        if ctx.settings().endpoints.is_empty() {
            return Err(ShipyardError::Config(
                "--verify needs endpoints; set verify.endpoints or pass --endpoint".to_string(),
            )
            .into());
        }
        ctx.settings().endpoints.clone()
    } else {
        Vec::new()
    };

    let cancel = CancelFlag::new();
    let handler = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling deployment if not yet applied");
                cancel.cancel();
            }
        })
    };

    let options = DeployOptions {
        endpoints,
        auto_rollback: auto_rollback || ctx.settings().auto_rollback,
        cancel,
    };
    let executor = ctx.deployment_executor()?;
    let result = executor.deploy(&PackageId::from(package), &options).await;
    handler.abort();

    let record = result?;
    output::print_record(&record, format)?;
    if let Some(err) = record.outcome_error() {
        return Err(err.into());
    }
    if record.status == DeploymentStatus::Cancelled {
        anyhow::bail!("deployment {} cancelled before apply", record.id);
    }
    Ok(())
}

async fn run_verify(ctx: &AppContext, urls: Vec<String>, format: OutputFormat) -> Result<()> {
    let endpoints = if urls.is_empty() {
        ctx.settings().endpoints.clone()
    } else {
        urls.iter()
            .map(|raw| parse_endpoint(raw))
            .collect::<Result<Vec<_>>>()?
    };
    if endpoints.is_empty() {
        return Err(ShipyardError::Config(
            "no endpoints to verify; pass URLs or set verify.endpoints".to_string(),
        )
        .into());
    }

    let report = ctx.verification_probe()?.check(&endpoints).await;
    output::print_probe(&report, format)?;
    if !report.all_healthy() {
        return Err(ShipyardError::VerificationFailure {
            failed: report.failed_count(),
            total: report.results.len(),
        }
        .into());
    }
    Ok(())
}

fn run_rollback(
    ctx: &AppContext,
    deployment: String,
    force: bool,
    yes: bool,
    format: OutputFormat,
) -> Result<()> {
    let id = DeploymentId::from(deployment);
    let record = ctx.deployment_store().get(&id)?;

    if !yes && record.status != DeploymentStatus::RolledBack {
        let prompt = format!(
            "Restore {} to its state before {} ({})?",
            record.target_root.display(),
            record.package,
            record.id
        );
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        require_confirmation(confirmed, &id)?;
    }

    let outcome = ctx
        .rollback_executor()
        .rollback(&id, &RollbackOptions { force })?;
    output::print_rollback(&outcome, format)
}

/// A declined prompt is a failed command, so scripts do not read it as done.
fn require_confirmation(confirmed: bool, id: &DeploymentId) -> Result<()> {
    if !confirmed {
        anyhow::bail!("rollback of {} aborted at the prompt", id);
    }
    Ok(())
}
