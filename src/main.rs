use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::{error, info};

use moto_catalog_sync::catalog::Condition;
use moto_catalog_sync::config::AppConfig;
use moto_catalog_sync::core::{self, MaintenanceOp, SyncOptions, SyncPipeline};
use moto_catalog_sync::error::SyncError;
use moto_catalog_sync::logging::{default_log_directory, init_logging};
use moto_catalog_sync::scraper::Fetcher;
use moto_catalog_sync::sources::{adapter_for, SOURCE_NAMES};
use moto_catalog_sync::store::SanityStore;

#[derive(Parser)]
#[command(name = "catalog-sync")]
#[command(about = "Sync manufacturer and classifieds listings into the motorcycle catalog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(long, global = true, help = "Also write daily log files to the per-user data directory")]
    log_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one source into the catalog
    Run {
        #[arg(help = "Source to sync (see `catalog-sync sources`)")]
        source: String,

        #[arg(long, help = "Decide and log only; no writes, no uploads")]
        dry_run: bool,
    },

    /// List available sources
    Sources,

    /// Plan, and with --yes apply, a maintenance operation
    Cleanup {
        #[command(subcommand)]
        operation: CleanupCommand,

        #[arg(long, global = true, help = "Print the plan only")]
        dry_run: bool,

        #[arg(long, global = true, help = "Apply the plan without further confirmation")]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CleanupCommand {
    /// Delete every motorcycle of a brand
    DeleteBrand { brand: String },

    /// Delete motorcycles without images
    DeleteImageless {
        brand: String,
        #[arg(long)]
        condition: Option<Condition>,
    },

    /// Delete motorcycles with a model year before --before
    DeleteOlder {
        brand: String,
        #[arg(long)]
        before: i32,
        #[arg(long)]
        condition: Option<Condition>,
    },

    /// Delete motorcycles whose model contains a pattern
    DeleteMatching {
        brand: String,
        pattern: String,
        #[arg(long)]
        condition: Option<Condition>,
    },

    /// Move motorcycles from a duplicate brand to the canonical one and delete the duplicate
    MergeBrand { duplicate: String, canonical: String },
}

impl From<CleanupCommand> for MaintenanceOp {
    fn from(command: CleanupCommand) -> Self {
        match command {
            CleanupCommand::DeleteBrand { brand } => MaintenanceOp::DeleteBrand { brand },
            CleanupCommand::DeleteImageless { brand, condition } => MaintenanceOp::DeleteImageless { brand, condition },
            CleanupCommand::DeleteOlder {
                brand,
                before,
                condition,
            } => MaintenanceOp::DeleteOlder {
                brand,
                before,
                condition,
            },
            CleanupCommand::DeleteMatching {
                brand,
                pattern,
                condition,
            } => MaintenanceOp::DeleteMatching {
                brand,
                pattern,
                condition,
            },
            CleanupCommand::MergeBrand { duplicate, canonical } => MaintenanceOp::MergeBrand { duplicate, canonical },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.log_file && config.logging.directory.is_none() {
        config.logging.directory = Some(default_log_directory());
    }
    init_logging(&config.logging)?;

    info!("catalog-sync v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Sources => {
            list_sources();
            Ok(())
        }
        Commands::Run { source, dry_run } => run_sync(&config, &source, dry_run).await,
        Commands::Cleanup {
            operation,
            dry_run,
            yes,
        } => run_cleanup(&config, operation.into(), dry_run, yes).await,
    }
}

fn list_sources() {
    println!("Available sources:");
    for name in SOURCE_NAMES {
        if let Some(adapter) = adapter_for(name) {
            println!(
                "  {:<10} {} listings, {}ms between requests",
                name,
                adapter.condition(),
                adapter.request_delay().as_millis()
            );
        }
    }
}

async fn run_sync(config: &AppConfig, source: &str, dry_run: bool) -> Result<()> {
    config.validate().context("invalid configuration")?;

    let adapter = adapter_for(source).ok_or_else(|| SyncError::UnknownSource(source.to_string()))?;
    let fetcher = Fetcher::new(&config.fetch)?;
    let store = SanityStore::new(&config.store)?;

    let options = SyncOptions {
        dry_run,
        upload_delay: Duration::from_millis(config.fetch.upload_delay_ms),
        current_year: None,
    };

    let pipeline = SyncPipeline::new(adapter.as_ref(), &fetcher, &store, options);
    match pipeline.run().await {
        Ok(report) => {
            println!("{}", report);
            Ok(())
        }
        Err(e) => {
            error!("Sync of {} aborted ({}): {}", source, e.category(), e);
            if let Some(delay) = e.retry_delay() {
                error!("Retry the run in about {}s", delay.as_secs());
            }
            Err(e.into())
        }
    }
}

async fn run_cleanup(config: &AppConfig, op: MaintenanceOp, dry_run: bool, yes: bool) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let store = SanityStore::new(&config.store)?;

    let plan = core::plan(op, &store).await?;
    println!("Plan: {}", plan.op);
    if plan.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }
    for change in &plan.changes {
        println!("  {}", change);
    }

    if dry_run {
        println!("Dry run: nothing applied.");
        return Ok(());
    }
    if !yes {
        println!("Re-run with --yes to apply {} change(s).", plan.changes.len());
        return Ok(());
    }

    let report = core::execute(&plan, &store).await?;
    println!(
        "Applied {} change(s), {} failed, {} skipped.",
        report.applied, report.failed, report.skipped
    );
    Ok(())
}
