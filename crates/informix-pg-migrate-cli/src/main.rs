//! informix-pg-migrate CLI - Informix to PostgreSQL schema and data migration.

use clap::{Parser, Subcommand};
use informix_pg_migrate::{Config, Credentials, MigrateError, Orchestrator, RunSummary};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "informix-pg-migrate")]
#[command(about = "Informix to PostgreSQL schema and data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Directory holding checkpoint files (overrides migration.checkpoint_dir)
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Also write a plain-text log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tables in the target and copy their rows
    Tables,

    /// Add primary keys to migrated tables
    PrimaryKeys,

    /// Add foreign keys between migrated tables
    ForeignKeys,

    /// Create secondary indexes on migrated tables
    Indexes,

    /// Truncate one migrated table and copy its rows again
    RefreshTable {
        /// Source table name
        table: String,
    },

    /// Validate row counts, constraints and checkpoints against the source
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format, cli.log_file.as_deref())?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    // Credentials are checked before any connection is attempted.
    let credentials = Credentials::from_env()?;

    if let Commands::HealthCheck = cli.command {
        return health_check(&config, &credentials, cli.output_json).await;
    }

    let mut orchestrator = Orchestrator::connect(config, &credentials).await?;
    if let Some(dir) = cli.checkpoint_dir {
        orchestrator = orchestrator.with_checkpoint_dir(dir);
    }

    let result = execute(&orchestrator, &cli.command, cli.output_json).await;
    orchestrator.close().await;
    result
}

async fn execute(orchestrator: &Orchestrator, command: &Commands, output_json: bool) -> Result<(), MigrateError> {
    let summary = match command {
        Commands::Tables => orchestrator.migrate_tables().await?,
        Commands::PrimaryKeys => orchestrator.migrate_primary_keys().await?,
        Commands::ForeignKeys => orchestrator.migrate_foreign_keys().await?,
        Commands::Indexes => orchestrator.migrate_indexes().await?,
        Commands::RefreshTable { table } => orchestrator.refresh_table(table).await?,
        Commands::Validate => {
            let report = orchestrator.validate().await?;
            if output_json {
                println!("{}", report.to_json()?);
            } else {
                print!("{}", report.render_text());
            }
            report.into_result()?;
            return Ok(());
        }
        Commands::HealthCheck => unreachable!("health-check runs before connecting"),
    };

    if output_json {
        println!("{}", summary.to_json()?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

async fn health_check(config: &Config, credentials: &Credentials, output_json: bool) -> Result<(), MigrateError> {
    let result = Orchestrator::health_check(config, credentials).await;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Health Check Results:");
        println!(
            "  Source (Informix): {} ({}ms)",
            if result.source_connected { "OK" } else { "FAILED" },
            result.source_latency_ms
        );
        if let Some(ref err) = result.source_error {
            println!("    Error: {}", err);
        }
        println!(
            "  Target (PostgreSQL): {} ({}ms)",
            if result.target_connected { "OK" } else { "FAILED" },
            result.target_latency_ms
        );
        if let Some(ref err) = result.target_error {
            println!("    Error: {}", err);
        }
        println!(
            "\n  Overall: {}",
            if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
        );
    }

    if !result.healthy {
        return Err(MigrateError::connection(
            "Health check failed",
            config.target.describe(),
        ));
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\nMigration of {} finished:", summary.concern);
    println!("  Run ID: {}", summary.run_id);
    println!("  Duration: {:.2}s", summary.duration_seconds);
    println!("  Total: {}", summary.total);
    println!("  Completed: {}", summary.completed);
    println!("  Skipped (already completed): {}", summary.skipped);
    println!("  Failed: {}", summary.failed);
    if summary.rows_transferred > 0 {
        println!("  Rows: {}", summary.rows_transferred);
    }
    if !summary.failures.is_empty() {
        println!("\nFailures:");
        for failure in &summary.failures {
            println!("  {}: {}", failure.key, failure.detail);
        }
    }
}

fn setup_logging(verbosity: &str, format: &str, log_file: Option<&Path>) -> Result<(), MigrateError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json leaves stdout parseable.
    let console = if format == "json" {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Arc::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(console)
        .with(file)
        .init();

    Ok(())
}
