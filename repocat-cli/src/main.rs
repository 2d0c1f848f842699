//! repocat - catalog builder for software distribution repositories
//!
//! Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use repocat_core::config::RepoConfig;
use repocat_core::{make_catalogs, BuildReport, OutputSink, StdoutSink, TracingSink};

mod config_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "repocat",
    about = "Builds catalogs for software distribution repositories",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Override configuration file path
    #[clap(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild catalogs and the icon hash manifest
    Makecatalogs {
        /// Repository root (overrides config and REPOCAT_REPO)
        #[clap(long)]
        repo: Option<PathBuf>,

        /// Include items whose payloads are missing
        #[clap(long)]
        force: bool,

        /// Do not check that payloads exist
        #[clap(long)]
        skip_payload_check: bool,

        /// Number of objects fetched at once
        #[clap(long)]
        concurrency: Option<usize>,

        /// Print the build report as JSON
        #[clap(long)]
        json: bool,
    },

    /// List the identifiers stored under one kind (pkgsinfo, pkgs, icons, catalogs)
    List {
        kind: String,

        /// Repository root (overrides config and REPOCAT_REPO)
        #[clap(long)]
        repo: Option<PathBuf>,
    },

    /// Show or create the configuration file
    Config(config_cli::ConfigCommand),
}

fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    // stdout is reserved for progress lines and reports
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);

    let config_path = match cli.config {
        Some(path) => path,
        None => RepoConfig::default_config_path()?,
    };
    debug!("Using config file {}", config_path.display());

    match cli.command {
        Command::Makecatalogs {
            repo,
            force,
            skip_payload_check,
            concurrency,
            json,
        } => {
            let config = RepoConfig::load_from_path(&config_path)?;
            let mut settings = config.build.clone();
            settings.force |= force;
            settings.skip_payload_check |= skip_payload_check;
            if concurrency.is_some() {
                settings.concurrency = concurrency;
            }

            let store = config.open_store(repo).await?;
            let sink: Arc<dyn OutputSink> = if json {
                Arc::new(TracingSink)
            } else {
                Arc::new(StdoutSink)
            };

            let report = make_catalogs(store, sink, settings.to_options()).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialize report")?
                );
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Command::List { kind, repo } => {
            let config = RepoConfig::load_from_path(&config_path)?;
            let store = config.open_store(repo).await?;
            let mut identifiers = store
                .list(&kind)
                .await
                .with_context(|| format!("Failed to list {kind}"))?;
            identifiers.sort();
            for identifier in identifiers {
                println!("{identifier}");
            }
            Ok(())
        }
        Command::Config(command) => command.execute(&config_path),
    }
}

/// Table row for written catalogs
#[derive(Tabled)]
struct CatalogRow {
    #[tabled(rename = "Catalog")]
    name: String,
    #[tabled(rename = "Items")]
    records: usize,
}

fn print_report(report: &BuildReport) {
    if !report.catalogs_written.is_empty() {
        let rows: Vec<CatalogRow> = report
            .catalogs_written
            .iter()
            .map(|c| CatalogRow {
                name: c.name.clone(),
                records: c.records,
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()))
            .to_string();
        println!("\n{table}");
    }

    for name in &report.catalogs_deleted {
        println!("Removed catalog {name}");
    }

    if !report.errors.is_empty() {
        println!("\nThe following issues occurred while building catalogs:");
        for message in report.errors.messages() {
            println!("    {message}");
        }
    }
}
