//! ReviewA2Z operator CLI
//!
//! Maintenance tasks against the hosted database. The HTTP API is served by
//! `reviewa2z-server`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use reviewa2z::{
    backend::{RestBackend, SharedBackend},
    config,
    error::Result,
    models::Config,
    seo::{
        self,
        migration::{self, MigrationOptions, MigrationTarget},
    },
    services::Services,
};

/// ReviewA2Z - Product Review Site Backend
#[derive(Parser, Debug)]
#[command(name = "reviewa2z", version, about = "ReviewA2Z site maintenance")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration
    Validate,

    /// Show the effective configuration
    Info,

    /// Generate sitemap.xml from the current database
    Sitemap {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Backfill missing SEO fields on reviews and categories
    MigrateSeo {
        /// Compute changes without writing them
        #[arg(long)]
        dry_run: bool,

        /// Only migrate one table
        #[arg(long, value_enum)]
        only: Option<Table>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Table {
    Reviews,
    Categories,
}

impl From<Table> for MigrationTarget {
    fn from(table: Table) -> Self {
        match table {
            Table::Reviews => MigrationTarget::Reviews,
            Table::Categories => MigrationTarget::Categories,
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn connect(config: &Config) -> Result<SharedBackend> {
    Ok(Arc::new(RestBackend::new(&config.backend)?))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config::load(&cli.config) {
                log::error!("Config validation failed: {e}");
                return Err(e);
            }
            log::info!("✓ Config OK");
        }

        Command::Info => {
            let config = config::load(&cli.config)?;
            log::info!("Config file: {}", cli.config.display());
            log::info!("Backend: {}", config.backend.url);
            log::info!("Site: {} ({})", config.site.name, config.site.origin());
            log::info!("Server: {}", config.server.address());
            log::info!(
                "Cache: stale after {}s, dropped after {}s, {} retries",
                config.cache.stale_time_secs,
                config.cache.gc_time_secs,
                config.cache.retry
            );
        }

        Command::Sitemap { output } => {
            let config = Arc::new(config::load(&cli.config)?);
            let services = Services::new(Arc::clone(&config), connect(&config)?);
            let xml = seo::build_sitemap(&services, config.site.origin()).await?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, xml).await?;
                    log::info!("Sitemap saved to {}", path.display());
                }
                None => print!("{xml}"),
            }
        }

        Command::MigrateSeo { dry_run, only } => {
            let config = config::load(&cli.config)?;
            let backend = connect(&config)?;
            let options = MigrationOptions {
                dry_run,
                only: only.map(Into::into),
                max_concurrent: config.migration.max_concurrent,
            };

            log::info!("Starting SEO migration{}...", if dry_run { " (dry run)" } else { "" });
            let report = migration::run(backend.as_ref(), &config.site, &options).await?;
            if let Some(outcome) = report.reviews {
                log::info!("Reviews: {outcome}");
            }
            if let Some(outcome) = report.categories {
                log::info!("Categories: {outcome}");
            }
            if report.failed() > 0 {
                log::warn!("{} rows failed to update", report.failed());
            }
        }
    }

    log::info!("Done!");
    Ok(())
}
