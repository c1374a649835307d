use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use sentinel_stac_sync::config::{resolve_password, SyncConfig};
use sentinel_stac_sync::local_catalog::{push_catalog, write_catalog};
use sentinel_stac_sync::s3::ObjectStore;
use sentinel_stac_sync::sync::SyncDriver;
use sentinel_stac_sync::target::{OseoCatalog, StacTransactions};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sentinel-stac-sync")]
#[command(about = "Catalogs Sentinel-2 L2A scenes stored in S3 buckets as STAC records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Adds the scenes a catalog is missing and refreshes the collection extent
    Update {
        /// Catalog host, e.g. https://paituli.csc.fi (for `--target stac`, the STAC API root)
        #[arg(long)]
        host: String,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = TargetKind::Oseo)]
        target: TargetKind,
    },
    /// Builds a complete catalog from the buckets into a local directory
    Build {
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Uploads a catalog directory written by `build`
    Push {
        #[arg(long)]
        host: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = TargetKind::Oseo)]
        target: TargetKind,
    },
    /// Writes the default configuration to a file
    Config {
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetKind {
    /// GeoServer OpenSearch-EO REST API
    Oseo,
    /// STAC API with the transaction extension
    Stac,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Update {
            host,
            config,
            target,
        } => {
            let config = SyncConfig::load(config.as_deref())?;
            let password = resolve_password(&config.catalog.password_file)?;
            let store = ObjectStore::from_config(&config.object_store).await;
            let driver = SyncDriver::new(&store, &config);

            let report = match target {
                TargetKind::Oseo => {
                    let catalog = OseoCatalog::new(&host, &config.catalog, password)?;
                    driver.update(&catalog).await?
                }
                TargetKind::Stac => {
                    let catalog = StacTransactions::new(&host, &config.catalog, Some(password))?;
                    driver.update(&catalog).await?
                }
            };
            info!(
                buckets = report.buckets_scanned,
                known = report.scenes_known,
                incomplete = report.scenes_incomplete,
                added = report.added.len(),
                "Update finished"
            );
        }
        Command::Build { output, config } => {
            let config = SyncConfig::load(config.as_deref())?;
            let store = ObjectStore::from_config(&config.object_store).await;

            let (collection, items, report) = SyncDriver::new(&store, &config).build().await?;
            write_catalog(&output, &collection, &items)?;
            info!(
                buckets = report.buckets_scanned,
                incomplete = report.scenes_incomplete,
                items = items.len(),
                "Build finished"
            );
        }
        Command::Push {
            host,
            input,
            config,
            target,
        } => {
            let config = SyncConfig::load(config.as_deref())?;
            let password = resolve_password(&config.catalog.password_file)?;
            let collection_id = &config.catalog.collection_id;
            let concurrency = config.catalog.push_concurrency;

            let outcomes = match target {
                TargetKind::Oseo => {
                    let catalog = OseoCatalog::new(&host, &config.catalog, password)?;
                    push_catalog(&catalog, &input, collection_id, concurrency).await?
                }
                TargetKind::Stac => {
                    let catalog = StacTransactions::new(&host, &config.catalog, Some(password))?;
                    push_catalog(&catalog, &input, collection_id, concurrency).await?
                }
            };
            info!(items = outcomes.len(), "Push finished");
        }
        Command::Config { output } => {
            SyncConfig::default().write(&output)?;
            info!(path = %output.display(), "Wrote default configuration");
        }
    }

    Ok(())
}
