//! solrdump CLI
//!
//! Bulk export/import of Solr collections and config sets.
//! Pedantic lints relaxed for CLI ergonomics.

#![allow(clippy::pedantic)]

use std::future::Future;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use solrdump::{
    ClientConfig, ConfigTransfer, ExportOptions, ExportPipeline, ImportOptions, ImportPipeline,
    ImportStats, ReindexOptions, ReindexPipeline, SolrClient,
};

/// Exit code when the user interrupts a run.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "solrdump")]
#[command(version)]
#[command(about = "Bulk export/import of Solr collections and config sets", long_about = None)]
struct Cli {
    /// Base URL of the Solr node, e.g. http://localhost:8983
    #[arg(long, env = "SOLR_URL")]
    url: String,

    /// Collection to operate on (required for export, overrides the
    /// archive's collection on import)
    #[arg(short, long)]
    collection: Option<String>,

    /// Username for basic auth
    #[arg(short, long, env = "SOLR_USERNAME")]
    username: Option<String>,

    /// Password for basic auth
    #[arg(short, long, env = "SOLR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Solr query selecting documents for export
    #[arg(short, long, default_value = "*:*")]
    query: String,

    /// Unique key field of the collection
    #[arg(long, default_value = "id")]
    id_field: String,

    /// Skip confirmation prompts
    #[arg(short = 'y', long)]
    yes: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a collection to a JSON Lines archive
    Export {
        /// Rebuild nested child documents into trees
        #[arg(long)]
        nested: bool,

        /// Documents fetched per page
        #[arg(long, default_value_t = 500)]
        page_size: usize,

        /// Replace an existing archive
        #[arg(long)]
        force: bool,

        /// Archive file, or a directory to place <collection>.jsonl in
        dest: PathBuf,
    },

    /// Import an archive into a collection
    Import {
        /// Documents per update request
        #[arg(long, default_value_t = 50)]
        batch_size: usize,

        /// Concurrent in-flight update requests
        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// Only submit documents whose id is not already in the collection
        #[arg(long)]
        skip_existing: bool,

        /// Archive file produced by export
        archive: PathBuf,
    },

    /// Rebuild a collection: snapshot data and config, recreate it with a
    /// fresh config, reimport
    Reindex {
        /// Rebuild nested child documents into trees
        #[arg(long)]
        nested: bool,

        /// Documents fetched per export page
        #[arg(long, default_value_t = 500)]
        page_size: usize,

        /// Documents per update request on reimport
        #[arg(long, default_value_t = 50)]
        batch_size: usize,

        /// Concurrent in-flight update requests on reimport
        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// Name for the re-uploaded config (defaults to
        /// <collection>_<timestamp>)
        #[arg(long)]
        config_name: Option<String>,

        /// Local config tree to upload instead of the collection's current one
        #[arg(long)]
        config_dir: Option<PathBuf>,

        /// Working directory for the snapshot (archive and config)
        dir: PathBuf,
    },

    /// Download a config set into a local directory
    ExportConfig {
        /// Config set name
        #[arg(long)]
        name: String,

        /// Directory to write the config tree into
        dest: PathBuf,
    },

    /// Upload a local directory as a config set
    ImportConfig {
        /// Config set name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,

        /// Replace an existing config set of the same name
        #[arg(long)]
        overwrite: bool,

        /// Directory containing the config root
        dir: PathBuf,
    },

    /// Delete a config set by name
    RemoveConfig {
        /// Config set name
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client = SolrClient::new(ClientConfig {
        base_url: cli.url.clone(),
        username: cli.username.clone(),
        password: cli.password.clone(),
    })?;

    match &cli.command {
        Commands::Export {
            nested,
            page_size,
            force,
            dest,
        } => {
            run_export(&cli, client, *nested, *page_size, *force, dest).await?;
        }
        Commands::Import {
            batch_size,
            workers,
            skip_existing,
            archive,
        } => {
            run_import(&cli, client, *batch_size, *workers, *skip_existing, archive).await?;
        }
        Commands::Reindex {
            nested,
            page_size,
            batch_size,
            workers,
            config_name,
            config_dir,
            dir,
        } => {
            let options = ReindexOptions {
                query: cli.query.clone(),
                id_field: cli.id_field.clone(),
                page_size: *page_size,
                batch_size: *batch_size,
                workers: *workers,
                nested: *nested,
                config_name: config_name.clone(),
                config_dir: config_dir.clone(),
                ..ReindexOptions::new(
                    cli.collection
                        .clone()
                        .context("--collection is required for reindex")?,
                )
            };
            run_reindex(&cli, client, options, dir).await?;
        }
        Commands::ExportConfig { name, dest } => {
            let written = ConfigTransfer::new(client).export_config(name, dest).await?;
            println!("Exported config '{}': {} files -> {}", name, written, dest.display());
        }
        Commands::ImportConfig {
            name,
            overwrite,
            dir,
        } => {
            run_import_config(&cli, client, name.as_deref(), *overwrite, dir).await?;
        }
        Commands::RemoveConfig { name } => {
            if confirm(&cli, &format!("Delete config set '{name}'?"))? {
                ConfigTransfer::new(client).remove_config(name).await?;
                println!("Removed config '{name}'");
            }
        }
    }

    Ok(())
}

async fn run_export(
    cli: &Cli,
    client: SolrClient,
    nested: bool,
    page_size: usize,
    force: bool,
    dest: &PathBuf,
) -> anyhow::Result<()> {
    let collection = cli
        .collection
        .clone()
        .context("--collection is required for export")?;

    let options = ExportOptions {
        collection,
        query: cli.query.clone(),
        id_field: cli.id_field.clone(),
        page_size,
        nested,
        force,
    };
    let pipeline = ExportPipeline::new(client, options);

    let Some(written) = cancellable(pipeline.run(dest)).await? else {
        std::process::exit(EXIT_INTERRUPTED);
    };

    println!("Export complete: {written} documents -> {}", dest.display());
    Ok(())
}

async fn run_import(
    cli: &Cli,
    client: SolrClient,
    batch_size: usize,
    workers: usize,
    skip_existing: bool,
    archive: &PathBuf,
) -> anyhow::Result<()> {
    let header = ImportPipeline::peek_header(archive)?;
    let target = cli
        .collection
        .clone()
        .unwrap_or_else(|| header.collection.clone());

    let prompt = format!(
        "Import {} (collection '{}', exported from {}) into collection '{}'?",
        archive.display(),
        header.collection,
        header.source_url,
        target,
    );
    if !confirm(cli, &prompt)? {
        return Ok(());
    }

    let options = ImportOptions {
        collection_override: cli.collection.clone(),
        batch_size,
        workers,
        skip_existing,
        id_field: cli.id_field.clone(),
        ..Default::default()
    };
    let pipeline = ImportPipeline::new(client, options);

    let Some(stats) = cancellable(pipeline.run(archive)).await? else {
        std::process::exit(EXIT_INTERRUPTED);
    };

    print_import_stats("Import", &stats);
    if !stats.is_clean() {
        // Partial failure still exits non-zero.
        std::process::exit(1);
    }
    Ok(())
}

async fn run_reindex(
    cli: &Cli,
    client: SolrClient,
    options: ReindexOptions,
    work_dir: &PathBuf,
) -> anyhow::Result<()> {
    let prompt = format!(
        "Reindex collection '{}'? It will be dropped and recreated.",
        options.collection,
    );
    if !confirm(cli, &prompt)? {
        return Ok(());
    }

    let pipeline = ReindexPipeline::new(client, options);
    let Some(stats) = cancellable(pipeline.run(work_dir)).await? else {
        warn!("snapshot left in {} for manual recovery", work_dir.display());
        std::process::exit(EXIT_INTERRUPTED);
    };

    print_import_stats("Reindex", &stats);
    if !stats.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_import_stats(label: &str, stats: &ImportStats) {
    println!("{label} complete:");
    println!("   Committed: {} docs ({} chunks)", stats.docs_committed, stats.chunks_committed);
    println!("   Failed:    {} docs ({} chunks)", stats.docs_failed, stats.chunks_failed);
    if stats.docs_skipped > 0 {
        println!("   Skipped:   {} docs", stats.docs_skipped);
    }
}

async fn run_import_config(
    cli: &Cli,
    client: SolrClient,
    name: Option<&str>,
    overwrite: bool,
    dir: &PathBuf,
) -> anyhow::Result<()> {
    if overwrite && !confirm(cli, "Overwrite the existing config set?")? {
        return Ok(());
    }

    ConfigTransfer::new(client)
        .import_config(dir, name, overwrite)
        .await?;
    println!("Imported config from {}", dir.display());
    Ok(())
}

/// Runs a pipeline future until completion or Ctrl-C.
///
/// On interrupt no new requests are issued; records already flushed stay in
/// place and the partial state is reported.
async fn cancellable<T>(
    fut: impl Future<Output = solrdump::Result<T>>,
) -> anyhow::Result<Option<T>> {
    tokio::select! {
        result = fut => Ok(Some(result?)),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; stopping, partial state left in place");
            Ok(None)
        }
    }
}

fn confirm(cli: &Cli, prompt: &str) -> anyhow::Result<bool> {
    if cli.yes {
        return Ok(true);
    }
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;
    if !confirmed {
        println!("Cancelled");
    }
    Ok(confirmed)
}
