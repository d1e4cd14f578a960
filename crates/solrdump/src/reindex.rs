//! Reindex pipeline: rebuild a collection from scratch.
//!
//! Composes the other pipelines in the only safe order: snapshot config and
//! data first, upload the config under a fresh name, and only then drop and
//! recreate the collection before reimporting. A failure before the drop
//! leaves the collection untouched.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::admin::{CollectionAdmin, CollectionInfo};
use crate::client::SolrClient;
use crate::configset::ConfigTransfer;
use crate::error::Result;
use crate::export::{ExportOptions, ExportPipeline};
use crate::import::{ImportOptions, ImportPipeline, ImportStats};
use crate::retry::RetryConfig;

/// Settings for one reindex run.
#[derive(Debug, Clone)]
pub struct ReindexOptions {
    /// Collection to rebuild.
    pub collection: String,
    /// Solr query selecting the documents to carry over.
    pub query: String,
    /// Unique key field.
    pub id_field: String,
    /// Documents fetched per export page.
    pub page_size: usize,
    /// Documents per update request on reimport.
    pub batch_size: usize,
    /// Concurrent in-flight update requests on reimport.
    pub workers: usize,
    /// Reconstruct nested documents during the snapshot.
    pub nested: bool,
    /// Name for the re-uploaded config; defaults to
    /// `<collection>_<unix seconds>` so reruns never collide.
    pub config_name: Option<String>,
    /// Local config tree to upload instead of exporting the current one.
    pub config_dir: Option<PathBuf>,
    /// Retry policy for the reimport.
    pub retry: RetryConfig,
}

impl ReindexOptions {
    /// Defaults matching the export/import pipelines.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            query: "*:*".to_string(),
            id_field: "id".to_string(),
            page_size: 500,
            batch_size: 50,
            workers: 4,
            nested: false,
            config_name: None,
            config_dir: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Drops and rebuilds one collection, data and config included.
pub struct ReindexPipeline {
    client: SolrClient,
    options: ReindexOptions,
}

impl ReindexPipeline {
    /// Creates the pipeline.
    pub fn new(client: SolrClient, options: ReindexOptions) -> Self {
        Self { client, options }
    }

    /// Runs the reindex, staging the snapshot under `work_dir`.
    ///
    /// # Errors
    ///
    /// Any failure during the snapshot phase aborts with the collection
    /// intact. Once the collection is dropped, failures propagate with the
    /// snapshot still on disk for manual recovery.
    pub async fn run(&self, work_dir: &Path) -> Result<ImportStats> {
        let collection = &self.options.collection;
        let admin = CollectionAdmin::new(self.client.clone());
        let configs = ConfigTransfer::new(self.client.clone());

        let current = admin.collection_info(collection).await?;
        info!(
            collection = %collection,
            config = %current.config_name,
            shards = current.num_shards,
            "starting reindex"
        );

        let data_dir = work_dir.join("data");
        std::fs::create_dir_all(&data_dir)?;

        let config_root = match &self.options.config_dir {
            Some(dir) => dir.clone(),
            None => {
                let config_dir = work_dir.join("config");
                configs
                    .export_config(&current.config_name, &config_dir)
                    .await?;
                config_dir.join(&current.config_name)
            }
        };

        let export = ExportPipeline::new(
            self.client.clone(),
            ExportOptions {
                collection: collection.clone(),
                query: self.options.query.clone(),
                id_field: self.options.id_field.clone(),
                page_size: self.options.page_size,
                nested: self.options.nested,
                force: true,
            },
        );
        let exported = export.run(&data_dir).await?;
        let archive = export.resolve_dest(&data_dir);
        info!(documents = exported, archive = %archive.display(), "snapshot complete");

        let new_config = self
            .options
            .config_name
            .clone()
            .unwrap_or_else(|| format!("{collection}_{}", unix_seconds()));
        configs
            .import_config(&config_root, Some(new_config.as_str()), false)
            .await?;

        admin.remove_collection(collection).await?;
        admin
            .create_collection(
                collection,
                &CollectionInfo {
                    config_name: new_config.clone(),
                    num_shards: current.num_shards,
                    replication_factor: current.replication_factor,
                },
            )
            .await?;

        let import = ImportPipeline::new(
            self.client.clone(),
            ImportOptions {
                collection_override: Some(collection.clone()),
                batch_size: self.options.batch_size,
                workers: self.options.workers,
                id_field: self.options.id_field.clone(),
                retry: self.options.retry.clone(),
                ..Default::default()
            },
        );
        let stats = import.run(&archive).await?;

        info!(
            collection = %collection,
            config = %new_config,
            docs_committed = stats.docs_committed,
            "reindex complete"
        );
        Ok(stats)
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
#[path = "reindex_tests.rs"]
mod tests;
