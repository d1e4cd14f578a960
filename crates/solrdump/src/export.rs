//! Export pipeline: paginator -> reconstructor -> archive writer.

use std::path::{Path, PathBuf};

use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::archive::{ArchiveHeader, ArchiveWriter};
use crate::client::SolrClient;
use crate::error::{Error, Result};
use crate::paginator::CursorPaginator;
use crate::tree::{DocNode, TreeBuilder};

/// Settings for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Collection to export.
    pub collection: String,
    /// Solr query selecting the documents.
    pub query: String,
    /// Unique key field.
    pub id_field: String,
    /// Documents fetched per page.
    pub page_size: usize,
    /// Reconstruct nested documents.
    pub nested: bool,
    /// Replace an existing archive instead of refusing.
    pub force: bool,
}

/// Streams a collection into an on-disk archive.
pub struct ExportPipeline {
    client: SolrClient,
    options: ExportOptions,
}

impl ExportPipeline {
    /// Creates the pipeline.
    pub fn new(client: SolrClient, options: ExportOptions) -> Self {
        Self { client, options }
    }

    /// Resolves the destination: a directory gets `<collection>.jsonl`
    /// inside it, anything else is taken as the archive path.
    pub fn resolve_dest(&self, dest: &Path) -> PathBuf {
        if dest.is_dir() {
            dest.join(format!("{}.jsonl", self.options.collection))
        } else {
            dest.to_path_buf()
        }
    }

    /// Runs the export and returns the number of documents written.
    ///
    /// The archive is written incrementally; a mid-stream failure leaves a
    /// partial file behind and the error propagates. Rerunning with
    /// `force` replaces it.
    pub async fn run(&self, dest: &Path) -> Result<u64> {
        let path = self.resolve_dest(dest);
        if path.exists() && !self.options.force {
            return Err(Error::Config(format!(
                "archive {} already exists; pass --force to replace it",
                path.display()
            )));
        }

        let paginator = CursorPaginator::new(
            self.client.clone(),
            self.options.collection.clone(),
            self.options.query.clone(),
            self.options.id_field.clone(),
            self.options.page_size,
            self.options.nested,
        )?;

        let total = paginator.count().await?;
        info!(
            collection = %self.options.collection,
            total,
            nested = self.options.nested,
            "starting export"
        );
        let progress = create_progress_bar(total);

        let header = ArchiveHeader {
            collection: self.options.collection.clone(),
            source_url: self.client.base_url().to_string(),
            nested: self.options.nested,
        };
        let mut writer = ArchiveWriter::create(&path, &header)?;

        let mut builder = self
            .options
            .nested
            .then(|| TreeBuilder::new(self.options.id_field.clone()));
        let mut written: u64 = 0;

        let mut pages = std::pin::pin!(paginator.into_stream());
        while let Some(page) = pages.try_next().await? {
            let consumed = page.docs.len() as u64;
            for doc in page.docs {
                match builder.as_mut() {
                    Some(builder) => {
                        for node in builder.push(doc)? {
                            written += node.doc_count();
                            writer.write_node(node)?;
                        }
                    }
                    None => {
                        writer.write_node(DocNode::leaf(doc))?;
                        written += 1;
                    }
                }
            }
            progress.inc(consumed);
        }

        if let Some(builder) = builder {
            for node in builder.finish()? {
                written += node.doc_count();
                writer.write_node(node)?;
            }
        }

        let records = writer.finish()?;
        progress.finish_with_message("export complete");

        info!(
            collection = %self.options.collection,
            documents = written,
            records,
            archive = %path.display(),
            "export complete"
        );

        Ok(written)
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = if total > 0 {
        ProgressBar::new(total)
    } else {
        ProgressBar::new_spinner()
    };

    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    pb
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
