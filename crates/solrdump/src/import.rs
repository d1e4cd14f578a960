//! Import pipeline: archive reader -> chunker -> bulk update.
//!
//! Chunks are independent units: they are submitted with bounded concurrency,
//! may commit out of order, and one permanently failed chunk does not abort
//! the rest. Fatal errors (missing collection, bad credentials, corrupt
//! archive) do abort.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{info, warn};

use crate::archive::{ArchiveHeader, ArchiveReader};
use crate::client::SolrClient;
use crate::error::{Error, Result};
use crate::retry::{is_retryable, with_retry, RetryConfig};
use crate::tree::DocNode;

/// Fields regenerated by Solr that must not be re-submitted.
const SCRUBBED_FIELDS: &[&str] = &["_version_", "_root_"];

/// Settings for one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Re-target every record to this collection instead of the archive's.
    pub collection_override: Option<String>,
    /// Documents per update request.
    pub batch_size: usize,
    /// Concurrent in-flight update requests.
    pub workers: usize,
    /// Solr `commitWithin` window in milliseconds.
    pub commit_within_ms: u64,
    /// Only submit documents whose id is not already in the collection.
    pub skip_existing: bool,
    /// Unique key field, used when `skip_existing` compares ids.
    pub id_field: String,
    /// Retry policy for transient transport failures.
    pub retry: RetryConfig,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            collection_override: None,
            batch_size: 50,
            workers: 4,
            commit_within_ms: 5000,
            skip_existing: false,
            id_field: "id".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

/// Outcome counters for an import run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    /// Documents committed to the cluster.
    pub docs_committed: u64,
    /// Documents in permanently failed chunks.
    pub docs_failed: u64,
    /// Documents withheld because their id already existed (or repeated
    /// within the archive) under `skip_existing`.
    pub docs_skipped: u64,
    /// Chunks committed.
    pub chunks_committed: u64,
    /// Chunks that exhausted their retries.
    pub chunks_failed: u64,
}

impl ImportStats {
    /// True when every chunk committed.
    pub fn is_clean(&self) -> bool {
        self.chunks_failed == 0
    }
}

/// Lifecycle of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Built from the archive, not yet submitted.
    Pending,
    /// Update request in flight (including retries).
    InFlight,
    /// Accepted by the cluster.
    Committed,
    /// Retries exhausted on a transient failure.
    Failed,
}

/// A size-bounded group of documents submitted as one update request.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position in the archive, for log correlation.
    pub index: usize,
    /// Documents in Solr update shape (children nested).
    pub docs: Vec<Value>,
    /// Total documents including nested children.
    pub doc_count: u64,
    /// Current lifecycle state.
    pub state: ChunkState,
}

/// Pushes an archive back into the cluster.
pub struct ImportPipeline {
    client: SolrClient,
    options: ImportOptions,
}

impl ImportPipeline {
    /// Creates the pipeline.
    pub fn new(client: SolrClient, options: ImportOptions) -> Self {
        Self { client, options }
    }

    /// Reads the archive header without importing, for confirmation UIs.
    pub fn peek_header(source: &Path) -> Result<ArchiveHeader> {
        let (header, _) = ArchiveReader::open(source)?;
        Ok(header)
    }

    /// Runs the import, returning partial-failure statistics.
    ///
    /// # Errors
    ///
    /// Fatal errors only; a chunk that exhausts its retries is counted in
    /// the stats instead. Callers decide the exit code from
    /// [`ImportStats::is_clean`].
    pub async fn run(&self, source: &Path) -> Result<ImportStats> {
        let (header, reader) = ArchiveReader::open(source)?;
        let collection = self
            .options
            .collection_override
            .clone()
            .unwrap_or_else(|| header.collection.clone());

        info!(
            archive = %source.display(),
            collection = %collection,
            batch_size = self.options.batch_size,
            workers = self.options.workers,
            "starting import"
        );

        let skipped = Arc::new(AtomicU64::new(0));
        let filter = if self.options.skip_existing {
            let existing = self.fetch_existing_ids(&collection).await?;
            info!(existing = existing.len(), "fetched collection ids for skip-existing");
            Some(SkipFilter {
                existing,
                seen: HashSet::new(),
                id_field: self.options.id_field.clone(),
                skipped: skipped.clone(),
            })
        } else {
            None
        };

        let progress = create_progress_bar();
        let chunks = ChunkIter::new(reader, self.options.batch_size, filter);

        let mut stats = ImportStats::default();
        let collection_ref = &collection;
        let mut outcomes = futures::stream::iter(chunks)
            .map(|chunk| async move {
                let chunk = chunk?;
                self.submit_chunk(collection_ref, chunk).await
            })
            .buffer_unordered(self.options.workers.max(1));

        while let Some(outcome) = outcomes.next().await {
            let chunk = outcome?;
            match chunk.state {
                ChunkState::Committed => {
                    stats.chunks_committed += 1;
                    stats.docs_committed += chunk.doc_count;
                }
                ChunkState::Failed => {
                    stats.chunks_failed += 1;
                    stats.docs_failed += chunk.doc_count;
                }
                ChunkState::Pending | ChunkState::InFlight => {
                    unreachable!("submit_chunk always resolves the chunk")
                }
            }
            progress.inc(chunk.doc_count);
        }

        stats.docs_skipped = skipped.load(Ordering::Relaxed);
        progress.finish_with_message("import complete");
        info!(
            collection = %collection,
            docs_committed = stats.docs_committed,
            docs_failed = stats.docs_failed,
            docs_skipped = stats.docs_skipped,
            chunks_failed = stats.chunks_failed,
            "import complete"
        );

        Ok(stats)
    }

    /// Ids already present in the target collection, via the streaming
    /// export handler (id field only, one request).
    async fn fetch_existing_ids(&self, collection: &str) -> Result<HashSet<String>> {
        let id_field = &self.options.id_field;
        let params = [
            ("q", "*:*".to_string()),
            ("fl", id_field.clone()),
            ("sort", format!("{id_field} desc")),
            ("wt", "json".to_string()),
        ];
        let body = self
            .client
            .get_json(&format!("/solr/{collection}/export"), &params)
            .await?;

        let docs = body["response"]["docs"]
            .as_array()
            .ok_or_else(|| Error::transport("export response missing response.docs"))?;

        Ok(docs
            .iter()
            .filter_map(|doc| doc.get(id_field).and_then(crate::tree::id_string))
            .collect())
    }

    /// Submits one chunk, retrying transient transport failures.
    ///
    /// Exhausted retries mark the chunk `Failed` and return `Ok`; only fatal
    /// errors surface as `Err`.
    async fn submit_chunk(&self, collection: &str, mut chunk: Chunk) -> Result<Chunk> {
        chunk.state = ChunkState::InFlight;

        let path = format!("/solr/{collection}/update");
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let params = [
            ("_", now_ms.to_string()),
            ("commitWithin", self.options.commit_within_ms.to_string()),
            ("overwrite", "true".to_string()),
            ("wt", "json".to_string()),
        ];
        let body = Value::Array(chunk.docs.clone());
        let name = format!("import chunk {}", chunk.index);

        let result = with_retry(&self.options.retry, &name, || {
            self.client.post_json(&path, &params, &body)
        })
        .await;

        match result {
            Ok(_) => {
                chunk.state = ChunkState::Committed;
                Ok(chunk)
            }
            Err(e) if is_retryable(&e) => {
                // Transient but retries exhausted: record and move on.
                warn!(chunk = chunk.index, error = %e, "chunk permanently failed");
                chunk.state = ChunkState::Failed;
                Ok(chunk)
            }
            Err(e) => Err(e),
        }
    }
}

/// Withholds records whose root id is already taken: present in the
/// collection, or emitted earlier in this run.
struct SkipFilter {
    existing: HashSet<String>,
    seen: HashSet<String>,
    id_field: String,
    skipped: Arc<AtomicU64>,
}

impl SkipFilter {
    fn admits(&mut self, node: &DocNode) -> bool {
        // A record without the unique key cannot be matched; let the
        // cluster judge it.
        let Some(id) = node.id(&self.id_field) else {
            return true;
        };
        if self.existing.contains(&id) || !self.seen.insert(id) {
            self.skipped.fetch_add(node.doc_count(), Ordering::Relaxed);
            return false;
        }
        true
    }
}

/// Groups archive records into document-count-bounded chunks.
struct ChunkIter {
    reader: ArchiveReader,
    batch_size: usize,
    next_index: usize,
    done: bool,
    filter: Option<SkipFilter>,
}

impl ChunkIter {
    fn new(reader: ArchiveReader, batch_size: usize, filter: Option<SkipFilter>) -> Self {
        Self {
            reader,
            batch_size: batch_size.max(1),
            next_index: 0,
            done: false,
            filter,
        }
    }
}

impl Iterator for ChunkIter {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut docs = Vec::with_capacity(self.batch_size);
        let mut doc_count = 0u64;

        while docs.len() < self.batch_size {
            match self.reader.next() {
                Some(Ok(node)) => {
                    if let Some(filter) = self.filter.as_mut() {
                        if !filter.admits(&node) {
                            continue;
                        }
                    }
                    doc_count += node.doc_count();
                    docs.push(scrub(node.into_value()));
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if docs.is_empty() {
            return None;
        }

        let index = self.next_index;
        self.next_index += 1;
        Some(Ok(Chunk {
            index,
            docs,
            doc_count,
            state: ChunkState::Pending,
        }))
    }
}

/// Recursively removes cluster-managed fields before re-submission.
fn scrub(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !SCRUBBED_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k, scrub(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(scrub).collect()),
        other => other,
    }
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} docs submitted")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb
}

#[cfg(test)]
#[path = "import_tests.rs"]
mod tests;
