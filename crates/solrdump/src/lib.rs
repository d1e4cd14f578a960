// CLI tool - pedantic lints relaxed for ergonomics
#![allow(clippy::pedantic)]

//! # solrdump
//!
//! `solrdump` is a CLI tool and library for bulk-moving Solr collections and
//! config sets over the HTTP API: cursor-paginated export to a JSON Lines
//! archive (with nested-document reconstruction), chunked re-import with
//! bounded concurrency and retry, and config-set transfer.
//!
//! ## Quick Start
//!
//! ```bash
//! # Export a collection to an archive
//! solrdump --url http://localhost:8983 --collection products export ./products.jsonl
//!
//! # Re-import it elsewhere
//! solrdump --url http://other:8983 import ./products.jsonl
//!
//! # Nested child documents
//! solrdump --url http://localhost:8983 --collection catalog export --nested ./catalog.jsonl
//! ```
//!
//! The export pipeline streams: pages are fetched with Solr's `cursorMark`
//! protocol, nested trees are rebuilt one subtree at a time, and records are
//! written incrementally, so memory use is bounded by the page size rather
//! than the collection size.

#![warn(missing_docs)]

pub mod admin;
pub mod archive;
pub mod client;
pub mod configset;
pub mod error;
pub mod export;
pub mod import;
pub mod paginator;
pub mod reindex;
pub mod retry;
pub mod tree;

pub use admin::{CollectionAdmin, CollectionInfo};
pub use archive::{ArchiveHeader, ArchiveReader, ArchiveWriter};
pub use client::{ClientConfig, SolrClient};
pub use configset::ConfigTransfer;
pub use error::{Error, Result};
pub use export::{ExportOptions, ExportPipeline};
pub use import::{ImportOptions, ImportPipeline, ImportStats};
pub use paginator::{CursorPaginator, DocumentPage};
pub use reindex::{ReindexOptions, ReindexPipeline};
pub use retry::RetryConfig;
pub use tree::{DocNode, Document, TreeBuilder};
