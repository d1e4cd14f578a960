//! Tests for the import pipeline.

use super::*;
use crate::archive::{ArchiveHeader, ArchiveWriter};
use crate::client::ClientConfig;
use crate::tree::{DocNode, Document};
use std::path::PathBuf;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> SolrClient {
    SolrClient::new(ClientConfig {
        base_url: server.uri(),
        username: None,
        password: None,
    })
    .unwrap()
}

fn update_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "responseHeader": {"status": 0}
    }))
}

fn doc(id: &str) -> Document {
    let mut map = Document::new();
    map.insert("id".to_string(), serde_json::Value::String(id.to_string()));
    map
}

/// Writes an archive of flat documents and returns its path.
fn write_archive(dir: &std::path::Path, collection: &str, ids: &[&str]) -> PathBuf {
    let path = dir.join(format!("{collection}.jsonl"));
    let header = ArchiveHeader {
        collection: collection.to_string(),
        source_url: "http://source:8983".to_string(),
        nested: false,
    };
    let mut writer = ArchiveWriter::create(&path, &header).unwrap();
    for id in ids {
        writer.write_node(DocNode::leaf(doc(id))).unwrap();
    }
    writer.finish().unwrap();
    path
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        add_jitter: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_import_commits_all_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/solr/things/update"))
        .respond_with(update_ok())
        .expect(2) // 3 docs, batch size 2
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "things", &["1", "2", "3"]);

    let options = ImportOptions {
        batch_size: 2,
        retry: RetryConfig::no_retry(),
        ..Default::default()
    };
    let stats = ImportPipeline::new(client_for(&server), options)
        .run(&archive)
        .await
        .unwrap();

    assert_eq!(stats.docs_committed, 3);
    assert_eq!(stats.chunks_committed, 2);
    assert!(stats.is_clean());
}

#[tokio::test]
async fn test_import_uses_archive_collection_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/solr/from_archive/update"))
        .respond_with(update_ok())
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "from_archive", &["1"]);

    let options = ImportOptions {
        retry: RetryConfig::no_retry(),
        ..Default::default()
    };
    let stats = ImportPipeline::new(client_for(&server), options)
        .run(&archive)
        .await
        .unwrap();
    assert!(stats.is_clean());
}

#[tokio::test]
async fn test_import_collection_override_retargets() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/solr/other/update"))
        .respond_with(update_ok())
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "from_archive", &["1"]);

    let options = ImportOptions {
        collection_override: Some("other".to_string()),
        retry: RetryConfig::no_retry(),
        ..Default::default()
    };
    let stats = ImportPipeline::new(client_for(&server), options)
        .run(&archive)
        .await
        .unwrap();
    assert!(stats.is_clean());
}

#[tokio::test]
async fn test_one_failing_chunk_does_not_abort_import() {
    let server = MockServer::start().await;
    // The chunk containing "poison" always fails; everything else commits.
    Mock::given(method("POST"))
        .and(path("/solr/things/update"))
        .and(body_string_contains("poison"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/solr/things/update"))
        .respond_with(update_ok())
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "things", &["1", "2", "poison", "4", "5"]);

    let options = ImportOptions {
        batch_size: 1,
        retry: fast_retry(),
        ..Default::default()
    };
    let stats = ImportPipeline::new(client_for(&server), options)
        .run(&archive)
        .await
        .unwrap();

    assert_eq!(stats.docs_committed, 4);
    assert_eq!(stats.docs_failed, 1);
    assert_eq!(stats.chunks_failed, 1);
    assert!(!stats.is_clean());
}

#[tokio::test]
async fn test_transient_failure_retried_then_committed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/solr/things/update"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/solr/things/update"))
        .respond_with(update_ok())
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "things", &["1"]);

    let options = ImportOptions {
        retry: fast_retry(),
        ..Default::default()
    };
    let stats = ImportPipeline::new(client_for(&server), options)
        .run(&archive)
        .await
        .unwrap();

    assert_eq!(stats.docs_committed, 1);
    assert!(stats.is_clean());
}

#[tokio::test]
async fn test_missing_collection_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/solr/things/update"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such collection"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "things", &["1"]);

    let options = ImportOptions {
        retry: RetryConfig::no_retry(),
        ..Default::default()
    };
    let err = ImportPipeline::new(client_for(&server), options)
        .run(&archive)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_corrupt_archive_is_fatal() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("bad.jsonl");
    std::fs::write(&archive, "{\"collection\":\"things\",\"source_url\":\"u\",\"nested\":false}\nnot json\n").unwrap();

    let options = ImportOptions {
        retry: RetryConfig::no_retry(),
        ..Default::default()
    };
    let err = ImportPipeline::new(client_for(&server), options)
        .run(&archive)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { .. }));
}

#[tokio::test]
async fn test_version_and_root_scrubbed_before_submit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/solr/things/update"))
        .and(body_string_contains("_version_"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/solr/things/update"))
        .respond_with(update_ok())
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("things.jsonl");
    let header = ArchiveHeader {
        collection: "things".to_string(),
        source_url: "u".to_string(),
        nested: true,
    };
    let mut writer = ArchiveWriter::create(&path, &header).unwrap();
    let mut root = doc("1");
    root.insert("_version_".to_string(), serde_json::json!(123456789));
    root.insert("_root_".to_string(), serde_json::json!("1"));
    let mut child = doc("1:2");
    child.insert("_version_".to_string(), serde_json::json!(987654321));
    writer
        .write_node(DocNode {
            doc: root,
            children: vec![DocNode::leaf(child)],
        })
        .unwrap();
    writer.finish().unwrap();

    let options = ImportOptions {
        retry: RetryConfig::no_retry(),
        ..Default::default()
    };
    let stats = ImportPipeline::new(client_for(&server), options)
        .run(&path)
        .await
        .unwrap();

    assert_eq!(stats.docs_committed, 2);
    assert!(stats.is_clean());
}

#[test]
fn test_scrub_removes_fields_recursively() {
    let value = serde_json::json!({
        "id": "1",
        "_version_": 1,
        "_root_": "1",
        "_childDocuments_": [{"id": "1:2", "_version_": 2}],
    });
    let scrubbed = scrub(value);
    assert!(scrubbed.get("_version_").is_none());
    assert!(scrubbed.get("_root_").is_none());
    assert!(scrubbed["_childDocuments_"][0].get("_version_").is_none());
    assert_eq!(scrubbed["_childDocuments_"][0]["id"], "1:2");
}

#[test]
fn test_chunk_iter_counts_nested_docs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("things.jsonl");
    let header = ArchiveHeader {
        collection: "things".to_string(),
        source_url: "u".to_string(),
        nested: true,
    };
    let mut writer = ArchiveWriter::create(&path, &header).unwrap();
    writer
        .write_node(DocNode {
            doc: doc("1"),
            children: vec![DocNode::leaf(doc("1:2")), DocNode::leaf(doc("1:3"))],
        })
        .unwrap();
    writer.write_node(DocNode::leaf(doc("2"))).unwrap();
    writer.finish().unwrap();

    let (_, reader) = crate::archive::ArchiveReader::open(&path).unwrap();
    let chunks: Vec<Chunk> = ChunkIter::new(reader, 10, None).map(|c| c.unwrap()).collect();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].docs.len(), 2); // two trees
    assert_eq!(chunks[0].doc_count, 4); // four documents
    assert_eq!(chunks[0].state, ChunkState::Pending);
}

async fn mount_export_ids(server: &MockServer, collection: &str, ids: &[&str]) {
    let docs: Vec<serde_json::Value> = ids.iter().map(|id| serde_json::json!({"id": id})).collect();
    Mock::given(method("GET"))
        .and(path(format!("/solr/{collection}/export")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": {"numFound": ids.len(), "docs": docs}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_skip_existing_withholds_present_documents() {
    let server = MockServer::start().await;
    mount_export_ids(&server, "things", &["1", "3"]).await;
    Mock::given(method("POST"))
        .and(path("/solr/things/update"))
        .respond_with(update_ok())
        .expect(1) // only doc "2" survives the filter
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "things", &["1", "2", "3"]);

    let options = ImportOptions {
        skip_existing: true,
        retry: RetryConfig::no_retry(),
        ..Default::default()
    };
    let stats = ImportPipeline::new(client_for(&server), options)
        .run(&archive)
        .await
        .unwrap();

    assert_eq!(stats.docs_committed, 1);
    assert_eq!(stats.docs_skipped, 2);
    assert!(stats.is_clean());
}

#[tokio::test]
async fn test_skip_existing_dedupes_repeated_archive_ids() {
    let server = MockServer::start().await;
    mount_export_ids(&server, "things", &[]).await;
    Mock::given(method("POST"))
        .and(path("/solr/things/update"))
        .respond_with(update_ok())
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "things", &["1", "1", "2"]);

    let options = ImportOptions {
        skip_existing: true,
        retry: RetryConfig::no_retry(),
        ..Default::default()
    };
    let stats = ImportPipeline::new(client_for(&server), options)
        .run(&archive)
        .await
        .unwrap();

    assert_eq!(stats.docs_committed, 2);
    assert_eq!(stats.docs_skipped, 1);
}

#[tokio::test]
async fn test_skip_existing_id_fetch_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/solr/things/export"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such collection"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "things", &["1"]);

    let options = ImportOptions {
        skip_existing: true,
        retry: RetryConfig::no_retry(),
        ..Default::default()
    };
    let err = ImportPipeline::new(client_for(&server), options)
        .run(&archive)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_peek_header_reads_without_importing() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "things", &["1"]);
    let header = ImportPipeline::peek_header(&archive).unwrap();
    assert_eq!(header.collection, "things");
}
