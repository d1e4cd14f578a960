//! On-disk archive format.
//!
//! JSON Lines: the first line is a header record naming the collection, each
//! following line is one document tree. The format is streamable in both
//! directions and a truncated export is visibly incomplete (the reader hits
//! EOF mid-stream instead of finding a well-formed file).

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tree::DocNode;

/// Archive-level metadata, stored as the first line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveHeader {
    /// Collection the documents were exported from.
    pub collection: String,
    /// Base URL of the source cluster.
    pub source_url: String,
    /// Whether nested reconstruction was applied on export.
    pub nested: bool,
}

/// Incremental archive writer.
///
/// Buffered; call [`ArchiveWriter::finish`] to flush. Dropping without
/// `finish` after a failure leaves a partial archive, which is the intended
/// mid-stream failure state.
pub struct ArchiveWriter {
    out: BufWriter<File>,
    records: u64,
}

impl ArchiveWriter {
    /// Creates the archive file and writes the header line.
    pub fn create(path: &Path, header: &ArchiveHeader) -> Result<Self> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer(&mut out, header)?;
        out.write_all(b"\n")?;
        Ok(Self { out, records: 0 })
    }

    /// Appends one document tree as a single line.
    pub fn write_node(&mut self, node: DocNode) -> Result<()> {
        serde_json::to_writer(&mut self.out, &node.into_value())?;
        self.out.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    /// Flushes and returns the number of records written.
    pub fn finish(mut self) -> Result<u64> {
        self.out.flush()?;
        Ok(self.records)
    }
}

/// Lazy archive reader: header up front, then one tree per `next()`.
#[derive(Debug)]
pub struct ArchiveReader {
    lines: Lines<BufReader<File>>,
    line: u64,
}

impl ArchiveReader {
    /// Opens an archive and parses its header.
    ///
    /// # Errors
    ///
    /// `Error::ArchiveFormat` if the file is empty or the header is not a
    /// valid header record.
    pub fn open(path: &Path) -> Result<(ArchiveHeader, Self)> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();

        let first = lines.next().ok_or(Error::ArchiveFormat {
            line: 1,
            message: "empty archive".to_string(),
        })??;
        let header: ArchiveHeader =
            serde_json::from_str(&first).map_err(|e| Error::ArchiveFormat {
                line: 1,
                message: format!("invalid header: {e}"),
            })?;

        Ok((header, Self { lines, line: 1 }))
    }
}

impl Iterator for ArchiveReader {
    type Item = Result<DocNode>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = match self.lines.next()? {
            Ok(raw) => raw,
            Err(e) => return Some(Err(e.into())),
        };
        self.line += 1;

        if raw.trim().is_empty() {
            // Tolerate a trailing newline.
            return self.next();
        }

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                return Some(Err(Error::ArchiveFormat {
                    line: self.line,
                    message: format!("invalid record: {e}"),
                }))
            }
        };

        Some(DocNode::from_value(value).map_err(|e| Error::ArchiveFormat {
            line: self.line,
            message: e.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Document;
    use serde_json::Value;

    fn node(id: &str) -> DocNode {
        let mut doc = Document::new();
        doc.insert("id".to_string(), Value::String(id.to_string()));
        DocNode::leaf(doc)
    }

    fn header() -> ArchiveHeader {
        ArchiveHeader {
            collection: "things".to_string(),
            source_url: "http://localhost:8983".to_string(),
            nested: false,
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("things.jsonl");

        let mut writer = ArchiveWriter::create(&path, &header()).unwrap();
        writer.write_node(node("1")).unwrap();
        writer.write_node(node("2")).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let (read_header, reader) = ArchiveReader::open(&path).unwrap();
        assert_eq!(read_header, header());
        let nodes: Vec<DocNode> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id("id").as_deref(), Some("1"));
    }

    #[test]
    fn test_same_input_produces_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");

        for path in [&a, &b] {
            let mut writer = ArchiveWriter::create(path, &header()).unwrap();
            writer.write_node(node("1")).unwrap();
            writer.finish().unwrap();
        }

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn test_empty_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        std::fs::write(&path, "").unwrap();

        let err = ArchiveReader::open(&path).unwrap_err();
        assert!(matches!(err, Error::ArchiveFormat { line: 1, .. }));
    }

    #[test]
    fn test_corrupt_record_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        let mut writer = ArchiveWriter::create(&path, &header()).unwrap();
        writer.write_node(node("1")).unwrap();
        writer.finish().unwrap();

        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{not json\n");
        std::fs::write(&path, contents).unwrap();

        let (_, reader) = ArchiveReader::open(&path).unwrap();
        let results: Vec<_> = reader.collect();
        assert!(results[0].is_ok());
        match results[1].as_ref().unwrap_err() {
            Error::ArchiveFormat { line, .. } => assert_eq!(*line, 3),
            other => panic!("expected archive format error, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_trees_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested.jsonl");

        let tree = DocNode {
            doc: node("1").doc,
            children: vec![node("1:2"), node("1:3")],
        };

        let mut writer = ArchiveWriter::create(&path, &header()).unwrap();
        writer.write_node(tree.clone()).unwrap();
        writer.finish().unwrap();

        let (_, mut reader) = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.next().unwrap().unwrap(), tree);
    }
}
