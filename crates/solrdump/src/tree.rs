//! Nested-document reconstruction.
//!
//! Export fetches nested collections as a flat stream: children carry a
//! `_nest_parent_` field and sort directly after their parent because Solr
//! prefixes child ids with the parent id. [`TreeBuilder`] rebuilds the
//! containment tree from that stream with a pending-children buffer, one
//! subtree in memory at a time. A child whose parent never appears is an
//! ordering violation and surfaces as [`Error::OrphanChild`] at end of
//! stream.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Field carrying parent linkage in flattened nested responses.
pub const PARENT_FIELD: &str = "_nest_parent_";

/// Field under which child documents nest in Solr update requests.
pub const CHILD_DOCS_FIELD: &str = "_childDocuments_";

/// A raw Solr document: field name to JSON value.
pub type Document = Map<String, Value>;

/// Renders a scalar unique-key value as a string.
///
/// Solr allows numeric unique keys; linkage fields carry them as JSON
/// numbers, so keys are compared in stringified form throughout.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A document plus its ordered children.
#[derive(Debug, Clone, PartialEq)]
pub struct DocNode {
    /// The document's own fields.
    pub doc: Document,
    /// Child documents in arrival order.
    pub children: Vec<DocNode>,
}

impl DocNode {
    /// A tree of one document.
    pub fn leaf(doc: Document) -> Self {
        Self {
            doc,
            children: Vec::new(),
        }
    }

    /// The document's unique identifier, if present, stringified.
    pub fn id(&self, id_field: &str) -> Option<String> {
        self.doc.get(id_field).and_then(id_string)
    }

    /// Number of documents in this subtree, the node included.
    pub fn doc_count(&self) -> u64 {
        1 + self.children.iter().map(DocNode::doc_count).sum::<u64>()
    }

    /// Serializes the tree as a single JSON object with children under
    /// [`CHILD_DOCS_FIELD`], the shape Solr's update endpoint accepts.
    pub fn into_value(self) -> Value {
        let mut doc = self.doc;
        if !self.children.is_empty() {
            let children: Vec<Value> = self.children.into_iter().map(DocNode::into_value).collect();
            doc.insert(CHILD_DOCS_FIELD.to_string(), Value::Array(children));
        }
        Value::Object(doc)
    }

    /// Inverse of [`DocNode::into_value`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the value is not an object or a child
    /// entry is malformed.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut doc) = value else {
            return Err(Error::Config(format!(
                "expected document object, got {value}"
            )));
        };

        let children = match doc.remove(CHILD_DOCS_FIELD) {
            Some(Value::Array(raw)) => raw
                .into_iter()
                .map(DocNode::from_value)
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(Error::Config(format!(
                    "{CHILD_DOCS_FIELD} must be an array, got {other}"
                )))
            }
            None => Vec::new(),
        };

        Ok(Self { doc, children })
    }
}

/// Arena slot while a subtree is under construction.
struct OpenNode {
    doc: Document,
    children: Vec<usize>,
}

/// Streaming tree reconstruction with a pending-children buffer.
pub struct TreeBuilder {
    id_field: String,
    /// Nodes of the currently open root subtree.
    arena: Vec<OpenNode>,
    /// Identifier to arena slot, for the open subtree only.
    index: HashMap<String, usize>,
    /// Children waiting for a parent that has not arrived yet.
    pending: HashMap<String, Vec<Document>>,
}

impl TreeBuilder {
    /// Creates a builder using `id_field` as the unique key.
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            arena: Vec::new(),
            index: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Feeds one document; returns any root trees completed by it.
    ///
    /// A document without parent linkage opens a new root, which completes
    /// the previous one: identifier ordering places an entire subtree before
    /// the next root.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the document lacks the unique key.
    pub fn push(&mut self, mut doc: Document) -> Result<Vec<DocNode>> {
        let id = doc.get(&self.id_field).and_then(id_string).ok_or_else(|| {
            Error::transport(format!(
                "document missing unique key field '{}'",
                self.id_field
            ))
        })?;

        let parent = doc.remove(PARENT_FIELD).and_then(|v| id_string(&v));

        match parent {
            None => {
                let emitted = self.flush_open();
                let slot = self.insert(id.clone(), doc);
                self.attach_waiting(&id, slot);
                Ok(emitted.into_iter().collect())
            }
            Some(parent_id) => {
                if let Some(&parent_slot) = self.index.get(&parent_id) {
                    let slot = self.insert(id.clone(), doc);
                    self.arena[parent_slot].children.push(slot);
                    self.attach_waiting(&id, slot);
                } else {
                    // Parent not seen yet; hold until it arrives. The parent
                    // field goes back in so a later attach sees it intact.
                    doc.insert(PARENT_FIELD.to_string(), Value::String(parent_id.clone()));
                    self.pending.entry(parent_id).or_default().push(doc);
                }
                Ok(Vec::new())
            }
        }
    }

    /// Flushes the open root and verifies the pending buffer drained.
    ///
    /// # Errors
    ///
    /// Returns `Error::OrphanChild` naming one unattachable child if any
    /// buffered document never found its parent.
    pub fn finish(mut self) -> Result<Vec<DocNode>> {
        let emitted: Vec<DocNode> = self.flush_open().into_iter().collect();

        if !self.pending.is_empty() {
            let mut orphan_ids: Vec<String> = self
                .pending
                .values()
                .flatten()
                .filter_map(|doc| doc.get(&self.id_field).and_then(id_string))
                .collect();
            orphan_ids.sort();
            let id = orphan_ids
                .into_iter()
                .next()
                .unwrap_or_else(|| "<unknown>".to_string());
            return Err(Error::OrphanChild { id });
        }

        Ok(emitted)
    }

    fn insert(&mut self, id: String, doc: Document) -> usize {
        let slot = self.arena.len();
        self.arena.push(OpenNode {
            doc,
            children: Vec::new(),
        });
        self.index.insert(id, slot);
        slot
    }

    /// Attaches buffered children of `id`, recursively: a child pulled out
    /// of the buffer may itself be an awaited parent.
    fn attach_waiting(&mut self, id: &str, slot: usize) {
        let Some(waiting) = self.pending.remove(id) else {
            return;
        };
        for mut child in waiting {
            child.remove(PARENT_FIELD);
            let child_id = child.get(&self.id_field).and_then(id_string);
            let child_slot = self.arena.len();
            self.arena.push(OpenNode {
                doc: child,
                children: Vec::new(),
            });
            self.arena[slot].children.push(child_slot);
            if let Some(child_id) = child_id {
                self.index.insert(child_id.clone(), child_slot);
                self.attach_waiting(&child_id, child_slot);
            }
        }
    }

    /// Converts the open arena back into a tree and resets it.
    fn flush_open(&mut self) -> Option<DocNode> {
        if self.arena.is_empty() {
            return None;
        }
        let arena = std::mem::take(&mut self.arena);
        self.index.clear();

        let children_lists: Vec<Vec<usize>> = arena.iter().map(|o| o.children.clone()).collect();
        let mut nodes: Vec<Option<DocNode>> = arena
            .into_iter()
            .map(|open| Some(DocNode::leaf(open.doc)))
            .collect();

        // Children were always appended after their parent, so walking the
        // arena backwards folds every subtree before its parent is taken.
        for slot in (0..nodes.len()).rev() {
            let children: Vec<DocNode> = children_lists[slot]
                .iter()
                .filter_map(|&child| nodes[child].take())
                .collect();
            if let Some(node) = nodes[slot].as_mut() {
                node.children = children;
            }
        }

        nodes[0].take()
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
