//! Cursor-based deep pagination over a collection.
//!
//! Solr's `cursorMark` protocol: every request carries the token from the
//! previous response (or `*` for the first page) together with a stable sort
//! on the unique key. The cluster never repeats or skips documents under a
//! stable snapshot, which is what makes the export lossless for any page
//! size. Tokens are opaque; never treat them as offsets.

use futures::stream::{self, Stream};
use serde_json::Value;

use crate::client::SolrClient;
use crate::error::{Error, Result};
use crate::tree::Document;

/// First-page cursor token defined by Solr.
const INITIAL_CURSOR: &str = "*";

/// One page of raw documents plus the continuation token.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    /// Documents in cluster sort order (unique key ascending).
    pub docs: Vec<Document>,
    /// Token for the next page; `None` when this page is the last.
    pub next_cursor: Option<String>,
}

/// Drives `cursorMark` pagination over one collection.
pub struct CursorPaginator {
    client: SolrClient,
    collection: String,
    query: String,
    id_field: String,
    page_size: usize,
    nested: bool,
}

impl CursorPaginator {
    /// Creates a paginator.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `page_size` is zero.
    pub fn new(
        client: SolrClient,
        collection: impl Into<String>,
        query: impl Into<String>,
        id_field: impl Into<String>,
        page_size: usize,
        nested: bool,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::Config("page size must be greater than 0".to_string()));
        }
        Ok(Self {
            client,
            collection: collection.into(),
            query: query.into(),
            id_field: id_field.into(),
            page_size,
            nested,
        })
    }

    fn select_path(&self) -> String {
        format!("/solr/{}/select", self.collection)
    }

    /// Total hits for the query, used to size progress reporting.
    pub async fn count(&self) -> Result<u64> {
        let params = [
            ("q", self.query.clone()),
            ("rows", "0".to_string()),
            ("wt", "json".to_string()),
        ];
        let body = self.client.get_json(&self.select_path(), &params).await?;
        body["response"]["numFound"]
            .as_u64()
            .ok_or_else(|| Error::transport("select response missing response.numFound"))
    }

    /// Fetches one page. `cursor = None` requests the first page.
    ///
    /// One HTTP request, no client-side sorting, no retries here.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if the collection does not exist, `Error::Transport`
    /// on network or decode failures.
    pub async fn fetch_next(&self, cursor: Option<String>) -> Result<DocumentPage> {
        let mark = cursor.clone().unwrap_or_else(|| INITIAL_CURSOR.to_string());
        let mut params = vec![
            ("q", self.query.clone()),
            ("q.op", "OR".to_string()),
            ("sort", format!("{} asc", self.id_field)),
            ("rows", self.page_size.to_string()),
            ("cursorMark", mark.clone()),
            ("wt", "json".to_string()),
        ];
        if self.nested {
            // Request the flattened child stream with parent linkage intact.
            params.push(("fl", "*,_nest_parent_".to_string()));
        }

        let body = self.client.get_json(&self.select_path(), &params).await?;
        let docs = parse_docs(&body)?;

        let next_mark = body["nextCursorMark"].as_str();
        let exhausted = docs.len() < self.page_size
            || next_mark.is_none_or(|next| next == mark);

        Ok(DocumentPage {
            docs,
            next_cursor: if exhausted {
                None
            } else {
                next_mark.map(str::to_string)
            },
        })
    }

    /// Adapts the paginator into a lazy stream of pages.
    ///
    /// Fetches are strictly sequential: each request needs the token from the
    /// previous response, so there is nothing to pipeline at this layer.
    pub fn into_stream(self) -> impl Stream<Item = Result<DocumentPage>> {
        stream::try_unfold((self, None::<String>, false), |(this, cursor, done)| async move {
            if done {
                return Ok(None);
            }
            let page = this.fetch_next(cursor).await?;
            let next = page.next_cursor.clone();
            let finished = next.is_none();
            Ok(Some((page, (this, next, finished))))
        })
    }
}

fn parse_docs(body: &Value) -> Result<Vec<Document>> {
    let docs = body["response"]["docs"]
        .as_array()
        .ok_or_else(|| Error::transport("select response missing response.docs"))?;

    docs.iter()
        .map(|doc| match doc {
            Value::Object(map) => Ok(map.clone()),
            other => Err(Error::transport(format!(
                "expected document object, got {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
#[path = "paginator_tests.rs"]
mod tests;
