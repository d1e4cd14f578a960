//! HTTP transport to the Solr cluster.
//!
//! A thin authenticated wrapper around `reqwest` with timeout policy and
//! status-code mapping. Retry policy deliberately lives with the callers
//! (see `retry`); this layer reports each request outcome exactly once.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum response body excerpt carried in error messages.
const BODY_EXCERPT_LEN: usize = 200;

/// Connection settings for [`SolrClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Solr node, e.g. `http://localhost:8983`.
    pub base_url: String,
    /// Optional username for basic auth.
    pub username: Option<String>,
    /// Optional password for basic auth.
    pub password: Option<String>,
}

/// Authenticated HTTP client for the Solr API.
///
/// Cheap to clone; the underlying connection pool is shared and safe for
/// concurrent use, which is what the import worker pool relies on.
#[derive(Debug, Clone)]
pub struct SolrClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl SolrClient {
    /// Creates a client with connect and request timeouts applied.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the base URL has an unsupported scheme.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "invalid base URL '{}': expected http or https",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            username: config.username,
            password: config.password,
        })
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds a request with auth applied.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(user) = &self.username {
            req = req.basic_auth(user, self.password.as_deref());
        }
        req
    }

    /// GET a JSON body.
    pub async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        debug!(path, "GET");
        let resp = self
            .request(Method::GET, path)
            .query(params)
            .send()
            .await
            .map_err(request_error)?;
        decode_json(check_status(resp, path).await?).await
    }

    /// POST a JSON body, returning the decoded JSON response.
    pub async fn post_json(
        &self,
        path: &str,
        params: &[(&str, String)],
        body: &Value,
    ) -> Result<Value> {
        debug!(path, "POST");
        let resp = self
            .request(Method::POST, path)
            .query(params)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;
        decode_json(check_status(resp, path).await?).await
    }

    /// POST raw zip bytes (config-set upload).
    pub async fn upload_zip(
        &self,
        path: &str,
        params: &[(&str, String)],
        bytes: Vec<u8>,
    ) -> Result<Value> {
        debug!(path, size = bytes.len(), "POST zip");
        let resp = self
            .request(Method::POST, path)
            .query(params)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(request_error)?;
        decode_json(check_status(resp, path).await?).await
    }

    /// DELETE, returning the decoded JSON response.
    pub async fn delete(&self, path: &str) -> Result<Value> {
        debug!(path, "DELETE");
        let resp = self
            .request(Method::DELETE, path)
            .send()
            .await
            .map_err(request_error)?;
        decode_json(check_status(resp, path).await?).await
    }
}

/// Maps a send-level failure (connect, timeout, TLS) to a transport error.
fn request_error(e: reqwest::Error) -> Error {
    Error::Transport {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

/// Maps non-2xx statuses onto the error taxonomy.
async fn check_status(resp: Response, path: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();

    match status.as_u16() {
        404 => Err(Error::NotFound(format!("{path}: {excerpt}"))),
        401 | 403 => Err(Error::Auth(excerpt)),
        code => Err(Error::Transport {
            status: Some(code),
            message: excerpt,
        }),
    }
}

async fn decode_json(resp: Response) -> Result<Value> {
    resp.json()
        .await
        .map_err(|e| Error::transport(format!("failed to decode JSON response: {e}")))
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
