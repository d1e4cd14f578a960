//! Collection administration: cluster status lookup, create, delete.

use serde_json::Value;
use tracing::info;

use crate::client::SolrClient;
use crate::error::{Error, Result};

const COLLECTIONS_PATH: &str = "/solr/admin/collections";

/// Layout of an existing collection, enough to recreate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Config set the collection references.
    pub config_name: String,
    /// Shard count.
    pub num_shards: u32,
    /// Replication factor.
    pub replication_factor: u32,
}

/// Collections API wrapper.
pub struct CollectionAdmin {
    client: SolrClient,
}

impl CollectionAdmin {
    /// Creates the admin handle.
    pub fn new(client: SolrClient) -> Self {
        Self { client }
    }

    /// Looks up one collection's layout from CLUSTERSTATUS.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if the collection does not exist.
    pub async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let params = [
            ("action", "CLUSTERSTATUS".to_string()),
            ("wt", "json".to_string()),
        ];
        let body = self.client.get_json(COLLECTIONS_PATH, &params).await?;

        let meta = &body["cluster"]["collections"][name];
        if meta.is_null() {
            return Err(Error::NotFound(format!("collection '{name}'")));
        }

        let config_name = meta["configName"]
            .as_str()
            .ok_or_else(|| Error::transport("cluster status missing configName"))?
            .to_string();
        let num_shards = meta["shards"]
            .as_object()
            .map_or(1, |shards| shards.len().max(1)) as u32;
        let replication_factor = parse_count(&meta["replicationFactor"]).unwrap_or(1);

        Ok(CollectionInfo {
            config_name,
            num_shards,
            replication_factor,
        })
    }

    /// Creates a collection referencing `config_name`.
    pub async fn create_collection(&self, name: &str, info: &CollectionInfo) -> Result<()> {
        let params = [
            ("action", "CREATE".to_string()),
            ("name", name.to_string()),
            ("collection.configName", info.config_name.clone()),
            ("numShards", info.num_shards.to_string()),
            ("replicationFactor", info.replication_factor.to_string()),
            ("wt", "json".to_string()),
        ];
        self.client.get_json(COLLECTIONS_PATH, &params).await?;
        info!(collection = name, config = %info.config_name, "collection created");
        Ok(())
    }

    /// Deletes a collection.
    pub async fn remove_collection(&self, name: &str) -> Result<()> {
        let params = [
            ("action", "DELETE".to_string()),
            ("name", name.to_string()),
            ("wt", "json".to_string()),
        ];
        self.client.get_json(COLLECTIONS_PATH, &params).await?;
        info!(collection = name, "collection removed");
        Ok(())
    }
}

/// CLUSTERSTATUS reports counts as strings ("1"); tolerate numbers too.
fn parse_count(value: &Value) -> Option<u32> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        _ => None,
    }
}
