//! Config-set transfer: ZooKeeper tree export, zip upload, removal.
//!
//! Far simpler than the document pipelines: no pagination, no
//! reconstruction, one config set moves as a unit.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::client::SolrClient;
use crate::error::{Error, Result};

/// Moves config sets between the cluster and the local filesystem.
pub struct ConfigTransfer {
    client: SolrClient,
}

impl ConfigTransfer {
    /// Creates the transfer handle.
    pub fn new(client: SolrClient) -> Self {
        Self { client }
    }

    /// Downloads a config set into `dest/<name>/`, preserving the directory
    /// layout. Returns the number of files written.
    pub async fn export_config(&self, name: &str, dest: &Path) -> Result<u64> {
        let params = [
            ("detail", "true".to_string()),
            ("path", format!("/configs/{name}")),
            ("wt", "json".to_string()),
        ];
        let body = self.client.get_json("/solr/admin/zookeeper", &params).await?;

        let children = body["tree"][0]["children"]
            .as_array()
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("config set '{name}'")))?;

        let root = dest.join(name);
        std::fs::create_dir_all(&root)?;
        let written = self.walk_tree(children, root.clone()).await?;

        info!(config = name, files = written, dest = %root.display(), "config export complete");
        Ok(written)
    }

    /// Recursive ZooKeeper tree walk: nodes with children are folders,
    /// leaves are files whose content lives behind their `a_attr.href`.
    fn walk_tree(&self, nodes: Vec<Value>, folder: PathBuf) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let mut written = 0u64;
            for node in nodes {
                let Some(text) = node["text"].as_str().map(str::to_string) else {
                    continue;
                };

                if let Some(children) = node["children"].as_array().cloned() {
                    let subfolder = folder.join(&text);
                    std::fs::create_dir_all(&subfolder)?;
                    written += self.walk_tree(children, subfolder).await?;
                } else {
                    let href = node["a_attr"]["href"].as_str().ok_or_else(|| {
                        Error::transport(format!("zookeeper node '{text}' missing a_attr.href"))
                    })?;
                    let content = self.fetch_file(href).await?;
                    std::fs::write(folder.join(&text), content)?;
                    debug!(file = %text, "config file written");
                    written += 1;
                }
            }
            Ok(written)
        })
    }

    async fn fetch_file(&self, href: &str) -> Result<String> {
        let body = self.client.get_json(&format!("/solr/{href}"), &[]).await?;
        body["znode"]["data"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::transport("zookeeper file response missing znode.data"))
    }

    /// Uploads a local directory as a config set.
    ///
    /// With `overwrite`, refuses when collections still reference the config
    /// (`Error::ConfigInUse`) and adds the cleanup directive; without it,
    /// refuses to clobber an existing config of the same name.
    pub async fn import_config(&self, dir: &Path, name: Option<&str>, overwrite: bool) -> Result<()> {
        let name = match name {
            Some(name) => name.to_string(),
            None => dir
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "cannot derive config name from path {}",
                        dir.display()
                    ))
                })?,
        };

        let exists = self.list_configs().await?.contains(&name);
        if exists && !overwrite {
            return Err(Error::Config(format!(
                "config set '{name}' already exists; pass --overwrite to replace it"
            )));
        }
        if exists && overwrite {
            let using = self.collections_using(&name).await?;
            if !using.is_empty() {
                return Err(Error::ConfigInUse {
                    name,
                    collections: using,
                });
            }
        }

        let bytes = zip_dir(dir)?;
        let flag = overwrite.to_string();
        let params = [
            ("action", "UPLOAD".to_string()),
            ("name", name.clone()),
            ("overwrite", flag.clone()),
            ("cleanup", flag),
        ];
        self.client
            .upload_zip("/solr/admin/configs", &params, bytes)
            .await?;

        info!(config = %name, overwrite, "config upload complete");
        Ok(())
    }

    /// Deletes a config set by name.
    pub async fn remove_config(&self, name: &str) -> Result<()> {
        let using = self.collections_using(name).await?;
        if !using.is_empty() {
            return Err(Error::ConfigInUse {
                name: name.to_string(),
                collections: using,
            });
        }

        self.client
            .delete(&format!("/api/cluster/configs/{name}?omitHeader=true"))
            .await?;
        info!(config = name, "config removed");
        Ok(())
    }

    /// Names of all config sets on the cluster.
    pub async fn list_configs(&self) -> Result<Vec<String>> {
        let params = [("action", "LIST".to_string()), ("wt", "json".to_string())];
        let body = self.client.get_json("/solr/admin/configs", &params).await?;
        let sets = body["configSets"]
            .as_array()
            .ok_or_else(|| Error::transport("config list response missing configSets"))?;
        Ok(sets
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    /// Collections whose `configName` references the given config set.
    pub async fn collections_using(&self, name: &str) -> Result<Vec<String>> {
        let params = [
            ("action", "CLUSTERSTATUS".to_string()),
            ("wt", "json".to_string()),
        ];
        let body = self
            .client
            .get_json("/solr/admin/collections", &params)
            .await?;

        let collections = body["cluster"]["collections"]
            .as_object()
            .ok_or_else(|| Error::transport("cluster status missing cluster.collections"))?;

        let mut using: Vec<String> = collections
            .iter()
            .filter(|(_, meta)| meta["configName"].as_str() == Some(name))
            .map(|(coll, _)| coll.clone())
            .collect();
        using.sort();
        Ok(using)
    }
}

/// Zips a directory tree deterministically: entries sorted by relative path,
/// forward slashes, fixed timestamps.
fn zip_dir(dir: &Path) -> Result<Vec<u8>> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for rel in &files {
        let entry_name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        writer
            .start_file(entry_name, options)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let content = std::fs::read(dir.join(rel))?;
        writer.write_all(&content)?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    Ok(cursor.into_inner())
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(base)
                .map_err(|e| Error::Config(e.to_string()))?;
            out.push(rel.to_path_buf());
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "configset_tests.rs"]
mod tests;
