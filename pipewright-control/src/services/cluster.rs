//! Cluster service.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use pipewright_core::model::Cluster;
use pipewright_core::validation::ValidationResult;

use crate::store::{self, StoreClient};

/// CRUD over cluster records.
#[derive(Clone)]
pub struct ClusterService {
    store: Arc<dyn StoreClient>,
    prefix: String,
}

impl ClusterService {
    /// Create a new instance over the given KV prefix.
    pub fn new(store: Arc<dyn StoreClient>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Create a new cluster.
    ///
    /// Concurrent creates of the same name race through the store's CAS: at
    /// most one caller observes success, the rest an "already exists"
    /// failure.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn create_cluster(&self, name: &str) -> Result<ValidationResult> {
        if name.trim().is_empty() {
            return Ok(ValidationResult::failure("cluster name must not be empty"));
        }
        let cluster = Cluster::new(name);
        let value = serde_json::to_vec(&cluster).context("error serializing cluster record")?;
        let key = store::cluster_metadata_key(&self.prefix, name);
        let created = self.store.kv_put_cas(&key, value, 0).await?;
        if !created {
            return Ok(ValidationResult::failure(format!("Cluster '{}' already exists", name)));
        }
        tracing::info!(%name, "cluster created");
        Ok(ValidationResult::success())
    }

    /// Fetch a cluster record, `None` when absent.
    pub async fn get_cluster(&self, name: &str) -> Result<Option<Cluster>> {
        let key = store::cluster_metadata_key(&self.prefix, name);
        let Some(pair) = self.store.kv_get(&key).await? else { return Ok(None) };
        let cluster = serde_json::from_slice(&pair.value).context("error deserializing cluster record")?;
        Ok(Some(cluster))
    }

    /// List all known clusters.
    pub async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        let list = self.store.kv_list(&store::clusters_prefix(&self.prefix), None).await?;
        let mut clusters = Vec::new();
        for pair in list.pairs.iter().filter(|pair| pair.key.ends_with("/metadata")) {
            let cluster = serde_json::from_slice(&pair.value).context("error deserializing cluster record")?;
            clusters.push(cluster);
        }
        Ok(clusters)
    }

    /// Update the mutable parts of a cluster: its metadata and default
    /// pipeline name. Everything else is immutable after creation.
    ///
    /// Concurrent updates are last-write-wins by design; there is no
    /// optimistic-lock rejection here.
    #[tracing::instrument(level = "debug", skip(self, metadata))]
    pub async fn update_cluster(
        &self, name: &str, default_pipeline_name: Option<String>, metadata: BTreeMap<String, String>,
    ) -> Result<ValidationResult> {
        let Some(mut cluster) = self.get_cluster(name).await? else {
            return Ok(ValidationResult::failure(format!("Cluster '{}' does not exist", name)));
        };
        cluster.default_pipeline_name = default_pipeline_name;
        cluster.metadata = metadata;
        let value = serde_json::to_vec(&cluster).context("error serializing cluster record")?;
        let key = store::cluster_metadata_key(&self.prefix, name);
        self.store.kv_put(&key, value).await?;
        Ok(ValidationResult::success())
    }

    /// Delete a cluster record. Deleting an absent cluster is a no-op.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_cluster(&self, name: &str) -> Result<()> {
        let key = store::cluster_metadata_key(&self.prefix, name);
        self.store.kv_delete(&key).await
    }
}
