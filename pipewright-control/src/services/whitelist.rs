//! Module whitelist service.

use std::sync::Arc;

use anyhow::{Context, Result};
use pipewright_core::model::{ModuleWhitelistEntry, PipelineConfig};
use pipewright_core::validation::ValidationResult;

use crate::store::{self, StoreClient, META_IMPLEMENTATION_ID, TAG_MODULE};

/// Manages the per-cluster module whitelist: the set of module
/// implementations a cluster's pipelines are permitted to reference.
#[derive(Clone)]
pub struct ModuleWhitelistService {
    store: Arc<dyn StoreClient>,
    prefix: String,
}

impl ModuleWhitelistService {
    /// Create a new instance over the given KV prefix.
    pub fn new(store: Arc<dyn StoreClient>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Whitelist a module implementation for a cluster.
    ///
    /// The implementation must have at least one registered instance in the
    /// catalog; whitelisting something that has never registered is refused.
    /// Re-whitelisting an already-present implementation overwrites its
    /// entry.
    #[tracing::instrument(level = "debug", skip(self, entry), fields(implementation_id = %entry.implementation_id))]
    pub async fn enable_module(&self, cluster: &str, entry: ModuleWhitelistEntry) -> Result<ValidationResult> {
        let metadata_key = store::cluster_metadata_key(&self.prefix, cluster);
        if self.store.kv_get(&metadata_key).await?.is_none() {
            return Ok(ValidationResult::failure(format!("Cluster '{}' does not exist", cluster)));
        }

        let services = self.store.list_services(TAG_MODULE).await?;
        let registered = services
            .iter()
            .any(|service| service.meta.get(META_IMPLEMENTATION_ID).map(String::as_str) == Some(entry.implementation_id.as_str()));
        if !registered {
            return Ok(ValidationResult::failure(format!(
                "module implementation '{}' has no registered instances and can not be whitelisted",
                entry.implementation_id
            )));
        }

        let key = store::cluster_whitelist_key(&self.prefix, cluster, &entry.implementation_id);
        let value = serde_json::to_vec(&entry).context("error serializing whitelist entry")?;
        self.store.kv_put(&key, value).await?;
        tracing::info!(%cluster, implementation_id = %entry.implementation_id, "module whitelisted for cluster");
        Ok(ValidationResult::success())
    }

    /// Remove a module implementation from a cluster's whitelist.
    ///
    /// Refused while any pipeline step in the cluster still references the
    /// implementation. Removing an implementation that is not whitelisted is
    /// a successful no-op.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn disable_module(&self, cluster: &str, implementation_id: &str) -> Result<ValidationResult> {
        let key = store::cluster_whitelist_key(&self.prefix, cluster, implementation_id);
        let Some(pair) = self.store.kv_get(&key).await? else {
            // Not whitelisted: success-as-no-op, by design.
            return Ok(ValidationResult::success());
        };
        let entry: ModuleWhitelistEntry = serde_json::from_slice(&pair.value).context("error deserializing whitelist entry")?;

        for pipeline in self.cluster_pipelines(cluster).await? {
            for (step_id, step) in &pipeline.steps {
                let Some(service) = step.processor_info.as_ref().and_then(|processor| processor.grpc_service_name.as_deref()) else {
                    continue;
                };
                if service == entry.implementation_name || service == implementation_id {
                    return Ok(ValidationResult::failure(format!(
                        "module '{}' is currently used by step '{}' of pipeline '{}' in cluster '{}'",
                        implementation_id, step_id, pipeline.name, cluster
                    )));
                }
            }
        }

        self.store.kv_delete(&key).await?;
        tracing::info!(%cluster, %implementation_id, "module removed from cluster whitelist");
        Ok(ValidationResult::success())
    }

    /// List the whitelist entries of a cluster.
    pub async fn list_enabled(&self, cluster: &str) -> Result<Vec<ModuleWhitelistEntry>> {
        let list = self.store.kv_list(&store::cluster_whitelist_prefix(&self.prefix, cluster), None).await?;
        let mut entries = Vec::new();
        for pair in &list.pairs {
            let entry = serde_json::from_slice(&pair.value).context("error deserializing whitelist entry")?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Fetch all pipeline configs bound into the given cluster.
    async fn cluster_pipelines(&self, cluster: &str) -> Result<Vec<PipelineConfig>> {
        let list = self.store.kv_list(&store::cluster_pipelines_prefix(&self.prefix, cluster), None).await?;
        let mut pipelines = Vec::new();
        for pair in list.pairs.iter().filter(|pair| pair.key.ends_with("/config")) {
            let pipeline = serde_json::from_slice(&pair.value).context("error deserializing pipeline config")?;
            pipelines.push(pipeline);
        }
        Ok(pipelines)
    }
}
