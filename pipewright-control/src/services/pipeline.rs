//! Pipeline configuration service.

use std::sync::Arc;

use anyhow::{Context, Result};
use pipewright_core::model::PipelineConfig;
use pipewright_core::validation::{ValidationEngine, ValidationMode, ValidationResult};

use crate::services::ModuleWhitelistService;
use crate::store::{self, StoreClient};

/// CRUD over pipeline definitions and their cluster bindings.
///
/// Every write validates first and only commits a fully valid config: the
/// validation engine judges the config itself, and the cluster's whitelist
/// gates which modules its steps may reference.
#[derive(Clone)]
pub struct PipelineConfigService {
    store: Arc<dyn StoreClient>,
    prefix: String,
    engine: Arc<ValidationEngine>,
    whitelist: ModuleWhitelistService,
}

impl PipelineConfigService {
    /// Create a new instance over the given KV prefix.
    pub fn new(
        store: Arc<dyn StoreClient>, prefix: impl Into<String>, engine: Arc<ValidationEngine>, whitelist: ModuleWhitelistService,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            engine,
            whitelist,
        }
    }

    /// Validate a config without committing anything.
    pub fn validate(&self, config: &PipelineConfig, mode: ValidationMode) -> ValidationResult {
        self.engine.validate(config, mode)
    }

    /// Create a pipeline in a cluster.
    ///
    /// Validate-then-commit: nothing is written unless the config passes the
    /// engine under `mode`, every referenced module is whitelisted in the
    /// cluster, and the name is free. Concurrent creates of the same name
    /// resolve through the store's CAS to a single winner.
    #[tracing::instrument(level = "debug", skip(self, config), fields(pipeline = %config.name))]
    pub async fn create_pipeline(&self, cluster: &str, config: &PipelineConfig, mode: ValidationMode) -> Result<ValidationResult> {
        let result = self.validate_for_cluster(cluster, config, mode).await?;
        if !result.valid {
            return Ok(result);
        }
        if self.store.kv_get(&store::cluster_metadata_key(&self.prefix, cluster)).await?.is_none() {
            return Ok(ValidationResult::failure(format!("Cluster '{}' does not exist", cluster)));
        }

        let value = serde_json::to_vec(config).context("error serializing pipeline config")?;
        let binding_key = store::cluster_pipeline_key(&self.prefix, cluster, &config.name);
        let created = self.store.kv_put_cas(&binding_key, value.clone(), 0).await?;
        if !created {
            return Ok(ValidationResult::from_parts(
                vec![format!("Pipeline '{}' already exists in cluster '{}'", config.name, cluster)],
                result.warnings,
            ));
        }
        self.store.kv_put(&store::pipeline_definition_key(&self.prefix, &config.name), value).await?;
        tracing::info!(%cluster, pipeline = %config.name, "pipeline created");
        Ok(result)
    }

    /// Update an existing pipeline in a cluster.
    ///
    /// Validate-then-commit as for create. Concurrent updates are
    /// last-write-wins by design; there is no optimistic-lock rejection.
    #[tracing::instrument(level = "debug", skip(self, config), fields(pipeline = %config.name))]
    pub async fn update_pipeline(&self, cluster: &str, config: &PipelineConfig, mode: ValidationMode) -> Result<ValidationResult> {
        let result = self.validate_for_cluster(cluster, config, mode).await?;
        if !result.valid {
            return Ok(result);
        }
        let binding_key = store::cluster_pipeline_key(&self.prefix, cluster, &config.name);
        if self.store.kv_get(&binding_key).await?.is_none() {
            return Ok(ValidationResult::failure(format!(
                "Pipeline '{}' does not exist in cluster '{}'",
                config.name, cluster
            )));
        }

        let value = serde_json::to_vec(config).context("error serializing pipeline config")?;
        self.store.kv_put(&binding_key, value.clone()).await?;
        self.store.kv_put(&store::pipeline_definition_key(&self.prefix, &config.name), value).await?;
        tracing::info!(%cluster, pipeline = %config.name, "pipeline updated");
        Ok(result)
    }

    /// Fetch a pipeline bound in a cluster, `None` when absent.
    pub async fn get_pipeline(&self, cluster: &str, name: &str) -> Result<Option<PipelineConfig>> {
        let key = store::cluster_pipeline_key(&self.prefix, cluster, name);
        let Some(pair) = self.store.kv_get(&key).await? else { return Ok(None) };
        let config = serde_json::from_slice(&pair.value).context("error deserializing pipeline config")?;
        Ok(Some(config))
    }

    /// List all pipelines bound in a cluster.
    pub async fn list_pipelines(&self, cluster: &str) -> Result<Vec<PipelineConfig>> {
        let list = self.store.kv_list(&store::cluster_pipelines_prefix(&self.prefix, cluster), None).await?;
        let mut pipelines = Vec::new();
        for pair in list.pairs.iter().filter(|pair| pair.key.ends_with("/config")) {
            let config = serde_json::from_slice(&pair.value).context("error deserializing pipeline config")?;
            pipelines.push(config);
        }
        Ok(pipelines)
    }

    /// Delete a pipeline binding and its definition. Idempotent.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_pipeline(&self, cluster: &str, name: &str) -> Result<()> {
        self.store.kv_delete(&store::cluster_pipeline_key(&self.prefix, cluster, name)).await?;
        self.store.kv_delete(&store::pipeline_definition_key(&self.prefix, name)).await?;
        Ok(())
    }

    /// Run the validation engine and the cluster whitelist gate, composing
    /// their diagnostics into one result.
    async fn validate_for_cluster(&self, cluster: &str, config: &PipelineConfig, mode: ValidationMode) -> Result<ValidationResult> {
        let result = self.engine.validate(config, mode);
        let mut errors = result.errors;
        let warnings = result.warnings;

        let whitelisted = self.whitelist.list_enabled(cluster).await?;
        for (step_id, step) in &config.steps {
            let Some(service) = step.processor_info.as_ref().and_then(|processor| processor.grpc_service_name.as_deref()) else {
                continue;
            };
            let permitted = whitelisted
                .iter()
                .any(|entry| entry.implementation_name == service || entry.implementation_id == service);
            if !permitted {
                errors.push(format!(
                    "step '{}' references module '{}' which is not whitelisted for cluster '{}'",
                    step_id, service, cluster
                ));
            }
        }
        Ok(ValidationResult::from_parts(errors, warnings))
    }
}
