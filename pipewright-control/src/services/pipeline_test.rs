use std::sync::Arc;

use anyhow::Result;
use maplit::btreemap;
use pipewright_core::model::*;
use pipewright_core::validation::{ValidationEngine, ValidationMode};

use super::*;
use crate::store::{MemoryStore, ServiceRegistration, StoreClient, TAG_GRPC, TAG_MODULE};

struct Harness {
    pipelines: PipelineConfigService,
    clusters: ClusterService,
    whitelist: ModuleWhitelistService,
    store: Arc<MemoryStore>,
}

/// Set up a cluster `default` with the chunker & embedder implementations
/// registered and whitelisted.
async fn harness() -> Result<Harness> {
    let store = Arc::new(MemoryStore::new());
    let clusters = ClusterService::new(store.clone(), "pipeline");
    let whitelist = ModuleWhitelistService::new(store.clone(), "pipeline");
    let pipelines = PipelineConfigService::new(store.clone(), "pipeline", Arc::new(ValidationEngine::new()), whitelist.clone());

    assert!(clusters.create_cluster("default").await?.valid);
    for implementation in ["chunker-module", "embedder-module"] {
        store
            .register_service(ServiceRegistration {
                id: format!("{}-1", implementation),
                name: format!("module-{}", implementation),
                tags: vec![TAG_MODULE.into(), TAG_GRPC.into()],
                address: "10.0.0.1".into(),
                port: 9090,
                meta: btreemap! { "implementationId".into() => format!("{}-impl", implementation) },
                check: None,
            })
            .await?;
        let mut entry = ModuleWhitelistEntry::new(format!("{}-impl", implementation), implementation);
        entry.custom_config = serde_json::json!({});
        assert!(whitelist.enable_module("default", entry).await?.valid, "failed to whitelist {}", implementation);
    }
    Ok(Harness {
        pipelines,
        clusters,
        whitelist,
        store,
    })
}

/// A two-step pipeline wired chunker -> embedder, valid in production.
fn search_pipeline() -> PipelineConfig {
    let mut chunker = PipelineStepConfig::new("chunker", StepType::InitialPipeline);
    chunker.description = Some("Splits documents into chunks.".into());
    chunker.processor_info = Some(ProcessorInfo::grpc("chunker-module"));
    chunker.outputs.insert("default".into(), OutputTarget::kafka("embedder", "search.embedder.input"));

    let mut embedder = PipelineStepConfig::new("embedder", StepType::Sink);
    embedder.description = Some("Embeds chunks and writes them out.".into());
    embedder.processor_info = Some(ProcessorInfo::grpc("embedder-module"));
    embedder.kafka_inputs.push(KafkaInputDefinition {
        listen_topics: vec!["search.embedder.input".into()],
        consumer_group_id: Some("search.consumer-group".into()),
        kafka_consumer_properties: Default::default(),
    });

    let mut config = PipelineConfig {
        name: "search".into(),
        steps: Default::default(),
    };
    config.steps.insert("chunker".into(), chunker);
    config.steps.insert("embedder".into(), embedder);
    config
}

#[tokio::test]
async fn valid_pipeline_commits_binding_and_definition() -> Result<()> {
    let harness = harness().await?;
    let result = harness.pipelines.create_pipeline("default", &search_pipeline(), ValidationMode::Production).await?;
    assert!(result.valid, "unexpected errors: {:?}", result.errors);

    let fetched = harness.pipelines.get_pipeline("default", "search").await?.expect("missing pipeline");
    assert_eq!(fetched, search_pipeline());
    assert!(
        harness.store.kv_get("pipeline/pipelines/definitions/search").await?.is_some(),
        "definition record missing"
    );
    assert_eq!(harness.pipelines.list_pipelines("default").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_pipeline_never_writes() -> Result<()> {
    let harness = harness().await?;
    let mut config = search_pipeline();
    // A sink with an output fails validation in every mode.
    config
        .steps
        .get_mut("embedder")
        .expect("missing step")
        .outputs
        .insert("default".into(), OutputTarget::kafka("chunker", "search.chunker.input"));

    let result = harness.pipelines.create_pipeline("default", &config, ValidationMode::Design).await?;
    assert!(!result.valid);
    assert!(result.errors.iter().any(|error| error.contains("SINK steps should not have outputs")));
    assert!(harness.pipelines.get_pipeline("default", "search").await?.is_none(), "failed validation still wrote state");
    assert!(harness.store.kv_get("pipeline/pipelines/definitions/search").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn unwhitelisted_module_blocks_commit() -> Result<()> {
    let harness = harness().await?;
    let mut config = search_pipeline();
    config.steps.get_mut("chunker").expect("missing step").processor_info = Some(ProcessorInfo::grpc("rogue-module"));

    let result = harness.pipelines.create_pipeline("default", &config, ValidationMode::Production).await?;
    assert!(!result.valid);
    assert!(
        result.errors.iter().any(|error| error.contains("not whitelisted for cluster 'default'")),
        "unexpected errors: {:?}",
        result.errors
    );
    assert!(harness.pipelines.get_pipeline("default", "search").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn duplicate_pipeline_name_is_refused() -> Result<()> {
    let harness = harness().await?;
    assert!(harness.pipelines.create_pipeline("default", &search_pipeline(), ValidationMode::Production).await?.valid);
    let result = harness.pipelines.create_pipeline("default", &search_pipeline(), ValidationMode::Production).await?;
    assert!(!result.valid);
    assert!(result.errors.contains(&"Pipeline 'search' already exists in cluster 'default'".to_string()));
    Ok(())
}

#[tokio::test]
async fn update_requires_existing_binding_and_overwrites() -> Result<()> {
    let harness = harness().await?;
    let result = harness.pipelines.update_pipeline("default", &search_pipeline(), ValidationMode::Production).await?;
    assert!(!result.valid);
    assert!(result.errors[0].contains("does not exist"));

    assert!(harness.pipelines.create_pipeline("default", &search_pipeline(), ValidationMode::Production).await?.valid);
    let mut config = search_pipeline();
    config.steps.get_mut("chunker").expect("missing step").description = Some("Updated.".into());
    assert!(harness.pipelines.update_pipeline("default", &config, ValidationMode::Production).await?.valid);
    let fetched = harness.pipelines.get_pipeline("default", "search").await?.expect("missing pipeline");
    assert_eq!(fetched.steps["chunker"].description.as_deref(), Some("Updated."));
    Ok(())
}

#[tokio::test]
async fn empty_pipeline_commits_in_design_mode_only() -> Result<()> {
    let harness = harness().await?;
    let config = PipelineConfig {
        name: "draft".into(),
        steps: Default::default(),
    };

    let result = harness.pipelines.create_pipeline("default", &config, ValidationMode::Production).await?;
    assert!(!result.valid, "an empty pipeline must not commit in production mode");

    let result = harness.pipelines.create_pipeline("default", &config, ValidationMode::Design).await?;
    assert!(result.valid, "unexpected errors: {:?}", result.errors);
    assert!(result.warnings.iter().any(|warning| warning.contains("no steps")));
    assert!(harness.pipelines.get_pipeline("default", "draft").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn delete_pipeline_is_idempotent() -> Result<()> {
    let harness = harness().await?;
    assert!(harness.pipelines.create_pipeline("default", &search_pipeline(), ValidationMode::Production).await?.valid);
    harness.pipelines.delete_pipeline("default", "search").await?;
    harness.pipelines.delete_pipeline("default", "search").await?;
    assert!(harness.pipelines.get_pipeline("default", "search").await?.is_none());
    assert!(harness.store.kv_get("pipeline/pipelines/definitions/search").await?.is_none());

    // The cluster itself is untouched.
    assert!(harness.clusters.get_cluster("default").await?.is_some());
    assert_eq!(harness.whitelist.list_enabled("default").await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn create_in_unknown_cluster_is_refused() -> Result<()> {
    let harness = harness().await?;
    let result = harness.pipelines.create_pipeline("missing", &PipelineConfig::default(), ValidationMode::Design).await?;
    assert!(!result.valid);
    assert!(
        result.errors.iter().any(|error| error.contains("Cluster 'missing' does not exist")),
        "unexpected errors: {:?}",
        result.errors
    );
    Ok(())
}
