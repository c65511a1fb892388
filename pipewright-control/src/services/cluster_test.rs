use std::sync::Arc;

use anyhow::Result;
use maplit::btreemap;

use super::*;
use crate::store::MemoryStore;

fn service() -> ClusterService {
    ClusterService::new(Arc::new(MemoryStore::new()), "pipeline")
}

#[tokio::test]
async fn create_cluster_then_duplicate() -> Result<()> {
    let clusters = service();

    let result = clusters.create_cluster("default").await?;
    assert!(result.valid, "unexpected errors: {:?}", result.errors);

    let result = clusters.create_cluster("default").await?;
    assert!(!result.valid);
    assert!(
        result.errors.contains(&"Cluster 'default' already exists".to_string()),
        "unexpected errors: {:?}",
        result.errors
    );
    Ok(())
}

#[tokio::test]
async fn empty_cluster_name_is_refused() -> Result<()> {
    let clusters = service();
    let result = clusters.create_cluster("  ").await?;
    assert!(!result.valid);
    assert!(result.errors[0].contains("must not be empty"));
    Ok(())
}

#[tokio::test]
async fn get_list_update_delete_lifecycle() -> Result<()> {
    let clusters = service();
    assert!(clusters.create_cluster("default").await?.valid);
    assert!(clusters.create_cluster("staging").await?.valid);

    let all = clusters.list_clusters().await?;
    assert_eq!(all.len(), 2);

    let fetched = clusters.get_cluster("default").await?.expect("missing cluster");
    assert_eq!(fetched.name, "default");
    assert!(fetched.default_pipeline_name.is_none());

    let result = clusters
        .update_cluster("default", Some("search".into()), btreemap! { "owner".into() => "platform".into() })
        .await?;
    assert!(result.valid);
    let fetched = clusters.get_cluster("default").await?.expect("missing cluster");
    assert_eq!(fetched.default_pipeline_name.as_deref(), Some("search"));
    assert_eq!(fetched.metadata.get("owner").map(String::as_str), Some("platform"));
    // Creation time is immutable through updates.
    assert_eq!(fetched.created_at, clusters.list_clusters().await?.iter().find(|c| c.name == "default").expect("missing").created_at);

    let result = clusters.update_cluster("missing", None, Default::default()).await?;
    assert!(!result.valid);
    assert!(result.errors[0].contains("does not exist"));

    clusters.delete_cluster("staging").await?;
    clusters.delete_cluster("staging").await?; // Idempotent.
    assert!(clusters.get_cluster("staging").await?.is_none());
    assert_eq!(clusters.list_clusters().await?.len(), 1);
    Ok(())
}
