//! Cluster model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named grouping of pipelines and whitelisted modules.
///
/// Clusters are immutable after creation except for their metadata and
/// default pipeline name.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// The unique name of this cluster.
    pub name: String,
    /// The instant at which this cluster was created.
    pub created_at: DateTime<Utc>,
    /// The name of the pipeline to use when a caller does not specify one.
    #[serde(default)]
    pub default_pipeline_name: Option<String>,
    /// Free-form operator metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Cluster {
    /// Create a new cluster record stamped with the current time.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            default_pipeline_name: None,
            metadata: Default::default(),
        }
    }
}
