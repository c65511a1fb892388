//! Module registration & whitelist model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The metadata record of one registered module instance.
///
/// One record exists per instance; multiple instances may share a
/// `module_name`. The registry keeps this record consistent with the
/// instance's catalog entry.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRegistration {
    /// The unique id of this instance.
    pub module_id: String,
    /// The logical name of the module, shared by all of its instances.
    pub module_name: String,
    /// The id of the module implementation this instance runs.
    pub implementation_id: String,
    /// The host this instance serves on.
    pub host: String,
    /// The port this instance serves on.
    pub port: u16,
    /// The transport this instance speaks.
    pub transport: ModuleTransport,
    /// The implementation version of this instance.
    pub version: String,
    /// Whether this instance is globally enabled.
    pub enabled: bool,
    /// Free-form instance metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// The module's custom-config JSON Schema, if it declares one.
    #[serde(default)]
    pub json_schema: Option<serde_json::Value>,
    /// The instant at which this instance registered.
    ///
    /// Zombie cleanup never reclaims an instance younger than the configured
    /// grace window, measured from this stamp.
    pub registered_at: DateTime<Utc>,
}

/// The transport a module instance speaks.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleTransport {
    Grpc,
    Tcp,
}

/// A whitelist entry permitting a module implementation within a cluster.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleWhitelistEntry {
    /// The id of the whitelisted implementation.
    pub implementation_id: String,
    /// The human-facing name of the implementation; pipeline steps reference
    /// modules through this name.
    pub implementation_name: String,
    /// Reference to the schema validating `custom_config`, if any.
    #[serde(default)]
    pub custom_config_schema_ref: Option<String>,
    /// Cluster-scoped configuration passed to the module.
    #[serde(default)]
    pub custom_config: serde_json::Value,
}

impl ModuleWhitelistEntry {
    /// Create an entry with no custom config.
    pub fn new(implementation_id: impl Into<String>, implementation_name: impl Into<String>) -> Self {
        Self {
            implementation_id: implementation_id.into(),
            implementation_name: implementation_name.into(),
            custom_config_schema_ref: None,
            custom_config: serde_json::Value::Null,
        }
    }
}

/// The aggregated health of one module instance.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Passing,
    Warning,
    Critical,
    /// The instance has checks registered but none have reported yet.
    Unknown,
    /// The instance is no longer present in the catalog.
    Removed,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passing => write!(f, "passing"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
            Self::Unknown => write!(f, "unknown"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// Summary of one zombie-cleanup sweep.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ZombieCleanupResult {
    /// Instances whose health marked them for reclamation.
    pub zombies_detected: usize,
    /// Instances successfully deregistered and purged.
    pub zombies_cleaned: usize,
}
