//! KV key layout.
//!
//! All control-plane state lives under a configurable prefix (default
//! `pipeline`):
//!
//! - `{prefix}/pipelines/definitions/{pipelineId}`: serialized `PipelineConfig`.
//! - `{prefix}/modules/registered/{moduleId}`: serialized `ModuleRegistration`.
//! - `{prefix}/clusters/{cluster}/metadata`: serialized `Cluster`.
//! - `{prefix}/clusters/{cluster}/pipelines/{pipelineId}/config`: cluster-scoped binding.
//! - `{prefix}/clusters/{cluster}/whitelist/{implementationId}`: serialized `ModuleWhitelistEntry`.

/// The prefix under which pipeline definitions are stored.
pub fn pipeline_definitions_prefix(prefix: &str) -> String {
    format!("{}/pipelines/definitions/", prefix)
}

/// The key of a single pipeline definition.
pub fn pipeline_definition_key(prefix: &str, pipeline_id: &str) -> String {
    format!("{}{}", pipeline_definitions_prefix(prefix), pipeline_id)
}

/// The prefix under which module registrations are stored.
pub fn module_registrations_prefix(prefix: &str) -> String {
    format!("{}/modules/registered/", prefix)
}

/// The key of a single module registration.
pub fn module_registration_key(prefix: &str, module_id: &str) -> String {
    format!("{}{}", module_registrations_prefix(prefix), module_id)
}

/// The prefix under which all cluster-scoped state is stored.
pub fn clusters_prefix(prefix: &str) -> String {
    format!("{}/clusters/", prefix)
}

/// The key of a cluster's metadata record.
pub fn cluster_metadata_key(prefix: &str, cluster: &str) -> String {
    format!("{}{}/metadata", clusters_prefix(prefix), cluster)
}

/// The prefix under which a cluster's pipeline bindings are stored.
pub fn cluster_pipelines_prefix(prefix: &str, cluster: &str) -> String {
    format!("{}{}/pipelines/", clusters_prefix(prefix), cluster)
}

/// The key of a cluster-scoped pipeline binding.
pub fn cluster_pipeline_key(prefix: &str, cluster: &str, pipeline_id: &str) -> String {
    format!("{}{}/config", cluster_pipelines_prefix(prefix, cluster), pipeline_id)
}

/// The prefix under which a cluster's module whitelist is stored.
pub fn cluster_whitelist_prefix(prefix: &str, cluster: &str) -> String {
    format!("{}{}/whitelist/", clusters_prefix(prefix), cluster)
}

/// The key of a single whitelist entry.
pub fn cluster_whitelist_key(prefix: &str, cluster: &str, implementation_id: &str) -> String {
    format!("{}{}", cluster_whitelist_prefix(prefix, cluster), implementation_id)
}
