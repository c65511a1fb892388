//! Configuration services.
//!
//! CRUD plus business rules over the KV-backed entities. Every write is
//! validate-then-commit: a failed validation never partially writes state.
//! Validation and not-found conditions are part of the normal return values;
//! only store failures surface as errors.

mod cluster;
#[cfg(test)]
mod cluster_test;
mod pipeline;
#[cfg(test)]
mod pipeline_test;
mod whitelist;

pub use cluster::ClusterService;
pub use pipeline::PipelineConfigService;
pub use whitelist::ModuleWhitelistService;
