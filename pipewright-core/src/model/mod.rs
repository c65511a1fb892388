//! Pipewright domain model.
//!
//! Every entity here serializes as JSON for storage in the KV store. The
//! serialized field names use camelCase so that stored documents line up with
//! what operators see through the external tooling.

mod cluster;
mod module;
mod pipeline;

pub use cluster::Cluster;
pub use module::{
    HealthStatus, ModuleRegistration, ModuleTransport, ModuleWhitelistEntry, ZombieCleanupResult,
};
pub use pipeline::{
    GrpcTransportConfig, KafkaInputDefinition, KafkaTransportConfig, OutputTarget, PipelineConfig,
    PipelineStepConfig, ProcessorInfo, StepType, TransportType,
};
