//! Change event bus.
//!
//! The in-process publish point for the four typed change-event kinds the
//! watch engine emits. Consumers subscribe per kind; delivery is broadcast,
//! so a lagging subscriber only loses its own backlog and never blocks the
//! publishing watch task.

use pipewright_core::model::HealthStatus;
use tokio::sync::broadcast;

/// Capacity of each per-kind broadcast channel.
const CHANNEL_CAPACITY: usize = 1000;

/// A stored pipeline definition changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineDefinitionChanged {
    /// The id of the changed pipeline.
    pub pipeline_id: String,
    /// The raw stored value; `None` when the definition was removed.
    pub data: Option<Vec<u8>>,
}

/// A module registration record changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRegistrationChanged {
    /// The id of the changed module instance.
    pub module_id: String,
    /// The raw stored value; `None` when the registration was removed.
    pub data: Option<Vec<u8>>,
}

/// A cluster-scoped pipeline binding changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterPipelineChanged {
    /// The cluster owning the binding.
    pub cluster: String,
    /// The id of the bound pipeline.
    pub pipeline_id: String,
    /// The raw stored value; `None` when the binding was removed.
    pub data: Option<Vec<u8>>,
}

/// The aggregated health of a module instance transitioned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleHealthChanged {
    /// The catalog id of the instance.
    pub service_id: String,
    /// The catalog name of the instance's service.
    pub service_name: String,
    /// The new aggregated status.
    pub status: HealthStatus,
    /// Human-readable context for the transition.
    pub reason: String,
}

/// The in-process change event bus.
#[derive(Clone)]
pub struct EventBus {
    pipeline_definitions: broadcast::Sender<PipelineDefinitionChanged>,
    module_registrations: broadcast::Sender<ModuleRegistrationChanged>,
    cluster_pipelines: broadcast::Sender<ClusterPipelineChanged>,
    module_health: broadcast::Sender<ModuleHealthChanged>,
}

impl EventBus {
    /// Create a new bus.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (pipeline_definitions, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (module_registrations, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (cluster_pipelines, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (module_health, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            pipeline_definitions,
            module_registrations,
            cluster_pipelines,
            module_health,
        }
    }

    /// Subscribe to pipeline-definition changes.
    pub fn subscribe_pipeline_definitions(&self) -> broadcast::Receiver<PipelineDefinitionChanged> {
        self.pipeline_definitions.subscribe()
    }

    /// Subscribe to module-registration changes.
    pub fn subscribe_module_registrations(&self) -> broadcast::Receiver<ModuleRegistrationChanged> {
        self.module_registrations.subscribe()
    }

    /// Subscribe to cluster-pipeline binding changes.
    pub fn subscribe_cluster_pipelines(&self) -> broadcast::Receiver<ClusterPipelineChanged> {
        self.cluster_pipelines.subscribe()
    }

    /// Subscribe to module-health transitions.
    pub fn subscribe_module_health(&self) -> broadcast::Receiver<ModuleHealthChanged> {
        self.module_health.subscribe()
    }

    pub(crate) fn publish_pipeline_definition(&self, event: PipelineDefinitionChanged) {
        let _ = self.pipeline_definitions.send(event);
    }

    pub(crate) fn publish_module_registration(&self, event: ModuleRegistrationChanged) {
        let _ = self.module_registrations.send(event);
    }

    pub(crate) fn publish_cluster_pipeline(&self, event: ClusterPipelineChanged) {
        let _ = self.cluster_pipelines.send(event);
    }

    pub(crate) fn publish_module_health(&self, event: ModuleHealthChanged) {
        let _ = self.module_health.send(event);
    }
}
