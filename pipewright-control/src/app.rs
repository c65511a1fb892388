//! Application bootstrap.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use pipewright_core::validation::ValidationEngine;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, SignalStream};
use tokio_stream::StreamMap;

use crate::config::Config;
use crate::events::EventBus;
use crate::registry::ModuleRegistry;
use crate::services::{ClusterService, ModuleWhitelistService, PipelineConfigService};
use crate::store::{HttpStore, MemoryStore, StoreClient};
use crate::watch::WatchEngine;

/// The application object for when Pipewright is running as a server.
pub struct App {
    /// The application's runtime config.
    config: Arc<Config>,

    /// The change event bus.
    bus: EventBus,
    /// The watch engine.
    watch: Arc<WatchEngine>,
    /// The cluster service.
    clusters: ClusterService,
    /// The pipeline configuration service.
    pipelines: PipelineConfigService,
    /// The module whitelist service.
    whitelist: ModuleWhitelistService,
    /// The module registry.
    registry: ModuleRegistry,

    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,
}

impl App {
    /// Create a new instance.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(10);

        // Initialize the store client.
        let store: Arc<dyn StoreClient> = match &config.store_addr {
            Some(addr) => Arc::new(HttpStore::new(addr).context("error initializing store client")?),
            None => {
                tracing::warn!("no STORE_ADDR configured, falling back to the embedded in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let bus = EventBus::new();
        let engine = Arc::new(ValidationEngine::new());
        let clusters = ClusterService::new(store.clone(), config.kv_prefix.clone());
        let whitelist = ModuleWhitelistService::new(store.clone(), config.kv_prefix.clone());
        let pipelines = PipelineConfigService::new(store.clone(), config.kv_prefix.clone(), engine, whitelist.clone());
        let registry = ModuleRegistry::new(config.clone(), store.clone(), whitelist.clone());
        let watch = Arc::new(WatchEngine::new(config.clone(), store, bus.clone()));

        // Ensure the configured cluster exists; racing creators resolve to a
        // single winner and the rest land here as a benign duplicate.
        let created = clusters.create_cluster(&config.cluster_name).await.context("error ensuring default cluster")?;
        if created.valid {
            tracing::info!(cluster = %config.cluster_name, "created configured cluster");
        }

        watch.start_watching().context("error starting watch engine")?;

        Ok(Self {
            config,
            bus,
            watch,
            clusters,
            pipelines,
            whitelist,
            registry,
            shutdown_rx: BroadcastStream::new(shutdown_rx),
            shutdown_tx,
        })
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));

        loop {
            tokio::select! {
                Some((_, sig)) = signals.next() => {
                    tracing::debug!(signal = ?sig, "signal received, beginning graceful shutdown");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = self.shutdown_rx.next() => break,
            }
        }

        // Begin shutdown routine.
        tracing::debug!("Pipewright is shutting down");
        if let Err(err) = self.watch.stop_watching().await {
            tracing::error!(error = ?err, "error shutting down watch engine");
        }

        tracing::debug!("Pipewright shutdown complete");
        Ok(())
    }

    /// The change event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The watch engine.
    pub fn watch(&self) -> &WatchEngine {
        &self.watch
    }

    /// The cluster service.
    pub fn clusters(&self) -> &ClusterService {
        &self.clusters
    }

    /// The pipeline configuration service.
    pub fn pipelines(&self) -> &PipelineConfigService {
        &self.pipelines
    }

    /// The module whitelist service.
    pub fn whitelist(&self) -> &ModuleWhitelistService {
        &self.whitelist
    }

    /// The module registry.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// The runtime config.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
