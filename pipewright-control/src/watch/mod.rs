//! The watch engine.
//!
//! Maintains one long-poll watch per monitored KV prefix and one poll loop
//! over the health of processing-module services, converting raw store
//! deltas into typed change events on the [`EventBus`]. Watches suppress
//! no-op notifications through modify-index comparison and replace
//! themselves after a fixed delay on store failure, retrying forever while
//! the engine runs.

mod health;
mod kv;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use pipewright_core::model::HealthStatus;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::events::EventBus;
use crate::store::{self, StoreClient};
use crate::watch::health::HealthWatcher;
use crate::watch::kv::{PrefixWatcher, WatchedPrefix};

/// The latest known aggregated health per service id, refreshed by the
/// health watch.
pub type HealthMap = Arc<ArcSwap<HashMap<String, HealthStatus>>>;

/// Handles of a running engine.
struct EngineHandles {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

/// The watch engine.
pub struct WatchEngine {
    config: Arc<Config>,
    store: Arc<dyn StoreClient>,
    bus: EventBus,
    health: HealthMap,
    running: Mutex<Option<EngineHandles>>,
}

impl WatchEngine {
    /// Create a new engine. No watches run until `start_watching` is called.
    pub fn new(config: Arc<Config>, store: Arc<dyn StoreClient>, bus: EventBus) -> Self {
        Self {
            config,
            store,
            bus,
            health: Default::default(),
            running: Mutex::new(None),
        }
    }

    /// The latest known aggregated health per module service id.
    pub fn health_snapshot(&self) -> HealthMap {
        self.health.clone()
    }

    /// Install one watch per monitored prefix and the health poll.
    ///
    /// Idempotent: calling while already running is a no-op, as is calling
    /// with watches disabled by config.
    pub fn start_watching(&self) -> Result<()> {
        if !self.config.watch_enabled {
            tracing::info!("watches are disabled by config, not starting the watch engine");
            return Ok(());
        }
        let mut running = self.running.lock().map_err(|_| anyhow::anyhow!("watch engine state lock poisoned"))?;
        if running.is_some() {
            return Ok(());
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let prefix = &self.config.kv_prefix;
        let mut tasks = Vec::new();
        for (kind, key_prefix) in [
            (WatchedPrefix::PipelineDefinitions, store::pipeline_definitions_prefix(prefix)),
            (WatchedPrefix::ModuleRegistrations, store::module_registrations_prefix(prefix)),
            (WatchedPrefix::ClusterPipelines, store::clusters_prefix(prefix)),
        ] {
            let watcher = PrefixWatcher::new(
                kind,
                key_prefix,
                self.config.clone(),
                self.store.clone(),
                self.bus.clone(),
                shutdown_tx.subscribe(),
            );
            tasks.push(watcher.spawn());
        }
        let health_watcher = HealthWatcher::new(
            self.config.clone(),
            self.store.clone(),
            self.bus.clone(),
            self.health.clone(),
            shutdown_tx.subscribe(),
        );
        tasks.push(health_watcher.spawn());

        tracing::info!(prefix = %self.config.kv_prefix, tasks = tasks.len(), "watch engine started");
        *running = Some(EngineHandles { shutdown_tx, tasks });
        Ok(())
    }

    /// Cancel all watches and clear de-duplication state.
    ///
    /// Idempotent: calling before `start_watching` is a no-op. All watch
    /// tasks are joined before this returns, so no background work outlives
    /// the engine.
    pub async fn stop_watching(&self) -> Result<()> {
        let handles = {
            let mut running = self.running.lock().map_err(|_| anyhow::anyhow!("watch engine state lock poisoned"))?;
            running.take()
        };
        let Some(handles) = handles else { return Ok(()) };

        let _ = handles.shutdown_tx.send(());
        for task in handles.tasks {
            task.await.context("error joining watch task")?;
        }
        // De-dup state lives inside the tasks and died with them; reset the
        // shared health view as well.
        self.health.store(Arc::new(HashMap::new()));
        tracing::info!("watch engine stopped");
        Ok(())
    }

    /// Whether the engine currently has watches installed.
    pub fn is_watching(&self) -> bool {
        self.running.lock().map(|running| running.is_some()).unwrap_or(false)
    }
}
