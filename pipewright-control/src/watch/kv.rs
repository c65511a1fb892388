//! KV prefix watch tasks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::events::{ClusterPipelineChanged, EventBus, ModuleRegistrationChanged, PipelineDefinitionChanged};
use crate::store::{BlockingQuery, KvList, KvPair, StoreClient};

/// The kind of state a prefix watch monitors, deciding how its raw KV deltas
/// are classified into typed events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum WatchedPrefix {
    PipelineDefinitions,
    ModuleRegistrations,
    ClusterPipelines,
}

/// Process-local de-duplication state of one watch.
///
/// Rebuilt from scratch whenever the watch restarts; never persisted.
#[derive(Default)]
struct WatchState {
    /// The prefix index seen on the previous round.
    last_index: u64,
    /// Per-key modify indexes seen on the previous round.
    seen: HashMap<String, u64>,
}

/// A single long-poll watch over one KV prefix.
pub(super) struct PrefixWatcher {
    kind: WatchedPrefix,
    prefix: String,
    config: Arc<Config>,
    store: Arc<dyn StoreClient>,
    bus: EventBus,
    shutdown_rx: broadcast::Receiver<()>,
    state: WatchState,
}

impl PrefixWatcher {
    /// Create a new watcher over the given full key prefix.
    pub(super) fn new(
        kind: WatchedPrefix, prefix: String, config: Arc<Config>, store: Arc<dyn StoreClient>, bus: EventBus,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            kind,
            prefix,
            config,
            store,
            bus,
            shutdown_rx,
            state: WatchState::default(),
        }
    }

    pub(super) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        if !self.sleep_unless_shutdown(self.config.watch_startup_delay()).await {
            return;
        }
        tracing::info!(kind = ?self.kind, prefix = %self.prefix, "prefix watch installed");
        loop {
            let block = BlockingQuery {
                index: self.state.last_index,
                wait: self.config.watch_wait(),
            };
            let result = tokio::select! {
                _ = self.shutdown_rx.recv() => break,
                result = self.store.kv_list(&self.prefix, Some(block)) => result,
            };
            match result {
                Ok(list) => self.handle_round(list),
                Err(err) => {
                    // The sole retry path for store unavailability: stop this
                    // round, wait the fixed delay, then resume with a fresh
                    // query. Retries forever while the engine runs.
                    tracing::error!(error = ?err, kind = ?self.kind, "error from KV watch query, restarting watch");
                    if !self.sleep_unless_shutdown(self.config.watch_restart_delay()).await {
                        break;
                    }
                    self.state.last_index = 0;
                }
            }
        }
        tracing::debug!(kind = ?self.kind, "prefix watch shut down");
    }

    /// Sleep for the given duration, returning `false` if shutdown fired.
    async fn sleep_unless_shutdown(&mut self, duration: std::time::Duration) -> bool {
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = self.shutdown_rx.recv() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Diff one query round against the previous round and publish events
    /// for real changes.
    #[tracing::instrument(level = "debug", skip(self, list), fields(kind = ?self.kind))]
    fn handle_round(&mut self, list: KvList) {
        // An unchanged prefix index is a repeated notification, not a change.
        if list.index == self.state.last_index {
            return;
        }
        self.state.last_index = list.index;

        let mut current: HashMap<String, u64> = HashMap::with_capacity(list.pairs.len());
        for pair in &list.pairs {
            current.insert(pair.key.clone(), pair.modify_index);
            match self.state.seen.get(&pair.key) {
                Some(&seen_index) if seen_index == pair.modify_index => (),
                _ => self.publish(&pair.key, Some(pair)),
            }
        }
        for key in self.state.seen.keys().filter(|key| !current.contains_key(*key)) {
            self.publish(key, None);
        }
        self.state.seen = current;
    }

    /// Classify the key by its path below the prefix and publish the typed
    /// event; `pair` is `None` for removals.
    fn publish(&self, key: &str, pair: Option<&KvPair>) {
        let Some(path) = key.strip_prefix(&self.prefix) else {
            tracing::warn!(%key, prefix = %self.prefix, "watched key outside its own prefix, ignoring");
            return;
        };
        let data = pair.map(|pair| pair.value.clone());
        match self.kind {
            WatchedPrefix::PipelineDefinitions => self.bus.publish_pipeline_definition(PipelineDefinitionChanged {
                pipeline_id: path.to_string(),
                data,
            }),
            WatchedPrefix::ModuleRegistrations => self.bus.publish_module_registration(ModuleRegistrationChanged {
                module_id: path.to_string(),
                data,
            }),
            WatchedPrefix::ClusterPipelines => {
                // Only `{cluster}/pipelines/{id}/config` keys are bindings;
                // metadata and whitelist keys under the clusters prefix are
                // not watched state.
                let segments: Vec<&str> = path.split('/').collect();
                match segments.as_slice() {
                    [cluster, "pipelines", pipeline_id, "config"] => self.bus.publish_cluster_pipeline(ClusterPipelineChanged {
                        cluster: cluster.to_string(),
                        pipeline_id: pipeline_id.to_string(),
                        data,
                    }),
                    _ => (),
                }
            }
        }
    }
}
