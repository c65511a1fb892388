//! Module health poll task.

use std::collections::HashMap;
use std::sync::Arc;

use pipewright_core::model::HealthStatus;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::events::{EventBus, ModuleHealthChanged};
use crate::store::{CheckStatus, ServiceHealth, StoreClient, TAG_MODULE};
use crate::watch::HealthMap;

/// Polls the catalog health of all processing-module services and publishes
/// a health event on every status transition.
pub(super) struct HealthWatcher {
    config: Arc<Config>,
    store: Arc<dyn StoreClient>,
    bus: EventBus,
    shared: HealthMap,
    shutdown_rx: broadcast::Receiver<()>,
    /// The last known `(status, service_name)` per service id.
    last: HashMap<String, (HealthStatus, String)>,
}

impl HealthWatcher {
    pub(super) fn new(
        config: Arc<Config>, store: Arc<dyn StoreClient>, bus: EventBus, shared: HealthMap, shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            store,
            bus,
            shared,
            shutdown_rx,
            last: HashMap::new(),
        }
    }

    pub(super) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        if !self.sleep_unless_shutdown(self.config.watch_startup_delay()).await {
            return;
        }
        tracing::info!(interval = ?self.config.health_watch_interval(), "module health watch installed");
        loop {
            match self.store.service_health(TAG_MODULE).await {
                Ok(health) => self.reconcile(health),
                // Swallow and retry on the next tick; health polling shares
                // the watch engine's connectivity policy.
                Err(err) => tracing::error!(error = ?err, "error fetching module health from catalog"),
            }
            if !self.sleep_unless_shutdown(self.config.health_watch_interval()).await {
                break;
            }
        }
        tracing::debug!("module health watch shut down");
    }

    async fn sleep_unless_shutdown(&mut self, duration: std::time::Duration) -> bool {
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = self.shutdown_rx.recv() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Compare the fetched health against the last known state and publish
    /// transitions, including synthetic removals for vanished services.
    #[tracing::instrument(level = "debug", skip(self, health))]
    fn reconcile(&mut self, health: Vec<ServiceHealth>) {
        let mut current: HashMap<String, (HealthStatus, String)> = HashMap::with_capacity(health.len());
        for item in health {
            let (status, reason) = aggregate(&item);
            let service_id = item.service.id.clone();
            current.insert(service_id.clone(), (status, item.service.name.clone()));
            let changed = self.last.get(&service_id).map(|(last_status, _)| *last_status != status).unwrap_or(true);
            if changed {
                self.bus.publish_module_health(ModuleHealthChanged {
                    service_id,
                    service_name: item.service.name,
                    status,
                    reason,
                });
            }
        }

        for (service_id, (_, service_name)) in self.last.iter().filter(|(id, _)| !current.contains_key(*id)) {
            self.bus.publish_module_health(ModuleHealthChanged {
                service_id: service_id.clone(),
                service_name: service_name.clone(),
                status: HealthStatus::Removed,
                reason: "service no longer present in catalog".into(),
            });
        }

        self.last = current;
        let snapshot: HashMap<String, HealthStatus> =
            self.last.iter().map(|(id, (status, _))| (id.clone(), *status)).collect();
        self.shared.store(Arc::new(snapshot));
    }
}

/// Aggregate the checks of one service into a `(status, reason)` pair:
/// critical wins over warning wins over passing; no checks at all is unknown.
fn aggregate(health: &ServiceHealth) -> (HealthStatus, String) {
    if health.checks.is_empty() {
        return (HealthStatus::Unknown, "no health checks registered".into());
    }
    let failing: Vec<&str> = health
        .checks
        .iter()
        .filter(|check| check.status != CheckStatus::Passing)
        .map(|check| check.output.as_str())
        .collect();
    if health.checks.iter().any(|check| check.status == CheckStatus::Critical) {
        (HealthStatus::Critical, failing.join("; "))
    } else if health.checks.iter().any(|check| check.status == CheckStatus::Warning) {
        (HealthStatus::Warning, failing.join("; "))
    } else {
        (HealthStatus::Passing, "all checks passing".into())
    }
}
