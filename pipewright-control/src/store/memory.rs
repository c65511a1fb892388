//! Embedded in-memory store.
//!
//! A faithful stand-in for the external store: writes bump a monotonically
//! increasing modify index, prefix listings compute a per-prefix index over
//! live entries and deletion tombstones, and blocking queries long-poll on a
//! watch channel. The catalog is passive: check statuses only change when
//! reported through `update_ttl_check`, which is also how tests steer module
//! health.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{watch, Mutex};

use crate::store::{
    BlockingQuery, CatalogService, CheckStatus, HealthCheck, KvList, KvPair, ServiceHealth, ServiceRegistration,
    StoreClient,
};

/// The embedded store.
pub struct MemoryStore {
    kv: Mutex<KvInner>,
    version_tx: watch::Sender<u64>,
    catalog: DashMap<String, CatalogEntry>,
}

#[derive(Default)]
struct KvInner {
    /// The store-wide modify index, bumped by every mutation.
    index: u64,
    entries: BTreeMap<String, KvPair>,
    /// Deletion markers, keeping prefix indexes monotonic across removals.
    tombstones: BTreeMap<String, u64>,
}

#[derive(Clone)]
struct CatalogEntry {
    service: CatalogService,
    check: Option<CheckState>,
}

#[derive(Clone)]
struct CheckState {
    status: CheckStatus,
    output: String,
}

impl MemoryStore {
    /// Create a new, empty store.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (version_tx, _version_rx) = watch::channel(0);
        Self {
            kv: Mutex::new(KvInner::default()),
            version_tx,
            catalog: DashMap::new(),
        }
    }

    async fn snapshot(&self, prefix: &str) -> KvList {
        let inner = self.kv.lock().await;
        let pairs: Vec<KvPair> = inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, pair)| pair.clone())
            .collect();
        let live_index = pairs.iter().map(|pair| pair.modify_index).max().unwrap_or(0);
        let dead_index = inner
            .tombstones
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, &index)| index)
            .max()
            .unwrap_or(0);
        KvList {
            index: live_index.max(dead_index),
            pairs,
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn kv_get(&self, key: &str) -> Result<Option<KvPair>> {
        let inner = self.kv.lock().await;
        Ok(inner.entries.get(key).cloned())
    }

    async fn kv_put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut inner = self.kv.lock().await;
        inner.index += 1;
        let pair = KvPair {
            key: key.into(),
            value,
            modify_index: inner.index,
        };
        inner.entries.insert(key.into(), pair);
        inner.tombstones.remove(key);
        let index = inner.index;
        drop(inner);
        let _ = self.version_tx.send(index);
        Ok(())
    }

    async fn kv_put_cas(&self, key: &str, value: Vec<u8>, modify_index: u64) -> Result<bool> {
        let mut inner = self.kv.lock().await;
        let current = inner.entries.get(key).map(|pair| pair.modify_index);
        let applies = match (modify_index, current) {
            (0, None) => true,
            (0, Some(_)) => false,
            (expected, Some(actual)) => expected == actual,
            (_, None) => false,
        };
        if !applies {
            return Ok(false);
        }
        inner.index += 1;
        let pair = KvPair {
            key: key.into(),
            value,
            modify_index: inner.index,
        };
        inner.entries.insert(key.into(), pair);
        inner.tombstones.remove(key);
        let index = inner.index;
        drop(inner);
        let _ = self.version_tx.send(index);
        Ok(true)
    }

    async fn kv_delete(&self, key: &str) -> Result<()> {
        let mut inner = self.kv.lock().await;
        if inner.entries.remove(key).is_none() {
            return Ok(());
        }
        inner.index += 1;
        let index = inner.index;
        inner.tombstones.insert(key.into(), index);
        drop(inner);
        let _ = self.version_tx.send(index);
        Ok(())
    }

    async fn kv_list(&self, prefix: &str, block: Option<BlockingQuery>) -> Result<KvList> {
        let mut version_rx = self.version_tx.subscribe();
        let Some(block) = block else { return Ok(self.snapshot(prefix).await) };
        let deadline = tokio::time::Instant::now() + block.wait;
        loop {
            let list = self.snapshot(prefix).await;
            if list.index > block.index {
                return Ok(list);
            }
            match tokio::time::timeout_at(deadline, version_rx.changed()).await {
                // A write landed somewhere in the store; re-snapshot.
                Ok(Ok(())) => continue,
                // Wait expired (or the store is gone): hand back the
                // unchanged snapshot, a legal no-op notification.
                _ => return Ok(list),
            }
        }
    }

    async fn register_service(&self, registration: ServiceRegistration) -> Result<()> {
        let service = CatalogService {
            id: registration.id.clone(),
            name: registration.name,
            tags: registration.tags,
            address: registration.address,
            port: registration.port,
            meta: registration.meta,
        };
        // Checks start critical until their first report, per the agent's
        // own semantics.
        let check = registration.check.map(|_definition| CheckState {
            status: CheckStatus::Critical,
            output: "check has not yet reported".into(),
        });
        self.catalog.insert(registration.id, CatalogEntry { service, check });
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> Result<()> {
        self.catalog.remove(service_id);
        Ok(())
    }

    async fn list_services(&self, tag: &str) -> Result<Vec<CatalogService>> {
        let mut services: Vec<CatalogService> = self
            .catalog
            .iter()
            .filter(|entry| entry.service.tags.iter().any(|t| t == tag))
            .map(|entry| entry.service.clone())
            .collect();
        services.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(services)
    }

    async fn service_health(&self, tag: &str) -> Result<Vec<ServiceHealth>> {
        let mut health: Vec<ServiceHealth> = self
            .catalog
            .iter()
            .filter(|entry| entry.service.tags.iter().any(|t| t == tag))
            .map(|entry| ServiceHealth {
                service: entry.service.clone(),
                checks: entry
                    .check
                    .as_ref()
                    .map(|check| {
                        vec![HealthCheck {
                            check_id: format!("service:{}", entry.service.id),
                            service_id: entry.service.id.clone(),
                            status: check.status,
                            output: check.output.clone(),
                        }]
                    })
                    .unwrap_or_default(),
            })
            .collect();
        health.sort_by(|a, b| a.service.id.cmp(&b.service.id));
        Ok(health)
    }

    async fn update_ttl_check(&self, service_id: &str, status: CheckStatus, output: &str) -> Result<()> {
        let Some(mut entry) = self.catalog.get_mut(service_id) else {
            bail!("unknown service `{}`", service_id);
        };
        match entry.check.as_mut() {
            Some(check) => {
                check.status = status;
                check.output = output.into();
            }
            None => bail!("service `{}` has no registered check", service_id),
        }
        Ok(())
    }
}
