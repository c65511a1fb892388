//! The module registry.
//!
//! Owns the catalog-registration lifecycle of processing-module instances
//! and the `{prefix}/modules/registered/*` KV subtree. Registration probes
//! the target instance first (an unreachable module writes nothing) and
//! then writes the catalog entry (with an attached health check) and the KV
//! metadata record together. The zombie sweep reclaims catalog entries whose
//! checks have gone critical, never touching instances still inside their
//! post-registration grace window.


use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use pipewright_core::model::{ModuleRegistration, ModuleTransport, ModuleWhitelistEntry, ZombieCleanupResult};
use pipewright_core::validation::ValidationResult;
use pipewright_core::AppError;
use tokio::net::TcpStream;
use tonic::transport::Endpoint;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;
use uuid::Uuid;

use crate::config::Config;
use crate::services::ModuleWhitelistService;
use crate::store::{
    self, CheckDefinition, CheckKind, CheckStatus, ServiceRegistration, StoreClient, META_IMPLEMENTATION_ID, TAG_GRPC,
    TAG_MODULE,
};

/// Timeout applied to the registration reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Interval of the health check attached to each registered instance.
const CHECK_INTERVAL_SECONDS: u64 = 10;
/// How long after turning critical the store deregisters an instance on its
/// own; the zombie sweep backs this up.
const CHECK_DEREGISTER_AFTER_SECONDS: u64 = 60;

/// Parameters of a module registration.
#[derive(Clone, Debug)]
pub struct RegisterModuleRequest {
    /// The logical module name, shared by all instances.
    pub module_name: String,
    /// The implementation this instance runs.
    pub implementation_id: String,
    /// The host the instance serves on.
    pub host: String,
    /// The port the instance serves on.
    pub port: u16,
    /// The transport the instance speaks.
    pub transport: ModuleTransport,
    /// The implementation version.
    pub version: String,
    /// Free-form instance metadata.
    pub metadata: BTreeMap<String, String>,
    /// Host probed by the attached health check; defaults to `host`.
    pub health_host: Option<String>,
    /// Port probed by the attached health check; defaults to `port`.
    pub health_port: Option<u16>,
    /// The module's custom-config JSON Schema, if it declares one.
    pub json_schema: Option<serde_json::Value>,
}

/// The module registry.
#[derive(Clone)]
pub struct ModuleRegistry {
    config: Arc<Config>,
    store: Arc<dyn StoreClient>,
    whitelist: ModuleWhitelistService,
}

impl ModuleRegistry {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, store: Arc<dyn StoreClient>, whitelist: ModuleWhitelistService) -> Self {
        Self { config, store, whitelist }
    }

    /// Register a module instance.
    ///
    /// Fails with a connection error if the instance is unreachable and with
    /// a schema error if the supplied JSON Schema does not compile; neither
    /// failure writes anything. On success both the catalog entry and the KV
    /// metadata record exist.
    #[tracing::instrument(level = "debug", skip(self, request), fields(module_name = %request.module_name))]
    pub async fn register_module(&self, request: RegisterModuleRequest) -> Result<ModuleRegistration> {
        if let Some(schema) = &request.json_schema {
            jsonschema::JSONSchema::compile(schema).map_err(|err| AppError::InvalidSchema(err.to_string()))?;
        }
        self.probe(&request).await?;

        let module_id = format!("{}-{}", request.module_name, Uuid::new_v4().simple());
        let health_host = request.health_host.clone().unwrap_or_else(|| request.host.clone());
        let health_port = request.health_port.unwrap_or(request.port);
        let mut meta = BTreeMap::new();
        meta.insert(META_IMPLEMENTATION_ID.to_string(), request.implementation_id.clone());
        meta.insert("version".to_string(), request.version.clone());
        let mut tags = vec![TAG_MODULE.to_string()];
        if request.transport == ModuleTransport::Grpc {
            tags.push(TAG_GRPC.to_string());
        }
        let check_kind = match request.transport {
            ModuleTransport::Grpc => CheckKind::Grpc,
            ModuleTransport::Tcp => CheckKind::Tcp,
        };
        self.store
            .register_service(ServiceRegistration {
                id: module_id.clone(),
                name: format!("module-{}", request.module_name),
                tags,
                address: request.host.clone(),
                port: request.port,
                meta,
                check: Some(CheckDefinition {
                    kind: check_kind,
                    target: format!("{}:{}", health_host, health_port),
                    interval_seconds: CHECK_INTERVAL_SECONDS,
                    ttl_seconds: None,
                    deregister_after_seconds: CHECK_DEREGISTER_AFTER_SECONDS,
                }),
            })
            .await
            .context("error registering module with the catalog")?;

        let registration = ModuleRegistration {
            module_id: module_id.clone(),
            module_name: request.module_name,
            implementation_id: request.implementation_id,
            host: request.host,
            port: request.port,
            transport: request.transport,
            version: request.version,
            enabled: true,
            metadata: request.metadata,
            json_schema: request.json_schema,
            registered_at: Utc::now(),
        };
        let value = serde_json::to_vec(&registration).context("error serializing module registration")?;
        let key = store::module_registration_key(&self.config.kv_prefix, &module_id);
        if let Err(err) = self.store.kv_put(&key, value).await {
            // Keep catalog and KV consistent: roll the catalog entry back
            // before surfacing the failure.
            if let Err(rollback_err) = self.store.deregister_service(&module_id).await {
                tracing::error!(error = ?rollback_err, %module_id, "error rolling back catalog entry after failed KV write");
            }
            return Err(err).context("error writing module registration record");
        }

        tracing::info!(%module_id, "module instance registered");
        Ok(registration)
    }

    /// Deregister a module instance, removing its catalog entry and KV
    /// record. Idempotent.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn deregister_module(&self, module_id: &str) -> Result<()> {
        self.store.deregister_service(module_id).await?;
        self.store.kv_delete(&store::module_registration_key(&self.config.kv_prefix, module_id)).await?;
        tracing::info!(%module_id, "module instance deregistered");
        Ok(())
    }

    /// Globally enable a module instance. Idempotent.
    pub async fn enable_module(&self, module_id: &str) -> Result<ModuleRegistration> {
        self.set_enabled(module_id, true).await
    }

    /// Globally disable a module instance. Idempotent.
    pub async fn disable_module(&self, module_id: &str) -> Result<ModuleRegistration> {
        self.set_enabled(module_id, false).await
    }

    /// List all known module registrations.
    pub async fn list_registered_modules(&self) -> Result<Vec<ModuleRegistration>> {
        let list = self.store.kv_list(&store::module_registrations_prefix(&self.config.kv_prefix), None).await?;
        let mut registrations = Vec::new();
        for pair in &list.pairs {
            let registration = serde_json::from_slice(&pair.value).context("error deserializing module registration")?;
            registrations.push(registration);
        }
        Ok(registrations)
    }

    /// Whitelist a module implementation for a cluster.
    ///
    /// Distinct from the global `enabled` flag: whitelist membership decides
    /// which clusters may reference the implementation.
    pub async fn enable_module_for_cluster(&self, cluster: &str, entry: ModuleWhitelistEntry) -> Result<ValidationResult> {
        self.whitelist.enable_module(cluster, entry).await
    }

    /// List the module implementations whitelisted for a cluster.
    pub async fn list_enabled_modules_for_cluster(&self, cluster: &str) -> Result<Vec<ModuleWhitelistEntry>> {
        self.whitelist.list_enabled(cluster).await
    }

    /// Sweep the catalog for zombie instances: entries whose checks are
    /// critical (or entirely absent) and which are past their registration
    /// grace window.
    ///
    /// Health is snapshotted up front so an instance registering while the
    /// sweep runs is judged by its pre-sweep state; the grace window keeps a
    /// fresh, not-yet-healthy instance from being reclaimed. A failed
    /// reclamation is counted as detected-but-not-cleaned and never aborts
    /// the rest of the sweep.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn cleanup_zombie_instances(&self) -> Result<ZombieCleanupResult> {
        let health = self.store.service_health(TAG_MODULE).await?;
        let now = Utc::now();
        let grace = self.config.module_zombie_grace();

        let mut result = ZombieCleanupResult::default();
        for item in health {
            let is_zombie = item.checks.is_empty() || item.checks.iter().any(|check| check.status == CheckStatus::Critical);
            if !is_zombie {
                continue;
            }
            let module_id = item.service.id.as_str();
            let key = store::module_registration_key(&self.config.kv_prefix, module_id);
            match self.store.kv_get(&key).await {
                Ok(Some(pair)) => match serde_json::from_slice::<ModuleRegistration>(&pair.value) {
                    Ok(registration) if now.signed_duration_since(registration.registered_at) < grace => {
                        tracing::debug!(%module_id, "critical instance still within its registration grace window, skipping");
                        continue;
                    }
                    Ok(_) => (),
                    Err(err) => {
                        tracing::warn!(error = ?err, %module_id, "unparseable registration record for critical instance")
                    }
                },
                // A catalog entry without a KV record is an orphan; reclaim it.
                Ok(None) => (),
                Err(err) => {
                    tracing::error!(error = ?err, %module_id, "error fetching registration record, skipping instance this sweep");
                    continue;
                }
            }

            result.zombies_detected += 1;
            match self.reclaim(module_id, &key).await {
                Ok(()) => {
                    result.zombies_cleaned += 1;
                    tracing::info!(%module_id, "zombie instance reclaimed");
                }
                Err(err) => tracing::error!(error = ?err, %module_id, "error reclaiming zombie instance"),
            }
        }
        Ok(result)
    }

    async fn reclaim(&self, module_id: &str, key: &str) -> Result<()> {
        self.store.deregister_service(module_id).await?;
        self.store.kv_delete(key).await
    }

    async fn set_enabled(&self, module_id: &str, enabled: bool) -> Result<ModuleRegistration> {
        let key = store::module_registration_key(&self.config.kv_prefix, module_id);
        let Some(pair) = self.store.kv_get(&key).await? else {
            bail!(AppError::NotFound);
        };
        let mut registration: ModuleRegistration =
            serde_json::from_slice(&pair.value).context("error deserializing module registration")?;
        if registration.enabled != enabled {
            registration.enabled = enabled;
            let value = serde_json::to_vec(&registration).context("error serializing module registration")?;
            self.store.kv_put(&key, value).await?;
        }
        Ok(registration)
    }

    /// Probe the instance named by the request, surfacing unreachability as
    /// a connection error without retrying.
    async fn probe(&self, request: &RegisterModuleRequest) -> Result<()> {
        match request.transport {
            ModuleTransport::Tcp => {
                let target = (request.host.as_str(), request.port);
                tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(target))
                    .await
                    .map_err(|_| AppError::Connection(format!("module at {}:{} did not accept within {:?}", request.host, request.port, PROBE_TIMEOUT)))?
                    .map_err(|err| AppError::Connection(format!("module at {}:{} is unreachable: {}", request.host, request.port, err)))?;
                Ok(())
            }
            ModuleTransport::Grpc => {
                let endpoint = Endpoint::from_shared(format!("http://{}:{}", request.host, request.port))
                    .context("error building module probe endpoint")?
                    .connect_timeout(PROBE_TIMEOUT)
                    .timeout(PROBE_TIMEOUT);
                let channel = endpoint
                    .connect()
                    .await
                    .map_err(|err| AppError::Connection(format!("module at {}:{} is unreachable: {}", request.host, request.port, err)))?;
                let mut client = HealthClient::new(channel);
                match client.check(HealthCheckRequest { service: String::new() }).await {
                    Ok(_) => Ok(()),
                    Err(status) if matches!(status.code(), tonic::Code::Unavailable | tonic::Code::DeadlineExceeded) => {
                        bail!(AppError::Connection(format!(
                            "module at {}:{} did not answer its health check: {}",
                            request.host, request.port, status
                        )))
                    }
                    // Any other status came from a live endpoint; a module
                    // without the health service still proves reachability.
                    Err(_) => Ok(()),
                }
            }
        }
    }
}
