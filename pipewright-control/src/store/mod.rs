//! KV/catalog store client.
//!
//! An abstraction over a replicated Consul-class store: get/put/delete by
//! key, prefix listing with a monotonically increasing per-prefix modify
//! index, blocking queries keyed by index, and a service catalog with
//! registerable health checks.
//!
//! Two implementations ship: the embedded [`MemoryStore`] used by the test
//! suite and store-less dev runs, and the [`HttpStore`] speaking the
//! Consul-compatible HTTP API.

mod http;
mod keys;
mod memory;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpStore;
pub use keys::*;
pub use memory::MemoryStore;

/// The catalog tag identifying processing-module services.
pub const TAG_MODULE: &str = "module";
/// The catalog tag identifying gRPC-speaking services.
pub const TAG_GRPC: &str = "grpc";
/// Catalog service-meta key carrying the implementation id of an instance.
pub const META_IMPLEMENTATION_ID: &str = "implementationId";

/// A single KV entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvPair {
    /// The full key of this entry.
    pub key: String,
    /// The raw stored value.
    pub value: Vec<u8>,
    /// The store index at which this entry was last modified.
    pub modify_index: u64,
}

/// The result of a prefix listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KvList {
    /// The modify index of the prefix as a whole.
    pub index: u64,
    /// All entries under the prefix.
    pub pairs: Vec<KvPair>,
}

/// Parameters of a blocking (long-poll) query.
///
/// The query returns once the prefix index passes `index` or once `wait`
/// elapses; a wait expiry returns the unchanged snapshot, which callers must
/// treat as a legal no-op notification.
#[derive(Clone, Copy, Debug)]
pub struct BlockingQuery {
    /// The index the caller has already seen.
    pub index: u64,
    /// The maximum time to hold the query open.
    pub wait: Duration,
}

/// A service registration handed to the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRegistration {
    /// The unique id of this service instance.
    pub id: String,
    /// The logical service name, shared by all instances.
    pub name: String,
    /// Catalog tags.
    pub tags: Vec<String>,
    /// The address the instance serves on.
    pub address: String,
    /// The port the instance serves on.
    pub port: u16,
    /// Arbitrary service metadata.
    pub meta: BTreeMap<String, String>,
    /// The health check attached to this instance, if any.
    pub check: Option<CheckDefinition>,
}

/// The definition of a registerable health check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckDefinition {
    /// The kind of probe the store's agent runs.
    pub kind: CheckKind,
    /// The `host:port` target of TCP/gRPC probes; unused for TTL checks.
    pub target: String,
    /// The probe interval in seconds.
    pub interval_seconds: u64,
    /// The TTL in seconds for TTL checks.
    pub ttl_seconds: Option<u64>,
    /// How long after turning critical the store deregisters the service.
    pub deregister_after_seconds: u64,
}

/// The kind of a health-check probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckKind {
    Tcp,
    Ttl,
    Grpc,
}

/// A service as listed by the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogService {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub address: String,
    pub port: u16,
    pub meta: BTreeMap<String, String>,
}

/// The status reported by a single health check.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passing,
    Warning,
    Critical,
}

/// A single health-check result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthCheck {
    /// The id of the check itself.
    pub check_id: String,
    /// The id of the service instance the check belongs to.
    pub service_id: String,
    /// The check status.
    pub status: CheckStatus,
    /// The probe output accompanying the status.
    pub output: String,
}

/// A catalog service paired with all of its check results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceHealth {
    pub service: CatalogService,
    pub checks: Vec<HealthCheck>,
}

/// Client abstraction over the KV/catalog store.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// Fetch a single KV entry.
    async fn kv_get(&self, key: &str) -> Result<Option<KvPair>>;

    /// Write a single KV entry, unconditionally.
    async fn kv_put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Write a single KV entry if its modify index still equals the given
    /// index; an index of `0` requires the key to not exist. Returns whether
    /// the write was applied.
    async fn kv_put_cas(&self, key: &str, value: Vec<u8>, modify_index: u64) -> Result<bool>;

    /// Delete a single KV entry; deleting an absent key is a no-op.
    async fn kv_delete(&self, key: &str) -> Result<()>;

    /// List all entries under a prefix, optionally blocking until the prefix
    /// index passes the given index.
    async fn kv_list(&self, prefix: &str, block: Option<BlockingQuery>) -> Result<KvList>;

    /// Register a service instance with the catalog.
    async fn register_service(&self, registration: ServiceRegistration) -> Result<()>;

    /// Deregister a service instance; absent ids are a no-op.
    async fn deregister_service(&self, service_id: &str) -> Result<()>;

    /// List all catalog services carrying the given tag.
    async fn list_services(&self, tag: &str) -> Result<Vec<CatalogService>>;

    /// Fetch the health-check results of all services carrying the given tag.
    async fn service_health(&self, tag: &str) -> Result<Vec<ServiceHealth>>;

    /// Report a TTL check result for the given service instance.
    async fn update_ttl_check(&self, service_id: &str, status: CheckStatus, output: &str) -> Result<()>;
}
