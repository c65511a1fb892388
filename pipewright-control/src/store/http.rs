//! Consul-compatible HTTP store client.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::store::{
    BlockingQuery, CatalogService, CheckKind, CheckStatus, HealthCheck, KvList, KvPair, ServiceHealth,
    ServiceRegistration, StoreClient,
};

/// Extra time granted to a blocking request beyond its long-poll wait.
const BLOCK_GRACE: Duration = Duration::from_secs(10);
/// Timeout applied to all non-blocking requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A store client speaking the Consul HTTP API.
pub struct HttpStore {
    client: reqwest::Client,
    addr: String,
}

/// A KV entry as returned by the store's HTTP API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiKvEntry {
    key: String,
    value: Option<String>,
    modify_index: u64,
}

/// A service as returned by the agent services endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiAgentService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    meta: std::collections::BTreeMap<String, String>,
}

/// A check as returned by the agent checks endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiAgentCheck {
    #[serde(rename = "CheckID")]
    check_id: String,
    #[serde(rename = "ServiceID", default)]
    service_id: String,
    status: CheckStatus,
    #[serde(default)]
    output: String,
}

impl HttpStore {
    /// Create a client for the store at the given address, e.g.
    /// `http://127.0.0.1:8500`.
    pub fn new(addr: &str) -> Result<Self> {
        let client = reqwest::Client::builder().build().context("error building store HTTP client")?;
        Ok(Self {
            client,
            addr: addr.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    fn decode_pair(entry: ApiKvEntry) -> Result<KvPair> {
        let value = match entry.value {
            Some(encoded) => base64::decode(&encoded).context("error decoding KV value from store")?,
            None => Vec::new(),
        };
        Ok(KvPair {
            key: entry.key,
            value,
            modify_index: entry.modify_index,
        })
    }

    fn index_header(response: &reqwest::Response) -> u64 {
        response
            .headers()
            .get("X-Consul-Index")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    }
}

#[async_trait]
impl StoreClient for HttpStore {
    async fn kv_get(&self, key: &str) -> Result<Option<KvPair>> {
        let response = self
            .client
            .get(self.url(&format!("/v1/kv/{}", key)))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("error querying KV entry")?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entries: Vec<ApiKvEntry> = response.error_for_status().context("KV get failed")?.json().await.context("error decoding KV response")?;
        entries.into_iter().next().map(Self::decode_pair).transpose()
    }

    async fn kv_put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.client
            .put(self.url(&format!("/v1/kv/{}", key)))
            .timeout(REQUEST_TIMEOUT)
            .body(value)
            .send()
            .await
            .context("error writing KV entry")?
            .error_for_status()
            .context("KV put failed")?;
        Ok(())
    }

    async fn kv_put_cas(&self, key: &str, value: Vec<u8>, modify_index: u64) -> Result<bool> {
        let body = self
            .client
            .put(self.url(&format!("/v1/kv/{}?cas={}", key, modify_index)))
            .timeout(REQUEST_TIMEOUT)
            .body(value)
            .send()
            .await
            .context("error writing KV entry")?
            .error_for_status()
            .context("KV CAS put failed")?
            .text()
            .await
            .context("error reading KV CAS response")?;
        Ok(body.trim() == "true")
    }

    async fn kv_delete(&self, key: &str) -> Result<()> {
        self.client
            .delete(self.url(&format!("/v1/kv/{}", key)))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("error deleting KV entry")?
            .error_for_status()
            .context("KV delete failed")?;
        Ok(())
    }

    async fn kv_list(&self, prefix: &str, block: Option<BlockingQuery>) -> Result<KvList> {
        let mut url = format!("{}?recurse=true", self.url(&format!("/v1/kv/{}", prefix)));
        let timeout = match block {
            Some(block) => {
                url.push_str(&format!("&index={}&wait={}s", block.index, block.wait.as_secs()));
                block.wait + BLOCK_GRACE
            }
            None => REQUEST_TIMEOUT,
        };
        let response = self.client.get(url).timeout(timeout).send().await.context("error listing KV prefix")?;
        let index = Self::index_header(&response);
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(KvList { index, pairs: Vec::new() });
        }
        let entries: Vec<ApiKvEntry> = response.error_for_status().context("KV list failed")?.json().await.context("error decoding KV list response")?;
        let pairs = entries.into_iter().map(Self::decode_pair).collect::<Result<Vec<_>>>()?;
        Ok(KvList { index, pairs })
    }

    async fn register_service(&self, registration: ServiceRegistration) -> Result<()> {
        let mut body = json!({
            "ID": registration.id,
            "Name": registration.name,
            "Tags": registration.tags,
            "Address": registration.address,
            "Port": registration.port,
            "Meta": registration.meta,
        });
        if let Some(check) = registration.check {
            let deregister_after = format!("{}s", check.deregister_after_seconds);
            let mut check_body = json!({ "DeregisterCriticalServiceAfter": deregister_after });
            match check.kind {
                CheckKind::Tcp => {
                    check_body["TCP"] = json!(check.target);
                    check_body["Interval"] = json!(format!("{}s", check.interval_seconds));
                }
                CheckKind::Grpc => {
                    check_body["GRPC"] = json!(check.target);
                    check_body["Interval"] = json!(format!("{}s", check.interval_seconds));
                }
                CheckKind::Ttl => {
                    check_body["TTL"] = json!(format!("{}s", check.ttl_seconds.unwrap_or(30)));
                }
            }
            body["Check"] = check_body;
        }
        self.client
            .put(self.url("/v1/agent/service/register"))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .context("error registering service")?
            .error_for_status()
            .context("service registration failed")?;
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> Result<()> {
        self.client
            .put(self.url(&format!("/v1/agent/service/deregister/{}", service_id)))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("error deregistering service")?
            .error_for_status()
            .context("service deregistration failed")?;
        Ok(())
    }

    async fn list_services(&self, tag: &str) -> Result<Vec<CatalogService>> {
        let services: HashMap<String, ApiAgentService> = self
            .client
            .get(self.url("/v1/agent/services"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("error listing services")?
            .error_for_status()
            .context("service listing failed")?
            .json()
            .await
            .context("error decoding service listing")?;
        let mut services: Vec<CatalogService> = services
            .into_values()
            .filter(|service| service.tags.iter().any(|t| t == tag))
            .map(|service| CatalogService {
                id: service.id,
                name: service.service,
                tags: service.tags,
                address: service.address,
                port: service.port,
                meta: service.meta,
            })
            .collect();
        services.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(services)
    }

    async fn service_health(&self, tag: &str) -> Result<Vec<ServiceHealth>> {
        let services = self.list_services(tag).await?;
        let checks: HashMap<String, ApiAgentCheck> = self
            .client
            .get(self.url("/v1/agent/checks"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("error listing checks")?
            .error_for_status()
            .context("check listing failed")?
            .json()
            .await
            .context("error decoding check listing")?;

        let mut by_service: HashMap<String, Vec<HealthCheck>> = HashMap::new();
        for check in checks.into_values() {
            by_service.entry(check.service_id.clone()).or_default().push(HealthCheck {
                check_id: check.check_id,
                service_id: check.service_id,
                status: check.status,
                output: check.output,
            });
        }
        Ok(services
            .into_iter()
            .map(|service| {
                let checks = by_service.remove(&service.id).unwrap_or_default();
                ServiceHealth { service, checks }
            })
            .collect())
    }

    async fn update_ttl_check(&self, service_id: &str, status: CheckStatus, output: &str) -> Result<()> {
        let status = match status {
            CheckStatus::Passing => "passing",
            CheckStatus::Warning => "warning",
            CheckStatus::Critical => "critical",
        };
        self.client
            .put(self.url(&format!("/v1/agent/check/update/service:{}", service_id)))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "Status": status, "Output": output }))
            .send()
            .await
            .context("error updating TTL check")?
            .error_for_status()
            .context("TTL check update failed")?;
        Ok(())
    }
}
