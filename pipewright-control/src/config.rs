//! Runtime configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The server's logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,
    /// The name of the cluster this control plane manages by default.
    pub cluster_name: String,

    /// The KV prefix under which all control-plane state is stored.
    #[serde(default = "Config::default_kv_prefix")]
    pub kv_prefix: String,
    /// The address of the KV/catalog store; the embedded in-memory store is
    /// used when unset.
    #[serde(default)]
    pub store_addr: Option<String>,

    /// Whether the watch engine starts at all.
    #[serde(default = "Config::default_true")]
    pub watch_enabled: bool,
    /// The delay applied before the watch tasks issue their first query.
    #[serde(default)]
    pub watch_startup_delay_seconds: u64,
    /// The polling cadence of the service-health watch.
    #[serde(default = "Config::default_health_watch_interval_seconds")]
    pub health_watch_interval_seconds: u64,
    /// The fixed delay before a failed watch is replaced with a fresh one.
    #[serde(default = "Config::default_watch_restart_delay_seconds")]
    pub watch_restart_delay_seconds: u64,
    /// The long-poll wait passed to blocking KV queries.
    #[serde(default = "Config::default_watch_wait_seconds")]
    pub watch_wait_seconds: u64,

    /// The window after registration during which an instance is never
    /// reclaimed by zombie cleanup, regardless of its health.
    #[serde(default = "Config::default_module_zombie_grace_seconds")]
    pub module_zombie_grace_seconds: u64,
}

impl Config {
    /// Create a new config instance.
    ///
    /// Currently this routine just parses the runtime environment and builds
    /// the application config from that. In the future, this may take into
    /// account an optional config file as well.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        envy::from_env().context("error building config from env")
    }

    /// The delay before the watch tasks issue their first query.
    pub fn watch_startup_delay(&self) -> Duration {
        Duration::from_secs(self.watch_startup_delay_seconds)
    }

    /// The polling cadence of the service-health watch.
    pub fn health_watch_interval(&self) -> Duration {
        Duration::from_secs(self.health_watch_interval_seconds)
    }

    /// The fixed delay before a failed watch is replaced.
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_seconds)
    }

    /// The long-poll wait passed to blocking KV queries.
    pub fn watch_wait(&self) -> Duration {
        Duration::from_secs(self.watch_wait_seconds)
    }

    /// The zombie-cleanup grace window.
    pub fn module_zombie_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.module_zombie_grace_seconds as i64)
    }

    fn default_kv_prefix() -> String {
        "pipeline".into()
    }

    fn default_true() -> bool {
        true
    }

    fn default_health_watch_interval_seconds() -> u64 {
        10
    }

    fn default_watch_restart_delay_seconds() -> u64 {
        5
    }

    fn default_watch_wait_seconds() -> u64 {
        30
    }

    fn default_module_zombie_grace_seconds() -> u64 {
        120
    }
}

#[cfg(test)]
mod config_test {
    use anyhow::Result;

    use super::*;

    #[test]
    fn config_deserializes_from_full_env() -> Result<()> {
        let config: Config = envy::from_iter(vec![
            ("RUST_LOG".into(), "error".into()),
            ("CLUSTER_NAME".into(), "default".into()),
            ("KV_PREFIX".into(), "staging".into()),
            ("STORE_ADDR".into(), "http://127.0.0.1:8500".into()),
            ("WATCH_ENABLED".into(), "false".into()),
            ("WATCH_STARTUP_DELAY_SECONDS".into(), "3".into()),
            ("HEALTH_WATCH_INTERVAL_SECONDS".into(), "30".into()),
            ("WATCH_RESTART_DELAY_SECONDS".into(), "7".into()),
            ("WATCH_WAIT_SECONDS".into(), "60".into()),
            ("MODULE_ZOMBIE_GRACE_SECONDS".into(), "600".into()),
        ])?;

        assert!(config.rust_log == "error", "unexpected value parsed for RUST_LOG, got {}", config.rust_log);
        assert!(config.cluster_name == "default", "unexpected value parsed for CLUSTER_NAME, got {}", config.cluster_name);
        assert!(config.kv_prefix == "staging", "unexpected value parsed for KV_PREFIX, got {}", config.kv_prefix);
        assert!(
            config.store_addr.as_deref() == Some("http://127.0.0.1:8500"),
            "unexpected value parsed for STORE_ADDR, got {:?}",
            config.store_addr
        );
        assert!(!config.watch_enabled, "unexpected value parsed for WATCH_ENABLED");
        assert!(
            config.watch_startup_delay_seconds == 3,
            "unexpected value parsed for WATCH_STARTUP_DELAY_SECONDS, got {}",
            config.watch_startup_delay_seconds
        );
        assert!(
            config.health_watch_interval_seconds == 30,
            "unexpected value parsed for HEALTH_WATCH_INTERVAL_SECONDS, got {}",
            config.health_watch_interval_seconds
        );
        assert!(
            config.watch_restart_delay_seconds == 7,
            "unexpected value parsed for WATCH_RESTART_DELAY_SECONDS, got {}",
            config.watch_restart_delay_seconds
        );
        assert!(config.watch_wait_seconds == 60, "unexpected value parsed for WATCH_WAIT_SECONDS, got {}", config.watch_wait_seconds);
        assert!(
            config.module_zombie_grace_seconds == 600,
            "unexpected value parsed for MODULE_ZOMBIE_GRACE_SECONDS, got {}",
            config.module_zombie_grace_seconds
        );

        Ok(())
    }

    #[test]
    fn config_deserializes_from_sparse_env() -> Result<()> {
        let config: Config = envy::from_iter(vec![
            ("RUST_LOG".into(), "error".into()),
            ("CLUSTER_NAME".into(), "default".into()),
        ])?;

        assert!(config.kv_prefix == "pipeline", "unexpected default for KV_PREFIX, got {}", config.kv_prefix);
        assert!(config.store_addr.is_none(), "unexpected default for STORE_ADDR, got {:?}", config.store_addr);
        assert!(config.watch_enabled, "unexpected default for WATCH_ENABLED");
        assert!(
            config.watch_startup_delay_seconds == 0,
            "unexpected default for WATCH_STARTUP_DELAY_SECONDS, got {}",
            config.watch_startup_delay_seconds
        );
        assert!(
            config.health_watch_interval_seconds == 10,
            "unexpected default for HEALTH_WATCH_INTERVAL_SECONDS, got {}",
            config.health_watch_interval_seconds
        );
        assert!(
            config.watch_restart_delay_seconds == 5,
            "unexpected default for WATCH_RESTART_DELAY_SECONDS, got {}",
            config.watch_restart_delay_seconds
        );
        assert!(config.watch_wait_seconds == 30, "unexpected default for WATCH_WAIT_SECONDS, got {}", config.watch_wait_seconds);
        assert!(
            config.module_zombie_grace_seconds == 120,
            "unexpected default for MODULE_ZOMBIE_GRACE_SECONDS, got {}",
            config.module_zombie_grace_seconds
        );

        Ok(())
    }
}
