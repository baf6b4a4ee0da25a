//! Runtime configuration, loaded from environment variables under the
//! `AGENTCORE_` prefix. Grounded in the toolkit's `config.rs`: deliberately
//! minimal, hand-built, no TOML/YAML/`config`/`envy`/`figment` dependency —
//! just `std::env::var` with documented defaults.

use std::collections::HashMap;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_history: usize,
    pub max_iter: u32,
    pub queue_capacity: usize,
    pub queue_workers: usize,
    pub llm_timeout_secs: u64,
    pub sse_heartbeat_secs: u64,
    pub push_timeout_secs: u64,
    pub push_max_retries: u32,
    pub http_idle_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub task_retention_secs: u64,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub auth_bearer_token: Option<String>,
    /// Anything under `AGENTCORE_EXT_*`, captured verbatim — the "extension
    /// mechanism that layers over the base configuration" from §6, without
    /// inventing a plugin system.
    pub extensions: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            max_history: 20,
            max_iter: 10,
            queue_capacity: 100,
            queue_workers: 4,
            llm_timeout_secs: 30,
            sse_heartbeat_secs: 1,
            push_timeout_secs: 30,
            push_max_retries: 3,
            http_idle_timeout_secs: 120,
            cleanup_interval_secs: 30,
            task_retention_secs: 3600,
            tls_cert_path: None,
            tls_key_path: None,
            auth_bearer_token: None,
            extensions: HashMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parsed("AGENTCORE_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_history: env_parsed("AGENTCORE_MAX_HISTORY").unwrap_or(defaults.max_history),
            max_iter: env_parsed("AGENTCORE_MAX_ITER").unwrap_or(defaults.max_iter),
            queue_capacity: env_parsed("AGENTCORE_QUEUE_CAPACITY").unwrap_or(defaults.queue_capacity),
            queue_workers: env_parsed("AGENTCORE_QUEUE_WORKERS").unwrap_or(defaults.queue_workers),
            llm_timeout_secs: env_parsed("AGENTCORE_LLM_TIMEOUT_SECS").unwrap_or(defaults.llm_timeout_secs),
            sse_heartbeat_secs: env_parsed("AGENTCORE_SSE_HEARTBEAT_SECS").unwrap_or(defaults.sse_heartbeat_secs),
            push_timeout_secs: env_parsed("AGENTCORE_PUSH_TIMEOUT_SECS").unwrap_or(defaults.push_timeout_secs),
            push_max_retries: env_parsed("AGENTCORE_PUSH_MAX_RETRIES").unwrap_or(defaults.push_max_retries),
            http_idle_timeout_secs: env_parsed("AGENTCORE_HTTP_IDLE_TIMEOUT_SECS").unwrap_or(defaults.http_idle_timeout_secs),
            cleanup_interval_secs: env_parsed("AGENTCORE_CLEANUP_INTERVAL_SECS").unwrap_or(defaults.cleanup_interval_secs),
            task_retention_secs: env_parsed("AGENTCORE_TASK_RETENTION_SECS").unwrap_or(defaults.task_retention_secs),
            tls_cert_path: std::env::var("AGENTCORE_TLS_CERT_PATH").ok(),
            tls_key_path: std::env::var("AGENTCORE_TLS_KEY_PATH").ok(),
            auth_bearer_token: std::env::var("AGENTCORE_AUTH_BEARER_TOKEN").ok(),
            extensions: collect_extensions(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn collect_extensions() -> HashMap<String, String> {
    std::env::vars()
        .filter_map(|(k, v)| k.strip_prefix("AGENTCORE_EXT_").map(|suffix| (suffix.to_string(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.max_history, 20);
        assert_eq!(config.max_iter, 10);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.queue_workers, 4);
        assert!(config.auth_bearer_token.is_none());
    }
}
