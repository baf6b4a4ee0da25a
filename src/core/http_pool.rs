//! Outbound HTTP client pool shared by the two components that make
//! repeated calls to a small, stable set of hosts: the LLM provider
//! (`http_provider.rs`) and the push-notification dispatcher (`push.rs`,
//! C7). Each destination host gets one connection-pooled client, built
//! once from `ServerConfig::http_idle_timeout_secs` the first time that
//! host is seen, and reused for the life of the process.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::time::Duration;

static CLIENT_POOL: Lazy<DashMap<String, reqwest::Client>> = Lazy::new(DashMap::new);

/// Returns the shared client for `base_url`, building one with
/// `idle_timeout` if this is the first call for that host. Later calls for
/// the same host ignore `idle_timeout` and return the client built on first
/// use — the pool is keyed on host, not on the requested timeout, so two
/// callers racing to initialize the same host converge on one client.
pub fn get_or_create_client(base_url: &str, idle_timeout: Duration) -> reqwest::Client {
    CLIENT_POOL
        .entry(base_url.to_string())
        .or_insert_with(|| build_client(idle_timeout))
        .clone()
}

fn build_client(idle_timeout: Duration) -> reqwest::Client {
    reqwest::ClientBuilder::new()
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Some(idle_timeout))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build pooled HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_host_reuses_the_client_built_on_first_call() {
        let host = "https://pool-test-a.example.com";
        let _first = get_or_create_client(host, Duration::from_secs(90));
        assert!(CLIENT_POOL.contains_key(host));
        // A second call with a different idle_timeout does not rebuild —
        // the cache is keyed on host alone.
        let _second = get_or_create_client(host, Duration::from_secs(5));
        assert!(CLIENT_POOL.contains_key(host));
    }

    #[test]
    fn distinct_hosts_get_distinct_pool_entries() {
        let provider_host = "https://pool-test-provider.example.com";
        let webhook_host = "https://pool-test-webhook.example.com";
        let _provider_client = get_or_create_client(provider_host, Duration::from_secs(120));
        let _webhook_client = get_or_create_client(webhook_host, Duration::from_secs(30));
        assert!(CLIENT_POOL.contains_key(provider_host));
        assert!(CLIENT_POOL.contains_key(webhook_host));
    }

    #[test]
    fn zero_idle_timeout_still_builds_a_usable_client() {
        let client = build_client(Duration::from_secs(0));
        assert!(std::ptr::addr_of!(client) as usize != 0);
    }
}
