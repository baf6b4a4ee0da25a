//! Push Notification Dispatcher (C7): on a task state change, asynchronously
//! POST the task snapshot to every registered webhook (§4.7). Grounded in
//! `http_pool.rs` for the pooled-client-per-destination pattern and in
//! `auth.rs`'s constant-time-compare discipline for the HMAC signature.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

use crate::core::http_pool::get_or_create_client;
use crate::core::task::Task;

type HmacSha256 = Hmac<Sha256>;

pub struct PushDispatcher {
    timeout: Duration,
    max_retries: u32,
    idle_timeout: Duration,
}

impl PushDispatcher {
    /// `idle_timeout` seeds the shared pooled client the first time a given
    /// webhook host is seen (see `http_pool::get_or_create_client`) — pass
    /// `ServerConfig::http_idle_timeout_secs`.
    pub fn new(timeout: Duration, max_retries: u32, idle_timeout: Duration) -> Self {
        Self { timeout, max_retries, idle_timeout }
    }

    /// Fires a webhook POST for `task` to `url`, signing the body with
    /// `secret` when one is configured. Failures are logged and swallowed —
    /// per §4.7 and §7, a push failure never affects the task's outcome.
    pub async fn dispatch(&self, url: &str, secret: Option<&str>, task: &Task) {
        let body = match serde_json::to_vec(task) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("push: failed to serialize task {}: {}", task.id, e);
                return;
            }
        };

        let client = get_or_create_client(url, self.idle_timeout);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = client.post(url).timeout(self.timeout).body(body.clone());
            if let Some(secret) = secret {
                if let Some(signature) = sign(secret, &body) {
                    request = request.header("X-AgentCore-Signature", signature);
                }
            }

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    log::debug!("push: delivered task {} state to {}", task.id, url);
                    return;
                }
                Ok(resp) => {
                    log::warn!(
                        "push: webhook {} responded with {} (attempt {}/{})",
                        url,
                        resp.status(),
                        attempt,
                        self.max_retries
                    );
                }
                Err(e) => {
                    log::warn!(
                        "push: webhook {} request failed: {} (attempt {}/{})",
                        url,
                        e,
                        attempt,
                        self.max_retries
                    );
                }
            }

            if attempt >= self.max_retries {
                log::warn!("push: giving up on webhook {} after {} attempts", url, attempt);
                return;
            }
        }
    }
}

/// HMAC-SHA256 of the body, hex-encoded, attached out-of-band from task
/// status per §4.7 ("delivered out-of-band from task status").
fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    let result = mac.finalize().into_bytes();
    Some(hex_encode(&result))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_is_deterministic() {
        let body = b"{\"status\":{\"state\":\"completed\"}}";
        let a = sign("shared-secret", body);
        let b = sign("shared-secret", body);
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let body = b"payload";
        let a = sign("secret-a", body);
        let b = sign("secret-b", body);
        assert_ne!(a, b);
    }
}
