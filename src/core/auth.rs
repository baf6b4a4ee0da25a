//! Optional bearer-token authentication for the JSON-RPC endpoint (§4.6).
//! Grounded in the toolkit's `mcp_server_builder_utils::AuthConfig::Bearer`
//! validation: SHA-256 the expected and provided tokens, then compare with
//! `subtle::ConstantTimeEq` so the optimizer cannot short-circuit a `==`
//! and leak timing information about how many leading bytes matched.
//!
//! Narrower than the teacher's `AuthConfig`: no Basic-auth variant, no
//! hand-rolled base64 decoder, no IP allowlist — §1 places OAuth/OIDC/JWKS
//! validation out of scope, so the only in-scope mechanism is a single
//! shared static bearer token, not a full authorization subsystem.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Validates an `Authorization` header against configured credentials.
pub trait Authenticator: Send + Sync {
    fn validate(&self, header: Option<&str>) -> bool;
}

/// No authentication configured: every request passes.
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn validate(&self, _header: Option<&str>) -> bool {
        true
    }
}

pub struct BearerAuthenticator {
    expected_hash: [u8; 32],
}

impl BearerAuthenticator {
    pub fn new(token: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(token.as_ref());
        let mut expected_hash = [0u8; 32];
        expected_hash.copy_from_slice(&digest);
        Self { expected_hash }
    }
}

impl Authenticator for BearerAuthenticator {
    fn validate(&self, header: Option<&str>) -> bool {
        let Some(header) = header else { return false };
        let Some(token) = header.strip_prefix("Bearer ") else { return false };
        let provided_hash = Sha256::digest(token.as_bytes());
        self.expected_hash.ct_eq(&provided_hash).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_token_passes() {
        let auth = BearerAuthenticator::new("secret-token");
        assert!(auth.validate(Some("Bearer secret-token")));
    }

    #[test]
    fn wrong_token_fails() {
        let auth = BearerAuthenticator::new("secret-token");
        assert!(!auth.validate(Some("Bearer wrong-token")));
    }

    #[test]
    fn missing_header_fails() {
        let auth = BearerAuthenticator::new("secret-token");
        assert!(!auth.validate(None));
    }

    #[test]
    fn no_auth_always_passes() {
        assert!(NoAuth.validate(None));
    }
}
