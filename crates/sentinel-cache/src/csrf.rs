//! CSRF protection, double-submit style. Tokens are opaque 256-bit values
//! stored in the cache under `csrf:token:<opaque>` when issued, and
//! delivered to the client as both a cookie and a response header;
//! validation checks that the cookie and header values the caller echoes
//! back actually match (constant-time) and that the token was genuinely
//! issued by this server.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::{keys, Cache, CacheResult};

/// TTL for an issued CSRF token.
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

pub struct CsrfGuard {
    cache: Arc<dyn Cache>,
    trusted_origins: Vec<String>,
    referer_check_enabled: bool,
}

impl CsrfGuard {
    pub fn new(cache: Arc<dyn Cache>, trusted_origins: Vec<String>) -> Self {
        Self {
            cache,
            trusted_origins,
            referer_check_enabled: true,
        }
    }

    pub fn with_referer_check(mut self, enabled: bool) -> Self {
        self.referer_check_enabled = enabled;
        self
    }

    /// Issue a fresh opaque 256-bit token and remember it for `TOKEN_TTL`.
    pub async fn issue(&self) -> CacheResult<String> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.cache
            .set(&keys::csrf_token(&token), Vec::new(), TOKEN_TTL)
            .await?;
        Ok(token)
    }

    /// Validate a double-submit pair: the token the client's cookie carries
    /// against the token its header carries. The two are compared in
    /// constant time (the same pattern `auth::verifiers_match` uses for
    /// password verifiers), then the matching token is checked against the
    /// cache to confirm this server actually issued it.
    pub async fn validate(&self, cookie_token: &str, header_token: &str) -> CacheResult<bool> {
        if cookie_token.is_empty() || header_token.is_empty() {
            return Ok(false);
        }
        let matches = bool::from(cookie_token.as_bytes().ct_eq(header_token.as_bytes()));
        if !matches {
            return Ok(false);
        }
        self.cache.exists(&keys::csrf_token(cookie_token)).await
    }

    pub async fn invalidate(&self, token: &str) -> CacheResult<()> {
        self.cache.delete(&keys::csrf_token(token)).await
    }

    /// Validate the `Origin`/`Referer` header against the trusted list.
    /// Always passes when the referer check has been disabled for this
    /// deployment.
    pub fn referer_is_trusted(&self, referer: Option<&str>) -> bool {
        if !self.referer_check_enabled {
            return true;
        }
        match referer {
            Some(origin) => self
                .trusted_origins
                .iter()
                .any(|trusted| origin.starts_with(trusted.as_str())),
            None => false,
        }
    }
}

/// HTTP methods that are exempt from CSRF validation.
pub fn is_safe_method(method: &str) -> bool {
    matches!(method.to_ascii_uppercase().as_str(), "GET" | "HEAD" | "OPTIONS")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;

    fn guard() -> CsrfGuard {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        CsrfGuard::new(cache, vec!["https://app.example.com".into()])
    }

    #[tokio::test]
    async fn issued_token_validates_when_cookie_and_header_agree() {
        let guard = guard();
        let token = guard.issue().await.unwrap();
        assert!(guard.validate(&token, &token).await.unwrap());
    }

    #[tokio::test]
    async fn mismatched_cookie_and_header_are_rejected() {
        let guard = guard();
        let token = guard.issue().await.unwrap();
        assert!(!guard.validate(&token, "some-other-token").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let guard = guard();
        assert!(!guard.validate("deadbeef", "deadbeef").await.unwrap());
    }

    #[tokio::test]
    async fn invalidated_token_is_rejected() {
        let guard = guard();
        let token = guard.issue().await.unwrap();
        guard.invalidate(&token).await.unwrap();
        assert!(!guard.validate(&token, &token).await.unwrap());
    }

    #[test]
    fn referer_must_match_trusted_origin() {
        let guard = guard();
        assert!(guard.referer_is_trusted(Some("https://app.example.com/dashboard")));
        assert!(!guard.referer_is_trusted(Some("https://evil.example.com")));
        assert!(!guard.referer_is_trusted(None));
    }

    #[test]
    fn referer_check_can_be_disabled() {
        let guard = guard().with_referer_check(false);
        assert!(guard.referer_is_trusted(None));
    }

    #[test]
    fn safe_methods_are_recognized() {
        assert!(is_safe_method("get"));
        assert!(is_safe_method("HEAD"));
        assert!(!is_safe_method("POST"));
    }
}
