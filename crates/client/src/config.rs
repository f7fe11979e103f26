//! Client configuration.

use std::time::Duration;

use forgelink_domain::constants;

use crate::http::TimeoutClass;

/// Configuration for the request executor and its collaborators.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL prefix for every endpoint (e.g., "https://api.forgelink.io/v1")
    pub base_url: String,
    /// Path of the credential-renewal endpoint, relative to `base_url`
    pub refresh_path: String,
    /// Path of the CSRF-token-issuing endpoint, relative to `base_url`
    pub csrf_path: String,
    /// Upper bound on the wait for ordinary requests
    pub standard_timeout: Duration,
    /// Upper bound on the wait for uploads
    pub upload_timeout: Duration,
    /// Upper bound on the wait for auxiliary calls (health, CSRF issuance)
    pub auxiliary_timeout: Duration,
    /// Upper bound on the wait for credential renewal
    pub refresh_timeout: Duration,
    /// How long cached read results stay servable
    pub cache_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            csrf_path: "/auth/csrf-token".to_string(),
            standard_timeout: Duration::from_secs(constants::STANDARD_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(constants::UPLOAD_TIMEOUT_SECS),
            auxiliary_timeout: Duration::from_secs(constants::AUXILIARY_TIMEOUT_SECS),
            refresh_timeout: Duration::from_secs(constants::REFRESH_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(constants::CACHE_TTL_SECS),
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at the given base URL, defaults elsewhere.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    /// Resolve the wait bound for a timeout class.
    pub fn timeout_for(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Standard => self.standard_timeout,
            TimeoutClass::Upload => self.upload_timeout,
            TimeoutClass::Auxiliary => self.auxiliary_timeout,
        }
    }

    /// Absolute URL of the credential-renewal endpoint.
    pub fn refresh_url(&self) -> String {
        format!("{}{}", self.base_url, self.refresh_path)
    }

    /// Absolute URL of the CSRF-token-issuing endpoint.
    pub fn csrf_url(&self) -> String {
        format!("{}{}", self.base_url, self.csrf_path)
    }

    /// Origin (scheme + authority) of the configured base URL.
    ///
    /// Reported alongside cross-origin classification so a policy
    /// misconfiguration names both ends.
    pub fn origin(&self) -> String {
        url::Url::parse(&self.base_url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_follow_the_contract() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout_for(TimeoutClass::Standard), Duration::from_secs(20));
        assert_eq!(config.timeout_for(TimeoutClass::Upload), Duration::from_secs(30));
        assert_eq!(config.timeout_for(TimeoutClass::Auxiliary), Duration::from_secs(5));
    }

    #[test]
    fn origin_strips_path_and_query() {
        let config = ClientConfig::new("https://api.forgelink.io/v1");
        assert_eq!(config.origin(), "https://api.forgelink.io");
    }

    #[test]
    fn auxiliary_urls_join_base_and_path() {
        let config = ClientConfig::new("https://api.forgelink.io/v1");
        assert_eq!(config.refresh_url(), "https://api.forgelink.io/v1/auth/refresh");
        assert_eq!(config.csrf_url(), "https://api.forgelink.io/v1/auth/csrf-token");
    }
}
