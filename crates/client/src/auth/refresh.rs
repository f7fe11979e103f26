//! Single-flight credential renewal.
//!
//! Many concurrent requests can receive 401 at the same moment when the
//! access token expires. The coordinator serializes them onto one renewal
//! call: whoever arrives while an operation is outstanding awaits that same
//! operation and observes its outcome.

use std::sync::Arc;
use std::time::Duration;

use forgelink_domain::{ApiEnvelope, ClientError};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::store::TokenStore;

type RenewalFuture = Shared<BoxFuture<'static, Result<(), ClientError>>>;

/// Ensures at most one in-flight credential renewal process-wide.
pub struct RefreshCoordinator {
    http: reqwest::Client,
    refresh_url: String,
    timeout: Duration,
    store: Arc<dyn TokenStore>,
    in_flight: Arc<Mutex<Option<RenewalFuture>>>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        refresh_url: String,
        timeout: Duration,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self { http, refresh_url, timeout, store, in_flight: Arc::new(Mutex::new(None)) }
    }

    /// Renew the access credential, joining an outstanding renewal if one
    /// exists.
    ///
    /// # Errors
    /// Returns [`ClientError::AuthRenewalFailed`] when the renewal endpoint
    /// rejects the refresh credential (the session is cleared as a side
    /// effect), or a transient classification when the renewal call itself
    /// fails without invalidating the session.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let renewal = {
            let mut guard = self.in_flight.lock();
            if let Some(existing) = guard.as_ref() {
                debug!("joining outstanding credential renewal");
                existing.clone()
            } else {
                let fresh = Self::renew(
                    self.http.clone(),
                    self.refresh_url.clone(),
                    self.timeout,
                    self.store.clone(),
                    self.in_flight.clone(),
                )
                .boxed()
                .shared();
                *guard = Some(fresh.clone());
                fresh
            }
        };
        renewal.await
    }

    /// Whether a renewal operation is currently outstanding.
    pub fn in_flight(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    async fn renew(
        http: reqwest::Client,
        url: String,
        timeout: Duration,
        store: Arc<dyn TokenStore>,
        marker: Arc<Mutex<Option<RenewalFuture>>>,
    ) -> Result<(), ClientError> {
        let result = Self::renew_inner(&http, &url, timeout, store.as_ref()).await;

        // Clear the marker first so a later expiry can start a fresh renewal
        // while current waiters consume this outcome.
        *marker.lock() = None;

        match &result {
            Ok(()) => info!("access credential renewed"),
            Err(ClientError::AuthRenewalFailed(reason)) => {
                warn!(reason, "credential renewal rejected, clearing session");
                store.clear_session().await;
            }
            Err(err) => warn!(error = %err, "credential renewal failed transiently"),
        }
        result
    }

    async fn renew_inner(
        http: &reqwest::Client,
        url: &str,
        timeout: Duration,
        store: &dyn TokenStore,
    ) -> Result<(), ClientError> {
        // The refresh credential rides along implicitly as an HTTP-only
        // cookie; nothing is attached here beyond the transport defaults.
        let send = http.post(url).send();
        let response = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) if err.is_timeout() => return Err(ClientError::Timeout(timeout)),
            Ok(Err(_)) => return Err(ClientError::Offline),
            Err(_) => return Err(ClientError::Timeout(timeout)),
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ClientError::AuthRenewalFailed(format!(
                "renewal endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Server { status: status.as_u16(), message });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ClientError::MalformedResponse(err.to_string()))?;
        let envelope = ApiEnvelope::from_value(body);
        let token = envelope
            .data
            .get("accessToken")
            .or_else(|| envelope.data.get("token"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                ClientError::MalformedResponse("renewal response carried no access token".into())
            })?;

        store.set_access_token(token.to_owned()).await;
        Ok(())
    }
}
