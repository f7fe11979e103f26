//! The request executor.
//!
//! Executes one logical request to completion: cache consultation,
//! credential and CSRF attachment, dispatch with a hard wait bound, outcome
//! classification, retry with exponential backoff, and a single
//! refresh-and-retry cycle on credential expiry.

use std::sync::Arc;
use std::time::Duration;

use forgelink_domain::constants::CSRF_HEADER;
use forgelink_domain::{ApiEnvelope, ClientError};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::request::{RequestDescriptor, ResponseType};
use crate::auth::{RefreshCoordinator, TokenStore};
use crate::cache::ResponseCache;
use crate::config::ClientConfig;
use crate::csrf::CsrfTokenProvider;
use crate::notify::{Notifier, TracingNotifier};

/// Structured result of a successful request.
#[derive(Debug, Clone)]
pub enum ApiResponse {
    /// Parsed JSON body, normalized into the canonical envelope.
    Json(ApiEnvelope),
    /// Raw bytes for binary response types.
    Binary(Vec<u8>),
    /// Bodyless success (204).
    Empty,
}

impl ApiResponse {
    /// Deserialize the payload into a concrete type.
    ///
    /// # Errors
    /// Returns [`ClientError::MalformedResponse`] on shape mismatch or when
    /// called on a binary response.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        match self {
            Self::Json(envelope) => envelope.parse(),
            Self::Empty => ApiEnvelope::empty().parse(),
            Self::Binary(_) => {
                Err(ClientError::MalformedResponse("binary response has no JSON payload".into()))
            }
        }
    }

    /// Raw bytes of a binary response.
    ///
    /// # Errors
    /// Returns [`ClientError::MalformedResponse`] for JSON responses.
    pub fn into_bytes(self) -> Result<Vec<u8>, ClientError> {
        match self {
            Self::Binary(bytes) => Ok(bytes),
            Self::Empty => Ok(Vec::new()),
            Self::Json(_) => {
                Err(ClientError::MalformedResponse("structured response is not binary".into()))
            }
        }
    }
}

/// Builds, sends, retries, and classifies the outcome of logical requests.
pub struct RequestExecutor {
    http: reqwest::Client,
    config: ClientConfig,
    cache: Arc<ResponseCache>,
    csrf: Arc<CsrfTokenProvider>,
    refresh: Arc<RefreshCoordinator>,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
}

impl RequestExecutor {
    /// Create an executor with the default notifier.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        Self::builder().config(config).tokens(tokens).build()
    }

    /// Start building an executor.
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    /// The response cache, for embedders that need explicit invalidation.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The CSRF provider, for cookie-sourced priming.
    pub fn csrf(&self) -> &CsrfTokenProvider {
        &self.csrf
    }

    /// The refresh coordinator shared by every request.
    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// Execute one logical request to completion.
    ///
    /// Terminal failures produce exactly one user-facing notification,
    /// never one per retry attempt.
    ///
    /// # Errors
    /// A classified [`ClientError`] per the outcome taxonomy.
    #[instrument(skip(self, descriptor), fields(method = %descriptor.method, path = %descriptor.path))]
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse, ClientError> {
        let result = self.execute_inner(descriptor).await;
        if let Err(err) = &result {
            self.notifier.notify(err);
        }
        result
    }

    /// Typed GET returning the deserialized payload.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(&RequestDescriptor::get(path)).await?.json()
    }

    /// Typed POST returning the deserialized payload.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body)
            .map_err(|err| ClientError::Config(format!("unserializable body: {err}")))?;
        self.execute(&RequestDescriptor::post(path, body)).await?.json()
    }

    /// Typed PUT returning the deserialized payload.
    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body)
            .map_err(|err| ClientError::Config(format!("unserializable body: {err}")))?;
        self.execute(&RequestDescriptor::put(path, body)).await?.json()
    }

    /// Typed PATCH returning the deserialized payload.
    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body)
            .map_err(|err| ClientError::Config(format!("unserializable body: {err}")))?;
        self.execute(&RequestDescriptor::patch(path, body)).await?.json()
    }

    /// DELETE, discarding any payload.
    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.execute(&RequestDescriptor::delete(path)).await?;
        Ok(())
    }

    /// Binary download, bypassing the cache.
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        self.execute(&RequestDescriptor::get(path).binary()).await?.into_bytes()
    }

    /// Upload with the longer wait bound.
    pub async fn upload<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body)
            .map_err(|err| ClientError::Config(format!("unserializable body: {err}")))?;
        self.execute(&RequestDescriptor::post(path, body).upload()).await?.json()
    }

    /// Probe backend health with the short auxiliary wait bound.
    ///
    /// Unreachable-but-answering backends report `Ok(false)` rather than an
    /// error, and no user notification is emitted.
    ///
    /// # Errors
    /// Returns transport-level failures (timeout, offline).
    pub async fn health_check(&self) -> Result<bool, ClientError> {
        let descriptor = RequestDescriptor::get("/health").skip_auth().auxiliary().retry_budget(0);
        match self.execute_inner(&descriptor).await {
            Ok(_) => Ok(true),
            Err(ClientError::Server { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn execute_inner(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<ApiResponse, ClientError> {
        if descriptor.is_cacheable() {
            if let Some(hit) = self.cache.get(&descriptor.cache_key()) {
                return Ok(ApiResponse::Json(ApiEnvelope::from_value(hit)));
            }
        }

        let timeout = self.config.timeout_for(descriptor.timeout_class);
        let mut attempt: u32 = 0;
        let mut refreshed = false;
        let mut csrf_retried = false;

        loop {
            // Headers are re-resolved on every pass so a renewed token or
            // CSRF value is picked up before resending.
            let request = self.build_request(descriptor).await?;

            let response = match tokio::time::timeout(timeout, request.send()).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    let classified = self.classify_transport(&err, timeout);
                    if classified.is_retryable() && attempt < descriptor.retry_budget {
                        self.backoff(descriptor, attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(classified);
                }
                Err(_) => {
                    if attempt < descriptor.retry_budget {
                        self.backoff(descriptor, attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ClientError::Timeout(timeout));
                }
            };

            let status = response.status();
            debug!(%status, attempt, "received response");

            if status.is_success() {
                return self.finish_success(descriptor, status, response).await;
            }

            match status {
                StatusCode::UNAUTHORIZED if !descriptor.skip_auth && !refreshed => {
                    refreshed = true;
                    // Single refresh-and-retry cycle; renewal failures
                    // propagate (AuthRenewalFailed already cleared the
                    // session).
                    self.refresh.refresh().await?;
                }
                StatusCode::UNAUTHORIZED => return Err(ClientError::AuthExpired),
                StatusCode::TOO_MANY_REQUESTS => {
                    // Rate limiting must never be amplified by retry.
                    let reset_after = parse_retry_after(&response);
                    return Err(ClientError::RateLimited { reset_after });
                }
                StatusCode::FORBIDDEN => {
                    let body = response.text().await.unwrap_or_default();
                    if is_csrf_rejection(&body) {
                        if !descriptor.skip_auth && !csrf_retried {
                            csrf_retried = true;
                            self.csrf.invalidate();
                            continue;
                        }
                        return Err(ClientError::CsrfRejected);
                    }
                    return Err(ClientError::ValidationRejected {
                        status: status.as_u16(),
                        message: safe_message(&body),
                    });
                }
                status if status.is_server_error() => {
                    if attempt < descriptor.retry_budget {
                        warn!(%status, attempt, "server error, backing off");
                        self.backoff(descriptor, attempt).await;
                        attempt += 1;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(ClientError::Server {
                        status: status.as_u16(),
                        message: safe_message(&body),
                    });
                }
                status => {
                    // Client errors are not transient.
                    let body = response.text().await.unwrap_or_default();
                    return Err(ClientError::ValidationRejected {
                        status: status.as_u16(),
                        message: safe_message(&body),
                    });
                }
            }
        }
    }

    async fn build_request(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        let url = format!("{}{}", self.config.base_url, descriptor.path);
        let mut request = self.http.request(descriptor.method.clone(), &url);

        if !descriptor.query.is_empty() {
            request = request.query(&descriptor.query);
        }

        if !descriptor.skip_auth {
            if let Some(token) = self.tokens.access_token().await {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            if descriptor.is_mutating() {
                let csrf = self.csrf.token().await?;
                request = request.header(CSRF_HEADER, csrf);
            }
        }

        for (name, value) in &descriptor.headers {
            request = request.header(name, value);
        }

        if let Some(body) = &descriptor.body {
            request = request.json(body);
        }

        Ok(request)
    }

    async fn finish_success(
        &self,
        descriptor: &RequestDescriptor,
        status: StatusCode,
        response: reqwest::Response,
    ) -> Result<ApiResponse, ClientError> {
        if descriptor.is_mutating() {
            // Invalidation completes before the response is returned so a
            // follow-up read observes it.
            self.cache.invalidate_prefix(descriptor.resource_prefix());
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(ApiResponse::Empty);
        }

        if descriptor.response_type == ResponseType::Binary {
            let bytes = response
                .bytes()
                .await
                .map_err(|err| ClientError::MalformedResponse(err.to_string()))?;
            return Ok(ApiResponse::Binary(bytes.to_vec()));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|err| ClientError::MalformedResponse(err.to_string()))?;

        if descriptor.is_cacheable() {
            self.cache.insert(descriptor.cache_key(), value.clone());
        }

        Ok(ApiResponse::Json(ApiEnvelope::from_value(value)))
    }

    fn classify_transport(&self, err: &reqwest::Error, timeout: Duration) -> ClientError {
        if err.is_timeout() {
            return ClientError::Timeout(timeout);
        }
        if err.is_connect() {
            return ClientError::Offline;
        }
        // A send failure with no status and no connection detail is
        // indistinguishable from a cross-origin policy rejection; retrying
        // cannot resolve a policy misconfiguration.
        if err.is_request() && err.status().is_none() {
            return ClientError::CrossOriginBlocked {
                origin: self.config.origin(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        ClientError::Offline
    }

    async fn backoff(&self, descriptor: &RequestDescriptor, attempt: u32) {
        let delay = backoff_delay(descriptor.retry_base_delay, attempt);
        debug!(?delay, attempt, "waiting before retry");
        tokio::time::sleep(delay).await;
    }
}

/// Exponential backoff: `base * 2^attempt`, shift-capped against overflow.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let shift = attempt.min(10);
    base.saturating_mul(1u32 << shift)
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn is_csrf_rejection(body: &str) -> bool {
    body.to_ascii_lowercase().contains("csrf")
}

/// Trim a server body down to something safe to carry in an error.
fn safe_message(body: &str) -> String {
    const MAX: usize = 240;
    let trimmed = body.trim();
    if trimmed.len() > MAX {
        let mut end = MAX;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

/// Builder for [`RequestExecutor`].
#[derive(Default)]
pub struct ExecutorBuilder {
    config: Option<ClientConfig>,
    tokens: Option<Arc<dyn TokenStore>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ExecutorBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn tokens(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the executor and its collaborators.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] when the token store is missing or
    /// the HTTP client cannot be constructed.
    pub fn build(self) -> Result<RequestExecutor, ClientError> {
        let config = self.config.unwrap_or_default();
        let tokens =
            self.tokens.ok_or_else(|| ClientError::Config("token store not set".to_string()))?;
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));

        // Cookies carry the refresh credential and, on same-site
        // deployments, the CSRF cookie.
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|err| ClientError::Config(format!("failed to build HTTP client: {err}")))?;

        let cache = Arc::new(ResponseCache::new(config.cache_ttl));
        let csrf = Arc::new(CsrfTokenProvider::new(
            http.clone(),
            config.csrf_url(),
            config.auxiliary_timeout,
        ));
        let refresh = Arc::new(RefreshCoordinator::new(
            http.clone(),
            config.refresh_url(),
            config.refresh_timeout,
            tokens.clone(),
        ));

        Ok(RequestExecutor { http, config, cache, csrf, refresh, tokens, notifier })
    }
}
