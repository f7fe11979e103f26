//! Request descriptors.
//!
//! A descriptor captures everything about one logical request before it is
//! handed to the executor. Descriptors are immutable per call; the builder
//! methods consume and return the value.

use std::time::Duration;

use forgelink_domain::constants;
use reqwest::Method;
use serde_json::Value;

/// How the response body should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Parse the body as JSON and normalize it into the canonical envelope.
    Json,
    /// Return the raw bytes (downloads); never cached.
    Binary,
}

/// Which wait bound applies to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    Standard,
    Upload,
    Auxiliary,
}

/// Immutable description of one logical request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub path: String,
    pub method: Method,
    /// Ordered key/value pairs; order is part of the cache key.
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Header overrides applied after credential resolution.
    pub headers: Vec<(String, String)>,
    pub skip_auth: bool,
    pub response_type: ResponseType,
    /// Retries after the initial attempt.
    pub retry_budget: u32,
    pub retry_base_delay: Duration,
    pub timeout_class: TimeoutClass,
}

impl RequestDescriptor {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            skip_auth: false,
            response_type: ResponseType::Json,
            retry_budget: constants::DEFAULT_RETRY_BUDGET,
            retry_base_delay: Duration::from_millis(constants::DEFAULT_RETRY_BASE_DELAY_MS),
            timeout_class: TimeoutClass::Standard,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { body: Some(body), ..Self::new(Method::POST, path) }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self { body: Some(body), ..Self::new(Method::PUT, path) }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self { body: Some(body), ..Self::new(Method::PATCH, path) }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter. Values are stringified by the caller.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Override or add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send without credentials or CSRF token (login, health).
    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    /// Expect raw bytes instead of JSON.
    pub fn binary(mut self) -> Self {
        self.response_type = ResponseType::Binary;
        self
    }

    pub fn retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Use the longer upload wait bound.
    pub fn upload(mut self) -> Self {
        self.timeout_class = TimeoutClass::Upload;
        self
    }

    /// Use the short auxiliary wait bound.
    pub fn auxiliary(mut self) -> Self {
        self.timeout_class = TimeoutClass::Auxiliary;
        self
    }

    /// Whether the verb changes server state (requires a CSRF token).
    pub fn is_mutating(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
    }

    /// Whether a successful response may be served from and stored in the
    /// cache.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET && self.response_type == ResponseType::Json
    }

    /// Canonical cache key: path plus query pairs in insertion order.
    pub fn cache_key(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let mut key = String::with_capacity(self.path.len() + 16);
        key.push_str(&self.path);
        for (i, (name, value)) in self.query.iter().enumerate() {
            key.push(if i == 0 { '?' } else { '&' });
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        key
    }

    /// Resource family the request targets: the first path segment.
    ///
    /// A mutation on `/work-entries/42` invalidates every cached read under
    /// `/work-entries`.
    pub fn resource_prefix(&self) -> &str {
        let inner = self.path.strip_prefix('/').unwrap_or(&self.path);
        match inner.find('/') {
            Some(i) => &self.path[..self.path.len() - inner.len() + i],
            None => &self.path,
        }
    }
}
