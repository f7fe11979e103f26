//! Token-store seam.

use async_trait::async_trait;
use parking_lot::RwLock;

/// Holds the current access credential for the session.
///
/// This trait allows dependency injection and testing with mock stores.
/// The refresh capability (an HTTP-only cookie) is carried by the transport
/// and never passes through this interface.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current access token, if authenticated.
    async fn access_token(&self) -> Option<String>;

    /// Replace the access token wholesale after a successful renewal.
    async fn set_access_token(&self, token: String);

    /// Forced sign-out: drop the credential entirely.
    async fn clear_session(&self);
}

/// Session-scoped in-memory token store.
///
/// Suitable for embedders without a platform credential vault, and for
/// tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an existing credential.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: RwLock::new(Some(token.into())) }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn access_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    async fn set_access_token(&self, token: String) {
        *self.token.write() = Some(token);
    }

    async fn clear_session(&self) {
        *self.token.write() = None;
    }
}
