//! # Forgelink Client
//!
//! The resilient HTTP core mediating every request between the
//! factory-operations console and its backend.
//!
//! This crate contains:
//! - The request executor with retry, backoff, and outcome classification
//! - The single-flight credential refresh coordinator
//! - The short-TTL response cache with prefix invalidation
//! - The CSRF token lifecycle for mutating calls
//! - The token-store and notification seams consumed by the core
//!
//! ## Architecture
//! - Credential storage is consumed through the [`auth::TokenStore`] trait,
//!   never implemented here
//! - The token is single-writer: only the refresh coordinator replaces it
//! - All shared in-memory state is owned by explicit service objects
//!   injected into the executor, not ambient globals

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod csrf;
pub mod http;
pub mod notify;

// Re-export commonly used items
pub use auth::{MemoryTokenStore, RefreshCoordinator, TokenStore};
pub use cache::ResponseCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use csrf::CsrfTokenProvider;
pub use http::{ApiResponse, RequestDescriptor, RequestExecutor, ResponseType, TimeoutClass};
pub use notify::{Notifier, TracingNotifier};
