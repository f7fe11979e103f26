//! User-facing notification seam.
//!
//! The executor emits exactly one notification per terminal failure; the
//! presentation mechanism belongs to the embedding application.

use forgelink_domain::ClientError;
use tracing::warn;

/// Receives one notification per terminal request failure.
///
/// This trait allows dependency injection and testing with counting mocks.
pub trait Notifier: Send + Sync {
    fn notify(&self, error: &ClientError);
}

/// Default notifier that records failures in the log stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, error: &ClientError) {
        warn!(category = ?error.category(), "{}", error.user_message());
    }
}
