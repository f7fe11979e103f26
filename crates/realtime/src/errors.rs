//! Realtime channel errors.

use thiserror::Error;

/// Failures of the realtime channel and its transport.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("channel connect failed: {0}")]
    Connect(String),

    #[error("channel transport error: {0}")]
    Transport(String),

    #[error("frame serialization failed: {0}")]
    Serialization(String),
}
