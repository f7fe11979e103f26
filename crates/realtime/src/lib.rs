//! # Forgelink Realtime
//!
//! Persistent duplex channel for the factory-operations console.
//!
//! This crate contains:
//! - The realtime session manager: connect, heartbeat, reconnect with
//!   backoff, FIFO outbound queueing while disconnected
//! - The typed publish/subscribe registry with panic-isolated dispatch
//! - A pluggable channel transport with a WebSocket implementation
//!
//! ## Architecture
//! - One session per authenticated console session
//! - Channel identity comes from the token store consumed through
//!   `forgelink-client`
//! - Transports implement [`transport::ChannelTransport`] so tests run
//!   against an in-memory channel

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod errors;
pub mod message;
pub mod session;
pub mod transport;

// Re-export commonly used items
pub use errors::RealtimeError;
pub use message::{EventKind, RealtimeMessage, SessionContext};
pub use session::{RealtimeConfig, RealtimeSession, SessionState, Subscription};
pub use transport::{ChannelConnection, ChannelTransport, WsTransport};
