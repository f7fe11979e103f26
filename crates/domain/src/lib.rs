//! # Forgelink Domain
//!
//! Shared domain types for the Forgelink network core.
//!
//! This crate contains:
//! - The error taxonomy every network operation classifies into
//! - The canonical API response envelope
//! - Wire and timing constants shared by the client and realtime crates
//!
//! ## Architecture
//! - No dependencies on other Forgelink crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod constants;
pub mod envelope;
pub mod errors;

// Re-export commonly used items
pub use envelope::ApiEnvelope;
pub use errors::{ClientError, ErrorCategory, Result};
