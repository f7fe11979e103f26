//! Credential handling: the token-store seam and the refresh coordinator.
//!
//! Credential storage itself lives outside this core; the executor and the
//! refresh coordinator consume it through [`TokenStore`]. The refresh
//! coordinator is the only writer of the access token.

pub mod refresh;
pub mod store;

pub use refresh::RefreshCoordinator;
pub use store::{MemoryTokenStore, TokenStore};
