//! Wire and timing constants shared across the network core.

/// How long a cached read result stays servable.
pub const CACHE_TTL_SECS: u64 = 300;

/// Default number of retries after the initial attempt.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Default base delay for exponential backoff between retries.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 2_000;

/// Upper bound on the wait for an ordinary request.
pub const STANDARD_TIMEOUT_SECS: u64 = 20;

/// Upper bound on the wait for an upload.
pub const UPLOAD_TIMEOUT_SECS: u64 = 30;

/// Upper bound on the wait for auxiliary calls (health, CSRF issuance).
pub const AUXILIARY_TIMEOUT_SECS: u64 = 5;

/// Upper bound on the wait for a credential renewal call.
pub const REFRESH_TIMEOUT_SECS: u64 = 10;

/// Liveness probe cadence while the realtime channel is connected.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Base delay before the first reconnect attempt.
pub const RECONNECT_BASE_INTERVAL_MS: u64 = 1_000;

/// Ceiling on the delay between reconnect attempts.
pub const RECONNECT_MAX_INTERVAL_SECS: u64 = 30;

/// Reconnect attempts before the session gives up and stays disconnected.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Header carrying the anti-forgery token on mutating requests.
pub const CSRF_HEADER: &str = "X-CSRF-Token";
