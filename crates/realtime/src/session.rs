//! Realtime session manager.
//!
//! Owns one persistent duplex channel per authenticated session: connects
//! with the session's identity, heartbeats while connected, queues outbound
//! messages across drops, reconnects with capped exponential backoff, and
//! dispatches inbound messages to typed subscribers.
//!
//! State machine: `Disconnected -> Connecting -> Connected`, back to
//! `Disconnected` on close. An unexpected close schedules reconnect
//! attempts up to a fixed ceiling; a manual `disconnect()` disables
//! reconnection and closes cleanly.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use forgelink_client::auth::TokenStore;
use forgelink_domain::constants;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::errors::RealtimeError;
use crate::message::{EventKind, RealtimeMessage, SessionContext};
use crate::transport::{ChannelConnection, ChannelTransport};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Realtime endpoint (e.g., "wss://api.forgelink.io/realtime")
    pub url: String,
    /// Liveness probe cadence while connected
    pub heartbeat_interval: Duration,
    /// Whether unexpected closes schedule reconnect attempts
    pub reconnect: bool,
    /// Base delay before the first reconnect attempt
    pub reconnect_base: Duration,
    /// Ceiling on the delay between reconnect attempts
    pub reconnect_cap: Duration,
    /// Attempts before the session gives up and stays disconnected
    pub max_reconnect_attempts: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/realtime".to_string(),
            heartbeat_interval: Duration::from_secs(constants::HEARTBEAT_INTERVAL_SECS),
            reconnect: true,
            reconnect_base: Duration::from_millis(constants::RECONNECT_BASE_INTERVAL_MS),
            reconnect_cap: Duration::from_secs(constants::RECONNECT_MAX_INTERVAL_SECS),
            max_reconnect_attempts: constants::MAX_RECONNECT_ATTEMPTS,
        }
    }
}

type Callback = Arc<dyn Fn(&RealtimeMessage) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_kind: HashMap<EventKind, Vec<(u64, Callback)>>,
}

/// Disposer returned by `subscribe`; removes exactly its own registration.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn dispose(self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock();
            if let Some(list) = registry.by_kind.get_mut(&self.kind) {
                list.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

enum Command {
    Message(RealtimeMessage),
    Close,
}

/// Outbound path: a live sender while connected, a FIFO queue otherwise.
enum Outbound {
    Queued(VecDeque<RealtimeMessage>),
    Connected(mpsc::UnboundedSender<Command>),
}

struct SessionInner<T: ChannelTransport> {
    transport: T,
    config: RealtimeConfig,
    context: SessionContext,
    tokens: Arc<dyn TokenStore>,
    state: Mutex<SessionState>,
    registry: Arc<Mutex<Registry>>,
    outbound: Mutex<Outbound>,
    reconnect_enabled: AtomicBool,
    attempts: AtomicU32,
    /// Bumped on manual disconnect so stale loops stand down.
    epoch: AtomicU64,
}

/// Owns the persistent realtime channel for one authenticated session.
pub struct RealtimeSession<T: ChannelTransport> {
    inner: Arc<SessionInner<T>>,
}

impl<T: ChannelTransport> RealtimeSession<T> {
    pub fn new(
        transport: T,
        config: RealtimeConfig,
        context: SessionContext,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let inner = SessionInner {
            transport,
            config,
            context,
            tokens,
            state: Mutex::new(SessionState::Disconnected),
            registry: Arc::new(Mutex::new(Registry::default())),
            outbound: Mutex::new(Outbound::Queued(VecDeque::new())),
            reconnect_enabled: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            epoch: AtomicU64::new(0),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Open the channel; no-op when already connected or connecting.
    ///
    /// Resolves once the channel reports open. On open the reconnect
    /// counter resets, the heartbeat starts, and queued messages drain in
    /// FIFO order.
    ///
    /// # Errors
    /// Surfaces the transport failure; no automatic retry is scheduled for
    /// a failed manual connect.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        {
            let mut state = self.inner.state.lock();
            if *state != SessionState::Disconnected {
                return Ok(());
            }
            *state = SessionState::Connecting;
        }
        // A manual connect supersedes any reconnect schedule still sleeping
        // out its backoff; bumping the epoch makes that loop stand down.
        self.inner.epoch.fetch_add(1, Ordering::Relaxed);
        self.inner.reconnect_enabled.store(self.inner.config.reconnect, Ordering::Relaxed);
        self.inner.attempts.store(0, Ordering::Relaxed);

        match self.inner.open().await {
            Ok(()) => Ok(()),
            Err(err) => {
                *self.inner.state.lock() = SessionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Construct a message stamped with the session context and deliver it,
    /// queueing while disconnected. Messages are never dropped and never
    /// reordered.
    pub fn emit(&self, kind: EventKind, data: Value) {
        let message = RealtimeMessage::new(kind, data, &self.inner.context);
        self.inner.send_or_queue(message);
    }

    /// Register a callback for an event kind.
    ///
    /// All subscribers of a kind run in registration order for each
    /// matching inbound message; a panicking callback does not prevent the
    /// others from running.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&RealtimeMessage) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.by_kind.entry(kind).or_default().push((id, Arc::new(callback)));
        Subscription { registry: Arc::downgrade(&self.inner.registry), kind, id }
    }

    /// Disable automatic reconnection, stop the heartbeat, and close the
    /// channel with a clean-close signal.
    pub async fn disconnect(&self) {
        info!("manual disconnect");
        self.inner.reconnect_enabled.store(false, Ordering::Relaxed);
        self.inner.epoch.fetch_add(1, Ordering::Relaxed);

        let sender = {
            let outbound = self.inner.outbound.lock();
            match &*outbound {
                Outbound::Connected(tx) => Some(tx.clone()),
                Outbound::Queued(_) => None,
            }
        };
        if let Some(tx) = sender {
            let _ = tx.send(Command::Close);
        }
        *self.inner.state.lock() = SessionState::Disconnected;
    }
}

impl<T: ChannelTransport> SessionInner<T> {
    async fn channel_url(&self) -> String {
        match self.tokens.access_token().await {
            Some(token) => format!("{}?token={}", self.config.url, token),
            None => self.config.url.clone(),
        }
    }

    /// Open the channel and hand it to the run loop.
    async fn open(self: &Arc<Self>) -> Result<(), RealtimeError> {
        let url = self.channel_url().await;
        let connection = self.transport.connect(&url).await?;
        debug!("realtime channel open");

        let (tx, rx) = mpsc::unbounded_channel();
        {
            // Drain the queue into the live sender under the same lock that
            // publishes it, so nothing emitted meanwhile can overtake.
            let mut outbound = self.outbound.lock();
            if let Outbound::Queued(queue) = &mut *outbound {
                for message in queue.drain(..) {
                    let _ = tx.send(Command::Message(message));
                }
            }
            *outbound = Outbound::Connected(tx);
        }
        *self.state.lock() = SessionState::Connected;
        self.attempts.store(0, Ordering::Relaxed);

        let epoch = self.epoch.load(Ordering::Relaxed);
        tokio::spawn(Self::run_loop(Arc::clone(self), connection, rx, epoch));
        Ok(())
    }

    fn send_or_queue(&self, message: RealtimeMessage) {
        let mut outbound = self.outbound.lock();
        match &mut *outbound {
            Outbound::Connected(tx) => {
                if let Err(err) = tx.send(Command::Message(message)) {
                    // The run loop is gone; fall back to queueing.
                    if let Command::Message(message) = err.0 {
                        *outbound = Outbound::Queued(VecDeque::from([message]));
                    }
                }
            }
            Outbound::Queued(queue) => queue.push_back(message),
        }
    }

    /// Dispatch one inbound frame to subscribers of its kind.
    fn dispatch(&self, frame: &str) {
        let message: RealtimeMessage = match serde_json::from_str(frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "undecodable realtime frame");
                return;
            }
        };
        if message.kind.is_control() {
            // Probe traffic is consumed silently.
            return;
        }

        let callbacks: Vec<Callback> = self
            .registry
            .lock()
            .by_kind
            .get(&message.kind)
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&message))).is_err() {
                warn!(kind = ?message.kind, "subscriber panicked during dispatch");
            }
        }
    }

    // Boxed because the loop is mutually recursive with `open` through
    // `reconnect_loop`; an opaque future type cannot close that cycle.
    fn run_loop(
        inner: Arc<Self>,
        mut connection: Box<dyn ChannelConnection>,
        mut rx: mpsc::UnboundedReceiver<Command>,
        epoch: u64,
    ) -> BoxFuture<'static, ()> {
        async move {
            let mut heartbeat = tokio::time::interval(inner.config.heartbeat_interval);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately; consume it
            heartbeat.tick().await;

            let mut clean_close = false;
            let mut unsent: Option<RealtimeMessage> = None;

            loop {
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(Command::Message(message)) => {
                            match serde_json::to_string(&message) {
                                Ok(frame) => {
                                    if connection.send(frame).await.is_err() {
                                        unsent = Some(message);
                                        break;
                                    }
                                }
                                Err(err) => warn!(error = %err, "unserializable outbound message"),
                            }
                        }
                        Some(Command::Close) | None => {
                            clean_close = true;
                            let _ = connection.close().await;
                            break;
                        }
                    },
                    incoming = connection.recv() => match incoming {
                        Some(Ok(frame)) => inner.dispatch(&frame),
                        Some(Err(err)) => {
                            warn!(error = %err, "realtime channel error");
                            break;
                        }
                        None => {
                            debug!("realtime channel closed by peer");
                            break;
                        }
                    },
                    _ = heartbeat.tick() => {
                        let probe = RealtimeMessage::heartbeat(&inner.context);
                        if let Ok(frame) = serde_json::to_string(&probe) {
                            if connection.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            // Teardown: anything handed to this loop but not delivered goes
            // back to the front of the queue, preserving submission order.
            {
                let mut requeued = VecDeque::new();
                if let Some(message) = unsent.take() {
                    requeued.push_back(message);
                }
                rx.close();
                while let Ok(command) = rx.try_recv() {
                    if let Command::Message(message) = command {
                        requeued.push_back(message);
                    }
                }

                let mut outbound = inner.outbound.lock();
                match &mut *outbound {
                    Outbound::Queued(queue) => {
                        for message in requeued.into_iter().rev() {
                            queue.push_front(message);
                        }
                    }
                    Outbound::Connected(_) => *outbound = Outbound::Queued(requeued),
                }
            }
            *inner.state.lock() = SessionState::Disconnected;

            if clean_close
                || epoch != inner.epoch.load(Ordering::Relaxed)
                || !inner.reconnect_enabled.load(Ordering::Relaxed)
            {
                return;
            }
            Self::reconnect_loop(inner, epoch).await;
        }
        .boxed()
    }

    /// Schedule reconnect attempts with capped exponential backoff, up to
    /// the configured ceiling.
    async fn reconnect_loop(inner: Arc<Self>, epoch: u64) {
        loop {
            if epoch != inner.epoch.load(Ordering::Relaxed)
                || !inner.reconnect_enabled.load(Ordering::Relaxed)
            {
                return;
            }
            let attempt = inner.attempts.load(Ordering::Relaxed);
            if attempt >= inner.config.max_reconnect_attempts {
                warn!(attempt, "reconnect ceiling reached, staying disconnected");
                return;
            }

            let delay = reconnect_delay(&inner.config, attempt);
            debug!(?delay, attempt, "scheduling reconnect");
            tokio::time::sleep(delay).await;

            if epoch != inner.epoch.load(Ordering::Relaxed)
                || !inner.reconnect_enabled.load(Ordering::Relaxed)
                || *inner.state.lock() != SessionState::Disconnected
            {
                return;
            }

            inner.attempts.store(attempt + 1, Ordering::Relaxed);
            *inner.state.lock() = SessionState::Connecting;
            match inner.open().await {
                Ok(()) => return,
                Err(err) => {
                    warn!(error = %err, attempt, "reconnect attempt failed");
                    *inner.state.lock() = SessionState::Disconnected;
                }
            }
        }
    }
}

/// `base * 2^attempt`, capped.
fn reconnect_delay(config: &RealtimeConfig, attempt: u32) -> Duration {
    let shift = attempt.min(10);
    config.reconnect_base.saturating_mul(1u32 << shift).min(config.reconnect_cap)
}
