//! The update channel.
//!
//! [`UpdateChannel`] is a caller-owned handle. Creating one spawns a worker
//! task that owns the connection, the reconnect timer and the dispatch loop.
//! The handle talks to the worker through a command queue; the worker polls
//! that queue before anything else, so a `disconnect` always wins over a
//! pending reconnect or an open still in flight.
//!
//! ```text
//!                connect          open ok
//! Disconnected ─────────▶ Connecting ───────▶ Open
//!      ▲                   │    ▲              │
//!      │ disconnect        │    │ retry timer  │ dropped
//!      │ (any state)       │    └──────────────┤
//!      │                   ▼ budget spent      │
//!      └────────────── GivenUp ◀───────────────┘
//! ```

use futures_util::future::BoxFuture;
use livefeed_core::{
    ConnectionState, Dispatcher, LifecycleEvent, ReconnectDecision, ReconnectPolicy,
    ReconnectState, Registry, RegistryStats, Subscription,
};
use livefeed_protocol::{codec, Category, DecodeError, EnvelopeCodec, Payload, Topic};
use livefeed_transport::websocket::DEFAULT_MAX_MESSAGE_SIZE;
use livefeed_transport::{
    Connection, Connector, Endpoint, RawFrame, TransportError, WebSocketConnector,
    WebSocketConnectorConfig,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::metrics;

/// Default capacity of the lifecycle event stream.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default open timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Channel settings.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Where the feed is served.
    pub endpoint: Endpoint,
    /// Reconnect policy.
    pub reconnect: ReconnectPolicy,
    /// Opens taking longer than this count as failures.
    pub connect_timeout: Duration,
    /// Inbound frames above this size are dropped.
    pub max_message_size: usize,
    /// Lifecycle events buffered per slow receiver.
    pub event_capacity: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: codec::MAX_FRAME_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl From<&ChannelConfig> for ChannelOptions {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            reconnect: config.reconnect.policy(),
            connect_timeout: config.transport.connect_timeout(),
            max_message_size: config.transport.max_message_size,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

enum Command {
    Connect { url: SecretString },
    Disconnect { ack: oneshot::Sender<()> },
    Send { text: String },
}

/// Handle to one update channel.
///
/// Dropping the handle stops the worker and closes any live connection.
pub struct UpdateChannel {
    registry: Arc<Registry>,
    endpoint: Endpoint,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl UpdateChannel {
    /// Create a channel that opens connections through `connector`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, options: ChannelOptions) -> Self {
        let registry = Registry::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(options.event_capacity.max(1));

        let worker = Worker {
            connector,
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            codec: EnvelopeCodec::new(options.max_message_size),
            reconnect: ReconnectState::new(options.reconnect),
            connect_timeout: options.connect_timeout,
            url: None,
            phase: Phase::Idle,
            commands: command_rx,
            state: state_tx,
            events: events.clone(),
        };
        tokio::spawn(worker.run());

        Self {
            registry,
            endpoint: options.endpoint,
            commands: command_tx,
            state: state_rx,
            events,
        }
    }

    /// Create a channel over WebSocket.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn websocket(options: ChannelOptions) -> Self {
        let connector = WebSocketConnector::with_config(WebSocketConnectorConfig {
            max_message_size: options.max_message_size.max(DEFAULT_MAX_MESSAGE_SIZE),
            ..Default::default()
        });
        Self::new(Arc::new(connector), options)
    }

    /// Create a WebSocket channel from loaded configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::websocket(ChannelOptions::from(config))
    }

    /// The endpoint this channel connects to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Start connecting with `credential`.
    ///
    /// Returns once the request is queued. A no-op while connecting or open.
    /// From `Disconnected` or `GivenUp` it starts over with a fresh attempt
    /// budget. The credential is kept for automatic reconnects until
    /// [`disconnect`](Self::disconnect).
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is empty, the endpoint is invalid,
    /// or the worker has stopped.
    pub fn connect(&self, credential: SecretString) -> Result<(), ChannelError> {
        if credential.expose_secret().is_empty() {
            return Err(ChannelError::EmptyCredential);
        }
        let url = self
            .endpoint
            .authorized_url(&credential)
            .map_err(ChannelError::Endpoint)?;

        debug!(endpoint = %self.endpoint, "Connect requested");
        self.commands
            .send(Command::Connect {
                url: SecretString::new(url),
            })
            .map_err(|_| ChannelError::Closed)
    }

    /// Close the channel.
    ///
    /// Cancels a pending reconnect or in-flight open, closes the live
    /// connection, forgets the credential and removes every subscription.
    /// Resolves once the worker has applied it.
    pub async fn disconnect(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Disconnect { ack }).is_ok() {
            let _ = done.await;
        }
    }

    /// Register `callback` for payloads of `category`.
    pub fn subscribe<F>(&self, category: Category, callback: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.registry.subscribe(category, callback)
    }

    /// Register a callback by category name.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a known category.
    pub fn subscribe_named<F>(&self, name: &str, callback: F) -> Result<Subscription, ChannelError>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        Ok(self.registry.subscribe_named(name, callback)?)
    }

    /// Register a callback receiving the typed payload of `T`'s category.
    pub fn subscribe_to<T, F>(&self, callback: F) -> Subscription
    where
        T: Topic,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.registry.subscribe_to::<T, F>(callback)
    }

    /// Remove every subscription without touching the connection.
    pub fn unsubscribe_all(&self) {
        self.registry.unsubscribe_all();
    }

    /// Subscription counts per category.
    #[must_use]
    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Serialize `data` and write it to the open connection.
    ///
    /// While not open this logs a warning and drops the message; nothing is
    /// queued for later.
    ///
    /// # Errors
    ///
    /// Returns an error only if `data` cannot be serialized.
    pub fn send<T: Serialize + ?Sized>(&self, data: &T) -> Result<(), ChannelError> {
        let text = codec::encode(data)?;

        let state = *self.state.borrow();
        if !state.is_open() {
            warn!(state = %state, "Not connected, dropping outbound message");
            return Ok(());
        }

        if self.commands.send(Command::Send { text }).is_err() {
            warn!("Channel worker stopped, dropping outbound message");
        }
        Ok(())
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the channel is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Watch state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Receive lifecycle events published from now on.
    #[must_use]
    pub fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Wait until the state satisfies `predicate` and return it.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the worker stops first.
    pub async fn wait_for_state<P>(&self, mut predicate: P) -> Result<ConnectionState, ChannelError>
    where
        P: FnMut(&ConnectionState) -> bool,
    {
        let mut state = self.state.clone();
        let reached = *state
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| ChannelError::Closed)?;
        Ok(reached)
    }
}

impl fmt::Debug for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateChannel")
            .field("endpoint", &self.endpoint.to_string())
            .field("state", &self.state())
            .field("subscriptions", &self.registry.stats())
            .finish()
    }
}

type OpenFuture = BoxFuture<'static, Result<Box<dyn Connection>, TransportError>>;

/// What the worker is waiting on besides commands.
enum Phase {
    /// Nothing. Disconnected or given up.
    Idle,
    /// An open in flight.
    Opening(OpenFuture),
    /// A live connection.
    Open(Box<dyn Connection>),
    /// Reconnect timer.
    Waiting(Instant),
}

enum Wake {
    Opened(Result<Box<dyn Connection>, TransportError>),
    Frame(Result<Option<RawFrame>, TransportError>),
    RetryDue,
}

async fn next_wake(phase: &mut Phase) -> Wake {
    match phase {
        Phase::Idle => std::future::pending().await,
        Phase::Opening(open) => Wake::Opened(open.as_mut().await),
        Phase::Open(conn) => Wake::Frame(conn.recv().await),
        Phase::Waiting(deadline) => {
            tokio::time::sleep_until(*deadline).await;
            Wake::RetryDue
        }
    }
}

struct Worker {
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    codec: EnvelopeCodec,
    reconnect: ReconnectState,
    connect_timeout: Duration,
    url: Option<SecretString>,
    phase: Phase,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl Worker {
    async fn run(mut self) {
        debug!(connector = self.connector.name(), "Channel worker started");

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },

                wake = next_wake(&mut self.phase) => self.handle_wake(wake),
            }
        }

        if let Phase::Open(mut conn) = std::mem::replace(&mut self.phase, Phase::Idle) {
            let _ = conn.close().await;
            metrics::set_connected(false);
        }
        self.set_state(ConnectionState::Disconnected);
        debug!("Channel worker stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { url } => self.connect(url),
            Command::Disconnect { ack } => {
                self.disconnect().await;
                let _ = ack.send(());
            }
            Command::Send { text } => self.send(text).await,
        }
    }

    fn handle_wake(&mut self, wake: Wake) {
        match wake {
            Wake::Opened(Ok(conn)) => self.on_open(conn),
            Wake::Opened(Err(e)) => {
                warn!(error = %e, attempt = self.reconnect.attempts(), "Failed to open connection");
                metrics::record_open_failure();
                self.on_unexpected_close();
            }
            Wake::Frame(Ok(Some(frame))) => self.on_frame(&frame),
            Wake::Frame(Ok(None)) => {
                let reason = match &self.phase {
                    Phase::Open(conn) => conn.close_reason(),
                    _ => None,
                };
                self.on_connection_lost(reason);
            }
            Wake::Frame(Err(e)) => self.on_connection_lost(Some(e.to_string())),
            Wake::RetryDue => {
                let attempt = self.reconnect.attempts();
                info!(attempt, "Reconnecting");
                self.start_open(attempt);
            }
        }
    }

    fn connect(&mut self, url: SecretString) {
        let current = *self.state.borrow();
        if !current.accepts_connect() {
            debug!(state = %current, "Already connecting or open, ignoring connect");
            return;
        }
        self.reconnect.reset();
        self.url = Some(url);
        self.start_open(0);
    }

    fn start_open(&mut self, attempt: u32) {
        let Some(url) = &self.url else {
            self.phase = Phase::Idle;
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        let connector = Arc::clone(&self.connector);
        let url = url.expose_secret().clone();
        let timeout = self.connect_timeout;
        self.phase = Phase::Opening(Box::pin(async move {
            match tokio::time::timeout(timeout, connector.open(&url)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            }
        }));
        self.set_state(ConnectionState::Connecting { attempt });
    }

    fn on_open(&mut self, conn: Box<dyn Connection>) {
        let attempts = self.reconnect.attempts();
        self.reconnect.reset();
        self.phase = Phase::Open(conn);
        self.set_state(ConnectionState::Open);
        metrics::set_connected(true);
        info!(attempts, "Connected");
        self.emit(LifecycleEvent::Connected);
    }

    fn on_frame(&mut self, frame: &RawFrame) {
        metrics::record_frame(frame.len());

        let decoded = match frame {
            RawFrame::Text(text) => self.codec.decode_text(text),
            RawFrame::Binary(data) => self.codec.decode(data),
        };

        match decoded {
            Ok(envelope) => {
                let outcome = self.dispatcher.dispatch(&envelope);
                metrics::record_callback_panics(outcome.failed);
            }
            Err(e) => {
                metrics::record_decode_error(decode_error_kind(&e));
                warn!(error = %e, size = frame.len(), "Dropping undecodable frame");
            }
        }
    }

    fn on_connection_lost(&mut self, reason: Option<String>) {
        self.phase = Phase::Idle;
        metrics::set_connected(false);
        warn!(reason = reason.as_deref().unwrap_or("none"), "Connection lost");
        self.emit(LifecycleEvent::ConnectionLost { reason });
        self.on_unexpected_close();
    }

    fn on_unexpected_close(&mut self) {
        self.phase = Phase::Idle;

        match self.reconnect.on_unexpected_close() {
            ReconnectDecision::Retry { attempt, delay } => {
                metrics::record_reconnect();
                info!(
                    attempt,
                    max_attempts = self.reconnect.policy().max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.phase = Phase::Waiting(Instant::now() + delay);
                self.set_state(ConnectionState::Connecting { attempt });
                self.emit(LifecycleEvent::Reconnecting { attempt, delay });
            }
            ReconnectDecision::GiveUp { attempts } => {
                metrics::record_give_up();
                error!(attempts, "Connection failed, giving up");
                self.set_state(ConnectionState::GivenUp);
                self.emit(LifecycleEvent::GivenUp { attempts });
            }
        }
    }

    async fn disconnect(&mut self) {
        let previous = *self.state.borrow();

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Open(mut conn) => {
                self.set_state(ConnectionState::Closing);
                if let Err(e) = conn.close().await {
                    debug!(error = %e, "Close failed");
                }
                metrics::set_connected(false);
            }
            Phase::Opening(_) => debug!("Cancelled in-flight open"),
            Phase::Waiting(_) => debug!("Cancelled pending reconnect"),
            Phase::Idle => {}
        }

        self.url = None;
        self.reconnect.reset();
        self.dispatcher.registry().unsubscribe_all();
        self.set_state(ConnectionState::Disconnected);
        info!(from = %previous, "Disconnected");
        self.emit(LifecycleEvent::Disconnected);
    }

    async fn send(&mut self, text: String) {
        match &mut self.phase {
            Phase::Open(conn) => match conn.send_text(text).await {
                Ok(()) => metrics::record_sent(),
                Err(e) => warn!(error = %e, "Failed to send message"),
            },
            _ => warn!("Not connected, dropping outbound message"),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: LifecycleEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

fn decode_error_kind(error: &DecodeError) -> &'static str {
    match error {
        DecodeError::FrameTooLarge { .. } => "too_large",
        DecodeError::NotUtf8(_) => "not_utf8",
        DecodeError::Malformed(_) => "malformed",
        DecodeError::Payload { .. } => "payload",
    }
}
