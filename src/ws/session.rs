//! The streaming session: public entry point for real-time market data.
//!
//! # Architecture
//!
//! ```text
//!   caller tasks                         session task
//!  ┌──────────────────────────┐        ┌──────────────────────────────┐
//!  │ subscribe_* / unsubscribe_* ──►    │ reconcile registry vs active │
//!  │   (registry + wake-up)   │        │ read frames ─► normalize     │
//!  │ connect / disconnect ────┼──────► │   ─► dispatch callbacks      │
//!  └──────────────────────────┘        │ drop ─► backoff ─► reconnect │
//!                                      └──────────────────────────────┘
//! ```
//!
//! Subscriptions are remembered in a registry regardless of the connection
//! state. Whenever the session task (re)connects it replays the whole
//! registry; while connected, every change is applied right away.
//!
//! # Example
//!
//! ```no_run
//! use homebroker_rs::auth::AuthContext;
//! use homebroker_rs::constants::Broker;
//! use homebroker_rs::types::{Board, Quote, Settlement};
//! use homebroker_rs::ws::session::StreamingSessionBuilder;
//!
//! # #[tokio::main]
//! # async fn main() -> homebroker_rs::error::Result<()> {
//! let broker = Broker::by_id(265).expect("known broker");
//! let auth = AuthContext::for_broker(broker, [("ASP.NET_SessionId", "...")]);
//!
//! let session = StreamingSessionBuilder::new(auth)
//!     .on_securities(|q: &Quote| {
//!         println!("{} {:?} / {:?}", q.symbol, q.bid, q.ask);
//!         Ok(())
//!     })
//!     .build();
//!
//! session.connect().await?;
//! session.subscribe_security_board(Board::Bluechips, Settlement::Hours48)?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthContext;
use crate::constants::{
    DEFAULT_ACK_TIMEOUT, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RECONNECT_ATTEMPTS,
};
use crate::error::{CallbackError, HomeBrokerError, Result};
use crate::types::enums::{Board, Settlement};
use crate::types::order_book::OrderBook;
use crate::types::quotes::{OptionQuote, PersonalPortfolioEntry, Quote, RepoQuote};
use crate::ws::connection;
use crate::ws::dispatcher::{ConnectionClosed, ConnectionOpened, Dispatcher, SessionError};
use crate::ws::reconnect::ReconnectPolicy;
use crate::ws::registry::{Subscription, SubscriptionRegistry};
use crate::ws::signalr::SignalRTransport;
use crate::ws::state::{ConnectionState, StateMachine};
use crate::ws::transport::{PortfolioSource, Transport};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timeouts and reconnection settings of a [`StreamingSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on a single connection attempt, handshake included.
    pub connect_timeout: Duration,
    /// Bound on writing one hub command or listing the portfolio holdings.
    pub command_timeout: Duration,
    /// Time the hub has to acknowledge a command.
    pub ack_timeout: Duration,
    /// Upper bound of the first reconnect delay.
    pub initial_backoff: Duration,
    /// Cap on the reconnect delay.
    pub max_backoff: Duration,
    /// Growth factor of the delay ceiling between attempts (at least 1).
    pub backoff_multiplier: f64,
    /// Attempts before giving up. Zero never retries.
    pub max_reconnect_attempts: u32,
    /// Whether to reconnect automatically after a drop.
    pub auto_reconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            backoff_multiplier: 2.0,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            auto_reconnect: true,
        }
    }
}

impl SessionConfig {
    /// A fresh reconnect policy for these settings.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.initial_backoff,
            self.max_backoff,
            self.backoff_multiplier,
            self.max_reconnect_attempts,
        )
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared between the session handle and its task.
pub(crate) struct SessionCore {
    pub registry: SubscriptionRegistry,
    pub state: StateMachine,
    pub dispatcher: Dispatcher,
    pub config: SessionConfig,
    pub transport: Arc<dyn Transport>,
    pub auth: AuthContext,
    pub portfolio: Option<Arc<dyn PortfolioSource>>,
    /// Wakes the session task when the registry changes.
    pub wakeup: Notify,
}

impl SessionCore {
    /// Apply a transition that the session logic guarantees is valid.
    pub fn set_state(&self, next: ConnectionState) {
        if let Err(e) = self.state.transition(next) {
            tracing::warn!(error = %e, "Unexpected state transition");
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`StreamingSession`].
///
/// Callbacks can be registered here or later on the session itself.
pub struct StreamingSessionBuilder {
    auth: AuthContext,
    transport: Option<Arc<dyn Transport>>,
    portfolio: Option<Arc<dyn PortfolioSource>>,
    config: SessionConfig,
    dispatcher: Dispatcher,
}

macro_rules! builder_callback {
    ($name:ident, $setter:ident, $ty:ty) => {
        #[doc = concat!("Register the `", stringify!($name), "` callback.")]
        pub fn $name<F>(self, f: F) -> Self
        where
            F: Fn(&$ty) -> std::result::Result<(), CallbackError> + Send + Sync + 'static,
        {
            self.dispatcher.$setter(f);
            self
        }
    };
}

impl StreamingSessionBuilder {
    /// Start a builder for the given session credentials.
    pub fn new(auth: AuthContext) -> Self {
        Self {
            auth,
            transport: None,
            portfolio: None,
            config: SessionConfig::default(),
            dispatcher: Dispatcher::new(),
        }
    }

    /// Use a custom transport. Default: [`SignalRTransport`].
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Source of the holdings behind the personal portfolio subscription.
    pub fn portfolio_source(mut self, source: impl PortfolioSource) -> Self {
        self.portfolio = Some(Arc::new(source));
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound on a connection attempt. Default: 10 s.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Bound on writing a hub command and on listing portfolio holdings.
    /// Default: 5 s.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Time the hub has to acknowledge a command. Default: 10 s.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// First reconnect delay ceiling. Default: 500 ms.
    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.config.initial_backoff = delay;
        self
    }

    /// Reconnect delay cap. Default: 30 s.
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.config.max_backoff = delay;
        self
    }

    /// Backoff growth factor, clamped to at least 1. Default: 2.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        self
    }

    /// Reconnect attempts before giving up. Default: 10.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Enable or disable automatic reconnection. Default: true.
    pub fn auto_reconnect(mut self, enable: bool) -> Self {
        self.config.auto_reconnect = enable;
        self
    }

    builder_callback!(on_open, set_on_open, ConnectionOpened);
    builder_callback!(on_personal_portfolio, set_on_personal_portfolio, PersonalPortfolioEntry);
    builder_callback!(on_securities, set_on_securities, Quote);
    builder_callback!(on_options, set_on_options, OptionQuote);
    builder_callback!(on_repos, set_on_repos, RepoQuote);
    builder_callback!(on_order_book, set_on_order_book, OrderBook);
    builder_callback!(on_error, set_on_error, SessionError);
    builder_callback!(on_close, set_on_close, ConnectionClosed);

    /// Build the session. Nothing is opened until [`StreamingSession::connect`].
    pub fn build(self) -> StreamingSession {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(SignalRTransport::new()),
        };
        StreamingSession {
            core: Arc::new(SessionCore {
                registry: SubscriptionRegistry::new(),
                state: StateMachine::new(),
                dispatcher: self.dispatcher,
                config: self.config,
                transport,
                auth: self.auth,
                portfolio: self.portfolio,
                wakeup: Notify::new(),
            }),
            worker: Mutex::new(None),
        }
    }
}

// ---------------------------------------------------------------------------
// StreamingSession
// ---------------------------------------------------------------------------

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A real-time market data session against one broker's hub.
///
/// Dropping the session stops its task and closes the connection.
pub struct StreamingSession {
    core: Arc<SessionCore>,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("state", &self.state())
            .field("subscriptions", &self.core.registry.len())
            .finish_non_exhaustive()
    }
}

macro_rules! session_callback {
    ($name:ident, $setter:ident, $ty:ty) => {
        #[doc = concat!("Replace the `", stringify!($name), "` callback.")]
        pub fn $name<F>(&self, f: F)
        where
            F: Fn(&$ty) -> std::result::Result<(), CallbackError> + Send + Sync + 'static,
        {
            self.core.dispatcher.$setter(f);
        }
    };
}

impl StreamingSession {
    /// Shorthand for [`StreamingSessionBuilder::new`].
    pub fn builder(auth: AuthContext) -> StreamingSessionBuilder {
        StreamingSessionBuilder::new(auth)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open the connection and start the session task.
    ///
    /// Fails with [`HomeBrokerError::Authentication`] for an invalid or
    /// expired context, [`HomeBrokerError::InvalidState`] if the session is
    /// not disconnected, or the transport error of the single attempt made.
    pub async fn connect(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if self.core.state.current() != ConnectionState::Disconnected {
            return Err(HomeBrokerError::InvalidState(
                "connection is already open".into(),
            ));
        }
        // A task that ended on its own has already moved to Disconnected.
        drop(worker.take());

        self.core.state.transition(ConnectionState::Connecting)?;
        tracing::info!(page = %self.core.auth.page(), "Connecting to hub");

        let link = match connection::open_link(&self.core).await {
            Ok(link) => link,
            Err(e) => {
                tracing::error!(error = %e, "Connection failed");
                self.core.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        self.core.state.transition(ConnectionState::Connected)?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(connection::run(
            Arc::clone(&self.core),
            link,
            cancel.clone(),
        ));
        *worker = Some(Worker { cancel, handle });
        Ok(())
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Returns once the session task has finished and the close callback has
    /// run. Must not be awaited from inside the session task.
    pub async fn disconnect(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        let not_open = || HomeBrokerError::InvalidState("connection is not open".into());

        let Some(Worker { cancel, handle }) = worker.take() else {
            return Err(not_open());
        };
        if self.core.state.current() == ConnectionState::Disconnected {
            return Err(not_open());
        }

        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Session task failed");
        }
        if self.core.state.current() != ConnectionState::Disconnected {
            self.core.set_state(ConnectionState::Disconnected);
        }
        tracing::info!("Session disconnected");
        Ok(())
    }

    /// Whether the hub connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.core.state.current().is_connected()
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.core.state.current()
    }

    /// A receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.core.state.subscribe()
    }

    /// The desired subscriptions, replayed on every (re)connection.
    pub fn subscriptions(&self) -> HashSet<Subscription> {
        self.core.registry.snapshot()
    }

    // -----------------------------------------------------------------------
    // Callbacks
    // -----------------------------------------------------------------------

    session_callback!(on_open, set_on_open, ConnectionOpened);
    session_callback!(on_personal_portfolio, set_on_personal_portfolio, PersonalPortfolioEntry);
    session_callback!(on_securities, set_on_securities, Quote);
    session_callback!(on_options, set_on_options, OptionQuote);
    session_callback!(on_repos, set_on_repos, RepoQuote);
    session_callback!(on_order_book, set_on_order_book, OrderBook);
    session_callback!(on_error, set_on_error, SessionError);
    session_callback!(on_close, set_on_close, ConnectionClosed);

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Receive every security of `board` for one settlement term.
    pub fn subscribe_security_board(&self, board: Board, settlement: Settlement) -> Result<()> {
        self.subscribe(Subscription::SecurityBoard { board, settlement });
        Ok(())
    }

    /// Stop receiving `board` for that settlement term.
    pub fn unsubscribe_security_board(&self, board: Board, settlement: Settlement) -> Result<()> {
        self.unsubscribe(&Subscription::SecurityBoard { board, settlement });
        Ok(())
    }

    /// Receive the options board.
    pub fn subscribe_options(&self) -> Result<()> {
        self.subscribe(Subscription::Options);
        Ok(())
    }

    /// Stop receiving the options board.
    pub fn unsubscribe_options(&self) -> Result<()> {
        self.unsubscribe(&Subscription::Options);
        Ok(())
    }

    /// Receive the repos board.
    pub fn subscribe_repos(&self) -> Result<()> {
        self.subscribe(Subscription::Repos);
        Ok(())
    }

    /// Stop receiving the repos board.
    pub fn unsubscribe_repos(&self) -> Result<()> {
        self.unsubscribe(&Subscription::Repos);
        Ok(())
    }

    /// Receive quotes and books for every holding of the account.
    ///
    /// Requires a [`PortfolioSource`]; the holdings are listed again on each
    /// (re)connection. A failed listing is reported through `on_error` and
    /// retried with backoff while the link stays up.
    pub fn subscribe_personal_portfolio(&self) -> Result<()> {
        if self.core.portfolio.is_none() {
            return Err(HomeBrokerError::InvalidState(
                "no portfolio source configured".into(),
            ));
        }
        self.subscribe(Subscription::PersonalPortfolio);
        Ok(())
    }

    /// Leave every holding group of the personal portfolio.
    pub fn unsubscribe_personal_portfolio(&self) -> Result<()> {
        self.unsubscribe(&Subscription::PersonalPortfolio);
        Ok(())
    }

    /// Receive the level 2 book of `symbol` (case-insensitive).
    pub fn subscribe_order_book(&self, symbol: &str, settlement: Settlement) -> Result<()> {
        self.subscribe(order_book_subscription(symbol, settlement)?);
        Ok(())
    }

    /// Stop receiving the book of `symbol`.
    pub fn unsubscribe_order_book(&self, symbol: &str, settlement: Settlement) -> Result<()> {
        self.unsubscribe(&order_book_subscription(symbol, settlement)?);
        Ok(())
    }

    fn subscribe(&self, subscription: Subscription) {
        tracing::debug!(%subscription, "Subscribe");
        if self.core.registry.add(subscription) {
            self.core.wakeup.notify_one();
        }
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        tracing::debug!(%subscription, "Unsubscribe");
        if self.core.registry.remove(subscription) {
            self.core.wakeup.notify_one();
        }
    }
}

fn order_book_subscription(symbol: &str, settlement: Settlement) -> Result<Subscription> {
    if symbol.trim().is_empty() {
        return Err(HomeBrokerError::InvalidArgument(
            "order book symbol must not be empty".into(),
        ));
    }
    Ok(Subscription::order_book(symbol, settlement))
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}
