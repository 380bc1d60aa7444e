//! Callback slots and the fault barrier around them.
//!
//! There is one slot per [`EventCategory`]. Delivery runs synchronously on
//! the receive loop, one record per invocation, in arrival order. A callback
//! that returns `Err` or panics is reported to the error slot as a
//! [`HomeBrokerError::CallbackFault`] and the loop carries on. A fault in the
//! error callback itself is only logged.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{CallbackError, CallbackPanic, HomeBrokerError};
use crate::types::order_book::OrderBook;
use crate::types::quotes::{OptionQuote, PersonalPortfolioEntry, Quote, RepoQuote};
use crate::ws::normalizer::MarketEvent;

/// A user callback for events of type `T`.
pub type Callback<T> = Arc<dyn Fn(&T) -> Result<(), CallbackError> + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// The callback categories a session can deliver to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Open,
    PersonalPortfolio,
    Securities,
    Options,
    Repos,
    OrderBook,
    Error,
    Close,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::PersonalPortfolio => "personal_portfolio",
            Self::Securities => "securities",
            Self::Options => "options",
            Self::Repos => "repos",
            Self::OrderBook => "order_book",
            Self::Error => "error",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

/// Delivered when the hub connection is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOpened {
    /// `true` when this is an automatic reconnection, not a `connect()` call.
    pub resumed: bool,
}

/// Why a session went back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `disconnect()` was called.
    UserRequested,
    /// Every reconnect attempt failed.
    RetriesExhausted,
    /// The session context expired or was rejected while reconnecting.
    AuthenticationExpired,
    /// The connection dropped and automatic reconnection is disabled.
    ConnectionLost,
}

/// Delivered once when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionClosed {
    pub reason: CloseReason,
}

/// An asynchronous failure reported through the error callback.
#[derive(Debug)]
pub struct SessionError {
    pub error: HomeBrokerError,
    /// The transport connection was lost.
    pub connection_lost: bool,
    /// A reconnect will be attempted. `connection_lost && !will_retry` means
    /// the session is closed and `connect()` must be called again.
    pub will_retry: bool,
}

impl SessionError {
    /// An error that did not affect the connection.
    pub fn recoverable(error: HomeBrokerError) -> Self {
        Self {
            error,
            connection_lost: false,
            will_retry: false,
        }
    }

    /// The connection dropped.
    pub fn connection_lost(error: HomeBrokerError, will_retry: bool) -> Self {
        Self {
            error,
            connection_lost: true,
            will_retry,
        }
    }
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

struct Slot<T> {
    callback: RwLock<Option<Callback<T>>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            callback: RwLock::new(None),
        }
    }
}

impl<T> Slot<T> {
    fn set(&self, callback: Callback<T>) {
        *self.callback.write() = Some(callback);
    }

    /// Clone the callback out so the lock is not held while it runs.
    fn get(&self) -> Option<Callback<T>> {
        self.callback.read().clone()
    }
}

/// Routes events to the registered callbacks.
#[derive(Default)]
pub struct Dispatcher {
    open: Slot<ConnectionOpened>,
    personal_portfolio: Slot<PersonalPortfolioEntry>,
    securities: Slot<Quote>,
    options: Slot<OptionQuote>,
    repos: Slot<RepoQuote>,
    order_book: Slot<OrderBook>,
    error: Slot<SessionError>,
    close: Slot<ConnectionClosed>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

macro_rules! setter {
    ($name:ident, $slot:ident, $ty:ty) => {
        #[doc = concat!("Replace the `", stringify!($slot), "` callback.")]
        pub fn $name<F>(&self, f: F)
        where
            F: Fn(&$ty) -> Result<(), CallbackError> + Send + Sync + 'static,
        {
            self.$slot.set(Arc::new(f));
        }
    };
}

impl Dispatcher {
    /// A dispatcher with every slot empty.
    pub fn new() -> Self {
        Self::default()
    }

    setter!(set_on_open, open, ConnectionOpened);
    setter!(set_on_personal_portfolio, personal_portfolio, PersonalPortfolioEntry);
    setter!(set_on_securities, securities, Quote);
    setter!(set_on_options, options, OptionQuote);
    setter!(set_on_repos, repos, RepoQuote);
    setter!(set_on_order_book, order_book, OrderBook);
    setter!(set_on_error, error, SessionError);
    setter!(set_on_close, close, ConnectionClosed);

    /// Deliver a normalized record to its category.
    pub fn dispatch(&self, event: &MarketEvent) {
        match event {
            MarketEvent::Security(q) => {
                self.deliver(EventCategory::Securities, &self.securities, q)
            }
            MarketEvent::Option(q) => self.deliver(EventCategory::Options, &self.options, q),
            MarketEvent::Repo(q) => self.deliver(EventCategory::Repos, &self.repos, q),
            MarketEvent::OrderBook(b) => {
                self.deliver(EventCategory::OrderBook, &self.order_book, b)
            }
            MarketEvent::PersonalPortfolio(e) => {
                self.deliver(EventCategory::PersonalPortfolio, &self.personal_portfolio, e)
            }
        }
    }

    /// Notify the open callback.
    pub fn opened(&self, event: ConnectionOpened) {
        self.deliver(EventCategory::Open, &self.open, &event);
    }

    /// Notify the close callback.
    pub fn closed(&self, event: ConnectionClosed) {
        self.deliver(EventCategory::Close, &self.close, &event);
    }

    /// Report an error. Faults raised by the error callback are swallowed.
    pub fn error(&self, event: SessionError) {
        let Some(callback) = self.error.get() else {
            tracing::debug!(error = %event.error, "No error callback registered");
            return;
        };
        if let Err(fault) = invoke(&callback, &event) {
            tracing::error!(
                error = %fault,
                original = %event.error,
                "Error callback failed"
            );
        }
    }

    fn deliver<T>(&self, category: EventCategory, slot: &Slot<T>, value: &T) {
        let Some(callback) = slot.get() else {
            return;
        };
        if let Err(source) = invoke(&callback, value) {
            tracing::warn!(%category, error = %source, "Callback fault");
            self.error(SessionError::recoverable(HomeBrokerError::CallbackFault {
                category,
                source,
            }));
        }
    }
}

/// Run a callback, turning a panic into an error.
fn invoke<T>(callback: &Callback<T>, value: &T) -> Result<(), CallbackError> {
    match catch_unwind(AssertUnwindSafe(|| callback(value))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            Err(Box::new(CallbackPanic(message)))
        }
    }
}
