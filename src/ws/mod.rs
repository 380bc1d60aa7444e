//! Real-time market data over the broker's SignalR hub.
//!
//! ## [`session`]: Streaming Session
//!
//! [`StreamingSession`](session::StreamingSession) is the entry point. It
//! keeps a registry of desired subscriptions, owns one task that talks to
//! the hub, and hands every normalized record to a user callback:
//!
//! | Callback                | Record                                              |
//! |-------------------------|-----------------------------------------------------|
//! | `on_securities`         | [`Quote`](crate::types::Quote)                      |
//! | `on_options`            | [`OptionQuote`](crate::types::OptionQuote)          |
//! | `on_repos`              | [`RepoQuote`](crate::types::RepoQuote)              |
//! | `on_order_book`         | [`OrderBook`](crate::types::OrderBook)              |
//! | `on_personal_portfolio` | [`PersonalPortfolioEntry`](crate::types::PersonalPortfolioEntry) |
//! | `on_open` / `on_close`  | lifecycle notifications                             |
//! | `on_error`              | [`SessionError`](dispatcher::SessionError)          |
//!
//! ## Building blocks
//!
//! - [`registry`]: the desired-subscription set
//! - [`state`] and [`reconnect`]: connection state machine and backoff
//! - [`protocol`]: SignalR frames and group names
//! - [`normalizer`]: raw rows to typed records
//! - [`dispatcher`]: callback slots with a fault barrier
//! - [`transport`] and [`signalr`]: the connection seam and its WebSocket
//!   implementation

mod connection;
pub mod dispatcher;
pub mod normalizer;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod session;
pub mod signalr;
pub mod state;
pub mod transport;

pub use dispatcher::{CloseReason, ConnectionClosed, ConnectionOpened, EventCategory, SessionError};
pub use registry::Subscription;
pub use session::{SessionConfig, StreamingSession, StreamingSessionBuilder};
pub use state::ConnectionState;
pub use transport::{CommandSink, Link, PortfolioSource, Transport};
