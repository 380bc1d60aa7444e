//! # homebroker-rs
//!
//! A Rust client for the real-time market data hub of Argentine brokers
//! running the Home Broker platform.
//!
//! The crate does not log in: it takes the session cookies of an existing
//! login as an [`AuthContext`] and streams quotes, option and repo boards,
//! level 2 books and the personal portfolio over the broker's SignalR hub.
//!
//! ## Quick Start
//!
//! ```no_run
//! use homebroker_rs::{AuthContext, StreamingSession};
//! use homebroker_rs::types::{OrderBook, Settlement};
//!
//! #[tokio::main]
//! async fn main() -> homebroker_rs::Result<()> {
//!     let auth = AuthContext::from_cookie_header("https://cocoscap.com", "ASP.NET_SessionId=...")?;
//!     let session = StreamingSession::builder(auth)
//!         .on_order_book(|book: &OrderBook| {
//!             println!("{}: {:?}", book.symbol, book.best_bid());
//!             Ok(())
//!         })
//!         .build();
//!
//!     session.connect().await?;
//!     session.subscribe_order_book("GGAL", Settlement::Hours48)?;
//!     tokio::signal::ctrl_c().await.ok();
//!     session.disconnect().await
//! }
//! ```

pub mod auth;
pub mod client;
pub mod constants;
pub mod error;
pub mod types;
pub mod ws;

/// Re-export the session credentials at crate root for convenience.
pub use auth::AuthContext;
/// Re-export the error type and Result alias.
pub use error::{HomeBrokerError, Result};
/// Re-export the session entry points.
pub use ws::{StreamingSession, StreamingSessionBuilder};
