//! Desired-subscription registry.
//!
//! The registry is the source of truth for what the user wants to receive.
//! It is mutated only by explicit subscribe/unsubscribe calls and never talks
//! to the transport; the receive loop reads [`snapshot`](SubscriptionRegistry::snapshot)
//! whenever it (re)connects or is asked to reconcile.

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;

use crate::types::enums::{Board, Settlement};

/// A subscription the user can ask for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subscription {
    /// All securities of a board for one settlement term.
    SecurityBoard { board: Board, settlement: Settlement },
    /// The options board.
    Options,
    /// The repos board.
    Repos,
    /// Every holding of the account's personal portfolio.
    PersonalPortfolio,
    /// Level 2 book of one symbol.
    OrderBook { symbol: String, settlement: Settlement },
}

impl Subscription {
    /// Order book subscription with a normalized (trimmed, upper-case) symbol.
    pub fn order_book(symbol: &str, settlement: Settlement) -> Self {
        Self::OrderBook {
            symbol: symbol.trim().to_uppercase(),
            settlement,
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SecurityBoard { board, settlement } => write!(f, "board:{board}/{settlement}"),
            Self::Options => f.write_str("options"),
            Self::Repos => f.write_str("repos"),
            Self::PersonalPortfolio => f.write_str("personal_portfolio"),
            Self::OrderBook { symbol, settlement } => write!(f, "order_book:{symbol}/{settlement}"),
        }
    }
}

/// Thread-safe set of desired subscriptions.
///
/// The lock is held only for the mutation or the snapshot copy.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    desired: Mutex<HashSet<Subscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. Returns `false` if it was already present.
    pub fn add(&self, subscription: Subscription) -> bool {
        self.desired.lock().insert(subscription)
    }

    /// Remove a subscription. Returns `false` if it was not present.
    pub fn remove(&self, subscription: &Subscription) -> bool {
        self.desired.lock().remove(subscription)
    }

    /// Whether the subscription is currently desired.
    pub fn contains(&self, subscription: &Subscription) -> bool {
        self.desired.lock().contains(subscription)
    }

    /// Copy of the current desired set.
    pub fn snapshot(&self) -> HashSet<Subscription> {
        self.desired.lock().clone()
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.desired.lock().clear();
    }

    /// Number of desired subscriptions.
    pub fn len(&self) -> usize {
        self.desired.lock().len()
    }

    /// Whether nothing is desired.
    pub fn is_empty(&self) -> bool {
        self.desired.lock().is_empty()
    }
}
