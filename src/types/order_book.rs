//! Level 2 order book snapshots.

use serde::Serialize;

use super::enums::Settlement;

/// A single price level on one side of the book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceLevel {
    /// 1-based depth position (1 = best price).
    pub position: u8,
    pub price: Option<f64>,
    pub size: Option<f64>,
    /// Number of resting orders at this level.
    pub orders: Option<u32>,
}

/// Full snapshot of a symbol's book.
///
/// Every frame carries the whole book, so a new snapshot replaces the
/// previous one instead of merging with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBook {
    pub symbol: String,
    pub settlement: Settlement,
    /// Buy side, best (highest) price first.
    pub bids: Vec<PriceLevel>,
    /// Sell side, best (lowest) price first.
    pub asks: Vec<PriceLevel>,
}

impl OrderBook {
    /// Best bid level, if any.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask level, if any.
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Whether both sides are empty.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
