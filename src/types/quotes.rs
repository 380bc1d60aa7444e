//! Typed quote records produced by the normalizer.
//!
//! Numeric fields are `Option`s: `None` means the hub did not publish a value
//! (a missing field, `null`, or `"-"`). Zero is a real price or size and is
//! kept as `Some(0.0)`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::enums::{Board, HoldingTerm, OptionKind, Settlement};
use super::order_book::PriceLevel;

// ---------------------------------------------------------------------------
// Securities
// ---------------------------------------------------------------------------

/// A quote for a security on one of the boards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub settlement: Settlement,
    /// Board the row was published on, when the panel code is known.
    pub board: Option<Board>,
    pub bid_size: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub ask_size: Option<f64>,
    pub last: Option<f64>,
    /// Variation against the previous close, in percent.
    pub change: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
    /// Traded amount in currency.
    pub turnover: Option<f64>,
    /// Traded quantity.
    pub volume: Option<f64>,
    /// Number of trades.
    pub operations: Option<f64>,
    pub datetime: Option<NaiveDateTime>,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Contract terms of an option series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionContract {
    pub expiration: Option<NaiveDate>,
    pub strike: f64,
    pub kind: Option<OptionKind>,
    /// Underlying asset symbol.
    pub underlying: Option<String>,
}

/// A quote for an option series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionQuote {
    pub symbol: String,
    pub bid_size: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub ask_size: Option<f64>,
    pub last: Option<f64>,
    pub change: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
    pub turnover: Option<f64>,
    pub volume: Option<f64>,
    pub operations: Option<f64>,
    pub datetime: Option<NaiveDateTime>,
    pub contract: OptionContract,
}

// ---------------------------------------------------------------------------
// Repos
// ---------------------------------------------------------------------------

/// A quote for a repo (caución). Bids and asks are rates, sizes are amounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoQuote {
    /// Currency of the repo (e.g. `PESOS`, `DOLAR`).
    pub symbol: String,
    /// Term in days.
    pub days: Option<u32>,
    /// Raw term as published (the maturity date for repos).
    pub term: String,
    pub bid_amount: Option<f64>,
    pub bid_rate: Option<f64>,
    pub ask_rate: Option<f64>,
    pub ask_amount: Option<f64>,
    pub last: Option<f64>,
    pub change: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
    pub turnover: Option<f64>,
    pub volume: Option<f64>,
    pub operations: Option<f64>,
    pub datetime: Option<NaiveDateTime>,
}

// ---------------------------------------------------------------------------
// Personal portfolio
// ---------------------------------------------------------------------------

/// One holding of the personal portfolio: its quote joined with its book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalPortfolioEntry {
    pub symbol: String,
    pub term: HoldingTerm,
    pub bid_size: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub ask_size: Option<f64>,
    pub last: Option<f64>,
    pub change: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
    pub turnover: Option<f64>,
    pub volume: Option<f64>,
    pub operations: Option<f64>,
    pub datetime: Option<NaiveDateTime>,
    /// Present when the holding is an option series.
    pub contract: Option<OptionContract>,
    /// Buy side of the book, best price first.
    pub bids: Vec<PriceLevel>,
    /// Sell side of the book, best price first.
    pub asks: Vec<PriceLevel>,
}

impl PersonalPortfolioEntry {
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }
}

/// A holding used to expand the personal portfolio subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortfolioSymbol {
    pub symbol: String,
    pub term: HoldingTerm,
}

impl PortfolioSymbol {
    /// A security held on a board term. The symbol is upper-cased.
    pub fn new(symbol: impl Into<String>, settlement: Settlement) -> Self {
        Self::with_term(symbol, HoldingTerm::Board(settlement))
    }

    /// An option series.
    pub fn option(symbol: impl Into<String>) -> Self {
        Self::with_term(symbol, HoldingTerm::Option)
    }

    /// A repo in `currency` maturing on `maturity`.
    pub fn repo(currency: impl Into<String>, maturity: NaiveDate) -> Self {
        Self::with_term(currency, HoldingTerm::Repo(maturity))
    }

    pub fn with_term(symbol: impl Into<String>, term: HoldingTerm) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            term,
        }
    }
}
