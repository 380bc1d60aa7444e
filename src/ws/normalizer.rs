//! Normalization of raw hub rows into typed records.
//!
//! Every function here is pure. A row that cannot be normalized (no symbol,
//! unknown settlement code) is dropped with a warning; the other rows of the
//! same frame are unaffected.
//!
//! # Number format
//!
//! Numeric fields arrive either as JSON numbers or as strings in the
//! Argentine locale, where `.` groups thousands and `,` is the decimal
//! separator (`"1.234,5"` is 1234.5). `"-"`, empty strings, `null` and
//! missing fields all mean "not available" and become `None`.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};

use crate::constants::{GROUP_OPTIONS, GROUP_REPOS};
use crate::types::enums::{Board, HoldingTerm, OptionKind, Settlement};
use crate::types::order_book::{OrderBook, PriceLevel};
use crate::types::quotes::{OptionContract, OptionQuote, PersonalPortfolioEntry, Quote, RepoQuote};
use crate::ws::protocol::{FrameKind, HubMessage};

/// A normalized record ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Security(Quote),
    Option(OptionQuote),
    Repo(RepoQuote),
    OrderBook(OrderBook),
    PersonalPortfolio(PersonalPortfolioEntry),
}

/// Why a row was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("row has no symbol")]
    MissingSymbol,
    #[error("unknown settlement code {0:?}")]
    UnknownSettlement(String),
    #[error("row has no strike price")]
    NotAnOption,
}

type RowResult<T> = std::result::Result<T, RowError>;

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Normalize every row of a hub message, in arrival order.
pub fn normalize(message: HubMessage) -> Vec<MarketEvent> {
    let rows = dedup_rows(message.rows);
    match message.kind {
        FrameKind::SecuritiesOptionsRepos => rows
            .iter()
            .filter_map(|row| keep(normalize_board_row(row), row))
            .collect(),
        FrameKind::PersonalPortfolio => rows
            .iter()
            .filter_map(|row| keep(portfolio_entry(row), row))
            .map(MarketEvent::PersonalPortfolio)
            .collect(),
        FrameKind::OrderBook => rows
            .iter()
            .filter_map(|row| keep(order_book(row), row))
            .map(MarketEvent::OrderBook)
            .collect(),
    }
}

/// Normalize a `broadcast` row into a security, option or repo quote.
///
/// The row's `Group` decides the board kind.
pub fn normalize_board_row(row: &Value) -> RowResult<MarketEvent> {
    match Row::new(row).text("Group").as_deref() {
        Some(GROUP_REPOS) => repo_quote(row).map(MarketEvent::Repo),
        Some(GROUP_OPTIONS) => option_quote(row).map(MarketEvent::Option),
        _ => security_quote(row).map(MarketEvent::Security),
    }
}

fn keep<T>(result: RowResult<T>, row: &Value) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(RowError::NotAnOption) => {
            tracing::trace!(symbol = ?Row::new(row).text("Symbol"), "Skipping non-option row");
            None
        }
        Err(e) => {
            tracing::warn!(
                symbol = ?Row::new(row).text("Symbol"),
                error = %e,
                "Dropping malformed quote row"
            );
            None
        }
    }
}

/// Collapse duplicate `(Symbol, Term)` rows to their last occurrence.
///
/// Each key keeps the position of its first occurrence.
pub fn dedup_rows(rows: Vec<Value>) -> Vec<Value> {
    let mut index: HashMap<(Option<String>, Option<String>), usize> = HashMap::new();
    let mut out: Vec<Value> = Vec::with_capacity(rows.len());
    for row in rows {
        let key = {
            let r = Row::new(&row);
            (r.text("Symbol"), r.text("Term"))
        };
        match index.get(&key) {
            Some(&i) => out[i] = row,
            None => {
                index.insert(key, out.len());
                out.push(row);
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Per board kind
// ---------------------------------------------------------------------------

fn security_quote(row: &Value) -> RowResult<Quote> {
    let r = Row::new(row);
    Ok(Quote {
        symbol: r.symbol()?,
        settlement: r.settlement()?,
        board: r.text("Panel").as_deref().and_then(Board::from_code),
        bid_size: r.num("BuyQuantity"),
        bid: r.num("BuyPrice"),
        ask: r.num("SellPrice"),
        ask_size: r.num("SellQuantity"),
        last: r.num("LastPrice"),
        change: r.num("VariationRate"),
        open: r.num("StartPrice"),
        high: r.num("MaxPrice"),
        low: r.num("MinPrice"),
        previous_close: r.num("PreviousClose"),
        turnover: r.num("TotalAmountTraded"),
        volume: r.num("TotalQuantityTraded"),
        operations: r.num("Trades"),
        datetime: r.datetime(),
    })
}

fn option_contract(r: &Row<'_>) -> Option<OptionContract> {
    let strike = r.num("StrikePrice").filter(|s| *s > 0.0)?;
    Some(OptionContract {
        expiration: r.date("MaturityDate"),
        strike,
        kind: r.num("PutOrCall").and_then(|c| OptionKind::from_code(c as i64)),
        underlying: r.text("Issuer"),
    })
}

fn option_quote(row: &Value) -> RowResult<OptionQuote> {
    let r = Row::new(row);
    let symbol = r.symbol()?;
    let contract = option_contract(&r).ok_or(RowError::NotAnOption)?;
    Ok(OptionQuote {
        symbol,
        bid_size: r.num("BuyQuantity"),
        bid: r.num("BuyPrice"),
        ask: r.num("SellPrice"),
        ask_size: r.num("SellQuantity"),
        last: r.num("LastPrice"),
        change: r.num("VariationRate"),
        open: r.num("StartPrice"),
        high: r.num("MaxPrice"),
        low: r.num("MinPrice"),
        previous_close: r.num("PreviousClose"),
        turnover: r.num("TotalAmountTraded"),
        volume: r.num("TotalQuantityTraded"),
        operations: r.num("Trades"),
        datetime: r.datetime(),
        contract,
    })
}

fn repo_quote(row: &Value) -> RowResult<RepoQuote> {
    let r = Row::new(row);
    Ok(RepoQuote {
        symbol: r.symbol()?,
        days: r.num("CantDias").and_then(non_negative_int),
        term: r.text("Term").unwrap_or_default(),
        bid_amount: r.num("BuyQuantity"),
        bid_rate: r.num("BuyPrice"),
        ask_rate: r.num("SellPrice"),
        ask_amount: r.num("SellQuantity"),
        last: r.num("LastPrice"),
        change: r.num("VariationRate"),
        open: r.num("StartPrice"),
        high: r.num("MaxPrice"),
        low: r.num("MinPrice"),
        previous_close: r.num("PreviousClose"),
        turnover: r.num("TotalAmountTraded"),
        volume: r.num("TotalQuantityTraded"),
        operations: r.num("Trades"),
        datetime: r.datetime(),
    })
}

fn order_book(row: &Value) -> RowResult<OrderBook> {
    let r = Row::new(row);
    let symbol = r.symbol()?;
    let settlement = r.settlement()?;
    let (bids, asks) = depth(row);
    Ok(OrderBook {
        symbol,
        settlement,
        bids,
        asks,
    })
}

/// Buy and sell levels of a row's `StockDepthBox`, empty when absent.
fn depth(row: &Value) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
    let depth = row
        .get("StockDepthBox")
        .and_then(|b| b.get("PriceDepthBox"))
        .filter(|d| d.is_object());
    let side = |name: &str, qty: &str, price: &str| {
        depth
            .and_then(|d| d.get(name))
            .and_then(Value::as_array)
            .map(|levels| price_levels(levels, qty, price))
            .unwrap_or_default()
    };
    (
        side("BuySide", "BuyQuantity", "BuyPrice"),
        side("SellSide", "SellQuantity", "SellPrice"),
    )
}

fn price_levels(levels: &[Value], qty_key: &str, price_key: &str) -> Vec<PriceLevel> {
    let mut out: Vec<PriceLevel> = levels
        .iter()
        .filter_map(|level| {
            let l = Row::new(level);
            let position = l
                .num("Pos")
                .and_then(non_negative_int)
                .and_then(|p| u8::try_from(p).ok())?;
            Some(PriceLevel {
                position,
                price: l.num(price_key),
                size: l.num(qty_key),
                orders: l.num("NumberOfOrders").and_then(non_negative_int),
            })
        })
        .collect();
    out.sort_by_key(|l| l.position);
    out
}

fn portfolio_entry(row: &Value) -> RowResult<PersonalPortfolioEntry> {
    let r = Row::new(row);
    let symbol = r.symbol()?;
    let contract = option_contract(&r);
    let term = match contract {
        Some(_) => HoldingTerm::Option,
        None => {
            let code = r.text("Term").unwrap_or_default();
            HoldingTerm::from_wire(&symbol, &code).ok_or(RowError::UnknownSettlement(code))?
        }
    };
    let (bids, asks) = depth(row);
    Ok(PersonalPortfolioEntry {
        symbol,
        term,
        bid_size: r.num("BuyQuantity"),
        bid: r.num("BuyPrice"),
        ask: r.num("SellPrice"),
        ask_size: r.num("SellQuantity"),
        last: r.num("LastPrice"),
        change: r.num("VariationRate"),
        open: r.num("StartPrice"),
        high: r.num("MaxPrice"),
        low: r.num("MinPrice"),
        previous_close: r.num("PreviousClose"),
        turnover: r.num("TotalAmountTraded"),
        volume: r.num("TotalQuantityTraded"),
        operations: r.num("Trades"),
        datetime: r.datetime(),
        contract,
        bids,
        asks,
    })
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

/// Parse a numeric field. See the module docs for the accepted formats.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == "-" {
                return None;
            }
            s.replace('.', "")
                .replace(',', ".")
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
        }
        _ => None,
    }
}

fn non_negative_int(v: f64) -> Option<u32> {
    (v >= 0.0 && v <= f64::from(u32::MAX)).then(|| v as u32)
}

struct Row<'a> {
    fields: Option<&'a Map<String, Value>>,
}

impl<'a> Row<'a> {
    fn new(value: &'a Value) -> Self {
        Self {
            fields: value.as_object(),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.fields.and_then(|f| f.get(key))
    }

    fn num(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(parse_number)
    }

    fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_owned())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn symbol(&self) -> RowResult<String> {
        self.text("Symbol")
            .map(|s| s.to_uppercase())
            .ok_or(RowError::MissingSymbol)
    }

    fn settlement(&self) -> RowResult<Settlement> {
        let code = self.text("Term").unwrap_or_default();
        Settlement::from_code(&code).ok_or(RowError::UnknownSettlement(code))
    }

    fn date(&self, key: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.text(key)?, "%Y%m%d").ok()
    }

    fn datetime(&self) -> Option<NaiveDateTime> {
        let date = self.date("TradeDate")?;
        let time = NaiveTime::parse_from_str(&self.text("Hour")?, "%H:%M:%S%.f").ok()?;
        Some(date.and_time(time))
    }
}
