//! SignalR wire format spoken by the quote hub.
//!
//! # Client → server
//!
//! Hub invocations are JSON text frames:
//!
//! ```text
//! {"H":"stockpriceshub","M":"JoinGroup","A":["accionesLideres-3"],"I":7}
//! ```
//!
//! # Server → client
//!
//! | Frame                                   | Meaning                         |
//! |-----------------------------------------|---------------------------------|
//! | `{}`                                    | keep-alive                      |
//! | `{"C":"…","S":1,"M":[]}`                | transport initialized           |
//! | `{"C":"…","M":[{"H","M","A"}]}`         | hub method invocations (data)   |
//! | `{"I":"7"}` / `{"I":"7","E":"…"}`       | command acknowledgment          |
//!
//! The hub method name selects a [`FrameKind`]. Frames that cannot be parsed
//! or carry no recognized method are dropped without error: the hub sends
//! empty and malformed keep-alive-like frames routinely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    GROUP_OPTIONS, GROUP_ORDER_BOOK_SUFFIX, GROUP_PORTFOLIO_SUFFIX, GROUP_REPOS, HUB_NAME,
    METHOD_JOIN_GROUP, METHOD_QUIT_GROUP,
};
use crate::error::Result;
use crate::types::enums::{Board, HoldingTerm, Settlement};
use crate::types::quotes::PortfolioSymbol;
use crate::ws::registry::Subscription;

// ---------------------------------------------------------------------------
// Outgoing commands
// ---------------------------------------------------------------------------

/// JSON hub invocation sent over the connection.
#[derive(Debug, Serialize)]
#[allow(non_snake_case)]
struct HubInvocation<'a> {
    H: &'a str,
    M: &'a str,
    A: [&'a str; 1],
    I: u64,
}

/// Whether a command joins or leaves a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCommand {
    Join,
    Quit,
}

impl GroupCommand {
    /// Hub method name for this command.
    pub fn method(self) -> &'static str {
        match self {
            Self::Join => METHOD_JOIN_GROUP,
            Self::Quit => METHOD_QUIT_GROUP,
        }
    }
}

/// Serialize a `JoinGroup` / `QuitGroup` invocation with the given id.
pub fn encode_group_command(command: GroupCommand, group: &str, id: u64) -> Result<String> {
    let invocation = HubInvocation {
        H: HUB_NAME,
        M: command.method(),
        A: [group],
        I: id,
    };
    Ok(serde_json::to_string(&invocation)?)
}

// ---------------------------------------------------------------------------
// Group names
// ---------------------------------------------------------------------------

/// Group carrying a board for one settlement term (`accionesLideres-3`).
pub fn board_group(board: Board, settlement: Settlement) -> String {
    format!("{}-{}", board.code(), settlement.code())
}

/// Group carrying the level 2 book of a symbol (`GGAL*3*cj`).
pub fn order_book_group(symbol: &str, settlement: Settlement) -> String {
    format!("{symbol}*{}*{GROUP_ORDER_BOOK_SUFFIX}", settlement.code())
}

/// Group carrying a personal portfolio holding: `GGAL*3*fv` for a security,
/// `GFGC1200AB**fv` for an option, `PESOS*20240318*fv` for a repo.
pub fn portfolio_group(symbol: &str, term: HoldingTerm) -> String {
    format!("{symbol}*{}*{GROUP_PORTFOLIO_SUFFIX}", term.code())
}

/// Wire groups a subscription maps to.
///
/// `holdings` is only consulted for [`Subscription::PersonalPortfolio`],
/// which expands to one group per holding.
pub fn groups_for(subscription: &Subscription, holdings: &[PortfolioSymbol]) -> Vec<String> {
    match subscription {
        Subscription::SecurityBoard { board, settlement } => vec![board_group(*board, *settlement)],
        Subscription::Options => vec![GROUP_OPTIONS.to_owned()],
        Subscription::Repos => vec![GROUP_REPOS.to_owned()],
        Subscription::PersonalPortfolio => holdings
            .iter()
            .map(|h| portfolio_group(&h.symbol, h.term))
            .collect(),
        Subscription::OrderBook { symbol, settlement } => {
            vec![order_book_group(symbol, *settlement)]
        }
    }
}

// ---------------------------------------------------------------------------
// Incoming frames
// ---------------------------------------------------------------------------

/// The kind of data a hub invocation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `broadcast`: board rows, split later into securities, options and repos.
    SecuritiesOptionsRepos,
    /// `sendStartStockFavoritos` / `sendStockFavoritos`.
    PersonalPortfolio,
    /// `sendStartStockPuntas` / `sendStockPuntas`.
    OrderBook,
}

impl FrameKind {
    /// Select the frame kind from a hub method name.
    pub fn from_method(method: &str) -> Option<Self> {
        const TABLE: [(&str, FrameKind); 5] = [
            ("broadcast", FrameKind::SecuritiesOptionsRepos),
            ("sendStartStockFavoritos", FrameKind::PersonalPortfolio),
            ("sendStockFavoritos", FrameKind::PersonalPortfolio),
            ("sendStartStockPuntas", FrameKind::OrderBook),
            ("sendStockPuntas", FrameKind::OrderBook),
        ];
        TABLE
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(method))
            .map(|(_, kind)| *kind)
    }
}

/// A hub invocation with a recognized kind and at least one row.
#[derive(Debug, Clone, PartialEq)]
pub struct HubMessage {
    pub kind: FrameKind,
    pub rows: Vec<Value>,
}

/// Acknowledgment of a command previously sent with id `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAck {
    pub id: u64,
    /// Hub-side error message, if the command failed.
    pub error: Option<String>,
}

/// A parsed server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Keep-alive or initialization frame without data.
    KeepAlive,
    /// Data-bearing hub invocations.
    Messages(Vec<HubMessage>),
    /// A command acknowledgment.
    Ack(CommandAck),
    /// An acknowledgment whose id could not be read.
    MalformedAck(String),
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct RawFrame {
    #[serde(default)]
    M: Option<Vec<RawHubMessage>>,
    #[serde(default)]
    I: Option<Value>,
    #[serde(default)]
    E: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct RawHubMessage {
    #[serde(default)]
    M: String,
    #[serde(default)]
    A: Vec<Value>,
}

/// Parse a text frame. Returns `None` for frames that must be dropped.
pub fn parse_frame(text: &str) -> Option<ServerFrame> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let raw: RawFrame = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::trace!(error = %e, "Dropping unparseable frame");
            return None;
        }
    };

    if let Some(id) = raw.I {
        let parsed = match &id {
            Value::String(s) => s.parse::<u64>().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        };
        return Some(match parsed {
            Some(id) => ServerFrame::Ack(CommandAck { id, error: raw.E }),
            None => ServerFrame::MalformedAck(id.to_string()),
        });
    }

    let messages: Vec<HubMessage> = raw
        .M
        .unwrap_or_default()
        .into_iter()
        .filter_map(|m| {
            let Some(kind) = FrameKind::from_method(&m.M) else {
                tracing::trace!(method = %m.M, "Dropping unknown hub method");
                return None;
            };
            let rows = payload_rows(m.A);
            (!rows.is_empty()).then_some(HubMessage { kind, rows })
        })
        .collect();

    if messages.is_empty() {
        Some(ServerFrame::KeepAlive)
    } else {
        Some(ServerFrame::Messages(messages))
    }
}

/// Flatten the first invocation argument into row objects.
fn payload_rows(args: Vec<Value>) -> Vec<Value> {
    match args.into_iter().next() {
        Some(Value::Array(items)) => items.into_iter().filter(Value::is_object).collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    }
}
