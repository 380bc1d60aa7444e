//! Shared enum types that map to Home Broker wire codes.
//!
//! Each enum knows both its user-facing name (`"48hs"`, `"bluechips"`) and
//! the code used on the wire (`"3"`, `"accionesLideres"`).

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::HomeBrokerError;

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Settlement term of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Settlement {
    /// Same-day settlement (code `1`).
    #[serde(rename = "spot")]
    Spot,
    /// Next business day (code `2`).
    #[serde(rename = "24hs")]
    Hours24,
    /// Two business days (code `3`).
    #[serde(rename = "48hs")]
    Hours48,
}

impl Settlement {
    /// All settlement terms, shortest first.
    pub const ALL: [Settlement; 3] = [Self::Spot, Self::Hours24, Self::Hours48];

    /// The numeric code used in group names and frame `Term` fields.
    pub fn code(self) -> &'static str {
        match self {
            Self::Spot => "1",
            Self::Hours24 => "2",
            Self::Hours48 => "3",
        }
    }

    /// Construct from a wire code. Returns `None` for anything else.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(Self::Spot),
            "2" => Some(Self::Hours24),
            "3" => Some(Self::Hours48),
            _ => None,
        }
    }

    /// The user-facing name (`spot`, `24hs`, `48hs`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Hours24 => "24hs",
            Self::Hours48 => "48hs",
        }
    }
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Settlement {
    type Err = HomeBrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "24hs" => Ok(Self::Hours24),
            "48hs" => Ok(Self::Hours48),
            other => Err(HomeBrokerError::InvalidArgument(format!(
                "invalid settlement {other:?}: expected spot, 24hs or 48hs"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Holding term
// ---------------------------------------------------------------------------

/// Currencies quoted on the repo board.
pub const REPO_CURRENCIES: [&str; 2] = ["DOLAR", "PESOS"];

/// Option series symbols are exactly this long (`GFGC1200AB`).
const OPTION_SYMBOL_LEN: usize = 10;

/// Term of a personal portfolio holding.
///
/// Securities settle on a board term, option series carry no term and repos
/// are keyed by their maturity date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingTerm {
    Board(Settlement),
    Option,
    Repo(NaiveDate),
}

impl HoldingTerm {
    /// Term segment of the holding's group name: the settlement code, empty
    /// for options, `%Y%m%d` for repos.
    pub fn code(&self) -> String {
        match self {
            Self::Board(settlement) => settlement.code().to_owned(),
            Self::Option => String::new(),
            Self::Repo(maturity) => maturity.format("%Y%m%d").to_string(),
        }
    }

    /// Classify a holding from its symbol and wire `Term`.
    pub fn from_wire(symbol: &str, code: &str) -> Option<Self> {
        if symbol.len() == OPTION_SYMBOL_LEN {
            return Some(Self::Option);
        }
        if REPO_CURRENCIES.contains(&symbol) {
            return NaiveDate::parse_from_str(code.trim(), "%Y%m%d")
                .ok()
                .map(Self::Repo);
        }
        Settlement::from_code(code).map(Self::Board)
    }
}

impl From<Settlement> for HoldingTerm {
    fn from(settlement: Settlement) -> Self {
        Self::Board(settlement)
    }
}

impl fmt::Display for HoldingTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Board(settlement) => fmt::Display::fmt(settlement, f),
            Self::Option => f.write_str("option"),
            Self::Repo(maturity) => write!(f, "{}", maturity.format("%Y-%m-%d")),
        }
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// A named grouping of securities on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    /// Leading equities panel (`accionesLideres`).
    Bluechips,
    /// General equities panel (`panelGeneral`).
    GeneralBoard,
    /// Foreign depositary receipts (`cedears`).
    Cedears,
    /// Sovereign bonds (`rentaFija`).
    GovernmentBonds,
    /// Treasury bills (`letes`).
    ShortTermGovernmentBonds,
    /// Corporate bonds (`obligaciones`).
    CorporateBonds,
}

impl Board {
    /// Every board the hub publishes.
    pub const ALL: [Board; 6] = [
        Self::Bluechips,
        Self::GeneralBoard,
        Self::Cedears,
        Self::GovernmentBonds,
        Self::ShortTermGovernmentBonds,
        Self::CorporateBonds,
    ];

    /// The panel code used in group names and frame `Panel` fields.
    pub fn code(self) -> &'static str {
        match self {
            Self::Bluechips => "accionesLideres",
            Self::GeneralBoard => "panelGeneral",
            Self::Cedears => "cedears",
            Self::GovernmentBonds => "rentaFija",
            Self::ShortTermGovernmentBonds => "letes",
            Self::CorporateBonds => "obligaciones",
        }
    }

    /// Construct from a panel code as found in frames.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.code() == code)
    }

    /// The user-facing name (`bluechips`, `general_board`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bluechips => "bluechips",
            Self::GeneralBoard => "general_board",
            Self::Cedears => "cedears",
            Self::GovernmentBonds => "government_bonds",
            Self::ShortTermGovernmentBonds => "short_term_government_bonds",
            Self::CorporateBonds => "corporate_bonds",
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Board {
    type Err = HomeBrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == wanted)
            .ok_or_else(|| HomeBrokerError::InvalidArgument(format!("invalid board name {s:?}")))
    }
}

// ---------------------------------------------------------------------------
// Option kind
// ---------------------------------------------------------------------------

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    /// Construct from the `PutOrCall` frame code (1 = call, 2 = put).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Call),
            2 => Some(Self::Put),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_codes_round_trip_through_names() {
        for s in Settlement::ALL {
            assert_eq!(Settlement::from_code(s.code()), Some(s));
            assert_eq!(s.as_str().parse::<Settlement>().unwrap(), s);
        }
        assert_eq!(Settlement::from_code("9"), None);
        assert!("72hs".parse::<Settlement>().is_err());
    }

    #[test]
    fn board_parsing_is_case_insensitive() {
        assert_eq!("BlueChips".parse::<Board>().unwrap(), Board::Bluechips);
        assert_eq!(Board::from_code("letes"), Some(Board::ShortTermGovernmentBonds));
        assert_eq!(Board::from_code("unknown"), None);
    }

    #[test]
    fn holding_terms_follow_the_symbol() {
        assert_eq!(
            HoldingTerm::from_wire("GGAL", "3"),
            Some(HoldingTerm::Board(Settlement::Hours48))
        );
        assert_eq!(HoldingTerm::from_wire("GFGC1200AB", "0"), Some(HoldingTerm::Option));
        let maturity = NaiveDate::from_ymd_opt(2024, 3, 18).unwrap();
        assert_eq!(HoldingTerm::from_wire("PESOS", "20240318"), Some(HoldingTerm::Repo(maturity)));
        assert_eq!(HoldingTerm::from_wire("PESOS", "3"), None);
        assert_eq!(HoldingTerm::from_wire("GGAL", "7"), None);

        assert_eq!(HoldingTerm::Option.code(), "");
        assert_eq!(HoldingTerm::Repo(maturity).code(), "20240318");
    }
}
