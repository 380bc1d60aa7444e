//! Constants for the Home Broker SignalR market-data hub.
//!
//! Contains the hub name and endpoint paths, wire group names, supported
//! brokers, and default timeouts. These are used internally by
//! [`HubHttpClient`](crate::client::HubHttpClient) and the streaming session,
//! but are also exported for advanced usage.

use std::time::Duration;

// ---------------------------------------------------------------------------
// SignalR endpoint
// ---------------------------------------------------------------------------

/// Name of the SignalR hub that pushes quotes.
pub const HUB_NAME: &str = "stockpriceshub";

/// SignalR client protocol version spoken by the hub.
pub const CLIENT_PROTOCOL: &str = "1.5";

/// Path of the SignalR endpoint, relative to the broker page.
pub const SIGNALR_PATH: &str = "/signalr";

/// User agent presented to the broker web servers.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

// ---------------------------------------------------------------------------
// Hub methods
// ---------------------------------------------------------------------------

/// Server method used to join a quote group.
pub const METHOD_JOIN_GROUP: &str = "JoinGroup";

/// Server method used to leave a quote group.
pub const METHOD_QUIT_GROUP: &str = "QuitGroup";

/// Group carrying the options board.
pub const GROUP_OPTIONS: &str = "opciones-";

/// Group carrying the repos (cauciones) board.
pub const GROUP_REPOS: &str = "cauciones-";

/// Suffix of per-symbol order book groups.
pub const GROUP_ORDER_BOOK_SUFFIX: &str = "cj";

/// Suffix of per-symbol personal portfolio groups.
pub const GROUP_PORTFOLIO_SUFFIX: &str = "fv";

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on writing a single command to the transport.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time the hub has to acknowledge a command.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default first reconnect delay.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Default cap on the reconnect delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

// ---------------------------------------------------------------------------
// Brokers
// ---------------------------------------------------------------------------

/// A broker running the Home Broker platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Broker {
    /// Exchange-assigned broker id.
    pub id: u32,
    /// Legal name.
    pub name: &'static str,
    /// Base URL of the broker's web platform.
    pub page: &'static str,
}

impl Broker {
    /// Look up a supported broker by its id.
    pub fn by_id(id: u32) -> Option<&'static Broker> {
        BROKERS.iter().find(|b| b.id == id)
    }
}

/// Brokers known to expose the SignalR quote hub.
pub const BROKERS: &[Broker] = &[
    Broker {
        id: 12,
        name: "Buenos Aires Valores S.A.",
        page: "https://operarhb.bavsa.com",
    },
    Broker {
        id: 20,
        name: "Proficio Investment S.A.",
        page: "https://newsystem.proficioinvestment.com.ar",
    },
    Broker {
        id: 81,
        name: "Tomar Inversiones S.A",
        page: "https://clientes2.tminversiones.com.ar",
    },
    Broker {
        id: 88,
        name: "Bell Investments S.A.",
        page: "https://operar.bellbursatil.com",
    },
    Broker {
        id: 127,
        name: "Maestro y Huerres S.A",
        page: "https://operar.maestroyhuerres.com",
    },
    Broker {
        id: 153,
        name: "Bolsa de Comercio del Chaco",
        page: "https://clientes.bcch.org.ar",
    },
    Broker {
        id: 163,
        name: "Prosecurities S.A.",
        page: "http://operar.psec.com.ar",
    },
    Broker {
        id: 186,
        name: "Servente y Cia. S.A.",
        page: "http://clientes.serventeycia.com",
    },
    Broker {
        id: 201,
        name: "Alfy Inversiones S.A.",
        page: "https://acceso.alfyinversiones.com.ar",
    },
    Broker {
        id: 203,
        name: "Invertir en Bolsa S.A.",
        page: "https://clientesv2.invertirenbolsa.com.ar",
    },
    Broker {
        id: 209,
        name: "Futuro Bursátil S.A.",
        page: "https://homebroker.futurobursatil.com.ar",
    },
    Broker {
        id: 233,
        name: "Sailing S.A.",
        page: "https://login.sailinginversiones.com",
    },
    Broker {
        id: 265,
        name: "Negocios Financieros y Bursátiles S.A. (Cocos Capital)",
        page: "https://cocoscap.com",
    },
];
