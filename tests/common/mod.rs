//! In-memory hub used by the integration tests.
//!
//! [`FakeHub`] hands out [`FakeTransport`]s. Every link it opens records the
//! hub commands written to it and reads frames pushed with
//! [`FakeHub::push_frame`]. Dropping the link from the test side
//! ([`FakeHub::drop_connection`]) ends the frame stream like a lost socket.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use homebroker_rs::auth::AuthContext;
use homebroker_rs::error::{HomeBrokerError, Result};
use homebroker_rs::types::{OrderBook, PersonalPortfolioEntry, PortfolioSymbol, Quote};
use homebroker_rs::ws::{
    CloseReason, CommandSink, ConnectionClosed, ConnectionOpened, Link, PortfolioSource,
    SessionError, StreamingSessionBuilder, Transport,
};

/// A hub command captured from the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    /// 1-based number of the link it was written to.
    pub connection: usize,
    pub method: String,
    pub group: String,
    pub id: u64,
}

/// How the next `open` should fail.
#[derive(Debug, Clone, Copy)]
pub enum OpenFailure {
    Network,
    Rejected,
    Hang,
}

#[derive(Default)]
struct HubState {
    sent: Mutex<Vec<SentCommand>>,
    frames: Mutex<Option<mpsc::UnboundedSender<Result<String>>>>,
    failures: Mutex<VecDeque<OpenFailure>>,
    fail_always: Mutex<Option<OpenFailure>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    no_ack: AtomicBool,
    reject_groups: Mutex<Vec<String>>,
}

/// Test-side handle of the fake hub.
#[derive(Clone, Default)]
pub struct FakeHub {
    state: Arc<HubState>,
}

impl FakeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            state: Arc::clone(&self.state),
        }
    }

    /// Every command written so far, across links.
    pub fn sent(&self) -> Vec<SentCommand> {
        self.state.sent.lock().clone()
    }

    /// Groups joined on link `connection`, in write order.
    pub fn joins_on(&self, connection: usize) -> Vec<String> {
        self.commands_on(connection, "JoinGroup")
    }

    pub fn quits_on(&self, connection: usize) -> Vec<String> {
        self.commands_on(connection, "QuitGroup")
    }

    fn commands_on(&self, connection: usize, method: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|c| c.connection == connection && c.method == method)
            .map(|c| c.group)
            .collect()
    }

    /// Number of `open` calls, failed ones included.
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Number of links closed by the session.
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Queue a failure for the next `open`.
    pub fn fail_next_open(&self, failure: OpenFailure) {
        self.state.failures.lock().push_back(failure);
    }

    /// Fail every `open` from now on.
    pub fn fail_all_opens(&self, failure: OpenFailure) {
        *self.state.fail_always.lock() = Some(failure);
    }

    /// Stop acknowledging commands.
    pub fn disable_acks(&self) {
        self.state.no_ack.store(true, Ordering::SeqCst);
    }

    /// Acknowledge joins of `group` with an error.
    pub fn reject_group(&self, group: &str) {
        self.state.reject_groups.lock().push(group.to_owned());
    }

    /// Push a raw text frame on the current link.
    pub fn push_frame(&self, frame: impl Into<String>) {
        if let Some(tx) = self.state.frames.lock().as_ref() {
            let _ = tx.send(Ok(frame.into()));
        }
    }

    /// Push a hub invocation carrying `rows`.
    pub fn push_rows(&self, method: &str, rows: Value) {
        let frame = json!({
            "C": "d-1",
            "M": [{"H": "StockPricesHub", "M": method, "A": [rows]}],
        });
        self.push_frame(frame.to_string());
    }

    /// End the current link's frame stream.
    pub fn drop_connection(&self) {
        self.state.frames.lock().take();
    }
}

/// [`Transport`] backed by a [`FakeHub`].
#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<HubState>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, _auth: &AuthContext) -> Result<Link> {
        let connection = self.state.opens.fetch_add(1, Ordering::SeqCst) + 1;

        let failure = self
            .state
            .failures
            .lock()
            .pop_front()
            .or(*self.state.fail_always.lock());
        match failure {
            Some(OpenFailure::Network) => {
                return Err(HomeBrokerError::Connection("connection refused".into()));
            }
            Some(OpenFailure::Rejected) => {
                return Err(HomeBrokerError::Authentication("session rejected".into()));
            }
            Some(OpenFailure::Hang) => std::future::pending::<()>().await,
            None => {}
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.frames.lock() = Some(tx);

        let frames = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        Ok(Link {
            sink: Box::new(FakeSink {
                state: Arc::clone(&self.state),
                connection,
            }),
            frames,
        })
    }
}

struct FakeSink {
    state: Arc<HubState>,
    connection: usize,
}

#[async_trait]
impl CommandSink for FakeSink {
    async fn send(&mut self, text: String) -> Result<()> {
        let value: Value = serde_json::from_str(&text)?;
        let command = SentCommand {
            connection: self.connection,
            method: value["M"].as_str().unwrap_or_default().to_owned(),
            group: value["A"][0].as_str().unwrap_or_default().to_owned(),
            id: value["I"].as_u64().unwrap_or_default(),
        };
        let rejected = self.state.reject_groups.lock().contains(&command.group);
        let id = command.id;
        self.state.sent.lock().push(command);

        if !self.state.no_ack.load(Ordering::SeqCst) {
            let ack = if rejected {
                json!({"I": id.to_string(), "E": "group does not exist"})
            } else {
                json!({"I": id.to_string()})
            };
            if let Some(tx) = self.state.frames.lock().as_ref() {
                let _ = tx.send(Ok(ack.to_string()));
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.frames.lock().take();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Portfolio sources
// ---------------------------------------------------------------------------

/// A [`PortfolioSource`] that fails its first `failures` calls, or never
/// answers when `hang` is set.
#[derive(Clone, Default)]
pub struct ScriptedPortfolio {
    holdings: Vec<PortfolioSymbol>,
    failures: Arc<AtomicUsize>,
    hang: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedPortfolio {
    pub fn failing(failures: usize, holdings: Vec<PortfolioSymbol>) -> Self {
        Self {
            holdings,
            failures: Arc::new(AtomicUsize::new(failures)),
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// Number of `holdings` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortfolioSource for ScriptedPortfolio {
    async fn holdings(&self) -> Result<Vec<PortfolioSymbol>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(HomeBrokerError::Connection(
                "portfolio endpoint unavailable".into(),
            ));
        }
        Ok(self.holdings.clone())
    }
}

// ---------------------------------------------------------------------------
// Event recording
// ---------------------------------------------------------------------------

/// A callback invocation, in delivery order.
#[derive(Debug, Clone)]
pub enum Seen {
    Open { resumed: bool },
    Security(Quote),
    OrderBook(OrderBook),
    Portfolio(PersonalPortfolioEntry),
    Error {
        message: String,
        fault: bool,
        protocol: bool,
        connection_lost: bool,
        will_retry: bool,
    },
    Close(CloseReason),
}

/// Shared log of every callback invocation.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Seen> {
        self.events.lock().clone()
    }

    pub fn quotes(&self) -> Vec<Quote> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Seen::Security(q) => Some(q),
                _ => None,
            })
            .collect()
    }

    pub fn books(&self) -> Vec<OrderBook> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Seen::OrderBook(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<Seen> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Seen::Error { .. }))
            .collect()
    }

    pub fn closes(&self) -> Vec<CloseReason> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Seen::Close(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Register every recording callback on `builder`.
    pub fn attach(&self, builder: StreamingSessionBuilder) -> StreamingSessionBuilder {
        let open = self.events.clone();
        let quote = self.events.clone();
        let book = self.events.clone();
        let portfolio = self.events.clone();
        let error = self.events.clone();
        let close = self.events.clone();
        builder
            .on_open(move |e: &ConnectionOpened| {
                open.lock().push(Seen::Open { resumed: e.resumed });
                Ok(())
            })
            .on_securities(move |q: &Quote| {
                quote.lock().push(Seen::Security(q.clone()));
                Ok(())
            })
            .on_order_book(move |b: &OrderBook| {
                book.lock().push(Seen::OrderBook(b.clone()));
                Ok(())
            })
            .on_personal_portfolio(move |p: &PersonalPortfolioEntry| {
                portfolio.lock().push(Seen::Portfolio(p.clone()));
                Ok(())
            })
            .on_error(move |e: &SessionError| {
                error.lock().push(Seen::Error {
                    message: e.error.to_string(),
                    fault: matches!(e.error, HomeBrokerError::CallbackFault { .. }),
                    protocol: matches!(e.error, HomeBrokerError::Protocol(_)),
                    connection_lost: e.connection_lost,
                    will_retry: e.will_retry,
                });
                Ok(())
            })
            .on_close(move |c: &ConnectionClosed| {
                close.lock().push(Seen::Close(c.reason));
                Ok(())
            })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn auth() -> AuthContext {
    AuthContext::new("https://example.com", [("ASP.NET_SessionId", "test")])
}

/// A builder wired to `hub` with fast timeouts and backoff.
pub fn builder(hub: &FakeHub) -> StreamingSessionBuilder {
    StreamingSessionBuilder::new(auth())
        .transport(hub.transport())
        .connect_timeout(Duration::from_millis(200))
        .command_timeout(Duration::from_millis(200))
        .ack_timeout(Duration::from_secs(5))
        .initial_backoff(Duration::from_millis(5))
        .max_backoff(Duration::from_millis(20))
        .max_reconnect_attempts(5)
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Give the session task a moment to process anything in flight.
pub fn settle() -> impl Future<Output = ()> {
    tokio::time::sleep(Duration::from_millis(50))
}

/// A `broadcast` row for a security.
pub fn security_row(symbol: &str, settlement_code: &str, bid: f64, ask: f64) -> Value {
    json!({
        "Symbol": symbol,
        "Term": settlement_code,
        "BuyQuantity": 100,
        "BuyPrice": bid,
        "SellPrice": ask,
        "SellQuantity": 200,
        "LastPrice": bid,
        "TradeDate": "20240315",
        "Hour": "14:30:05",
        "Panel": "accionesLideres",
        "Group": format!("accionesLideres-{settlement_code}"),
    })
}
