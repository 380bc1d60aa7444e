//! Session behavior against the in-memory hub.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use common::{
    FakeHub, OpenFailure, Recorder, ScriptedPortfolio, Seen, builder, security_row, settle,
    wait_until,
};
use homebroker_rs::error::HomeBrokerError;
use homebroker_rs::types::{Board, HoldingTerm, PortfolioSymbol, Quote, Settlement};
use homebroker_rs::ws::{CloseReason, ConnectionState, SessionError, Subscription};

// ===================================================================
// Happy path
// ===================================================================

#[tokio::test]
async fn board_quote_reaches_securities_callback() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder.attach(builder(&hub)).build();

    session.connect().await.unwrap();
    assert!(session.is_connected());
    session
        .subscribe_security_board(Board::Bluechips, Settlement::Hours48)
        .unwrap();

    wait_until("join", || hub.joins_on(1) == vec!["accionesLideres-3"]).await;
    hub.push_rows("broadcast", json!([security_row("GGAL", "3", 120.5, 121.0)]));

    wait_until("quote", || !recorder.quotes().is_empty()).await;
    settle().await;

    let quotes = recorder.quotes();
    assert_eq!(quotes.len(), 1);
    let q = &quotes[0];
    assert_eq!(q.symbol, "GGAL");
    assert_eq!(q.bid, Some(120.5));
    assert_eq!(q.ask, Some(121.0));
    assert_eq!(q.settlement, Settlement::Hours48);
    assert_eq!(q.board, Some(Board::Bluechips));
    assert!(recorder.errors().is_empty(), "{:?}", recorder.errors());

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn open_fires_before_quotes() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder.attach(builder(&hub)).build();

    session.connect().await.unwrap();
    hub.push_rows("broadcast", json!(security_row("YPFD", "1", 30.0, 31.0)));
    wait_until("quote", || recorder.quotes().len() == 1).await;

    let events = recorder.events();
    assert!(matches!(events[0], Seen::Open { resumed: false }), "{events:?}");
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn keep_alives_and_garbage_frames_are_ignored() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder.attach(builder(&hub)).build();

    session.connect().await.unwrap();
    hub.push_frame("{}");
    hub.push_frame("");
    hub.push_frame("not json at all");
    hub.push_frame(r#"{"C":"x","M":[{"H":"h","M":"unknownMethod","A":[[{"Symbol":"X"}]]}]}"#);
    hub.push_rows("broadcast", json!([security_row("GGAL", "3", 1.0, 2.0)]));

    wait_until("quote", || recorder.quotes().len() == 1).await;
    assert!(recorder.errors().is_empty());
    assert!(session.is_connected());
    session.disconnect().await.unwrap();
}

// ===================================================================
// Subscriptions
// ===================================================================

#[tokio::test]
async fn subscriptions_made_while_disconnected_are_sent_on_connect() {
    let hub = FakeHub::new();
    let session = builder(&hub).build();

    session.subscribe_options().unwrap();
    session.subscribe_repos().unwrap();
    session.unsubscribe_repos().unwrap();
    settle().await;
    assert!(hub.sent().is_empty());

    session.connect().await.unwrap();
    wait_until("replay", || !hub.joins_on(1).is_empty()).await;
    settle().await;
    assert_eq!(hub.joins_on(1), vec!["opciones-"]);
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn unsubscribe_quits_the_group_and_duplicates_are_not_resent() {
    let hub = FakeHub::new();
    let session = builder(&hub).build();
    session.connect().await.unwrap();

    session.subscribe_order_book("ggal", Settlement::Spot).unwrap();
    session.subscribe_order_book("GGAL", Settlement::Spot).unwrap();
    wait_until("join", || hub.joins_on(1) == vec!["GGAL*1*cj"]).await;

    session.unsubscribe_order_book("GGAL", Settlement::Spot).unwrap();
    wait_until("quit", || hub.quits_on(1) == vec!["GGAL*1*cj"]).await;

    session.unsubscribe_order_book("GGAL", Settlement::Spot).unwrap();
    settle().await;
    assert_eq!(hub.sent().len(), 2);
    assert!(session.subscriptions().is_empty());
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn registry_reflects_net_effect_across_connect_and_disconnect() {
    let hub = FakeHub::new();
    let session = builder(&hub).build();

    session
        .subscribe_security_board(Board::Cedears, Settlement::Hours24)
        .unwrap();
    session.connect().await.unwrap();
    session.subscribe_options().unwrap();
    session
        .unsubscribe_security_board(Board::Cedears, Settlement::Hours24)
        .unwrap();
    session.disconnect().await.unwrap();
    session.subscribe_order_book("AL30", Settlement::Spot).unwrap();
    session.connect().await.unwrap();
    session.subscribe_repos().unwrap();

    let expected: HashSet<Subscription> = [
        Subscription::Options,
        Subscription::order_book("AL30", Settlement::Spot),
        Subscription::Repos,
    ]
    .into_iter()
    .collect();
    assert_eq!(session.subscriptions(), expected);

    wait_until("second link joins", || hub.joins_on(2).len() == 3).await;
    let joined: HashSet<String> = hub.joins_on(2).into_iter().collect();
    let wanted: HashSet<String> = ["opciones-", "AL30*1*cj", "cauciones-"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(joined, wanted);
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn personal_portfolio_expands_to_holdings() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder
        .attach(builder(&hub))
        .portfolio_source(vec![
            PortfolioSymbol::new("ggal", Settlement::Hours48),
            PortfolioSymbol::new("AL30", Settlement::Spot),
        ])
        .build();

    session.connect().await.unwrap();
    session.subscribe_personal_portfolio().unwrap();
    wait_until("portfolio joins", || hub.joins_on(1).len() == 2).await;
    let joined: HashSet<String> = hub.joins_on(1).into_iter().collect();
    assert!(joined.contains("GGAL*3*fv"));
    assert!(joined.contains("AL30*1*fv"));

    let mut row = security_row("GGAL", "3", 120.5, 121.0);
    row["StockDepthBox"] = json!({"PriceDepthBox": {
        "BuySide": [{"Pos": 1, "BuyQuantity": 10, "BuyPrice": 120.5, "NumberOfOrders": 1}],
        "SellSide": [{"Pos": 1, "SellQuantity": 5, "SellPrice": 121.0, "NumberOfOrders": 2}],
    }});
    hub.push_rows("sendStartStockFavoritos", json!([row]));

    wait_until("portfolio entry", || {
        recorder
            .events()
            .iter()
            .any(|e| matches!(e, Seen::Portfolio(_)))
    })
    .await;
    let entry = recorder
        .events()
        .into_iter()
        .find_map(|e| match e {
            Seen::Portfolio(p) => Some(p),
            _ => None,
        })
        .unwrap();
    assert_eq!(entry.symbol, "GGAL");
    assert_eq!(entry.term, HoldingTerm::Board(Settlement::Hours48));
    assert_eq!(entry.best_ask().and_then(|l| l.price), Some(121.0));

    session.unsubscribe_personal_portfolio().unwrap();
    wait_until("portfolio quits", || hub.quits_on(1).len() == 2).await;
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn option_holding_joins_and_delivers_its_contract() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder
        .attach(builder(&hub))
        .portfolio_source(vec![PortfolioSymbol::option("gfgc1200ab")])
        .build();

    session.connect().await.unwrap();
    session.subscribe_personal_portfolio().unwrap();
    wait_until("option join", || hub.joins_on(1) == vec!["GFGC1200AB**fv"]).await;

    let mut row = security_row("GFGC1200AB", "0", 15.0, 16.5);
    row["StrikePrice"] = json!("1.200");
    row["MaturityDate"] = json!("20240419");
    row["PutOrCall"] = json!(2);
    row["Issuer"] = json!("GGAL");
    hub.push_rows("sendStockFavoritos", json!([row]));

    wait_until("option entry", || {
        recorder
            .events()
            .iter()
            .any(|e| matches!(e, Seen::Portfolio(_)))
    })
    .await;
    let entry = recorder
        .events()
        .into_iter()
        .find_map(|e| match e {
            Seen::Portfolio(p) => Some(p),
            _ => None,
        })
        .unwrap();
    assert_eq!(entry.term, HoldingTerm::Option);
    assert_eq!(entry.bid, Some(15.0));
    let contract = entry.contract.expect("option contract");
    assert_eq!(contract.strike, 1200.0);
    assert_eq!(contract.underlying.as_deref(), Some("GGAL"));

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn failed_holdings_listing_is_retried_while_connected() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let source =
        ScriptedPortfolio::failing(1, vec![PortfolioSymbol::new("GGAL", Settlement::Hours48)]);
    let session = recorder
        .attach(builder(&hub))
        .portfolio_source(source.clone())
        .build();

    session.connect().await.unwrap();
    session.subscribe_personal_portfolio().unwrap();

    wait_until("retried join", || hub.joins_on(1) == vec!["GGAL*3*fv"]).await;
    assert_eq!(source.calls(), 2);
    assert!(session.is_connected());
    assert_eq!(hub.opens(), 1);

    let errors = recorder.errors();
    assert_eq!(errors.len(), 1, "{errors:?}");
    let Seen::Error {
        connection_lost, ..
    } = &errors[0]
    else {
        unreachable!();
    };
    assert!(!connection_lost);

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn hanging_holdings_listing_does_not_block_disconnect() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let source = ScriptedPortfolio::hanging();
    let session = recorder
        .attach(builder(&hub))
        .command_timeout(Duration::from_secs(30))
        .portfolio_source(source.clone())
        .build();

    session.connect().await.unwrap();
    session.subscribe_personal_portfolio().unwrap();
    wait_until("holdings requested", || source.calls() == 1).await;

    let closed = tokio::time::timeout(Duration::from_secs(1), session.disconnect()).await;
    assert!(matches!(closed, Ok(Ok(()))), "disconnect blocked: {closed:?}");
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.closes(), vec![CloseReason::UserRequested]);
    assert!(hub.joins_on(1).is_empty());
}

#[tokio::test]
async fn hanging_holdings_listing_times_out_and_keeps_the_link() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let source = ScriptedPortfolio::hanging();
    let session = recorder
        .attach(builder(&hub))
        .portfolio_source(source.clone())
        .build();

    session.connect().await.unwrap();
    session.subscribe_security_board(Board::Bluechips, Settlement::Hours48).unwrap();
    session.subscribe_personal_portfolio().unwrap();

    wait_until("listing timeout reported", || !recorder.errors().is_empty()).await;
    let errors = recorder.errors();
    let Seen::Error { message, .. } = &errors[0] else {
        unreachable!();
    };
    assert!(message.contains("not listed within"), "{message}");
    assert!(session.is_connected());

    hub.push_rows("broadcast", json!([security_row("GGAL", "3", 120.5, 121.0)]));
    wait_until("quote after timeout", || recorder.quotes().len() == 1).await;

    session.disconnect().await.unwrap();
}

// ===================================================================
// Order books
// ===================================================================

#[tokio::test]
async fn order_book_snapshots_replace_previous_levels() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder.attach(builder(&hub)).build();
    session.connect().await.unwrap();
    session.subscribe_order_book("GGAL", Settlement::Hours48).unwrap();

    hub.push_rows(
        "sendStartStockPuntas",
        json!({"Symbol": "GGAL", "Term": "3", "StockDepthBox": {"PriceDepthBox": {
            "BuySide": [
                {"Pos": 1, "BuyQuantity": 10, "BuyPrice": 120.0},
                {"Pos": 2, "BuyQuantity": 20, "BuyPrice": 119.5},
                {"Pos": 3, "BuyQuantity": 30, "BuyPrice": 119.0},
            ],
            "SellSide": [{"Pos": 1, "SellQuantity": 5, "SellPrice": 121.0}],
        }}}),
    );
    hub.push_rows(
        "sendStockPuntas",
        json!({"Symbol": "GGAL", "Term": "3", "StockDepthBox": {"PriceDepthBox": {
            "BuySide": [{"Pos": 1, "BuyQuantity": 7, "BuyPrice": 120.5}],
            "SellSide": [],
        }}}),
    );

    wait_until("two books", || recorder.books().len() == 2).await;
    let latest = recorder.books().pop().unwrap();
    assert_eq!(latest.bids.len(), 1);
    assert_eq!(latest.best_bid().and_then(|l| l.price), Some(120.5));
    assert!(latest.asks.is_empty());
    session.disconnect().await.unwrap();
}

// ===================================================================
// Fault isolation
// ===================================================================

#[tokio::test]
async fn failing_callback_does_not_stop_delivery() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let delivered = Arc::new(AtomicUsize::new(0));
    let session = recorder.attach(builder(&hub)).build();

    let counter = delivered.clone();
    session.on_securities(move |q: &Quote| {
        counter.fetch_add(1, Ordering::SeqCst);
        if q.symbol == "BAD" {
            panic!("cannot handle {}", q.symbol);
        }
        Ok(())
    });

    session.connect().await.unwrap();
    hub.push_rows(
        "broadcast",
        json!([
            security_row("BAD", "3", 1.0, 2.0),
            security_row("GGAL", "3", 120.5, 121.0),
        ]),
    );
    hub.push_rows("broadcast", json!([security_row("YPFD", "3", 30.0, 31.0)]));

    wait_until("all quotes", || delivered.load(Ordering::SeqCst) == 3).await;
    settle().await;

    let faults: Vec<Seen> = recorder
        .errors()
        .into_iter()
        .filter(|e| matches!(e, Seen::Error { fault: true, .. }))
        .collect();
    assert_eq!(faults.len(), 1, "{faults:?}");
    if let Seen::Error { message, connection_lost, .. } = &faults[0] {
        assert!(message.contains("securities"), "{message}");
        assert!(!connection_lost);
    }
    assert!(session.is_connected());
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn malformed_row_does_not_drop_the_batch() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder.attach(builder(&hub)).build();
    session.connect().await.unwrap();

    hub.push_rows(
        "broadcast",
        json!([
            security_row("GGAL", "3", 120.5, 121.0),
            {"Symbol": "PAMP", "Term": "7", "BuyPrice": 1.0},
            security_row("YPFD", "3", 30.0, 31.0),
        ]),
    );

    wait_until("quotes", || recorder.quotes().len() == 2).await;
    settle().await;
    let symbols: Vec<String> = recorder.quotes().into_iter().map(|q| q.symbol).collect();
    assert_eq!(symbols, vec!["GGAL", "YPFD"]);
    session.disconnect().await.unwrap();
}

// ===================================================================
// Acknowledgments
// ===================================================================

#[tokio::test]
async fn rejected_command_is_reported_as_protocol_error() {
    let hub = FakeHub::new();
    hub.reject_group("opciones-");
    let recorder = Recorder::new();
    let session = recorder.attach(builder(&hub)).build();
    session.connect().await.unwrap();
    session.subscribe_options().unwrap();

    wait_until("protocol error", || {
        recorder
            .errors()
            .iter()
            .any(|e| matches!(e, Seen::Error { protocol: true, .. }))
    })
    .await;
    assert!(session.is_connected());
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn missing_acknowledgment_times_out() {
    let hub = FakeHub::new();
    hub.disable_acks();
    let recorder = Recorder::new();
    let session = recorder
        .attach(builder(&hub))
        .ack_timeout(Duration::from_millis(50))
        .build();
    session.connect().await.unwrap();
    session.subscribe_repos().unwrap();

    wait_until("ack timeout", || {
        recorder.errors().iter().any(|e| match e {
            Seen::Error { protocol: true, message, .. } => message.contains("not acknowledged"),
            _ => false,
        })
    })
    .await;
    settle().await;
    let protocol_errors = recorder
        .errors()
        .into_iter()
        .filter(|e| matches!(e, Seen::Error { protocol: true, .. }))
        .count();
    assert_eq!(protocol_errors, 1);
    session.disconnect().await.unwrap();
}

// ===================================================================
// Reconnection
// ===================================================================

#[tokio::test]
async fn drop_reconnects_and_replays_each_subscription_once() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder.attach(builder(&hub)).build();

    session
        .subscribe_security_board(Board::Bluechips, Settlement::Hours48)
        .unwrap();
    session.subscribe_order_book("GGAL", Settlement::Spot).unwrap();
    session.connect().await.unwrap();
    wait_until("initial joins", || hub.joins_on(1).len() == 2).await;

    hub.drop_connection();
    wait_until("reconnect", || hub.joins_on(2).len() == 2).await;
    settle().await;

    let mut replayed = hub.joins_on(2);
    replayed.sort();
    assert_eq!(replayed, vec!["GGAL*1*cj", "accionesLideres-3"]);
    assert_eq!(session.state(), ConnectionState::Connected);

    hub.push_rows("broadcast", json!([security_row("GGAL", "3", 120.5, 121.0)]));
    wait_until("quote after resume", || recorder.quotes().len() == 1).await;

    let events = recorder.events();
    let resumed_at = events
        .iter()
        .position(|e| matches!(e, Seen::Open { resumed: true }))
        .expect("resumed open");
    let quote_at = events
        .iter()
        .position(|e| matches!(e, Seen::Security(_)))
        .unwrap();
    assert!(resumed_at < quote_at);

    let lost: Vec<&Seen> = events
        .iter()
        .filter(|e| matches!(e, Seen::Error { connection_lost: true, .. }))
        .collect();
    assert_eq!(lost.len(), 1);
    assert!(matches!(lost[0], Seen::Error { will_retry: true, .. }));

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn connection_loss_is_reported_while_reconnecting() {
    let hub = FakeHub::new();
    hub.fail_next_open(OpenFailure::Network);
    let session = builder(&hub).build();

    // First open fails: connect surfaces the error and stays disconnected.
    assert!(matches!(
        session.connect().await,
        Err(HomeBrokerError::Connection(_))
    ));
    assert_eq!(session.state(), ConnectionState::Disconnected);

    let states = session.watch_state();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let log = observed.clone();
    session.on_error(move |e: &SessionError| {
        if e.connection_lost {
            log.lock().push((*states.borrow(), e.will_retry));
        }
        Ok(())
    });

    session.connect().await.unwrap();
    hub.fail_next_open(OpenFailure::Network);
    hub.drop_connection();

    wait_until("reconnected", || hub.opens() == 4 && session.is_connected()).await;
    assert_eq!(
        *observed.lock(),
        vec![
            (ConnectionState::Reconnecting, true),
            (ConnectionState::Reconnecting, true),
        ]
    );
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn subscriptions_made_while_reconnecting_are_sent_after_reconnect() {
    let hub = FakeHub::new();
    let session = builder(&hub).build();
    session.connect().await.unwrap();
    session.subscribe_options().unwrap();
    wait_until("join", || hub.joins_on(1).len() == 1).await;

    // The first reconnect attempt hangs until the connect timeout.
    hub.fail_next_open(OpenFailure::Hang);
    hub.drop_connection();
    wait_until("reconnecting", || session.state() != ConnectionState::Connected).await;
    session.subscribe_repos().unwrap();

    wait_until("replay", || hub.opens() == 3 && hub.joins_on(3).len() == 2).await;
    let mut replayed = hub.joins_on(3);
    replayed.sort();
    assert_eq!(replayed, vec!["cauciones-", "opciones-"]);
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn exhausted_retries_close_the_session() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder
        .attach(builder(&hub))
        .max_reconnect_attempts(2)
        .build();
    session.connect().await.unwrap();

    hub.fail_all_opens(OpenFailure::Network);
    hub.drop_connection();

    wait_until("close", || !recorder.closes().is_empty()).await;
    assert_eq!(recorder.closes(), vec![CloseReason::RetriesExhausted]);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(hub.opens(), 3);

    let last_error = recorder.errors().pop().unwrap();
    assert!(matches!(
        last_error,
        Seen::Error { connection_lost: true, will_retry: false, .. }
    ));

    assert!(matches!(
        session.disconnect().await,
        Err(HomeBrokerError::InvalidState(_))
    ));
}

#[tokio::test]
async fn rejected_session_is_not_retried() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder.attach(builder(&hub)).build();
    session.connect().await.unwrap();

    hub.fail_all_opens(OpenFailure::Rejected);
    hub.drop_connection();

    wait_until("close", || !recorder.closes().is_empty()).await;
    assert_eq!(recorder.closes(), vec![CloseReason::AuthenticationExpired]);
    assert_eq!(hub.opens(), 2);
}

#[tokio::test]
async fn without_auto_reconnect_a_drop_is_final() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder
        .attach(builder(&hub))
        .auto_reconnect(false)
        .build();
    session.connect().await.unwrap();
    hub.drop_connection();

    wait_until("close", || !recorder.closes().is_empty()).await;
    assert_eq!(recorder.closes(), vec![CloseReason::ConnectionLost]);
    assert_eq!(hub.opens(), 1);

    // The session can be connected again afterwards.
    session.connect().await.unwrap();
    assert!(session.is_connected());
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn disconnect_interrupts_reconnection() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder
        .attach(builder(&hub))
        .initial_backoff(Duration::from_secs(30))
        .max_backoff(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(30))
        .build();
    session.connect().await.unwrap();

    // Whether the task is sleeping or stuck opening, disconnect must cut in.
    hub.fail_all_opens(OpenFailure::Hang);
    hub.drop_connection();
    wait_until("reconnecting", || session.state() != ConnectionState::Connected).await;

    tokio::time::timeout(Duration::from_secs(1), session.disconnect())
        .await
        .expect("disconnect waited for the reconnect loop")
        .unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.closes(), vec![CloseReason::UserRequested]);
    assert!(hub.opens() <= 2);
}

// ===================================================================
// Lifecycle
// ===================================================================

#[tokio::test]
async fn lifecycle_guards_and_close_notification() {
    let hub = FakeHub::new();
    let recorder = Recorder::new();
    let session = recorder.attach(builder(&hub)).build();

    assert!(matches!(
        session.disconnect().await,
        Err(HomeBrokerError::InvalidState(_))
    ));

    session.connect().await.unwrap();
    assert!(matches!(
        session.connect().await,
        Err(HomeBrokerError::InvalidState(_))
    ));

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(hub.closes(), 1);
    assert_eq!(recorder.closes(), vec![CloseReason::UserRequested]);

    assert!(matches!(
        session.disconnect().await,
        Err(HomeBrokerError::InvalidState(_))
    ));
}

#[tokio::test]
async fn connect_attempt_is_bounded_by_timeout() {
    let hub = FakeHub::new();
    hub.fail_next_open(OpenFailure::Hang);
    let session = builder(&hub)
        .connect_timeout(Duration::from_millis(50))
        .build();

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, HomeBrokerError::ConnectTimeout(_)), "{err}");
    assert_eq!(session.state(), ConnectionState::Disconnected);
}
