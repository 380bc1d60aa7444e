//! Binary to open a streaming session against a broker's quote hub and print
//! the bluechips board (48hs) plus the GGAL order book for inspection.
//!
//! # Usage
//!
//! ```sh
//! export HOMEBROKER_BROKER_ID="265"
//! export HOMEBROKER_COOKIES="ASP.NET_SessionId=...; .ASPXAUTH=..."
//! cargo run --bin feed_check --features cli
//! ```

use std::env;
use std::time::Duration;

use homebroker_rs::auth::AuthContext;
use homebroker_rs::constants::Broker;
use homebroker_rs::error::HomeBrokerError;
use homebroker_rs::types::{Board, OrderBook, Quote, Settlement};
use homebroker_rs::ws::{ConnectionClosed, ConnectionOpened, SessionError, StreamingSession};
use tokio::time;

#[tokio::main]
async fn main() -> homebroker_rs::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let broker_id: u32 = env::var("HOMEBROKER_BROKER_ID")
        .map_err(|_| missing("HOMEBROKER_BROKER_ID"))?
        .parse()
        .map_err(|_| {
            HomeBrokerError::InvalidArgument("HOMEBROKER_BROKER_ID must be a number".into())
        })?;
    let cookies = env::var("HOMEBROKER_COOKIES").map_err(|_| missing("HOMEBROKER_COOKIES"))?;

    let broker = Broker::by_id(broker_id).ok_or_else(|| {
        HomeBrokerError::InvalidArgument(format!("broker {broker_id} is not supported"))
    })?;
    let auth = AuthContext::from_cookie_header(broker.page, &cookies)?;

    let session = StreamingSession::builder(auth)
        .on_open(|e: &ConnectionOpened| {
            println!("Connected (resumed: {})", e.resumed);
            Ok(())
        })
        .on_securities(|q: &Quote| {
            println!(
                "{:<8} {:>5}  bid {:?}  ask {:?}  last {:?}",
                q.symbol,
                q.settlement.as_str(),
                q.bid,
                q.ask,
                q.last
            );
            Ok(())
        })
        .on_order_book(|b: &OrderBook| {
            println!("{b:#?}");
            Ok(())
        })
        .on_error(|e: &SessionError| {
            eprintln!("Error: {} (connection lost: {})", e.error, e.connection_lost);
            Ok(())
        })
        .on_close(|e: &ConnectionClosed| {
            println!("Closed: {:?}", e.reason);
            Ok(())
        })
        .build();

    println!("Connecting to {} ({})…", broker.name, broker.page);
    session.connect().await?;

    session.subscribe_security_board(Board::Bluechips, Settlement::Hours48)?;
    session.subscribe_order_book("GGAL", Settlement::Hours48)?;

    println!("Listening for events for 30 seconds…");
    println!("(Note: data only arrives during market hours 11:00–17:00 ART)\n");
    time::sleep(Duration::from_secs(30)).await;

    println!("\n30 seconds elapsed, disconnecting…");
    session.disconnect().await?;
    println!("Done.");

    Ok(())
}

fn missing(var: &str) -> HomeBrokerError {
    HomeBrokerError::InvalidArgument(format!("set {var} env var before running"))
}
