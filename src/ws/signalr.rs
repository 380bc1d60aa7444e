//! Production [`Transport`]: classic SignalR over WebSocket.
//!
//! Opening a link runs the whole handshake:
//!
//! 1. `negotiate` over HTTP for a connection token
//! 2. WebSocket upgrade on `connect`, carrying the session cookie
//! 3. `start` over HTTP to confirm the transport
//!
//! Closing the link sends a close frame and a best-effort `abort`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::auth::AuthContext;
use crate::client::HubHttpClient;
use crate::constants::USER_AGENT;
use crate::error::{HomeBrokerError, Result};
use crate::ws::transport::{CommandSink, Link, Transport};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WriterHalf = SplitSink<Socket, Message>;
type ReaderHalf = SplitStream<Socket>;

/// Connects to the `stockpriceshub` hub of the broker in the [`AuthContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalRTransport;

impl SignalRTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for SignalRTransport {
    async fn open(&self, auth: &AuthContext) -> Result<Link> {
        auth.ensure_valid()?;
        let client = HubHttpClient::new(auth)?;

        let negotiated = client.negotiate().await?;
        if !negotiated.try_web_sockets {
            tracing::warn!(
                connection_id = %negotiated.connection_id,
                "Hub does not advertise WebSocket support, trying anyway"
            );
        }
        let token = negotiated.connection_token;

        let url = client.connect_url(&token)?;
        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(
            header::COOKIE,
            HeaderValue::from_bytes(client.cookie().as_bytes()).map_err(|_| {
                HomeBrokerError::InvalidArgument("cookies contain invalid header characters".into())
            })?,
        );

        let (ws, _resp) = connect_async(request).await.map_err(handshake_error)?;
        client.start(&token).await?;

        tracing::info!(
            page = %client.page(),
            connection_id = %negotiated.connection_id,
            "SignalR connection established"
        );

        let idle_limit = negotiated
            .keep_alive_timeout
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64);

        let (write, read) = ws.split();
        Ok(Link {
            sink: Box::new(SignalRSink {
                write,
                client,
                connection_token: token,
                closed: false,
            }),
            frames: text_frames(read, idle_limit),
        })
    }
}

/// Map an upgrade rejection to an authentication error.
fn handshake_error(e: tungstenite::Error) -> HomeBrokerError {
    match &e {
        tungstenite::Error::Http(resp) if matches!(resp.status().as_u16(), 401 | 403) => {
            HomeBrokerError::Authentication(format!(
                "hub rejected the WebSocket upgrade (HTTP {})",
                resp.status()
            ))
        }
        _ => e.into(),
    }
}

/// Text payloads of the socket. Ends when the server closes the socket; a
/// silent socket past `idle_limit` yields an error.
fn text_frames(
    read: ReaderHalf,
    idle_limit: Option<Duration>,
) -> futures_util::stream::BoxStream<'static, Result<String>> {
    stream::unfold(Some(read), move |state| async move {
        let mut read = state?;
        loop {
            let next = match idle_limit {
                Some(limit) => match tokio::time::timeout(limit, read.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let e = HomeBrokerError::Connection(format!(
                            "no keep-alive from hub within {limit:?}"
                        ));
                        return Some((Err(e), None));
                    }
                },
                None => read.next().await,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    return Some((Ok(text.as_str().to_owned()), Some(read)));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "WebSocket closed by server");
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some((Err(e.into()), None)),
                None => return None,
            }
        }
    })
    .boxed()
}

struct SignalRSink {
    write: WriterHalf,
    client: HubHttpClient,
    connection_token: String,
    closed: bool,
}

#[async_trait]
impl CommandSink for SignalRSink {
    async fn send(&mut self, text: String) -> Result<()> {
        self.write.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        let closed = SinkExt::close(&mut self.write).await;
        if let Err(e) = self.client.abort(&self.connection_token).await {
            tracing::debug!(error = %e, "SignalR abort failed");
        }
        closed.map_err(Into::into)
    }
}
