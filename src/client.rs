//! HTTP side of the SignalR handshake.
//!
//! The [`HubHttpClient`] wraps [`reqwest::Client`] with the session cookie
//! and a browser user agent, and knows the three plain HTTP calls of the
//! classic SignalR protocol:
//!
//! | Call          | Purpose                                   |
//! |---------------|-------------------------------------------|
//! | `negotiate`   | obtain a connection token                 |
//! | `start`       | confirm the WebSocket transport is live   |
//! | `abort`       | tell the server the connection is gone    |
//!
//! It also builds the `connect` URL used to open the WebSocket.

use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::AuthContext;
use crate::constants::{CLIENT_PROTOCOL, HUB_NAME, SIGNALR_PATH, USER_AGENT};
use crate::error::{HomeBrokerError, Result};

/// Answer to `GET /signalr/negotiate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NegotiateResponse {
    pub connection_token: String,
    pub connection_id: String,
    /// Seconds the server waits between keep-alives.
    #[serde(default)]
    pub keep_alive_timeout: Option<f64>,
    #[serde(default)]
    pub try_web_sockets: bool,
    #[serde(default)]
    pub protocol_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartResponse {
    #[serde(default)]
    response: String,
}

/// HTTP client for the SignalR endpoint of one broker page.
///
/// Cookie and user-agent headers are built once, at construction.
///
/// # Example
///
/// ```no_run
/// use homebroker_rs::auth::AuthContext;
/// use homebroker_rs::client::HubHttpClient;
///
/// # #[tokio::main]
/// # async fn main() -> homebroker_rs::error::Result<()> {
/// let auth = AuthContext::from_cookie_header("https://cocoscap.com", "ASP.NET_SessionId=abc")?;
/// let client = HubHttpClient::new(&auth)?;
/// let negotiated = client.negotiate().await?;
/// println!("connect to {}", client.connect_url(&negotiated.connection_token)?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HubHttpClient {
    http: reqwest::Client,
    /// Broker page without trailing slash.
    page: String,
    cookie: HeaderValue,
}

impl HubHttpClient {
    /// Create a client for the page and cookies of `auth`.
    pub fn new(auth: &AuthContext) -> Result<Self> {
        let cookie = HeaderValue::from_str(&auth.cookie_header()).map_err(|_| {
            HomeBrokerError::InvalidArgument("cookies contain invalid header characters".into())
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::COOKIE, cookie.clone());

        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            page: auth.page().to_owned(),
            cookie,
        })
    }

    /// Broker page this client talks to.
    pub fn page(&self) -> &str {
        &self.page
    }

    /// The cached `Cookie` header, reused for the WebSocket upgrade.
    pub fn cookie(&self) -> &HeaderValue {
        &self.cookie
    }

    // -----------------------------------------------------------------------
    // SignalR calls
    // -----------------------------------------------------------------------

    /// Request a connection token.
    pub async fn negotiate(&self) -> Result<NegotiateResponse> {
        let url = self.endpoint("negotiate", None)?;
        tracing::debug!(%url, "SignalR negotiate");
        let resp = self.http.get(url).send().await?;
        self.handle_response(resp).await
    }

    /// Confirm the WebSocket transport after it has been opened.
    pub async fn start(&self, connection_token: &str) -> Result<()> {
        let url = self.endpoint("start", Some(connection_token))?;
        tracing::debug!("SignalR start");
        let resp = self.http.get(url).send().await?;
        let started: StartResponse = self.handle_response(resp).await?;
        if started.response.eq_ignore_ascii_case("started") {
            Ok(())
        } else {
            Err(HomeBrokerError::Connection(format!(
                "hub did not start the transport (response {:?})",
                started.response
            )))
        }
    }

    /// Tell the server the connection is going away.
    pub async fn abort(&self, connection_token: &str) -> Result<()> {
        let url = self.endpoint("abort", Some(connection_token))?;
        tracing::debug!("SignalR abort");
        let resp = self.http.post(url).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(status_error(status, body))
        }
    }

    /// URL of the WebSocket `connect` endpoint (`ws`/`wss` scheme).
    pub fn connect_url(&self, connection_token: &str) -> Result<Url> {
        let mut url = self.endpoint("connect", Some(connection_token))?;
        let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
        url.set_scheme(scheme).map_err(|()| {
            HomeBrokerError::InvalidArgument(format!("cannot use {} over WebSocket", self.page))
        })?;
        Ok(url)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// `{page}/signalr/{action}` with the common query string.
    fn endpoint(&self, action: &str, connection_token: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{SIGNALR_PATH}/{action}", self.page))?;
        {
            let mut query = url.query_pairs_mut();
            if connection_token.is_some() {
                query.append_pair("transport", "webSockets");
            }
            query.append_pair("clientProtocol", CLIENT_PROTOCOL);
            if let Some(token) = connection_token {
                query.append_pair("connectionToken", token);
            }
            query.append_pair("connectionData", &connection_data());
        }
        Ok(url)
    }

    async fn handle_response<R: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<R> {
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if status.is_success() {
            serde_json::from_slice(&bytes).map_err(HomeBrokerError::Json)
        } else {
            Err(status_error(status, String::from_utf8_lossy(&bytes).into_owned()))
        }
    }
}

/// `[{"name":"stockpriceshub"}]`
fn connection_data() -> String {
    serde_json::json!([{ "name": HUB_NAME }]).to_string()
}

/// Map an unsuccessful status. Rejected sessions are authentication errors.
pub(crate) fn status_error(status: StatusCode, body: String) -> HomeBrokerError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HomeBrokerError::Authentication(
            format!("hub rejected the session (HTTP {status})"),
        ),
        _ => HomeBrokerError::HttpStatus { status, body },
    }
}
