//! Session credentials handed to the streaming session.
//!
//! Logging into a broker (form login, HTML scraping of the session tokens) is
//! done elsewhere. The streaming session only needs the resulting cookie jar
//! and the broker page it belongs to, bundled as an [`AuthContext`].

use std::fmt;

use chrono::{DateTime, Utc};

use crate::constants::Broker;
use crate::error::{HomeBrokerError, Result};

/// An established broker session: base page, cookies, and optional expiry.
#[derive(Clone)]
pub struct AuthContext {
    page: String,
    cookies: Vec<(String, String)>,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthContext {
    /// Create a context for the given broker page and session cookies.
    pub fn new<K, V>(page: impl Into<String>, cookies: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            page: page.into().trim_end_matches('/').to_owned(),
            cookies: cookies
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            expires_at: None,
        }
    }

    /// Create a context for one of the known [`BROKERS`](crate::constants::BROKERS).
    pub fn for_broker<K, V>(broker: &Broker, cookies: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(broker.page, cookies)
    }

    /// Parse a `Cookie` header value (`name=value; name2=value2`).
    pub fn from_cookie_header(page: impl Into<String>, header: &str) -> Result<Self> {
        let mut cookies = Vec::new();
        for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').ok_or_else(|| {
                HomeBrokerError::InvalidArgument(format!("malformed cookie pair {pair:?}"))
            })?;
            cookies.push((name.trim().to_owned(), value.trim().to_owned()));
        }
        Ok(Self::new(page, cookies))
    }

    /// Set the instant after which the session is no longer accepted.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the context can still be used to open a connection.
    pub fn is_valid(&self) -> bool {
        !self.cookies.is_empty() && self.expires_at.is_none_or(|at| Utc::now() < at)
    }

    /// Base URL of the broker's web platform (no trailing slash).
    pub fn page(&self) -> &str {
        &self.page
    }

    /// When the session expires, if known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Render the cookies as a `Cookie` header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Fail with [`HomeBrokerError::Authentication`] unless [`is_valid`](Self::is_valid).
    pub fn ensure_valid(&self) -> Result<()> {
        if self.cookies.is_empty() {
            return Err(HomeBrokerError::Authentication(
                "user is not logged in (no session cookies)".into(),
            ));
        }
        if !self.is_valid() {
            return Err(HomeBrokerError::Authentication("session has expired".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("page", &self.page)
            .field("cookies", &format_args!("[{} REDACTED]", self.cookies.len()))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
