//! The seams between the session and the outside world.
//!
//! A [`Transport`] opens a [`Link`]: a write half that accepts hub
//! invocations and a stream of raw text frames. The stream ending (or
//! yielding an error) means the connection dropped. [`SignalRTransport`]
//! is the production implementation; tests plug in an in-memory one.
//!
//! [`SignalRTransport`]: crate::ws::signalr::SignalRTransport

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::auth::AuthContext;
use crate::error::Result;
use crate::types::quotes::PortfolioSymbol;

/// Write half of an open connection.
#[async_trait]
pub trait CommandSink: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Close the connection. Called at most once; errors are logged only.
    async fn close(&mut self) -> Result<()>;
}

/// An open connection to the hub.
pub struct Link {
    pub sink: Box<dyn CommandSink>,
    pub frames: BoxStream<'static, Result<String>>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Something that can open connections to the hub.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform the full handshake and return the open link.
    ///
    /// Rejected credentials must surface as
    /// [`HomeBrokerError::Authentication`](crate::error::HomeBrokerError::Authentication)
    /// so the session stops retrying.
    async fn open(&self, auth: &AuthContext) -> Result<Link>;
}

/// Lists the holdings the personal portfolio subscription expands to.
#[async_trait]
pub trait PortfolioSource: Send + Sync + 'static {
    async fn holdings(&self) -> Result<Vec<PortfolioSymbol>>;
}

#[async_trait]
impl PortfolioSource for Vec<PortfolioSymbol> {
    async fn holdings(&self) -> Result<Vec<PortfolioSymbol>> {
        Ok(self.clone())
    }
}
