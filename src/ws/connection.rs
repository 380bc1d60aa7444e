//! The session task.
//!
//! One task per connected session owns the transport [`Link`]. It:
//!
//! - joins and quits hub groups until the active set matches the registry
//! - reads frames, normalizes them and dispatches the records
//! - tracks command acknowledgments
//! - on a drop, backs off and reconnects, then replays the registry
//!
//! Callbacks run on this task, so a slow callback delays the next frame but
//! never races with another callback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{HomeBrokerError, Result};
use crate::types::quotes::PortfolioSymbol;
use crate::ws::dispatcher::{CloseReason, ConnectionClosed, ConnectionOpened, SessionError};
use crate::ws::normalizer::normalize;
use crate::ws::protocol::{
    CommandAck, GroupCommand, ServerFrame, encode_group_command, groups_for, parse_frame,
};
use crate::ws::reconnect::ReconnectPolicy;
use crate::ws::registry::Subscription;
use crate::ws::session::SessionCore;
use crate::ws::state::ConnectionState;
use crate::ws::transport::{CommandSink, Link};

/// Open a link with the session's credentials, bounded by `connect_timeout`.
pub(crate) async fn open_link(core: &SessionCore) -> Result<Link> {
    core.auth.ensure_valid()?;
    let limit = core.config.connect_timeout;
    match tokio::time::timeout(limit, core.transport.open(&core.auth)).await {
        Ok(result) => result,
        Err(_) => Err(HomeBrokerError::ConnectTimeout(limit)),
    }
}

/// Body of the session task. `link` is already connected.
pub(crate) async fn run(core: Arc<SessionCore>, mut link: Link, cancel: CancellationToken) {
    let mut policy = core.config.reconnect_policy();
    let mut resumed = false;

    loop {
        core.dispatcher.opened(ConnectionOpened { resumed });

        let exit = Connection::new(&core, link.sink).run(link.frames, &cancel).await;
        let error = match exit {
            Exit::Cancelled => return finish(&core, CloseReason::UserRequested),
            Exit::Dropped(error) => error,
        };

        let will_retry = core.config.auto_reconnect
            && !error.is_terminal()
            && policy.current_attempt() < policy.max_attempts();
        tracing::warn!(error = %error, will_retry, "Connection lost");

        if !will_retry {
            let reason = if error.is_terminal() {
                CloseReason::AuthenticationExpired
            } else if core.config.auto_reconnect {
                CloseReason::RetriesExhausted
            } else {
                CloseReason::ConnectionLost
            };
            core.set_state(ConnectionState::Disconnected);
            core.dispatcher.error(SessionError::connection_lost(error, false));
            return finish(&core, reason);
        }

        core.set_state(ConnectionState::Reconnecting);
        core.dispatcher.error(SessionError::connection_lost(error, true));

        match reconnect(&core, &mut policy, &cancel).await {
            Ok(new_link) => {
                tracing::info!(attempts = policy.current_attempt(), "Reconnected");
                policy.reset();
                link = new_link;
                resumed = true;
            }
            Err(reason) => return finish(&core, reason),
        }
    }
}

/// Move to `Disconnected` (if not there yet) and notify the close callback.
fn finish(core: &SessionCore, reason: CloseReason) {
    if core.state.current() != ConnectionState::Disconnected {
        core.set_state(ConnectionState::Disconnected);
    }
    match reason {
        CloseReason::UserRequested => tracing::info!("Session closed"),
        _ => tracing::error!(?reason, "Session closed"),
    }
    core.dispatcher.closed(ConnectionClosed { reason });
}

/// Retry until a link opens. Starts and ends in `Reconnecting`/`Connected`,
/// or returns the reason the session must close (state `Disconnected`).
async fn reconnect(
    core: &SessionCore,
    policy: &mut ReconnectPolicy,
    cancel: &CancellationToken,
) -> std::result::Result<Link, CloseReason> {
    loop {
        let Some(delay) = policy.next_backoff() else {
            core.set_state(ConnectionState::Disconnected);
            return Err(CloseReason::RetriesExhausted);
        };
        let attempt = policy.current_attempt();
        tracing::info!(
            attempt,
            max_attempts = policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            "Reconnecting"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                core.set_state(ConnectionState::Disconnected);
                return Err(CloseReason::UserRequested);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if let Err(e) = core.auth.ensure_valid() {
            core.set_state(ConnectionState::Disconnected);
            core.dispatcher.error(SessionError::connection_lost(e, false));
            return Err(CloseReason::AuthenticationExpired);
        }

        core.set_state(ConnectionState::Connecting);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                core.set_state(ConnectionState::Disconnected);
                return Err(CloseReason::UserRequested);
            }
            opened = open_link(core) => opened,
        };

        match opened {
            Ok(link) => {
                core.set_state(ConnectionState::Connected);
                return Ok(link);
            }
            Err(e) if e.is_terminal() => {
                tracing::error!(attempt, error = %e, "Reconnect rejected");
                core.set_state(ConnectionState::Disconnected);
                core.dispatcher.error(SessionError::connection_lost(e, false));
                return Err(CloseReason::AuthenticationExpired);
            }
            Err(e) => {
                let will_retry = policy.current_attempt() < policy.max_attempts();
                tracing::warn!(attempt, error = %e, will_retry, "Reconnect attempt failed");
                if will_retry {
                    core.set_state(ConnectionState::Reconnecting);
                    core.dispatcher.error(SessionError::connection_lost(e, true));
                } else {
                    core.set_state(ConnectionState::Disconnected);
                    core.dispatcher.error(SessionError::connection_lost(e, false));
                    return Err(CloseReason::RetriesExhausted);
                }
            }
        }
    }
}

/// List the portfolio holdings, bounded by `command_timeout`.
async fn fetch_holdings(core: &SessionCore) -> Result<Vec<PortfolioSymbol>> {
    let Some(source) = &core.portfolio else {
        return Err(HomeBrokerError::InvalidState(
            "no portfolio source configured".into(),
        ));
    };
    let limit = core.config.command_timeout;
    match tokio::time::timeout(limit, source.holdings()).await {
        Ok(result) => result,
        Err(_) => Err(HomeBrokerError::Connection(format!(
            "portfolio holdings not listed within {limit:?}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// One connected period
// ---------------------------------------------------------------------------

enum Exit {
    Cancelled,
    Dropped(HomeBrokerError),
}

#[derive(Debug)]
struct PendingCommand {
    command: GroupCommand,
    group: String,
    deadline: Instant,
}

struct Connection<'a> {
    core: &'a SessionCore,
    sink: Box<dyn CommandSink>,
    /// Subscriptions joined on this link, with the groups they map to.
    active: HashMap<Subscription, Vec<String>>,
    pending: HashMap<u64, PendingCommand>,
    next_id: u64,
    /// When to list the portfolio holdings again after a failed attempt.
    holdings_retry: Option<Instant>,
    holdings_backoff: Duration,
}

impl<'a> Connection<'a> {
    fn new(core: &'a SessionCore, sink: Box<dyn CommandSink>) -> Self {
        Self {
            core,
            sink,
            active: HashMap::new(),
            pending: HashMap::new(),
            next_id: 0,
            holdings_retry: None,
            holdings_backoff: core.config.initial_backoff,
        }
    }

    async fn run(
        mut self,
        mut frames: BoxStream<'static, Result<String>>,
        cancel: &CancellationToken,
    ) -> Exit {
        let core = self.core;
        if let Some(exit) = self.reconcile_or_cancel(cancel).await {
            return exit;
        }

        let period = (core.config.ack_timeout / 4).max(Duration::from_millis(10));
        let mut sweep = tokio::time::interval(period);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let retry_at = self.holdings_retry;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.close().await;
                    return Exit::Cancelled;
                }
                _ = core.wakeup.notified() => {
                    if let Some(exit) = self.reconcile_or_cancel(cancel).await {
                        return exit;
                    }
                }
                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)),
                    if retry_at.is_some() =>
                {
                    self.holdings_retry = None;
                    if let Some(exit) = self.reconcile_or_cancel(cancel).await {
                        return exit;
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(text)) => self.handle_frame(&text),
                    Some(Err(e)) => return Exit::Dropped(e),
                    None => {
                        return Exit::Dropped(HomeBrokerError::Connection(
                            "hub closed the connection".into(),
                        ));
                    }
                },
                _ = sweep.tick() => self.expire_acks(),
            }
        }
    }

    async fn close(&mut self) {
        let limit = self.core.config.command_timeout;
        match tokio::time::timeout(limit, self.sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Error closing connection"),
            Err(_) => tracing::debug!("Timed out closing connection"),
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Reconcile, unless `cancel` fires first. `None` keeps the link running.
    async fn reconcile_or_cancel(&mut self, cancel: &CancellationToken) -> Option<Exit> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.reconcile() => Some(result),
        };
        match outcome {
            None => {
                self.close().await;
                Some(Exit::Cancelled)
            }
            Some(Err(e)) => Some(Exit::Dropped(e)),
            Some(Ok(())) => None,
        }
    }

    /// Send the joins and quits that make the active set match the registry.
    ///
    /// A write failure means the link is unusable and is returned.
    async fn reconcile(&mut self) -> Result<()> {
        let desired = self.core.registry.snapshot();

        let stale: Vec<Subscription> = self
            .active
            .keys()
            .filter(|s| !desired.contains(*s))
            .cloned()
            .collect();
        for subscription in stale {
            if let Some(groups) = self.active.remove(&subscription) {
                for group in &groups {
                    self.send_command(GroupCommand::Quit, group).await?;
                }
                tracing::debug!(%subscription, "Left subscription");
            }
        }

        let mut holdings: Option<Vec<PortfolioSymbol>> = None;
        for subscription in desired {
            if self.active.contains_key(&subscription) {
                continue;
            }
            let groups = if subscription == Subscription::PersonalPortfolio {
                if holdings.is_none() {
                    match fetch_holdings(self.core).await {
                        Ok(h) => {
                            holdings = Some(h);
                            self.holdings_backoff = self.core.config.initial_backoff;
                        }
                        Err(e) => {
                            self.schedule_holdings_retry(&e);
                            self.core.dispatcher.error(SessionError::recoverable(e));
                            continue;
                        }
                    }
                }
                groups_for(&subscription, holdings.as_deref().unwrap_or_default())
            } else {
                groups_for(&subscription, &[])
            };

            for group in &groups {
                self.send_command(GroupCommand::Join, group).await?;
            }
            tracing::debug!(%subscription, groups = groups.len(), "Joined subscription");
            self.active.insert(subscription, groups);
        }
        Ok(())
    }

    /// Try the portfolio again after a doubling delay, capped at `max_backoff`.
    fn schedule_holdings_retry(&mut self, error: &HomeBrokerError) {
        let delay = self.holdings_backoff.max(Duration::from_millis(10));
        self.holdings_backoff = (delay * 2).min(self.core.config.max_backoff);
        self.holdings_retry = Some(Instant::now() + delay);
        tracing::warn!(
            error = %error,
            retry_ms = delay.as_millis() as u64,
            "Could not list portfolio holdings"
        );
    }

    async fn send_command(&mut self, command: GroupCommand, group: &str) -> Result<()> {
        let id = self.next_id;
        self.next_id += 1;
        let text = encode_group_command(command, group, id)?;

        let limit = self.core.config.command_timeout;
        match tokio::time::timeout(limit, self.sink.send(text)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(HomeBrokerError::Connection(format!(
                    "{} {group} not written within {limit:?}",
                    command.method()
                )));
            }
        }

        tracing::debug!(id, method = command.method(), group, "Sent hub command");
        self.pending.insert(
            id,
            PendingCommand {
                command,
                group: group.to_owned(),
                deadline: Instant::now() + self.core.config.ack_timeout,
            },
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Incoming
    // -----------------------------------------------------------------------

    fn handle_frame(&mut self, text: &str) {
        match parse_frame(text) {
            None | Some(ServerFrame::KeepAlive) => {}
            Some(ServerFrame::Ack(ack)) => self.handle_ack(ack),
            Some(ServerFrame::MalformedAck(id)) => {
                tracing::warn!(id = %id, "Acknowledgment with unreadable id");
            }
            Some(ServerFrame::Messages(messages)) => {
                for message in messages {
                    for event in normalize(message) {
                        self.core.dispatcher.dispatch(&event);
                    }
                }
            }
        }
    }

    fn handle_ack(&mut self, ack: CommandAck) {
        let Some(pending) = self.pending.remove(&ack.id) else {
            tracing::trace!(id = ack.id, "Acknowledgment for unknown command");
            return;
        };
        match ack.error {
            None => tracing::trace!(id = ack.id, group = %pending.group, "Command acknowledged"),
            Some(message) => {
                tracing::warn!(
                    id = ack.id,
                    group = %pending.group,
                    error = %message,
                    "Command rejected"
                );
                self.core
                    .dispatcher
                    .error(SessionError::recoverable(HomeBrokerError::Protocol(format!(
                        "{} {} rejected: {message}",
                        pending.command.method(),
                        pending.group
                    ))));
            }
        }
    }

    fn expire_acks(&mut self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(pending) = self.pending.remove(&id) {
                tracing::warn!(id, group = %pending.group, "Command not acknowledged");
                self.core
                    .dispatcher
                    .error(SessionError::recoverable(HomeBrokerError::Protocol(format!(
                        "{} {} not acknowledged within {:?}",
                        pending.command.method(),
                        pending.group,
                        self.core.config.ack_timeout
                    ))));
            }
        }
    }
}
