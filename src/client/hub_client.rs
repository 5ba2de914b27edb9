//! Hub client
//!
//! `HubConnection` is a handle to a background driver task that owns the
//! WebSocket. The handle sends commands to the driver; the driver reports
//! back through a `ClientEvent` channel and a `watch` of the current state.
//!
//! Lifecycle: `Connected -> Reconnecting -> (Connected | Disconnected)`.
//! When the session drops and a [`ReconnectPolicy`] is configured the driver
//! emits `Reconnecting`, retries per the policy, then emits either
//! `Reconnected` or `Closed`. The server sees every reconnect as a brand-new
//! connection; nothing sent while disconnected is replayed.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::ReconnectPolicy;
use crate::transport::message::{ClientMessage, RECEIVE_MESSAGE, ServerMessage};
use crate::utils::ClientError;

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A broadcast chat message.
    ReceiveMessage { user: String, message: String },
    /// The session dropped and the client is retrying.
    Reconnecting { error: String },
    Reconnected,
    /// Terminal. `error` is `None` after a local `stop()`.
    Closed { error: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    Reconnecting,
    Disconnected,
}

pub struct HubConnectionBuilder {
    url: String,
    reconnect: Option<ReconnectPolicy>,
    connect_timeout: Duration,
    invocation_timeout: Duration,
}

impl HubConnectionBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
        }
    }

    pub fn with_automatic_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Bound on each connect and reconnect handshake.
    pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = limit;
        self
    }

    pub fn with_invocation_timeout(mut self, limit: Duration) -> Self {
        self.invocation_timeout = limit;
        self
    }

    /// Connect once and start the driver.
    ///
    /// A failed first connect is returned as-is; the reconnect policy only
    /// applies to sessions that were established.
    pub async fn start(
        self,
    ) -> Result<(HubConnection, mpsc::UnboundedReceiver<ClientEvent>), ClientError> {
        let ws = connect(&self.url, self.connect_timeout).await?;
        info!("connected to {}", self.url);

        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientState::Connected);

        let driver = Driver {
            url: self.url,
            reconnect: self.reconnect,
            connect_timeout: self.connect_timeout,
            commands: commands_rx,
            events: events_tx,
            state: state_tx,
            pending: PendingInvocations::default(),
        };
        let task = tokio::spawn(driver.run(ws));

        let connection = HubConnection {
            commands: commands_tx,
            state: state_rx,
            invocation_timeout: self.invocation_timeout,
            task,
        };
        Ok((connection, events_rx))
    }
}

/// Handle to a running hub session.
pub struct HubConnection {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ClientState>,
    invocation_timeout: Duration,
    task: JoinHandle<()>,
}

impl HubConnection {
    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Invoke `SendMessage` and wait for the server's completion.
    ///
    /// Errors are returned once; the call is never retried.
    pub async fn send_message(
        &self,
        user: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = Command::Invoke {
            user: user.into(),
            message: message.into(),
            reply: reply_tx,
        };
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::NotConnected)?;

        match timeout(self.invocation_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ConnectionLost(
                "connection closed before completion".to_string(),
            )),
            Err(_) => Err(ClientError::Timeout(self.invocation_timeout)),
        }
    }

    /// Close the session and wait for the driver to finish.
    pub async fn stop(self) {
        let _ = self.commands.send(Command::Stop).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "client driver ended abnormally");
        }
    }
}

async fn connect(url: &str, limit: Duration) -> Result<ClientStream, ClientError> {
    match timeout(limit, connect_async(url)).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(ClientError::Connect(e)),
        Err(_) => Err(ClientError::Timeout(limit)),
    }
}

type Reply = oneshot::Sender<Result<(), ClientError>>;

/// Invocations sent to the server and still waiting for a completion.
///
/// Callers that gave up (their invocation timed out) leave a closed reply
/// behind; those entries are dropped whenever a new one is added.
#[derive(Default)]
pub(crate) struct PendingInvocations {
    replies: HashMap<String, Reply>,
    next_id: u64,
}

impl PendingInvocations {
    pub(crate) fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    pub(crate) fn insert(&mut self, invocation_id: String, reply: Reply) {
        self.replies.retain(|_, reply| !reply.is_closed());
        self.replies.insert(invocation_id, reply);
    }

    /// Hand `result` to the caller waiting on `invocation_id`. Returns
    /// `false` if nobody is.
    pub(crate) fn complete(&mut self, invocation_id: &str, result: Result<(), ClientError>) -> bool {
        match self.replies.remove(invocation_id) {
            Some(reply) => {
                let _ = reply.send(result);
                true
            }
            None => false,
        }
    }

    pub(crate) fn fail_all(&mut self, reason: &str) {
        for (_, reply) in self.replies.drain() {
            let _ = reply.send(Err(ClientError::ConnectionLost(reason.to_string())));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.replies.len()
    }
}

enum Command {
    Invoke {
        user: String,
        message: String,
        reply: Reply,
    },
    Stop,
}

enum SessionEnd {
    Stopped,
    Lost(String),
}

enum Reconnect {
    Connected(ClientStream),
    GaveUp(String),
    Stopped,
}

struct Driver {
    url: String,
    reconnect: Option<ReconnectPolicy>,
    connect_timeout: Duration,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<ClientEvent>,
    state: watch::Sender<ClientState>,
    pending: PendingInvocations,
}

impl Driver {
    async fn run(mut self, mut ws: ClientStream) {
        loop {
            let end = self.session(&mut ws).await;
            match end {
                SessionEnd::Stopped => {
                    self.pending.fail_all("connection stopped");
                    self.finish(None);
                    return;
                }
                SessionEnd::Lost(reason) => {
                    warn!("connection lost: {reason}");
                    self.pending.fail_all(&reason);
                    match self.reconnect(reason).await {
                        Reconnect::Connected(new_ws) => {
                            ws = new_ws;
                            self.state.send_replace(ClientState::Connected);
                            info!("reconnected to {}", self.url);
                            self.emit(ClientEvent::Reconnected);
                        }
                        Reconnect::GaveUp(reason) => {
                            self.finish(Some(reason));
                            return;
                        }
                        Reconnect::Stopped => {
                            self.finish(None);
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn session(&mut self, ws: &mut ClientStream) -> SessionEnd {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Invoke { user, message, reply }) => {
                        if let Err(reason) = self.invoke(ws, user, message, reply).await {
                            return SessionEnd::Lost(reason);
                        }
                    }
                    Some(Command::Stop) | None => {
                        if let Err(e) = ws.close(None).await {
                            debug!(error = %e, "close handshake failed");
                        }
                        return SessionEnd::Stopped;
                    }
                },
                frame = ws.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(end) = self.handle_frame(text.as_str()) {
                            return end;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return SessionEnd::Lost("connection closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                }
            }
        }
    }

    /// Send one invocation. `Err` means the socket is gone.
    async fn invoke(
        &mut self,
        ws: &mut ClientStream,
        user: String,
        message: String,
        reply: Reply,
    ) -> Result<(), String> {
        let invocation_id = self.pending.next_id();
        let frame = ClientMessage::send_message(Some(invocation_id.clone()), user, message);

        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                let _ = reply.send(Err(ClientError::Protocol(e)));
                return Ok(());
            }
        };

        if let Err(e) = ws.send(WsMessage::text(text)).await {
            let reason = e.to_string();
            let _ = reply.send(Err(ClientError::ConnectionLost(reason.clone())));
            return Err(reason);
        }
        self.pending.insert(invocation_id, reply);
        debug!(pending = self.pending.len(), "invocation sent");
        Ok(())
    }

    fn handle_frame(&mut self, text: &str) -> Option<SessionEnd> {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Invocation { target, arguments }) => {
                if target != RECEIVE_MESSAGE {
                    debug!("no handler for server method {target}");
                    return None;
                }
                match <[String; 2]>::try_from(arguments) {
                    Ok([user, message]) => self.emit(ClientEvent::ReceiveMessage { user, message }),
                    Err(args) => warn!("{RECEIVE_MESSAGE} with {} arguments", args.len()),
                }
            }
            Ok(ServerMessage::Completion {
                invocation_id,
                error,
            }) => {
                let result = error.map_or(Ok(()), |e| Err(ClientError::Invocation(e)));
                if !self.pending.complete(&invocation_id, result) {
                    debug!("completion for unknown invocation {invocation_id}");
                }
            }
            Ok(ServerMessage::Close { error }) => {
                return Some(SessionEnd::Lost(
                    error.unwrap_or_else(|| "server closed the connection".to_string()),
                ));
            }
            Err(e) => warn!("invalid server frame: {e}"),
        }
        None
    }

    async fn reconnect(&mut self, reason: String) -> Reconnect {
        let Some(policy) = self.reconnect.clone() else {
            return Reconnect::GaveUp(reason);
        };

        self.state.send_replace(ClientState::Reconnecting);
        self.emit(ClientEvent::Reconnecting {
            error: reason.clone(),
        });

        let mut last_error = reason;
        let mut attempt = 0;
        loop {
            let Some(delay) = policy.next_delay(attempt) else {
                return Reconnect::GaveUp(last_error);
            };

            if self.until_stopped(tokio::time::sleep(delay)).await.is_none() {
                return Reconnect::Stopped;
            }

            let url = self.url.clone();
            let limit = self.connect_timeout;
            let Some(connected) = self.until_stopped(connect(&url, limit)).await else {
                return Reconnect::Stopped;
            };
            match connected {
                Ok(ws) => return Reconnect::Connected(ws),
                Err(e) => {
                    debug!(attempt, error = %e, "reconnect attempt failed");
                    last_error = e.to_string();
                }
            }
            attempt += 1;
        }
    }

    /// Drive `work` while turning away invocations. `None` means `stop()`
    /// was called (or the handle dropped) first.
    async fn until_stopped<F: Future>(&mut self, work: F) -> Option<F::Output> {
        tokio::pin!(work);
        loop {
            tokio::select! {
                output = &mut work => return Some(output),
                command = self.commands.recv() => match command {
                    Some(Command::Invoke { reply, .. }) => {
                        let _ = reply.send(Err(ClientError::NotConnected));
                    }
                    Some(Command::Stop) | None => return None,
                }
            }
        }
    }

    fn emit(&self, event: ClientEvent) {
        // receiver gone means nobody is listening; not an error
        let _ = self.events.send(event);
    }

    fn finish(&mut self, error: Option<String>) {
        // refuse new commands before announcing Closed
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Invoke { reply, .. } = command {
                let _ = reply.send(Err(ClientError::NotConnected));
            }
        }
        self.state.send_replace(ClientState::Disconnected);
        self.emit(ClientEvent::Closed { error });
    }
}
