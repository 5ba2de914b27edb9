//! WebSocket transport
//!
//! Responsibilities:
//! - Accept TCP connections and reserve a hub slot for each one
//! - Only upgrade requests for the configured hub path (`/chathub` by default)
//! - Complete the WebSocket handshake within the configured timeout, rolling
//!   the reservation back if it does not
//! - Translate `SendMessage` invocations into hub calls and answer them with
//!   a completion frame
//! - Drain each connection's outbound queue onto its socket from a dedicated
//!   writer task
//!
//! A connection only ever touches its own queue and socket, so a stalled or
//! broken client cannot delay anyone else. When the client goes away its
//! writer task is aborted, dropping whatever was still queued for it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::Message as WsMessage;

use crate::config::Settings;
use crate::hub::{Channel, ChatMessage, ConnectionId, Hub};
use crate::transport::message::{ClientMessage, SEND_MESSAGE, ServerMessage};
use crate::utils::{DeliveryError, HubError, InvocationError, ServerError};

/// Hub channel backed by a connection's bounded outbound queue.
pub struct WsChannel {
    sender: mpsc::Sender<ServerMessage>,
    closed: Arc<Notify>,
}

impl WsChannel {
    pub fn new(sender: mpsc::Sender<ServerMessage>, closed: Arc<Notify>) -> Self {
        Self { sender, closed }
    }
}

impl Channel for WsChannel {
    fn push(&self, message: &ChatMessage) -> Result<(), DeliveryError> {
        self.sender
            .try_send(ServerMessage::from(message))
            .map_err(|e| match e {
                TrySendError::Full(_) => DeliveryError::Full,
                TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    fn close(&self) {
        self.closed.notify_one();
    }
}

#[derive(Debug, Clone)]
struct ConnectionOptions {
    path: Arc<str>,
    handshake_timeout: Duration,
    outbound_buffer: usize,
}

impl From<&Settings> for ConnectionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            path: Arc::from(settings.server.path.as_str()),
            handshake_timeout: settings.server.handshake_timeout(),
            outbound_buffer: settings.hub.outbound_buffer,
        }
    }
}

pub struct WebSocketServer {
    listener: TcpListener,
    options: ConnectionOptions,
}

impl WebSocketServer {
    /// Bind to `settings.server.host:port`. Port 0 picks a free port.
    ///
    /// Settings are validated first; a zero `hub.outbound_buffer` is an error
    /// here rather than a panic on the first connection.
    pub async fn bind(settings: &Settings) -> Result<Self, ServerError> {
        settings.validate()?;
        let addr = settings.server.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            options: ConnectionOptions::from(settings),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    pub async fn run(self, hub: Arc<Hub>) {
        self.run_until(hub, std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run_until<F>(self, hub: Arc<Hub>, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let WebSocketServer { listener, options } = self;
        tokio::pin!(shutdown);

        if let Ok(addr) = listener.local_addr() {
            info!("WebSocket server listening on ws://{addr}");
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("WebSocket server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let hub = Arc::clone(&hub);
                        tokio::spawn(handle_connection(stream, peer, hub, options.clone()));
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                }
            }
        }
    }
}

/// Bind and serve forever.
pub async fn start_websocket_server(settings: &Settings, hub: Arc<Hub>) -> Result<(), ServerError> {
    WebSocketServer::bind(settings).await?.run(hub).await;
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<Hub>,
    options: ConnectionOptions,
) {
    let (tx, rx) = mpsc::channel::<ServerMessage>(options.outbound_buffer);
    let closed = Arc::new(Notify::new());
    let reservation = hub.reserve(Arc::new(WsChannel::new(tx.clone(), Arc::clone(&closed))));

    let path = Arc::clone(&options.path);
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == &*path {
            Ok(response)
        } else {
            let mut refusal = ErrorResponse::new(Some(format!("no hub at {}", request.uri().path())));
            *refusal.status_mut() = StatusCode::NOT_FOUND;
            Err(refusal)
        }
    };

    let handshake = accept_hdr_async(stream, check_path);
    let ws_stream = match timeout(options.handshake_timeout, handshake).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            warn!(%peer, error = %e, "WebSocket handshake error");
            roll_back(&hub, reservation);
            return;
        }
        Err(_) => {
            warn!(%peer, "WebSocket handshake timed out after {:?}", options.handshake_timeout);
            roll_back(&hub, reservation);
            return;
        }
    };

    let id = match reservation {
        Ok(id) => id,
        Err(err) => {
            refuse(ws_stream, &err, options.handshake_timeout).await;
            return;
        }
    };

    if let Err(err) = hub.open(id) {
        warn!(%peer, error = %err, "failed to open connection");
        hub.on_disconnect(id);
        return;
    }
    debug!(%peer, %id, "connection open");

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let writer = tokio::spawn(write_loop(id, ws_sender, rx));

    loop {
        tokio::select! {
            _ = closed.notified() => {
                debug!(%id, "connection dropped by hub");
                break;
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => handle_text(&hub, id, text.as_str(), &tx).await,
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%id, error = %e, "read failed");
                    break;
                }
            }
        }
    }

    info!("{id} disconnected");
    hub.on_disconnect(id);
    writer.abort();
}

fn roll_back(hub: &Hub, reservation: Result<ConnectionId, HubError>) {
    if let Ok(id) = reservation {
        hub.on_disconnect(id);
    }
}

async fn refuse(mut ws_stream: WebSocketStream<TcpStream>, err: &HubError, limit: Duration) {
    let notice = ServerMessage::Close {
        error: Some(err.to_string()),
    };
    let send = async {
        if let Ok(frame) = notice.to_ws() {
            ws_stream.send(frame).await?;
        }
        ws_stream.close(None).await
    };
    match timeout(limit, send).await {
        Ok(Ok(())) => debug!("refused connection: {err}"),
        Ok(Err(e)) => debug!(error = %e, "failed to notify refused connection"),
        Err(_) => debug!("timed out notifying refused connection"),
    }
}

async fn write_loop<S>(id: ConnectionId, mut ws_sender: S, mut rx: mpsc::Receiver<ServerMessage>)
where
    S: futures_util::Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    while let Some(message) = rx.recv().await {
        let frame = match message.to_ws() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%id, error = %e, "failed to serialize frame");
                continue;
            }
        };
        if let Err(e) = ws_sender.send(frame).await {
            warn!("Failed to send message to {id}: {e}");
            break;
        }
    }
    debug!("Send loop closed for {id}");
}

async fn handle_text(hub: &Hub, id: ConnectionId, text: &str, replies: &mpsc::Sender<ServerMessage>) {
    let (invocation_id, result) = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Invocation {
            invocation_id,
            target,
            arguments,
        }) => (invocation_id, invoke(hub, id, &target, arguments)),
        Err(err) => {
            warn!(
                "Invalid client message from {id}: {err} | {}",
                text.chars().take(100).collect::<String>()
            );
            return;
        }
    };

    match invocation_id {
        Some(invocation_id) => {
            let reply = ServerMessage::Completion {
                invocation_id,
                error: result.err().map(|e| e.to_string()),
            };
            if replies.send(reply).await.is_err() {
                debug!(%id, "completion dropped, connection closing");
            }
        }
        None => {
            if let Err(e) = result {
                warn!(%id, error = %e, "invocation failed");
            }
        }
    }
}

/// Dispatch one invocation to the hub.
pub(crate) fn invoke(
    hub: &Hub,
    id: ConnectionId,
    target: &str,
    arguments: Vec<String>,
) -> Result<(), InvocationError> {
    if !target.eq_ignore_ascii_case(SEND_MESSAGE) {
        return Err(InvocationError::UnknownMethod(target.to_string()));
    }

    let [user_name, body]: [String; 2] =
        arguments
            .try_into()
            .map_err(|args: Vec<String>| InvocationError::ArgumentCount {
                method: SEND_MESSAGE,
                expected: 2,
                got: args.len(),
            })?;

    let report = hub.send_message(id, user_name, body)?;
    if !report.failures.is_empty() {
        debug!(
            %id,
            failed = report.failures.len(),
            "broadcast reached {}/{} recipients",
            report.delivered,
            report.attempted
        );
    }
    Ok(())
}
