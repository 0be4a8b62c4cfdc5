//! WebSocket transport and the arena event loop.
//!
//! One task owns the [`Arena`]. Socket tasks and turn timers reach it only
//! through channels, so events are applied strictly one after another.

use crate::arena::{Arena, ConnectRejection};
use crate::config::ArenaConfig;
use crate::ledger::{LeaderboardEntry, Ledger};
use crate::presence::{ConnectionId, Identity, Outbox};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::timer::{TokioTurnClock, TurnExpiry};
use axum::body::Body;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use derive_more::{Display, Error, From};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tracing::{debug, info, instrument, warn};

/// Messages processed by the arena task.
#[derive(Debug)]
pub enum Command {
    /// A socket finished its handshake.
    Connect {
        /// Connection id allocated by the handle.
        connection: ConnectionId,
        /// Handshake identity.
        identity: Identity,
        /// Outbound channel of the socket.
        outbox: Outbox,
        /// Verdict for the socket task.
        reply: oneshot::Sender<Result<(), ConnectRejection>>,
    },
    /// A decoded client event.
    Client {
        /// Sender.
        connection: ConnectionId,
        /// Event.
        event: ClientEvent,
    },
    /// A socket closed.
    Disconnect {
        /// Connection that went away.
        connection: ConnectionId,
    },
    /// Snapshot request from the HTTP API.
    Leaderboard {
        /// Reply channel.
        reply: oneshot::Sender<Vec<LeaderboardEntry>>,
    },
}

/// Failure to reach or pass the arena during a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error, From)]
pub enum HandshakeError {
    /// The arena refused the connection.
    #[display("Connection rejected: {}", _0)]
    Rejected(ConnectRejection),
    /// The arena task has stopped.
    #[display("Arena is not running")]
    #[from(ignore)]
    ArenaClosed,
}

/// Cloneable sender side of the arena task.
#[derive(Debug, Clone)]
pub struct ArenaHandle {
    commands: mpsc::UnboundedSender<Command>,
    next_connection: Arc<AtomicU64>,
}

impl ArenaHandle {
    /// Registers a socket with the arena and returns its connection id.
    #[instrument(skip(self, outbox), fields(player = %identity.username()))]
    pub async fn connect(
        &self,
        identity: Identity,
        outbox: Outbox,
    ) -> Result<ConnectionId, HandshakeError> {
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (reply, verdict) = oneshot::channel();
        self.commands
            .send(Command::Connect {
                connection,
                identity,
                outbox,
                reply,
            })
            .map_err(|_| HandshakeError::ArenaClosed)?;
        verdict.await.map_err(|_| HandshakeError::ArenaClosed)??;
        Ok(connection)
    }

    /// Forwards a client event.
    pub fn send(&self, connection: ConnectionId, event: ClientEvent) {
        if self
            .commands
            .send(Command::Client { connection, event })
            .is_err()
        {
            warn!(connection, "Arena is not running, dropping event");
        }
    }

    /// Reports a closed socket.
    pub fn disconnect(&self, connection: ConnectionId) {
        if self.commands.send(Command::Disconnect { connection }).is_err() {
            warn!(connection, "Arena is not running, dropping disconnect");
        }
    }

    /// Fetches the current leaderboard; `None` if the arena has stopped.
    pub async fn leaderboard(&self) -> Option<Vec<LeaderboardEntry>> {
        let (reply, snapshot) = oneshot::channel();
        self.commands.send(Command::Leaderboard { reply }).ok()?;
        snapshot.await.ok()
    }
}

/// Starts the arena task with tokio-backed turn timers.
#[instrument(skip_all)]
pub fn spawn_arena(config: ArenaConfig, ledger: Ledger) -> (ArenaHandle, JoinHandle<()>) {
    let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
    let arena = Arena::new(config, ledger, Box::new(TokioTurnClock::new(expiry_tx)));
    let (commands, command_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_arena(arena, command_rx, expiry_rx));
    info!("Arena task started");
    (
        ArenaHandle {
            commands,
            next_connection: Arc::new(AtomicU64::new(1)),
        },
        task,
    )
}

/// Applies commands and timer expiries one at a time until every handle is
/// dropped.
pub async fn run_arena(
    mut arena: Arena,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut expiries: mpsc::UnboundedReceiver<TurnExpiry>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply(&mut arena, command),
                None => break,
            },
            Some(expiry) = expiries.recv() => {
                arena.expire_turn(expiry.match_id, expiry.generation);
            }
        }
    }
    info!("Arena task stopped");
}

fn apply(arena: &mut Arena, command: Command) {
    match command {
        Command::Connect {
            connection,
            identity,
            outbox,
            reply,
        } => {
            let verdict = arena.connect(connection, identity, outbox);
            if reply.send(verdict).is_err() {
                // The socket vanished before hearing back.
                arena.disconnect(connection);
            }
        }
        Command::Client { connection, event } => arena.handle(connection, event),
        Command::Disconnect { connection } => arena.disconnect(connection),
        Command::Leaderboard { reply } => {
            let _ = reply.send(arena.leaderboard());
        }
    }
}

#[derive(Debug, Clone)]
struct AppState {
    handle: ArenaHandle,
    username_header: String,
    user_id_header: String,
}

impl AppState {
    /// Reads the handshake identity; `None` without a username.
    fn identity(&self, headers: &HeaderMap) -> Option<Identity> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let username = read(&self.username_header)?;
        let user_id = read(&self.user_id_header).unwrap_or_default();
        Some(Identity::new(username, user_id))
    }
}

/// Builds the HTTP router.
pub fn router(handle: ArenaHandle, config: &ArenaConfig) -> Router {
    let state = AppState {
        handle,
        username_header: config.username_header().clone(),
        user_id_header: config.user_id_header().clone(),
    };
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(health))
        .route("/leaderboard", get(leaderboard))
        .layer(ServiceBuilder::new().map_request(|req: Request<Body>| {
            debug!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
            req
        }))
        .with_state(state)
}

/// Serves until ctrl-c.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
#[instrument(skip_all, fields(addr = ?listener.local_addr().ok()))]
pub async fn serve(
    listener: TcpListener,
    handle: ArenaHandle,
    config: &ArenaConfig,
) -> std::io::Result<()> {
    info!("Accepting WebSocket connections on /ws");
    axum::serve(listener, router(handle, config))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Ctrl-c handler unavailable");
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
        })
        .await
}

async fn health() -> &'static str {
    "ok"
}

async fn leaderboard(State(state): State<AppState>) -> Result<Json<Vec<LeaderboardEntry>>, StatusCode> {
    state
        .handle
        .leaderboard()
        .await
        .map(Json)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(identity) = state.identity(&headers) else {
        warn!("WebSocket handshake without username");
        return (StatusCode::UNAUTHORIZED, "missing identity").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(state.handle, identity, socket))
}

/// Pumps one socket: outbound events to the client, inbound frames to the
/// arena.
#[instrument(skip(handle, socket), fields(player = %identity.username()))]
async fn handle_socket(handle: ArenaHandle, identity: Identity, mut socket: WebSocket) {
    let (outbox, mut outbound) = mpsc::unbounded_channel::<ServerEvent>();
    let connection = match handle.connect(identity, outbox).await {
        Ok(connection) => connection,
        Err(e) => {
            info!(error = %e, "Closing rejected socket");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                match event.to_json() {
                    Ok(json) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode event"),
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match ClientEvent::from_json(text.as_str()) {
                    Ok(event) => handle.send(connection, event),
                    Err(e) => debug!(connection, error = %e, "Undecodable frame dropped"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection, error = %e, "Socket error");
                    break;
                }
            }
        }
    }

    handle.disconnect(connection);
    info!(connection, "Socket closed");
}
