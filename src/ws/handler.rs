//! WebSocket upgrade handlers and the outbound transport
//!
//! Two socket endpoints exist: `/ws` carries the binary game protocol and
//! `/team_v2` carries the JSON lobby protocol. Each connection gets a
//! writer task fed by a per-socket channel; the simulation side only ever
//! sees socket ids and bytes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use bytes::Bytes;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::Transport;
use crate::lobby::LobbySender;
use crate::util::rate_limit::{ConnectionRateLimiter, INPUT_RATE_LIMIT, LOBBY_RATE_LIMIT};
use crate::ws::protocol::{TeamClientMsg, TeamServerMsg};

/// Instruction queued to a game socket's writer task
enum SocketOut {
    Frame(Bytes),
    Close,
}

/// Outbound side of every game socket, keyed by socket id. The manager
/// task pushes into per-socket channels and never blocks on a slow client.
#[derive(Default)]
pub struct ChannelTransport {
    sockets: DashMap<Uuid, mpsc::UnboundedSender<SocketOut>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, socket_id: Uuid) -> mpsc::UnboundedReceiver<SocketOut> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sockets.insert(socket_id, tx);
        rx
    }

    fn unregister(&self, socket_id: Uuid) {
        self.sockets.remove(&socket_id);
    }
}

impl Transport for ChannelTransport {
    fn send(&self, socket_id: Uuid, data: Bytes) {
        if let Some(tx) = self.sockets.get(&socket_id) {
            let _ = tx.send(SocketOut::Frame(data));
        }
    }

    fn close(&self, socket_id: Uuid) {
        if let Some(tx) = self.sockets.get(&socket_id) {
            let _ = tx.send(SocketOut::Close);
        }
    }
}

/// Query parameters for game socket connections
#[derive(Debug, Deserialize)]
pub struct GameWsQuery {
    /// Match assigned by a prior findGame call
    pub game_id: Uuid,
}

/// Game socket upgrade handler
pub async fn game_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<GameWsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_game_socket(socket, query.game_id, state))
}

async fn handle_game_socket(socket: WebSocket, game_id: Uuid, state: AppState) {
    let socket_id = Uuid::new_v4();
    info!(socket = %socket_id, game_id = %game_id, "game socket connected");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let mut out_rx = state.transport.register(socket_id);

    // Bind before reading: a socket for a dead match gets closed here
    state.manager.socket_open(socket_id, game_id).await;

    let writer_handle = tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            match out {
                SocketOut::Frame(data) => {
                    if ws_sink.send(Message::Binary(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                SocketOut::Close => {
                    let _ = ws_sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let rate_limiter = ConnectionRateLimiter::new(INPUT_RATE_LIMIT);
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Binary(data)) => {
                if !rate_limiter.check() {
                    warn!(socket = %socket_id, "rate limited game frame");
                    continue;
                }
                state.manager.socket_msg(socket_id, Bytes::from(data)).await;
            }
            Ok(Message::Text(_)) => {
                warn!(socket = %socket_id, "text frame on game socket, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(socket = %socket_id, "client initiated close");
                break;
            }
            Err(e) => {
                debug!(socket = %socket_id, error = %e, "game socket error");
                break;
            }
        }
    }

    state.manager.socket_close(socket_id).await;
    state.transport.unregister(socket_id);
    writer_handle.abort();
    info!(socket = %socket_id, "game socket closed");
}

/// Lobby socket upgrade handler
pub async fn team_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_team_socket(socket, state))
}

async fn handle_team_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    debug!(conn = %conn_id, "lobby socket connected");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx): (LobbySender, _) = mpsc::unbounded_channel();

    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let terminal = matches!(msg, TeamServerMsg::Kicked);
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to serialize lobby message");
                }
            }
            if terminal {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    });

    let rate_limiter = ConnectionRateLimiter::new(LOBBY_RATE_LIMIT);
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check() {
                    warn!(conn = %conn_id, "rate limited lobby message");
                    continue;
                }
                match serde_json::from_str::<TeamClientMsg>(&text) {
                    Ok(msg) => state.lobby.handle(conn_id, &tx, msg).await,
                    Err(e) => {
                        warn!(conn = %conn_id, error = %e, "failed to parse lobby message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn = %conn_id, "binary frame on lobby socket, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!(conn = %conn_id, error = %e, "lobby socket error");
                break;
            }
        }
    }

    state.lobby.disconnect(conn_id).await;
    writer_handle.abort();
    debug!(conn = %conn_id, "lobby socket closed");
}
