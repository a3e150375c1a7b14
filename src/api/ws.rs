// WebSocket handler: matchmaking, room broadcasts and player moves.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use tokio::sync::broadcast::{self, error::RecvError};

use super::{join_game, AppState};
use crate::db::GameStatus;
use crate::lobby::{ClientMessage, ServerMessage};
use crate::metrics;

/// WebSocket upgrade handler for players.
pub async fn ws_game(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// The game this socket is playing in.
struct Seat {
    game_id: i64,
    username: String,
    rx: broadcast::Receiver<String>,
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    metrics::CONNECTED_WEBSOCKETS.inc();
    let mut seat: Option<Seat> = None;

    let welcome = ServerMessage::ServerMsg {
        message: "Welcome!".to_string(),
    };
    if send(&mut socket, &welcome).await.is_ok() {
        loop {
            tokio::select! {
                // Room broadcast
                result = recv_room(&mut seat) => {
                    match result {
                        Ok(msg) => {
                            if socket.send(Message::Text(msg.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => {
                            seat = None;
                        }
                        Err(RecvError::Lagged(n)) => {
                            tracing::warn!("WebSocket client lagged, skipped {n} messages");
                        }
                    }
                }
                // Client message
                result = socket.recv() => {
                    match result {
                        Some(Ok(Message::Text(text))) => {
                            if handle_client_message(&mut socket, &state, &mut seat, text.as_str())
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        _ => {}
                    }
                }
            }
        }
    }

    leave(&state, &mut seat);
    metrics::CONNECTED_WEBSOCKETS.dec();
}

/// Next room message, or never if the socket has not joined a game.
async fn recv_room(seat: &mut Option<Seat>) -> Result<String, RecvError> {
    match seat {
        Some(seat) => seat.rx.recv().await,
        None => std::future::pending().await,
    }
}

fn leave(state: &AppState, seat: &mut Option<Seat>) {
    if let Some(old) = seat.take() {
        let game_id = old.game_id;
        drop(old);
        state.lobby.release(game_id);
    }
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

/// Handle one client frame. An `Err` means the socket is gone.
async fn handle_client_message(
    socket: &mut WebSocket,
    state: &AppState,
    seat: &mut Option<Seat>,
    text: &str,
) -> Result<(), axum::Error> {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!("Ignoring malformed client message: {e}");
            let reply = ServerMessage::ServerMsg {
                message: format!("Unrecognized message: {e}"),
            };
            return send(socket, &reply).await;
        }
    };

    match msg {
        ClientMessage::JoinGame { username } => {
            let joined = match join_game(state, username).await {
                Ok(joined) => joined,
                Err(e) => {
                    tracing::error!("Join failed: {e}");
                    let reply = ServerMessage::ServerMsg {
                        message: "Could not join a game".to_string(),
                    };
                    return send(socket, &reply).await;
                }
            };

            leave(state, seat);
            let game_id = joined.game_id;
            let (rx, cached_start) = state.lobby.subscribe(game_id);
            *seat = Some(Seat {
                game_id,
                username: joined.username.clone(),
                rx,
            });
            state.lobby.broadcast(
                game_id,
                &ServerMessage::ServerMsg {
                    message: format!("{} joined the game!", joined.username),
                },
            );

            if let Some(announcement) = cached_start {
                socket.send(Message::Text(announcement.into())).await?;
            } else if joined.players_needed == 0 {
                // The room may have been closed before this socket subscribed.
                let finished = matches!(
                    state.db.get_game(game_id).await,
                    Ok(Some(game)) if game.status == GameStatus::Finished.as_str()
                );
                if finished {
                    let error = ServerMessage::GameError {
                        game_id,
                        error: "the board for this game could not be prepared".to_string(),
                    };
                    send(socket, &error).await?;
                }
            } else {
                let waiting = ServerMessage::GameWaiting {
                    game_id,
                    username: joined.username,
                    session_token: joined.session_token,
                    players_connected: joined.players_connected,
                    players_needed: joined.players_needed,
                };
                send(socket, &waiting).await?;
            }
            Ok(())
        }
        ClientMessage::Move { game_id, robot, dir } => {
            let Some(current) = seat.as_ref().filter(|s| s.game_id == game_id) else {
                metrics::MOVES_TOTAL.with_label_values(&["rejected"]).inc();
                let reply = ServerMessage::MoveRejected {
                    game_id,
                    error: format!("not seated in game {game_id}"),
                };
                return send(socket, &reply).await;
            };

            match state.lobby.apply_move(game_id, &current.username, robot, dir) {
                Ok(outcome) => {
                    metrics::MOVES_TOTAL.with_label_values(&["accepted"]).inc();
                    if outcome.solved {
                        metrics::MOVES_TOTAL.with_label_values(&["solved"]).inc();
                        tracing::info!("Game {game_id} won by {}", current.username);
                        if let Err(e) = state
                            .db
                            .transition_game(game_id, GameStatus::Active, GameStatus::Finished)
                            .await
                        {
                            tracing::error!("Game {game_id}: failed to record finish: {e}");
                        }
                    }
                    Ok(())
                }
                Err(e) => {
                    metrics::MOVES_TOTAL.with_label_values(&["rejected"]).inc();
                    let reply = ServerMessage::MoveRejected {
                        game_id,
                        error: e.to_string(),
                    };
                    send(socket, &reply).await
                }
            }
        }
    }
}
