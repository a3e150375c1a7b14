// Live room state: per-game broadcast channels, the accepted board and the
// robots' current positions while a game is being played.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::engine::{resolve_move, Board, Cell, Direction, GeneratedBoard, Move, ReplayError};
use crate::metrics;

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ServerMsg {
        message: String,
    },
    GameWaiting {
        game_id: i64,
        username: String,
        session_token: String,
        players_connected: usize,
        players_needed: usize,
    },
    GameStart {
        game_id: i64,
        players: Vec<String>,
        board: Board,
        optimal_moves: usize,
        started_at: String,
    },
    GameUpdate {
        game_id: i64,
        player: String,
        #[serde(rename = "move")]
        mv: Move,
        robots: Vec<Cell>,
    },
    GameOver {
        game_id: i64,
        winner: String,
        moves: usize,
        optimal_moves: usize,
    },
    GameError {
        game_id: i64,
        error: String,
    },
    MoveRejected {
        game_id: i64,
        error: String,
    },
}

/// Messages received from WebSocket clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinGame {
        #[serde(default)]
        username: Option<String>,
    },
    Move {
        game_id: i64,
        robot: usize,
        dir: Direction,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("game {0} is not known")]
    UnknownGame(i64),
    #[error("game {0} has not started")]
    NotStarted(i64),
    #[error("game {0} is already over")]
    Finished(i64),
    #[error("robot {robot} cannot move {dir}")]
    IllegalMove { robot: usize, dir: Direction },
    #[error("generated solution does not replay: {0}")]
    UnverifiedBoard(#[from] ReplayError),
    #[error("nobody is listening in game {0}")]
    NoListeners(i64),
}

/// Result of an accepted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub mv: Move,
    pub robots: Vec<Cell>,
    pub solved: bool,
}

struct Play {
    board: Board,
    positions: Vec<Cell>,
    optimal_moves: usize,
    moves_made: usize,
    finished: bool,
}

struct Room {
    tx: broadcast::Sender<String>,
    /// Cached `game_start` or `game_error` JSON, replayed to late subscribers.
    announcement: Option<String>,
    play: Option<Play>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Room {
            tx,
            announcement: None,
            play: None,
        }
    }
}

/// Thread-safe registry of live rooms, keyed by game id.
#[derive(Clone, Default)]
pub struct Lobby {
    rooms: Arc<Mutex<HashMap<i64, Room>>>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a room's messages, creating the room if needed. Also returns
    /// the cached `game_start` or `game_error` message if there is one.
    pub fn subscribe(&self, game_id: i64) -> (broadcast::Receiver<String>, Option<String>) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms.entry(game_id).or_insert_with(Room::new);
        metrics::ACTIVE_ROOMS.set(rooms.len() as i64);
        let room = &rooms[&game_id];
        (room.tx.subscribe(), room.announcement.clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    /// Send a message to everyone subscribed to `game_id`.
    pub fn broadcast(&self, game_id: i64, msg: &ServerMessage) {
        let rooms = self.rooms.lock().unwrap();
        if let Some(room) = rooms.get(&game_id) {
            send_json(&room.tx, msg);
        }
    }

    /// Install a generated board and announce the game.
    ///
    /// The solution is replayed first; a board whose solution does not replay
    /// is never shown to players. A room nobody listens to is dropped instead.
    pub fn start(&self, game_id: i64, players: Vec<String>, generated: GeneratedBoard) -> Result<(), LobbyError> {
        let board = generated.board;
        generated
            .solution
            .replay(board.grid(), board.robots(), board.target())?;

        let msg = ServerMessage::GameStart {
            game_id,
            players,
            board: board.clone(),
            optimal_moves: generated.solution.len(),
            started_at: chrono::Utc::now().to_rfc3339(),
        };

        let mut rooms = self.rooms.lock().unwrap();
        let listening = rooms
            .get(&game_id)
            .is_some_and(|room| room.tx.receiver_count() > 0);
        if !listening {
            rooms.remove(&game_id);
            metrics::ACTIVE_ROOMS.set(rooms.len() as i64);
            return Err(LobbyError::NoListeners(game_id));
        }
        let room = rooms
            .get_mut(&game_id)
            .ok_or(LobbyError::NoListeners(game_id))?;
        room.play = Some(Play {
            positions: board.robots().to_vec(),
            board,
            optimal_moves: generated.solution.len(),
            moves_made: 0,
            finished: false,
        });
        announce(room, &msg);
        Ok(())
    }

    /// Tell a room its board could not be produced. The error stays cached for
    /// players still subscribing; a room nobody listens to is dropped.
    pub fn fail(&self, game_id: i64, error: impl std::fmt::Display) {
        let msg = ServerMessage::GameError {
            game_id,
            error: error.to_string(),
        };
        let mut rooms = self.rooms.lock().unwrap();
        let listening = rooms
            .get(&game_id)
            .is_some_and(|room| room.tx.receiver_count() > 0);
        if let Some(room) = rooms.get_mut(&game_id).filter(|_| listening) {
            announce(room, &msg);
        } else {
            rooms.remove(&game_id);
        }
        metrics::ACTIVE_ROOMS.set(rooms.len() as i64);
    }

    /// Slide `robot` towards `dir` from the room's current positions and
    /// broadcast the result. The game ends when a robot lands on the target.
    pub fn apply_move(
        &self,
        game_id: i64,
        player: &str,
        robot: usize,
        dir: Direction,
    ) -> Result<MoveOutcome, LobbyError> {
        let mut rooms = self.rooms.lock().unwrap();
        let room = rooms.get_mut(&game_id).ok_or(LobbyError::UnknownGame(game_id))?;
        let play = room.play.as_mut().ok_or(LobbyError::NotStarted(game_id))?;
        if play.finished {
            return Err(LobbyError::Finished(game_id));
        }

        let mv = resolve_move(play.board.grid(), &play.positions, robot, dir)
            .ok_or(LobbyError::IllegalMove { robot, dir })?;
        play.positions[robot] = mv.destination;
        play.moves_made += 1;
        let solved = mv.destination == play.board.target();

        send_json(
            &room.tx,
            &ServerMessage::GameUpdate {
                game_id,
                player: player.to_string(),
                mv,
                robots: play.positions.clone(),
            },
        );

        if solved {
            play.finished = true;
            send_json(
                &room.tx,
                &ServerMessage::GameOver {
                    game_id,
                    winner: player.to_string(),
                    moves: play.moves_made,
                    optimal_moves: play.optimal_moves,
                },
            );
        }

        Ok(MoveOutcome {
            mv,
            robots: play.positions.clone(),
            solved,
        })
    }

    /// Current robot positions of a started game.
    pub fn positions(&self, game_id: i64) -> Option<Vec<Cell>> {
        let rooms = self.rooms.lock().unwrap();
        rooms
            .get(&game_id)
            .and_then(|room| room.play.as_ref())
            .map(|play| play.positions.clone())
    }

    /// Drop a room once nobody is listening any more.
    pub fn release(&self, game_id: i64) {
        let mut rooms = self.rooms.lock().unwrap();
        if rooms
            .get(&game_id)
            .is_some_and(|room| room.tx.receiver_count() == 0)
        {
            rooms.remove(&game_id);
        }
        metrics::ACTIVE_ROOMS.set(rooms.len() as i64);
    }
}

/// Broadcast `msg` and keep it for later subscribers.
fn announce(room: &mut Room, msg: &ServerMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = room.tx.send(json.clone());
            room.announcement = Some(json);
        }
        Err(e) => tracing::error!("Failed to serialize room message: {e}"),
    }
}

fn send_json(tx: &broadcast::Sender<String>, msg: &ServerMessage) {
    match serde_json::to_string(msg) {
        // No receivers is fine; the room may be empty for a moment.
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => tracing::error!("Failed to serialize room message: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Grid, Solution};

    fn open_board() -> GeneratedBoard {
        // 4x4 open board, robot 0 in the top-left corner, target top-right.
        let grid = Grid::open(4, 4).unwrap();
        let board = Board::new(grid, vec![Cell::new(0, 0), Cell::new(0, 3)], Cell::new(3, 0)).unwrap();
        let solution = Solution::from(vec![Move {
            robot: 0,
            direction: Direction::Right,
            destination: Cell::new(3, 0),
        }]);
        GeneratedBoard {
            board,
            solution,
            attempts: 1,
            stats: Default::default(),
        }
    }

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join_game"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::JoinGame { username: None }));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"move","game_id":3,"robot":1,"dir":"Left"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Move {
                game_id: 3,
                robot: 1,
                dir: Direction::Left
            }
        ));
    }

    #[test]
    fn test_start_broadcasts_and_caches_board() {
        let lobby = Lobby::new();
        let (mut rx, cached) = lobby.subscribe(1);
        assert!(cached.is_none());

        lobby.start(1, vec!["a".into(), "b".into()], open_board()).unwrap();

        let json: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(json["type"], "game_start");
        assert_eq!(json["players"], serde_json::json!(["a", "b"]));
        assert_eq!(json["board"]["target"], serde_json::json!([3, 0]));
        assert_eq!(json["optimal_moves"], 1);

        let (_rx, cached) = lobby.subscribe(1);
        assert!(cached.unwrap().contains("game_start"));
    }

    #[test]
    fn test_start_rejects_unverified_solution() {
        let lobby = Lobby::new();
        let mut generated = open_board();
        generated.solution = Solution::default();
        assert_eq!(
            lobby.start(1, vec![], generated),
            Err(LobbyError::UnverifiedBoard(ReplayError::TargetNotReached))
        );
        assert_eq!(lobby.positions(1), None);
    }

    #[test]
    fn test_moves_until_solved() {
        let lobby = Lobby::new();
        let (mut rx, _) = lobby.subscribe(7);
        assert_eq!(
            lobby.apply_move(7, "a", 0, Direction::Right),
            Err(LobbyError::NotStarted(7))
        );
        lobby.start(7, vec!["a".into()], open_board()).unwrap();
        let _start = rx.try_recv().unwrap();

        assert_eq!(
            lobby.apply_move(7, "a", 0, Direction::Up),
            Err(LobbyError::IllegalMove {
                robot: 0,
                dir: Direction::Up
            })
        );
        assert_eq!(
            lobby.apply_move(7, "a", 5, Direction::Up),
            Err(LobbyError::IllegalMove {
                robot: 5,
                dir: Direction::Up
            })
        );

        let outcome = lobby.apply_move(7, "a", 1, Direction::Up).unwrap();
        assert_eq!(outcome.mv.destination, Cell::new(0, 1));
        assert!(!outcome.solved);

        let outcome = lobby.apply_move(7, "b", 0, Direction::Right).unwrap();
        assert!(outcome.solved);
        assert_eq!(outcome.robots, vec![Cell::new(3, 0), Cell::new(0, 1)]);

        let update: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(update["type"], "game_update");
        assert_eq!(update["move"]["to"], serde_json::json!([0, 1]));
        let _second_update = rx.try_recv().unwrap();
        let over: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(over["type"], "game_over");
        assert_eq!(over["winner"], "b");
        assert_eq!(over["moves"], 2);
        assert_eq!(over["optimal_moves"], 1);

        assert_eq!(
            lobby.apply_move(7, "a", 1, Direction::Down),
            Err(LobbyError::Finished(7))
        );
    }

    #[test]
    fn test_start_without_listeners_drops_room() {
        let lobby = Lobby::new();
        assert_eq!(
            lobby.start(4, vec!["a".into(), "b".into()], open_board()),
            Err(LobbyError::NoListeners(4))
        );
        assert_eq!(lobby.room_count(), 0);

        // Everyone left before the board was ready.
        let (rx, _) = lobby.subscribe(5);
        drop(rx);
        assert_eq!(
            lobby.start(5, vec![], open_board()),
            Err(LobbyError::NoListeners(5))
        );
        assert_eq!(lobby.room_count(), 0);
        assert_eq!(lobby.positions(5), None);
    }

    #[test]
    fn test_failure_is_cached_for_late_subscribers() {
        let lobby = Lobby::new();
        let (mut rx, _) = lobby.subscribe(6);
        lobby.fail(6, "no solvable board");

        let json: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(json["type"], "game_error");
        assert_eq!(json["error"], "no solvable board");

        let (_late, cached) = lobby.subscribe(6);
        let cached: serde_json::Value = serde_json::from_str(&cached.unwrap()).unwrap();
        assert_eq!(cached["type"], "game_error");
    }

    #[test]
    fn test_failure_without_listeners_drops_room() {
        let lobby = Lobby::new();
        let (rx, _) = lobby.subscribe(8);
        drop(rx);
        lobby.fail(8, "no solvable board");
        assert_eq!(lobby.room_count(), 0);
    }

    #[test]
    fn test_release_only_empty_rooms() {
        let lobby = Lobby::new();
        let (rx, _) = lobby.subscribe(2);
        lobby.release(2);
        assert_eq!(lobby.room_count(), 1);
        drop(rx);
        lobby.release(2);
        assert_eq!(lobby.room_count(), 0);
        assert_eq!(
            lobby.apply_move(2, "a", 0, Direction::Up),
            Err(LobbyError::UnknownGame(2))
        );
    }
}
