// HTTP API routes: matchmaking, stateless engine endpoints and metrics.

pub mod ws;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::config::Config;
use crate::db::{Database, GameStatus};
use crate::engine::{Board, EngineError, GeneratorConfig, SearchLimits, SearchStats, Solution};
use crate::lobby::Lobby;
use crate::metrics;
use crate::queue::{GenerationQueue, PendingBoard};
use crate::worker_pool::{run_generation, WorkerPool};

// ── Request / response types ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct JoinParams {
    pub username: Option<String>,
}

#[derive(Deserialize)]
pub struct SolveRequest {
    pub board: Board,
    pub max_expansions: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SolveResponse {
    pub solvable: bool,
    pub solution: Option<Solution>,
    pub stats: SearchStats,
}

/// What a player gets back from joining.
#[derive(Debug, Clone, Serialize)]
pub struct JoinResponse {
    pub game_id: i64,
    pub username: String,
    pub session_token: String,
    pub status: String,
    pub players: Vec<String>,
    pub players_connected: usize,
    pub players_needed: usize,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub lobby: Lobby,
    pub pool: Arc<WorkerPool>,
    pub queue: GenerationQueue,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: Config) -> Self {
        Self {
            db,
            lobby: Lobby::new(),
            pool: Arc::new(WorkerPool::new(config.worker_count)),
            queue: GenerationQueue::new(),
            config: Arc::new(config),
        }
    }
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

fn internal_error(e: sqlx::Error) -> Response {
    tracing::error!("Database error: {e}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn engine_error(e: &EngineError) -> Response {
    let status = match e {
        EngineError::InvalidConfiguration(_) | EngineError::InvalidBoard(_) => StatusCode::BAD_REQUEST,
        EngineError::GenerationBudgetExceeded { .. } | EngineError::SearchBudgetExceeded { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    json_error(status, &e.to_string())
}

fn workers_busy() -> Response {
    json_error(StatusCode::SERVICE_UNAVAILABLE, "All engine workers are busy")
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        // Matchmaking
        .route("/api/join", post(join))
        .route("/api/games/{id}", get(get_game))
        .route("/api/queue/status", get(queue_status))
        // Engine
        .route("/api/solve", post(solve_board))
        .route("/api/boards", post(generate_board))
        // WebSocket
        .route("/ws/game", get(ws::ws_game))
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "ricochet-backend" }))
}

async fn metrics_text() -> String {
    metrics::gather_metrics()
}

// ── Matchmaking ───────────────────────────────────────────────────────

/// Seat a player in a game. When this fills the game, it is marked active
/// and queued for board generation.
pub async fn join_game(state: &AppState, username: Option<String>) -> Result<JoinResponse, sqlx::Error> {
    let username = match username.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
        Some(name) => name,
        None => state.db.generate_unique_username().await?,
    };

    let record = state.db.join_game(&username, state.config.max_players).await?;
    let game_id = record.game.id;
    let players_connected = record.players.len();
    let players_needed = usize::try_from(record.game.max_players)
        .unwrap_or(0)
        .saturating_sub(players_connected);

    let mut status = record.game.status.clone();
    if players_needed == 0
        && state
            .db
            .transition_game(game_id, GameStatus::Waiting, GameStatus::Active)
            .await?
    {
        status = GameStatus::Active.as_str().to_string();
        tracing::info!("Starting game {game_id} with players: {:?}", record.players);
        state.queue.enqueue(PendingBoard {
            game_id,
            players: record.players.clone(),
            config: state.config.generator.clone(),
        });
    } else {
        tracing::info!(
            "Waiting for more players in game {game_id}: {players_connected}/{}",
            record.game.max_players
        );
    }

    Ok(JoinResponse {
        game_id,
        username: record.player.username,
        session_token: record.session.session_token,
        status,
        players: record.players,
        players_connected,
        players_needed,
    })
}

async fn join(State(state): State<AppState>, Query(params): Query<JoinParams>) -> Response {
    match join_game(&state, params.username).await {
        Ok(joined) => (StatusCode::OK, Json(json!(joined))).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_game(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let game = match state.db.get_game(id).await {
        Ok(Some(game)) => game,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "Game not found"),
        Err(e) => return internal_error(e),
    };
    let players = match state.db.list_game_players(id).await {
        Ok(players) => players,
        Err(e) => return internal_error(e),
    };
    let robots = state.lobby.positions(id);
    (
        StatusCode::OK,
        Json(json!({ "game": game, "players": players, "robots": robots })),
    )
        .into_response()
}

async fn queue_status(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(json!(state.queue.status()))).into_response()
}

// ── Engine endpoints ──────────────────────────────────────────────────

/// Run `job` on the worker pool and wait for its output. `None` when the
/// pool is full or the worker went away.
async fn run_on_pool<T, J>(state: &AppState, name: String, job: J) -> Option<T>
where
    T: Send + 'static,
    J: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let spawned = state.pool.spawn_job(name, job, move |output| {
        let _ = tx.send(output);
    });
    if !spawned {
        return None;
    }
    rx.await.ok()
}

async fn solve_board(State(state): State<AppState>, Json(req): Json<SolveRequest>) -> Response {
    let cap = state.config.solve_max_expansions;
    let limits = SearchLimits::with_max_expansions(req.max_expansions.unwrap_or(cap).min(cap));
    let board = req.board;

    let result = run_on_pool(&state, "solve".to_string(), move || board.solve(limits)).await;
    match result {
        Some(Ok(outcome)) => {
            let response = SolveResponse {
                solvable: outcome.solution.is_some(),
                solution: outcome.solution,
                stats: outcome.stats,
            };
            (StatusCode::OK, Json(json!(response))).into_response()
        }
        Some(Err(e)) => engine_error(&e),
        None => workers_busy(),
    }
}

/// Clamp a caller-supplied generator config to the server's budgets.
/// Boards larger than `max_board_cells` are refused outright.
fn bounded_generator(mut requested: GeneratorConfig, server: &Config) -> Result<GeneratorConfig, EngineError> {
    match requested.cell_count() {
        Some(cells) if cells <= server.max_board_cells => {}
        _ => {
            return Err(EngineError::InvalidConfiguration(format!(
                "{}x{} board exceeds the {} cell limit",
                requested.cols, requested.rows, server.max_board_cells
            )))
        }
    }

    let cap = server.solve_max_expansions;
    requested.max_expansions = Some(requested.max_expansions.unwrap_or(cap).min(cap));
    requested.max_attempts = requested.max_attempts.min(server.generator.max_attempts);
    requested.deadline_ms = match (requested.deadline_ms, server.generator.deadline_ms) {
        (Some(asked), Some(limit)) => Some(asked.min(limit)),
        (asked, limit) => limit.or(asked),
    };
    requested.validate()?;
    Ok(requested)
}

async fn generate_board(State(state): State<AppState>, Json(req): Json<GeneratorConfig>) -> Response {
    let config = match bounded_generator(req, &state.config) {
        Ok(config) => config,
        Err(e) => return engine_error(&e),
    };

    let result = run_on_pool(&state, "board-gen-api".to_string(), move || {
        run_generation(0, &config)
    })
    .await;
    match result {
        Some(Ok(generated)) => (StatusCode::OK, Json(json!(generated))).into_response(),
        Some(Err(e)) => engine_error(&e),
        None => workers_busy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_generator_caps_budgets() {
        let server = Config::default();
        let requested = GeneratorConfig {
            max_attempts: 1_000_000,
            deadline_ms: None,
            max_expansions: None,
            ..Default::default()
        };
        let bounded = bounded_generator(requested, &server).unwrap();
        assert_eq!(bounded.max_attempts, server.generator.max_attempts);
        assert_eq!(bounded.deadline_ms, server.generator.deadline_ms);
        assert_eq!(bounded.max_expansions, Some(server.solve_max_expansions));
    }

    #[test]
    fn test_bounded_generator_keeps_smaller_requests() {
        let server = Config::default();
        let requested = GeneratorConfig {
            rows: 6,
            max_attempts: 10,
            deadline_ms: Some(100),
            max_expansions: Some(500),
            ..Default::default()
        };
        let bounded = bounded_generator(requested, &server).unwrap();
        assert_eq!(bounded.rows, 6);
        assert_eq!(bounded.max_attempts, 10);
        assert_eq!(bounded.deadline_ms, Some(100));
        assert_eq!(bounded.max_expansions, Some(500));
    }

    #[test]
    fn test_bounded_generator_refuses_large_boards() {
        let server = Config::default();
        for (rows, cols) in [(1usize << 33, 1usize << 31), (1_000_000, 1_000_000), (33, 32)] {
            let requested = GeneratorConfig {
                rows,
                cols,
                ..Default::default()
            };
            assert!(matches!(
                bounded_generator(requested, &server),
                Err(EngineError::InvalidConfiguration(_))
            ));
        }
        let exact = GeneratorConfig {
            rows: 32,
            cols: 32,
            ..Default::default()
        };
        assert!(bounded_generator(exact, &server).is_ok());
    }

    #[test]
    fn test_engine_error_status() {
        let resp = engine_error(&EngineError::InvalidConfiguration("x".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = engine_error(&EngineError::SearchBudgetExceeded { expanded: 10 });
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
