// FIFO queue of games waiting for a board, drained into the worker pool.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::db::{Database, GameStatus};
use crate::engine::{EngineError, GeneratedBoard, GeneratorConfig};
use crate::lobby::Lobby;
use crate::metrics;
use crate::worker_pool::WorkerPool;

/// A full game that needs a board.
#[derive(Debug, Clone)]
pub struct PendingBoard {
    pub game_id: i64,
    pub players: Vec<String>,
    pub config: GeneratorConfig,
}

/// Status of the generation queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub depth: usize,
}

/// Thread-safe FIFO generation queue.
#[derive(Debug, Clone)]
pub struct GenerationQueue {
    inner: Arc<Mutex<VecDeque<PendingBoard>>>,
}

impl GenerationQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Add a game to the back of the queue.
    pub fn enqueue(&self, entry: PendingBoard) {
        let mut queue = self.inner.lock().unwrap();
        queue.push_back(entry);
        metrics::GENERATION_QUEUE_DEPTH.set(queue.len() as i64);
    }

    /// Remove and return the next game from the front of the queue.
    pub fn dequeue(&self) -> Option<PendingBoard> {
        let mut queue = self.inner.lock().unwrap();
        let result = queue.pop_front();
        metrics::GENERATION_QUEUE_DEPTH.set(queue.len() as i64);
        result
    }

    /// Put a game back at the front, keeping its place in line.
    pub fn requeue_front(&self, entry: PendingBoard) {
        let mut queue = self.inner.lock().unwrap();
        queue.push_front(entry);
        metrics::GENERATION_QUEUE_DEPTH.set(queue.len() as i64);
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            depth: self.depth(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl Default for GenerationQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the callback that installs a generated board in its room, or reports
/// the failure and closes the game.
pub fn build_generation_callback(
    db: Arc<Database>,
    lobby: Lobby,
    game_id: i64,
    players: Vec<String>,
) -> impl FnOnce(Result<GeneratedBoard, EngineError>) + Send + 'static {
    let rt = tokio::runtime::Handle::current();

    move |result: Result<GeneratedBoard, EngineError>| {
        let error = match result {
            Ok(generated) => match lobby.start(game_id, players, generated) {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!("Game {game_id}: generated board not installed: {e}");
                    e.to_string()
                }
            },
            Err(e) => e.to_string(),
        };
        lobby.fail(game_id, &error);
        rt.spawn(async move {
            if let Err(e) = db
                .transition_game(game_id, GameStatus::Active, GameStatus::Finished)
                .await
            {
                tracing::error!("Game {game_id}: failed to close after generation error: {e}");
            }
        });
    }
}

/// Dispatch one queued game if the pool has room. Returns whether a job started.
pub fn dispatch_next(
    db: &Arc<Database>,
    lobby: &Lobby,
    pool: &WorkerPool,
    queue: &GenerationQueue,
) -> bool {
    if !pool.has_capacity() {
        return false;
    }
    let Some(entry) = queue.dequeue() else {
        return false;
    };

    let on_complete =
        build_generation_callback(db.clone(), lobby.clone(), entry.game_id, entry.players.clone());
    if pool.spawn_generation(entry.game_id, entry.config.clone(), on_complete) {
        tracing::info!("Game {}: board generation started", entry.game_id);
        true
    } else {
        queue.requeue_front(entry);
        false
    }
}

/// Spawn a background task that drains the queue into the worker pool.
pub fn spawn_queue_worker(
    db: Arc<Database>,
    lobby: Lobby,
    pool: Arc<WorkerPool>,
    queue: GenerationQueue,
) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(100)).await;
            while dispatch_next(&db, &lobby, &pool, &queue) {}
        }
    });
}
