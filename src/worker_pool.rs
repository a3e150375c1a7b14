// Worker pool for engine jobs (board generation and solving).
//
// Each job runs on a dedicated OS thread so long searches never stall the
// tokio workers serving connections. The pool has a fixed capacity; callers
// check `has_capacity()` or handle a `false` return from the spawn methods.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::engine::{generate_solvable, EngineError, GeneratedBoard, GeneratorConfig};
use crate::metrics;

/// Manages a fixed-size pool of OS threads for engine work.
pub struct WorkerPool {
    worker_count: usize,
    active_workers: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            active_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether the pool has capacity to accept another job.
    pub fn has_capacity(&self) -> bool {
        self.active_workers.load(Ordering::Relaxed) < self.worker_count
    }

    /// Current number of active workers.
    pub fn active_count(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Run `job` on a new OS thread.
    /// Returns false if the pool is at capacity or the thread could not start.
    /// `on_complete` is invoked on the tokio runtime with the job's output.
    pub fn spawn_job<T, J, F>(&self, name: String, job: J, on_complete: F) -> bool
    where
        T: Send + 'static,
        J: FnOnce() -> T + Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        if !self.has_capacity() {
            return false;
        }

        let active = self.active_workers.clone();
        active.fetch_add(1, Ordering::Relaxed);
        metrics::ENGINE_WORKERS_ACTIVE.set(active.load(Ordering::Relaxed) as i64);

        let rt_handle = tokio::runtime::Handle::current();
        let active_in_thread = active.clone();

        let spawned = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let output = job();

                active_in_thread.fetch_sub(1, Ordering::Relaxed);
                metrics::ENGINE_WORKERS_ACTIVE
                    .set(active_in_thread.load(Ordering::Relaxed) as i64);

                rt_handle.spawn(async move {
                    on_complete(output);
                });
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn engine worker {name}: {e}");
            active.fetch_sub(1, Ordering::Relaxed);
            metrics::ENGINE_WORKERS_ACTIVE.set(active.load(Ordering::Relaxed) as i64);
            return false;
        }
        true
    }

    /// Generate a solvable board for `game_id` on a worker thread.
    pub fn spawn_generation<F>(&self, game_id: i64, config: GeneratorConfig, on_complete: F) -> bool
    where
        F: FnOnce(Result<GeneratedBoard, EngineError>) + Send + 'static,
    {
        self.spawn_job(
            format!("board-gen-{game_id}"),
            move || run_generation(game_id, &config),
            on_complete,
        )
    }
}

/// Generate-and-verify with a fresh entropy-seeded RNG, recording metrics.
pub fn run_generation(game_id: i64, config: &GeneratorConfig) -> Result<GeneratedBoard, EngineError> {
    let started = Instant::now();
    let result = generate_solvable(config, &mut StdRng::from_entropy());
    let elapsed = started.elapsed().as_secs_f64();

    match &result {
        Ok(generated) => {
            metrics::BOARDS_GENERATED_TOTAL.inc();
            metrics::GENERATION_ATTEMPTS.observe(generated.attempts as f64);
            metrics::GENERATION_DURATION_SECONDS.observe(elapsed);
            metrics::SOLUTION_LENGTH.observe(generated.solution.len() as f64);
            tracing::info!(
                game_id,
                attempts = generated.attempts,
                moves = generated.solution.len(),
                expanded = generated.stats.expanded,
                "Generated solvable {}x{} board in {:.3}s",
                config.cols,
                config.rows,
                elapsed
            );
        }
        Err(e) => {
            let reason = match e {
                EngineError::InvalidConfiguration(_) => "config",
                EngineError::GenerationBudgetExceeded { .. } => "budget",
                _ => "other",
            };
            metrics::GENERATION_FAILURES_TOTAL
                .with_label_values(&[reason])
                .inc();
            tracing::warn!(game_id, "Board generation failed: {e}");
        }
    }
    result
}
