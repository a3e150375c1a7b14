// Random board generation with a solvability gate.

use std::time::{Duration, Instant};

use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::board::{Board, Cell, Grid, Solution, WALL_EAST, WALL_NORTH, WALL_SOUTH, WALL_WEST};
use super::error::{BoardError, EngineError};
use super::solver::{SearchLimits, SearchStats};

/// Minimum Manhattan distance between the target and every starting robot.
pub const MIN_TARGET_DISTANCE: usize = 3;

/// Parameters for generate-and-verify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub rows: usize,
    pub cols: usize,
    pub robot_count: usize,
    /// Chance that each interior north and west edge gets a wall.
    pub wall_probability: f64,
    /// Candidate boards to try before giving up.
    pub max_attempts: u32,
    /// Wall-clock budget for the whole loop, checked between candidates.
    pub deadline_ms: Option<u64>,
    /// Per-candidate cap on expanded search states.
    pub max_expansions: Option<usize>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            rows: 10,
            cols: 10,
            robot_count: 3,
            wall_probability: 0.1,
            max_attempts: 500,
            deadline_ms: Some(5_000),
            max_expansions: Some(2_000_000),
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        fn invalid(msg: String) -> Result<(), EngineError> {
            Err(EngineError::InvalidConfiguration(msg))
        }
        if self.rows == 0 || self.cols == 0 {
            return invalid(format!(
                "grid must be at least 1x1, got {}x{}",
                self.cols, self.rows
            ));
        }
        if self.robot_count == 0 {
            return invalid("at least one robot is required".into());
        }
        let Some(cells) = self.cell_count() else {
            return invalid(format!("{}x{} grid is too large", self.cols, self.rows));
        };
        if self.robot_count >= cells {
            return invalid(format!(
                "{} robots do not fit a {}x{} grid",
                self.robot_count, self.cols, self.rows
            ));
        }
        if !self.wall_probability.is_finite() || !(0.0..=1.0).contains(&self.wall_probability) {
            return invalid(format!(
                "wall_probability must be within [0, 1], got {}",
                self.wall_probability
            ));
        }
        if self.max_attempts == 0 {
            return invalid("max_attempts must be at least 1".into());
        }
        Ok(())
    }

    /// `rows * cols`, or `None` if it overflows.
    pub fn cell_count(&self) -> Option<usize> {
        self.rows.checked_mul(self.cols)
    }

    fn search_limits(&self) -> SearchLimits {
        SearchLimits {
            max_expansions: self.max_expansions,
        }
    }
}

/// A board certified solvable, with the solution that certified it.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedBoard {
    pub board: Board,
    pub solution: Solution,
    /// Candidates tried, including the accepted one.
    pub attempts: u32,
    pub stats: SearchStats,
}

/// Random walls: borders always, interior north and west edges with probability `p`.
///
/// Draws happen in row-major order, north before west, and only for edges that
/// are not already forced by the border.
pub fn generate_walls<R: Rng + ?Sized>(
    rows: usize,
    cols: usize,
    p: f64,
    rng: &mut R,
) -> Result<Grid, BoardError> {
    let mut cells = Vec::with_capacity(rows * cols);
    for y in 0..rows {
        for x in 0..cols {
            let mut cell = 0;
            if y == 0 || rng.gen::<f64>() < p {
                cell |= WALL_NORTH;
            }
            if x == cols - 1 {
                cell |= WALL_EAST;
            }
            if y == rows - 1 {
                cell |= WALL_SOUTH;
            }
            if x == 0 || rng.gen::<f64>() < p {
                cell |= WALL_WEST;
            }
            cells.push(cell);
        }
    }
    Grid::from_cells(rows, cols, cells)
}

/// One unverified candidate board. `Ok(None)` when no cell is far enough from
/// every robot to hold the target.
pub fn generate_board<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<Option<Board>, EngineError> {
    config.validate()?;
    candidate(config, rng)
}

fn candidate<R: Rng + ?Sized>(config: &GeneratorConfig, rng: &mut R) -> Result<Option<Board>, EngineError> {
    let grid = generate_walls(config.rows, config.cols, config.wall_probability, rng)?;
    let cols = config.cols;
    let to_cell = |i: usize| Cell::new(i % cols, i / cols);

    let robots: Vec<Cell> = index::sample(rng, grid.capacity(), config.robot_count)
        .into_iter()
        .map(to_cell)
        .collect();

    let far_enough: Vec<Cell> = (0..grid.capacity())
        .map(to_cell)
        .filter(|cell| robots.iter().all(|r| r.manhattan(*cell) >= MIN_TARGET_DISTANCE))
        .collect();
    let Some(&target) = far_enough.choose(rng) else {
        return Ok(None);
    };

    Ok(Some(Board::new(grid, robots, target)?))
}

/// Generate candidates until one is proven solvable or the budget runs out.
///
/// Candidates the search cannot finish within `max_expansions` are discarded
/// the same way as unsolvable ones.
pub fn generate_solvable<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<GeneratedBoard, EngineError> {
    config.validate()?;
    let started = Instant::now();
    let deadline = config.deadline_ms.map(Duration::from_millis);
    let limits = config.search_limits();

    let mut attempts = 0;
    while attempts < config.max_attempts {
        if deadline.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        attempts += 1;

        let Some(board) = candidate(config, rng)? else {
            continue;
        };
        match board.solve(limits) {
            Ok(outcome) => {
                if let Some(solution) = outcome.solution {
                    return Ok(GeneratedBoard {
                        board,
                        solution,
                        attempts,
                        stats: outcome.stats,
                    });
                }
            }
            Err(EngineError::SearchBudgetExceeded { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    Err(EngineError::GenerationBudgetExceeded {
        attempts,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}
