// Puzzle engine: board model, move resolution, breadth-first solver and the
// generate-and-verify board generator. Pure computation, no I/O.

pub mod board;
pub mod error;
pub mod generator;
pub mod resolver;
pub mod solver;

pub use board::{Board, Cell, Direction, Grid, Move, Solution};
pub use error::{BoardError, EngineError, ReplayError};
pub use generator::{generate_solvable, GeneratedBoard, GeneratorConfig};
pub use resolver::{resolve_move, slide, try_slide};
pub use solver::{solve, solve_with_limits, SearchLimits, SearchOutcome, SearchStats};
