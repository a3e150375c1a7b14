// Error types for the puzzle engine.

use thiserror::Error;

use super::board::Cell;

/// A board or robot placement that violates the board model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("board must have at least one row and one column")]
    Empty,
    #[error("grid has {actual} rows, expected {expected}")]
    RowCount { expected: usize, actual: usize },
    #[error("grid row {row} has {actual} cells, expected {expected}")]
    ColumnCount {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("cell {cell} has wall mask {mask}, expected 0..=15")]
    InvalidMask { cell: Cell, mask: u8 },
    #[error("boundary cell {cell} is missing its enclosing wall")]
    OpenBorder { cell: Cell },
    #[error("board has no robots")]
    NoRobots,
    #[error("cell {cell} is outside the {cols}x{rows} grid")]
    OutOfBounds { cell: Cell, cols: usize, rows: usize },
    #[error("robots {first} and {second} share cell {cell}")]
    SharedCell {
        first: usize,
        second: usize,
        cell: Cell,
    },
}

/// Failures surfaced by the engine's entry points.
///
/// An unsolvable board is not an error: `solve` reports it as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid board: {0}")]
    InvalidBoard(#[from] BoardError),
    #[error("no solvable board found after {attempts} attempts ({elapsed_ms} ms)")]
    GenerationBudgetExceeded { attempts: u32, elapsed_ms: u64 },
    #[error("search stopped after expanding {expanded} states")]
    SearchBudgetExceeded { expanded: usize },
}

/// Why a recorded solution does not replay on a board.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("move {step}: robot {robot} does not exist")]
    UnknownRobot { step: usize, robot: usize },
    #[error("move {step}: robot does not move")]
    NoOp { step: usize },
    #[error("move {step}: robot stops at {actual}, recorded {recorded}")]
    DestinationMismatch {
        step: usize,
        recorded: Cell,
        actual: Cell,
    },
    #[error("no robot reaches the target")]
    TargetNotReached,
}
