// Breadth-first search over joint robot positions.
//
// States are the ordered tuple of every robot's cell. The frontier is expanded in
// level order, so the first state dequeued with a robot on the target carries a
// move sequence of minimal length.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use super::board::{validate_placement, Board, Cell, Direction, Grid, Move, Solution};
use super::error::{EngineError, ReplayError};
use super::resolver::resolve_move;

/// Caps on a single search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchLimits {
    /// Maximum number of states expanded before giving up.
    pub max_expansions: Option<usize>,
}

impl SearchLimits {
    pub fn unbounded() -> Self {
        SearchLimits::default()
    }

    pub fn with_max_expansions(max_expansions: usize) -> Self {
        SearchLimits {
            max_expansions: Some(max_expansions),
        }
    }
}

/// Counters collected during a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// States dequeued and expanded.
    pub expanded: usize,
    /// Distinct states discovered, including the initial one.
    pub visited: usize,
    /// Move count of the deepest level reached.
    pub depth: usize,
}

/// Result of a completed search. `solution` is `None` when the board is
/// proven unsolvable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub solution: Option<Solution>,
    pub stats: SearchStats,
}

/// Find a minimal move sequence putting some robot on `target`, with no cap
/// on the search. `Ok(None)` means no sequence exists.
pub fn solve(grid: &Grid, robots: &[Cell], target: Cell) -> Result<Option<Solution>, EngineError> {
    solve_with_limits(grid, robots, target, SearchLimits::unbounded()).map(|o| o.solution)
}

/// Breadth-first search bounded by `limits`.
pub fn solve_with_limits(
    grid: &Grid,
    robots: &[Cell],
    target: Cell,
    limits: SearchLimits,
) -> Result<SearchOutcome, EngineError> {
    validate_placement(grid, robots, target)?;

    // Move records with a back-link to the move before them.
    struct Step {
        parent: Option<usize>,
        mv: Move,
    }

    let start: Box<[Cell]> = robots.into();
    let mut steps: Vec<Step> = Vec::new();
    let mut visited: HashSet<Box<[Cell]>> = HashSet::new();
    let mut frontier: VecDeque<(Box<[Cell]>, Option<usize>, usize)> = VecDeque::new();
    let mut stats = SearchStats::default();

    visited.insert(start.clone());
    frontier.push_back((start, None, 0));

    while let Some((positions, last, depth)) = frontier.pop_front() {
        stats.depth = depth;

        if positions.contains(&target) {
            let mut moves = Vec::with_capacity(depth);
            let mut cursor = last;
            while let Some(i) = cursor {
                moves.push(steps[i].mv);
                cursor = steps[i].parent;
            }
            moves.reverse();
            stats.visited = visited.len();
            return Ok(SearchOutcome {
                solution: Some(Solution::from(moves)),
                stats,
            });
        }

        if limits.max_expansions.is_some_and(|max| stats.expanded >= max) {
            return Err(EngineError::SearchBudgetExceeded {
                expanded: stats.expanded,
            });
        }
        stats.expanded += 1;

        for robot in 0..positions.len() {
            for dir in Direction::ALL {
                let Some(mv) = resolve_move(grid, &positions, robot, dir) else {
                    continue;
                };
                let mut next = positions.clone();
                next[robot] = mv.destination;
                if visited.contains(&next) {
                    continue;
                }
                visited.insert(next.clone());
                steps.push(Step { parent: last, mv });
                frontier.push_back((next, Some(steps.len() - 1), depth + 1));
            }
        }
    }

    stats.visited = visited.len();
    Ok(SearchOutcome {
        solution: None,
        stats,
    })
}

impl Board {
    /// Solve this board from its initial robot positions.
    pub fn solve(&self, limits: SearchLimits) -> Result<SearchOutcome, EngineError> {
        solve_with_limits(self.grid(), self.robots(), self.target(), limits)
    }
}

impl Solution {
    /// Re-apply every move from `robots`, checking each recorded destination
    /// against the resolver. Returns the final positions.
    pub fn replay(&self, grid: &Grid, robots: &[Cell], target: Cell) -> Result<Vec<Cell>, ReplayError> {
        let mut positions = robots.to_vec();
        for (step, mv) in self.moves().iter().enumerate() {
            if mv.robot >= positions.len() {
                return Err(ReplayError::UnknownRobot {
                    step,
                    robot: mv.robot,
                });
            }
            let resolved = resolve_move(grid, &positions, mv.robot, mv.direction)
                .ok_or(ReplayError::NoOp { step })?;
            if resolved.destination != mv.destination {
                return Err(ReplayError::DestinationMismatch {
                    step,
                    recorded: mv.destination,
                    actual: resolved.destination,
                });
            }
            positions[mv.robot] = resolved.destination;
        }
        if !positions.contains(&target) {
            return Err(ReplayError::TargetNotReached);
        }
        Ok(positions)
    }
}
