// Move resolution: where a robot comes to rest when slid in one direction.

use super::board::{Cell, Direction, Grid, Move};

impl Grid {
    /// Whether one step from `from` towards `dir` is impossible.
    ///
    /// A wall blocks if either side records it: the current cell's bit facing `dir`
    /// or the next cell's bit facing back. Leaving the grid is always blocked.
    pub fn is_blocked(&self, from: Cell, dir: Direction) -> bool {
        match self.neighbor(from, dir) {
            Some(next) => self.wall_between(from, next, dir),
            None => true,
        }
    }

    fn wall_between(&self, from: Cell, to: Cell, dir: Direction) -> bool {
        self.walls(from) & dir.wall_bit() != 0 || self.walls(to) & dir.opposite().wall_bit() != 0
    }
}

/// Slide from `start` towards `dir` until a wall, the grid edge, or a cell in
/// `others` stops it. `others` holds every robot except the one moving.
pub fn slide(grid: &Grid, others: &[Cell], start: Cell, dir: Direction) -> Cell {
    slide_until(grid, start, dir, |cell| others.contains(&cell))
}

/// Like [`slide`], but a slide that ends where it started is `None`.
pub fn try_slide(grid: &Grid, others: &[Cell], start: Cell, dir: Direction) -> Option<Cell> {
    let end = slide(grid, others, start, dir);
    (end != start).then_some(end)
}

/// Resolve robot `robot` sliding towards `dir`, with every other entry of
/// `positions` acting as an obstacle. No-op slides and unknown robots are `None`.
pub fn resolve_move(grid: &Grid, positions: &[Cell], robot: usize, dir: Direction) -> Option<Move> {
    let start = *positions.get(robot)?;
    let end = slide_until(grid, start, dir, |cell| {
        positions
            .iter()
            .enumerate()
            .any(|(i, &other)| i != robot && other == cell)
    });
    (end != start).then_some(Move {
        robot,
        direction: dir,
        destination: end,
    })
}

fn slide_until<F>(grid: &Grid, start: Cell, dir: Direction, occupied: F) -> Cell
where
    F: Fn(Cell) -> bool,
{
    let mut at = start;
    loop {
        match grid.neighbor(at, dir) {
            Some(next) if !grid.wall_between(at, next, dir) && !occupied(next) => at = next,
            _ => return at,
        }
    }
}
