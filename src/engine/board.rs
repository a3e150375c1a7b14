// Board model: wall-bitmask grid, robot positions, target, moves and solutions.
//
// Coordinates are `[x, y]` = `[column, row]` everywhere. `grid[y][x]` holds the
// walls of the cell in column `x`, row `y`, and `Up` decreases `y`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::BoardError;

pub const WALL_NORTH: u8 = 1;
pub const WALL_EAST: u8 = 2;
pub const WALL_SOUTH: u8 = 4;
pub const WALL_WEST: u8 = 8;
pub const WALL_MASK: u8 = WALL_NORTH | WALL_EAST | WALL_SOUTH | WALL_WEST;

/// A cell coordinate, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[usize; 2]", into = "[usize; 2]")]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub const fn new(x: usize, y: usize) -> Self {
        Cell { x, y }
    }

    pub fn manhattan(self, other: Cell) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl From<[usize; 2]> for Cell {
    fn from([x, y]: [usize; 2]) -> Self {
        Cell { x, y }
    }
}

impl From<Cell> for [usize; 2] {
    fn from(cell: Cell) -> Self {
        [cell.x, cell.y]
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// Sliding direction. Serialized as `"Up"`, `"Down"`, `"Left"`, `"Right"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Expansion order used by the search.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Wall bit on the side of a cell facing this direction.
    pub fn wall_bit(self) -> u8 {
        match self {
            Direction::Up => WALL_NORTH,
            Direction::Down => WALL_SOUTH,
            Direction::Left => WALL_WEST,
            Direction::Right => WALL_EAST,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "Up",
            Direction::Down => "Down",
            Direction::Left => "Left",
            Direction::Right => "Right",
        };
        f.write_str(name)
    }
}

/// A rows × cols grid of wall bitmasks, enclosed on all four sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// Build a grid from row-major nested rows (`rows[y][x]`).
    pub fn new(rows: usize, cols: usize, grid: Vec<Vec<u8>>) -> Result<Self, BoardError> {
        if grid.len() != rows {
            return Err(BoardError::RowCount {
                expected: rows,
                actual: grid.len(),
            });
        }
        let mut cells = Vec::with_capacity(rows * cols);
        for (row, line) in grid.into_iter().enumerate() {
            if line.len() != cols {
                return Err(BoardError::ColumnCount {
                    row,
                    expected: cols,
                    actual: line.len(),
                });
            }
            cells.extend(line);
        }
        Self::from_cells(rows, cols, cells)
    }

    /// Build a grid from a flat row-major cell vector.
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<u8>) -> Result<Self, BoardError> {
        if rows == 0 || cols == 0 {
            return Err(BoardError::Empty);
        }
        if cells.len() != rows * cols {
            return Err(BoardError::RowCount {
                expected: rows,
                actual: cells.len() / cols,
            });
        }
        let grid = Grid { rows, cols, cells };
        for y in 0..rows {
            for x in 0..cols {
                let cell = Cell::new(x, y);
                let mask = grid.walls(cell);
                if mask & !WALL_MASK != 0 {
                    return Err(BoardError::InvalidMask { cell, mask });
                }
                if mask & grid.border_bits(cell) != grid.border_bits(cell) {
                    return Err(BoardError::OpenBorder { cell });
                }
            }
        }
        Ok(grid)
    }

    /// A grid with only the enclosing border walls.
    pub fn open(rows: usize, cols: usize) -> Result<Self, BoardError> {
        if rows == 0 || cols == 0 {
            return Err(BoardError::Empty);
        }
        let mut grid = Grid {
            rows,
            cols,
            cells: vec![0; rows * cols],
        };
        for y in 0..rows {
            for x in 0..cols {
                let cell = Cell::new(x, y);
                let idx = grid.index(cell);
                grid.cells[idx] = grid.border_bits(cell);
            }
        }
        Ok(grid)
    }

    /// Return a copy with one extra wall bit recorded on `cell`.
    /// Only that cell's mask changes; the neighbour is left as it was.
    pub fn with_wall(mut self, cell: Cell, side: Direction) -> Self {
        if self.contains(cell) {
            let idx = self.index(cell);
            self.cells[idx] |= side.wall_bit();
        }
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn capacity(&self) -> usize {
        self.rows * self.cols
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.x < self.cols && cell.y < self.rows
    }

    /// Wall bitmask of `cell`. Cells outside the grid read as fully walled.
    pub fn walls(&self, cell: Cell) -> u8 {
        if self.contains(cell) {
            self.cells[self.index(cell)]
        } else {
            WALL_MASK
        }
    }

    /// The adjacent cell in `dir`, if it lies inside the grid.
    pub fn neighbor(&self, cell: Cell, dir: Direction) -> Option<Cell> {
        let next = match dir {
            Direction::Up => Cell::new(cell.x, cell.y.checked_sub(1)?),
            Direction::Down => Cell::new(cell.x, cell.y + 1),
            Direction::Left => Cell::new(cell.x.checked_sub(1)?, cell.y),
            Direction::Right => Cell::new(cell.x + 1, cell.y),
        };
        self.contains(next).then_some(next)
    }

    /// Nested `grid[y][x]` form used on the wire.
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.cells.chunks(self.cols).map(|row| row.to_vec()).collect()
    }

    /// Whether `cell` has every enclosing bit its position on the boundary requires.
    pub fn is_enclosed(&self, cell: Cell) -> bool {
        let border = self.border_bits(cell);
        self.walls(cell) & border == border
    }

    fn border_bits(&self, cell: Cell) -> u8 {
        let mut bits = 0;
        if cell.y == 0 {
            bits |= WALL_NORTH;
        }
        if cell.x == self.cols - 1 {
            bits |= WALL_EAST;
        }
        if cell.y == self.rows - 1 {
            bits |= WALL_SOUTH;
        }
        if cell.x == 0 {
            bits |= WALL_WEST;
        }
        bits
    }

    fn index(&self, cell: Cell) -> usize {
        cell.y * self.cols + cell.x
    }
}

/// Check that robots and target fit the grid and no two robots share a cell.
pub fn validate_placement(grid: &Grid, robots: &[Cell], target: Cell) -> Result<(), BoardError> {
    if robots.is_empty() {
        return Err(BoardError::NoRobots);
    }
    let out_of_bounds = |cell: Cell| BoardError::OutOfBounds {
        cell,
        cols: grid.cols(),
        rows: grid.rows(),
    };
    for (i, &robot) in robots.iter().enumerate() {
        if !grid.contains(robot) {
            return Err(out_of_bounds(robot));
        }
        if let Some(j) = robots[..i].iter().position(|&other| other == robot) {
            return Err(BoardError::SharedCell {
                first: j,
                second: i,
                cell: robot,
            });
        }
    }
    if !grid.contains(target) {
        return Err(out_of_bounds(target));
    }
    Ok(())
}

/// Wire shape of a board: `{ rows, cols, grid, robots, target }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardPayload {
    pub rows: usize,
    pub cols: usize,
    pub grid: Vec<Vec<u8>>,
    pub robots: Vec<Cell>,
    pub target: Cell,
}

/// An immutable puzzle: walls, initial robot positions and the target cell.
///
/// Robot order is fixed for the lifetime of the board; moves refer to robots by
/// their index in `robots()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BoardPayload", into = "BoardPayload")]
pub struct Board {
    grid: Grid,
    robots: Vec<Cell>,
    target: Cell,
}

impl Board {
    pub fn new(grid: Grid, robots: Vec<Cell>, target: Cell) -> Result<Self, BoardError> {
        validate_placement(&grid, &robots, target)?;
        Ok(Board {
            grid,
            robots,
            target,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn robots(&self) -> &[Cell] {
        &self.robots
    }

    pub fn target(&self) -> Cell {
        self.target
    }

    pub fn rows(&self) -> usize {
        self.grid.rows()
    }

    pub fn cols(&self) -> usize {
        self.grid.cols()
    }
}

impl TryFrom<BoardPayload> for Board {
    type Error = BoardError;

    fn try_from(payload: BoardPayload) -> Result<Self, Self::Error> {
        let grid = Grid::new(payload.rows, payload.cols, payload.grid)?;
        Board::new(grid, payload.robots, payload.target)
    }
}

impl From<Board> for BoardPayload {
    fn from(board: Board) -> Self {
        BoardPayload {
            rows: board.grid.rows(),
            cols: board.grid.cols(),
            grid: board.grid.to_rows(),
            robots: board.robots,
            target: board.target,
        }
    }
}

/// One maximal slide of one robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub robot: usize,
    #[serde(rename = "dir")]
    pub direction: Direction,
    #[serde(rename = "to")]
    pub destination: Cell,
}

/// An ordered move sequence ending with some robot on the target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Solution {
    moves: Vec<Move>,
}

impl Solution {
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn into_moves(self) -> Vec<Move> {
        self.moves
    }
}

impl From<Vec<Move>> for Solution {
    fn from(moves: Vec<Move>) -> Self {
        Solution { moves }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_grid_is_enclosed() {
        let grid = Grid::open(3, 4).unwrap();
        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.cols(), 4);
        assert_eq!(grid.walls(Cell::new(0, 0)), WALL_NORTH | WALL_WEST);
        assert_eq!(grid.walls(Cell::new(3, 2)), WALL_SOUTH | WALL_EAST);
        assert_eq!(grid.walls(Cell::new(1, 1)), 0);
        for y in 0..3 {
            for x in 0..4 {
                assert!(grid.is_enclosed(Cell::new(x, y)));
            }
        }
    }

    #[test]
    fn test_single_cell_grid_has_all_walls() {
        let grid = Grid::open(1, 1).unwrap();
        assert_eq!(grid.walls(Cell::new(0, 0)), WALL_MASK);
    }

    #[test]
    fn test_grid_rejects_bad_shapes() {
        assert_eq!(Grid::open(0, 3), Err(BoardError::Empty));
        assert_eq!(
            Grid::new(2, 2, vec![vec![9, 3]]),
            Err(BoardError::RowCount {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            Grid::new(2, 2, vec![vec![9, 3], vec![12]]),
            Err(BoardError::ColumnCount {
                row: 1,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_grid_rejects_open_border_and_bad_mask() {
        assert_eq!(
            Grid::new(2, 2, vec![vec![9, 3], vec![12, 2]]),
            Err(BoardError::OpenBorder {
                cell: Cell::new(1, 1)
            })
        );
        assert_eq!(
            Grid::new(2, 2, vec![vec![25, 3], vec![12, 6]]),
            Err(BoardError::InvalidMask {
                cell: Cell::new(0, 0),
                mask: 25
            })
        );
    }

    #[test]
    fn test_neighbor_respects_bounds() {
        let grid = Grid::open(3, 3).unwrap();
        assert_eq!(grid.neighbor(Cell::new(0, 0), Direction::Up), None);
        assert_eq!(grid.neighbor(Cell::new(0, 0), Direction::Left), None);
        assert_eq!(
            grid.neighbor(Cell::new(0, 0), Direction::Right),
            Some(Cell::new(1, 0))
        );
        assert_eq!(
            grid.neighbor(Cell::new(0, 0), Direction::Down),
            Some(Cell::new(0, 1))
        );
        assert_eq!(grid.neighbor(Cell::new(2, 2), Direction::Down), None);
    }

    #[test]
    fn test_board_rejects_bad_placement() {
        let grid = Grid::open(3, 3).unwrap();
        assert_eq!(
            Board::new(grid.clone(), vec![], Cell::new(2, 2)),
            Err(BoardError::NoRobots)
        );
        assert_eq!(
            Board::new(grid.clone(), vec![Cell::new(3, 0)], Cell::new(2, 2)),
            Err(BoardError::OutOfBounds {
                cell: Cell::new(3, 0),
                cols: 3,
                rows: 3
            })
        );
        assert_eq!(
            Board::new(
                grid.clone(),
                vec![Cell::new(1, 1), Cell::new(0, 0), Cell::new(1, 1)],
                Cell::new(2, 2)
            ),
            Err(BoardError::SharedCell {
                first: 0,
                second: 2,
                cell: Cell::new(1, 1)
            })
        );
        assert!(Board::new(grid, vec![Cell::new(0, 0)], Cell::new(2, 2)).is_ok());
    }

    #[test]
    fn test_board_json_shape() {
        let grid = Grid::open(2, 3).unwrap();
        let board = Board::new(grid, vec![Cell::new(0, 1), Cell::new(2, 0)], Cell::new(1, 1)).unwrap();
        let value = serde_json::to_value(&board).unwrap();
        assert_eq!(value["rows"], 2);
        assert_eq!(value["cols"], 3);
        assert_eq!(value["grid"], serde_json::json!([[9, 1, 3], [12, 4, 6]]));
        assert_eq!(value["robots"], serde_json::json!([[0, 1], [2, 0]]));
        assert_eq!(value["target"], serde_json::json!([1, 1]));

        let back: Board = serde_json::from_value(value).unwrap();
        assert_eq!(back, board);
    }

    #[test]
    fn test_board_json_is_validated() {
        let json = r#"{"rows":2,"cols":2,"grid":[[9,3],[12,2]],"robots":[[0,0]],"target":[1,1]}"#;
        assert!(serde_json::from_str::<Board>(json).is_err());
    }

    #[test]
    fn test_move_json_shape() {
        let mv = Move {
            robot: 1,
            direction: Direction::Left,
            destination: Cell::new(0, 4),
        };
        let value = serde_json::to_value(mv).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "robot": 1, "dir": "Left", "to": [0, 4] })
        );
        let solution = Solution::from(vec![mv]);
        assert_eq!(
            serde_json::to_value(&solution).unwrap(),
            serde_json::json!([{ "robot": 1, "dir": "Left", "to": [0, 4] }])
        );
    }

    #[test]
    fn test_manhattan() {
        assert_eq!(Cell::new(0, 0).manhattan(Cell::new(2, 1)), 3);
        assert_eq!(Cell::new(5, 2).manhattan(Cell::new(1, 4)), 6);
        assert_eq!(Cell::new(3, 3).manhattan(Cell::new(3, 3)), 0);
    }
}
