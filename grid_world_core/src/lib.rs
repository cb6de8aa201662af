use serde::{Deserialize, Serialize};

pub mod action;
pub mod agent;
pub mod config;
pub mod curriculum;
pub mod enemy;
pub mod environment;
pub mod layout;
pub mod map;
pub mod outcome;
pub mod pathfinding;
pub mod resolver;

/// Represents a grid coordinate as (row, col).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    /// Returns the neighbouring position one cell along `direction`,
    /// or `None` when it would leave a `rows` x `cols` grid.
    pub fn step(self, direction: Direction, rows: usize, cols: usize) -> Option<Position> {
        let (dr, dc) = direction.delta();
        let row = self.row.checked_add_signed(dr)?;
        let col = self.col.checked_add_signed(dc)?;
        (row < rows && col < cols).then_some(Position { row, col })
    }

    /// Returns manhattan distance between two positions
    pub fn manhattan(self, other: Position) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}

/// One of the four orthogonal directions.
///
/// `Direction::ALL` is the fixed scan order used everywhere ties have to be
/// broken deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// (row, col) offset of a single step.
    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }
}
