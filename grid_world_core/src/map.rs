use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::Position;

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Provides methods for accessing elements via [`Position`] coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Builds a grid from rows of equal length.
    ///
    /// Returns `None` if the rows are not all the same length. An empty
    /// input produces a 0 x 0 grid.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return None;
        }
        let row_count = rows.len();
        Some(Grid {
            rows: row_count,
            cols,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    /// Returns the number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        position.row < self.rows && position.col < self.cols
    }

    /// Gets a reference to the cell at `position`.
    ///
    /// Returns `None` if the position is out of bounds.
    pub fn get(&self, position: Position) -> Option<&T> {
        if self.contains(position) {
            self.cells.get(position.row * self.cols + position.col)
        } else {
            None
        }
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell in
    /// row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Position::new(index / cols, index % cols), cell))
    }
}

/// Indexing using Position coordinates for access
impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Position) -> &Self::Output {
        match self.get(index) {
            Some(cell) => cell,
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                index.row, index.col, self.rows, self.cols
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(Grid::from_rows(vec![vec![1, 2], vec![3]]).is_none());
    }

    #[test]
    fn enumerate_is_row_major() {
        let grid = Grid::from_rows(vec![vec!['a', 'b'], vec!['c', 'd']]).unwrap();
        let cells: Vec<_> = grid.enumerate().map(|(pos, c)| (pos.row, pos.col, *c)).collect();
        assert_eq!(
            cells,
            vec![(0, 0, 'a'), (0, 1, 'b'), (1, 0, 'c'), (1, 1, 'd')]
        );
        assert_eq!(grid[Position::new(1, 0)], 'c');
        assert_eq!(grid.get(Position::new(2, 0)), None);
    }
}
