// THEORY:
// The `PressureMatrix` is the most fundamental unit of the sensing system. It is a
// "dumb" data container for one snapshot of the mat: a fixed 48x48 grid of raw
// 16-bit sensor readings, plus a few single-frame summaries.
//
// Key architectural principles:
// 1.  **Dense storage, sparse iteration**: The full grid lives in a fixed-size array
//     so that decoding is a direct index write. Everything downstream only cares
//     about the handful of cells that are actually pressed, so `active_points`
//     extracts them once into a small ordered list.
// 2.  **Value semantics**: A matrix is produced once per decode and passed by value
//     through the pipeline. No stage mutates a matrix it did not create.
// 3.  **No history**: A matrix knows nothing about previous frames.

use crate::error::{MatError, Result};
use std::fmt;

/// Number of sensor rows on the mat.
pub const ROWS: usize = 48;
/// Number of sensor columns on the mat.
pub const COLS: usize = 48;

/// A cell position on the mat. Rows run front to back, columns left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    pub row: usize,
    pub column: usize,
}

impl Coord {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    pub fn is_on_mat(&self) -> bool {
        self.row < ROWS && self.column < COLS
    }
}

/// A single pressed cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivePoint {
    pub coord: Coord,
    /// Raw sensor reading, always > 0.
    pub pressure: u16,
}

/// One full snapshot of the mat.
#[derive(Clone, PartialEq, Eq)]
pub struct PressureMatrix {
    cells: Box<[[u16; COLS]; ROWS]>,
}

impl Default for PressureMatrix {
    fn default() -> Self {
        Self {
            cells: Box::new([[0; COLS]; ROWS]),
        }
    }
}

impl PressureMatrix {
    /// An all-zero matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a matrix from `(row, column, value)` triples. Later triples overwrite
    /// earlier ones at the same cell.
    pub fn from_points(points: &[(usize, usize, u16)]) -> Result<Self> {
        let mut matrix = Self::new();
        for &(row, column, value) in points {
            matrix.set(row, column, value)?;
        }
        Ok(matrix)
    }

    pub fn get(&self, row: usize, column: usize) -> Option<u16> {
        self.cells.get(row).and_then(|r| r.get(column)).copied()
    }

    pub fn set(&mut self, row: usize, column: usize, value: u16) -> Result<()> {
        if !Coord::new(row, column).is_on_mat() {
            return Err(MatError::CoordinateOutOfRange { row, column });
        }
        self.cells[row][column] = value;
        Ok(())
    }

    /// Every non-zero cell, in row-major order.
    pub fn active_points(&self) -> Vec<ActivePoint> {
        let mut points = Vec::new();
        for (row, cells) in self.cells.iter().enumerate() {
            for (column, &pressure) in cells.iter().enumerate() {
                if pressure > 0 {
                    points.push(ActivePoint {
                        coord: Coord::new(row, column),
                        pressure,
                    });
                }
            }
        }
        points
    }

    pub fn active_count(&self) -> usize {
        self.cells.iter().flatten().filter(|&&v| v > 0).count()
    }

    pub fn total_pressure(&self) -> u64 {
        self.cells.iter().flatten().map(|&v| v as u64).sum()
    }

    pub fn max_pressure(&self) -> u16 {
        self.cells.iter().flatten().copied().max().unwrap_or(0)
    }

    /// A plain nested-vector copy for collaborators that want their own array.
    pub fn to_rows(&self) -> Vec<Vec<u16>> {
        self.cells.iter().map(|row| row.to_vec()).collect()
    }
}

impl fmt::Debug for PressureMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PressureMatrix")
            .field("active_points", &self.active_count())
            .field("total_pressure", &self.total_pressure())
            .finish()
    }
}

/// Renders one hex digit (the low nibble of the reading) per cell, one line per row.
impl fmt::Display for PressureMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.iter() {
            for &value in row.iter() {
                write!(f, "{:x}", value & 0xF)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_matrix_is_all_zero() {
        let matrix = PressureMatrix::new();
        assert_eq!(matrix.active_count(), 0);
        assert_eq!(matrix.total_pressure(), 0);
        assert!(matrix.active_points().is_empty());
    }

    #[test]
    fn set_rejects_cells_off_the_mat() {
        let mut matrix = PressureMatrix::new();
        assert!(matches!(
            matrix.set(ROWS, 0, 1),
            Err(MatError::CoordinateOutOfRange { row: 48, column: 0 })
        ));
        assert!(matrix.set(0, COLS, 1).is_err());
        assert!(matrix.set(ROWS - 1, COLS - 1, 7).is_ok());
        assert_eq!(matrix.get(ROWS - 1, COLS - 1), Some(7));
        assert_eq!(matrix.get(ROWS, 0), None);
    }

    #[test]
    fn active_points_are_row_major() {
        let matrix = PressureMatrix::from_points(&[(5, 1, 3), (1, 9, 2), (1, 0, 4)]).unwrap();
        let coords: Vec<Coord> = matrix.active_points().iter().map(|p| p.coord).collect();
        assert_eq!(coords, vec![Coord::new(1, 0), Coord::new(1, 9), Coord::new(5, 1)]);
        assert_eq!(matrix.total_pressure(), 9);
        assert_eq!(matrix.max_pressure(), 4);
    }

    #[test]
    fn display_prints_low_nibbles() {
        let matrix = PressureMatrix::from_points(&[(0, 0, 0x1A), (0, 2, 0xF3)]).unwrap();
        let text = matrix.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), ROWS);
        assert!(lines[0].starts_with("a03"));
        assert_eq!(lines[0].len(), COLS);
        assert!(lines[1].chars().all(|c| c == '0'));
    }

    #[test]
    fn to_rows_copies_every_cell() {
        let matrix = PressureMatrix::from_points(&[(2, 3, 40)]).unwrap();
        let rows = matrix.to_rows();
        assert_eq!(rows.len(), ROWS);
        assert!(rows.iter().all(|r| r.len() == COLS));
        assert_eq!(rows[2][3], 40);
    }
}
