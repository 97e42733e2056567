//! Dense row-major `f64` matrix.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        let m = Self { rows, cols, data };
        m.check_shape()?;
        Ok(m)
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let n = rows.len();
        let mut data = Vec::with_capacity(n * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(PipelineError::invalid_input(format!(
                    "row {i} has {} values, expected {cols}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Self::from_vec(n, cols, data)
    }

    /// Verify the buffer length matches the declared shape.
    pub fn check_shape(&self) -> Result<()> {
        if self.data.len() != self.rows * self.cols {
            return Err(PipelineError::invalid_input(format!(
                "matrix buffer holds {} values, shape is {}x{}",
                self.data.len(),
                self.rows,
                self.cols
            )));
        }
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |r| self.row(r))
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    pub fn select_columns(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(self.rows * indices.len());
        for r in 0..self.rows {
            let row = self.row(r);
            data.extend(indices.iter().map(|&c| row[c]));
        }
        Self {
            rows: self.rows,
            cols: indices.len(),
            data,
        }
    }

    /// Append `column` as a new last column.
    pub fn with_column(&self, column: &[f64]) -> Result<Self> {
        if column.len() != self.rows {
            return Err(PipelineError::invalid_input(format!(
                "cannot append a column of {} values to {} rows",
                column.len(),
                self.rows
            )));
        }
        let cols = self.cols + 1;
        let mut data = Vec::with_capacity(self.rows * cols);
        for (r, value) in column.iter().enumerate() {
            data.extend_from_slice(self.row(r));
            data.push(*value);
        }
        Ok(Self {
            rows: self.rows,
            cols,
            data,
        })
    }

    /// Split off the last column: `(features, target)`.
    pub fn split_last_column(&self) -> Result<(Self, Vec<f64>)> {
        if self.cols == 0 {
            return Err(PipelineError::invalid_input(
                "cannot split the target column off an empty matrix",
            ));
        }
        let keep: Vec<usize> = (0..self.cols - 1).collect();
        Ok((self.select_columns(&keep), self.column(self.cols - 1)))
    }

    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|x| x.is_nan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_rejects_ragged() {
        assert!(Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn test_with_column_then_split() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let joined = m.with_column(&[0.0, 1.0]).unwrap();
        assert_eq!(joined.ncols(), 3);
        assert_eq!(joined.row(1), &[3.0, 4.0, 1.0]);
        let (x, y) = joined.split_last_column().unwrap();
        assert_eq!(x, m);
        assert_eq!(y, vec![0.0, 1.0]);
    }

    #[test]
    fn test_select_rows() {
        let m = Matrix::from_rows(vec![vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        assert_eq!(m.select_rows(&[2, 0]).column(0), vec![3.0, 1.0]);
    }
}
