//! In-memory tabular data with typed columns.

use crate::algorithms::Matrix;
use crate::data::schema::{ColumnType, infer_column_type, parse_number};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Cell values of one column. `None` marks a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> ColumnType {
        match self {
            Self::Numeric(_) => ColumnType::Numeric,
            Self::Text(_) => ColumnType::Text,
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        match self {
            Self::Numeric(v) => Self::Numeric(indices.iter().map(|&i| v[i]).collect()),
            Self::Text(v) => Self::Text(indices.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Render a cell for delimited output; missing cells render empty.
    pub fn render(&self, row: usize) -> String {
        match self {
            Self::Numeric(v) => v[row]
                .filter(|x| x.is_finite())
                .map(|x| x.to_string())
                .unwrap_or_default(),
            Self::Text(v) => v[row].clone().unwrap_or_default(),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }

    /// Build a column from raw cells, typing it numeric when every present
    /// cell parses as a number.
    pub fn from_cells(name: impl Into<String>, cells: Vec<Option<String>>) -> Self {
        let name = name.into();
        match infer_column_type(&cells) {
            ColumnType::Numeric => {
                let values = cells
                    .iter()
                    .map(|c| c.as_deref().and_then(parse_number))
                    .collect();
                Self::numeric(name, values)
            }
            ColumnType::Text => Self::text(name, cells),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.data, ColumnData::Numeric(_))
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Text(_) => None,
        }
    }

    /// Present values only, in row order.
    pub fn present_numeric(&self) -> Option<Vec<f64>> {
        self.as_numeric()
            .map(|v| v.iter().flatten().copied().filter(|x| x.is_finite()).collect())
    }

    pub fn null_count(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Text(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }
}

/// Column-oriented table. All columns have the same length and unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        for (i, col) in columns.iter().enumerate() {
            if col.len() != n_rows {
                return Err(PipelineError::invalid_input(format!(
                    "column '{}' has {} rows, expected {n_rows}",
                    col.name,
                    col.len()
                )));
            }
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(PipelineError::invalid_input(format!(
                    "duplicate column '{}'",
                    col.name
                )));
            }
        }
        Ok(Self { columns, n_rows })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from row-major raw cells, inferring each column's type.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Result<Self> {
        let width = names.len();
        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows.len()); width];
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(PipelineError::invalid_input(format!(
                    "row {row_idx} has {} fields, expected {width}",
                    row.len()
                )));
            }
            for (col_idx, cell) in row.into_iter().enumerate() {
                cells[col_idx].push(cell);
            }
        }
        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, col)| Column::from_cells(name, col))
            .collect();
        Self::new(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Remove and return a column.
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        let col = self.columns.remove(idx);
        if self.columns.is_empty() {
            self.n_rows = 0;
        }
        Some(col)
    }

    /// New table with the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name).cloned().ok_or_else(|| {
                    PipelineError::invalid_input(format!("no column named '{name}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(columns)
    }

    /// New table holding the given rows, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_rows) {
            return Err(PipelineError::invalid_input(format!(
                "row index {bad} out of range for {} rows",
                self.n_rows
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                data: c.data.take(indices),
            })
            .collect();
        Ok(Self {
            columns,
            n_rows: indices.len(),
        })
    }

    /// Dense feature matrix; missing cells become NaN.
    pub fn to_matrix(&self) -> Result<Matrix> {
        let mut data = vec![f64::NAN; self.n_rows * self.columns.len()];
        let width = self.columns.len();
        for (j, col) in self.columns.iter().enumerate() {
            let values = col.as_numeric().ok_or_else(|| {
                PipelineError::transformation(format!("column '{}' is not numeric", col.name))
            })?;
            for (i, v) in values.iter().enumerate() {
                if let Some(x) = v {
                    data[i * width + j] = *x;
                }
            }
        }
        Matrix::from_vec(self.n_rows, width, data)
    }
}
