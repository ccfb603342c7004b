//! Time-series panel: named numeric columns indexed by time
//!
//! Missing observations are stored as `NaN`. Differencing introduces
//! leading `NaN`s which [`TimeSeriesPanel::drop_missing`] trims.

use nalgebra::DMatrix;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::error::{CausalError, Result};

/// Table of observations, one column per variable
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPanel {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl TimeSeriesPanel {
    /// Build a panel, checking names are unique and columns have equal length
    pub fn new(names: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(CausalError::ShapeMismatch(format!(
                "{} names for {} columns",
                names.len(),
                columns.len()
            )));
        }

        let mut seen = HashSet::new();
        for name in &names {
            if name.is_empty() {
                return Err(CausalError::InvalidParameter(
                    "variable names must be non-empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(CausalError::InvalidParameter(format!(
                    "duplicate variable name '{}'",
                    name
                )));
            }
        }

        if let Some(first) = columns.first() {
            let len = first.len();
            if let Some((idx, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != len) {
                return Err(CausalError::ShapeMismatch(format!(
                    "column '{}' has {} rows, expected {}",
                    names[idx],
                    col.len(),
                    len
                )));
            }
        }

        Ok(Self { names, columns })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_vars(&self) -> usize {
        self.names.len()
    }

    /// Number of time steps
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn column(&self, idx: usize) -> &[f64] {
        &self.columns[idx]
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn column_by_name(&self, name: &str) -> Result<&[f64]> {
        let idx = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| CausalError::UnknownVariable(name.to_string()))?;
        Ok(&self.columns[idx])
    }

    /// Replace one column; length must match the panel
    pub fn replace_column(&mut self, idx: usize, values: Vec<f64>) -> Result<()> {
        if values.len() != self.n_rows() {
            return Err(CausalError::ShapeMismatch(format!(
                "replacement for '{}' has {} rows, expected {}",
                self.names[idx],
                values.len(),
                self.n_rows()
            )));
        }
        self.columns[idx] = values;
        Ok(())
    }

    /// Observations at time `t`, one per variable
    pub fn row(&self, t: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[t]).collect()
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.n_rows());
        Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c[..n].to_vec()).collect(),
        }
    }

    pub fn has_missing(&self) -> bool {
        self.columns.iter().any(|c| c.iter().any(|v| v.is_nan()))
    }

    /// Drop every row holding a `NaN` in any column
    pub fn drop_missing(&self) -> Self {
        let keep: Vec<usize> = (0..self.n_rows())
            .filter(|&t| self.columns.iter().all(|c| !c[t].is_nan()))
            .collect();

        Self {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| keep.iter().map(|&t| c[t]).collect())
                .collect(),
        }
    }

    /// Observations as a (time x variable) matrix
    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.n_rows(), self.n_vars(), |t, j| self.columns[j][t])
    }

    /// Load from a CSV file with a header row of variable names
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parse CSV text.
    ///
    /// A leading column with an empty header is treated as an index and
    /// skipped. Empty cells and `nan` parse as missing.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let skip = usize::from(headers.first().map(|h| h.is_empty()).unwrap_or(false));
        let names: Vec<String> = headers[skip..].to_vec();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

        for (row_idx, record) in rdr.records().enumerate() {
            let record = record?;
            for (col_idx, column) in columns.iter_mut().enumerate() {
                let cell = record.get(col_idx + skip).unwrap_or("");
                column.push(parse_cell(cell).ok_or_else(|| {
                    CausalError::Parse(format!(
                        "row {}, column '{}': '{}' is not a number",
                        row_idx + 1,
                        names[col_idx],
                        cell
                    ))
                })?);
            }
        }

        Self::new(names, columns)
    }

    /// Write with a header of variable names; `NaN` becomes an empty cell
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.names)?;
        for t in 0..self.n_rows() {
            let row: Vec<String> = self
                .columns
                .iter()
                .map(|c| if c[t].is_nan() { String::new() } else { c[t].to_string() })
                .collect();
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    cell.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TimeSeriesPanel {
        TimeSeriesPanel::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![f64::NAN, 1.0, 2.0, 3.0], vec![1.0, f64::NAN, 5.0, 6.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_ragged_columns() {
        let err = TimeSeriesPanel::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 2.0], vec![1.0]],
        );
        assert!(matches!(err, Err(CausalError::ShapeMismatch(_))));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let err = TimeSeriesPanel::new(
            vec!["a".to_string(), "a".to_string()],
            vec![vec![1.0], vec![1.0]],
        );
        assert!(matches!(err, Err(CausalError::InvalidParameter(_))));
    }

    #[test]
    fn test_drop_missing() {
        let panel = sample();
        assert!(panel.has_missing());
        let clean = panel.drop_missing();
        assert!(!clean.has_missing());
        assert_eq!(clean.n_rows(), 2);
        assert_eq!(clean.column(0), &[2.0, 3.0]);
        assert_eq!(clean.column(1), &[5.0, 6.0]);
    }

    #[test]
    fn test_head_and_matrix() {
        let panel = sample().drop_missing();
        assert_eq!(panel.head(1).n_rows(), 1);
        assert_eq!(panel.head(10).n_rows(), 2);
        let m = panel.to_matrix();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m[(1, 1)], 6.0);
        assert_eq!(panel.row(0), vec![2.0, 5.0]);
    }

    #[test]
    fn test_from_reader_skips_index_column() {
        let text = ",x,y\n0,1.5,2\n1,nan,3\n2,,4\n";
        let panel = TimeSeriesPanel::from_reader(text.as_bytes()).unwrap();
        assert_eq!(panel.names(), &["x".to_string(), "y".to_string()]);
        assert_eq!(panel.n_rows(), 3);
        assert_eq!(panel.column(0)[0], 1.5);
        assert!(panel.column(0)[1].is_nan());
        assert!(panel.column(0)[2].is_nan());
        assert_eq!(panel.column_by_name("y").unwrap(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_from_reader_reports_bad_cell() {
        let text = "x,y\n1,abc\n";
        let err = TimeSeriesPanel::from_reader(text.as_bytes());
        assert!(matches!(err, Err(CausalError::Parse(_))));
    }

    #[test]
    fn test_csv_round_trip_keeps_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.csv");
        let panel = sample();
        panel.write_csv(&path).unwrap();
        let back = TimeSeriesPanel::from_csv(&path).unwrap();
        assert_eq!(back.names(), panel.names());
        assert!(back.column(0)[0].is_nan());
        assert_eq!(back.column(1)[3], 6.0);
    }
}
