//! Labeled square matrices keyed by (cause, effect) variable names
//!
//! Rows are causes, columns are effects. The same container carries
//! p-values, boolean adjacency and selected lags.

use nalgebra::{DMatrix, Scalar};
use std::fmt;
use std::path::Path;

use crate::error::{CausalError, Result};

/// Square matrix whose rows and columns share one set of variable names.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledMatrix<T: Scalar> {
    labels: Vec<String>,
    values: DMatrix<T>,
}

/// P-values per (cause, effect); diagonal is NaN.
pub type PValueMatrix = LabeledMatrix<f64>;

/// Directed edges per (cause, effect); diagonal is false.
pub type AdjacencyMatrix = LabeledMatrix<bool>;

/// Selected lag per (cause, effect); 0 means no lag was selected.
pub type LagMatrix = LabeledMatrix<usize>;

impl<T: Scalar> LabeledMatrix<T> {
    /// Create a matrix with every cell set to `value`
    pub fn filled(labels: Vec<String>, value: T) -> Self {
        let n = labels.len();
        Self {
            labels,
            values: DMatrix::from_element(n, n, value),
        }
    }

    /// Create a matrix from a cell generator `(cause, effect) -> value`
    pub fn from_fn<F>(labels: Vec<String>, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let n = labels.len();
        Self {
            labels,
            values: DMatrix::from_fn(n, n, |i, j| f(i, j)),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of variables (rows == columns)
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    pub fn values(&self) -> &DMatrix<T> {
        &self.values
    }

    /// Position of a variable name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.labels
            .iter()
            .position(|l| l == name)
            .ok_or_else(|| CausalError::UnknownVariable(name.to_string()))
    }

    /// Cell by index
    pub fn get(&self, cause: usize, effect: usize) -> T {
        self.values[(cause, effect)].clone()
    }

    pub fn set(&mut self, cause: usize, effect: usize, value: T) {
        self.values[(cause, effect)] = value;
    }

    /// Cell by variable names
    pub fn at(&self, cause: &str, effect: &str) -> Result<T> {
        let i = self.index_of(cause)?;
        let j = self.index_of(effect)?;
        Ok(self.get(i, j))
    }

    /// Set a cell by variable names
    pub fn set_at(&mut self, cause: &str, effect: &str, value: T) -> Result<()> {
        let i = self.index_of(cause)?;
        let j = self.index_of(effect)?;
        self.set(i, j, value);
        Ok(())
    }

    /// Apply `f` cell-wise, keeping labels
    pub fn map<U: Scalar, F: FnMut(T) -> U>(&self, f: F) -> LabeledMatrix<U> {
        LabeledMatrix {
            labels: self.labels.clone(),
            values: self.values.map(f),
        }
    }

    /// True if both matrices are keyed by the same names in the same order
    pub fn same_labels<U: Scalar>(&self, other: &LabeledMatrix<U>) -> bool {
        self.labels == other.labels
    }

    /// Off-diagonal cells in row-major order as (cause, effect, value)
    pub fn off_diagonal(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let n = self.len();
        (0..n)
            .flat_map(move |i| (0..n).map(move |j| (i, j)))
            .filter(|(i, j)| i != j)
            .map(move |(i, j)| (i, j, self.get(i, j)))
    }

    /// Write as CSV with variable names on both axes.
    ///
    /// The header's first cell is empty, matching a pandas index column.
    pub fn write_csv_with<P, F>(&self, path: P, format: F) -> Result<()>
    where
        P: AsRef<Path>,
        F: Fn(&T) -> String,
    {
        let mut writer = csv::Writer::from_path(path)?;

        let mut header = vec![String::new()];
        header.extend(self.labels.iter().cloned());
        writer.write_record(&header)?;

        for (i, label) in self.labels.iter().enumerate() {
            let mut row = vec![label.clone()];
            row.extend((0..self.len()).map(|j| format(&self.values[(i, j)])));
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }
}

impl PValueMatrix {
    /// Adjacency from `p < alpha`; NaN cells are never significant
    pub fn threshold(&self, alpha: f64) -> AdjacencyMatrix {
        self.map(|p| !p.is_nan() && p < alpha)
    }

    /// Non-NaN p-values in row-major order
    pub fn valid_values(&self) -> Vec<f64> {
        let n = self.len();
        let mut out = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                let p = self.values[(i, j)];
                if !p.is_nan() {
                    out.push(p);
                }
            }
        }
        out
    }

    /// Write p-values; NaN becomes an empty cell
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write_csv_with(path, |p| {
            if p.is_nan() {
                String::new()
            } else {
                format!("{}", p)
            }
        })
    }
}

impl AdjacencyMatrix {
    /// Number of true cells
    pub fn edge_count(&self) -> usize {
        self.values.iter().filter(|&&b| b).count()
    }

    /// Directed edges as (cause, effect) names, row-major
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let n = self.len();
        let mut out = Vec::new();
        for i in 0..n {
            for j in 0..n {
                if self.values[(i, j)] {
                    out.push((self.labels[i].as_str(), self.labels[j].as_str()));
                }
            }
        }
        out
    }

    /// 0/1 view, as written to CSV and shown on the dashboard
    pub fn to_indicator(&self) -> LabeledMatrix<u8> {
        self.map(u8::from)
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write_csv_with(path, |&b| if b { "1".to_string() } else { "0".to_string() })
    }
}

impl LagMatrix {
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write_csv_with(path, |lag| lag.to_string())
    }
}

impl fmt::Display for AdjacencyMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.labels.iter().map(|l| l.len()).max().unwrap_or(1).max(1);
        write!(f, "{:width$}", "", width = width)?;
        for label in &self.labels {
            write!(f, " {:>width$}", label, width = width)?;
        }
        writeln!(f)?;
        for (i, label) in self.labels.iter().enumerate() {
            write!(f, "{:<width$}", label, width = width)?;
            for j in 0..self.len() {
                write!(f, " {:>width$}", u8::from(self.values[(i, j)]), width = width)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("x{}", i)).collect()
    }

    #[test]
    fn test_filled_and_lookup() {
        let mut m = PValueMatrix::filled(names(3), 1.0);
        m.set_at("x0", "x2", 0.01).unwrap();
        assert_eq!(m.shape(), (3, 3));
        assert_eq!(m.at("x0", "x2").unwrap(), 0.01);
        assert_eq!(m.get(0, 2), 0.01);
        assert!(matches!(m.at("nope", "x0"), Err(CausalError::UnknownVariable(_))));
    }

    #[test]
    fn test_threshold_ignores_nan() {
        let m = PValueMatrix::from_fn(names(2), |i, j| if i == j { f64::NAN } else { 0.01 });
        let adj = m.threshold(0.05);
        assert!(!adj.get(0, 0));
        assert!(adj.get(0, 1));
        assert!(adj.get(1, 0));
        assert_eq!(adj.edge_count(), 2);
        assert_eq!(m.valid_values().len(), 2);
    }

    #[test]
    fn test_edges_and_display() {
        let adj = AdjacencyMatrix::from_fn(names(3), |i, j| j == i + 1);
        assert_eq!(adj.edges(), vec![("x0", "x1"), ("x1", "x2")]);
        let text = adj.to_string();
        assert!(text.contains("x0  0  1  0"));
    }

    #[test]
    fn test_off_diagonal_skips_diagonal() {
        let m = LagMatrix::filled(names(3), 2);
        assert_eq!(m.off_diagonal().count(), 6);
        assert!(m.off_diagonal().all(|(i, j, _)| i != j));
    }

    #[test]
    fn test_write_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        let m = PValueMatrix::from_fn(names(2), |i, j| if i == j { f64::NAN } else { 0.5 });
        m.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ",x0,x1");
        assert_eq!(lines[1], "x0,,0.5");
        assert_eq!(lines[2], "x1,0.5,");
    }
}
