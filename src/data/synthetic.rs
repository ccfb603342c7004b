//! Synthetic VAR(1) data with a known causal chain
//!
//! `x_k(t) = 0.5 x_k(t-1) + 0.6 x_{k-1}(t-1) + e_k(t)`, so the ground truth
//! is `x0 -> x1 -> ... -> x{n-1}`. Every eigenvalue of the coefficient
//! matrix is 0.5, so the process is stable.

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::data::panel::TimeSeriesPanel;
use crate::error::{CausalError, Result};

/// Own-lag coefficient on the diagonal
pub const SELF_COEFFICIENT: f64 = 0.5;

/// Coefficient of x_{k-1}(t-1) on x_k(t)
pub const CHAIN_COEFFICIENT: f64 = 0.6;

/// Variable name for column `i`
pub fn variable_name(i: usize) -> String {
    format!("x{}", i)
}

/// Coefficient matrix `A` with `x(t) = A x(t-1) + e(t)`
pub fn chain_coefficients(n_series: usize) -> DMatrix<f64> {
    let mut a = DMatrix::identity(n_series, n_series) * SELF_COEFFICIENT;
    for i in 0..n_series.saturating_sub(1) {
        a[(i + 1, i)] = CHAIN_COEFFICIENT;
    }
    a
}

/// Generate a stable VAR(1) panel with columns `x0..x{n-1}`.
///
/// The first row is all zeros and noise is i.i.d. standard normal.
/// The same seed always yields the same panel.
pub fn make_synthetic_var(n_series: usize, n_samples: usize, seed: u64) -> Result<TimeSeriesPanel> {
    if n_series == 0 || n_samples == 0 {
        return Err(CausalError::InvalidParameter(format!(
            "need at least one series and one sample, got {}x{}",
            n_samples, n_series
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let a = chain_coefficients(n_series);

    // Noise is drawn row by row for every step, including t = 0
    let noise: Vec<Vec<f64>> = (0..n_samples)
        .map(|_| (0..n_series).map(|_| StandardNormal.sample(&mut rng)).collect())
        .collect();

    let mut columns = vec![vec![0.0; n_samples]; n_series];
    for t in 1..n_samples {
        for k in 0..n_series {
            let mut value = noise[t][k];
            for m in 0..n_series {
                value += a[(k, m)] * columns[m][t - 1];
            }
            columns[k][t] = value;
        }
    }

    TimeSeriesPanel::new((0..n_series).map(variable_name).collect(), columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_and_names() {
        let panel = make_synthetic_var(3, 50, 0).unwrap();
        assert_eq!(panel.n_vars(), 3);
        assert_eq!(panel.n_rows(), 50);
        assert_eq!(panel.names(), &["x0", "x1", "x2"]);
        assert_eq!(panel.row(0), vec![0.0, 0.0, 0.0]);
        assert!(!panel.has_missing());
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = make_synthetic_var(4, 100, 42).unwrap();
        let b = make_synthetic_var(4, 100, 42).unwrap();
        let c = make_synthetic_var(4, 100, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_chain_coefficients() {
        let a = chain_coefficients(3);
        assert_eq!(a[(0, 0)], SELF_COEFFICIENT);
        assert_eq!(a[(1, 0)], CHAIN_COEFFICIENT);
        assert_eq!(a[(2, 1)], CHAIN_COEFFICIENT);
        assert_eq!(a[(0, 1)], 0.0);
        assert_eq!(a[(2, 0)], 0.0);
    }

    #[test]
    fn test_stable_process_stays_bounded() {
        let panel = make_synthetic_var(5, 2000, 7).unwrap();
        let max_abs = panel
            .columns()
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        assert!(max_abs < 50.0);
    }

    #[test]
    fn test_rejects_empty_request() {
        assert!(make_synthetic_var(0, 10, 0).is_err());
        assert!(make_synthetic_var(2, 0, 0).is_err());
    }
}
