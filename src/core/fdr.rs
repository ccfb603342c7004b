//! Benjamini-Hochberg false discovery rate control

use tracing::debug;

use super::matrix::{AdjacencyMatrix, PValueMatrix};

/// Largest p-value passing the BH step-up test, if any.
///
/// `NaN` entries are ignored. With `m` valid p-values sorted ascending,
/// rank `k` (1-based) passes when `p_(k) <= alpha * k / m`.
pub fn bh_cutoff(p_values: &[f64], alpha: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = p_values.iter().copied().filter(|p| !p.is_nan()).collect();
    let m = sorted.len();
    if m == 0 {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    sorted
        .iter()
        .enumerate()
        .filter(|&(k, &p)| p <= alpha * (k + 1) as f64 / m as f64)
        .map(|(_, &p)| p)
        .last()
}

/// Boolean adjacency after BH correction.
///
/// Every entry at or below the cutoff is significant. When nothing
/// passes, the result has no edges, which is the expected outcome
/// under conservative correction.
pub fn benjamini_hochberg(p_values: &PValueMatrix, alpha: f64) -> AdjacencyMatrix {
    let cutoff = bh_cutoff(&p_values.valid_values(), alpha);
    debug!("[FDR] alpha={} cutoff={:?}", alpha, cutoff);

    match cutoff {
        Some(c) => p_values.map(|p| !p.is_nan() && p <= c),
        None => p_values.map(|_| false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worked_example() -> PValueMatrix {
        let labels: Vec<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        let rows = [
            [f64::NAN, 0.001, 0.2],
            [0.04, f64::NAN, 0.6],
            [0.02, 0.03, f64::NAN],
        ];
        PValueMatrix::from_fn(labels, |i, j| rows[i][j])
    }

    #[test]
    fn test_bh_worked_example() {
        let adj = benjamini_hochberg(&worked_example(), 0.05);

        // Only the smallest p-value survives
        assert!(adj.at("x", "y").unwrap());
        assert!(!adj.at("z", "x").unwrap());
        assert!(!adj.at("z", "y").unwrap());
        assert!(!adj.at("y", "x").unwrap());
        assert!(!adj.at("x", "z").unwrap());
        assert_eq!(adj.edge_count(), 1);
    }

    #[test]
    fn test_bh_diagonal_stays_false() {
        let adj = benjamini_hochberg(&worked_example(), 0.5);
        for i in 0..3 {
            assert!(!adj.get(i, i));
        }
    }

    #[test]
    fn test_bh_cutoff_step_up() {
        // Rank 2 misses its threshold but rank 3 passes, so rank 3 sets the cutoff
        let cutoff = bh_cutoff(&[0.01, 0.026, 0.03, 0.9], 0.05).unwrap();
        assert_eq!(cutoff, 0.03);
    }

    #[test]
    fn test_bh_no_survivors() {
        assert_eq!(bh_cutoff(&[0.2, 0.3, 0.9], 0.05), None);
        assert_eq!(bh_cutoff(&[f64::NAN, f64::NAN], 0.05), None);
        assert_eq!(bh_cutoff(&[], 0.05), None);
    }

    #[test]
    fn test_bh_all_nan_matrix_has_no_edges() {
        let labels = vec!["a".to_string(), "b".to_string()];
        let pvals = PValueMatrix::filled(labels, f64::NAN);
        assert_eq!(benjamini_hochberg(&pvals, 0.05).edge_count(), 0);
    }
}
