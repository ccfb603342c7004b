//! PCMCI causal discovery with partial-correlation tests
//!
//! Two stages per target variable:
//! - PC1: prune lagged candidates `(i, tau)`, `tau >= 1`, with conditional
//!   independence tests of growing condition size
//! - MCI: test every `(i, tau)` against the target, conditioning on the
//!   target's parents and the cause's parents shifted by `tau`
//!
//! All tests share the samples `t in 2*tau_max..T` so that every
//! shifted parent is defined.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::HashMap;
use tracing::{debug, info};

use super::matrix::{LagMatrix, PValueMatrix};
use super::method::Discovery;
use super::regression::residualize;
use crate::data::panel::TimeSeriesPanel;
use crate::error::{CausalError, Result};

/// A lagged variable: `var` observed `lag` steps in the past
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    pub var: usize,
    pub lag: usize,
}

impl Link {
    pub fn new(var: usize, lag: usize) -> Self {
        Self { var, lag }
    }
}

/// Result of one conditional independence test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CiResult {
    /// Partial correlation
    pub value: f64,
    pub p_value: f64,
}

impl CiResult {
    /// Outcome reported when the test is undefined
    pub fn independent() -> Self {
        Self {
            value: 0.0,
            p_value: 1.0,
        }
    }
}

// ==================== ParCorr ====================

/// Zero mean, unit variance; `None` for a constant series
fn standardize(values: &[f64]) -> Option<DVector<f64>> {
    let n = values.len() as f64;
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let mean_sq = values.iter().map(|v| v * v).sum::<f64>() / n;
    if !var.is_finite() || var <= f64::EPSILON * mean_sq {
        return None;
    }
    let std = var.sqrt();
    Some(DVector::from_iterator(
        values.len(),
        values.iter().map(|v| (v - mean) / std),
    ))
}

fn pearson(x: &DVector<f64>, y: &DVector<f64>) -> f64 {
    let n = x.len() as f64;
    let mx = x.sum() / n;
    let my = y.sum() / n;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    if vx <= 0.0 || vy <= 0.0 {
        return 0.0;
    }
    cov / (vx.sqrt() * vy.sqrt())
}

/// Partial correlation of `x` and `y` given the columns in `z`.
///
/// The p-value is two-sided Student-t with `n - 2 - |z|` degrees of
/// freedom. Zero variance in any input yields [`CiResult::independent`].
pub fn par_corr(x: &[f64], y: &[f64], z: &[Vec<f64>]) -> Result<CiResult> {
    let n = x.len();
    if y.len() != n || z.iter().any(|c| c.len() != n) {
        return Err(CausalError::ShapeMismatch(
            "ParCorr inputs must share one sample length".to_string(),
        ));
    }
    let dim = 2 + z.len();
    if n <= dim {
        return Err(CausalError::InsufficientData {
            required: dim,
            actual: n,
        });
    }

    let (xs, ys) = match (standardize(x), standardize(y)) {
        (Some(xs), Some(ys)) => (xs, ys),
        _ => return Ok(CiResult::independent()),
    };
    let mut z_cols = Vec::with_capacity(z.len());
    for column in z {
        match standardize(column) {
            Some(c) => z_cols.push(c),
            None => return Ok(CiResult::independent()),
        }
    }
    let z_mat = if z_cols.is_empty() {
        DMatrix::zeros(n, 0)
    } else {
        DMatrix::from_columns(&z_cols)
    };

    let x_resid = residualize(&xs, &z_mat)?;
    let y_resid = residualize(&ys, &z_mat)?;
    let value = pearson(&x_resid, &y_resid);

    let dof = (n - dim) as f64;
    let p_value = if value.abs() >= 1.0 {
        0.0
    } else {
        let t = value * (dof / (1.0 - value * value)).sqrt();
        let dist = StudentsT::new(0.0, 1.0, dof)
            .map_err(|e| CausalError::InvalidParameter(e.to_string()))?;
        (2.0 * dist.sf(t.abs())).min(1.0)
    };

    Ok(CiResult { value, p_value })
}

// ==================== PCMCI ====================

/// Per-lag PCMCI output
#[derive(Debug, Clone)]
pub struct PcmciResult {
    /// `p_values[cause][effect][tau]`; NaN at `cause == effect, tau == 0`
    pub p_values: Vec<Vec<Vec<f64>>>,
    /// Partial correlations, same layout
    pub values: Vec<Vec<Vec<f64>>>,
    /// Lagged parents kept by PC1, per target
    pub parents: Vec<Vec<Link>>,
}

impl PcmciResult {
    pub fn p_value(&self, cause: usize, effect: usize, tau: usize) -> f64 {
        self.p_values[cause][effect][tau]
    }

    /// Smallest p-value over lags `>= 1` and the lag reaching it.
    ///
    /// NaN entries are skipped; if nothing is left the result is `(NaN, 0)`.
    pub fn min_lagged_p(&self, cause: usize, effect: usize) -> (f64, usize) {
        let mut best = (f64::NAN, 0);
        for (tau, &p) in self.p_values[cause][effect].iter().enumerate().skip(1) {
            if p.is_nan() {
                continue;
            }
            if best.0.is_nan() || p < best.0 {
                best = (p, tau);
            }
        }
        best
    }
}

/// PCMCI runner over one panel
pub struct Pcmci<'a> {
    panel: &'a TimeSeriesPanel,
    tau_max: usize,
    pc_alpha: f64,
}

impl<'a> Pcmci<'a> {
    pub fn new(panel: &'a TimeSeriesPanel, tau_max: usize, pc_alpha: f64) -> Result<Self> {
        if tau_max == 0 {
            return Err(CausalError::InvalidParameter(
                "tau_max must be at least 1".to_string(),
            ));
        }
        if !(pc_alpha > 0.0 && pc_alpha < 1.0) {
            return Err(CausalError::InvalidParameter(format!(
                "alpha must lie in (0, 1), got {}",
                pc_alpha
            )));
        }
        if panel.has_missing() {
            return Err(CausalError::InvalidParameter(
                "panel contains missing values".to_string(),
            ));
        }
        let required = 2 * tau_max + 2;
        if panel.n_rows() <= required {
            return Err(CausalError::InsufficientData {
                required,
                actual: panel.n_rows(),
            });
        }
        Ok(Self {
            panel,
            tau_max,
            pc_alpha,
        })
    }

    /// Samples of `link` aligned on `t in 2*tau_max..T`
    fn samples(&self, link: Link) -> Vec<f64> {
        let column = self.panel.column(link.var);
        let start = 2 * self.tau_max;
        (start..self.panel.n_rows())
            .map(|t| column[t - link.lag])
            .collect()
    }

    /// ParCorr of `x` and `y` given `z`; failures count as independence
    fn test(&self, x: Link, y: Link, z: &[Link]) -> CiResult {
        let zs: Vec<Vec<f64>> = z.iter().map(|&l| self.samples(l)).collect();
        match par_corr(&self.samples(x), &self.samples(y), &zs) {
            Ok(r) => r,
            Err(e) => {
                debug!("[PCMCI] test {:?} -> {:?} undefined: {}", x, y, e);
                CiResult::independent()
            }
        }
    }

    /// PC1 condition selection for one target
    pub fn pc1(&self, target: usize) -> Vec<Link> {
        let n_vars = self.panel.n_vars();
        let y = Link::new(target, 0);

        let mut parents: Vec<Link> = (0..n_vars)
            .flat_map(|var| (1..=self.tau_max).map(move |lag| Link::new(var, lag)))
            .collect();
        let mut val_min: HashMap<Link, f64> =
            parents.iter().map(|&l| (l, f64::INFINITY)).collect();

        let mut conds_dim = 0;
        while parents.len() > conds_dim {
            let mut removed = Vec::new();
            for &parent in &parents {
                let conditions: Vec<Link> = parents
                    .iter()
                    .copied()
                    .filter(|&l| l != parent)
                    .take(conds_dim)
                    .collect();
                let result = self.test(parent, y, &conditions);

                let strength = val_min.entry(parent).or_insert(f64::INFINITY);
                *strength = strength.min(result.value.abs());
                if result.p_value > self.pc_alpha {
                    removed.push(parent);
                }
            }

            // Strongest first, so the next round conditions on them
            parents.retain(|l| !removed.contains(l));
            parents.sort_by(|a, b| {
                let sa = val_min.get(a).copied().unwrap_or(0.0);
                let sb = val_min.get(b).copied().unwrap_or(0.0);
                sb.total_cmp(&sa)
            });

            debug!(
                "[PCMCI] target {} conds_dim {}: {} parents left",
                self.panel.names()[target],
                conds_dim,
                parents.len()
            );
            conds_dim += 1;
        }

        parents
    }

    /// MCI stage given the PC1 parents of every variable
    pub fn mci(&self, parents: &[Vec<Link>]) -> PcmciResult {
        let n_vars = self.panel.n_vars();
        let lags = self.tau_max + 1;
        let mut p_values = vec![vec![vec![f64::NAN; lags]; n_vars]; n_vars];
        let mut values = vec![vec![vec![f64::NAN; lags]; n_vars]; n_vars];

        for j in 0..n_vars {
            let y = Link::new(j, 0);
            for i in 0..n_vars {
                for tau in 0..=self.tau_max {
                    if i == j && tau == 0 {
                        continue;
                    }
                    let x = Link::new(i, tau);

                    let mut conditions: Vec<Link> =
                        parents[j].iter().copied().filter(|&l| l != x).collect();
                    for p in &parents[i] {
                        let shifted = Link::new(p.var, p.lag + tau);
                        if shifted != x && shifted != y && !conditions.contains(&shifted) {
                            conditions.push(shifted);
                        }
                    }

                    let result = self.test(x, y, &conditions);
                    p_values[i][j][tau] = result.p_value;
                    values[i][j][tau] = result.value;
                }
            }
        }

        PcmciResult {
            p_values,
            values,
            parents: parents.to_vec(),
        }
    }

    /// PC1 for every target followed by MCI
    pub fn run(&self) -> PcmciResult {
        let parents: Vec<Vec<Link>> = (0..self.panel.n_vars()).map(|j| self.pc1(j)).collect();
        info!(
            "[PCMCI] PC1 kept {} lagged parents across {} targets",
            parents.iter().map(|p| p.len()).sum::<usize>(),
            parents.len()
        );
        self.mci(&parents)
    }
}

/// PCMCI reduced to one p-value per (cause, effect) pair.
///
/// Each off-diagonal cell holds the smallest p-value over lags `>= 1`;
/// the lag matrix records where it was reached. Significant iff
/// `p < alpha`. The diagonal stays NaN/false.
pub fn run_pcmci(panel: &TimeSeriesPanel, tau_max: usize, alpha: f64) -> Result<Discovery> {
    info!(
        "[PCMCI] Running on {} variables x {} samples (tau_max={}, alpha={})",
        panel.n_vars(),
        panel.n_rows(),
        tau_max,
        alpha
    );
    let result = Pcmci::new(panel, tau_max, alpha)?.run();

    let names = panel.names().to_vec();
    let n = names.len();
    let mut p_values = PValueMatrix::filled(names.clone(), f64::NAN);
    let mut lags = LagMatrix::filled(names, 0);
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let (p, lag) = result.min_lagged_p(i, j);
            p_values.set(i, j, p);
            lags.set(i, j, lag);
        }
    }

    let adjacency = p_values.threshold(alpha);
    info!("[PCMCI] {} significant edges", adjacency.edge_count());
    Ok(Discovery::new(p_values, adjacency).with_lags(lags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::make_synthetic_var;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, StandardNormal};

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n).map(|_| StandardNormal.sample(&mut rng)).collect()
    }

    #[test]
    fn test_par_corr_dependent() {
        let x = noise(200, 1);
        let e = noise(200, 2);
        let y: Vec<f64> = x.iter().zip(&e).map(|(a, b)| a + 0.1 * b).collect();
        let r = par_corr(&x, &y, &[]).unwrap();
        assert!(r.value > 0.9);
        assert!(r.p_value < 1e-10);
    }

    #[test]
    fn test_par_corr_common_driver() {
        let z = noise(400, 3);
        let e1 = noise(400, 4);
        let e2 = noise(400, 5);
        let x: Vec<f64> = z.iter().zip(&e1).map(|(a, b)| a + 0.3 * b).collect();
        let y: Vec<f64> = z.iter().zip(&e2).map(|(a, b)| a + 0.3 * b).collect();

        let marginal = par_corr(&x, &y, &[]).unwrap();
        let partial = par_corr(&x, &y, &[z]).unwrap();
        assert!(marginal.value > 0.8);
        assert!(partial.value.abs() < 0.2);
    }

    #[test]
    fn test_par_corr_degenerate() {
        let x = vec![2.0; 50];
        let y = noise(50, 6);
        assert_eq!(par_corr(&x, &y, &[]).unwrap(), CiResult::independent());
    }

    #[test]
    fn test_par_corr_small_scale_inputs() {
        let z = noise(300, 10);
        let x: Vec<f64> = z.iter().zip(noise(300, 11)).map(|(a, b)| (a + 0.5 * b) * 1e-8).collect();
        let y: Vec<f64> = z.iter().zip(noise(300, 12)).map(|(a, b)| (a + 0.5 * b) * 1e-9).collect();
        let small = par_corr(&x, &y, &[]).unwrap();
        assert!(small.value > 0.5);
        assert!(small.p_value < 1e-6);

        let rescaled: Vec<f64> = x.iter().map(|v| v * 1e8).collect();
        let reference = par_corr(&rescaled, &y, &[]).unwrap();
        assert!((small.value - reference.value).abs() < 1e-9);
    }

    #[test]
    fn test_par_corr_needs_dof() {
        let x = noise(3, 7);
        let y = noise(3, 8);
        let z = vec![noise(3, 9)];
        assert!(matches!(
            par_corr(&x, &y, &z),
            Err(CausalError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_pcmci_recovers_chain() {
        let panel = make_synthetic_var(3, 500, 0).unwrap();
        let d = run_pcmci(&panel, 2, 0.05).unwrap();

        assert_eq!(d.p_values.shape(), (3, 3));
        for i in 0..3 {
            assert!(d.p_values.get(i, i).is_nan());
            assert!(!d.adjacency.get(i, i));
        }
        assert!(d.adjacency.at("x0", "x1").unwrap());
        assert!(d.adjacency.at("x1", "x2").unwrap());
        let lags = d.lags.unwrap();
        assert_eq!(lags.at("x0", "x1").unwrap(), 1);
        assert_eq!(lags.at("x1", "x2").unwrap(), 1);
    }

    #[test]
    fn test_pc1_keeps_true_parents() {
        let panel = make_synthetic_var(3, 500, 11).unwrap();
        let pcmci = Pcmci::new(&panel, 2, 0.05).unwrap();
        let parents = pcmci.pc1(1);
        assert!(parents.contains(&Link::new(0, 1)));
        assert!(parents.contains(&Link::new(1, 1)));
    }

    #[test]
    fn test_contemporaneous_self_link_is_nan() {
        let panel = make_synthetic_var(3, 200, 2).unwrap();
        let result = Pcmci::new(&panel, 2, 0.05).unwrap().run();
        for i in 0..3 {
            assert!(result.p_value(i, i, 0).is_nan());
            assert!(!result.p_value(i, i, 1).is_nan());
        }
        assert!(!result.p_value(0, 1, 0).is_nan());
    }

    #[test]
    fn test_pcmci_insufficient_data() {
        let panel = make_synthetic_var(2, 12, 0).unwrap();
        assert!(matches!(
            run_pcmci(&panel, 5, 0.05),
            Err(CausalError::InsufficientData { required: 12, actual: 12 })
        ));
    }

    #[test]
    fn test_min_lagged_p_skips_nan() {
        let result = PcmciResult {
            p_values: vec![vec![vec![0.001, f64::NAN, 0.2, 0.03]]],
            values: vec![vec![vec![0.0; 4]]],
            parents: vec![vec![]],
        };
        assert_eq!(result.min_lagged_p(0, 0), (0.03, 3));

        let empty = PcmciResult {
            p_values: vec![vec![vec![0.5, f64::NAN]]],
            values: vec![vec![vec![0.0; 2]]],
            parents: vec![vec![]],
        };
        let (p, lag) = empty.min_lagged_p(0, 0);
        assert!(p.is_nan());
        assert_eq!(lag, 0);
    }
}
