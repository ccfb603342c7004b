//! Stationarity testing and enforcement
//!
//! Two complementary tests:
//! - Augmented Dickey-Fuller (null: unit root, i.e. non-stationary)
//! - KPSS (null: level stationary)
//!
//! `make_stationary` differences each column until the selected
//! criterion holds or the differencing bound is reached, then trims the
//! rows differencing left undefined.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use super::regression::{ols, OlsFit};
use crate::data::panel::TimeSeriesPanel;
use crate::error::{CausalError, Result};

/// Default significance level for both tests
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Default bound on differencing rounds
pub const DEFAULT_MAX_DIFF: usize = 2;

/// Minimum observations for the ADF regression
const MIN_ADF_OBS: usize = 8;

/// Minimum observations for KPSS
const MIN_KPSS_OBS: usize = 3;

// MacKinnon (1994) approximate p-value surface, constant-only ADF, one series
const TAU_MAX_C: f64 = 2.74;
const TAU_MIN_C: f64 = -18.83;
const TAU_STAR_C: f64 = -1.61;
const TAU_C_SMALLP: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_C_LARGEP: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

// Kwiatkowski et al. (1992) level-stationarity table
const KPSS_CRIT: [f64; 4] = [0.347, 0.463, 0.574, 0.739];
const KPSS_PVALS: [f64; 4] = [0.10, 0.05, 0.025, 0.01];

/// Which test(s) must pass before a series counts as stationary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StationarityStrategy {
    /// ADF only
    #[serde(rename = "adf")]
    Adf,
    /// KPSS only
    #[serde(rename = "kpss")]
    Kpss,
    /// Both ADF and KPSS
    #[default]
    #[serde(rename = "auto", alias = "both")]
    Both,
}

impl StationarityStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationarityStrategy::Adf => "adf",
            StationarityStrategy::Kpss => "kpss",
            StationarityStrategy::Both => "auto",
        }
    }

    /// Combine individual verdicts under this strategy
    pub fn accepts(&self, adf_ok: bool, kpss_ok: bool) -> bool {
        match self {
            StationarityStrategy::Adf => adf_ok,
            StationarityStrategy::Kpss => kpss_ok,
            StationarityStrategy::Both => adf_ok && kpss_ok,
        }
    }
}

impl fmt::Display for StationarityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StationarityStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adf" => Ok(StationarityStrategy::Adf),
            "kpss" => Ok(StationarityStrategy::Kpss),
            "auto" | "both" => Ok(StationarityStrategy::Both),
            other => Err(format!("unknown stationarity strategy '{}'", other)),
        }
    }
}

// ==================== ADF ====================

/// Outcome of an Augmented Dickey-Fuller test
#[derive(Debug, Clone)]
pub struct AdfResult {
    /// t-statistic of the lagged level coefficient
    pub statistic: f64,
    pub p_value: f64,
    /// Number of lagged differences selected by AIC
    pub used_lag: usize,
    /// Observations in the final regression
    pub nobs: usize,
}

/// Augmented Dickey-Fuller test with a constant and AIC lag selection.
///
/// `NaN`s are dropped first.
pub fn adf(series: &[f64]) -> Result<AdfResult> {
    let x: Vec<f64> = series.iter().copied().filter(|v| !v.is_nan()).collect();
    let nobs = x.len();
    if nobs < MIN_ADF_OBS {
        return Err(CausalError::InsufficientData {
            required: MIN_ADF_OBS,
            actual: nobs,
        });
    }

    let schwert = (12.0 * (nobs as f64 / 100.0).powf(0.25)).ceil() as usize;
    let max_lag = schwert.min(nobs / 2 - 2);

    // Lag selection on a common sample starting at max_lag
    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let (y, design) = adf_design(&x, lag, max_lag);
        let fit = match ols(&y, &design) {
            Ok(fit) => fit,
            Err(e) => {
                debug!("[STATIONARITY] ADF lag {} skipped: {}", lag, e);
                continue;
            }
        };
        let aic = fit.aic();
        match best {
            Some((best_aic, _)) if aic >= best_aic => {}
            _ => best = Some((aic, lag)),
        }
    }

    let used_lag = best.map(|(_, lag)| lag).ok_or_else(|| {
        CausalError::Singular("no ADF lag order could be fitted".to_string())
    })?;

    let (y, design) = adf_design(&x, used_lag, used_lag);
    let fit: OlsFit = ols(&y, &design)?;
    let statistic = fit.t_value(&design, 0)?;

    Ok(AdfResult {
        statistic,
        p_value: mackinnon_p(statistic),
        used_lag,
        nobs: fit.nobs,
    })
}

/// ADF test verdict: true (stationary) iff the unit root is rejected at `alpha`
pub fn adf_test(series: &[f64], alpha: f64) -> Result<bool> {
    Ok(adf(series)?.p_value < alpha)
}

/// Regression of `dx[t]` on `[x[t], dx[t-1..=t-lag], 1]` for `t >= start`
fn adf_design(x: &[f64], lag: usize, start: usize) -> (DVector<f64>, DMatrix<f64>) {
    let dx: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let rows = dx.len() - start;
    let cols = lag + 2;

    let y = DVector::from_fn(rows, |r, _| dx[start + r]);
    let design = DMatrix::from_fn(rows, cols, |r, c| {
        let t = start + r;
        match c {
            0 => x[t],
            c if c == cols - 1 => 1.0,
            c => dx[t - c],
        }
    });
    (y, design)
}

/// MacKinnon approximate p-value for the constant-only ADF statistic
pub fn mackinnon_p(statistic: f64) -> f64 {
    if statistic > TAU_MAX_C {
        return 1.0;
    }
    if statistic < TAU_MIN_C {
        return 0.0;
    }
    let coefs: &[f64] = if statistic <= TAU_STAR_C {
        &TAU_C_SMALLP
    } else {
        &TAU_C_LARGEP
    };
    let z = coefs
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * statistic + c);
    standard_normal_cdf(z)
}

fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

// ==================== KPSS ====================

/// Outcome of a KPSS level-stationarity test
#[derive(Debug, Clone)]
pub struct KpssResult {
    pub statistic: f64,
    /// Interpolated from the KPSS table, clamped to [0.01, 0.10]
    pub p_value: f64,
    /// Bartlett-window lags used for the long-run variance
    pub lags: usize,
}

/// KPSS test around a constant with automatic lag selection
pub fn kpss(series: &[f64]) -> Result<KpssResult> {
    let x: Vec<f64> = series.iter().copied().filter(|v| !v.is_nan()).collect();
    let n = x.len();
    if n < MIN_KPSS_OBS {
        return Err(CausalError::InsufficientData {
            required: MIN_KPSS_OBS,
            actual: n,
        });
    }

    let mean = x.iter().sum::<f64>() / n as f64;
    let resid: Vec<f64> = x.iter().map(|v| v - mean).collect();
    let ss: f64 = resid.iter().map(|r| r * r).sum();
    // Relative to the raw magnitude so rescaling never changes the verdict
    let raw_ss: f64 = x.iter().map(|v| v * v).sum();
    if ss <= f64::EPSILON * raw_ss {
        return Err(CausalError::DegenerateSeries(
            "constant series has no variance".to_string(),
        ));
    }

    let lags = kpss_autolag(&resid)?.min(n - 1);

    let mut cumsum = 0.0;
    let mut eta = 0.0;
    for r in &resid {
        cumsum += r;
        eta += cumsum * cumsum;
    }
    eta /= (n * n) as f64;

    let s_hat = long_run_variance(&resid, lags);
    if s_hat.is_nan() || s_hat <= 0.0 {
        return Err(CausalError::DegenerateSeries(format!(
            "non-positive long-run variance {}",
            s_hat
        )));
    }

    let statistic = eta / s_hat;
    Ok(KpssResult {
        statistic,
        p_value: interpolate_kpss_p(statistic),
        lags,
    })
}

/// KPSS verdict: true iff stationarity is not rejected at `alpha`.
///
/// Short or constant series count as not stationary.
pub fn kpss_test(series: &[f64], alpha: f64) -> bool {
    match kpss(series) {
        Ok(result) => result.p_value > alpha,
        Err(e) => {
            debug!("[STATIONARITY] KPSS treated as non-stationary: {}", e);
            false
        }
    }
}

fn lagged_dot(resid: &[f64], lag: usize) -> f64 {
    resid[lag..]
        .iter()
        .zip(&resid[..resid.len() - lag])
        .map(|(a, b)| a * b)
        .sum()
}

/// Hobijn et al. (1998) data-dependent bandwidth
fn kpss_autolag(resid: &[f64]) -> Result<usize> {
    let n = resid.len();
    let nf = n as f64;
    let cov_lags = (nf.powf(2.0 / 9.0) as usize).min(n - 1);

    let mut s0 = resid.iter().map(|r| r * r).sum::<f64>() / nf;
    let mut s1 = 0.0;
    for i in 1..=cov_lags {
        let prod = lagged_dot(resid, i) / (nf / 2.0);
        s0 += prod;
        s1 += i as f64 * prod;
    }

    let s_hat = s1 / s0;
    if !s_hat.is_finite() {
        return Err(CausalError::DegenerateSeries(
            "autocovariance bandwidth undefined".to_string(),
        ));
    }
    let gamma = 1.1447 * (s_hat * s_hat).powf(1.0 / 3.0);
    Ok((gamma * nf.powf(1.0 / 3.0)) as usize)
}

/// Bartlett-weighted long-run variance
fn long_run_variance(resid: &[f64], lags: usize) -> f64 {
    let mut s = resid.iter().map(|r| r * r).sum::<f64>();
    for i in 1..=lags {
        let weight = 1.0 - i as f64 / (lags as f64 + 1.0);
        s += 2.0 * weight * lagged_dot(resid, i);
    }
    s / resid.len() as f64
}

fn interpolate_kpss_p(statistic: f64) -> f64 {
    if statistic <= KPSS_CRIT[0] {
        return KPSS_PVALS[0];
    }
    for k in 1..KPSS_CRIT.len() {
        if statistic <= KPSS_CRIT[k] {
            let frac = (statistic - KPSS_CRIT[k - 1]) / (KPSS_CRIT[k] - KPSS_CRIT[k - 1]);
            return KPSS_PVALS[k - 1] + frac * (KPSS_PVALS[k] - KPSS_PVALS[k - 1]);
        }
    }
    KPSS_PVALS[KPSS_PVALS.len() - 1]
}

// ==================== Differencing ====================

/// Lag-`order` difference; keeps length with `order` leading `NaN`s
pub fn difference(series: &[f64], order: usize) -> Vec<f64> {
    (0..series.len())
        .map(|t| {
            if t < order {
                f64::NAN
            } else {
                series[t] - series[t - order]
            }
        })
        .collect()
}

/// Per-column outcome of stationarity enforcement
#[derive(Debug, Clone, Serialize)]
pub struct StationarityReport {
    pub variable: String,
    /// Differences applied
    pub differences: usize,
    /// Verdicts of the last test round
    pub adf_stationary: bool,
    pub kpss_stationary: bool,
    /// Whether the selected criterion was met
    pub stationary: bool,
}

/// Difference every column until it is stationary, then drop rows with `NaN`.
///
/// Each column gets at most `max_diff + 1` test rounds. A failing round
/// is followed by one more difference, so a column that never passes
/// comes back differenced `max_diff + 1` times.
pub fn make_stationary(
    panel: &TimeSeriesPanel,
    max_diff: usize,
    strategy: StationarityStrategy,
) -> TimeSeriesPanel {
    make_stationary_with_report(panel, max_diff, strategy).0
}

/// [`make_stationary`] plus the per-column report
pub fn make_stationary_with_report(
    panel: &TimeSeriesPanel,
    max_diff: usize,
    strategy: StationarityStrategy,
) -> (TimeSeriesPanel, Vec<StationarityReport>) {
    let mut out = panel.clone();
    let mut reports = Vec::with_capacity(panel.n_vars());

    for (idx, name) in panel.names().iter().enumerate() {
        let mut series = panel.column(idx).to_vec();
        let mut differences = 0;
        let mut adf_ok = false;
        let mut kpss_ok = false;
        let mut stationary = false;

        for _ in 0..=max_diff {
            adf_ok = match adf_test(&series, DEFAULT_ALPHA) {
                Ok(ok) => ok,
                Err(e) => {
                    debug!("[STATIONARITY] {}: ADF failed ({}), treating as non-stationary", name, e);
                    false
                }
            };
            kpss_ok = kpss_test(&series, DEFAULT_ALPHA);

            if strategy.accepts(adf_ok, kpss_ok) {
                stationary = true;
                break;
            }

            series = difference(&series, 1);
            differences += 1;
        }

        info!(
            "[STATIONARITY] {}: {} difference(s), adf={} kpss={} stationary={}",
            name, differences, adf_ok, kpss_ok, stationary
        );

        // Length is unchanged by `difference`, so this cannot fail
        let _ = out.replace_column(idx, series);

        reports.push(StationarityReport {
            variable: name.clone(),
            differences,
            adf_stationary: adf_ok,
            kpss_stationary: kpss_ok,
            stationary,
        });
    }

    (out.drop_missing(), reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, StandardNormal};

    fn white_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n).map(|_| StandardNormal.sample(&mut rng)).collect()
    }

    fn drifting_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut level = 0.0;
        white_noise(n, seed)
            .into_iter()
            .map(|e| {
                level += 0.3 + e;
                level
            })
            .collect()
    }

    #[test]
    fn test_difference_keeps_length() {
        let d = difference(&[1.0, 3.0, 6.0, 10.0], 1);
        assert_eq!(d.len(), 4);
        assert!(d[0].is_nan());
        assert_eq!(&d[1..], &[2.0, 3.0, 4.0]);

        let d2 = difference(&[1.0, 3.0, 6.0, 10.0], 2);
        assert!(d2[0].is_nan() && d2[1].is_nan());
        assert_eq!(&d2[2..], &[5.0, 7.0]);
    }

    #[test]
    fn test_mackinnon_reference_points() {
        // 5% critical value for the constant-only case is about -2.86
        let p = mackinnon_p(-2.86);
        assert!((p - 0.05).abs() < 0.01, "p = {}", p);
        assert_eq!(mackinnon_p(5.0), 1.0);
        assert_eq!(mackinnon_p(-25.0), 0.0);
        // Both branches agree at the switch point
        let below = mackinnon_p(TAU_STAR_C - 1e-9);
        let above = mackinnon_p(TAU_STAR_C + 1e-9);
        assert!((below - above).abs() < 0.01);
    }

    #[test]
    fn test_adf_white_noise_is_stationary() {
        let result = adf(&white_noise(500, 1)).unwrap();
        assert!(result.statistic < -5.0);
        assert!(result.p_value < 0.01);
        assert!(adf_test(&white_noise(500, 1), 0.05).unwrap());
    }

    #[test]
    fn test_adf_drifting_walk_is_not_stationary() {
        assert!(!adf_test(&drifting_walk(500, 2), 0.05).unwrap());
    }

    #[test]
    fn test_adf_short_series_errors() {
        let err = adf(&[1.0, 2.0, 3.0]);
        assert!(matches!(err, Err(CausalError::InsufficientData { .. })));
    }

    #[test]
    fn test_kpss_trend_is_not_stationary() {
        let noise = white_noise(300, 3);
        let trend: Vec<f64> = noise
            .iter()
            .enumerate()
            .map(|(t, e)| 0.05 * t as f64 + e)
            .collect();
        let result = kpss(&trend).unwrap();
        assert!(result.statistic > KPSS_CRIT[3]);
        assert_eq!(result.p_value, 0.01);
        assert!(!kpss_test(&trend, 0.05));
    }

    #[test]
    fn test_kpss_white_noise_not_rejected_at_one_percent() {
        assert!(kpss_test(&white_noise(1000, 4), 0.01));
    }

    #[test]
    fn test_kpss_degenerate_series_is_not_stationary() {
        assert!(!kpss_test(&[2.0; 50], 0.05));
        assert!(!kpss_test(&[1.0, 2.0], 0.05));
        assert!(matches!(kpss(&[2.0; 50]), Err(CausalError::DegenerateSeries(_))));
    }

    #[test]
    fn test_kpss_small_scale_series_is_tested() {
        let noise = white_noise(400, 5);
        let tiny: Vec<f64> = noise.iter().map(|v| v * 1e-8).collect();
        let full = kpss(&noise).unwrap();
        let scaled = kpss(&tiny).unwrap();
        assert!((full.statistic - scaled.statistic).abs() < 1e-9);
        assert_eq!(kpss_test(&noise, 0.05), kpss_test(&tiny, 0.05));
        assert!(matches!(kpss(&[0.1; 50]), Err(CausalError::DegenerateSeries(_))));
    }

    #[test]
    fn test_kpss_interpolation() {
        assert_eq!(interpolate_kpss_p(0.1), 0.10);
        assert_eq!(interpolate_kpss_p(2.0), 0.01);
        let mid = interpolate_kpss_p((0.347 + 0.463) / 2.0);
        assert!((mid - 0.075).abs() < 1e-12);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("auto".parse::<StationarityStrategy>().unwrap(), StationarityStrategy::Both);
        assert_eq!("ADF".parse::<StationarityStrategy>().unwrap(), StationarityStrategy::Adf);
        assert!("nope".parse::<StationarityStrategy>().is_err());
        assert!(StationarityStrategy::Both.accepts(true, true));
        assert!(!StationarityStrategy::Both.accepts(true, false));
        assert!(StationarityStrategy::Kpss.accepts(false, true));
    }

    #[test]
    fn test_make_stationary_trims_and_cleans() {
        let panel = TimeSeriesPanel::new(
            vec!["x".to_string(), "y".to_string()],
            vec![drifting_walk(500, 5), white_noise(500, 6)],
        )
        .unwrap();

        let (out, reports) =
            make_stationary_with_report(&panel, DEFAULT_MAX_DIFF, StationarityStrategy::Both);

        assert!(!out.has_missing());
        assert!(out.n_rows() < panel.n_rows());
        assert_eq!(out.n_vars(), 2);
        assert!(reports[0].differences >= 1);
    }

    #[test]
    fn test_make_stationary_never_grows() {
        let panel = TimeSeriesPanel::new(vec!["c".to_string()], vec![vec![1.0; 40]]).unwrap();
        // A constant column never passes, so it is differenced max_diff + 1 times
        let (out, reports) = make_stationary_with_report(&panel, 2, StationarityStrategy::Adf);
        assert_eq!(reports[0].differences, 3);
        assert!(!reports[0].stationary);
        assert_eq!(out.n_rows(), 37);
        assert!(!out.has_missing());
    }
}
