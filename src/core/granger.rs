//! Pairwise Granger causality
//!
//! For a (cause, effect) pair and each lag `1..=max_lag`:
//! - restricted model: effect on its own lags plus a constant
//! - unrestricted model: the same plus the cause's lags
//!
//! Four statistics compare the two fits (SSR F, SSR chi-square,
//! likelihood ratio, Wald F on the cause coefficients). The best lag for
//! a pair is the one with the smallest p-value of the chosen statistic.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::fdr::benjamini_hochberg;
use super::matrix::{LagMatrix, PValueMatrix};
use super::method::{Discovery, PairFailure};
use super::regression::ols;
use crate::data::panel::TimeSeriesPanel;
use crate::error::{CausalError, Result};

/// Default maximum lag
pub const DEFAULT_MAX_LAG: usize = 5;

/// Default significance threshold (p-value)
pub const DEFAULT_SIGNIFICANCE: f64 = 0.05;

/// Which Granger statistic drives lag selection and significance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GrangerTest {
    #[serde(rename = "ssr_ftest")]
    SsrF,
    #[serde(rename = "ssr_chi2test")]
    #[default]
    SsrChi2,
    #[serde(rename = "lrtest")]
    LikelihoodRatio,
    #[serde(rename = "params_ftest")]
    ParamsF,
}

impl GrangerTest {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrangerTest::SsrF => "ssr_ftest",
            GrangerTest::SsrChi2 => "ssr_chi2test",
            GrangerTest::LikelihoodRatio => "lrtest",
            GrangerTest::ParamsF => "params_ftest",
        }
    }
}

impl fmt::Display for GrangerTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GrangerTest {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ssr_ftest" => Ok(GrangerTest::SsrF),
            "ssr_chi2test" => Ok(GrangerTest::SsrChi2),
            "lrtest" => Ok(GrangerTest::LikelihoodRatio),
            "params_ftest" => Ok(GrangerTest::ParamsF),
            other => Err(format!("unknown Granger test '{}'", other)),
        }
    }
}

/// One test statistic with its p-value and degrees of freedom
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TestStatistic {
    pub statistic: f64,
    pub p_value: f64,
    pub df_num: usize,
    /// Denominator dof for F statistics
    pub df_denom: Option<f64>,
}

/// All four statistics at one lag
#[derive(Debug, Clone, Serialize)]
pub struct LagResult {
    pub lag: usize,
    pub ssr_ftest: TestStatistic,
    pub ssr_chi2test: TestStatistic,
    pub lrtest: TestStatistic,
    pub params_ftest: TestStatistic,
}

impl LagResult {
    pub fn statistic(&self, test: GrangerTest) -> &TestStatistic {
        match test {
            GrangerTest::SsrF => &self.ssr_ftest,
            GrangerTest::SsrChi2 => &self.ssr_chi2test,
            GrangerTest::LikelihoodRatio => &self.lrtest,
            GrangerTest::ParamsF => &self.params_ftest,
        }
    }

    pub fn p_value(&self, test: GrangerTest) -> f64 {
        self.statistic(test).p_value
    }
}

// ==================== Single pair ====================

fn f_sf(statistic: f64, d1: f64, d2: f64) -> Result<f64> {
    let dist = FisherSnedecor::new(d1, d2)
        .map_err(|e| CausalError::InvalidParameter(format!("F({}, {}): {}", d1, d2, e)))?;
    Ok(dist.sf(statistic.max(0.0)))
}

fn chi2_sf(statistic: f64, df: f64) -> Result<f64> {
    let dist = ChiSquared::new(df)
        .map_err(|e| CausalError::InvalidParameter(format!("chi2({}): {}", df, e)))?;
    Ok(dist.sf(statistic.max(0.0)))
}

/// Keep only the rows where both series are observed
fn aligned_pair(cause: &[f64], effect: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    if cause.len() != effect.len() {
        return Err(CausalError::ShapeMismatch(format!(
            "cause has {} rows, effect has {}",
            cause.len(),
            effect.len()
        )));
    }
    Ok(cause
        .iter()
        .zip(effect)
        .filter(|(c, e)| !c.is_nan() && !e.is_nan())
        .map(|(&c, &e)| (c, e))
        .unzip())
}

/// Lag matrix with rows `t = lag..n`: lags 1..=lag of each series in
/// turn, then a trailing constant column.
fn lagged_design(series: &[&[f64]], lag: usize) -> DMatrix<f64> {
    let n = series[0].len();
    let rows = n - lag;
    let cols = series.len() * lag + 1;
    DMatrix::from_fn(rows, cols, |r, c| {
        let t = r + lag;
        if c == cols - 1 {
            1.0
        } else {
            let s = c / lag;
            let k = c % lag + 1;
            series[s][t - k]
        }
    })
}

/// Granger statistics of `cause -> effect` for each lag `1..=max_lag`.
///
/// Rows with a missing value in either series are dropped first.
pub fn granger_tests(cause: &[f64], effect: &[f64], max_lag: usize) -> Result<Vec<LagResult>> {
    if max_lag == 0 {
        return Err(CausalError::InvalidParameter("max_lag must be at least 1".to_string()));
    }
    let (x, y) = aligned_pair(cause, effect)?;
    let n = y.len();
    let required = 3 * max_lag + 1;
    if n <= required {
        return Err(CausalError::InsufficientData { required, actual: n });
    }

    let mut results = Vec::with_capacity(max_lag);
    for lag in 1..=max_lag {
        let response = DVector::from_column_slice(&y[lag..]);
        let own = lagged_design(&[y.as_slice()], lag);
        let joint = lagged_design(&[y.as_slice(), x.as_slice()], lag);

        let restricted = ols(&response, &own)?;
        let unrestricted = ols(&response, &joint)?;

        if unrestricted.ssr <= f64::EPSILON * restricted.ssr.max(1.0) {
            return Err(CausalError::DegenerateSeries(
                "unrestricted model fits perfectly".to_string(),
            ));
        }

        let q = lag as f64;
        let df_resid = unrestricted.df_resid();
        let nobs = unrestricted.nobs as f64;
        let ssr_gain = restricted.ssr - unrestricted.ssr;

        let f_stat = ssr_gain / unrestricted.ssr / q * df_resid;
        let ssr_ftest = TestStatistic {
            statistic: f_stat,
            p_value: f_sf(f_stat, q, df_resid)?,
            df_num: lag,
            df_denom: Some(df_resid),
        };

        let chi2_stat = nobs * ssr_gain / unrestricted.ssr;
        let ssr_chi2test = TestStatistic {
            statistic: chi2_stat,
            p_value: chi2_sf(chi2_stat, q)?,
            df_num: lag,
            df_denom: None,
        };

        let lr_stat = -2.0 * (restricted.llf() - unrestricted.llf());
        let lrtest = TestStatistic {
            statistic: lr_stat,
            p_value: chi2_sf(lr_stat, q)?,
            df_num: lag,
            df_denom: None,
        };

        // Wald test that every cause coefficient is zero
        let xtx_inv = (joint.transpose() * &joint)
            .try_inverse()
            .ok_or_else(|| CausalError::Singular("X'X is not invertible".to_string()))?;
        let sigma2 = unrestricted.ssr / df_resid;
        let cov = xtx_inv.view((lag, lag), (lag, lag)) * sigma2;
        let beta = unrestricted.params.rows(lag, lag).into_owned();
        let cov_inv = cov
            .try_inverse()
            .ok_or_else(|| CausalError::Singular("restriction covariance".to_string()))?;
        let wald = (beta.transpose() * cov_inv * &beta)[(0, 0)] / q;
        let params_ftest = TestStatistic {
            statistic: wald,
            p_value: f_sf(wald, q, df_resid)?,
            df_num: lag,
            df_denom: Some(df_resid),
        };

        results.push(LagResult {
            lag,
            ssr_ftest,
            ssr_chi2test,
            lrtest,
            params_ftest,
        });
    }

    Ok(results)
}

/// Lag with the strictly smallest p-value, starting from `(0, 1.0)`.
///
/// Lag 0 means no lag beat p = 1.
pub fn select_best_lag(results: &[LagResult], test: GrangerTest) -> (usize, f64) {
    let mut best = (0, 1.0);
    for result in results {
        let p = result.p_value(test);
        if p < best.1 {
            best = (result.lag, p);
        }
    }
    best
}

/// Best-lag outcome of one Granger test
#[derive(Debug, Clone)]
pub struct GrangerResult {
    /// Lag with the smallest p-value
    pub lag: usize,
    pub p_value: f64,
    pub significant: bool,
    /// Per-lag statistics
    pub by_lag: Vec<LagResult>,
}

/// Granger causality test with fixed parameters
pub struct GrangerCausalityTest {
    max_lag: usize,
    significance: f64,
    statistic: GrangerTest,
}

impl Default for GrangerCausalityTest {
    fn default() -> Self {
        Self::new()
    }
}

impl GrangerCausalityTest {
    /// Create with default lag, significance and statistic
    pub fn new() -> Self {
        Self {
            max_lag: DEFAULT_MAX_LAG,
            significance: DEFAULT_SIGNIFICANCE,
            statistic: GrangerTest::default(),
        }
    }

    pub fn with_params(max_lag: usize, significance: f64, statistic: GrangerTest) -> Self {
        Self {
            max_lag,
            significance,
            statistic,
        }
    }

    /// Test whether `cause` Granger-causes `effect`
    pub fn test(&self, cause: &[f64], effect: &[f64]) -> Result<GrangerResult> {
        let by_lag = granger_tests(cause, effect, self.max_lag)?;
        let (lag, p_value) = select_best_lag(&by_lag, self.statistic);
        Ok(GrangerResult {
            lag,
            p_value,
            significant: p_value < self.significance,
            by_lag,
        })
    }
}

// ==================== Whole panel ====================

/// Granger p-values for every ordered pair, thresholded at `p < alpha`.
///
/// A pair whose test fails gets `NaN` and no edge. It is logged and
/// listed in `Discovery::failures`; the remaining pairs still run.
pub fn pairwise_granger(
    panel: &TimeSeriesPanel,
    max_lag: usize,
    alpha: f64,
    test: GrangerTest,
) -> Discovery {
    let names = panel.names().to_vec();
    let n = names.len();
    let tester = GrangerCausalityTest::with_params(max_lag, alpha, test);

    info!(
        "[GRANGER] Testing {} pairs (max_lag={}, test={})",
        n * n.saturating_sub(1),
        max_lag,
        test
    );

    let mut p_values = PValueMatrix::filled(names.clone(), f64::NAN);
    let mut lags = LagMatrix::filled(names.clone(), 0);
    let mut failures = Vec::new();

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            match tester.test(panel.column(i), panel.column(j)) {
                Ok(result) => {
                    debug!(
                        "[GRANGER] {} -> {}: p={:.4e} lag={}",
                        names[i], names[j], result.p_value, result.lag
                    );
                    p_values.set(i, j, result.p_value);
                    lags.set(i, j, result.lag);
                }
                Err(e) => {
                    warn!("[GRANGER] {} -> {} failed: {}", names[i], names[j], e);
                    failures.push(PairFailure {
                        cause: names[i].clone(),
                        effect: names[j].clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    let adjacency = p_values.threshold(alpha);
    info!(
        "[GRANGER] {} significant edges at alpha={}, {} failed pairs",
        adjacency.edge_count(),
        alpha,
        failures.len()
    );

    let mut discovery = Discovery::new(p_values, adjacency).with_lags(lags);
    discovery.failures = failures;
    discovery
}

/// Pairwise Granger with the adjacency from Benjamini-Hochberg
pub fn pairwise_granger_fdr(
    panel: &TimeSeriesPanel,
    max_lag: usize,
    alpha: f64,
    test: GrangerTest,
) -> Discovery {
    let mut discovery = pairwise_granger(panel, max_lag, alpha, test);
    discovery.adjacency = benjamini_hochberg(&discovery.p_values, alpha);
    info!(
        "[GRANGER] {} edges survive FDR at alpha={}",
        discovery.adjacency.edge_count(),
        alpha
    );
    discovery
}
