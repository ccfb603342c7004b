//! Ordinary least squares shared by the Granger, ADF and ParCorr tests

use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

use crate::error::{CausalError, Result};

/// Result of an OLS fit
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub params: DVector<f64>,
    pub residuals: DVector<f64>,
    /// Sum of squared residuals
    pub ssr: f64,
    pub nobs: usize,
    /// Number of regressors (including any constant column)
    pub k: usize,
}

impl OlsFit {
    /// Residual degrees of freedom
    pub fn df_resid(&self) -> f64 {
        (self.nobs - self.k) as f64
    }

    /// Gaussian log-likelihood at the ML variance estimate
    pub fn llf(&self) -> f64 {
        let n = self.nobs as f64;
        -n / 2.0 * ((2.0 * PI).ln() + (self.ssr / n).ln() + 1.0)
    }

    /// Akaike information criterion
    pub fn aic(&self) -> f64 {
        -2.0 * self.llf() + 2.0 * self.k as f64
    }

    /// Parameter standard errors; `x` must be the design used for the fit
    pub fn standard_errors(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        let xtx_inv = (x.transpose() * x)
            .try_inverse()
            .ok_or_else(|| CausalError::Singular("X'X is not invertible".to_string()))?;
        let sigma2 = self.ssr / self.df_resid();
        Ok(xtx_inv.diagonal().map(|v| (v * sigma2).max(0.0).sqrt()))
    }

    /// t-statistic of one parameter
    pub fn t_value(&self, x: &DMatrix<f64>, index: usize) -> Result<f64> {
        let se = self.standard_errors(x)?[index];
        if se <= f64::EPSILON {
            return Err(CausalError::DegenerateSeries(
                "zero standard error".to_string(),
            ));
        }
        Ok(self.params[index] / se)
    }
}

/// Fit `y = X b + e` by SVD least squares.
///
/// Fails if there are no residual degrees of freedom or `X` is rank deficient.
pub fn ols(y: &DVector<f64>, x: &DMatrix<f64>) -> Result<OlsFit> {
    let (nobs, k) = x.shape();
    if y.len() != nobs {
        return Err(CausalError::ShapeMismatch(format!(
            "response has {} rows, design has {}",
            y.len(),
            nobs
        )));
    }
    if nobs <= k {
        return Err(CausalError::InsufficientData {
            required: k,
            actual: nobs,
        });
    }

    let svd = x.clone().svd(true, true);
    let max_sv = svd.singular_values.max();
    let tol = f64::EPSILON * nobs.max(k) as f64 * max_sv;
    if max_sv <= 0.0 || svd.rank(tol) < k {
        return Err(CausalError::Singular(format!(
            "design of {} columns has rank {}",
            k,
            svd.rank(tol)
        )));
    }

    let params = svd
        .solve(y, tol)
        .map_err(|e| CausalError::Singular(e.to_string()))?;
    let residuals = y - x * &params;
    let ssr = residuals.norm_squared();

    Ok(OlsFit {
        params,
        residuals,
        ssr,
        nobs,
        k,
    })
}

/// Residuals of `y` after projecting out the columns of `z`.
///
/// An empty `z` returns `y` unchanged.
pub fn residualize(y: &DVector<f64>, z: &DMatrix<f64>) -> Result<DVector<f64>> {
    if z.ncols() == 0 {
        return Ok(y.clone());
    }
    Ok(ols(y, z)?.residuals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ols_recovers_line() {
        // y = 2 + 3x exactly
        let x = DMatrix::from_fn(10, 2, |i, j| if j == 0 { 1.0 } else { i as f64 });
        let y = DVector::from_fn(10, |i, _| 2.0 + 3.0 * i as f64);
        let fit = ols(&y, &x).unwrap();
        assert!((fit.params[0] - 2.0).abs() < 1e-9);
        assert!((fit.params[1] - 3.0).abs() < 1e-9);
        assert!(fit.ssr < 1e-12);
        assert_eq!(fit.df_resid(), 8.0);
    }

    #[test]
    fn test_ols_rejects_collinear_design() {
        let x = DMatrix::from_fn(10, 2, |i, _| i as f64);
        let y = DVector::from_fn(10, |i, _| i as f64);
        assert!(matches!(ols(&y, &x), Err(CausalError::Singular(_))));
    }

    #[test]
    fn test_ols_needs_residual_dof() {
        let x = DMatrix::from_element(2, 2, 1.0);
        let y = DVector::from_element(2, 1.0);
        assert!(matches!(ols(&y, &x), Err(CausalError::InsufficientData { .. })));
    }

    #[test]
    fn test_t_value_and_aic() {
        let noise = [0.3, -0.2, 0.1, -0.4, 0.25, -0.05, 0.15, -0.3, 0.2, -0.1, 0.05, 0.0];
        let n = noise.len();
        let x = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { i as f64 });
        let y = DVector::from_fn(n, |i, _| 1.0 + 0.5 * i as f64 + noise[i]);
        let fit = ols(&y, &x).unwrap();
        let t = fit.t_value(&x, 1).unwrap();
        assert!(t > 10.0);
        assert!(fit.aic().is_finite());
    }

    #[test]
    fn test_residualize_empty_conditions() {
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let z = DMatrix::<f64>::zeros(3, 0);
        assert_eq!(residualize(&y, &z).unwrap(), y);
    }
}
