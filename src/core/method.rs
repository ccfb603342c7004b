//! Uniform contract for causal-discovery methods
//!
//! Every method takes a stationary panel and returns a [`Discovery`]:
//! a p-value matrix plus a boolean adjacency matrix. The benchmark and
//! the dashboard only talk to methods through [`CausalMethod`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::granger::{pairwise_granger, pairwise_granger_fdr, GrangerTest};
use super::matrix::{AdjacencyMatrix, LagMatrix, PValueMatrix};
use super::pcmci::run_pcmci;
use crate::data::panel::TimeSeriesPanel;
use crate::error::Result;

/// A (cause, effect) pair whose test could not be computed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairFailure {
    pub cause: String,
    pub effect: String,
    pub reason: String,
}

/// Output of a causal-discovery method
#[derive(Debug, Clone)]
pub struct Discovery {
    pub p_values: PValueMatrix,
    pub adjacency: AdjacencyMatrix,
    /// Best lag per pair, when the method resolves lags
    pub lags: Option<LagMatrix>,
    /// Pairs recorded as `NaN` because their test failed
    pub failures: Vec<PairFailure>,
}

impl Discovery {
    pub fn new(p_values: PValueMatrix, adjacency: AdjacencyMatrix) -> Self {
        Self {
            p_values,
            adjacency,
            lags: None,
            failures: Vec::new(),
        }
    }

    pub fn with_lags(mut self, lags: LagMatrix) -> Self {
        self.lags = Some(lags);
        self
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.edge_count()
    }

    /// No significant edge was found
    pub fn is_empty_graph(&self) -> bool {
        self.edge_count() == 0
    }
}

/// Causal-discovery method usable by the benchmark
pub trait CausalMethod: Send + Sync {
    /// Short display name
    fn name(&self) -> &str;

    /// Run discovery on a stationary panel
    fn discover(&self, panel: &TimeSeriesPanel) -> Result<Discovery>;
}

/// Plain functions and closures are methods too
impl<F> CausalMethod for F
where
    F: Fn(&TimeSeriesPanel) -> Result<Discovery> + Send + Sync,
{
    fn name(&self) -> &str {
        "custom"
    }

    fn discover(&self, panel: &TimeSeriesPanel) -> Result<Discovery> {
        self(panel)
    }
}

/// Pairwise Granger with a raw `p < alpha` threshold
#[derive(Debug, Clone)]
pub struct GrangerMethod {
    pub max_lag: usize,
    pub alpha: f64,
    pub test: GrangerTest,
}

impl CausalMethod for GrangerMethod {
    fn name(&self) -> &str {
        "Granger"
    }

    fn discover(&self, panel: &TimeSeriesPanel) -> Result<Discovery> {
        Ok(pairwise_granger(panel, self.max_lag, self.alpha, self.test))
    }
}

/// Pairwise Granger with Benjamini-Hochberg correction
#[derive(Debug, Clone)]
pub struct GrangerFdrMethod {
    pub max_lag: usize,
    pub alpha: f64,
    pub test: GrangerTest,
}

impl CausalMethod for GrangerFdrMethod {
    fn name(&self) -> &str {
        "Granger+FDR"
    }

    fn discover(&self, panel: &TimeSeriesPanel) -> Result<Discovery> {
        Ok(pairwise_granger_fdr(panel, self.max_lag, self.alpha, self.test))
    }
}

/// PCMCI with ParCorr
#[derive(Debug, Clone)]
pub struct PcmciMethod {
    pub tau_max: usize,
    pub alpha: f64,
}

impl CausalMethod for PcmciMethod {
    fn name(&self) -> &str {
        "PCMCI"
    }

    fn discover(&self, panel: &TimeSeriesPanel) -> Result<Discovery> {
        run_pcmci(panel, self.tau_max, self.alpha)
    }
}

/// Parameters shared by every method kind
#[derive(Debug, Clone, Copy)]
pub struct MethodSettings {
    pub alpha: f64,
    pub max_lag: usize,
    pub granger_test: GrangerTest,
    pub tau_max: usize,
}

/// Selectable method, as offered by the CLI and the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    #[serde(rename = "granger")]
    Granger,
    #[serde(rename = "granger-fdr")]
    GrangerFdr,
    #[serde(rename = "pcmci")]
    Pcmci,
}

impl MethodKind {
    pub fn all() -> [MethodKind; 3] {
        [MethodKind::Granger, MethodKind::GrangerFdr, MethodKind::Pcmci]
    }

    /// Identifier used in file names and query strings
    pub fn slug(&self) -> &'static str {
        match self {
            MethodKind::Granger => "granger",
            MethodKind::GrangerFdr => "granger-fdr",
            MethodKind::Pcmci => "pcmci",
        }
    }

    /// Prefix of the result files, e.g. `granger_fdr_pvalues.csv`
    pub fn file_stem(&self) -> &'static str {
        match self {
            MethodKind::Granger => "granger",
            MethodKind::GrangerFdr => "granger_fdr",
            MethodKind::Pcmci => "pcmci",
        }
    }

    pub fn graph_title(&self) -> &'static str {
        match self {
            MethodKind::Granger => "Granger Causality (Stationary)",
            MethodKind::GrangerFdr => "Granger Causality + FDR",
            MethodKind::Pcmci => "PCMCI Causal Graph",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            MethodKind::Granger => "Granger (raw)",
            MethodKind::GrangerFdr => "Granger + FDR",
            MethodKind::Pcmci => "PCMCI",
        }
    }

    pub fn build(&self, settings: &MethodSettings) -> Box<dyn CausalMethod> {
        match self {
            MethodKind::Granger => Box::new(GrangerMethod {
                max_lag: settings.max_lag,
                alpha: settings.alpha,
                test: settings.granger_test,
            }),
            MethodKind::GrangerFdr => Box::new(GrangerFdrMethod {
                max_lag: settings.max_lag,
                alpha: settings.alpha,
                test: settings.granger_test,
            }),
            MethodKind::Pcmci => Box::new(PcmciMethod {
                tau_max: settings.tau_max,
                alpha: settings.alpha,
            }),
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for MethodKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '_', '+'], "-").as_str() {
            "granger" | "granger-(raw)" | "granger-raw" => Ok(MethodKind::Granger),
            "granger-fdr" | "granger---fdr" => Ok(MethodKind::GrangerFdr),
            "pcmci" => Ok(MethodKind::Pcmci),
            other => Err(format!("unknown method '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_kind_parsing() {
        assert_eq!("granger".parse::<MethodKind>().unwrap(), MethodKind::Granger);
        assert_eq!("Granger (raw)".parse::<MethodKind>().unwrap(), MethodKind::Granger);
        assert_eq!("Granger + FDR".parse::<MethodKind>().unwrap(), MethodKind::GrangerFdr);
        assert_eq!("granger_fdr".parse::<MethodKind>().unwrap(), MethodKind::GrangerFdr);
        assert_eq!("PCMCI".parse::<MethodKind>().unwrap(), MethodKind::Pcmci);
        assert!("lasso".parse::<MethodKind>().is_err());
    }

    #[test]
    fn test_labels_round_trip() {
        for kind in MethodKind::all() {
            assert_eq!(kind.label().parse::<MethodKind>().unwrap(), kind);
            assert_eq!(kind.slug().parse::<MethodKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_build_names() {
        let settings = MethodSettings {
            alpha: 0.05,
            max_lag: 3,
            granger_test: GrangerTest::SsrChi2,
            tau_max: 2,
        };
        assert_eq!(MethodKind::Granger.build(&settings).name(), "Granger");
        assert_eq!(MethodKind::GrangerFdr.build(&settings).name(), "Granger+FDR");
        assert_eq!(MethodKind::Pcmci.build(&settings).name(), "PCMCI");
    }

    #[test]
    fn test_closure_is_a_method() {
        let labels = vec!["a".to_string(), "b".to_string()];
        let method = move |_: &TimeSeriesPanel| -> Result<Discovery> {
            let p = PValueMatrix::filled(labels.clone(), 1.0);
            let adj = p.threshold(0.05);
            Ok(Discovery::new(p, adj))
        };
        let panel = TimeSeriesPanel::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![0.0; 3], vec![0.0; 3]],
        )
        .unwrap();
        let d = method.discover(&panel).unwrap();
        assert!(d.is_empty_graph());
        assert_eq!(method.name(), "custom");
    }
}
