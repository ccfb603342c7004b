//! Core causal-discovery logic
//!
//! This module implements the statistical engine:
//!
//! - Stationarity enforcement (ADF, KPSS, differencing)
//! - Pairwise Granger causality with optional FDR correction
//! - PCMCI with partial-correlation tests
//! - A shared method contract for benchmarking

pub mod regression;
pub mod matrix;
pub mod stationarity;
pub mod granger;
pub mod fdr;
pub mod pcmci;
pub mod method;

// Re-export commonly used types
pub use matrix::{AdjacencyMatrix, LabeledMatrix, LagMatrix, PValueMatrix};
pub use stationarity::{
    adf_test, kpss_test, make_stationary, make_stationary_with_report, StationarityReport,
    StationarityStrategy,
};
pub use granger::{
    granger_tests, pairwise_granger, pairwise_granger_fdr, select_best_lag,
    GrangerCausalityTest, GrangerTest, LagResult,
};
pub use fdr::benjamini_hochberg;
pub use pcmci::{par_corr, run_pcmci, Pcmci, PcmciResult};
pub use method::{
    CausalMethod, Discovery, GrangerFdrMethod, GrangerMethod, MethodKind, MethodSettings,
    PairFailure, PcmciMethod,
};
