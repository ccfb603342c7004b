//! Temporal Causality Engine Library
//!
//! Causal discovery for multivariate time series.
//!
//! # Pipeline
//!
//! - Enforce stationarity (ADF / KPSS, differencing)
//! - Discover lagged causal links (Granger, Granger + FDR, PCMCI)
//! - Score methods against a known ground truth
//! - Render the resulting graph

pub mod core;
pub mod data;
pub mod benchmark;
pub mod viz;
pub mod config;
pub mod error;

pub use error::{CausalError, Result};
