//! Data Module
//!
//! Time-series panels and their sources.
//! - CSV import/export of named columns
//! - Synthetic VAR data with a known causal chain

pub mod panel;
pub mod synthetic;

pub use panel::TimeSeriesPanel;
pub use synthetic::{make_synthetic_var, variable_name};
