//! Benchmarking Engine
//!
//! Scores causal-discovery methods against a known ground truth.
//!
//! Usage:
//! ```text
//! cargo run -- benchmark --n-vars 4 --n-samples 800
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use crate::core::matrix::AdjacencyMatrix;
use crate::core::method::CausalMethod;
use crate::data::panel::TimeSeriesPanel;
use crate::data::synthetic::variable_name;
use crate::error::{CausalError, Result};

/// Ground truth of the synthetic chain `x0 -> x1 -> ... -> x{n-1}`
pub fn adjacency_from_chain(n_vars: usize) -> AdjacencyMatrix {
    chain_over((0..n_vars).map(variable_name).collect())
}

/// Chain ground truth over arbitrary labels, linking each to the next
pub fn chain_over(labels: Vec<String>) -> AdjacencyMatrix {
    AdjacencyMatrix::from_fn(labels, |i, j| j == i + 1)
}

/// Confusion counts and derived scores of one prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    /// Off-diagonal true negatives
    pub tn: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Compare a predicted adjacency with the ground truth.
///
/// Both matrices must be keyed by the same variables in the same order.
/// Precision, recall and F1 are 0.0 when their denominator is zero.
pub fn evaluate_adjacency(pred: &AdjacencyMatrix, truth: &AdjacencyMatrix) -> Result<Scores> {
    if !pred.same_labels(truth) {
        return Err(CausalError::ShapeMismatch(format!(
            "prediction over {:?} vs truth over {:?}",
            pred.labels(),
            truth.labels()
        )));
    }

    let (mut tp, mut fp, mut fn_, mut tn) = (0, 0, 0, 0);
    let n = pred.len();
    for i in 0..n {
        for j in 0..n {
            match (pred.get(i, j), truth.get(i, j)) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
                (false, false) if i != j => tn += 1,
                (false, false) => {}
            }
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Ok(Scores {
        precision,
        recall,
        f1,
        tp,
        fp,
        fn_,
        tn,
    })
}

/// One benchmark row
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkRecord {
    pub method: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tn: usize,
    pub runtime_sec: f64,
}

impl BenchmarkRecord {
    pub fn new(method: &str, scores: Scores, runtime_sec: f64) -> Self {
        Self {
            method: method.to_string(),
            precision: scores.precision,
            recall: scores.recall,
            f1: scores.f1,
            tp: scores.tp,
            fp: scores.fp,
            fn_: scores.fn_,
            tn: scores.tn,
            runtime_sec,
        }
    }
}

/// Time one method on a panel and score its adjacency
pub fn benchmark_method(
    method: &dyn CausalMethod,
    panel: &TimeSeriesPanel,
    truth: &AdjacencyMatrix,
    name: &str,
) -> Result<BenchmarkRecord> {
    let start = Instant::now();
    let discovery = method.discover(panel)?;
    let runtime_sec = start.elapsed().as_secs_f64();

    let scores = evaluate_adjacency(&discovery.adjacency, truth)?;
    info!(
        "[BENCH] {}: precision={:.3} recall={:.3} f1={:.3} ({:.3}s)",
        name, scores.precision, scores.recall, scores.f1, runtime_sec
    );
    Ok(BenchmarkRecord::new(name, scores, runtime_sec))
}

/// Write one CSV row per method
pub fn write_results_csv<P: AsRef<Path>>(records: &[BenchmarkRecord], path: P) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Results of a benchmark run
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub generated_at: DateTime<Utc>,
    pub n_vars: usize,
    pub n_samples: usize,
    pub records: Vec<BenchmarkRecord>,
}

impl BenchmarkReport {
    pub fn new(n_vars: usize, n_samples: usize, records: Vec<BenchmarkRecord>) -> Self {
        Self {
            generated_at: Utc::now(),
            n_vars,
            n_samples,
            records,
        }
    }

    /// Record with the highest F1, if any
    pub fn best(&self) -> Option<&BenchmarkRecord> {
        self.records
            .iter()
            .max_by(|a, b| a.f1.total_cmp(&b.f1))
    }

    /// Write the report as pretty JSON
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CausalError::Parse(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Print a summary of the results
    pub fn print_summary(&self) {
        println!("================================================================");
        println!("                    BENCHMARK RESULTS                          ");
        println!("================================================================");
        println!(" Generated:       {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!(" Variables:       {}", self.n_vars);
        println!(" Samples:         {}", self.n_samples);
        println!("----------------------------------------------------------------");
        println!(
            " {:<14} {:>6} {:>6} {:>6} {:>4} {:>4} {:>4} {:>4} {:>9}",
            "Method", "Prec", "Rec", "F1", "TP", "FP", "FN", "TN", "Time(s)"
        );
        for r in &self.records {
            println!(
                " {:<14} {:>6.3} {:>6.3} {:>6.3} {:>4} {:>4} {:>4} {:>4} {:>9.4}",
                r.method, r.precision, r.recall, r.f1, r.tp, r.fp, r.fn_, r.tn, r.runtime_sec
            );
        }
        if let Some(best) = self.best() {
            println!("----------------------------------------------------------------");
            println!(" Best F1:         {} ({:.3})", best.method, best.f1);
        }
        println!("================================================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::granger::GrangerTest;
    use crate::core::matrix::PValueMatrix;
    use crate::core::method::{Discovery, GrangerFdrMethod, PcmciMethod};
    use crate::core::stationarity::{make_stationary, StationarityStrategy};
    use crate::data::synthetic::make_synthetic_var;

    #[test]
    fn test_adjacency_from_chain() {
        let truth = adjacency_from_chain(4);
        assert_eq!(truth.labels(), &["x0", "x1", "x2", "x3"]);
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(truth.get(i, j), j == i + 1);
            }
        }
        assert_eq!(truth.edge_count(), 3);
    }

    #[test]
    fn test_perfect_prediction() {
        let truth = adjacency_from_chain(4);
        let s = evaluate_adjacency(&truth, &truth).unwrap();
        assert_eq!(s.precision, 1.0);
        assert_eq!(s.recall, 1.0);
        assert_eq!(s.f1, 1.0);
        assert_eq!((s.tp, s.fp, s.fn_, s.tn), (3, 0, 0, 9));
    }

    #[test]
    fn test_empty_prediction() {
        let truth = adjacency_from_chain(3);
        let pred = AdjacencyMatrix::filled(truth.labels().to_vec(), false);
        let s = evaluate_adjacency(&pred, &truth).unwrap();
        assert_eq!(s.precision, 0.0);
        assert_eq!(s.recall, 0.0);
        assert_eq!(s.f1, 0.0);
        assert_eq!(s.fn_, 2);
        assert_eq!(s.tn, 4);
    }

    #[test]
    fn test_mismatched_labels() {
        let a = adjacency_from_chain(3);
        let b = adjacency_from_chain(4);
        assert!(matches!(
            evaluate_adjacency(&a, &b),
            Err(CausalError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_chain_over_named_columns() {
        let raw = make_synthetic_var(3, 600, 2).unwrap();
        let named = TimeSeriesPanel::new(
            vec!["temp".to_string(), "load".to_string(), "price".to_string()],
            raw.columns().to_vec(),
        )
        .unwrap();
        let truth = chain_over(named.names().to_vec());
        assert!(truth.at("temp", "load").unwrap());
        assert!(truth.at("load", "price").unwrap());
        assert_eq!(truth.edge_count(), 2);

        let method = GrangerFdrMethod {
            max_lag: 3,
            alpha: 0.05,
            test: GrangerTest::SsrChi2,
        };
        let record = benchmark_method(&method, &named, &truth, "Granger+FDR").unwrap();
        assert_eq!(record.tp + record.fn_, 2);
        assert_eq!(record.tp + record.fp + record.fn_ + record.tn, 6);
    }

    #[test]
    fn test_benchmark_method_record() {
        let panel = make_synthetic_var(3, 50, 0).unwrap();
        let truth = adjacency_from_chain(3);
        let method = |p: &TimeSeriesPanel| -> Result<Discovery> {
            let pvals = PValueMatrix::filled(p.names().to_vec(), 0.5);
            let adj = pvals.threshold(0.05);
            Ok(Discovery::new(pvals, adj))
        };
        let record = benchmark_method(&method, &panel, &truth, "none").unwrap();
        assert_eq!(record.method, "none");
        assert!(record.runtime_sec >= 0.0);
        assert_eq!(record.recall, 0.0);
    }

    #[test]
    fn test_benchmark_on_synthetic_chain() {
        let raw = make_synthetic_var(4, 800, 0).unwrap();
        let panel = make_stationary(&raw, 2, StationarityStrategy::Both);
        let truth = adjacency_from_chain(4);

        let granger = GrangerFdrMethod {
            max_lag: 5,
            alpha: 0.05,
            test: GrangerTest::SsrChi2,
        };
        let pcmci = PcmciMethod {
            tau_max: 5,
            alpha: 0.05,
        };
        let records = vec![
            benchmark_method(&granger, &panel, &truth, "Granger+FDR").unwrap(),
            benchmark_method(&pcmci, &panel, &truth, "PCMCI").unwrap(),
        ];
        for r in &records {
            assert_eq!(r.tp + r.fn_, 3);
            assert!(r.recall > 0.5);
        }
    }

    #[test]
    fn test_report_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let truth = adjacency_from_chain(3);
        let scores = evaluate_adjacency(&truth, &truth).unwrap();
        let report = BenchmarkReport::new(
            3,
            100,
            vec![
                BenchmarkRecord::new("A", scores, 0.1),
                BenchmarkRecord::new("B", Scores { f1: 0.5, ..scores }, 0.2),
            ],
        );
        assert_eq!(report.best().unwrap().method, "A");

        let csv_path = dir.path().join("benchmark_results.csv");
        write_results_csv(&report.records, &csv_path).unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        assert!(text.starts_with("method,precision,recall,f1,tp,fp,fn,tn,runtime_sec"));
        assert_eq!(text.lines().count(), 3);

        let json_path = dir.path().join("benchmark_results.json");
        report.write_json(&json_path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value["records"][1]["method"], "B");
        assert!(value["generated_at"].is_string());
    }
}
