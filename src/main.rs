//! Temporal Causality Engine - command line
//!
//! Discovers lagged causal links in multivariate time series:
//! - Stationarity enforcement before every discovery run
//! - Granger (raw or FDR-corrected) and PCMCI
//! - Benchmark against the synthetic chain ground truth

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use temporal_causality::benchmark::{
    benchmark_method, chain_over, write_results_csv, BenchmarkReport,
};
use temporal_causality::config::Config;
use temporal_causality::core::granger::GrangerTest;
use temporal_causality::core::method::{Discovery, MethodKind, MethodSettings};
use temporal_causality::core::stationarity::{make_stationary_with_report, StationarityStrategy};
use temporal_causality::data::{make_synthetic_var, TimeSeriesPanel};
use temporal_causality::viz::{build_graph_from_adjacency, plot_graph};

const SEP: &str = "===========================================================";

#[derive(Parser, Debug)]
#[command(name = "temporal-causality")]
#[command(about = "Causal discovery for multivariate time series")]
struct Cli {
    /// Configuration file; defaults apply if it does not exist
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Input CSV (header of variable names); synthetic data if absent
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    /// Directory for result files
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    n_vars: Option<usize>,

    #[arg(long, global = true)]
    n_samples: Option<usize>,

    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Significance level for every method
    #[arg(long, global = true)]
    alpha: Option<f64>,

    /// Force debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pairwise Granger with a raw p < alpha threshold
    Granger {
        #[arg(long)]
        max_lag: Option<usize>,
        /// ssr_ftest | ssr_chi2test | lrtest | params_ftest
        #[arg(long)]
        test: Option<GrangerTest>,
    },
    /// Pairwise Granger with Benjamini-Hochberg correction
    GrangerFdr {
        #[arg(long)]
        max_lag: Option<usize>,
        #[arg(long)]
        test: Option<GrangerTest>,
    },
    /// PCMCI with partial-correlation tests
    Pcmci {
        #[arg(long)]
        tau_max: Option<usize>,
    },
    /// Score methods against the synthetic chain
    Benchmark {
        /// Comma-separated methods (granger, granger-fdr, pcmci)
        #[arg(long, value_delimiter = ',', default_value = "granger,granger-fdr,pcmci")]
        methods: Vec<MethodKind>,
    },
    /// Report stationarity per variable and write the stationary panel
    Stationarity {
        #[arg(long)]
        max_diff: Option<usize>,
        /// adf | kpss | auto
        #[arg(long)]
        strategy: Option<StationarityStrategy>,
    },
}

/// Fold command-line overrides into the loaded configuration
fn apply_overrides(cfg: &mut Config, cli: &Cli) {
    if let Some(dir) = &cli.output_dir {
        cfg.output.dir = dir.display().to_string();
    }
    if let Some(n) = cli.n_vars {
        cfg.data.n_vars = n;
    }
    if let Some(n) = cli.n_samples {
        cfg.data.n_samples = n;
    }
    if let Some(seed) = cli.seed {
        cfg.data.seed = seed;
    }
    if let Some(alpha) = cli.alpha {
        cfg.granger.alpha = alpha;
        cfg.pcmci.alpha = alpha;
    }

    match &cli.command {
        Command::Granger { max_lag, test } | Command::GrangerFdr { max_lag, test } => {
            if let Some(lag) = max_lag {
                cfg.granger.max_lag = *lag;
            }
            if let Some(test) = test {
                cfg.granger.test = *test;
            }
        }
        Command::Pcmci { tau_max } => {
            if let Some(tau) = tau_max {
                cfg.pcmci.tau_max = *tau;
            }
        }
        Command::Stationarity { max_diff, strategy } => {
            if let Some(d) = max_diff {
                cfg.stationarity.max_diff = *d;
            }
            if let Some(s) = strategy {
                cfg.stationarity.strategy = *s;
            }
        }
        Command::Benchmark { .. } => {}
    }
}

fn init_logging(cfg: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        cfg.system.log_level.parse::<Level>().unwrap_or(Level::INFO)
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_panel(cfg: &Config, input: Option<&Path>) -> Result<TimeSeriesPanel> {
    match input {
        Some(path) => {
            info!("Loading {}", path.display());
            TimeSeriesPanel::from_csv(path).with_context(|| format!("reading {}", path.display()))
        }
        None => {
            info!(
                "Generating synthetic VAR chain: {} variables x {} samples (seed {})",
                cfg.data.n_vars, cfg.data.n_samples, cfg.data.seed
            );
            Ok(make_synthetic_var(cfg.data.n_vars, cfg.data.n_samples, cfg.data.seed)?)
        }
    }
}

fn stationary_panel(cfg: &Config, raw: &TimeSeriesPanel) -> TimeSeriesPanel {
    let (panel, _) =
        make_stationary_with_report(raw, cfg.stationarity.max_diff, cfg.stationarity.strategy);
    info!(
        "Stationary panel: {} rows (from {})",
        panel.n_rows(),
        raw.n_rows()
    );
    panel
}

fn settings_for(cfg: &Config, kind: MethodKind) -> MethodSettings {
    let alpha = match kind {
        MethodKind::Pcmci => cfg.pcmci.alpha,
        MethodKind::Granger | MethodKind::GrangerFdr => cfg.granger.alpha,
    };
    cfg.method_settings(alpha)
}

fn write_discovery(kind: MethodKind, discovery: &Discovery, dir: &Path) -> Result<()> {
    let stem = kind.file_stem();
    discovery
        .p_values
        .write_csv(dir.join(format!("{}_pvalues.csv", stem)))?;
    discovery
        .adjacency
        .write_csv(dir.join(format!("{}_adj.csv", stem)))?;
    if let Some(lags) = &discovery.lags {
        lags.write_csv(dir.join(format!("{}_lags.csv", stem)))?;
    }
    let graph = build_graph_from_adjacency(&discovery.adjacency);
    plot_graph(&graph, kind.graph_title(), dir.join(format!("{}_graph.svg", stem)))?;
    info!("Results written to {}/{}_*", dir.display(), stem);
    Ok(())
}

fn run_discovery(cfg: &Config, kind: MethodKind, input: Option<&Path>, dir: &Path) -> Result<()> {
    let raw = load_panel(cfg, input)?;
    let panel = stationary_panel(cfg, &raw);
    let method = kind.build(&settings_for(cfg, kind));
    let discovery = method
        .discover(&panel)
        .with_context(|| format!("{} failed", kind.label()))?;

    println!("\n{} adjacency:\n{}", kind.label(), discovery.adjacency);
    if discovery.is_empty_graph() {
        warn!("No significant causal links at this alpha");
    }
    for failure in &discovery.failures {
        warn!(
            "Untested pair {} -> {}: {}",
            failure.cause, failure.effect, failure.reason
        );
    }

    write_discovery(kind, &discovery, dir)
}

fn run_benchmark(cfg: &Config, methods: &[MethodKind], input: Option<&Path>, dir: &Path) -> Result<()> {
    let raw = load_panel(cfg, input)?;
    let panel = stationary_panel(cfg, &raw);
    let truth = chain_over(panel.names().to_vec());

    let mut records = Vec::with_capacity(methods.len());
    for &kind in methods {
        let method = kind.build(&settings_for(cfg, kind));
        records.push(benchmark_method(method.as_ref(), &panel, &truth, method.name())?);
    }

    let report = BenchmarkReport::new(raw.n_vars(), raw.n_rows(), records);
    report.print_summary();
    write_results_csv(&report.records, dir.join("benchmark_results.csv"))?;
    report.write_json(dir.join("benchmark_results.json"))?;
    info!("Benchmark written to {}", dir.display());
    Ok(())
}

fn run_stationarity(cfg: &Config, input: Option<&Path>, dir: &Path) -> Result<()> {
    let raw = load_panel(cfg, input)?;
    let (panel, reports) =
        make_stationary_with_report(&raw, cfg.stationarity.max_diff, cfg.stationarity.strategy);

    println!("{}", SEP);
    println!(
        " {:<12} {:>6} {:>6} {:>6} {:>11}",
        "Variable", "Diffs", "ADF", "KPSS", "Stationary"
    );
    for r in &reports {
        println!(
            " {:<12} {:>6} {:>6} {:>6} {:>11}",
            r.variable, r.differences, r.adf_stationary, r.kpss_stationary, r.stationary
        );
    }
    println!("{}", SEP);
    println!(" Rows: {} -> {}", raw.n_rows(), panel.n_rows());

    panel.write_csv(dir.join("stationary.csv"))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::load_or_default(&cli.config)?;
    apply_overrides(&mut cfg, &cli);
    cfg.validate()?;

    init_logging(&cfg, cli.verbose)?;

    info!("{}", SEP);
    info!("  {} - Temporal Causality Engine", cfg.system.name);
    info!("{}", SEP);

    let dir = PathBuf::from(&cfg.output.dir);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let input = cli.input.as_deref();

    match &cli.command {
        Command::Granger { .. } => run_discovery(&cfg, MethodKind::Granger, input, &dir),
        Command::GrangerFdr { .. } => run_discovery(&cfg, MethodKind::GrangerFdr, input, &dir),
        Command::Pcmci { .. } => run_discovery(&cfg, MethodKind::Pcmci, input, &dir),
        Command::Benchmark { methods } => run_benchmark(&cfg, methods, input, &dir),
        Command::Stationarity { .. } => run_stationarity(&cfg, input, &dir),
    }
}
