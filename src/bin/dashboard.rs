//! Web Dashboard - interactive causal discovery on synthetic data
//!
//! Sliders pick the number of variables, the sample count and alpha;
//! the selected method runs on a fresh synthetic chain per request.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use temporal_causality::config::Config;
use temporal_causality::core::method::{Discovery, MethodKind};
use temporal_causality::core::stationarity::make_stationary;
use temporal_causality::data::make_synthetic_var;
use temporal_causality::viz::{build_graph_from_adjacency, render_graph_svg};

const N_VARS_RANGE: (usize, usize) = (3, 6);
const N_SAMPLES_RANGE: (usize, usize) = (300, 1500);
const ALPHA_RANGE: (f64, f64) = (0.01, 0.20);
const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Deserialize)]
struct DiscoverParams {
    #[serde(default = "default_n_vars")]
    n_vars: usize,
    #[serde(default = "default_n_samples")]
    n_samples: usize,
    #[serde(default = "default_alpha")]
    alpha: f64,
    #[serde(default = "default_method")]
    method: String,
}

fn default_n_vars() -> usize {
    4
}

fn default_n_samples() -> usize {
    800
}

fn default_alpha() -> f64 {
    0.05
}

fn default_method() -> String {
    "granger-fdr".to_string()
}

impl DiscoverParams {
    fn validate(&self) -> Result<MethodKind, String> {
        if self.n_vars < N_VARS_RANGE.0 || self.n_vars > N_VARS_RANGE.1 {
            return Err(format!(
                "n_vars must be between {} and {}",
                N_VARS_RANGE.0, N_VARS_RANGE.1
            ));
        }
        if self.n_samples < N_SAMPLES_RANGE.0 || self.n_samples > N_SAMPLES_RANGE.1 {
            return Err(format!(
                "n_samples must be between {} and {}",
                N_SAMPLES_RANGE.0, N_SAMPLES_RANGE.1
            ));
        }
        if !(self.alpha >= ALPHA_RANGE.0 - 1e-9 && self.alpha <= ALPHA_RANGE.1 + 1e-9) {
            return Err(format!(
                "alpha must be between {} and {}",
                ALPHA_RANGE.0, ALPHA_RANGE.1
            ));
        }
        self.method.parse::<MethodKind>()
    }
}

#[derive(Serialize)]
struct Edge {
    cause: String,
    effect: String,
}

#[derive(Serialize)]
struct DiscoverResponse {
    method: String,
    variables: Vec<String>,
    preview: Vec<Vec<f64>>,
    adjacency: Vec<Vec<u8>>,
    edges: Vec<Edge>,
    warning: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Shared, read-only settings
struct AppState {
    config: Config,
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message })).into_response()
}

fn internal_error(message: String) -> Response {
    error!("[DASHBOARD] {}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: message })).into_response()
}

/// Generate, make stationary and discover on a blocking worker
async fn compute(
    state: Arc<AppState>,
    params: DiscoverParams,
) -> Result<(MethodKind, Vec<Vec<f64>>, Discovery), Response> {
    let kind = params.validate().map_err(bad_request)?;

    let joined = tokio::task::spawn_blocking(move || {
        let cfg = &state.config;
        let raw = make_synthetic_var(params.n_vars, params.n_samples, cfg.data.seed)?;
        let panel = make_stationary(&raw, cfg.stationarity.max_diff, cfg.stationarity.strategy);
        let preview: Vec<Vec<f64>> =
            (0..PREVIEW_ROWS.min(panel.n_rows())).map(|t| panel.row(t)).collect();
        let method = kind.build(&cfg.method_settings(params.alpha));
        let discovery = method.discover(&panel)?;
        Ok::<_, temporal_causality::CausalError>((preview, discovery))
    })
    .await;

    match joined {
        Ok(Ok((preview, discovery))) => Ok((kind, preview, discovery)),
        Ok(Err(e)) => Err(internal_error(e.to_string())),
        Err(e) => Err(internal_error(format!("worker failed: {}", e))),
    }
}

/// JSON body for one discovery run
fn discover_response(
    kind: MethodKind,
    preview: Vec<Vec<f64>>,
    discovery: &Discovery,
) -> DiscoverResponse {
    let indicator = discovery.adjacency.to_indicator();
    let n = indicator.len();
    let adjacency: Vec<Vec<u8>> = (0..n)
        .map(|i| (0..n).map(|j| indicator.get(i, j)).collect())
        .collect();
    let edges: Vec<Edge> = discovery
        .adjacency
        .edges()
        .into_iter()
        .map(|(cause, effect)| Edge {
            cause: cause.to_string(),
            effect: effect.to_string(),
        })
        .collect();
    let warning = discovery
        .is_empty_graph()
        .then(|| "No significant causal links at this alpha".to_string());

    DiscoverResponse {
        method: kind.label().to_string(),
        variables: discovery.adjacency.labels().to_vec(),
        preview,
        adjacency,
        edges,
        warning,
    }
}

async fn api_discover(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DiscoverParams>,
) -> Response {
    let (kind, preview, discovery) = match compute(state, params).await {
        Ok(result) => result,
        Err(response) => return response,
    };

    info!(
        "[DASHBOARD] {}: {} edges",
        kind.label(),
        discovery.edge_count()
    );

    Json(discover_response(kind, preview, &discovery)).into_response()
}

async fn api_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DiscoverParams>,
) -> Response {
    let (kind, _, discovery) = match compute(state, params).await {
        Ok(result) => result,
        Err(response) => return response,
    };
    let graph = build_graph_from_adjacency(&discovery.adjacency);
    match render_graph_svg(&graph, kind.graph_title()) {
        Ok(svg) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn index() -> Html<String> {
    let html = r#"
<!DOCTYPE html>
<html>
<head>
    <title>Temporal Causality Engine</title>
    <style>
        body {
            font-family: 'Courier New', monospace;
            background: #0a0a0a;
            color: #00ff00;
            padding: 40px;
            max-width: 900px;
            margin: 0 auto;
        }
        h1 { border-bottom: 2px solid #00ff00; padding-bottom: 10px; }
        .card {
            background: #111;
            border: 1px solid #00ff00;
            padding: 20px;
            margin: 20px 0;
            border-radius: 4px;
        }
        .stat { display: flex; justify-content: space-between; padding: 8px 0; }
        .label { color: #888; }
        .warning { color: #ffff00; }
        table { border-collapse: collapse; }
        td, th { border: 1px solid #333; padding: 4px 10px; text-align: right; }
        #graph { background: #fff; }
    </style>
</head>
<body>
    <h1>TEMPORAL CAUSALITY ENGINE</h1>
    <p>Granger vs PCMCI on a synthetic VAR chain</p>

    <div class="card">
        <h3>Parameters</h3>
        <div class="stat"><span class="label">Variables: <b id="n_vars_v">4</b></span>
            <input type="range" id="n_vars" min="3" max="6" value="4"></div>
        <div class="stat"><span class="label">Samples: <b id="n_samples_v">800</b></span>
            <input type="range" id="n_samples" min="300" max="1500" step="100" value="800"></div>
        <div class="stat"><span class="label">Alpha: <b id="alpha_v">0.05</b></span>
            <input type="range" id="alpha" min="0.01" max="0.20" step="0.01" value="0.05"></div>
        <div class="stat"><span class="label">Method:</span>
            <select id="method">
                <option value="granger">Granger (raw)</option>
                <option value="granger-fdr" selected>Granger + FDR</option>
                <option value="pcmci">PCMCI</option>
            </select></div>
        <button onclick="run()">Run</button>
    </div>

    <div class="card"><h3>Data preview</h3><div id="preview"></div></div>
    <div class="card"><h3>Adjacency</h3><div id="adjacency"></div>
        <p class="warning" id="warning"></p></div>
    <div class="card"><h3>Causal graph</h3><img id="graph" alt="graph"></div>

    <script>
        ['n_vars', 'n_samples', 'alpha'].forEach(id => {
            const el = document.getElementById(id);
            el.oninput = () => document.getElementById(id + '_v').textContent = el.value;
        });

        function table(header, rows) {
            let html = '<table><tr><th></th>' + header.map(h => '<th>' + h + '</th>').join('') + '</tr>';
            rows.forEach(r => {
                html += '<tr><th>' + r[0] + '</th>' + r.slice(1).map(v => '<td>' + v + '</td>').join('') + '</tr>';
            });
            return html + '</table>';
        }

        async function run() {
            const q = new URLSearchParams({
                n_vars: document.getElementById('n_vars').value,
                n_samples: document.getElementById('n_samples').value,
                alpha: document.getElementById('alpha').value,
                method: document.getElementById('method').value,
            });
            try {
                const resp = await fetch('/api/discover?' + q);
                const data = await resp.json();
                if (!resp.ok) {
                    document.getElementById('warning').textContent = data.error;
                    return;
                }
                document.getElementById('preview').innerHTML = table(
                    data.variables,
                    data.preview.map((row, t) => [t].concat(row.map(v => v.toFixed(3)))));
                document.getElementById('adjacency').innerHTML = table(
                    data.variables,
                    data.adjacency.map((row, i) => [data.variables[i]].concat(row)));
                document.getElementById('warning').textContent = data.warning || '';
                document.getElementById('graph').src = '/api/graph.svg?' + q;
            } catch (e) {
                console.error('Failed to run discovery:', e);
            }
        }

        run();
    </script>
</body>
</html>
"#;
    Html(html.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_or_default("config.toml")?;
    config.validate()?;

    let level = config.system.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("============================================================");
    println!("  TEMPORAL CAUSALITY - Web Dashboard");
    println!("============================================================");

    let addr: SocketAddr = format!("{}:{}", config.dashboard.bind, config.dashboard.port).parse()?;
    let state = Arc::new(AppState { config });

    let app = Router::new()
        .route("/", get(index))
        .route("/api/discover", get(api_discover))
        .route("/api/graph.svg", get(api_graph))
        .with_state(state);

    println!("Dashboard running at http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
