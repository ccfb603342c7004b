//! Causal graph construction and SVG rendering
//!
//! Nodes sit on a circle in variable order, so the same adjacency always
//! produces the same picture.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::f64::consts::PI;
use std::fmt::Display;
use std::path::Path;

use crate::core::matrix::AdjacencyMatrix;
use crate::error::{CausalError, Result};

const WIDTH: u32 = 600;
const HEIGHT: u32 = 600;
const NODE_RADIUS: f64 = 26.0;
const ARROW_LENGTH: f64 = 12.0;
const ARROW_HALF_WIDTH: f64 = 5.0;
/// Sideways offset keeping `a -> b` and `b -> a` apart
const EDGE_OFFSET: f64 = 5.0;

const NODE_FILL: RGBColor = RGBColor(173, 216, 230);

/// Directed graph with one node per variable and an edge per true cell.
///
/// Variables without any edge are kept as isolated nodes.
pub fn build_graph_from_adjacency(adj: &AdjacencyMatrix) -> DiGraph<String, ()> {
    let mut graph = DiGraph::new();
    let nodes: Vec<NodeIndex> = adj
        .labels()
        .iter()
        .map(|label| graph.add_node(label.clone()))
        .collect();
    for (i, j, edge) in adj.off_diagonal() {
        if edge {
            graph.add_edge(nodes[i], nodes[j], ());
        }
    }
    graph
}

fn render_err<E: Display>(e: E) -> CausalError {
    CausalError::Render(e.to_string())
}

fn circular_layout(n: usize) -> Vec<(f64, f64)> {
    let cx = WIDTH as f64 / 2.0;
    let cy = HEIGHT as f64 / 2.0 + 15.0;
    let radius = (WIDTH.min(HEIGHT) as f64) * 0.34;
    (0..n)
        .map(|k| {
            let angle = -PI / 2.0 + 2.0 * PI * k as f64 / n.max(1) as f64;
            (cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

fn px(p: (f64, f64)) -> (i32, i32) {
    (p.0.round() as i32, p.1.round() as i32)
}

/// Render the graph to an SVG document
pub fn render_graph_svg(graph: &DiGraph<String, ()>, title: &str) -> Result<String> {
    let positions = circular_layout(graph.node_count());
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;
        root.draw(&Text::new(
            title.to_string(),
            ((WIDTH / 2) as i32, 24),
            TextStyle::from(("sans-serif", 22.0).into_font())
                .pos(Pos::new(HPos::Center, VPos::Center)),
        ))
        .map_err(render_err)?;

        for edge in graph.edge_references() {
            let (sx, sy) = positions[edge.source().index()];
            let (tx, ty) = positions[edge.target().index()];
            let len = ((tx - sx).powi(2) + (ty - sy).powi(2)).sqrt();
            if len <= 2.0 * NODE_RADIUS {
                continue;
            }
            let (ux, uy) = ((tx - sx) / len, (ty - sy) / len);
            let (ox, oy) = (-uy * EDGE_OFFSET, ux * EDGE_OFFSET);

            let start = (sx + ux * NODE_RADIUS + ox, sy + uy * NODE_RADIUS + oy);
            let tip = (tx - ux * NODE_RADIUS + ox, ty - uy * NODE_RADIUS + oy);
            let base = (tip.0 - ux * ARROW_LENGTH, tip.1 - uy * ARROW_LENGTH);
            let left = (base.0 - uy * ARROW_HALF_WIDTH, base.1 + ux * ARROW_HALF_WIDTH);
            let right = (base.0 + uy * ARROW_HALF_WIDTH, base.1 - ux * ARROW_HALF_WIDTH);

            root.draw(&PathElement::new(
                vec![px(start), px(base)],
                BLACK.stroke_width(2),
            ))
            .map_err(render_err)?;
            root.draw(&Polygon::new(
                vec![px(tip), px(left), px(right)],
                BLACK.filled(),
            ))
            .map_err(render_err)?;
        }

        for node in graph.node_indices() {
            let center = px(positions[node.index()]);
            root.draw(&Circle::new(center, NODE_RADIUS as i32, NODE_FILL.filled()))
                .map_err(render_err)?;
            root.draw(&Circle::new(center, NODE_RADIUS as i32, BLACK.stroke_width(1)))
                .map_err(render_err)?;
            root.draw(&Text::new(
                graph[node].clone(),
                center,
                TextStyle::from(("sans-serif", 16.0).into_font())
                    .pos(Pos::new(HPos::Center, VPos::Center)),
            ))
            .map_err(render_err)?;
        }

        root.present().map_err(render_err)?;
    }
    Ok(svg)
}

/// Render the graph and write it to `path`
pub fn plot_graph<P: AsRef<Path>>(graph: &DiGraph<String, ()>, title: &str, path: P) -> Result<()> {
    let svg = render_graph_svg(graph, title)?;
    std::fs::write(path, svg)?;
    Ok(())
}
