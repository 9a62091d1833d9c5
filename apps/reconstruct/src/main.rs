// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Roofer reconstruct - runs the full roof reconstruction on a synthetic
//! gable-roofed building and prints a JSON summary.
//!
//! Thresholds are read from `ROOFER_*` environment variables, see
//! [`config::Config`]. Set `ROOFER_VERBOSE=1` for per-plane logging or
//! `RUST_LOG` for full control.

use anyhow::Context;
use serde::Serialize;

mod config;
mod synthetic;

use config::Config;
use roofer_core::{PlaneId, RingKind};
use roofer_detection::{reconstruct, RoofType};
use synthetic::GableBuilding;

#[derive(Debug, Serialize)]
struct PlaneSummary {
    id: PlaneId,
    inliers: usize,
    slope: f64,
    rms: f64,
}

#[derive(Debug, Serialize)]
struct RingSummary {
    plane_id: PlaneId,
    kind: RingKind,
    vertices: usize,
    edges: usize,
}

#[derive(Debug, Serialize)]
struct Summary {
    points: usize,
    unassigned: usize,
    roof_type: RoofType,
    planes: Vec<PlaneSummary>,
    rings: Vec<RingSummary>,
    edge_count: usize,
    diagnostics: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.default_log_filter().into()),
        )
        .init();

    tracing::info!(
        alpha = config.alpha,
        plane_epsilon = config.plane_epsilon,
        plane_min_points = config.plane_min_points,
        line_epsilon = config.line_epsilon,
        worker_threads = config.worker_threads,
        "Starting roof reconstruction"
    );

    // Initialize rayon thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .build_global()
        .context("failed to initialize rayon thread pool")?;

    let cloud = GableBuilding::default()
        .generate(config.seed)
        .context("failed to build synthetic point cloud")?;

    let result = reconstruct(&cloud, &config.reconstruction()).context("reconstruction failed")?;

    let rings = result
        .lines
        .rings
        .iter()
        .map(|ring| RingSummary {
            plane_id: ring.plane_id,
            kind: ring.kind,
            vertices: result.alpha_shapes.rings[ring.ring_index].len(),
            edges: ring.edges.len(),
        })
        .collect();

    let summary = Summary {
        points: cloud.len(),
        unassigned: result.planes.unassigned_count(),
        roof_type: result.planes.roof_type,
        planes: result
            .planes
            .planes
            .iter()
            .map(|p| PlaneSummary {
                id: p.id,
                inliers: p.inlier_count(),
                slope: p.plane.slope(),
                rms: p.rms,
            })
            .collect(),
        rings,
        edge_count: result.edge_count(),
        diagnostics: result
            .diagnostics()
            .map(|d| format!("{} plane {}: {}", d.stage.as_str(), d.plane_id, d.message))
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
