//! Command-line driver for the discharge diffuser.
//!
//! `run` solves one surface, `batch` solves a directory of surfaces in
//! parallel, `synth` writes a synthetic fan surface to play with.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fanflow_core::grid::fields::WATER_DISCHARGE_IN;
use fanflow_core::surface::Surface;
use fanflow_core::{DiffuserConfig, DischargeDiffuser, FieldHost, FieldLocation, RoutingMethod, SolveReport};
use rayon::prelude::*;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "diffuse", about = "Route water and sediment across a raster surface by potential-field diffusion")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve a single surface.
    Run {
        /// Surface JSON (rows, cols, elevation, optional influx fields).
        #[arg(short, long)]
        input: PathBuf,

        /// Diffuser configuration JSON; defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Routing override: D4 or D8.
        #[arg(short, long)]
        routing: Option<RoutingMethod>,

        /// Output JSON; printed to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Solve every *.json surface in a directory.
    Batch {
        #[arg(short, long)]
        dir: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        routing: Option<RoutingMethod>,
    },
    /// Write a synthetic alluvial fan surface.
    Synth {
        #[arg(long, default_value_t = 64)]
        rows: usize,

        #[arg(long, default_value_t = 64)]
        cols: usize,

        /// Node spacing in metres.
        #[arg(long, default_value_t = 10.0)]
        spacing: f64,

        #[arg(short, long, default_value_t = 42)]
        seed: u32,

        #[arg(short, long, default_value = "fan.json")]
        output: PathBuf,
    },
}

// ── Output types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Solution {
    iterations: usize,
    mismatch: f64,
    max_mass_balance_error: Option<f64>,
    flow_potential: Vec<f64>,
    surface_water_discharge: Vec<f64>,
    link_water_discharge: Vec<f64>,
    link_sediment_discharge: Vec<f64>,
    sediment_deposition_rate: Vec<f64>,
    staged_elevation: Vec<f64>,
}

struct BatchRow {
    file: String,
    iterations: usize,
    delivered: f64,
    total_influx: f64,
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    match args.command {
        Command::Run { input, config, routing, output } => {
            let cfg = load_config(config.as_deref(), routing)?;
            let surface = read_surface(&input)?;
            let solution = solve_surface(&surface, cfg).with_context(|| format!("solving {}", input.display()))?;
            let json = serde_json::to_string_pretty(&solution)?;
            match output {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), iterations = solution.iterations, "wrote solution");
                }
                None => println!("{json}"),
            }
        }
        Command::Batch { dir, config, routing } => {
            let cfg = load_config(config.as_deref(), routing)?;
            run_batch(&dir, &cfg)?;
        }
        Command::Synth { rows, cols, spacing, seed, output } => {
            let surface = Surface::synthetic_fan(rows, cols, spacing, seed)?;
            fs::write(&output, serde_json::to_string(&surface)?)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(rows, cols, seed, path = %output.display(), "wrote synthetic fan");
        }
    }
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>, routing: Option<RoutingMethod>) -> Result<DiffuserConfig> {
    let mut cfg = match path {
        Some(p) => {
            let text = fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            DiffuserConfig::from_json(&text).with_context(|| format!("parsing {}", p.display()))?
        }
        None => DiffuserConfig::default(),
    };
    if let Some(r) = routing {
        cfg = cfg.with_routing(r);
    }
    Ok(cfg)
}

fn read_surface(path: &Path) -> Result<Surface> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn solve_surface(surface: &Surface, cfg: DiffuserConfig) -> Result<Solution> {
    let mut grid = surface.to_grid()?;
    let mut diffuser = DischargeDiffuser::new(&grid, cfg)?;
    let SolveReport { iterations, mismatch, .. } = diffuser.run_one_step(&mut grid)?;

    let water_in = grid.fields().get(FieldLocation::Node, WATER_DISCHARGE_IN).map(<[f64]>::to_vec).unwrap_or_default();

    Ok(Solution {
        iterations,
        mismatch,
        max_mass_balance_error: diffuser.max_mass_balance_error(&water_in),
        flow_potential: diffuser.potential().to_vec(),
        surface_water_discharge: diffuser.discharges_at_nodes().to_vec(),
        link_water_discharge: diffuser.discharges_at_links().to_vec(),
        link_sediment_discharge: diffuser.sediment_discharges_at_links().to_vec(),
        sediment_deposition_rate: diffuser.deposition_at_nodes().to_vec(),
        staged_elevation: diffuser.staged_elevation().to_vec(),
    })
}

fn run_batch(dir: &Path, cfg: &DiffuserConfig) -> Result<()> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|x| x == "json"))
        .collect();
    files.sort();
    if files.is_empty() {
        bail!("no *.json surfaces in {}", dir.display());
    }
    info!(count = files.len(), dir = %dir.display(), "solving batch");

    let rows: Vec<Result<BatchRow>> = files
        .par_iter()
        .map(|path| {
            let surface = read_surface(path)?;
            let solution = solve_surface(&surface, cfg.clone())?;
            let total_influx = surface
                .water_in
                .as_ref()
                .map(|q| q.iter().sum())
                .unwrap_or_else(|| ((surface.rows - 2) * (surface.cols - 2)) as f64);
            let delivered = surface_delivery(&surface, &solution)?;
            Ok(BatchRow {
                file: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
                iterations: solution.iterations,
                delivered,
                total_influx,
            })
        })
        .collect();

    let mut failed = 0usize;
    for (path, row) in files.iter().zip(rows) {
        match row {
            Ok(r) => println!(
                "{:<32} {:>6} iters  delivered {:>12.4} / {:>12.4}",
                r.file, r.iterations, r.delivered, r.total_influx
            ),
            Err(e) => {
                failed += 1;
                warn!(path = %path.display(), error = %format!("{e:#}"), "surface failed");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} surfaces failed", files.len());
    }
    Ok(())
}

/// Discharge leaving through the open perimeter.
fn surface_delivery(surface: &Surface, solution: &Solution) -> Result<f64> {
    let grid = surface.to_grid()?;
    Ok(grid
        .open_boundary_nodes()
        .into_iter()
        .map(|i| solution.surface_water_discharge[i])
        .sum())
}
