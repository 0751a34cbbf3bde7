//! Serialisable raster surfaces and a synthetic alluvial-fan generator.
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::error::{DiffuserError, Result};
use crate::grid::fields::{SEDIMENT_DISCHARGE_IN, TOPOGRAPHIC_ELEVATION, WATER_DISCHARGE_IN};
use crate::grid::{GridTopology, RasterGrid};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosedEdges {
    pub east: bool,
    pub north: bool,
    pub west: bool,
    pub south: bool,
}

/// Row-major node values, south row first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Surface {
    pub rows: usize,
    pub cols: usize,
    #[serde(default = "unit_spacing")]
    pub dx: f64,
    #[serde(default = "unit_spacing")]
    pub dy: f64,
    pub elevation: Vec<f64>,
    /// Missing: one unit of water at every core node.
    #[serde(default)]
    pub water_in: Option<Vec<f64>>,
    /// Missing: zero.
    #[serde(default)]
    pub sediment_in: Option<Vec<f64>>,
    #[serde(default)]
    pub closed_edges: ClosedEdges,
}

fn unit_spacing() -> f64 {
    1.0
}

impl Surface {
    /// Build a grid with boundary conditions and the three input fields set.
    pub fn to_grid(&self) -> Result<RasterGrid> {
        let mut grid = RasterGrid::new(self.rows, self.cols, self.dx, self.dy)?;
        let e = self.closed_edges;
        grid.set_closed_boundaries(e.east, e.north, e.west, e.south);

        let n = grid.number_of_nodes();
        let water = match &self.water_in {
            Some(q) => q.clone(),
            None => {
                let mut q = vec![0.0; n];
                for i in grid.core_nodes() {
                    q[i] = 1.0;
                }
                q
            }
        };
        let sediment = self.sediment_in.clone().unwrap_or_else(|| vec![0.0; n]);

        grid.add_node_field(TOPOGRAPHIC_ELEVATION, self.elevation.clone())?;
        grid.add_node_field(WATER_DISCHARGE_IN, water)?;
        grid.add_node_field(SEDIMENT_DISCHARGE_IN, sediment)?;
        Ok(grid)
    }

    /// Cone-shaped fan whose apex sits on the middle of the north edge,
    /// roughened with fBm. North, east and west edges are closed so the fan
    /// drains south. Water and sediment enter at the apex.
    pub fn synthetic_fan(rows: usize, cols: usize, spacing: f64, seed: u32) -> Result<Self> {
        if rows < 3 || cols < 3 {
            return Err(DiffuserError::GridTooSmall { rows, cols });
        }
        let relief = 0.05 * rows as f64 * spacing;
        let roughness = FanRoughness::new(seed, 0.75, 6, 0.02 * relief, 4.0 / rows.max(cols) as f64);

        let apex = ((rows - 1) as f64, (cols / 2) as f64);
        let reach = ((rows - 1) as f64).hypot((cols / 2) as f64);
        let mut elevation = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let dist = (r as f64 - apex.0).hypot(c as f64 - apex.1);
                let cone = relief * (1.0 - dist / reach);
                elevation.push(cone + roughness.at(r, c));
            }
        }

        let source = (rows - 2) * cols + cols / 2;
        let mut water_in = vec![0.0; rows * cols];
        water_in[source] = 100.0;
        let mut sediment_in = vec![0.0; rows * cols];
        sediment_in[source] = 10.0;

        Ok(Self {
            rows,
            cols,
            dx: spacing,
            dy: spacing,
            elevation,
            water_in: Some(water_in),
            sediment_in: Some(sediment_in),
            closed_edges: ClosedEdges { east: true, north: true, west: true, south: false },
        })
    }
}

/// Surface roughness laid over the fan cone: fractional Brownian motion over
/// Perlin noise, evaluated directly at raster nodes.
///
/// Octave `i` has amplitude `gain^i` and frequency `2^i`, with persistence
/// `gain = 2^(−H)`. H near 1 gives smooth lobes; lower H roughens the
/// surface and breaks flow into more threads.
struct FanRoughness {
    /// Elevation scale of the first octave.
    amplitude: f64,
    /// Noise-space frequency per node step.
    base_freq: f64,
    gain: f64,
    octaves: u32,
    noise: Perlin,
}

impl FanRoughness {
    fn new(seed: u32, hurst: f64, octaves: u32, amplitude: f64, base_freq: f64) -> Self {
        Self { amplitude, base_freq, gain: 2f64.powf(-hurst), octaves, noise: Perlin::new(seed) }
    }

    /// Elevation offset at node `(row, col)`, roughly ±`amplitude`.
    fn at(&self, row: usize, col: usize) -> f64 {
        let (x, y) = (col as f64 * self.base_freq, row as f64 * self.base_freq);
        let mut value = 0.0;
        let mut amp = 1.0;
        let mut freq = 1.0;
        for _ in 0..self.octaves {
            value += amp * self.noise.get([x * freq, y * freq]);
            amp *= self.gain;
            freq *= 2.0;
        }
        self.amplitude * value
    }
}
