//! Regular raster grid: rows × cols nodes, row-major from the south-west
//! corner, with orthogonal and diagonal links.
//!
//! Link numbering:
//! ```text
//!   orthogonal, per row r:  horizontal links of r (west → east),
//!                           then vertical links leaving r (south → north)
//!   diagonal,  per cell:    SW → NE, then SE → NW
//! ```
//! Slot order at a node: `[E, N, W, S]`, diagonal slots `[NE, NW, SW, SE]`.
use super::fields::{FieldHost, FieldLocation, FieldSet};
use super::{GridTopology, IncidentLink, LinkDir, NodeLinks, NodeStatus};
use crate::error::{DiffuserError, Result};

const E: usize = 0;
const N: usize = 1;
const W: usize = 2;
const S: usize = 3;
const NE: usize = 0;
const NW: usize = 1;
const SW: usize = 2;
const SE: usize = 3;

#[derive(Default)]
struct LinkTable {
    ends: Vec<(usize, usize)>,
    lengths: Vec<f64>,
}

impl LinkTable {
    /// Append a link and register it in the `from` and `to` slots.
    fn push(&mut self, ends: (usize, usize), len: f64, slots: (usize, usize), at: &mut [NodeLinks]) {
        let link = self.ends.len();
        let (a, b) = ends;
        at[a][slots.0] = Some(IncidentLink { link, neighbor: b, dir: LinkDir::Outgoing });
        at[b][slots.1] = Some(IncidentLink { link, neighbor: a, dir: LinkDir::Incoming });
        self.ends.push(ends);
        self.lengths.push(len);
    }
}

#[derive(Debug, Clone)]
pub struct RasterGrid {
    rows: usize,
    cols: usize,
    /// Column spacing (x).
    dx: f64,
    /// Row spacing (y).
    dy: f64,
    status: Vec<NodeStatus>,
    /// `(from, to)` per link; diagonal links start at `n_links`.
    link_ends: Vec<(usize, usize)>,
    link_len: Vec<f64>,
    n_links: usize,
    links_at_node: Vec<NodeLinks>,
    diag_at_node: Vec<NodeLinks>,
    fields: FieldSet,
}

impl RasterGrid {
    /// Build a grid. The perimeter starts fixed-value, the interior core.
    pub fn new(rows: usize, cols: usize, dx: f64, dy: f64) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(DiffuserError::InvalidGrid(format!("{rows}×{cols} has no nodes")));
        }
        if !(dx.is_finite() && dx > 0.0 && dy.is_finite() && dy > 0.0) {
            return Err(DiffuserError::InvalidGrid(format!("spacing dx={dx}, dy={dy} must be finite and > 0")));
        }

        let n = rows * cols;
        let node = |r: usize, c: usize| r * cols + c;

        let mut links = LinkTable::default();
        let mut links_at_node: Vec<NodeLinks> = vec![[None; 4]; n];
        for r in 0..rows {
            for c in 0..cols - 1 {
                links.push((node(r, c), node(r, c + 1)), dx, (E, W), &mut links_at_node);
            }
            if r + 1 < rows {
                for c in 0..cols {
                    links.push((node(r, c), node(r + 1, c)), dy, (N, S), &mut links_at_node);
                }
            }
        }
        let n_links = links.ends.len();

        let diag = dx.hypot(dy);
        let mut diag_at_node: Vec<NodeLinks> = vec![[None; 4]; n];
        for r in 0..rows.saturating_sub(1) {
            for c in 0..cols - 1 {
                links.push((node(r, c), node(r + 1, c + 1)), diag, (NE, SW), &mut diag_at_node);
                links.push((node(r, c + 1), node(r + 1, c)), diag, (NW, SE), &mut diag_at_node);
            }
        }

        let mut status = vec![NodeStatus::Core; n];
        for r in 0..rows {
            for c in 0..cols {
                if r == 0 || c == 0 || r == rows - 1 || c == cols - 1 {
                    status[node(r, c)] = NodeStatus::FixedValue;
                }
            }
        }

        Ok(Self {
            rows,
            cols,
            dx,
            dy,
            status,
            link_ends: links.ends,
            link_len: links.lengths,
            n_links,
            links_at_node,
            diag_at_node,
            fields: FieldSet::new(n, n_links),
        })
    }

    /// Unit-spaced grid.
    pub fn unit(rows: usize, cols: usize) -> Result<Self> {
        Self::new(rows, cols, 1.0, 1.0)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn spacing(&self) -> (f64, f64) {
        (self.dx, self.dy)
    }

    #[inline]
    pub fn node_at(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    #[inline]
    pub fn row_col(&self, node: usize) -> (usize, usize) {
        (node / self.cols, node % self.cols)
    }

    pub fn x_of_node(&self, node: usize) -> f64 {
        (node % self.cols) as f64 * self.dx
    }

    pub fn y_of_node(&self, node: usize) -> f64 {
        (node / self.cols) as f64 * self.dy
    }

    pub fn set_status(&mut self, node: usize, status: NodeStatus) {
        self.status[node] = status;
    }

    /// Close whole grid edges. A corner closes if either edge through it does.
    pub fn set_closed_boundaries(&mut self, east: bool, north: bool, west: bool, south: bool) {
        for r in 0..self.rows {
            for c in 0..self.cols {
                let close = (east && c == self.cols - 1)
                    || (north && r == self.rows - 1)
                    || (west && c == 0)
                    || (south && r == 0);
                if close {
                    let i = self.node_at(r, c);
                    self.status[i] = NodeStatus::Closed;
                }
            }
        }
    }

    pub fn core_nodes(&self) -> Vec<usize> {
        (0..self.status.len()).filter(|&i| self.status[i].is_core()).collect()
    }

    pub fn open_boundary_nodes(&self) -> Vec<usize> {
        (0..self.status.len()).filter(|&i| self.status[i].is_open_boundary()).collect()
    }

    /// Shorthand for inserting a node field.
    pub fn add_node_field(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        self.fields.add_field(FieldLocation::Node, name, values)
    }
}

impl GridTopology for RasterGrid {
    fn number_of_nodes(&self) -> usize {
        self.rows * self.cols
    }

    fn shape(&self) -> Option<(usize, usize)> {
        Some((self.rows, self.cols))
    }

    fn number_of_links(&self) -> usize {
        self.n_links
    }

    fn number_of_diagonal_links(&self) -> usize {
        self.link_ends.len() - self.n_links
    }

    fn node_status(&self, node: usize) -> NodeStatus {
        self.status[node]
    }

    fn link_nodes(&self, link: usize) -> (usize, usize) {
        self.link_ends[link]
    }

    fn link_length(&self, link: usize) -> f64 {
        self.link_len[link]
    }

    fn links_at_node(&self, node: usize) -> NodeLinks {
        self.links_at_node[node]
    }

    fn diagonal_links_at_node(&self, node: usize) -> NodeLinks {
        self.diag_at_node[node]
    }

    fn cell_area_at_node(&self, _node: usize) -> f64 {
        let (dx, dy) = self.spacing();
        dx * dy
    }
}

impl FieldHost for RasterGrid {
    fn fields(&self) -> &FieldSet {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut FieldSet {
        &mut self.fields
    }
}
