//! Grid topology seen by the discharge solver.
//!
//! Nodes and links are plain integer ids. Per-node adjacency is a fixed
//! four-slot array; a `None` slot is a missing neighbour (grid edge).
//! Diagonal links, when a grid has them, are numbered after every orthogonal
//! link so one flat array can hold values for both.
pub mod fields;
pub mod raster;

use serde::{Deserialize, Serialize};

pub use fields::{FieldHost, FieldLocation, FieldSet};
pub use raster::RasterGrid;

/// Boundary classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    Core,
    FixedValue,
    FixedGradient,
    Closed,
}

impl NodeStatus {
    #[inline]
    pub fn is_core(self) -> bool {
        self == Self::Core
    }

    #[inline]
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }

    /// Fixed-value or fixed-gradient: a boundary that can take outflow.
    #[inline]
    pub fn is_open_boundary(self) -> bool {
        matches!(self, Self::FixedValue | Self::FixedGradient)
    }
}

/// Which end of a link a node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDir {
    /// The node is the link's `from` end.
    Outgoing,
    /// The node is the link's `to` end.
    Incoming,
}

impl LinkDir {
    /// Turns a link gradient (from − to) into "downhill away from this node".
    #[inline]
    pub fn orient(self, gradient: f64) -> f64 {
        match self {
            Self::Outgoing => gradient,
            Self::Incoming => -gradient,
        }
    }
}

/// One slot of a node's adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncidentLink {
    pub link: usize,
    pub neighbor: usize,
    pub dir: LinkDir,
}

pub type NodeLinks = [Option<IncidentLink>; 4];

/// Read-only topology queries the solver needs.
pub trait GridTopology {
    fn number_of_nodes(&self) -> usize;

    /// `(rows, cols)` for raster-organised grids, `None` otherwise.
    fn shape(&self) -> Option<(usize, usize)>;

    fn number_of_links(&self) -> usize;

    fn number_of_diagonal_links(&self) -> usize {
        0
    }

    fn node_status(&self, node: usize) -> NodeStatus;

    /// `(from, to)` for any link id, diagonal ids included.
    fn link_nodes(&self, link: usize) -> (usize, usize);

    fn link_length(&self, link: usize) -> f64;

    fn links_at_node(&self, node: usize) -> NodeLinks;

    fn diagonal_links_at_node(&self, _node: usize) -> NodeLinks {
        [None; 4]
    }

    /// Area of the cell around `node`, used to turn a sediment flux
    /// divergence into a rate of elevation change.
    fn cell_area_at_node(&self, _node: usize) -> f64 {
        1.0
    }

    /// A link carries flux when neither end is closed and at least one end
    /// is a core node.
    fn link_is_active(&self, link: usize) -> bool {
        let (a, b) = self.link_nodes(link);
        let (sa, sb) = (self.node_status(a), self.node_status(b));
        !sa.is_closed() && !sb.is_closed() && (sa.is_core() || sb.is_core())
    }

    fn has_open_boundary(&self) -> bool {
        (0..self.number_of_nodes()).any(|n| self.node_status(n).is_open_boundary())
    }
}
