//! Link gradients and their per-node partition into outflow capacity and
//! upslope inflow weights.
//!
//! Gradient sign: `(z[from] − z[to]) / length`, so a positive value means
//! water moves from → to.
use crate::config::RoutingMethod;
use crate::grid::{GridTopology, NodeLinks};

/// Upslope neighbour feeding a node, weighted by the clipped gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inflow {
    pub neighbor: usize,
    pub gradient: f64,
}

/// Output of the partition stage; read-only input to the potential solve.
#[derive(Debug, Clone)]
pub struct GradientPartition {
    /// Signed gradient per link (orthogonal then diagonal, if D8).
    pub link_gradient: Vec<f64>,
    /// Σ max(0, outgoing gradient) + floor, per node.
    pub outgoing_sum: Vec<f64>,
    inflow_start: Vec<usize>,
    inflows: Vec<Inflow>,
}

impl GradientPartition {
    pub fn compute<G: GridTopology + ?Sized>(
        grid: &G,
        elevation: &[f64],
        routing: RoutingMethod,
        floor: f64,
    ) -> Self {
        let n_nodes = grid.number_of_nodes();
        let n_links = match routing {
            RoutingMethod::D4 => grid.number_of_links(),
            RoutingMethod::D8 => grid.number_of_links() + grid.number_of_diagonal_links(),
        };

        let link_gradient: Vec<f64> = (0..n_links)
            .map(|l| {
                let (from, to) = grid.link_nodes(l);
                (elevation[from] - elevation[to]) / grid.link_length(l)
            })
            .collect();
        let active: Vec<bool> = (0..n_links).map(|l| grid.link_is_active(l)).collect();

        let mut outgoing_sum = vec![floor; n_nodes];
        let mut inflow_start = Vec::with_capacity(n_nodes + 1);
        let mut inflows = Vec::with_capacity(n_links);

        for node in 0..n_nodes {
            inflow_start.push(inflows.len());
            let mut accumulate = |slots: NodeLinks| {
                for slot in slots.into_iter().flatten() {
                    if !active[slot.link] {
                        continue;
                    }
                    let g = slot.dir.orient(link_gradient[slot.link]);
                    if g > 0.0 {
                        outgoing_sum[node] += g;
                    } else if g < 0.0 {
                        inflows.push(Inflow { neighbor: slot.neighbor, gradient: -g });
                    }
                }
            };
            accumulate(grid.links_at_node(node));
            if routing == RoutingMethod::D8 {
                accumulate(grid.diagonal_links_at_node(node));
            }
        }
        inflow_start.push(inflows.len());

        Self { link_gradient, outgoing_sum, inflow_start, inflows }
    }

    #[inline]
    pub fn inflows(&self, node: usize) -> &[Inflow] {
        &self.inflows[self.inflow_start[node]..self.inflow_start[node + 1]]
    }

    pub fn number_of_nodes(&self) -> usize {
        self.outgoing_sum.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::RasterGrid;

    const FLOOR: f64 = 1e-24;

    /// Elevation falls by `drop` per column toward the east.
    fn east_ramp(g: &RasterGrid, drop: f64) -> Vec<f64> {
        (0..g.number_of_nodes()).map(|i| (g.cols() - 1 - g.row_col(i).1) as f64 * drop).collect()
    }

    #[test]
    fn gradient_is_from_minus_to_over_length() {
        let g = RasterGrid::new(3, 3, 2.0, 1.0).unwrap();
        let z = east_ramp(&g, 4.0);
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, FLOOR);
        // Link 0 runs west → east, dropping 4 m over 2 m.
        assert_eq!(p.link_gradient[0], 2.0);
        // Vertical links are level.
        assert_eq!(p.link_gradient[2], 0.0);
        assert_eq!(p.link_gradient.len(), g.number_of_links());
    }

    #[test]
    fn centre_of_ramp_has_one_outlet_and_one_inflow() {
        let g = RasterGrid::unit(3, 3).unwrap();
        let z = east_ramp(&g, 1.0);
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, FLOOR);
        assert!((p.outgoing_sum[4] - 1.0).abs() < 1e-15);
        assert_eq!(p.inflows(4), &[Inflow { neighbor: 3, gradient: 1.0 }]);
    }

    #[test]
    fn inactive_links_are_ignored() {
        let g = RasterGrid::unit(3, 3).unwrap();
        let z = east_ramp(&g, 1.0);
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, FLOOR);
        // Node 0 is a corner: both its links end on perimeter nodes.
        assert_eq!(p.outgoing_sum[0], FLOOR);
        assert!(p.inflows(0).is_empty());
        // Node 5 (east edge) only sees the centre.
        assert_eq!(p.inflows(5), &[Inflow { neighbor: 4, gradient: 1.0 }]);
        assert_eq!(p.outgoing_sum[5], FLOOR);
    }

    #[test]
    fn flat_surface_has_floor_only_denominators() {
        let g = RasterGrid::unit(4, 4).unwrap();
        let z = vec![7.0; 16];
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D8, FLOOR);
        assert!(p.outgoing_sum.iter().all(|&s| s == FLOOR));
        assert!((0..16).all(|i| p.inflows(i).is_empty()));
    }

    #[test]
    fn diagonals_add_to_the_same_accumulators() {
        let g = RasterGrid::unit(3, 3).unwrap();
        let z = east_ramp(&g, 1.0);
        let d4 = GradientPartition::compute(&g, &z, RoutingMethod::D4, FLOOR);
        let d8 = GradientPartition::compute(&g, &z, RoutingMethod::D8, FLOOR);
        let s = std::f64::consts::FRAC_1_SQRT_2;
        assert_eq!(d8.link_gradient.len(), g.number_of_links() + g.number_of_diagonal_links());
        assert!((d8.outgoing_sum[4] - (d4.outgoing_sum[4] + 2.0 * s)).abs() < 1e-12);
        assert_eq!(d8.inflows(4).len(), 3);
        let from_diag: f64 = d8.inflows(4).iter().filter(|f| f.neighbor != 3).map(|f| f.gradient).sum();
        assert!((from_diag - 2.0 * s).abs() < 1e-12);
    }
}
