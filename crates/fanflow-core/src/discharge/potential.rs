//! Fixed-point solve for the flow potential K.
//!
//! For every non-closed node i:
//!
//! ```text
//!   K[i] = (Σ_j g_ji · K[j] + floor + Q[i]) / (Σ_out g + floor)
//! ```
//!
//! where j runs over the strictly higher neighbours feeding i. Each sweep is
//! a Jacobi update from the previous iterate. The sweep stops once
//! Σ(K − K_prev)² drops below the tolerance; hitting the iteration cap first
//! is reported as an error.
use tracing::{debug, trace, warn};

use super::gradient::GradientPartition;
use crate::error::{DiffuserError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveState {
    Initializing,
    Iterating,
    Converged,
    Failed,
}

/// Summary of the last solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub state: SolveState,
    pub iterations: usize,
    /// Σ(K − K_prev)² of the final sweep.
    pub mismatch: f64,
}

/// Owns the K buffers across calls; one instance per grid.
#[derive(Debug, Clone)]
pub struct PotentialSolver {
    k: Vec<f64>,
    prev_k: Vec<f64>,
    state: SolveState,
    report: Option<SolveReport>,
}

impl PotentialSolver {
    pub fn new(n_nodes: usize) -> Self {
        Self {
            k: vec![0.0; n_nodes],
            prev_k: vec![0.0; n_nodes],
            state: SolveState::Initializing,
            report: None,
        }
    }

    pub fn potential(&self) -> &[f64] {
        &self.k
    }

    pub fn state(&self) -> SolveState {
        self.state
    }

    pub fn last_report(&self) -> Option<SolveReport> {
        self.report
    }

    /// Drop the seed; the next solve starts from K = 0.
    pub fn reset(&mut self) {
        self.k.fill(0.0);
        self.prev_k.fill(0.0);
        self.state = SolveState::Initializing;
    }

    /// Iterate to convergence, seeded from the current K.
    ///
    /// `closed[i]` marks nodes that are not iterated; their K is held at 0.
    /// On failure K is reset so a half-converged field never seeds the next
    /// call.
    pub fn solve(
        &mut self,
        partition: &GradientPartition,
        water_in: &[f64],
        closed: &[bool],
        floor: f64,
        tolerance: f64,
        max_iterations: usize,
    ) -> Result<SolveReport> {
        debug_assert_eq!(partition.number_of_nodes(), self.k.len());
        self.state = SolveState::Initializing;
        self.prev_k.copy_from_slice(&self.k);

        self.state = SolveState::Iterating;
        let mut mismatch = f64::INFINITY;
        for iteration in 1..=max_iterations {
            mismatch = 0.0;
            for i in 0..self.k.len() {
                if closed[i] {
                    self.k[i] = 0.0;
                    continue;
                }
                let upslope: f64 = partition
                    .inflows(i)
                    .iter()
                    .map(|f| f.gradient * self.prev_k[f.neighbor])
                    .sum();
                let k = (upslope + floor + water_in[i]) / partition.outgoing_sum[i];
                let d = k - self.prev_k[i];
                mismatch += d * d;
                self.k[i] = k;
            }
            self.prev_k.copy_from_slice(&self.k);
            trace!(iteration, mismatch, "potential sweep");

            if mismatch < tolerance {
                self.state = SolveState::Converged;
                let report = SolveReport { state: self.state, iterations: iteration, mismatch };
                debug!(iterations = iteration, mismatch, "potential field converged");
                self.report = Some(report);
                return Ok(report);
            }
        }

        warn!(max_iterations, mismatch, "potential field failed to converge");
        self.reset();
        self.state = SolveState::Failed;
        self.report = Some(SolveReport { state: self.state, iterations: max_iterations, mismatch });
        Err(DiffuserError::NotConverged { iterations: max_iterations, mismatch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingMethod;
    use crate::grid::{GridTopology, RasterGrid};
    use approx::assert_relative_eq;

    const FLOOR: f64 = 1e-24;

    fn closed_mask(g: &RasterGrid) -> Vec<bool> {
        (0..g.number_of_nodes()).map(|i| g.node_status(i).is_closed()).collect()
    }

    /// 3 × n strip draining east through a single open node at (1, n-1).
    fn chain(n: usize) -> (RasterGrid, Vec<f64>) {
        let mut g = RasterGrid::unit(3, n).unwrap();
        g.set_closed_boundaries(false, true, true, true);
        let z = (0..g.number_of_nodes()).map(|i| (n - 1 - g.row_col(i).1) as f64).collect();
        (g, z)
    }

    #[test]
    fn chain_potential_accumulates_downslope() {
        let (g, z) = chain(6);
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, FLOOR);
        let q: Vec<f64> = (0..g.number_of_nodes()).map(|i| if g.node_status(i).is_core() { 1.0 } else { 0.0 }).collect();
        let mut s = PotentialSolver::new(g.number_of_nodes());
        let report = s.solve(&p, &q, &closed_mask(&g), FLOOR, 1e-6, 100).unwrap();
        assert_eq!(report.state, SolveState::Converged);
        assert_eq!(s.state(), SolveState::Converged);
        for c in 1..5 {
            assert_relative_eq!(s.potential()[g.node_at(1, c)], c as f64, max_relative = 1e-12);
        }
        // Closed nodes are held at zero.
        assert_eq!(s.potential()[g.node_at(0, 0)], 0.0);
        assert_eq!(s.potential()[g.node_at(1, 0)], 0.0);
    }

    #[test]
    fn converges_within_chain_depth_plus_one() {
        let (g, z) = chain(8);
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, FLOOR);
        let q = vec![1.0; g.number_of_nodes()];
        let mut s = PotentialSolver::new(g.number_of_nodes());
        let report = s.solve(&p, &q, &closed_mask(&g), FLOOR, 1e-6, 100).unwrap();
        // Seven non-closed nodes in a line: depth 7, exact after 7 sweeps,
        // detected on the 8th.
        assert!(report.iterations <= 8, "took {} sweeps", report.iterations);
        assert_eq!(report.mismatch, 0.0);
    }

    #[test]
    fn cap_reached_is_reported_and_seed_dropped() {
        let (g, z) = chain(10);
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, FLOOR);
        let q = vec![1.0; g.number_of_nodes()];
        let mut s = PotentialSolver::new(g.number_of_nodes());
        let err = s.solve(&p, &q, &closed_mask(&g), FLOOR, 1e-6, 2).unwrap_err();
        assert!(matches!(err, DiffuserError::NotConverged { iterations: 2, .. }));
        assert_eq!(s.state(), SolveState::Failed);
        assert!(s.potential().iter().all(|&k| k == 0.0));
        assert_eq!(s.last_report().unwrap().state, SolveState::Failed);
    }

    #[test]
    fn non_finite_influx_never_converges() {
        let (g, z) = chain(5);
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, FLOOR);
        let mut q = vec![1.0; g.number_of_nodes()];
        q[g.node_at(1, 2)] = f64::NAN;
        let mut s = PotentialSolver::new(g.number_of_nodes());
        assert!(s.solve(&p, &q, &closed_mask(&g), FLOOR, 1e-6, 50).is_err());
    }

    #[test]
    fn warm_start_reconverges_in_one_sweep() {
        let (g, z) = chain(6);
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, FLOOR);
        let q = vec![1.0; g.number_of_nodes()];
        let closed = closed_mask(&g);
        let mut s = PotentialSolver::new(g.number_of_nodes());
        s.solve(&p, &q, &closed, FLOOR, 1e-6, 100).unwrap();
        let first = s.potential().to_vec();
        let again = s.solve(&p, &q, &closed, FLOOR, 1e-6, 100).unwrap();
        assert_eq!(again.iterations, 1);
        assert_eq!(s.potential(), first.as_slice());
    }

    #[test]
    fn pit_takes_its_potential_from_the_floor() {
        let g = RasterGrid::unit(3, 3).unwrap();
        let mut z = vec![5.0; 9];
        z[4] = 1.0;
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, FLOOR);
        let mut q = vec![0.0; 9];
        q[4] = 2.0;
        let mut s = PotentialSolver::new(9);
        s.solve(&p, &q, &closed_mask(&g), FLOOR, 1e-6, 100).unwrap();
        assert_relative_eq!(s.potential()[4] * FLOOR, 2.0, max_relative = 1e-12);
        assert!(s.potential().iter().all(|k| k.is_finite() && *k >= 0.0));
    }
}
