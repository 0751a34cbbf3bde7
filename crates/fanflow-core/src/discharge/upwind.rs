//! Maps a converged potential back onto links and nodes.
use super::gradient::GradientPartition;
use crate::config::RoutingMethod;
use crate::grid::{GridTopology, NodeLinks};

/// Per-link discharge: K of the higher endpoint times the link gradient.
/// Inactive links are exactly zero. Ties take the `from` end.
pub fn discharges_at_links<G: GridTopology + ?Sized>(
    grid: &G,
    elevation: &[f64],
    potential: &[f64],
    link_gradient: &[f64],
    out: &mut [f64],
) {
    debug_assert_eq!(out.len(), link_gradient.len());
    for (l, (q, &g)) in out.iter_mut().zip(link_gradient).enumerate() {
        if !grid.link_is_active(l) {
            *q = 0.0;
            continue;
        }
        let (from, to) = grid.link_nodes(l);
        let upwind = if elevation[to] > elevation[from] { potential[to] } else { potential[from] };
        *q = upwind * g;
    }
}

/// Per-node total discharge, `K · (Σ outgoing gradient + floor)`; zero at
/// closed nodes.
pub fn discharges_at_nodes(partition: &GradientPartition, potential: &[f64], closed: &[bool], out: &mut [f64]) {
    for (i, q) in out.iter_mut().enumerate() {
        *q = if closed[i] { 0.0 } else { potential[i] * partition.outgoing_sum[i] };
    }
}

/// Sediment carried along each link: the routed supply plus what the water
/// entrains, `q_w · max(|S| − S_crit, 0)`, signed like the water discharge.
pub fn sediment_at_links(
    supply_at_links: &[f64],
    water_at_links: &[f64],
    link_gradient: &[f64],
    critical_slope: f64,
    out: &mut [f64],
) {
    for (l, qs) in out.iter_mut().enumerate() {
        let qw = water_at_links[l];
        let entrained = if qw == 0.0 { 0.0 } else { qw * (link_gradient[l].abs() - critical_slope).max(0.0) };
        *qs = supply_at_links[l] + entrained;
    }
}

/// Net sediment flux into every non-closed node: source plus link inflow
/// minus link outflow. At an open boundary node this is what leaves the grid.
pub fn deposition_at_nodes<G: GridTopology + ?Sized>(
    grid: &G,
    routing: RoutingMethod,
    sediment_in: &[f64],
    sediment_at_links: &[f64],
    closed: &[bool],
    out: &mut [f64],
) {
    for (i, d) in out.iter_mut().enumerate() {
        if closed[i] {
            *d = 0.0;
            continue;
        }
        let mut net = sediment_in[i];
        let mut gather = |slots: NodeLinks| {
            for slot in slots.into_iter().flatten() {
                net -= slot.dir.orient(sediment_at_links[slot.link]);
            }
        };
        gather(grid.links_at_node(i));
        if routing == RoutingMethod::D8 {
            gather(grid.diagonal_links_at_node(i));
        }
        *d = net;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{NodeStatus, RasterGrid};

    #[test]
    fn upwind_picks_higher_end_for_either_sign() {
        let g = RasterGrid::unit(3, 3).unwrap();
        let mut z = vec![0.0; 9];
        z[3] = 2.0; // west of centre, higher
        z[4] = 1.0;
        z[5] = 3.0; // east of centre, higher still
        let k: Vec<f64> = (0..9).map(|i| 10.0 + i as f64).collect();
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, 1e-24);
        let mut q = vec![f64::NAN; g.number_of_links()];
        discharges_at_links(&g, &z, &k, &p.link_gradient, &mut q);

        let west = g.links_at_node(4)[2].unwrap().link; // 3 → 4
        let east = g.links_at_node(4)[0].unwrap().link; // 4 → 5
        assert_eq!(q[west], k[3] * 1.0);
        assert_eq!(q[east], k[5] * -2.0);
    }

    #[test]
    fn inactive_links_are_zero_even_with_gradient() {
        let mut g = RasterGrid::unit(3, 3).unwrap();
        g.set_status(4, NodeStatus::Closed);
        let z: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let k = vec![1.0; 9];
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, 1e-24);
        let mut q = vec![f64::NAN; g.number_of_links()];
        discharges_at_links(&g, &z, &k, &p.link_gradient, &mut q);
        assert!(q.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn node_discharge_is_potential_times_outflow_capacity() {
        let g = RasterGrid::unit(3, 3).unwrap();
        let z: Vec<f64> = (0..9).map(|i| (2 - i % 3) as f64).collect();
        let p = GradientPartition::compute(&g, &z, RoutingMethod::D4, 1e-24);
        let k = vec![3.0; 9];
        let mut closed = vec![false; 9];
        closed[0] = true;
        let mut q = vec![0.0; 9];
        discharges_at_nodes(&p, &k, &closed, &mut q);
        assert_eq!(q[4], 3.0 * p.outgoing_sum[4]);
        assert_eq!(q[0], 0.0);
    }

    #[test]
    fn sediment_respects_critical_slope_and_sign() {
        let qw = [2.0, -2.0, 2.0, 0.0];
        let g = [0.5, -0.5, 0.05, 0.3];
        let supply = [0.0; 4];
        let mut qs = [f64::NAN; 4];
        sediment_at_links(&supply, &qw, &g, 0.1, &mut qs);
        assert!((qs[0] - 0.8).abs() < 1e-12);
        assert!((qs[1] + 0.8).abs() < 1e-12);
        assert_eq!(qs[2], 0.0);
        assert_eq!(qs[3], 0.0);
    }

    #[test]
    fn routed_supply_adds_to_entrainment() {
        let qw = [2.0, 0.0];
        let g = [0.5, f64::INFINITY];
        let supply = [3.0, 0.0];
        let mut qs = [f64::NAN; 2];
        sediment_at_links(&supply, &qw, &g, 0.0, &mut qs);
        assert!((qs[0] - 4.0).abs() < 1e-12);
        // Dry link stays exactly zero whatever its gradient.
        assert_eq!(qs[1], 0.0);
    }

    #[test]
    fn deposition_balances_link_fluxes() {
        let g = RasterGrid::unit(3, 3).unwrap();
        let mut qs = vec![0.0; g.number_of_links()];
        let west = g.links_at_node(4)[2].unwrap().link; // 3 → 4
        let east = g.links_at_node(4)[0].unwrap().link; // 4 → 5
        qs[west] = 5.0;
        qs[east] = 2.0;
        let mut source = vec![0.0; 9];
        source[4] = 1.0;
        let mut closed = vec![false; 9];
        closed[0] = true;
        let mut d = vec![f64::NAN; 9];
        deposition_at_nodes(&g, RoutingMethod::D4, &source, &qs, &closed, &mut d);
        assert_eq!(d[4], 1.0 + 5.0 - 2.0);
        assert_eq!(d[3], -5.0);
        assert_eq!(d[5], 2.0);
        assert_eq!(d[0], 0.0);
    }
}
