//! Discharge diffuser: potential-field flow routing after Voller, Hobley &
//! Paola.
//!
//! Pipeline per call:
//!   1. Signed gradient on every link, partitioned per node into outflow
//!      capacity and upslope inflow weights.
//!   2. Jacobi iteration of the potential K until Σ(K − K_prev)² < tolerance.
//!      Sediment sources are routed the same way through the same partition.
//!   3. Upwind link discharge, node discharge, link sediment discharge.
//!   4. Net sediment flux per node, staged onto a scratch copy of the surface.
//!
//! Flow is both convergent and divergent: a node splits its discharge over
//! every downhill link in proportion to the gradient.
//!
//! A component is tied to one grid. The K fields persist between calls and
//! seed the next solve. Calls take `&mut self`; the component is `Send` but
//! one instance must not be shared across threads mid-call.
pub mod gradient;
pub mod potential;
pub mod upwind;

use tracing::debug;

use crate::config::{DiffuserConfig, RoutingMethod};
use crate::error::{DiffuserError, Result};
use crate::grid::fields::{
    FLOW_POTENTIAL, SEDIMENT_DEPOSITION, SEDIMENT_DISCHARGE, SEDIMENT_DISCHARGE_IN, SEDIMENT_POTENTIAL,
    STAGED_ELEVATION, SURFACE_WATER_DISCHARGE, TOPOGRAPHIC_ELEVATION, WATER_DISCHARGE_IN,
};
use crate::grid::{FieldHost, FieldLocation, GridTopology};
use gradient::GradientPartition;
use potential::{PotentialSolver, SolveReport, SolveState};

/// Per-node inputs for one call.
#[derive(Debug, Clone, Copy)]
pub struct DiffuserInputs<'a> {
    pub elevation: &'a [f64],
    pub water_in: &'a [f64],
    pub sediment_in: &'a [f64],
}

#[derive(Debug, Clone)]
pub struct DischargeDiffuser {
    config: DiffuserConfig,
    n_nodes: usize,
    n_links: usize,
    solver: PotentialSolver,
    sediment_solver: PotentialSolver,
    partition: Option<GradientPartition>,
    closed: Vec<bool>,
    q_link: Vec<f64>,
    q_node: Vec<f64>,
    supply_link: Vec<f64>,
    qs_link: Vec<f64>,
    deposition: Vec<f64>,
    /// Scratch surface for the staged update.
    z_new: Vec<f64>,
}

impl DischargeDiffuser {
    /// Validate the grid and configuration and allocate state.
    ///
    /// Boundary conditions must already be set on `grid`: a grid with no
    /// fixed-value or fixed-gradient node is rejected here.
    pub fn new<G: GridTopology + ?Sized>(grid: &G, config: DiffuserConfig) -> Result<Self> {
        config.validate()?;

        let (rows, cols) = grid
            .shape()
            .ok_or_else(|| DiffuserError::UnsupportedTopology("only raster grids are supported".into()))?;
        if rows < 3 || cols < 3 {
            return Err(DiffuserError::GridTooSmall { rows, cols });
        }
        if config.routing == RoutingMethod::D8 && grid.number_of_diagonal_links() == 0 {
            return Err(DiffuserError::UnsupportedTopology("D8 routing needs a grid with diagonal links".into()));
        }
        if !grid.has_open_boundary() {
            return Err(DiffuserError::NoOpenBoundary);
        }

        let n_nodes = grid.number_of_nodes();
        let n_links = grid.number_of_links();
        let n_routed = match config.routing {
            RoutingMethod::D4 => n_links,
            RoutingMethod::D8 => n_links + grid.number_of_diagonal_links(),
        };
        debug!(rows, cols, routing = %config.routing, links = n_routed, "discharge diffuser ready");

        Ok(Self {
            config,
            n_nodes,
            n_links,
            solver: PotentialSolver::new(n_nodes),
            sediment_solver: PotentialSolver::new(n_nodes),
            partition: None,
            closed: vec![false; n_nodes],
            q_link: vec![0.0; n_routed],
            q_node: vec![0.0; n_nodes],
            supply_link: vec![0.0; n_routed],
            qs_link: vec![0.0; n_routed],
            deposition: vec![0.0; n_nodes],
            z_new: vec![0.0; n_nodes],
        })
    }

    pub fn config(&self) -> &DiffuserConfig {
        &self.config
    }

    /// Converged K per node; zero at closed nodes.
    pub fn potential(&self) -> &[f64] {
        self.solver.potential()
    }

    /// Sediment-supply analogue of [`potential`](Self::potential).
    pub fn sediment_potential(&self) -> &[f64] {
        self.sediment_solver.potential()
    }

    /// Discharge per link. Sized `number_of_links` under D4 and
    /// `number_of_links + number_of_diagonal_links` under D8.
    pub fn discharges_at_links(&self) -> &[f64] {
        &self.q_link
    }

    pub fn discharges_at_nodes(&self) -> &[f64] {
        &self.q_node
    }

    /// Routed supply plus entrainment, per link; sized like
    /// [`discharges_at_links`](Self::discharges_at_links).
    pub fn sediment_discharges_at_links(&self) -> &[f64] {
        &self.qs_link
    }

    /// Net sediment flux into each node. Positive builds the surface up.
    pub fn deposition_at_nodes(&self) -> &[f64] {
        &self.deposition
    }

    /// Elevation after `timestep` of deposition and erosion. Only core nodes
    /// move; boundary and closed nodes keep their input elevation.
    pub fn staged_elevation(&self) -> &[f64] {
        &self.z_new
    }

    /// Failed if either the water or the sediment solve failed last.
    pub fn state(&self) -> SolveState {
        match self.sediment_solver.state() {
            SolveState::Failed => SolveState::Failed,
            _ => self.solver.state(),
        }
    }

    pub fn last_report(&self) -> Option<SolveReport> {
        self.solver.last_report()
    }

    pub fn partition(&self) -> Option<&GradientPartition> {
        self.partition.as_ref()
    }

    /// Largest relative local mass-balance error of the last converged
    /// solve: |inflow + floor + Q − K·outflow| / max(1, K·outflow).
    pub fn max_mass_balance_error(&self, water_in: &[f64]) -> Option<f64> {
        let p = self.partition.as_ref()?;
        let k = self.solver.potential();
        let worst = (0..self.n_nodes)
            .filter(|&i| !self.closed[i])
            .map(|i| {
                let inflow: f64 = p.inflows(i).iter().map(|f| f.gradient * k[f.neighbor]).sum();
                let out = k[i] * p.outgoing_sum[i];
                (inflow + self.config.floor + water_in[i] - out).abs() / out.max(1.0)
            })
            .fold(0.0, f64::max);
        Some(worst)
    }

    /// Solve on explicit input slices.
    ///
    /// On a convergence failure nothing is published: the previous link and
    /// node discharges stay in place and the failing K seed is cleared.
    pub fn solve<G: GridTopology + ?Sized>(&mut self, grid: &G, inputs: &DiffuserInputs<'_>) -> Result<SolveReport> {
        if grid.number_of_nodes() != self.n_nodes {
            return Err(DiffuserError::InvalidGrid(format!(
                "component built for {} nodes, grid has {}",
                self.n_nodes,
                grid.number_of_nodes()
            )));
        }
        self.check_inputs(inputs)?;

        let cfg = &self.config;
        let partition = GradientPartition::compute(grid, inputs.elevation, cfg.routing, cfg.floor);
        let bad_link = partition
            .link_gradient
            .iter()
            .enumerate()
            .find(|&(l, g)| !g.is_finite() && grid.link_is_active(l));
        if let Some((link, &value)) = bad_link {
            return Err(DiffuserError::InvalidGradient { link, value });
        }
        for (i, c) in self.closed.iter_mut().enumerate() {
            *c = grid.node_status(i).is_closed();
        }

        let cap = cfg.iteration_cap(self.n_nodes);
        let solved = self
            .solver
            .solve(&partition, inputs.water_in, &self.closed, cfg.floor, cfg.tolerance, cap)
            .and_then(|report| {
                let sediment =
                    self.sediment_solver.solve(&partition, inputs.sediment_in, &self.closed, cfg.floor, cfg.tolerance, cap)?;
                debug!(iterations = sediment.iterations, "sediment supply routed");
                Ok(report)
            });
        let report = match solved {
            Ok(report) => report,
            Err(e) => {
                self.partition = None;
                return Err(e);
            }
        };

        let k = self.solver.potential();
        let ks = self.sediment_solver.potential();
        let grad = &partition.link_gradient;
        upwind::discharges_at_links(grid, inputs.elevation, k, grad, &mut self.q_link);
        upwind::discharges_at_links(grid, inputs.elevation, ks, grad, &mut self.supply_link);
        upwind::discharges_at_nodes(&partition, k, &self.closed, &mut self.q_node);
        upwind::sediment_at_links(&self.supply_link, &self.q_link, grad, cfg.critical_slope, &mut self.qs_link);
        upwind::deposition_at_nodes(
            grid,
            cfg.routing,
            inputs.sediment_in,
            &self.qs_link,
            &self.closed,
            &mut self.deposition,
        );
        for (i, z) in self.z_new.iter_mut().enumerate() {
            *z = inputs.elevation[i];
            if grid.node_status(i).is_core() {
                *z += cfg.timestep * self.deposition[i] / grid.cell_area_at_node(i);
            }
        }
        self.partition = Some(partition);

        Ok(report)
    }

    /// Read the input fields from `grid`, solve, and write the output fields:
    /// `flow__potential`, `sediment__potential`, `surface_water__discharge`,
    /// `sediment__deposition_rate` and `topographic__elevation_staged` at
    /// nodes, `surface_water__discharge` and `sediment__discharge` at
    /// (orthogonal) links. `topographic__elevation` itself is left alone; see
    /// [`commit_staged_elevation`](Self::commit_staged_elevation).
    pub fn run_one_step<G: GridTopology + FieldHost>(&mut self, grid: &mut G) -> Result<SolveReport> {
        let report = {
            let fields = grid.fields();
            let inputs = DiffuserInputs {
                elevation: fields.get(FieldLocation::Node, TOPOGRAPHIC_ELEVATION)?,
                water_in: fields.get(FieldLocation::Node, WATER_DISCHARGE_IN)?,
                sediment_in: fields.get(FieldLocation::Node, SEDIMENT_DISCHARGE_IN)?,
            };
            self.solve(&*grid, &inputs)?
        };

        let n = self.n_links;
        let fields = grid.fields_mut();
        fields.add_field(FieldLocation::Node, FLOW_POTENTIAL, self.solver.potential().to_vec())?;
        fields.add_field(FieldLocation::Node, SEDIMENT_POTENTIAL, self.sediment_solver.potential().to_vec())?;
        fields.add_field(FieldLocation::Node, SURFACE_WATER_DISCHARGE, self.q_node.clone())?;
        fields.add_field(FieldLocation::Node, SEDIMENT_DEPOSITION, self.deposition.clone())?;
        fields.add_field(FieldLocation::Node, STAGED_ELEVATION, self.z_new.clone())?;
        fields.add_field(FieldLocation::Link, SURFACE_WATER_DISCHARGE, self.q_link[..n].to_vec())?;
        fields.add_field(FieldLocation::Link, SEDIMENT_DISCHARGE, self.qs_link[..n].to_vec())?;
        Ok(report)
    }

    /// Copy the staged surface of the last converged solve into
    /// `topographic__elevation`.
    pub fn commit_staged_elevation<G: FieldHost>(&self, grid: &mut G) -> Result<()> {
        if self.partition.is_none() {
            return Err(DiffuserError::NothingStaged);
        }
        let z = grid.fields_mut().get_mut(FieldLocation::Node, TOPOGRAPHIC_ELEVATION)?;
        if z.len() != self.z_new.len() {
            return Err(DiffuserError::FieldLengthMismatch {
                name: TOPOGRAPHIC_ELEVATION.to_string(),
                expected: self.z_new.len(),
                actual: z.len(),
            });
        }
        z.copy_from_slice(&self.z_new);
        Ok(())
    }

    fn check_inputs(&self, inputs: &DiffuserInputs<'_>) -> Result<()> {
        let arrays = [
            (TOPOGRAPHIC_ELEVATION, inputs.elevation),
            (WATER_DISCHARGE_IN, inputs.water_in),
            (SEDIMENT_DISCHARGE_IN, inputs.sediment_in),
        ];
        for (name, values) in arrays {
            if values.len() != self.n_nodes {
                return Err(DiffuserError::FieldLengthMismatch {
                    name: name.to_string(),
                    expected: self.n_nodes,
                    actual: values.len(),
                });
            }
        }
        if let Some((node, &value)) = inputs.elevation.iter().enumerate().find(|(_, z)| !z.is_finite()) {
            return Err(DiffuserError::InvalidInput { field: TOPOGRAPHIC_ELEVATION, node, value });
        }
        for (field, values) in [(WATER_DISCHARGE_IN, inputs.water_in), (SEDIMENT_DISCHARGE_IN, inputs.sediment_in)] {
            if let Some((node, &value)) = values.iter().enumerate().find(|(_, q)| !(q.is_finite() && **q >= 0.0)) {
                return Err(DiffuserError::InvalidInput { field, node, value });
            }
        }
        Ok(())
    }
}
