//! Potential-field water and sediment discharge routing on raster grids.
//!
//! The entry point is [`DischargeDiffuser`]: build it once per grid (after
//! boundary conditions are set), then call [`DischargeDiffuser::run_one_step`]
//! or [`DischargeDiffuser::solve`] each time step.
pub mod config;
pub mod discharge;
pub mod error;
pub mod grid;
pub mod surface;

pub use config::{DiffuserConfig, RoutingMethod};
pub use discharge::gradient::{GradientPartition, Inflow};
pub use discharge::potential::{SolveReport, SolveState};
pub use discharge::{DiffuserInputs, DischargeDiffuser};
pub use error::{DiffuserError, Result};
pub use grid::{FieldHost, FieldLocation, FieldSet, GridTopology, NodeStatus, RasterGrid};
