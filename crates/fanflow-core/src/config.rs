use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DiffuserError, Result};

/// Which link set is folded into the gradient accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RoutingMethod {
    /// Orthogonal links only.
    #[default]
    D4,
    /// Orthogonal plus diagonal links.
    D8,
}

impl FromStr for RoutingMethod {
    type Err = DiffuserError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d4" | "orthogonal" => Ok(Self::D4),
            "d8" | "diagonal" => Ok(Self::D8),
            _ => Err(DiffuserError::InvalidRoutingMethod(s.to_string())),
        }
    }
}

impl fmt::Display for RoutingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::D4 => f.write_str("D4"),
            Self::D8 => f.write_str("D8"),
        }
    }
}

/// Tunables for [`DischargeDiffuser`](crate::discharge::DischargeDiffuser).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffuserConfig {
    pub routing: RoutingMethod,
    /// Regulariser added to every outgoing-gradient sum and to every
    /// incoming sum. Sized for metre-scale elevations on metre-to-kilometre
    /// spacing. Lowering it further lets nodes with no downhill neighbour
    /// absorb ever larger potentials; if flow on a patchy surface stops
    /// connecting up, this is the knob to look at.
    pub floor: f64,
    /// Stop when Σ(K − K_prev)² drops below this.
    pub tolerance: f64,
    /// Safety cap on Jacobi sweeps. `None` derives `2·nodes + 16`.
    pub max_iterations: Option<usize>,
    /// Slope below which links entrain no sediment.
    pub critical_slope: f64,
    /// Time over which the net sediment flux is applied when staging the
    /// updated surface. Zero stages the input surface unchanged.
    pub timestep: f64,
}

impl Default for DiffuserConfig {
    fn default() -> Self {
        Self {
            routing: RoutingMethod::D4,
            floor: 1e-24,
            tolerance: 1e-6,
            max_iterations: None,
            critical_slope: 0.0,
            timestep: 1.0,
        }
    }
}

impl DiffuserConfig {
    pub fn with_routing(mut self, routing: RoutingMethod) -> Self {
        self.routing = routing;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| DiffuserError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Iteration cap for a grid of `n_nodes` nodes.
    ///
    /// Every positive gradient points from a strictly higher node to a lower
    /// one, so the coupling graph is acyclic and a Jacobi sweep settles one
    /// more level of it each pass; `n_nodes + 1` sweeps always suffice.
    pub fn iteration_cap(&self, n_nodes: usize) -> usize {
        self.max_iterations.unwrap_or(2 * n_nodes + 16)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.floor.is_finite() && self.floor > 0.0) {
            return Err(DiffuserError::InvalidParameter {
                name: "floor",
                value: self.floor,
                reason: "must be finite and > 0",
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(DiffuserError::InvalidParameter {
                name: "tolerance",
                value: self.tolerance,
                reason: "must be finite and > 0",
            });
        }
        if self.max_iterations == Some(0) {
            return Err(DiffuserError::InvalidParameter {
                name: "max_iterations",
                value: 0.0,
                reason: "must allow at least one sweep",
            });
        }
        if !(self.critical_slope.is_finite() && self.critical_slope >= 0.0) {
            return Err(DiffuserError::InvalidParameter {
                name: "critical_slope",
                value: self.critical_slope,
                reason: "must be finite and ≥ 0",
            });
        }
        if !(self.timestep.is_finite() && self.timestep >= 0.0) {
            return Err(DiffuserError::InvalidParameter {
                name: "timestep",
                value: self.timestep,
                reason: "must be finite and ≥ 0",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_parses_aliases_case_insensitively() {
        assert_eq!("D8".parse::<RoutingMethod>().unwrap(), RoutingMethod::D8);
        assert_eq!("diagonal".parse::<RoutingMethod>().unwrap(), RoutingMethod::D8);
        assert_eq!(" d4 ".parse::<RoutingMethod>().unwrap(), RoutingMethod::D4);
        assert_eq!("Orthogonal".parse::<RoutingMethod>().unwrap(), RoutingMethod::D4);
    }

    #[test]
    fn unknown_routing_is_a_configuration_error() {
        let err = "D6".parse::<RoutingMethod>().unwrap_err();
        assert_eq!(err, DiffuserError::InvalidRoutingMethod("D6".into()));
        assert!(err.is_configuration());
    }

    #[test]
    fn defaults_validate() {
        let cfg = DiffuserConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.iteration_cap(100), 216);
    }

    #[test]
    fn non_positive_floor_rejected() {
        for floor in [0.0, -1e-24, f64::NAN] {
            let cfg = DiffuserConfig { floor, ..Default::default() };
            assert!(matches!(cfg.validate(), Err(DiffuserError::InvalidParameter { name: "floor", .. })));
        }
    }

    #[test]
    fn negative_timestep_rejected() {
        let cfg = DiffuserConfig { timestep: -0.5, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(DiffuserError::InvalidParameter { name: "timestep", .. })));
        assert!(DiffuserConfig { timestep: 0.0, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn zero_iteration_cap_rejected() {
        let cfg = DiffuserConfig { max_iterations: Some(0), ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_fills_missing_fields_from_defaults() {
        let cfg = DiffuserConfig::from_json(r#"{ "routing": "D8", "tolerance": 1e-9 }"#).unwrap();
        assert_eq!(cfg.routing, RoutingMethod::D8);
        assert_eq!(cfg.tolerance, 1e-9);
        assert_eq!(cfg.floor, 1e-24);
        assert_eq!(cfg.max_iterations, None);
    }

    #[test]
    fn json_with_bad_values_rejected() {
        assert!(DiffuserConfig::from_json(r#"{ "floor": -1.0 }"#).is_err());
        assert!(DiffuserConfig::from_json(r#"{ "routing": "D6" }"#).is_err());
    }
}
