//! Error type shared by the grid, the configuration layer and the solver.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiffuserError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffuserError {
    // ── Construction / configuration ─────────────────────────────────────────
    #[error("grid is {rows}×{cols}; at least 3×3 nodes are required")]
    GridTooSmall { rows: usize, cols: usize },

    #[error("unsupported grid topology: {0}")]
    UnsupportedTopology(String),

    #[error("unknown routing method '{0}' (expected D4 or D8)")]
    InvalidRoutingMethod(String),

    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("malformed configuration: {0}")]
    InvalidConfig(String),

    #[error("no open boundary node: a fully closed grid has nothing to drain to")]
    NoOpenBoundary,

    #[error("invalid grid geometry: {0}")]
    InvalidGrid(String),

    // ── Per-call input ───────────────────────────────────────────────────────
    #[error("field '{name}' not found at {location}")]
    MissingField {
        name: String,
        location: &'static str,
    },

    #[error("field '{name}' has {actual} values, expected {expected}")]
    FieldLengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid input in '{field}' at node {node}: {value}")]
    InvalidInput {
        field: &'static str,
        node: usize,
        value: f64,
    },

    #[error("elevation gives a non-finite gradient on active link {link}: {value}")]
    InvalidGradient { link: usize, value: f64 },

    // ── Solve ────────────────────────────────────────────────────────────────
    #[error("potential field did not converge after {iterations} iterations (mismatch {mismatch:.3e})")]
    NotConverged { iterations: usize, mismatch: f64 },

    #[error("no converged solve to take a staged surface from")]
    NothingStaged,
}

impl DiffuserError {
    /// True for errors that prevent the component from being built at all.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::GridTooSmall { .. }
                | Self::UnsupportedTopology(_)
                | Self::InvalidRoutingMethod(_)
                | Self::InvalidParameter { .. }
                | Self::InvalidConfig(_)
                | Self::NoOpenBoundary
                | Self::InvalidGrid(_)
        )
    }

    pub fn is_convergence_failure(&self) -> bool {
        matches!(self, Self::NotConverged { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifiers_separate_config_from_convergence() {
        let cfg = DiffuserError::GridTooSmall { rows: 2, cols: 5 };
        assert!(cfg.is_configuration());
        assert!(!cfg.is_convergence_failure());

        let conv = DiffuserError::NotConverged { iterations: 10, mismatch: 0.5 };
        assert!(conv.is_convergence_failure());
        assert!(!conv.is_configuration());

        let input = DiffuserError::InvalidInput { field: "topographic__elevation", node: 3, value: f64::NAN };
        assert!(!input.is_configuration());
        assert!(!input.is_convergence_failure());

        let grad = DiffuserError::InvalidGradient { link: 4, value: f64::INFINITY };
        assert!(!grad.is_configuration());
        assert!(!grad.is_convergence_failure());
    }

    #[test]
    fn messages_name_the_offending_values() {
        let e = DiffuserError::FieldLengthMismatch { name: "water__discharge_in".into(), expected: 9, actual: 4 };
        let msg = e.to_string();
        assert!(msg.contains("water__discharge_in") && msg.contains('9') && msg.contains('4'), "{msg}");
    }
}
