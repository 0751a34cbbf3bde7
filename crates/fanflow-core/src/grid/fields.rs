//! Named `f64` arrays attached to grid nodes and links.
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{DiffuserError, Result};

pub const TOPOGRAPHIC_ELEVATION: &str = "topographic__elevation";
pub const WATER_DISCHARGE_IN: &str = "water__discharge_in";
pub const SEDIMENT_DISCHARGE_IN: &str = "sediment__discharge_in";
pub const FLOW_POTENTIAL: &str = "flow__potential";
pub const SURFACE_WATER_DISCHARGE: &str = "surface_water__discharge";
pub const SEDIMENT_DISCHARGE: &str = "sediment__discharge";
pub const SEDIMENT_POTENTIAL: &str = "sediment__potential";
/// Net sediment flux into a node per unit time.
pub const SEDIMENT_DEPOSITION: &str = "sediment__deposition_rate";
/// Scratch surface: elevation after one timestep of deposition and erosion.
pub const STAGED_ELEVATION: &str = "topographic__elevation_staged";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldLocation {
    Node,
    Link,
}

impl fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FieldLocation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Link => "link",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    n_nodes: usize,
    n_links: usize,
    at_node: BTreeMap<String, Vec<f64>>,
    at_link: BTreeMap<String, Vec<f64>>,
}

impl FieldSet {
    pub fn new(n_nodes: usize, n_links: usize) -> Self {
        Self { n_nodes, n_links, ..Default::default() }
    }

    fn size(&self, loc: FieldLocation) -> usize {
        match loc {
            FieldLocation::Node => self.n_nodes,
            FieldLocation::Link => self.n_links,
        }
    }

    fn map(&self, loc: FieldLocation) -> &BTreeMap<String, Vec<f64>> {
        match loc {
            FieldLocation::Node => &self.at_node,
            FieldLocation::Link => &self.at_link,
        }
    }

    fn map_mut(&mut self, loc: FieldLocation) -> &mut BTreeMap<String, Vec<f64>> {
        match loc {
            FieldLocation::Node => &mut self.at_node,
            FieldLocation::Link => &mut self.at_link,
        }
    }

    /// Insert or replace a field. The length must match the location size.
    pub fn add_field(&mut self, loc: FieldLocation, name: &str, values: Vec<f64>) -> Result<()> {
        let expected = self.size(loc);
        if values.len() != expected {
            return Err(DiffuserError::FieldLengthMismatch {
                name: name.to_string(),
                expected,
                actual: values.len(),
            });
        }
        self.map_mut(loc).insert(name.to_string(), values);
        Ok(())
    }

    /// Zero-filled field; an existing field of that name is left as is.
    pub fn add_zeros(&mut self, loc: FieldLocation, name: &str) -> &mut Vec<f64> {
        let n = self.size(loc);
        self.map_mut(loc).entry(name.to_string()).or_insert_with(|| vec![0.0; n])
    }

    pub fn contains(&self, loc: FieldLocation, name: &str) -> bool {
        self.map(loc).contains_key(name)
    }

    pub fn get(&self, loc: FieldLocation, name: &str) -> Result<&[f64]> {
        self.map(loc)
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| DiffuserError::MissingField { name: name.to_string(), location: loc.as_str() })
    }

    pub fn get_mut(&mut self, loc: FieldLocation, name: &str) -> Result<&mut [f64]> {
        self.map_mut(loc)
            .get_mut(name)
            .map(Vec::as_mut_slice)
            .ok_or_else(|| DiffuserError::MissingField { name: name.to_string(), location: loc.as_str() })
    }

}

/// Anything that carries a [`FieldSet`].
pub trait FieldHost {
    fn fields(&self) -> &FieldSet;
    fn fields_mut(&mut self) -> &mut FieldSet;
}
