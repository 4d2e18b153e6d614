//! JSON description of a stack.
//!
//! Die types are declared once under `dies` and instantiated in `stack`
//! with their own floorplan, the way several identical dies share one
//! definition in a real stack:
//!
//! ```json
//! {
//!   "materials": [
//!     { "name": "silicon", "thermal_conductivity": 1.3e-4, "volumetric_heat_capacity": 1.628e-12 }
//!   ],
//!   "chip": { "length": 10000.0, "width": 10000.0 },
//!   "cell": { "length": 100.0, "width": 100.0 },
//!   "dies": {
//!     "core": { "layers": [ { "height": 50.0, "material": "silicon" } ], "source_layer": 0 }
//!   },
//!   "stack": [
//!     { "kind": "die", "id": "die0", "die": "core",
//!       "floorplan": [ { "id": "cpu", "sw_x": 0.0, "sw_y": 0.0, "length": 5000.0, "width": 5000.0, "power": 1.0 } ] }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::channel::{Channel, Coolant};
use crate::die::Die;
use crate::dimensions::{CellDimensions, ChipDimensions};
use crate::error::{IceError, Result};
use crate::floorplan::{Floorplan, FloorplanElement};
use crate::layer::Layer;
use crate::material::{Material, MaterialCatalog};
use crate::stack::{StackBuilder, StackDescription, StackElementKind, TopBoundary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellConfig {
    pub length: f64,
    pub width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_length: Option<f64>,
}

impl From<&CellConfig> for CellDimensions {
    fn from(c: &CellConfig) -> Self {
        CellDimensions {
            first_length: c.first_length.unwrap_or(c.length),
            length: c.length,
            last_length: c.last_length.unwrap_or(c.length),
            width: c.width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub height: f64,
    pub material: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DieConfig {
    /// Bottom to top
    pub layers: Vec<LayerConfig>,
    pub source_layer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub height: f64,
    pub coolant: Coolant,
    pub wall_material: String,
    /// ml/min
    pub flow_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorplanElementConfig {
    pub id: String,
    pub sw_x: f64,
    pub sw_y: f64,
    pub length: f64,
    pub width: f64,
    #[serde(default)]
    pub power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StackElementConfig {
    Die {
        id: String,
        die: String,
        #[serde(default)]
        floorplan: Vec<FloorplanElementConfig>,
    },
    Layer {
        id: String,
        #[serde(flatten)]
        layer: LayerConfig,
    },
    Channel {
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub materials: Vec<Material>,
    pub chip: ChipDimensions,
    pub cell: CellConfig,
    #[serde(default)]
    pub dies: BTreeMap<String, DieConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelConfig>,
    #[serde(default)]
    pub top_boundary: TopBoundary,
    /// Bottom to top
    pub stack: Vec<StackElementConfig>,
}

impl StackConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resolve material and die names and build the stack.
    pub fn build(&self) -> Result<StackDescription> {
        let mut catalog = MaterialCatalog::new();
        for material in &self.materials {
            catalog.add(material.clone())?;
        }

        let layer = |c: &LayerConfig| -> Result<Layer> {
            if !(c.height > 0.0) {
                return Err(IceError::config(format!("layer height {} must be positive", c.height)));
            }
            Ok(Layer::new(c.height, catalog.require(&c.material)?))
        };

        let mut elements = Vec::with_capacity(self.stack.len());
        for element in &self.stack {
            let (id, kind) = match element {
                StackElementConfig::Die { id, die, floorplan } => {
                    let die_config = self
                        .dies
                        .get(die)
                        .ok_or_else(|| IceError::config(format!("unknown die type '{}'", die)))?;
                    let layers = die_config.layers.iter().map(&layer).collect::<Result<Vec<_>>>()?;
                    let mut plan = Floorplan::new();
                    for fe in floorplan {
                        let mut element = FloorplanElement::new(&fe.id, fe.sw_x, fe.sw_y, fe.length, fe.width);
                        element.power = fe.power;
                        plan.add(element)?;
                    }
                    (id, StackElementKind::Die(Die::new(layers, die_config.source_layer, plan)?))
                }
                StackElementConfig::Layer { id, layer: l } => (id, StackElementKind::Layer(layer(l)?)),
                StackElementConfig::Channel { id } => (id, StackElementKind::Channel),
            };
            elements.push((id.clone(), kind));
        }

        let mut builder = StackBuilder::new(self.chip, CellDimensions::from(&self.cell), catalog.clone())
            .top_boundary(self.top_boundary);
        if let Some(c) = &self.channel {
            let wall = catalog.require(&c.wall_material)?;
            builder = builder.channel(Channel::new(c.height, c.coolant, wall, c.flow_rate));
        }
        for (id, kind) in elements {
            builder = builder.push(id, kind);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "materials": [
            { "name": "si", "thermal_conductivity": 1.3e-4, "volumetric_heat_capacity": 1.628e-12 }
        ],
        "chip": { "length": 400.0, "width": 400.0 },
        "cell": { "length": 100.0, "width": 100.0 },
        "dies": { "core": { "layers": [
            { "height": 50.0, "material": "si" },
            { "height": 10.0, "material": "si" } ], "source_layer": 1 } },
        "stack": [
            { "kind": "layer", "id": "base", "height": 100.0, "material": "si" },
            { "kind": "die", "id": "die0", "die": "core",
              "floorplan": [ { "id": "cpu", "sw_x": 100.0, "sw_y": 100.0, "length": 200.0, "width": 200.0, "power": 2.0 } ] }
        ]
    }"#;

    #[test]
    fn test_build_minimal() {
        let stack = StackConfig::from_json_str(MINIMAL).unwrap().build().unwrap();
        assert_eq!(stack.dimensions().n_layers(), 3);
        let (element, die) = stack.find_die("die0").unwrap();
        assert_eq!(element.layers_offset, 1);
        assert_eq!(element.source_layer_index(), Some(2));
        assert_eq!(die.floorplan.find("cpu").unwrap().power, 2.0);
        assert_eq!(stack.top_boundary(), TopBoundary::Adiabatic);
    }

    #[test]
    fn test_unknown_material() {
        let text = MINIMAL.replace(r#""height": 100.0, "material": "si""#, r#""height": 100.0, "material": "gold""#);
        let err = StackConfig::from_json_str(&text).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("gold"));
    }

    #[test]
    fn test_malformed_json() {
        let err = StackConfig::from_json_str("{ \"materials\": 3 }").unwrap_err();
        assert_eq!(err.code(), -6);
    }
}
