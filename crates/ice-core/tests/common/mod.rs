//! Stacks shared by the integration tests.

#![allow(dead_code)]

use ice_core::channel::{Channel, Coolant};
use ice_core::die::Die;
use ice_core::dimensions::{CellDimensions, ChipDimensions};
use ice_core::floorplan::{Floorplan, FloorplanElement};
use ice_core::layer::Layer;
use ice_core::material::{Material, MaterialCatalog, MaterialId};
use ice_core::solver::SolverType;
use ice_core::system_matrix::MatrixStorage;
use ice_core::{StackBuilder, StackDescription, StackElementKind, ThermalConfig, TopBoundary};

pub const INLET: f64 = 300.0;

pub fn silicon() -> (MaterialCatalog, MaterialId) {
    let mut catalog = MaterialCatalog::new();
    let si = catalog
        .add(Material::new("silicon", 1.30e-4, 1.628e-12))
        .unwrap();
    (catalog, si)
}

pub fn water(inlet_temperature: f64) -> Coolant {
    Coolant {
        heat_transfer_coefficient: 1.2e-4,
        volumetric_heat_capacity: 4.172638e-12,
        inlet_temperature,
    }
}

/// Two-layer die, source layer on top, floorplan elements "hot" (centered
/// 2x2 cells) and "edge" (south-west corner cell).
fn test_die(si: MaterialId) -> Die {
    let mut floorplan = Floorplan::new();
    floorplan
        .add(FloorplanElement::new("hot", 100.0, 100.0, 200.0, 200.0))
        .unwrap();
    floorplan
        .add(FloorplanElement::new("edge", 0.0, 0.0, 100.0, 100.0))
        .unwrap();
    Die::new(vec![Layer::new(50.0, si), Layer::new(10.0, si)], 1, floorplan).unwrap()
}

/// 4x4 grid of 100 um cells, a single die.
pub fn die_stack(top_boundary: TopBoundary) -> StackDescription {
    let (catalog, si) = silicon();
    StackBuilder::new(
        ChipDimensions { length: 400.0, width: 400.0 },
        CellDimensions::uniform(100.0, 100.0),
        catalog,
    )
    .top_boundary(top_boundary)
    .push("die", StackElementKind::Die(test_die(si)))
    .build()
    .unwrap()
}

/// Same grid as [`die_stack`], the die has no floorplan element.
pub fn blank_die_stack() -> StackDescription {
    let (catalog, si) = silicon();
    let die = Die::new(vec![Layer::new(50.0, si), Layer::new(10.0, si)], 1, Floorplan::new()).unwrap();
    StackBuilder::new(
        ChipDimensions { length: 400.0, width: 400.0 },
        CellDimensions::uniform(100.0, 100.0),
        catalog,
    )
    .push("die", StackElementKind::Die(die))
    .build()
    .unwrap()
}

/// 4 rows by 5 columns: base layer, channel, die.
pub fn channel_stack(inlet_temperature: f64, flow_rate_ml_per_min: f64) -> StackDescription {
    let (catalog, si) = silicon();
    StackBuilder::new(
        ChipDimensions { length: 500.0, width: 400.0 },
        CellDimensions::uniform(100.0, 100.0),
        catalog,
    )
    .channel(Channel::new(100.0, water(inlet_temperature), si, flow_rate_ml_per_min))
    .push("base", StackElementKind::Layer(Layer::new(100.0, si)))
    .push("ch", StackElementKind::Channel)
    .push("die", StackElementKind::Die(test_die(si)))
    .build()
    .unwrap()
}

pub fn ambient(heat_transfer_coefficient: f64) -> TopBoundary {
    TopBoundary::Ambient {
        heat_transfer_coefficient,
        ambient_temperature: 300.0,
    }
}

pub fn config(delta_time: f64, storage: MatrixStorage, solver: SolverType) -> ThermalConfig {
    ThermalConfig {
        delta_time,
        initial_temperature: 300.0,
        storage,
        solver,
    }
}
