//! Solid layers.

use crate::conductances::{capacity, solid_cell, CellGeometry, CellKind, Conductances};
use crate::dimensions::Dimensions;
use crate::material::{MaterialCatalog, MaterialId};

/// A slab of homogeneous material spanning the whole chip footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// um
    pub height: f64,
    pub material: MaterialId,
    /// Position of the layer inside its die, 0 for the bottom one. Always 0
    /// for a stand-alone layer.
    pub offset: usize,
}

impl Layer {
    pub fn new(height: f64, material: MaterialId) -> Self {
        Self {
            height,
            material,
            offset: 0,
        }
    }

    pub fn geometry(&self, dims: &Dimensions, column: usize) -> CellGeometry {
        CellGeometry {
            length: dims.cell_length(column),
            width: dims.cell_width(),
            height: self.height,
        }
    }

    /// Fill the conductances of every cell of the layer with grid index
    /// `layer_index`. `out` holds exactly one layer of cells.
    pub fn fill_conductances(
        &self,
        dims: &Dimensions,
        layer_index: usize,
        catalog: &MaterialCatalog,
        ambient_htc: Option<f64>,
        out: &mut [Conductances],
    ) {
        let conductivity = catalog.get(self.material).thermal_conductivity;
        let position = dims.layer_position(layer_index);
        for (offset, cell) in out.iter_mut().enumerate() {
            let column = offset % dims.n_columns();
            *cell = solid_cell(
                self.geometry(dims, column),
                conductivity,
                position,
                ambient_htc,
            );
        }
    }

    pub fn fill_capacities(
        &self,
        dims: &Dimensions,
        catalog: &MaterialCatalog,
        delta_time: f64,
        out: &mut [f64],
    ) {
        let vhc = catalog.get(self.material).volumetric_heat_capacity;
        for (offset, cell) in out.iter_mut().enumerate() {
            let column = offset % dims.n_columns();
            *cell = capacity(self.geometry(dims, column), vhc, delta_time);
        }
    }

    pub fn fill_cell_kinds(&self, out: &mut [CellKind]) {
        out.fill(CellKind::Solid);
    }
}
