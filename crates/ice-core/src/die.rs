//! Dies: a group of layers, one of which dissipates the floorplan power.

use crate::conductances::{CellKind, Conductances};
use crate::dimensions::Dimensions;
use crate::error::{IceError, Result};
use crate::floorplan::Floorplan;
use crate::layer::Layer;
use crate::material::MaterialCatalog;

#[derive(Debug, Clone, PartialEq)]
pub struct Die {
    /// Bottom to top
    pub layers: Vec<Layer>,
    /// Index into `layers` of the layer that receives the floorplan power
    pub source_layer: usize,
    pub floorplan: Floorplan,
}

impl Die {
    /// Build a die and assign each layer its offset inside the die.
    pub fn new(mut layers: Vec<Layer>, source_layer: usize, floorplan: Floorplan) -> Result<Self> {
        if layers.is_empty() {
            return Err(IceError::config("a die needs at least one layer"));
        }
        if source_layer >= layers.len() {
            return Err(IceError::config(format!(
                "source layer {} out of range for a die with {} layers",
                source_layer,
                layers.len()
            )));
        }
        for (offset, layer) in layers.iter_mut().enumerate() {
            layer.offset = offset;
        }
        Ok(Self {
            layers,
            source_layer,
            floorplan,
        })
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// `out` covers the die's layers only; `first_layer` is the grid index
    /// of the bottom one.
    pub fn fill_conductances(
        &self,
        dims: &Dimensions,
        first_layer: usize,
        catalog: &MaterialCatalog,
        ambient_htc: Option<f64>,
        out: &mut [Conductances],
    ) {
        for (layer, chunk) in self.layers.iter().zip(out.chunks_mut(dims.layer_stride())) {
            layer.fill_conductances(dims, first_layer + layer.offset, catalog, ambient_htc, chunk);
        }
    }

    pub fn fill_capacities(
        &self,
        dims: &Dimensions,
        catalog: &MaterialCatalog,
        delta_time: f64,
        out: &mut [f64],
    ) {
        for (layer, chunk) in self.layers.iter().zip(out.chunks_mut(dims.layer_stride())) {
            layer.fill_capacities(dims, catalog, delta_time, chunk);
        }
    }

    pub fn fill_sources(&self, dims: &Dimensions, out: &mut [f64]) {
        let stride = dims.layer_stride();
        let start = self.source_layer * stride;
        self.floorplan.fill_sources(dims, &mut out[start..start + stride]);
    }

    pub fn fill_cell_kinds(&self, out: &mut [CellKind]) {
        out.fill(CellKind::Solid);
    }
}
