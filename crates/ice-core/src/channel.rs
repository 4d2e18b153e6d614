//! Inter-tier microchannel layer.
//!
//! Columns alternate between channel wall (even index, solid) and coolant
//! (odd index, liquid). The coolant enters at row 0 and leaves at the last
//! row.
//!
//! With `Q` the heat-capacity flow rate of one channel (coolant VHC times
//! the flow rate of one channel), a liquid cell couples to its upstream and
//! downstream neighbours through the central-difference terms `±C` with
//! `C = Q / 2`. The inlet cell receives `2·C·T_in` as a source and `+C` on
//! its diagonal, the outlet cell `+C` on its diagonal, so that a field at
//! uniform `T_in` is an exact solution.

use serde::{Deserialize, Serialize};

use crate::conductances::{capacity, liquid_cell, solid_cell, CellGeometry, CellKind, Conductances};
use crate::dimensions::Dimensions;
use crate::material::{MaterialCatalog, MaterialId};

/// ml/min to um³/s.
pub fn ml_per_min_to_um3_per_s(flow_rate: f64) -> f64 {
    flow_rate * 1e12 / 60.0
}

/// Coolant properties shared by every channel layer of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coolant {
    /// W / (um² · K)
    pub heat_transfer_coefficient: f64,
    /// J / (um³ · K)
    pub volumetric_heat_capacity: f64,
    /// K
    pub inlet_temperature: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// um
    pub height: f64,
    pub coolant: Coolant,
    pub wall_material: MaterialId,
    /// um³ / s, total over all channels
    flow_rate: f64,
}

impl Channel {
    pub fn new(height: f64, coolant: Coolant, wall_material: MaterialId, flow_rate_ml_per_min: f64) -> Self {
        Self {
            height,
            coolant,
            wall_material,
            flow_rate: ml_per_min_to_um3_per_s(flow_rate_ml_per_min),
        }
    }

    /// Total volume flow rate in um³/s.
    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }

    pub(crate) fn set_flow_rate(&mut self, flow_rate_ml_per_min: f64) {
        self.flow_rate = ml_per_min_to_um3_per_s(flow_rate_ml_per_min);
    }

    #[inline]
    pub fn is_liquid_column(column: usize) -> bool {
        column % 2 == 1
    }

    pub fn n_liquid_columns(dims: &Dimensions) -> usize {
        dims.n_columns() / 2
    }

    /// Half heat-capacity flow rate `C` of one channel, W/K.
    pub fn advection(&self, dims: &Dimensions) -> f64 {
        let channels = Self::n_liquid_columns(dims);
        if channels == 0 {
            return 0.0;
        }
        self.coolant.volumetric_heat_capacity * self.flow_rate / (2.0 * channels as f64)
    }

    fn geometry(&self, dims: &Dimensions, column: usize) -> CellGeometry {
        CellGeometry {
            length: dims.cell_length(column),
            width: dims.cell_width(),
            height: self.height,
        }
    }

    /// `out` holds exactly the channel layer, whose grid index is
    /// `layer_index`.
    pub fn fill_conductances(
        &self,
        dims: &Dimensions,
        layer_index: usize,
        catalog: &MaterialCatalog,
        out: &mut [Conductances],
    ) {
        let wall = catalog.get(self.wall_material).thermal_conductivity;
        let position = dims.layer_position(layer_index);
        let c = self.advection(dims);
        for (offset, cell) in out.iter_mut().enumerate() {
            let column = offset % dims.n_columns();
            let geometry = self.geometry(dims, column);
            *cell = if Self::is_liquid_column(column) {
                liquid_cell(geometry, self.coolant.heat_transfer_coefficient, c)
            } else {
                solid_cell(geometry, wall, position, None)
            };
        }
    }

    pub fn fill_capacities(
        &self,
        dims: &Dimensions,
        catalog: &MaterialCatalog,
        delta_time: f64,
        out: &mut [f64],
    ) {
        let wall = catalog.get(self.wall_material).volumetric_heat_capacity;
        for (offset, cell) in out.iter_mut().enumerate() {
            let column = offset % dims.n_columns();
            let vhc = if Self::is_liquid_column(column) {
                self.coolant.volumetric_heat_capacity
            } else {
                wall
            };
            *cell = capacity(self.geometry(dims, column), vhc, delta_time);
        }
    }

    /// Inlet sources on row 0.
    pub fn fill_sources(&self, dims: &Dimensions, out: &mut [f64]) {
        let inflow = 2.0 * self.advection(dims) * self.coolant.inlet_temperature;
        for column in (0..dims.n_columns()).filter(|c| Self::is_liquid_column(*c)) {
            out[dims.cell_index_in_layer(0, column)] += inflow;
        }
    }

    pub fn fill_cell_kinds(&self, dims: &Dimensions, out: &mut [CellKind]) {
        for (offset, kind) in out.iter_mut().enumerate() {
            *kind = if Self::is_liquid_column(offset % dims.n_columns()) {
                CellKind::Liquid
            } else {
                CellKind::Solid
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_rate_units() {
        assert!((ml_per_min_to_um3_per_s(1.2) - 2e10).abs() < 1e-3);
    }

    #[test]
    fn test_liquid_columns() {
        assert!(!Channel::is_liquid_column(0));
        assert!(Channel::is_liquid_column(1));
        assert!(!Channel::is_liquid_column(2));
    }
}
