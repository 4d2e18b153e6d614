//! Pluggable heat-sink boundary above the top layer.
//!
//! A heat sink is polled at every [`ThermalData::fill`](crate::thermal_data::ThermalData::fill)
//! with the current temperatures of the top layer and answers with one of
//! two kinds of boundary contribution.

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum HeatSinkUpdate {
    /// Heat flow into each top-layer cell, W. Negative values extract heat.
    /// Only the source vector is refreshed.
    HeatFlows(Vec<f64>),
    /// Conductance from the centre of each top-layer cell to a sink held at
    /// `reference_temperature`. When `changed` is set the whole matrix is
    /// rebuilt and refactored.
    Conductances {
        top: Vec<f64>,
        reference_temperature: f64,
        changed: bool,
    },
}

pub trait HeatSink: Send {
    /// `top_layer_temperatures` has one value per top-layer cell, row-major.
    fn update(&mut self, top_layer_temperatures: &[f64]) -> Result<HeatSinkUpdate>;

    fn name(&self) -> &str {
        "heat sink"
    }
}

/// Heat sink with a fixed conductance per top cell, changed only through
/// [`FixedHeatSink::set_conductances`].
#[derive(Debug, Clone)]
pub struct FixedHeatSink {
    top: Vec<f64>,
    temperature: f64,
    changed: bool,
}

impl FixedHeatSink {
    pub fn new(top: Vec<f64>, temperature: f64) -> Self {
        Self {
            top,
            temperature,
            changed: true,
        }
    }

    /// Same conductance for every one of `cells` top cells.
    pub fn uniform(cells: usize, conductance: f64, temperature: f64) -> Self {
        Self::new(vec![conductance; cells], temperature)
    }

    pub fn set_conductances(&mut self, top: Vec<f64>) {
        self.top = top;
        self.changed = true;
    }
}

impl HeatSink for FixedHeatSink {
    fn update(&mut self, _top_layer_temperatures: &[f64]) -> Result<HeatSinkUpdate> {
        let changed = std::mem::replace(&mut self.changed, false);
        Ok(HeatSinkUpdate::Conductances {
            top: self.top.clone(),
            reference_temperature: self.temperature,
            changed,
        })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
