//! Stack description: the ordered composition of dies, layers and channels.
//!
//! Elements are kept bottom to top. Each element owns a contiguous range of
//! grid layers starting at its `layers_offset`, which is the sum of the
//! layer counts of every element below it. All the per-cell fill routines
//! walk the elements in that order and hand each one exactly its slice of
//! the grid-wide buffers.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::channel::Channel;
use crate::conductances::{CellKind, Conductances};
use crate::die::Die;
use crate::dimensions::{CellDimensions, ChipDimensions, Dimensions};
use crate::error::{IceError, Result};
use crate::floorplan::FloorplanElement;
use crate::layer::Layer;
use crate::material::MaterialCatalog;

/// Thermal boundary condition above the top-most layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopBoundary {
    /// No heat leaves through the top face.
    #[default]
    Adiabatic,
    /// Convective exchange with an environment at fixed temperature.
    Ambient {
        /// W / (um² · K)
        heat_transfer_coefficient: f64,
        /// K
        ambient_temperature: f64,
    },
}

impl TopBoundary {
    pub fn heat_transfer_coefficient(&self) -> Option<f64> {
        match self {
            TopBoundary::Adiabatic => None,
            TopBoundary::Ambient {
                heat_transfer_coefficient,
                ..
            } => Some(*heat_transfer_coefficient),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StackElementKind {
    Die(Die),
    Layer(Layer),
    /// One layer built from the stack-wide [`Channel`].
    Channel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackElement {
    pub id: String,
    pub kind: StackElementKind,
    /// Grid index of the element's bottom layer
    pub layers_offset: usize,
}

impl StackElement {
    pub fn n_layers(&self) -> usize {
        match &self.kind {
            StackElementKind::Die(die) => die.n_layers(),
            StackElementKind::Layer(_) | StackElementKind::Channel => 1,
        }
    }

    pub fn as_die(&self) -> Option<&Die> {
        match &self.kind {
            StackElementKind::Die(die) => Some(die),
            _ => None,
        }
    }

    pub fn is_channel(&self) -> bool {
        matches!(self.kind, StackElementKind::Channel)
    }

    /// Grid index of the die's source layer.
    pub fn source_layer_index(&self) -> Option<usize> {
        self.as_die().map(|die| self.layers_offset + die.source_layer)
    }

    fn kind_name(&self) -> &'static str {
        match self.kind {
            StackElementKind::Die(_) => "die",
            StackElementKind::Layer(_) => "layer",
            StackElementKind::Channel => "channel",
        }
    }
}

/// Collects the pieces of a stack and validates them in [`StackBuilder::build`].
#[derive(Debug, Clone)]
pub struct StackBuilder {
    chip: ChipDimensions,
    cell: CellDimensions,
    materials: MaterialCatalog,
    channel: Option<Channel>,
    top_boundary: TopBoundary,
    elements: Vec<StackElement>,
}

impl StackBuilder {
    pub fn new(chip: ChipDimensions, cell: CellDimensions, materials: MaterialCatalog) -> Self {
        Self {
            chip,
            cell,
            materials,
            channel: None,
            top_boundary: TopBoundary::default(),
            elements: Vec::new(),
        }
    }

    pub fn materials(&self) -> &MaterialCatalog {
        &self.materials
    }

    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn top_boundary(mut self, boundary: TopBoundary) -> Self {
        self.top_boundary = boundary;
        self
    }

    /// Add an element on top of the ones already pushed.
    pub fn push(mut self, id: impl Into<String>, kind: StackElementKind) -> Self {
        self.elements.push(StackElement {
            id: id.into(),
            kind,
            layers_offset: 0,
        });
        self
    }

    pub fn build(self) -> Result<StackDescription> {
        let StackBuilder {
            chip,
            cell,
            materials,
            channel,
            top_boundary,
            mut elements,
        } = self;

        if elements.is_empty() {
            return Err(IceError::config("the stack has no elements"));
        }
        for (i, element) in elements.iter().enumerate() {
            if elements[..i].iter().any(|e| e.id == element.id) {
                return Err(IceError::config(format!(
                    "stack element '{}' defined twice",
                    element.id
                )));
            }
        }

        let last = elements.len() - 1;
        for (i, element) in elements.iter().enumerate() {
            if !element.is_channel() {
                continue;
            }
            if channel.is_none() {
                return Err(IceError::config(format!(
                    "stack element '{}' is a channel but no channel is defined",
                    element.id
                )));
            }
            if i == 0 || i == last {
                return Err(IceError::config(format!(
                    "channel '{}' cannot be the bottom or top element of the stack",
                    element.id
                )));
            }
        }

        let mut offset = 0;
        for element in &mut elements {
            element.layers_offset = offset;
            offset += element.n_layers();
        }

        let dimensions = Dimensions::new(chip, cell, offset)?;

        for element in &mut elements {
            if let StackElementKind::Die(die) = &mut element.kind {
                die.floorplan.snap(&dimensions)?;
            }
        }

        let stack = StackDescription {
            elements,
            dimensions,
            materials,
            channel,
            top_boundary,
            power_values_changed: true,
            flow_rate_changed: true,
        };
        stack.check_layer_count()?;

        info!(
            elements = stack.elements.len(),
            layers = dimensions.n_layers(),
            rows = dimensions.n_rows(),
            columns = dimensions.n_columns(),
            nnz = dimensions.n_nonzeros(),
            "stack description built"
        );
        Ok(stack)
    }
}

/// Root aggregate of the thermal model.
#[derive(Debug, Clone)]
pub struct StackDescription {
    elements: Vec<StackElement>,
    dimensions: Dimensions,
    materials: MaterialCatalog,
    channel: Option<Channel>,
    top_boundary: TopBoundary,
    power_values_changed: bool,
    flow_rate_changed: bool,
}

impl StackDescription {
    pub fn elements(&self) -> &[StackElement] {
        &self.elements
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    pub fn materials(&self) -> &MaterialCatalog {
        &self.materials
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn top_boundary(&self) -> TopBoundary {
        self.top_boundary
    }

    pub fn power_values_changed(&self) -> bool {
        self.power_values_changed
    }

    pub fn flow_rate_changed(&self) -> bool {
        self.flow_rate_changed
    }

    pub(crate) fn clear_dirty_flags(&mut self) {
        self.power_values_changed = false;
        self.flow_rate_changed = false;
    }

    pub(crate) fn clear_power_flag(&mut self) {
        self.power_values_changed = false;
    }

    fn check_layer_count(&self) -> Result<()> {
        let sum: usize = self.elements.iter().map(StackElement::n_layers).sum();
        if sum != self.dimensions.n_layers() {
            return Err(IceError::internal(format!(
                "stack elements span {} layers, grid has {}",
                sum,
                self.dimensions.n_layers()
            )));
        }
        Ok(())
    }

    pub fn find_element(&self, id: &str) -> Result<&StackElement> {
        self.elements
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| IceError::UnknownStackElement { id: id.to_string() })
    }

    /// The die with this id, together with its stack element.
    pub fn find_die(&self, id: &str) -> Result<(&StackElement, &Die)> {
        let element = self.find_element(id)?;
        match element.as_die() {
            Some(die) => Ok((element, die)),
            None => Err(IceError::NotADie { id: id.to_string() }),
        }
    }

    pub fn find_floorplan_element(&self, die_id: &str, element_id: &str) -> Result<(&StackElement, &FloorplanElement)> {
        let (element, die) = self.find_die(die_id)?;
        die.floorplan
            .find(element_id)
            .map(|fe| (element, fe))
            .ok_or_else(|| IceError::UnknownFloorplanElement {
                die: die_id.to_string(),
                element: element_id.to_string(),
            })
    }

    fn dies_mut(&mut self) -> impl Iterator<Item = &mut Die> {
        self.elements.iter_mut().filter_map(|e| match &mut e.kind {
            StackElementKind::Die(die) => Some(die),
            _ => None,
        })
    }

    /// Number of floorplan elements over every die, in stack order.
    pub fn n_floorplan_elements(&self) -> usize {
        self.elements
            .iter()
            .filter_map(StackElement::as_die)
            .map(|die| die.floorplan.len())
            .sum()
    }

    /// Assign power values to every floorplan element, walking dies bottom
    /// to top and each floorplan in definition order.
    pub fn insert_all_power_values(&mut self, values: &[f64]) -> Result<()> {
        let expected = self.n_floorplan_elements();
        if values.len() != expected {
            return Err(IceError::PowerValueCount {
                expected,
                found: values.len(),
            });
        }
        let mut rest = values;
        for die in self.dies_mut() {
            let (head, tail) = rest.split_at(die.floorplan.len());
            die.floorplan.insert_power_values(head);
            rest = tail;
        }
        self.power_values_changed = true;
        Ok(())
    }

    pub fn insert_power_value(&mut self, die_id: &str, element_id: &str, power: f64) -> Result<()> {
        self.find_floorplan_element(die_id, element_id)?;
        let element = self
            .elements
            .iter_mut()
            .find(|e| e.id == die_id)
            .and_then(|e| match &mut e.kind {
                StackElementKind::Die(die) => die.floorplan.find_mut(element_id),
                _ => None,
            })
            .ok_or_else(|| IceError::internal("floorplan element vanished during update"))?;
        element.power = power;
        self.power_values_changed = true;
        Ok(())
    }

    /// Change the coolant flow rate, in ml/min.
    pub fn set_flow_rate(&mut self, flow_rate_ml_per_min: f64) -> Result<()> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| IceError::config("the stack has no channel"))?;
        channel.set_flow_rate(flow_rate_ml_per_min);
        self.flow_rate_changed = true;
        debug!(flow_rate = channel.flow_rate(), "flow rate changed");
        Ok(())
    }

    fn layers_range(&self, element: &StackElement) -> std::ops::Range<usize> {
        let stride = self.dimensions.layer_stride();
        element.layers_offset * stride..(element.layers_offset + element.n_layers()) * stride
    }

    /// Grid index of the top-most layer.
    pub fn top_layer(&self) -> usize {
        self.dimensions.n_layers() - 1
    }

    /// Fill the conductances of every cell. `out` has one entry per cell.
    pub fn fill_conductances(&self, out: &mut [Conductances]) -> Result<()> {
        let dims = &self.dimensions;
        let ambient = self.top_boundary.heat_transfer_coefficient();
        for element in &self.elements {
            let range = self.layers_range(element);
            let slice = &mut out[range];
            match &element.kind {
                StackElementKind::Die(die) => {
                    die.fill_conductances(dims, element.layers_offset, &self.materials, ambient, slice)
                }
                StackElementKind::Layer(layer) => {
                    layer.fill_conductances(dims, element.layers_offset, &self.materials, ambient, slice)
                }
                StackElementKind::Channel => self
                    .require_channel(element)?
                    .fill_conductances(dims, element.layers_offset, &self.materials, slice),
            }
        }
        Ok(())
    }

    pub fn fill_capacities(&self, delta_time: f64, out: &mut [f64]) -> Result<()> {
        let dims = &self.dimensions;
        for element in &self.elements {
            let range = self.layers_range(element);
            let slice = &mut out[range];
            match &element.kind {
                StackElementKind::Die(die) => die.fill_capacities(dims, &self.materials, delta_time, slice),
                StackElementKind::Layer(layer) => {
                    layer.fill_capacities(dims, &self.materials, delta_time, slice)
                }
                StackElementKind::Channel => self
                    .require_channel(element)?
                    .fill_capacities(dims, &self.materials, delta_time, slice),
            }
        }
        Ok(())
    }

    /// Fill the source vector: floorplan power, coolant inflow and, for an
    /// ambient top boundary, the environment term of the top layer. The
    /// top-layer conductances must already be filled.
    pub fn fill_sources(&self, conductances: &[Conductances], out: &mut [f64]) -> Result<()> {
        out.fill(0.0);
        let dims = &self.dimensions;
        for element in &self.elements {
            let range = self.layers_range(element);
            let slice = &mut out[range];
            match &element.kind {
                StackElementKind::Die(die) => die.fill_sources(dims, slice),
                StackElementKind::Layer(_) => {}
                StackElementKind::Channel => self.require_channel(element)?.fill_sources(dims, slice),
            }
        }

        if let TopBoundary::Ambient {
            ambient_temperature,
            ..
        } = self.top_boundary
        {
            let start = self.top_layer() * dims.layer_stride();
            for cell in start..start + dims.layer_stride() {
                out[cell] += ambient_temperature * conductances[cell].top;
            }
        }
        Ok(())
    }

    pub fn fill_cell_kinds(&self, out: &mut [CellKind]) -> Result<()> {
        let dims = &self.dimensions;
        for element in &self.elements {
            let range = self.layers_range(element);
            let slice = &mut out[range];
            match &element.kind {
                StackElementKind::Die(die) => die.fill_cell_kinds(slice),
                StackElementKind::Layer(layer) => layer.fill_cell_kinds(slice),
                StackElementKind::Channel => self.require_channel(element)?.fill_cell_kinds(dims, slice),
            }
        }
        Ok(())
    }

    fn require_channel(&self, element: &StackElement) -> Result<&Channel> {
        self.channel.as_ref().ok_or_else(|| {
            IceError::internal(format!(
                "channel element '{}' without a channel definition",
                element.id
            ))
        })
    }
}

impl fmt::Display for StackDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.dimensions)?;
        for element in self.elements.iter().rev() {
            write!(
                f,
                "  {:<8} {:<16} layers {}..{}",
                element.kind_name(),
                element.id,
                element.layers_offset,
                element.layers_offset + element.n_layers()
            )?;
            if let Some(die) = element.as_die() {
                write!(
                    f,
                    "  source layer {}  {} floorplan elements",
                    element.layers_offset + die.source_layer,
                    die.floorplan.len()
                )?;
            }
            writeln!(f)?;
        }
        match self.top_boundary {
            TopBoundary::Adiabatic => write!(f, "  top boundary adiabatic"),
            TopBoundary::Ambient {
                heat_transfer_coefficient,
                ambient_temperature,
            } => write!(
                f,
                "  top boundary ambient htc {:.4e} at {:.2} K",
                heat_transfer_coefficient, ambient_temperature
            ),
        }
    }
}
