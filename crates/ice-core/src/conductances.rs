//! Cell-level physics: directional conductances and capacities.
//!
//! Each cell stores the conductance from its centre to each of its six
//! faces. Neighbouring cells are coupled through the series combination of
//! the two facing half-conductances, except along the flow direction of a
//! liquid cell where the stored values are the signed advective terms.

/// One of the six faces of a cell, in matrix emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Bottom,
    South,
    West,
    East,
    North,
    Top,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bottom => Direction::Top,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::East => Direction::West,
            Direction::North => Direction::South,
            Direction::Top => Direction::Bottom,
        }
    }
}

/// Physical nature of a cell, which decides how it couples to neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellKind {
    #[default]
    Solid,
    Liquid,
}

/// Conductances (W/K) from the centre of a cell to its six faces.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Conductances {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Conductances {
    pub fn get(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Bottom => self.bottom,
            Direction::South => self.south,
            Direction::West => self.west,
            Direction::East => self.east,
            Direction::North => self.north,
            Direction::Top => self.top,
        }
    }
}

/// Size of one cell, in micrometres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGeometry {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl CellGeometry {
    pub fn volume(&self) -> f64 {
        self.length * self.width * self.height
    }

    pub fn top_surface(&self) -> f64 {
        self.length * self.width
    }
}

/// Series combination of two conductances.
#[inline]
pub fn combine(a: f64, b: f64) -> f64 {
    let sum = a + b;
    if sum == 0.0 {
        0.0
    } else {
        a * b / sum
    }
}

/// Conductances of a solid cell.
///
/// `ambient_htc` is the heat transfer coefficient towards the environment
/// above the top layer, `None` for an adiabatic top.
pub fn solid_cell(
    geometry: CellGeometry,
    conductivity: f64,
    position: crate::dimensions::LayerPosition,
    ambient_htc: Option<f64>,
) -> Conductances {
    use crate::dimensions::LayerPosition;

    let CellGeometry {
        length,
        width,
        height,
    } = geometry;

    let lateral_ns = conductivity * length * height / (width / 2.0);
    let lateral_ew = conductivity * width * height / (length / 2.0);
    let half_vertical = conductivity * length * width / (height / 2.0);
    let full_vertical = conductivity * length * width / height;
    let ambient = |htc: f64| combine(half_vertical, htc * length * width);

    let (top, bottom) = match position {
        LayerPosition::Central => (half_vertical, half_vertical),
        LayerPosition::Bottom => (full_vertical, 0.0),
        LayerPosition::Top => match ambient_htc {
            Some(htc) => (ambient(htc), half_vertical),
            None => (0.0, full_vertical),
        },
        LayerPosition::Only => (ambient_htc.map_or(0.0, ambient), 0.0),
    };

    Conductances {
        north: lateral_ns,
        south: lateral_ns,
        east: lateral_ew,
        west: lateral_ew,
        top,
        bottom,
    }
}

/// Conductances of a liquid cell.
///
/// `advection` is the half heat-capacity flow rate `C` of one channel;
/// flow goes from row 0 towards the last row so North is `+C` and South
/// is `-C`.
pub fn liquid_cell(geometry: CellGeometry, coolant_htc: f64, advection: f64) -> Conductances {
    let side = coolant_htc * geometry.width * geometry.height;
    let vertical = coolant_htc * geometry.width * geometry.length;
    Conductances {
        north: advection,
        south: -advection,
        east: side,
        west: side,
        top: vertical,
        bottom: vertical,
    }
}

/// Thermal capacity pre-divided by the time step.
#[inline]
pub fn capacity(geometry: CellGeometry, volumetric_heat_capacity: f64, delta_time: f64) -> f64 {
    geometry.volume() * volumetric_heat_capacity / delta_time
}
