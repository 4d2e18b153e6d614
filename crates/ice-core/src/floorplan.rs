//! Floorplans: named rectangular power sources on the source layer of a die.
//!
//! An element covers every grid column whose centre lies inside
//! `[sw_x, sw_x + length]` and every row whose centre lies inside
//! `[sw_y, sw_y + width]`. The resulting span is stored with inclusive
//! bounds.

use crate::dimensions::Dimensions;
use crate::error::{IceError, Result};

const EPS: f64 = 1e-9;

/// Inclusive rectangle of grid cells inside one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpan {
    pub sw_row: usize,
    pub sw_column: usize,
    pub ne_row: usize,
    pub ne_column: usize,
}

impl CellSpan {
    pub fn n_rows(&self) -> usize {
        self.ne_row - self.sw_row + 1
    }

    pub fn n_columns(&self) -> usize {
        self.ne_column - self.sw_column + 1
    }

    pub fn n_cells(&self) -> usize {
        self.n_rows() * self.n_columns()
    }

    /// (row, column) pairs, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.sw_row..=self.ne_row)
            .flat_map(move |row| (self.sw_column..=self.ne_column).map(move |col| (row, col)))
    }

    /// True when both spans cover at least one common cell.
    pub fn intersects(&self, other: &CellSpan) -> bool {
        self.sw_row <= other.ne_row
            && other.sw_row <= self.ne_row
            && self.sw_column <= other.ne_column
            && other.sw_column <= self.ne_column
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloorplanElement {
    pub id: String,
    /// South-west corner, um
    pub sw_x: f64,
    pub sw_y: f64,
    /// Extent along x, um
    pub length: f64,
    /// Extent along y, um
    pub width: f64,
    /// Dissipated power, W
    pub power: f64,
    span: Option<CellSpan>,
}

impl FloorplanElement {
    pub fn new(id: impl Into<String>, sw_x: f64, sw_y: f64, length: f64, width: f64) -> Self {
        Self {
            id: id.into(),
            sw_x,
            sw_y,
            length,
            width,
            power: 0.0,
            span: None,
        }
    }

    pub fn area(&self) -> f64 {
        self.length * self.width
    }

    /// Grid cells covered by the element, `None` until snapped.
    pub fn span(&self) -> Option<CellSpan> {
        self.span
    }

    /// Strict rectangle intersection; touching edges do not overlap.
    pub fn overlaps(&self, other: &FloorplanElement) -> bool {
        self.sw_x < other.sw_x + other.length
            && other.sw_x < self.sw_x + self.length
            && self.sw_y < other.sw_y + other.width
            && other.sw_y < self.sw_y + self.width
    }

    fn snap(&mut self, dims: &Dimensions) -> Result<CellSpan> {
        if self.sw_x < -EPS
            || self.sw_y < -EPS
            || self.sw_x + self.length > dims.chip.length + EPS
            || self.sw_y + self.width > dims.chip.width + EPS
        {
            return Err(IceError::FloorplanElementOutOfChip {
                element: self.id.clone(),
            });
        }

        let east = self.sw_x + self.length;
        let north = self.sw_y + self.width;
        let columns = covered(dims.n_columns(), |c| dims.cell_center_x(c), self.sw_x, east);
        let rows = covered(dims.n_rows(), |r| dims.cell_center_y(r), self.sw_y, north);

        match (rows, columns) {
            (Some((sw_row, ne_row)), Some((sw_column, ne_column))) => {
                let span = CellSpan {
                    sw_row,
                    sw_column,
                    ne_row,
                    ne_column,
                };
                self.span = Some(span);
                Ok(span)
            }
            _ => Err(IceError::EmptyFloorplanElement {
                element: self.id.clone(),
            }),
        }
    }

    /// Total top surface of the covered cells.
    pub fn covered_surface(&self, dims: &Dimensions) -> f64 {
        self.span.map_or(0.0, |span| {
            span.cells()
                .map(|(_, column)| dims.cell_top_surface(column))
                .sum()
        })
    }

    /// Spread the power over the covered cells, weighted by top surface.
    /// `out` is one layer of the source vector.
    pub fn fill_sources(&self, dims: &Dimensions, out: &mut [f64]) {
        let Some(span) = self.span else { return };
        let surface = self.covered_surface(dims);
        if surface <= 0.0 {
            return;
        }
        for (row, column) in span.cells() {
            out[dims.cell_index_in_layer(row, column)] +=
                self.power * dims.cell_top_surface(column) / surface;
        }
    }

    fn temperatures<'a>(
        &'a self,
        dims: &'a Dimensions,
        layer: &'a [f64],
    ) -> impl Iterator<Item = f64> + 'a {
        self.span
            .into_iter()
            .flat_map(|span| span.cells().collect::<Vec<_>>())
            .map(move |(row, column)| layer[dims.cell_index_in_layer(row, column)])
    }

    pub fn max_temperature(&self, dims: &Dimensions, layer: &[f64]) -> f64 {
        self.temperatures(dims, layer).fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min_temperature(&self, dims: &Dimensions, layer: &[f64]) -> f64 {
        self.temperatures(dims, layer).fold(f64::INFINITY, f64::min)
    }

    pub fn avg_temperature(&self, dims: &Dimensions, layer: &[f64]) -> f64 {
        let (sum, count) = self
            .temperatures(dims, layer)
            .fold((0.0, 0usize), |(s, n), t| (s + t, n + 1));
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }
}

/// First and last index whose centre lies in `[lo, hi]`.
fn covered(n: usize, center: impl Fn(usize) -> f64, lo: f64, hi: f64) -> Option<(usize, usize)> {
    let inside = |i: &usize| {
        let c = center(*i);
        c >= lo - EPS && c <= hi + EPS
    };
    let first = (0..n).find(inside)?;
    let last = (0..n).rev().find(inside)?;
    Some((first, last))
}

/// Ordered set of non-overlapping floorplan elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Floorplan {
    elements: Vec<FloorplanElement>,
}

impl Floorplan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element; ids are unique and elements may not overlap.
    pub fn add(&mut self, element: FloorplanElement) -> Result<()> {
        if self.find(&element.id).is_some() {
            return Err(IceError::config(format!(
                "floorplan element '{}' defined twice",
                element.id
            )));
        }
        if !(element.length > 0.0 && element.width > 0.0) {
            return Err(IceError::EmptyFloorplanElement {
                element: element.id,
            });
        }
        if let Some(other) = self.elements.iter().find(|e| e.overlaps(&element)) {
            return Err(IceError::OverlappingFloorplanElements {
                first: other.id.clone(),
                second: element.id,
            });
        }
        self.elements.push(element);
        Ok(())
    }

    /// Align every element to the grid. Elements that touch along a cell
    /// centre line would both claim that row or column of cells, which is
    /// reported as an overlap.
    pub fn snap(&mut self, dims: &Dimensions) -> Result<()> {
        for element in &mut self.elements {
            element.snap(dims)?;
        }
        for (i, first) in self.elements.iter().enumerate() {
            for second in &self.elements[i + 1..] {
                if let (Some(a), Some(b)) = (first.span, second.span) {
                    if a.intersects(&b) {
                        return Err(IceError::OverlappingFloorplanElements {
                            first: first.id.clone(),
                            second: second.id.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn elements(&self) -> &[FloorplanElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&FloorplanElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut FloorplanElement> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    /// Assign powers in element order. `values` must have one entry per
    /// element.
    pub fn insert_power_values(&mut self, values: &[f64]) {
        for (element, &power) in self.elements.iter_mut().zip(values) {
            element.power = power;
        }
    }

    pub fn total_power(&self) -> f64 {
        self.elements.iter().map(|e| e.power).sum()
    }

    pub fn fill_sources(&self, dims: &Dimensions, out: &mut [f64]) {
        for element in &self.elements {
            element.fill_sources(dims, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::{CellDimensions, ChipDimensions};

    fn dims() -> Dimensions {
        Dimensions::new(
            ChipDimensions {
                length: 400.0,
                width: 400.0,
            },
            CellDimensions::uniform(100.0, 100.0),
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_snap_centered() {
        let d = dims();
        let mut fp = Floorplan::new();
        fp.add(FloorplanElement::new("core", 100.0, 100.0, 200.0, 200.0))
            .unwrap();
        fp.snap(&d).unwrap();
        let span = fp.elements()[0].span().unwrap();
        assert_eq!((span.sw_row, span.ne_row), (1, 2));
        assert_eq!((span.sw_column, span.ne_column), (1, 2));
        assert_eq!(span.n_cells(), 4);
    }

    #[test]
    fn test_edges_touching_do_not_overlap() {
        let a = FloorplanElement::new("a", 0.0, 0.0, 200.0, 400.0);
        let b = FloorplanElement::new("b", 200.0, 0.0, 200.0, 400.0);
        assert!(!a.overlaps(&b));
        let c = FloorplanElement::new("c", 150.0, 0.0, 100.0, 100.0);
        assert!(a.overlaps(&c));
    }

    #[test]
    fn test_shared_cell_centre_is_an_overlap() {
        let d = dims();
        let mut fp = Floorplan::new();
        // the edge at x = 150 runs through the centre of column 1
        fp.add(FloorplanElement::new("a", 0.0, 0.0, 150.0, 400.0))
            .unwrap();
        fp.add(FloorplanElement::new("b", 150.0, 0.0, 250.0, 400.0))
            .unwrap();
        let err = fp.snap(&d).unwrap_err();
        assert!(matches!(err, IceError::OverlappingFloorplanElements { .. }));
        assert_eq!(err.code(), -5);
    }

    #[test]
    fn test_span_intersection() {
        let a = CellSpan { sw_row: 0, sw_column: 0, ne_row: 1, ne_column: 1 };
        let b = CellSpan { sw_row: 1, sw_column: 1, ne_row: 2, ne_column: 3 };
        let c = CellSpan { sw_row: 0, sw_column: 2, ne_row: 3, ne_column: 3 };
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(b.intersects(&c));
    }

    #[test]
    fn test_sources_sum_to_power() {
        let d = dims();
        let mut fp = Floorplan::new();
        fp.add(FloorplanElement::new("core", 0.0, 0.0, 300.0, 100.0))
            .unwrap();
        fp.snap(&d).unwrap();
        fp.insert_power_values(&[1.5]);
        let mut out = vec![0.0; d.layer_stride()];
        fp.fill_sources(&d, &mut out);
        let total: f64 = out.iter().sum();
        assert!((total - 1.5).abs() < 1e-12);
        assert!((out[0] - 0.5).abs() < 1e-12);
        assert_eq!(out[3], 0.0);
    }
}
