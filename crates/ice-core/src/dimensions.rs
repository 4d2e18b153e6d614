//! Grid addressing and cell geometry.
//!
//! Cells are numbered row-major inside a layer and layers are stacked
//! bottom to top:
//!
//! ```text
//! id = layer * (rows * columns) + row * columns + column
//! ```
//!
//! All lengths are in micrometres. Only the first and the last column may
//! have a length different from the others, so that the grid covers the
//! chip footprint exactly; the width is uniform.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IceError, Result};

/// Footprint of the chip, in micrometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChipDimensions {
    /// Extent along x (columns)
    pub length: f64,
    /// Extent along y (rows)
    pub width: f64,
}

/// Lateral size of one cell, in micrometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellDimensions {
    pub first_length: f64,
    pub length: f64,
    pub last_length: f64,
    pub width: f64,
}

impl CellDimensions {
    /// Uniform cells: border columns have the same length as the rest.
    pub fn uniform(length: f64, width: f64) -> Self {
        Self {
            first_length: length,
            length,
            last_length: length,
            width,
        }
    }
}

/// Shape of the grid and the fixed nonzero count of the system matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDimensions {
    pub n_layers: usize,
    pub n_rows: usize,
    pub n_columns: usize,
    pub n_cells: usize,
    pub n_nonzeros: usize,
}

/// Vertical position of a layer inside the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerPosition {
    /// Layer 0 of a multi-layer stack
    Bottom,
    /// Neither the first nor the last layer
    Central,
    /// Last layer of a multi-layer stack
    Top,
    /// The stack has a single layer
    Only,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub chip: ChipDimensions,
    pub cell: CellDimensions,
    pub grid: GridDimensions,
}

/// Number of nonzeros of the 7-point stencil on an `l × r × c` grid.
pub fn nonzeros_for(n_layers: usize, n_rows: usize, n_columns: usize) -> usize {
    if n_layers == 0 || n_rows == 0 || n_columns == 0 {
        return 0;
    }
    let per_layer = n_rows * (3 * n_columns - 2) + 2 * n_columns * (n_rows - 1);
    n_layers * per_layer + (n_layers - 1) * 2 * n_rows * n_columns
}

impl Dimensions {
    /// Derive the grid shape from the chip footprint and the cell sizes.
    ///
    /// `rows = chip.width / cell.width` and
    /// `columns = (chip.length - first - last) / length + 2`, both
    /// truncated.
    pub fn new(chip: ChipDimensions, cell: CellDimensions, n_layers: usize) -> Result<Self> {
        if !(cell.first_length > 0.0
            && cell.length > 0.0
            && cell.last_length > 0.0
            && cell.width > 0.0)
        {
            return Err(IceError::config("cell dimensions must be positive"));
        }
        if !(chip.length > 0.0 && chip.width > 0.0) {
            return Err(IceError::config("chip dimensions must be positive"));
        }
        if n_layers == 0 {
            return Err(IceError::config("the stack has no layers"));
        }

        let inner = chip.length - cell.first_length - cell.last_length;
        if inner < -1e-9 {
            return Err(IceError::config(format!(
                "chip length {} is shorter than the two border cells",
                chip.length
            )));
        }

        let n_rows = truncate(chip.width / cell.width);
        let n_columns = truncate(inner.max(0.0) / cell.length) + 2;
        if n_rows == 0 {
            return Err(IceError::config("chip width is smaller than one cell"));
        }

        let n_cells = n_layers * n_rows * n_columns;
        Ok(Self {
            chip,
            cell,
            grid: GridDimensions {
                n_layers,
                n_rows,
                n_columns,
                n_cells,
                n_nonzeros: nonzeros_for(n_layers, n_rows, n_columns),
            },
        })
    }

    #[inline]
    pub fn n_layers(&self) -> usize {
        self.grid.n_layers
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.grid.n_rows
    }

    #[inline]
    pub fn n_columns(&self) -> usize {
        self.grid.n_columns
    }

    #[inline]
    pub fn n_cells(&self) -> usize {
        self.grid.n_cells
    }

    #[inline]
    pub fn n_nonzeros(&self) -> usize {
        self.grid.n_nonzeros
    }

    /// Cells in one layer, also the id distance between vertical neighbours.
    #[inline]
    pub fn layer_stride(&self) -> usize {
        self.grid.n_rows * self.grid.n_columns
    }

    #[inline]
    pub fn row_stride(&self) -> usize {
        self.grid.n_columns
    }

    #[inline]
    pub fn cell_index(&self, layer: usize, row: usize, column: usize) -> usize {
        layer * self.layer_stride() + row * self.grid.n_columns + column
    }

    #[inline]
    pub fn cell_index_in_layer(&self, row: usize, column: usize) -> usize {
        row * self.grid.n_columns + column
    }

    /// Inverse of [`Dimensions::cell_index`].
    #[inline]
    pub fn cell_coordinates(&self, id: usize) -> (usize, usize, usize) {
        let stride = self.layer_stride();
        let layer = id / stride;
        let rest = id % stride;
        (layer, rest / self.grid.n_columns, rest % self.grid.n_columns)
    }

    pub fn contains(&self, layer: usize, row: usize, column: usize) -> bool {
        layer < self.grid.n_layers && row < self.grid.n_rows && column < self.grid.n_columns
    }

    pub fn cell_length(&self, column: usize) -> f64 {
        if column == 0 {
            self.cell.first_length
        } else if column + 1 == self.grid.n_columns {
            self.cell.last_length
        } else {
            self.cell.length
        }
    }

    #[inline]
    pub fn cell_width(&self) -> f64 {
        self.cell.width
    }

    /// Area of the top face of any cell in `column`.
    pub fn cell_top_surface(&self, column: usize) -> f64 {
        self.cell_length(column) * self.cell.width
    }

    /// x coordinate of the west face of `column`.
    pub fn cell_west_x(&self, column: usize) -> f64 {
        if column == 0 {
            0.0
        } else {
            self.cell.first_length + (column - 1) as f64 * self.cell.length
        }
    }

    pub fn cell_center_x(&self, column: usize) -> f64 {
        self.cell_west_x(column) + self.cell_length(column) / 2.0
    }

    pub fn cell_center_y(&self, row: usize) -> f64 {
        (row as f64 + 0.5) * self.cell.width
    }

    pub fn layer_position(&self, layer: usize) -> LayerPosition {
        let last = self.grid.n_layers.saturating_sub(1);
        match (layer == 0, layer == last) {
            (true, true) => LayerPosition::Only,
            (true, false) => LayerPosition::Bottom,
            (false, true) => LayerPosition::Top,
            (false, false) => LayerPosition::Central,
        }
    }
}

fn truncate(x: f64) -> usize {
    // tolerate representation error on exact multiples
    (x + 1e-9).floor().max(0.0) as usize
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Chip  {:.1} x {:.1} um",
            self.chip.length, self.chip.width
        )?;
        writeln!(
            f,
            "Cell  first {:.1} length {:.1} last {:.1} width {:.1} um",
            self.cell.first_length, self.cell.length, self.cell.last_length, self.cell.width
        )?;
        write!(
            f,
            "Grid  {} layers x {} rows x {} columns = {} cells, {} nonzeros",
            self.grid.n_layers,
            self.grid.n_rows,
            self.grid.n_columns,
            self.grid.n_cells,
            self.grid.n_nonzeros
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(layers: usize) -> Dimensions {
        Dimensions::new(
            ChipDimensions {
                length: 1000.0,
                width: 400.0,
            },
            CellDimensions {
                first_length: 50.0,
                length: 100.0,
                last_length: 150.0,
                width: 100.0,
            },
            layers,
        )
        .unwrap()
    }

    #[test]
    fn test_grid_shape() {
        let d = dims(3);
        assert_eq!(d.n_rows(), 4);
        assert_eq!(d.n_columns(), 10);
        assert_eq!(d.n_cells(), 120);
    }

    #[test]
    fn test_border_lengths() {
        let d = dims(1);
        assert_eq!(d.cell_length(0), 50.0);
        assert_eq!(d.cell_length(5), 100.0);
        assert_eq!(d.cell_length(9), 150.0);
        assert!((d.cell_west_x(9) + d.cell_length(9) - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_nonzeros_single_cell() {
        assert_eq!(nonzeros_for(1, 1, 1), 1);
        assert_eq!(nonzeros_for(2, 1, 1), 4);
    }

    #[test]
    fn test_layer_position() {
        let d = dims(3);
        assert_eq!(d.layer_position(0), LayerPosition::Bottom);
        assert_eq!(d.layer_position(1), LayerPosition::Central);
        assert_eq!(d.layer_position(2), LayerPosition::Top);
        assert_eq!(dims(1).layer_position(0), LayerPosition::Only);
    }
}
