//! System matrix assembly.
//!
//! The backward-Euler system `A·T(t+dt) = S + C·T(t)` has one equation per
//! cell and a 7-point stencil. The sparsity pattern only depends on the grid
//! shape, so it is built once in [`SystemMatrix::new`]; every later
//! [`SystemMatrix::fill`] rewrites the values in place.
//!
//! Entries of one line (a column in compressed-column storage, a row in
//! compressed-row storage) are emitted in ascending index order:
//!
//! ```text
//! Bottom (-layer)  South (-row)  West (-1)  diagonal  East (+1)  North (+row)  Top (+layer)
//! ```
//!
//! Off-diagonal coefficient between two cells is the negated series
//! combination of their facing half-conductances. Along the flow direction
//! of a liquid cell the signed advective terms are used as they are and do
//! not contribute to the diagonal.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conductances::{combine, CellKind, Conductances, Direction};
use crate::dimensions::Dimensions;
use crate::dump;
use crate::error::{IceError, Result};

/// Layout of the three parallel arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixStorage {
    /// `offsets` index columns, `indices` hold row numbers
    #[default]
    CompressedColumn,
    /// `offsets` index rows, `indices` hold column numbers
    CompressedRow,
}

impl MatrixStorage {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "csc" | "ccs" | "column" => Some(MatrixStorage::CompressedColumn),
            "csr" | "crs" | "row" => Some(MatrixStorage::CompressedRow),
            _ => None,
        }
    }
}

const BELOW: [Direction; 3] = [Direction::Bottom, Direction::South, Direction::West];
const ABOVE: [Direction; 3] = [Direction::East, Direction::North, Direction::Top];

/// Id of the neighbour of `id` in `direction`, `None` on the grid boundary.
pub fn neighbour(dims: &Dimensions, id: usize, direction: Direction) -> Option<usize> {
    let (layer, row, column) = dims.cell_coordinates(id);
    match direction {
        Direction::Bottom => (layer > 0).then(|| id - dims.layer_stride()),
        Direction::South => (row > 0).then(|| id - dims.row_stride()),
        Direction::West => (column > 0).then(|| id - 1),
        Direction::East => (column + 1 < dims.n_columns()).then(|| id + 1),
        Direction::North => (row + 1 < dims.n_rows()).then(|| id + dims.row_stride()),
        Direction::Top => (layer + 1 < dims.n_layers()).then(|| id + dims.layer_stride()),
    }
}

/// Cell-wise data the assembler reads, all indexed by cell id.
#[derive(Debug, Clone, Copy)]
pub struct CellData<'a> {
    pub conductances: &'a [Conductances],
    pub capacities: &'a [f64],
    pub kinds: &'a [CellKind],
}

impl CellData<'_> {
    fn is_advective(&self, from: usize, to: usize, direction: Direction) -> bool {
        matches!(direction, Direction::North | Direction::South)
            && self.kinds[from] == CellKind::Liquid
            && self.kinds[to] == CellKind::Liquid
    }

    /// Coefficient of `T[to]` in the equation of cell `from`.
    pub fn coefficient(&self, from: usize, to: usize, direction: Direction) -> f64 {
        if self.is_advective(from, to, direction) {
            self.conductances[from].get(direction)
        } else {
            -combine(
                self.conductances[from].get(direction),
                self.conductances[to].get(direction.opposite()),
            )
        }
    }

    /// Diagonal of the equation of cell `id`.
    pub fn diagonal(&self, dims: &Dimensions, id: usize) -> f64 {
        let mut total = self.capacities[id];
        for direction in BELOW.iter().chain(ABOVE.iter()) {
            if let Some(nb) = neighbour(dims, id, *direction) {
                if !self.is_advective(id, nb, *direction) {
                    total += combine(
                        self.conductances[id].get(*direction),
                        self.conductances[nb].get(direction.opposite()),
                    );
                }
            }
        }

        let (layer, row, _) = dims.cell_coordinates(id);
        if self.kinds[id] == CellKind::Liquid {
            // advective term with no partner at the inlet and outlet
            if row == 0 {
                total += self.conductances[id].north;
            }
            if row + 1 == dims.n_rows() {
                total += self.conductances[id].north;
            }
        }
        if layer + 1 == dims.n_layers() {
            total += self.conductances[id].top;
        }
        total
    }
}

/// Fixed-pattern sparse matrix in compressed-column or compressed-row form.
#[derive(Debug, Clone)]
pub struct SystemMatrix {
    storage: MatrixStorage,
    size: usize,
    offsets: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SystemMatrix {
    /// Allocate the matrix and build its sparsity pattern.
    pub fn new(dims: &Dimensions, storage: MatrixStorage) -> Result<Self> {
        let size = dims.n_cells();
        let nnz = dims.n_nonzeros();
        let mut offsets = Vec::with_capacity(size + 1);
        let mut indices = Vec::with_capacity(nnz);

        offsets.push(0);
        for id in 0..size {
            for direction in BELOW {
                if let Some(nb) = neighbour(dims, id, direction) {
                    indices.push(nb);
                }
            }
            indices.push(id);
            for direction in ABOVE {
                if let Some(nb) = neighbour(dims, id, direction) {
                    indices.push(nb);
                }
            }
            offsets.push(indices.len());
        }

        if indices.len() != nnz {
            return Err(IceError::internal(format!(
                "pattern has {} entries, expected {}",
                indices.len(),
                nnz
            )));
        }

        Ok(Self {
            storage,
            size,
            offsets,
            indices,
            values: vec![0.0; nnz],
        })
    }

    pub fn storage(&self) -> MatrixStorage {
        self.storage
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Start of each line in `indices` and `values`, plus the final nnz.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Row (CSC) or column (CSR) index of each stored entry.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Rewrite every value from the cell data. The pattern is left as is.
    pub fn fill(&mut self, dims: &Dimensions, cells: CellData<'_>) -> Result<()> {
        let mut cursor = 0;
        for id in 0..self.size {
            for direction in BELOW {
                if let Some(nb) = neighbour(dims, id, direction) {
                    self.emit(&mut cursor, nb)?;
                    self.values[cursor - 1] = self.entry(cells, id, nb, direction);
                }
            }
            self.emit(&mut cursor, id)?;
            self.values[cursor - 1] = cells.diagonal(dims, id);
            for direction in ABOVE {
                if let Some(nb) = neighbour(dims, id, direction) {
                    self.emit(&mut cursor, nb)?;
                    self.values[cursor - 1] = self.entry(cells, id, nb, direction);
                }
            }
            if cursor != self.offsets[id + 1] {
                return Err(IceError::internal(format!(
                    "cell {} emitted up to entry {}, pattern ends at {}",
                    id,
                    cursor,
                    self.offsets[id + 1]
                )));
            }
        }

        if cursor != dims.n_nonzeros() {
            return Err(IceError::internal(format!(
                "assembled {} nonzeros, expected {}",
                cursor,
                dims.n_nonzeros()
            )));
        }
        debug!(nnz = cursor, storage = ?self.storage, "system matrix filled");
        Ok(())
    }

    /// Check the next pattern slot against `index` and advance.
    fn emit(&self, cursor: &mut usize, index: usize) -> Result<()> {
        match self.indices.get(*cursor) {
            Some(&expected) if expected == index => {
                *cursor += 1;
                Ok(())
            }
            _ => Err(IceError::internal(format!(
                "entry {} does not match the sparsity pattern",
                cursor
            ))),
        }
    }

    /// Value stored on line `line` at index `nb`, reached from `line` in
    /// `direction`.
    fn entry(&self, cells: CellData<'_>, line: usize, nb: usize, direction: Direction) -> f64 {
        match self.storage {
            MatrixStorage::CompressedRow => cells.coefficient(line, nb, direction),
            MatrixStorage::CompressedColumn => cells.coefficient(nb, line, direction.opposite()),
        }
    }

    /// Entry `(row, column)`, zero outside the pattern.
    pub fn get(&self, row: usize, column: usize) -> f64 {
        let (line, index) = match self.storage {
            MatrixStorage::CompressedColumn => (column, row),
            MatrixStorage::CompressedRow => (row, column),
        };
        let range = self.offsets[line]..self.offsets[line + 1];
        self.indices[range.clone()]
            .binary_search(&index)
            .map(|k| self.values[range.start + k])
            .unwrap_or(0.0)
    }

    pub fn diagonal(&self, id: usize) -> f64 {
        self.get(id, id)
    }

    /// `(row, column, value)` for every stored entry.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.size).flat_map(move |line| {
            (self.offsets[line]..self.offsets[line + 1]).map(move |k| match self.storage {
                MatrixStorage::CompressedColumn => (self.indices[k], line, self.values[k]),
                MatrixStorage::CompressedRow => (line, self.indices[k], self.values[k]),
            })
        })
    }

    /// `y = A·x`
    pub fn multiply(&self, x: &[f64], y: &mut [f64]) {
        y.fill(0.0);
        for (row, column, value) in self.triplets() {
            y[row] += value * x[column];
        }
    }

    pub fn dump_offsets<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        dump::write_indices(out, &self.offsets)
    }

    pub fn dump_indices<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        dump::write_indices(out, &self.indices)
    }

    pub fn dump_values<W: Write>(&self, out: &mut W, precision: usize) -> std::io::Result<()> {
        dump::write_values(out, &self.values, precision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::{CellDimensions, ChipDimensions};

    fn dims(layers: usize, rows: usize, columns: usize) -> Dimensions {
        Dimensions::new(
            ChipDimensions {
                length: columns as f64 * 10.0,
                width: rows as f64 * 10.0,
            },
            CellDimensions::uniform(10.0, 10.0),
            layers,
        )
        .unwrap()
    }

    #[test]
    fn test_pattern_size_matches_formula() {
        for (l, r, c) in [(1, 1, 2), (1, 3, 4), (2, 4, 4), (3, 2, 5)] {
            let d = dims(l, r, c);
            let m = SystemMatrix::new(&d, MatrixStorage::CompressedColumn).unwrap();
            assert_eq!(m.nnz(), d.n_nonzeros());
            assert_eq!(m.offsets.len(), d.n_cells() + 1);
        }
    }

    #[test]
    fn test_lines_sorted() {
        let d = dims(2, 3, 4);
        let m = SystemMatrix::new(&d, MatrixStorage::CompressedRow).unwrap();
        for line in 0..m.size() {
            let idx = &m.indices[m.offsets[line]..m.offsets[line + 1]];
            assert!(idx.windows(2).all(|w| w[0] < w[1]));
            assert!(idx.contains(&line));
        }
    }

    #[test]
    fn test_storage_parse() {
        assert_eq!(MatrixStorage::parse("CSR"), Some(MatrixStorage::CompressedRow));
        assert_eq!(MatrixStorage::parse("ccs"), Some(MatrixStorage::CompressedColumn));
        assert_eq!(MatrixStorage::parse("dense"), None);
    }
}
