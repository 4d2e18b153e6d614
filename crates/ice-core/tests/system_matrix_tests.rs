//! System matrix assembly tests
//!
//! Pattern size, layout equivalence, conservation properties of the
//! assembled values and pattern stability across refills.

mod common;

use approx::assert_relative_eq;
use common::{ambient, channel_stack, config, die_stack, INLET};
use ice_core::conductances::{combine, CellKind};
use ice_core::solver::SolverType;
use ice_core::system_matrix::{MatrixStorage, SystemMatrix};
use ice_core::{StackDescription, ThermalData, TopBoundary};

const LAYOUTS: [MatrixStorage; 2] = [MatrixStorage::CompressedColumn, MatrixStorage::CompressedRow];

fn filled(stack: &mut StackDescription, storage: MatrixStorage) -> ThermalData {
    let mut tdata = ThermalData::new(stack, config(1e-3, storage, SolverType::Dense)).unwrap();
    tdata.fill(stack).unwrap();
    tdata
}

fn dense(matrix: &SystemMatrix) -> Vec<Vec<f64>> {
    let n = matrix.size();
    (0..n).map(|r| (0..n).map(|c| matrix.get(r, c)).collect()).collect()
}

// ============================================================================
// 1. Pattern
// ============================================================================

#[test]
fn test_nnz_matches_grid() {
    for storage in LAYOUTS {
        for mut stack in [die_stack(TopBoundary::Adiabatic), channel_stack(INLET, 1.2)] {
            let tdata = filled(&mut stack, storage);
            let matrix = tdata.system_matrix();
            let dims = stack.dimensions();
            assert_eq!(matrix.nnz(), dims.n_nonzeros());
            assert_eq!(matrix.offsets().len(), dims.n_cells() + 1);
            assert_eq!(*matrix.offsets().last().unwrap(), dims.n_nonzeros());
            assert_eq!(matrix.values().len(), dims.n_nonzeros());
        }
    }
}

#[test]
fn test_indices_ascending_per_line() {
    let mut stack = channel_stack(INLET, 1.2);
    let tdata = filled(&mut stack, MatrixStorage::CompressedColumn);
    let matrix = tdata.system_matrix();
    for line in 0..matrix.size() {
        let indices = &matrix.indices()[matrix.offsets()[line]..matrix.offsets()[line + 1]];
        assert!(indices.windows(2).all(|w| w[0] < w[1]), "line {}", line);
        assert!(indices.contains(&line), "line {} lacks its diagonal", line);
    }
}

#[test]
fn test_pattern_is_symmetric() {
    let mut stack = die_stack(TopBoundary::Adiabatic);
    let tdata = filled(&mut stack, MatrixStorage::CompressedRow);
    let matrix = tdata.system_matrix();
    for line in 0..matrix.size() {
        for &index in &matrix.indices()[matrix.offsets()[line]..matrix.offsets()[line + 1]] {
            let back = &matrix.indices()[matrix.offsets()[index]..matrix.offsets()[index + 1]];
            assert!(back.contains(&line));
        }
    }
}

// ============================================================================
// 2. Values
// ============================================================================

#[test]
fn test_layouts_describe_same_matrix() {
    let makers: [fn() -> StackDescription; 2] = [|| die_stack(ambient(1e-6)), || channel_stack(INLET, 1.2)];
    for make in makers {
        let mut csc_stack = make();
        let mut csr_stack = make();
        let csc = dense(filled(&mut csc_stack, MatrixStorage::CompressedColumn).system_matrix());
        let csr = dense(filled(&mut csr_stack, MatrixStorage::CompressedRow).system_matrix());
        assert_eq!(csc, csr);
    }
}

#[test]
fn test_solid_stack_is_symmetric() {
    let mut stack = die_stack(ambient(1e-6));
    let tdata = filled(&mut stack, MatrixStorage::CompressedColumn);
    let a = dense(tdata.system_matrix());
    for r in 0..a.len() {
        for c in 0..a.len() {
            assert_eq!(a[r][c], a[c][r], "({}, {})", r, c);
        }
    }
}

#[test]
fn test_adiabatic_row_sums_equal_capacity() {
    let mut stack = die_stack(TopBoundary::Adiabatic);
    let tdata = filled(&mut stack, MatrixStorage::CompressedRow);
    let a = dense(tdata.system_matrix());
    for (i, row) in a.iter().enumerate() {
        let sum: f64 = row.iter().sum();
        let cap = tdata.capacities()[i];
        assert!((sum - cap).abs() < 1e-12 * row[i].abs(), "row {}: {} vs {}", i, sum, cap);
        // strictly dominant diagonal
        let off: f64 = row.iter().enumerate().filter(|(c, _)| *c != i).map(|(_, v)| v.abs()).sum();
        assert!(row[i] > off);
    }
}

#[test]
fn test_ambient_adds_top_conductance() {
    let htc = 1e-6;
    let mut stack = die_stack(ambient(htc));
    let tdata = filled(&mut stack, MatrixStorage::CompressedRow);
    let a = dense(tdata.system_matrix());
    let dims = *stack.dimensions();

    for id in 0..dims.n_cells() {
        let (layer, _, _) = dims.cell_coordinates(id);
        let sum: f64 = a[id].iter().sum();
        let extra = sum - tdata.capacities()[id];
        let top = tdata.conductances()[id].top;
        if layer == dims.n_layers() - 1 {
            // series of the half-cell and the convective film
            let half = 1.30e-4 * 100.0 * 100.0 / 5.0;
            let film = htc * 100.0 * 100.0;
            assert_relative_eq!(top, combine(half, film), max_relative = 1e-14);
            assert!((extra - top).abs() < 1e-12 * a[id][id]);
            assert!((tdata.sources()[id] - 300.0 * top).abs() < 1e-12);
        } else {
            assert!(extra.abs() < 1e-12 * a[id][id]);
        }
    }
}

#[test]
fn test_channel_conserves_energy_at_inlet_temperature() {
    // with every cell at the inlet temperature nothing flows: A·T - C·T = S
    let mut stack = channel_stack(INLET, 1.2);
    for storage in LAYOUTS {
        let tdata = filled(&mut stack, storage);
        let n = tdata.dimensions().n_cells();
        let t = vec![INLET; n];
        let mut y = vec![0.0; n];
        tdata.system_matrix().multiply(&t, &mut y);
        for i in 0..n {
            let residual = y[i] - tdata.capacities()[i] * INLET - tdata.sources()[i];
            let scale = tdata.system_matrix().diagonal(i) * INLET;
            assert!(residual.abs() < 1e-10 * scale, "cell {}: residual {}", i, residual);
        }
    }
}

#[test]
fn test_advective_couplings() {
    let mut stack = channel_stack(INLET, 1.2);
    let tdata = filled(&mut stack, MatrixStorage::CompressedRow);
    let dims = *stack.dimensions();
    let advection = stack.channel().unwrap().advection(&dims);
    let a = tdata.system_matrix();

    assert!(advection > 0.0);
    let row = dims.n_rows() / 2;
    for column in 0..dims.n_columns() {
        let id = dims.cell_index(1, row, column);
        let north = dims.cell_index(1, row + 1, column);
        let south = dims.cell_index(1, row - 1, column);
        if tdata.cell_kinds()[id] == CellKind::Liquid {
            assert!((a.get(id, north) - advection).abs() < 1e-15);
            assert!((a.get(id, south) + advection).abs() < 1e-15);
        } else {
            // wall cells conduct like any solid
            assert!(a.get(id, north) < 0.0);
            assert_eq!(a.get(id, north), a.get(north, id));
        }
    }

    // inlet row: each liquid cell receives the coolant at the inlet temperature
    for column in (1..dims.n_columns()).step_by(2) {
        let id = dims.cell_index(1, 0, column);
        assert!((tdata.sources()[id] - 2.0 * advection * INLET).abs() < 1e-9);
    }
}

#[test]
fn test_refill_keeps_pattern() {
    let mut stack = channel_stack(INLET, 1.2);
    let mut tdata = filled(&mut stack, MatrixStorage::CompressedColumn);
    let offsets = tdata.system_matrix().offsets().to_vec();
    let indices = tdata.system_matrix().indices().to_vec();
    let values = tdata.system_matrix().values().to_vec();

    stack.set_flow_rate(2.4).unwrap();
    tdata.fill(&mut stack).unwrap();

    let matrix = tdata.system_matrix();
    assert_eq!(matrix.offsets(), offsets);
    assert_eq!(matrix.indices(), indices);
    assert_ne!(matrix.values(), values);
}
