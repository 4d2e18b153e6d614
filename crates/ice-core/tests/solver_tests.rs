//! Linear solver backend tests
//!
//! Both backends are run on assembled thermal systems and checked against
//! the residual of `A·x = b`.

mod common;

use common::{channel_stack, config, die_stack, INLET};
use ice_core::solver::{create_solver, DenseSolver, LinearSolver, SolverError, SolverType, DENSE_LIMIT};
use ice_core::system_matrix::{MatrixStorage, SystemMatrix};
use ice_core::{StackDescription, ThermalData, TopBoundary};

fn assembled(mut stack: StackDescription, storage: MatrixStorage) -> SystemMatrix {
    let mut tdata = ThermalData::new(&stack, config(1e-3, storage, SolverType::Dense)).unwrap();
    tdata.fill(&mut stack).unwrap();
    tdata.system_matrix().clone()
}

fn residual(matrix: &SystemMatrix, x: &[f64], b: &[f64]) -> f64 {
    let mut ax = vec![0.0; x.len()];
    matrix.multiply(x, &mut ax);
    ax.iter()
        .zip(b)
        .map(|(l, r)| (l - r).abs())
        .fold(0.0, f64::max)
}

fn rhs(n: usize) -> Vec<f64> {
    (0..n).map(|i| 1.0 + (i % 7) as f64 * 0.25).collect()
}

fn check_backend(solver_type: SolverType) {
    for storage in [MatrixStorage::CompressedColumn, MatrixStorage::CompressedRow] {
        for stack in [die_stack(TopBoundary::Adiabatic), channel_stack(INLET, 1.2)] {
            let matrix = assembled(stack, storage);
            let n = matrix.size();
            let mut solver = create_solver(solver_type, n);
            solver.prepare(n);
            solver.factor(&matrix).unwrap();

            let b = rhs(n);
            let mut x = b.clone();
            solver.solve(&mut x).unwrap();
            assert!(residual(&matrix, &x, &b) < 1e-10, "{} on {:?}", solver.name(), storage);
        }
    }
}

// ============================================================================
// Dense
// ============================================================================

#[test]
fn test_dense_solves_thermal_systems() {
    check_backend(SolverType::Dense);
}

#[test]
fn test_dense_requires_factorization() {
    let mut solver = DenseSolver::new(4);
    let mut b = vec![1.0; 4];
    assert!(matches!(solver.solve(&mut b), Err(SolverError::NotFactored)));
}

#[test]
fn test_dense_rejects_wrong_size() {
    let matrix = assembled(die_stack(TopBoundary::Adiabatic), MatrixStorage::CompressedColumn);
    let mut solver = DenseSolver::new(matrix.size() + 1);
    assert!(matches!(
        solver.factor(&matrix),
        Err(SolverError::InvalidMatrix { .. })
    ));
}

#[test]
fn test_factor_count() {
    let matrix = assembled(die_stack(TopBoundary::Adiabatic), MatrixStorage::CompressedRow);
    let mut solver = DenseSolver::new(matrix.size());
    assert_eq!(solver.factor_count(), 0);
    solver.factor(&matrix).unwrap();
    solver.factor(&matrix).unwrap();
    assert_eq!(solver.factor_count(), 2);
    solver.reset_pattern();
    let mut b = vec![1.0; matrix.size()];
    assert!(solver.solve(&mut b).is_err());
}

#[test]
fn test_auto_picks_dense_for_small_grids() {
    assert_eq!(create_solver(SolverType::Auto, DENSE_LIMIT).name(), "Dense");
    assert_eq!(create_solver(SolverType::Dense, 10_000).name(), "Dense");
}

// ============================================================================
// Faer
// ============================================================================

#[cfg(feature = "faer-solver")]
#[test]
fn test_faer_solves_thermal_systems() {
    check_backend(SolverType::Faer);
}

#[cfg(feature = "faer-solver")]
#[test]
fn test_auto_picks_faer_for_large_grids() {
    assert_eq!(create_solver(SolverType::Auto, DENSE_LIMIT + 1).name(), "Faer");
}

#[cfg(feature = "faer-solver")]
#[test]
fn test_faer_refactor_after_value_change() {
    let mut stack = channel_stack(INLET, 1.2);
    let mut tdata = ThermalData::new(&stack, config(1e-3, MatrixStorage::CompressedColumn, SolverType::Faer)).unwrap();
    assert_eq!(tdata.solver_name(), "Faer");
    tdata.fill(&mut stack).unwrap();
    stack.set_flow_rate(3.0).unwrap();
    tdata.fill(&mut stack).unwrap();
    assert_eq!(tdata.factor_count(), 2);

    // the cached analysis must give the same answer as a fresh solver
    let matrix = tdata.system_matrix().clone();
    let b = rhs(matrix.size());
    let mut fresh = create_solver(SolverType::Faer, matrix.size());
    fresh.factor(&matrix).unwrap();
    let mut expected = b.clone();
    fresh.solve(&mut expected).unwrap();
    assert!(residual(&matrix, &expected, &b) < 1e-10);
}

#[cfg(feature = "faer-solver")]
#[test]
fn test_backends_agree_on_transient() {
    let run = |solver| {
        let mut stack = channel_stack(INLET, 1.2);
        stack.insert_power_value("die", "hot", 2.0).unwrap();
        let mut tdata = ThermalData::new(&stack, config(1e-3, MatrixStorage::CompressedRow, solver)).unwrap();
        tdata.fill(&mut stack).unwrap();
        tdata.solve(0.05).unwrap();
        tdata.temperatures().to_vec()
    };
    let dense = run(SolverType::Dense);
    let faer = run(SolverType::Faer);
    for (a, b) in dense.iter().zip(&faer) {
        assert!((a - b).abs() < 1e-8, "{} vs {}", a, b);
    }
}
