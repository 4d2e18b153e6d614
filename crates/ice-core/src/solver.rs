//! Linear Solver Module
//!
//! The transient driver only needs to factor the system matrix and solve
//! against the current factorization, so the solver is hidden behind the
//! narrow [`LinearSolver`] trait. Two backends are available:
//!
//! | Solver | Feature | Cost | Dependencies |
//! |--------|---------|------|--------------|
//! | Dense  | (always) | O(n³) factor, O(n²) solve | None |
//! | Faer   | `faer-solver` (default) | O(nnz·fill) | Pure Rust |
//!
//! Both accept the matrix in either storage layout. A compressed-row
//! matrix is the compressed-column matrix of its transpose, so the solvers
//! read entries through [`SystemMatrix::triplets`] which always yields
//! `(row, column, value)`.
//!
//! # Usage
//!
//! ```ignore
//! use ice_core::solver::{create_solver, LinearSolver, SolverType};
//!
//! let mut solver = create_solver(SolverType::Auto, matrix.size());
//! solver.factor(&matrix)?;      // analyzes the pattern on first use
//! solver.solve(&mut rhs)?;      // rhs now holds the solution
//! ```

use std::fmt;

use crate::system_matrix::SystemMatrix;

/// Failure of a factorization or a triangular solve.
#[derive(Debug, Clone)]
pub enum SolverError {
    /// The sparsity pattern could not be analysed
    AnalyzeFailed,
    /// Factorization broke down on the current values
    FactorFailed,
    /// Solve requested before a successful factorization
    NotFactored,
    /// Zero pivot in the dense LU
    SingularMatrix { pivot: usize },
    /// Size mismatch between the solver, the matrix and the vectors
    InvalidMatrix { reason: String },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::AnalyzeFailed => write!(f, "Symbolic analysis failed"),
            SolverError::FactorFailed => write!(f, "Numerical factorization failed"),
            SolverError::NotFactored => write!(f, "Solve called without a factorization"),
            SolverError::SingularMatrix { pivot } => {
                write!(f, "Singular matrix: zero pivot at row/column {}", pivot)
            }
            SolverError::InvalidMatrix { reason } => {
                write!(f, "Invalid matrix: {}", reason)
            }
        }
    }
}

impl std::error::Error for SolverError {}

/// Solver type selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverType {
    /// Dense for tiny grids, otherwise the best sparse backend compiled in
    #[default]
    Auto,
    /// Dense LU with partial pivoting
    Dense,
    /// Faer sparse LU
    Faer,
}

impl SolverType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "auto" => Some(SolverType::Auto),
            "dense" => Some(SolverType::Dense),
            "faer" => Some(SolverType::Faer),
            _ => None,
        }
    }
}

/// Grids up to this many cells use the dense backend under `Auto`.
pub const DENSE_LIMIT: usize = 64;

pub trait LinearSolver: Send {
    /// Size the solver for `n` cells and forget any previous factorization.
    fn prepare(&mut self, n: usize);

    /// Analyze the sparsity pattern (cached while unchanged)
    fn analyze(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError>;

    /// Numerically factor the matrix, analyzing first if needed
    fn factor(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError>;

    /// Solve Ax = b against the last factorization, result overwrites rhs
    fn solve(&mut self, rhs: &mut [f64]) -> Result<(), SolverError>;

    /// Drop cached pattern and factorization
    fn reset_pattern(&mut self);

    /// Number of numeric factorizations performed so far
    fn factor_count(&self) -> usize;

    /// Backend name, as printed in logs.
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// Build the backend selected by `solver_type` for a grid of `n` cells.
pub fn create_solver(solver_type: SolverType, n: usize) -> Box<dyn LinearSolver> {
    match solver_type {
        SolverType::Dense => Box::new(DenseSolver::new(n)),
        SolverType::Faer => {
            #[cfg(feature = "faer-solver")]
            {
                Box::new(FaerSolver::new(n))
            }
            #[cfg(not(feature = "faer-solver"))]
            {
                tracing::warn!("faer not available, falling back to the dense solver");
                Box::new(DenseSolver::new(n))
            }
        }
        SolverType::Auto => create_solver_auto(n),
    }
}

pub fn create_solver_auto(n: usize) -> Box<dyn LinearSolver> {
    if n <= DENSE_LIMIT {
        return Box::new(DenseSolver::new(n));
    }

    #[cfg(feature = "faer-solver")]
    {
        Box::new(FaerSolver::new(n))
    }

    #[cfg(not(feature = "faer-solver"))]
    {
        Box::new(DenseSolver::new(n))
    }
}

fn check_size(n: usize, matrix: &SystemMatrix) -> Result<(), SolverError> {
    if matrix.size() != n || matrix.offsets().len() != n + 1 {
        return Err(SolverError::InvalidMatrix {
            reason: format!("matrix of size {} given to a solver of size {}", matrix.size(), n),
        });
    }
    Ok(())
}

// ============================================================================
// Dense Solver
// ============================================================================

#[derive(Debug)]
pub struct DenseSolver {
    pub n: usize,
    lu: Vec<f64>,
    pivots: Vec<usize>,
    factored: bool,
    factor_count: usize,
}

impl DenseSolver {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            lu: vec![0.0; n * n],
            pivots: (0..n).collect(),
            factored: false,
            factor_count: 0,
        }
    }

    fn load(&mut self, matrix: &SystemMatrix) {
        let n = self.n;
        self.lu.fill(0.0);
        for (row, column, value) in matrix.triplets() {
            self.lu[row * n + column] += value;
        }
    }

    /// In-place LU with partial pivoting, row-major.
    fn factorize(&mut self) -> Result<(), SolverError> {
        let n = self.n;
        for (i, p) in self.pivots.iter_mut().enumerate() {
            *p = i;
        }
        for k in 0..n {
            let (pivot, max_val) = (k..n)
                .map(|i| (i, self.lu[i * n + k].abs()))
                .fold((k, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });
            if max_val == 0.0 {
                return Err(SolverError::SingularMatrix { pivot: k });
            }
            if pivot != k {
                for j in 0..n {
                    self.lu.swap(k * n + j, pivot * n + j);
                }
                self.pivots.swap(k, pivot);
            }
            let pivot_val = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot_val;
                self.lu[i * n + k] = factor;
                if factor != 0.0 {
                    for j in (k + 1)..n {
                        self.lu[i * n + j] -= factor * self.lu[k * n + j];
                    }
                }
            }
        }
        Ok(())
    }
}

impl LinearSolver for DenseSolver {
    fn prepare(&mut self, n: usize) {
        if self.n != n {
            self.n = n;
            self.lu.resize(n * n, 0.0);
            self.pivots = (0..n).collect();
            self.factored = false;
        }
    }

    fn analyze(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError> {
        check_size(self.n, matrix)
    }

    fn factor(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError> {
        check_size(self.n, matrix)?;
        self.factored = false;
        self.load(matrix);
        self.factorize()?;
        self.factored = true;
        self.factor_count += 1;
        Ok(())
    }

    fn solve(&mut self, rhs: &mut [f64]) -> Result<(), SolverError> {
        let n = self.n;
        if !self.factored {
            return Err(SolverError::NotFactored);
        }
        if rhs.len() != n {
            return Err(SolverError::InvalidMatrix {
                reason: format!("RHS length {} != matrix dimension {}", rhs.len(), n),
            });
        }
        let mut b: Vec<f64> = self.pivots.iter().map(|&p| rhs[p]).collect();
        for i in 0..n {
            let sum: f64 = (0..i).map(|j| self.lu[i * n + j] * b[j]).sum();
            b[i] -= sum;
        }
        for i in (0..n).rev() {
            let sum: f64 = ((i + 1)..n).map(|j| self.lu[i * n + j] * rhs[j]).sum();
            rhs[i] = (b[i] - sum) / self.lu[i * n + i];
        }
        Ok(())
    }

    fn reset_pattern(&mut self) {
        self.factored = false;
    }

    fn factor_count(&self) -> usize {
        self.factor_count
    }

    fn name(&self) -> &'static str {
        "Dense"
    }
}

// ============================================================================
// Faer Sparse Solver
// ============================================================================

/// Sparse LU from the faer crate.
///
/// The symbolic analysis is kept while the pattern (layout, offsets and
/// indices) stays the same, so a flow-rate change only costs a numeric
/// refactorization.
#[cfg(feature = "faer-solver")]
pub struct FaerSolver {
    pub n: usize,
    symbolic: Option<faer::sparse::linalg::solvers::SymbolicLu<usize>>,
    lu: Option<faer::sparse::linalg::solvers::Lu<usize, f64>>,
    last_storage: Option<crate::system_matrix::MatrixStorage>,
    last_offsets: Vec<usize>,
    last_indices: Vec<usize>,
    factor_count: usize,
}

#[cfg(feature = "faer-solver")]
impl FaerSolver {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            symbolic: None,
            lu: None,
            last_storage: None,
            last_offsets: Vec::new(),
            last_indices: Vec::new(),
            factor_count: 0,
        }
    }

    fn pattern_matches(&self, matrix: &SystemMatrix) -> bool {
        self.last_storage == Some(matrix.storage())
            && self.last_offsets == matrix.offsets()
            && self.last_indices == matrix.indices()
    }

    fn to_faer(
        &self,
        matrix: &SystemMatrix,
        unit_values: bool,
    ) -> Result<faer::sparse::SparseColMat<usize, f64>, SolverError> {
        let triplets: Vec<(usize, usize, f64)> = matrix
            .triplets()
            .map(|(row, column, value)| (row, column, if unit_values { 1.0 } else { value }))
            .collect();
        faer::sparse::SparseColMat::<usize, f64>::try_new_from_triplets(self.n, self.n, &triplets)
            .map_err(|e| SolverError::InvalidMatrix {
                reason: format!("Failed to create sparse matrix: {:?}", e),
            })
    }
}

#[cfg(feature = "faer-solver")]
impl LinearSolver for FaerSolver {
    fn prepare(&mut self, n: usize) {
        if n != self.n {
            self.reset_pattern();
            self.n = n;
        }
    }

    fn analyze(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError> {
        use faer::sparse::linalg::solvers::SymbolicLu;

        if self.symbolic.is_some() && self.pattern_matches(matrix) {
            return Ok(());
        }
        check_size(self.n, matrix)?;

        let mat = self.to_faer(matrix, true)?;
        let symbolic = SymbolicLu::try_new(mat.symbolic()).map_err(|_| SolverError::AnalyzeFailed)?;

        self.symbolic = Some(symbolic);
        self.lu = None;
        self.last_storage = Some(matrix.storage());
        self.last_offsets = matrix.offsets().to_vec();
        self.last_indices = matrix.indices().to_vec();
        Ok(())
    }

    fn factor(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError> {
        use faer::sparse::linalg::solvers::Lu;

        self.analyze(matrix)?;
        let symbolic = self.symbolic.clone().ok_or(SolverError::AnalyzeFailed)?;

        self.lu = None;
        let mat = self.to_faer(matrix, false)?;
        let lu = Lu::try_new_with_symbolic(symbolic, mat.as_ref())
            .map_err(|_| SolverError::FactorFailed)?;

        self.lu = Some(lu);
        self.factor_count += 1;
        Ok(())
    }

    fn solve(&mut self, rhs: &mut [f64]) -> Result<(), SolverError> {
        use faer::prelude::SpSolver;
        use faer::Mat;

        let lu = self.lu.as_ref().ok_or(SolverError::NotFactored)?;
        if rhs.len() != self.n {
            return Err(SolverError::InvalidMatrix {
                reason: format!("RHS length {} != matrix dimension {}", rhs.len(), self.n),
            });
        }

        let b = Mat::from_fn(self.n, 1, |i, _| rhs[i]);
        let x = lu.solve(&b);
        for (i, value) in rhs.iter_mut().enumerate() {
            *value = x[(i, 0)];
        }
        if rhs.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::FactorFailed);
        }
        Ok(())
    }

    fn reset_pattern(&mut self) {
        self.symbolic = None;
        self.lu = None;
        self.last_storage = None;
        self.last_offsets.clear();
        self.last_indices.clear();
    }

    fn factor_count(&self) -> usize {
        self.factor_count
    }

    fn name(&self) -> &'static str {
        "Faer"
    }
}
