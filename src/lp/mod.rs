//! Linear programming interface.
//!
//! The column generation controller talks to LP backends only through
//! [`LpSolver`]: it hands over a [`LinearProgram`] snapshot and gets back an
//! [`LpSolution`] with primal values, objective and one dual value per row.
//! Infeasibility and iteration limits are reported through [`LpStatus`];
//! `Err` is reserved for failures of the backend itself.
//!
//! [`ClarabelLpSolver`] is always available. `GurobiLpSolver` needs the
//! `gurobi` feature and reports itself unavailable otherwise.

use crate::error::SolverError;
use serde::{Deserialize, Serialize};

mod clarabel;
pub use clarabel::ClarabelLpSolver;

/// Gurobi solver configuration
#[derive(Debug, Clone)]
pub struct GurobiConfig {
    /// Time limit in seconds
    pub time_limit: f64,
    /// Simplex iteration limit
    pub iteration_limit: f64,
    /// Number of threads (0 = automatic)
    pub threads: i32,
    /// Enable verbose output
    pub verbose: bool,
}

impl Default for GurobiConfig {
    fn default() -> Self {
        GurobiConfig {
            time_limit: 600.0,
            iteration_limit: 1e7,
            threads: 0,
            verbose: false,
        }
    }
}

// When built with the `gurobi` feature, expose the real implementation
#[cfg(feature = "gurobi")]
mod gurobi;
#[cfg(feature = "gurobi")]
pub use gurobi::GurobiLpSolver;

// Otherwise provide a lightweight stub so the rest of the codebase can compile
#[cfg(not(feature = "gurobi"))]
mod gurobi_stub {
    use super::{GurobiConfig, LinearProgram, LpSolution, LpSolver};
    use crate::error::SolverError;

    pub struct GurobiLpSolver {
        pub config: GurobiConfig,
    }

    impl GurobiLpSolver {
        pub fn new(config: GurobiConfig) -> Self {
            GurobiLpSolver { config }
        }
    }

    impl LpSolver for GurobiLpSolver {
        fn solve(&self, _lp: &LinearProgram) -> Result<LpSolution, SolverError> {
            Err(SolverError::Unavailable("Gurobi feature not enabled in this build"))
        }

        fn solve_integer(&self, _lp: &LinearProgram) -> Result<LpSolution, SolverError> {
            Err(SolverError::Unavailable("Gurobi feature not enabled in this build"))
        }

        fn name(&self) -> &str {
            "Gurobi"
        }
    }
}

#[cfg(not(feature = "gurobi"))]
pub use gurobi_stub::GurobiLpSolver;

/// Sparse row: `(variable, coefficient)` pairs
pub type SparseRow = Vec<(usize, f64)>;

/// A linear program in the form
/// `min c'x  s.t.  row_lo <= A x <= row_hi,  var_lo <= x <= var_hi`.
///
/// Equality rows have equal bounds. Infinite bounds are `f64::INFINITY` /
/// `f64::NEG_INFINITY`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinearProgram {
    pub variable_bounds: Vec<(f64, f64)>,
    pub objective: Vec<f64>,
    pub rows: Vec<SparseRow>,
    pub row_bounds: Vec<(f64, f64)>,
}

impl LinearProgram {
    #[inline]
    pub fn num_variables(&self) -> usize {
        self.objective.len()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Objective value of a primal point.
    pub fn objective_value(&self, x: &[f64]) -> f64 {
        self.objective.iter().zip(x).map(|(c, v)| c * v).sum()
    }

    /// Row activities `A x`.
    pub fn activities(&self, x: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|&(j, a)| a * x[j]).sum())
            .collect()
    }

    /// Whether `x` satisfies every bound and row within `tolerance`.
    pub fn is_feasible(&self, x: &[f64], tolerance: f64) -> bool {
        x.len() == self.num_variables()
            && x
                .iter()
                .zip(&self.variable_bounds)
                .all(|(&v, &(lo, hi))| v >= lo - tolerance && v <= hi + tolerance)
            && self
                .activities(x)
                .iter()
                .zip(&self.row_bounds)
                .all(|(&a, &(lo, hi))| a >= lo - tolerance && a <= hi + tolerance)
    }

    /// Check dimensions and indices.
    pub fn check(&self) -> Result<(), SolverError> {
        let n = self.num_variables();
        if self.variable_bounds.len() != n {
            return Err(SolverError::Unsupported(format!(
                "{} variable bounds for {} variables",
                self.variable_bounds.len(),
                n
            )));
        }
        if self.row_bounds.len() != self.rows.len() {
            return Err(SolverError::Unsupported(format!(
                "{} row bounds for {} rows",
                self.row_bounds.len(),
                self.rows.len()
            )));
        }
        if let Some((i, _)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.iter().any(|&(j, _)| j >= n))
        {
            return Err(SolverError::Unsupported(format!("row {} references an unknown variable", i)));
        }
        Ok(())
    }
}

/// Termination status of an LP solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
    IterationLimit,
}

/// Result of an LP solve
///
/// `primal` and `duals` are filled only when `status` is `Optimal`. Duals are
/// shadow prices: the change of the optimal objective per unit increase of the
/// row's right-hand side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpSolution {
    pub status: LpStatus,
    pub primal: Vec<f64>,
    pub objective: f64,
    pub duals: Vec<f64>,
    pub iterations: usize,
}

impl LpSolution {
    /// A solution carrying only a non-optimal status.
    pub fn with_status(status: LpStatus, iterations: usize) -> Self {
        LpSolution {
            status,
            primal: Vec::new(),
            objective: f64::INFINITY,
            duals: Vec::new(),
            iterations,
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == LpStatus::Optimal
    }
}

/// A black-box LP optimizer.
///
/// Implementations must not keep references to the program between calls.
pub trait LpSolver {
    fn solve(&self, lp: &LinearProgram) -> Result<LpSolution, SolverError>;

    /// Solve with every variable restricted to integer values.
    ///
    /// Duals are left empty. Backends without a MIP solver report
    /// `SolverError::Unavailable`.
    fn solve_integer(&self, _lp: &LinearProgram) -> Result<LpSolution, SolverError> {
        Err(SolverError::Unavailable("integer programs are not supported by this backend"))
    }

    fn name(&self) -> &str;
}
