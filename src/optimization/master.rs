//! Restricted master problem.
//!
//! One non-negative continuous variable per known duty, objective coefficient
//! [`DUTY_COST`], and one equality row per service requiring it to be covered
//! exactly once. Columns are only ever appended.

use crate::instance::ServiceIdx;
use crate::lp::LinearProgram;
use crate::solution::Duty;
use std::collections::HashSet;

/// Index of a column (duty) in the master problem.
pub type ColumnId = usize;

/// Cost of staffing one duty
pub const DUTY_COST: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct MasterProblem {
    columns: Vec<Duty>,
    /// Columns covering each service, in insertion order
    coverage: Vec<Vec<ColumnId>>,
    known: HashSet<Duty>,
}

impl MasterProblem {
    pub fn new(num_services: usize) -> Self {
        MasterProblem {
            columns: Vec::new(),
            coverage: vec![Vec::new(); num_services],
            known: HashSet::new(),
        }
    }

    pub fn from_duties(num_services: usize, duties: impl IntoIterator<Item = Duty>) -> Self {
        let mut master = Self::new(num_services);
        for duty in duties {
            master.add_column(duty);
        }
        master
    }

    /// Append a duty as a new column.
    ///
    /// Only the coverage lists of the services the duty covers are touched.
    /// Returns `None` when the same leg sequence is already a column.
    pub fn add_column(&mut self, duty: Duty) -> Option<ColumnId> {
        if self.known.contains(&duty) {
            return None;
        }
        let id = self.columns.len();
        for &leg in duty.legs() {
            self.coverage[leg].push(id);
        }
        self.known.insert(duty.clone());
        self.columns.push(duty);
        Some(id)
    }

    pub fn contains(&self, duty: &Duty) -> bool {
        self.known.contains(duty)
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.coverage.len()
    }

    pub fn column(&self, id: ColumnId) -> &Duty {
        &self.columns[id]
    }

    pub fn columns(&self) -> &[Duty] {
        &self.columns
    }

    /// Columns covering a service.
    pub fn covering(&self, service: ServiceIdx) -> &[ColumnId] {
        &self.coverage[service]
    }

    /// Services no column covers; any such service makes the LP infeasible.
    pub fn uncovered(&self) -> Vec<ServiceIdx> {
        (0..self.coverage.len()).filter(|&s| self.coverage[s].is_empty()).collect()
    }

    /// Reduced cost of a duty under the given coverage duals.
    pub fn reduced_cost(duty: &Duty, duals: &[f64]) -> f64 {
        DUTY_COST - duty.legs().iter().map(|&leg| duals[leg]).sum::<f64>()
    }

    /// Snapshot of the relaxed set-partitioning LP.
    ///
    /// Columns are only bounded below; the unit coverage rows already keep
    /// every value at most 1.
    pub fn to_linear_program(&self) -> LinearProgram {
        let n = self.columns.len();
        LinearProgram {
            variable_bounds: vec![(0.0, f64::INFINITY); n],
            objective: vec![DUTY_COST; n],
            rows: self
                .coverage
                .iter()
                .map(|cols| cols.iter().map(|&c| (c, 1.0)).collect())
                .collect(),
            row_bounds: vec![(1.0, 1.0); self.coverage.len()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{ClarabelLpSolver, LpSolver, LpStatus};

    #[test]
    fn test_build_rows_and_columns() {
        let master = MasterProblem::from_duties(
            3,
            vec![Duty::new(vec![0, 2]), Duty::singleton(1), Duty::new(vec![1, 2])],
        );
        let lp = master.to_linear_program();

        assert_eq!(lp.num_variables(), 3);
        assert_eq!(lp.num_rows(), 3);
        assert_eq!(lp.rows[0], vec![(0, 1.0)]);
        assert_eq!(lp.rows[1], vec![(1, 1.0), (2, 1.0)]);
        assert_eq!(lp.rows[2], vec![(0, 1.0), (2, 1.0)]);
        assert!(lp.row_bounds.iter().all(|&b| b == (1.0, 1.0)));
        assert!(lp.variable_bounds.iter().all(|&b| b == (0.0, f64::INFINITY)));
        assert!(lp.objective.iter().all(|&c| c == DUTY_COST));
    }

    #[test]
    fn test_incremental_extension_and_duplicates() {
        let mut master = MasterProblem::from_duties(3, vec![Duty::singleton(0), Duty::singleton(1)]);
        assert_eq!(master.uncovered(), vec![2]);

        let before = master.to_linear_program();
        assert_eq!(master.add_column(Duty::new(vec![1, 2])), Some(2));
        assert_eq!(master.add_column(Duty::singleton(0)), None);

        let after = master.to_linear_program();
        assert_eq!(after.num_variables(), 3);
        assert_eq!(after.rows[0], before.rows[0]);
        assert_eq!(after.rows[1], vec![(1, 1.0), (2, 1.0)]);
        assert_eq!(after.rows[2], vec![(2, 1.0)]);
        assert!(master.uncovered().is_empty());
    }

    #[test]
    fn test_rebuild_is_identical() {
        let master = MasterProblem::from_duties(
            2,
            vec![Duty::singleton(0), Duty::singleton(1), Duty::new(vec![0, 1])],
        );
        assert_eq!(master.to_linear_program(), master.to_linear_program());
    }

    #[test]
    fn test_relaxation_selects_covering_duty() {
        let master = MasterProblem::from_duties(
            2,
            vec![Duty::singleton(0), Duty::singleton(1), Duty::new(vec![0, 1])],
        );
        let solution = ClarabelLpSolver::new().solve(&master.to_linear_program()).unwrap();

        assert_eq!(solution.status, LpStatus::Optimal);
        assert!((solution.objective - 1.0).abs() < 1e-5);
        assert!((solution.primal[2] - 1.0).abs() < 1e-5);

        // Without the covering duty the singletons cost 2
        let singletons = MasterProblem::from_duties(2, vec![Duty::singleton(0), Duty::singleton(1)]);
        let solution = ClarabelLpSolver::new().solve(&singletons.to_linear_program()).unwrap();
        assert!((solution.objective - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_reduced_cost() {
        let duty = Duty::new(vec![0, 2]);
        let duals = [0.75, 1.0, 0.5];
        assert!((MasterProblem::reduced_cost(&duty, &duals) + 0.25).abs() < 1e-12);
    }
}
