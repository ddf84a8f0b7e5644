//! LP backend built on `good_lp`.
//!
//! Relaxations run through the clarabel interior-point solver, which reports
//! row duals. Integer programs go to microlp's branch and bound. Both solvers
//! are pure Rust, so this backend is always available.

use super::{LinearProgram, LpSolution, LpSolver, LpStatus};
use crate::error::SolverError;
use good_lp::solvers::{DualValues, SolutionWithDual};
use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ClarabelLpSolver;

impl ClarabelLpSolver {
    pub fn new() -> Self {
        ClarabelLpSolver
    }
}

/// A program translated to `good_lp`: one group of constraints per row,
/// two when a row is ranged.
struct Model {
    vars: ProblemVariables,
    columns: Vec<Variable>,
    objective: Expression,
    rows: Vec<Vec<Constraint>>,
}

impl Model {
    fn build(lp: &LinearProgram, integer: bool) -> Self {
        let mut vars = ProblemVariables::new();
        let columns: Vec<Variable> = lp
            .variable_bounds
            .iter()
            .map(|&(lo, hi)| {
                let mut definition = variable();
                if integer {
                    definition = definition.integer();
                }
                if lo.is_finite() {
                    definition = definition.min(lo);
                }
                if hi.is_finite() {
                    definition = definition.max(hi);
                }
                vars.add(definition)
            })
            .collect();

        let objective: Expression = columns.iter().zip(&lp.objective).map(|(&x, &c)| c * x).sum();

        let rows = lp
            .rows
            .iter()
            .zip(&lp.row_bounds)
            .map(|(row, &(lo, hi))| {
                let expr: Expression = row.iter().map(|&(j, a)| a * columns[j]).sum();
                if lo.is_finite() && lo == hi {
                    return vec![constraint!(expr == lo)];
                }
                let mut group = Vec::with_capacity(2);
                if lo.is_finite() {
                    group.push(constraint!(expr.clone() >= lo));
                }
                if hi.is_finite() {
                    group.push(constraint!(expr <= hi));
                }
                group
            })
            .collect();

        Model {
            vars,
            columns,
            objective,
            rows,
        }
    }
}

fn unsolved(error: ResolutionError) -> Result<LpSolution, SolverError> {
    match error {
        ResolutionError::Infeasible => Ok(LpSolution::with_status(LpStatus::Infeasible, 0)),
        ResolutionError::Unbounded => Ok(LpSolution::with_status(LpStatus::Unbounded, 0)),
        other => Err(SolverError::Backend(other.to_string())),
    }
}

/// Programs without variables never reach the solvers.
fn without_variables(lp: &LinearProgram) -> LpSolution {
    if lp.row_bounds.iter().all(|&(lo, hi)| lo <= 0.0 && 0.0 <= hi) {
        LpSolution {
            status: LpStatus::Optimal,
            primal: Vec::new(),
            objective: 0.0,
            duals: vec![0.0; lp.num_rows()],
            iterations: 0,
        }
    } else {
        LpSolution::with_status(LpStatus::Infeasible, 0)
    }
}

impl LpSolver for ClarabelLpSolver {
    fn solve(&self, lp: &LinearProgram) -> Result<LpSolution, SolverError> {
        lp.check()?;
        if lp.num_variables() == 0 {
            return Ok(without_variables(lp));
        }

        let Model {
            vars,
            columns,
            objective,
            rows,
        } = Model::build(lp, false);
        let mut problem = vars.minimise(objective).using(good_lp::clarabel);

        let mut references = Vec::with_capacity(rows.len());
        for group in rows {
            let group: Vec<_> = group.into_iter().map(|c| problem.add_constraint(c)).collect();
            references.push(group);
        }

        let mut solution = match problem.solve() {
            Ok(solution) => solution,
            Err(e) => return unsolved(e),
        };

        let primal: Vec<f64> = columns.iter().map(|&x| solution.value(x)).collect();
        let objective = lp.objective_value(&primal);

        let dual = solution.compute_dual();
        let duals = references
            .into_iter()
            .map(|group| group.into_iter().map(|c| dual.dual(c)).sum::<f64>())
            .collect();

        Ok(LpSolution {
            status: LpStatus::Optimal,
            primal,
            objective,
            duals,
            iterations: 0,
        })
    }

    fn solve_integer(&self, lp: &LinearProgram) -> Result<LpSolution, SolverError> {
        lp.check()?;
        if lp.num_variables() == 0 {
            let mut solution = without_variables(lp);
            solution.duals.clear();
            return Ok(solution);
        }

        let Model {
            vars,
            columns,
            objective,
            rows,
        } = Model::build(lp, true);
        let mut problem = vars.minimise(objective).using(good_lp::microlp);
        for constraint in rows.into_iter().flatten() {
            problem = problem.with(constraint);
        }

        let solution = match problem.solve() {
            Ok(solution) => solution,
            Err(e) => return unsolved(e),
        };

        let primal: Vec<f64> = columns.iter().map(|&x| solution.value(x).round()).collect();
        let objective = lp.objective_value(&primal);

        Ok(LpSolution {
            status: LpStatus::Optimal,
            primal,
            objective,
            duals: Vec::new(),
            iterations: 0,
        })
    }

    fn name(&self) -> &str {
        "Clarabel"
    }
}
