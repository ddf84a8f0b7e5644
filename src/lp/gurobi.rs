//! LP backend using the Gurobi optimizer.
//!
//! Solves the relaxed master problem with Gurobi's simplex and reads row duals
//! from the `Pi` attribute. The integer solve declares every variable integral
//! and runs Gurobi's branch and bound. Only built with the `gurobi` feature.

use super::{GurobiConfig, LinearProgram, LpSolution, LpSolver, LpStatus};
use crate::error::SolverError;
use grb::prelude::*;

const GRB_INFINITY: f64 = 1e100;

pub struct GurobiLpSolver {
    pub config: GurobiConfig,
}

impl GurobiLpSolver {
    pub fn new(config: GurobiConfig) -> Self {
        GurobiLpSolver { config }
    }
}

fn backend(context: &str) -> impl Fn(grb::Error) -> SolverError + '_ {
    move |e| SolverError::Backend(format!("{}: {}", context, e))
}

impl GurobiLpSolver {
    fn optimize(&self, lp: &LinearProgram, integer: bool) -> Result<LpSolution, SolverError> {
        lp.check()?;

        let env = Env::new("").map_err(backend("Failed to create Gurobi environment"))?;
        let mut model = Model::with_env("CrewMaster", env).map_err(backend("Failed to create model"))?;

        model
            .set_param(param::TimeLimit, self.config.time_limit)
            .map_err(backend("Failed to set time limit"))?;
        model
            .set_param(param::IterationLimit, self.config.iteration_limit)
            .map_err(backend("Failed to set iteration limit"))?;
        model
            .set_param(param::Threads, self.config.threads)
            .map_err(backend("Failed to set threads"))?;
        if !self.config.verbose {
            model
                .set_param(param::OutputFlag, 0)
                .map_err(backend("Failed to set output flag"))?;
        }

        let mut vars: Vec<Var> = Vec::with_capacity(lp.num_variables());
        for (j, (&(lo, hi), &c)) in lp.variable_bounds.iter().zip(&lp.objective).enumerate() {
            let lo = lo.max(-GRB_INFINITY);
            let hi = hi.min(GRB_INFINITY);
            let name = format!("x_{}", j);
            let var = if integer {
                add_intvar!(model, name: &name, bounds: lo..hi, obj: c)
            } else {
                add_ctsvar!(model, name: &name, bounds: lo..hi, obj: c)
            }
            .map_err(backend("Failed to add variable"))?;
            vars.push(var);
        }

        model.update().map_err(backend("Failed to update model"))?;

        // One or two Gurobi constraints per row; ranged rows are split
        let mut constrs: Vec<Vec<Constr>> = Vec::with_capacity(lp.num_rows());
        for (i, (row, &(lo, hi))) in lp.rows.iter().zip(&lp.row_bounds).enumerate() {
            let expr: Expr = row.iter().map(|&(j, a)| a * vars[j]).grb_sum();
            let mut row_constrs = Vec::with_capacity(2);
            if lo.is_finite() && hi.is_finite() && lo == hi {
                row_constrs.push(
                    model
                        .add_constr(&format!("row_{}", i), c!(expr == lo))
                        .map_err(backend("Failed to add equality row"))?,
                );
            } else {
                if lo.is_finite() {
                    row_constrs.push(
                        model
                            .add_constr(&format!("row_{}_lo", i), c!(expr.clone() >= lo))
                            .map_err(backend("Failed to add row lower bound"))?,
                    );
                }
                if hi.is_finite() {
                    row_constrs.push(
                        model
                            .add_constr(&format!("row_{}_hi", i), c!(expr <= hi))
                            .map_err(backend("Failed to add row upper bound"))?,
                    );
                }
            }
            constrs.push(row_constrs);
        }

        model.optimize().map_err(backend("Optimization failed"))?;

        let iterations = model.get_attr(attr::IterCount).unwrap_or(0.0) as usize;
        let status = model.status().map_err(backend("Failed to get status"))?;
        match status {
            Status::Optimal => {}
            Status::Infeasible | Status::InfOrUnbd => {
                return Ok(LpSolution::with_status(LpStatus::Infeasible, iterations));
            }
            Status::Unbounded => return Ok(LpSolution::with_status(LpStatus::Unbounded, iterations)),
            Status::IterationLimit | Status::TimeLimit => {
                return Ok(LpSolution::with_status(LpStatus::IterationLimit, iterations));
            }
            other => return Err(SolverError::Backend(format!("unexpected Gurobi status {:?}", other))),
        }

        let mut primal = Vec::with_capacity(vars.len());
        for var in &vars {
            primal.push(model.get_obj_attr(attr::X, var).map_err(backend("Failed to read primal"))?);
        }

        // MIP models carry no duals
        let mut duals = Vec::new();
        if !integer {
            duals.reserve(constrs.len());
            for row_constrs in &constrs {
                let mut dual = 0.0;
                for constr in row_constrs {
                    dual += model.get_obj_attr(attr::Pi, constr).map_err(backend("Failed to read dual"))?;
                }
                duals.push(dual);
            }
        }

        let objective = model.get_attr(attr::ObjVal).map_err(backend("Failed to read objective"))?;

        Ok(LpSolution {
            status: LpStatus::Optimal,
            primal,
            objective,
            duals,
            iterations,
        })
    }
}

impl LpSolver for GurobiLpSolver {
    fn solve(&self, lp: &LinearProgram) -> Result<LpSolution, SolverError> {
        self.optimize(lp, false)
    }

    fn solve_integer(&self, lp: &LinearProgram) -> Result<LpSolution, SolverError> {
        self.optimize(lp, true)
    }

    fn name(&self) -> &str {
        "Gurobi"
    }
}
