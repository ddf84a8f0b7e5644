//! Column generation controller.
//!
//! Seeds the master with the greedy duties, then alternates LP solves and
//! pricing rounds until no improving duty is found or a limit is hit. The
//! fractional LP solution is turned into a partition by threshold rounding,
//! disjoint completion and a greedy repair of whatever is left uncovered.
//! Optionally the final column pool is first solved as an integer program
//! (price and branch); rounding remains the fallback.

use super::master::MasterProblem;
use super::pricing::DutyPricer;
use crate::graph::CompatibilityGraph;
use crate::heuristics::{AssignmentTracker, ConstructionHeuristic, GreedyDutyConstructor};
use crate::instance::ServiceRegistry;
use crate::legality::LegalityOracle;
use crate::lp::{LpSolution, LpSolver, LpStatus};
use crate::solution::{Duty, DutySchedule};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

const VALUE_EPSILON: f64 = 1e-6;

/// Column generation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnGenerationConfig {
    /// Maximum number of pricing rounds
    pub max_iterations: usize,
    /// Maximum columns injected per pricing round
    pub max_columns_per_iteration: usize,
    pub max_labels_per_node: usize,
    /// LP value above which a column is taken during rounding
    pub selection_threshold: f64,
    pub reduced_cost_tolerance: f64,
    /// Time limit in seconds
    pub time_limit: Option<f64>,
    pub parallel_pricing: bool,
    /// Solve the final column pool with integer variables before rounding
    pub integer_solve: bool,
}

impl Default for ColumnGenerationConfig {
    fn default() -> Self {
        ColumnGenerationConfig {
            max_iterations: 100,
            max_columns_per_iteration: 50,
            max_labels_per_node: 16,
            selection_threshold: 0.5,
            reduced_cost_tolerance: 1e-6,
            time_limit: None,
            parallel_pricing: true,
            integer_solve: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnGenerationState {
    Seed,
    Solve,
    Price,
    Inject,
    Converged,
    LimitReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverFailure {
    InfeasibleMaster,
    SolverLimitExceeded,
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnGenerationStatus {
    /// No improving column was found
    Converged,
    IterationLimit,
    TimeLimit,
    SolverFailure(SolverFailure),
}

impl fmt::Display for ColumnGenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnGenerationStatus::Converged => write!(f, "converged"),
            ColumnGenerationStatus::IterationLimit => write!(f, "iteration limit"),
            ColumnGenerationStatus::TimeLimit => write!(f, "time limit"),
            ColumnGenerationStatus::SolverFailure(SolverFailure::InfeasibleMaster) => {
                write!(f, "solver failure (infeasible master)")
            }
            ColumnGenerationStatus::SolverFailure(SolverFailure::SolverLimitExceeded) => {
                write!(f, "solver failure (solver limit exceeded)")
            }
            ColumnGenerationStatus::SolverFailure(SolverFailure::Backend(message)) => {
                write!(f, "solver failure ({})", message)
            }
        }
    }
}

/// One solve / price round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub lp_objective: f64,
    pub lp_iterations: usize,
    pub columns_added: usize,
    pub best_reduced_cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnGenerationResult {
    /// Final integer schedule
    pub schedule: DutySchedule,
    /// Greedy seed schedule
    pub greedy: DutySchedule,
    pub status: ColumnGenerationStatus,
    /// Objective of the last successful master solve
    pub lp_objective: Option<f64>,
    /// Objective of the integer solve over the final columns, when it was used
    pub integer_objective: Option<f64>,
    /// Pricing rounds performed
    pub iterations: usize,
    /// Columns added by pricing
    pub columns_generated: usize,
    pub total_columns: usize,
    pub history: Vec<IterationRecord>,
    pub trace: Vec<ColumnGenerationState>,
}

impl ColumnGenerationResult {
    /// Duties saved relative to the greedy seed
    pub fn improvement(&self) -> isize {
        self.greedy.num_duties() as isize - self.schedule.num_duties() as isize
    }
}

impl fmt::Display for ColumnGenerationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Column Generation Result")?;
        writeln!(f, "  Status: {}", self.status)?;
        writeln!(f, "  Greedy duties: {}", self.greedy.num_duties())?;
        writeln!(f, "  Final duties: {}", self.schedule.num_duties())?;
        if let Some(lp) = self.lp_objective {
            writeln!(f, "  LP objective: {:.4}", lp)?;
        }
        if let Some(ip) = self.integer_objective {
            writeln!(f, "  Integer objective: {:.0}", ip)?;
        }
        writeln!(f, "  Pricing rounds: {}", self.iterations)?;
        writeln!(
            f,
            "  Columns: {} generated, {} total",
            self.columns_generated, self.total_columns
        )?;
        writeln!(f, "  Time: {:.4}s", self.schedule.computation_time)?;
        Ok(())
    }
}

/// Column generation over the set-partitioning master problem
pub struct ColumnGeneration<'a> {
    registry: &'a ServiceRegistry,
    oracle: &'a LegalityOracle,
    graph: &'a CompatibilityGraph,
    solver: &'a dyn LpSolver,
    pub config: ColumnGenerationConfig,
}

impl<'a> ColumnGeneration<'a> {
    pub fn new(
        registry: &'a ServiceRegistry,
        oracle: &'a LegalityOracle,
        graph: &'a CompatibilityGraph,
        solver: &'a dyn LpSolver,
        config: ColumnGenerationConfig,
    ) -> Self {
        ColumnGeneration {
            registry,
            oracle,
            graph,
            solver,
            config,
        }
    }

    pub fn run(&self) -> ColumnGenerationResult {
        let start = Instant::now();
        let mut trace = vec![ColumnGenerationState::Seed];

        let greedy = GreedyDutyConstructor::new(self.oracle).construct(self.registry);
        let mut master = MasterProblem::from_duties(self.registry.len(), greedy.duties.iter().cloned());
        log::info!(
            "Column generation: {} services, {} seed columns, solver {}",
            self.registry.len(),
            master.num_columns(),
            self.solver.name()
        );

        let mut pricer = DutyPricer::new(self.registry, self.graph, self.oracle);
        pricer.max_labels_per_node = self.config.max_labels_per_node;
        pricer.tolerance = self.config.reduced_cost_tolerance;
        pricer.parallel = self.config.parallel_pricing;

        let mut last_good: Option<LpSolution> = None;
        let mut history = Vec::new();
        let mut iterations = 0;
        let mut columns_generated = 0;

        let status = loop {
            trace.push(ColumnGenerationState::Solve);
            let solution = match self.solver.solve(&master.to_linear_program()) {
                Ok(solution) => solution,
                Err(e) => {
                    log::error!("LP solver failed: {}", e);
                    break ColumnGenerationStatus::SolverFailure(SolverFailure::Backend(e.to_string()));
                }
            };
            match solution.status {
                LpStatus::Optimal => {}
                LpStatus::Infeasible => {
                    log::error!("Master problem is infeasible");
                    break ColumnGenerationStatus::SolverFailure(SolverFailure::InfeasibleMaster);
                }
                LpStatus::Unbounded => {
                    log::error!("Master problem is unbounded");
                    break ColumnGenerationStatus::SolverFailure(SolverFailure::Backend(
                        "unbounded master problem".to_string(),
                    ));
                }
                LpStatus::IterationLimit => {
                    log::error!("LP solver hit its iteration limit after {} pivots", solution.iterations);
                    break ColumnGenerationStatus::SolverFailure(SolverFailure::SolverLimitExceeded);
                }
            }

            if let Some(previous) = &last_good {
                if solution.objective > previous.objective + 1e-6 {
                    log::warn!(
                        "Master objective increased from {:.6} to {:.6}",
                        previous.objective,
                        solution.objective
                    );
                }
            }

            if iterations >= self.config.max_iterations {
                last_good = Some(solution);
                trace.push(ColumnGenerationState::LimitReached);
                break ColumnGenerationStatus::IterationLimit;
            }
            if let Some(limit) = self.config.time_limit {
                if start.elapsed().as_secs_f64() >= limit {
                    last_good = Some(solution);
                    trace.push(ColumnGenerationState::LimitReached);
                    break ColumnGenerationStatus::TimeLimit;
                }
            }

            trace.push(ColumnGenerationState::Price);
            let priced = pricer.price(
                &solution.duals,
                self.config.max_columns_per_iteration,
                |duty| master.contains(duty),
            );
            iterations += 1;
            let best_reduced_cost = priced.first().map(|c| c.reduced_cost);

            let mut added = 0;
            if !priced.is_empty() {
                trace.push(ColumnGenerationState::Inject);
                for column in priced {
                    if master.add_column(column.duty).is_some() {
                        added += 1;
                    }
                }
            }
            columns_generated += added;

            log::info!(
                "Iteration {}: LP objective {:.4}, {} columns added, best reduced cost {}",
                iterations,
                solution.objective,
                added,
                best_reduced_cost.map_or("-".to_string(), |rc| format!("{:.4}", rc))
            );
            history.push(IterationRecord {
                iteration: iterations,
                lp_objective: solution.objective,
                lp_iterations: solution.iterations,
                columns_added: added,
                best_reduced_cost,
            });
            last_good = Some(solution);

            if added == 0 {
                trace.push(ColumnGenerationState::Converged);
                break ColumnGenerationStatus::Converged;
            }
        };

        let mut integer_objective = None;
        let mut schedule = match (&status, &last_good) {
            (ColumnGenerationStatus::SolverFailure(SolverFailure::InfeasibleMaster), _) | (_, None) => {
                log::warn!("Falling back to the greedy schedule ({})", status);
                greedy.clone()
            }
            (_, Some(solution)) => {
                let integer = if self.config.integer_solve {
                    self.select_integer(&master, &greedy)
                } else {
                    None
                };
                match integer {
                    Some((schedule, objective)) => {
                        integer_objective = Some(objective);
                        schedule
                    }
                    None => self.round(&master, solution, &greedy),
                }
            }
        };
        schedule.computation_time = start.elapsed().as_secs_f64();
        schedule.iterations = Some(iterations);

        log::info!(
            "Column generation finished ({}): {} duties, greedy {}, {} columns generated",
            status,
            schedule.num_duties(),
            greedy.num_duties(),
            columns_generated
        );

        ColumnGenerationResult {
            schedule,
            greedy,
            status,
            lp_objective: last_good.map(|s| s.objective),
            integer_objective,
            iterations,
            columns_generated,
            total_columns: master.num_columns(),
            history,
            trace,
        }
    }

    /// Integer set-partitioning solve over every column in the master.
    ///
    /// `None` when the backend has no MIP solver, the solve does not reach
    /// optimality, or the selection is not a legal partition.
    fn select_integer(&self, master: &MasterProblem, greedy: &DutySchedule) -> Option<(DutySchedule, f64)> {
        let solution = match self.solver.solve_integer(&master.to_linear_program()) {
            Ok(solution) if solution.is_optimal() => solution,
            Ok(solution) => {
                log::warn!("Integer master ended with status {:?}; rounding instead", solution.status);
                return None;
            }
            Err(e) => {
                log::warn!("Integer master failed ({}); rounding instead", e);
                return None;
            }
        };

        let mut duties: Vec<Duty> = solution
            .primal
            .iter()
            .enumerate()
            .filter(|&(_, &value)| value > 0.5)
            .map(|(column, _)| master.column(column).clone())
            .collect();
        duties.sort_by_key(|duty| (self.registry.service(duty.first()).start_time, duty.first()));

        let schedule = DutySchedule::from_duties(self.registry, self.oracle, duties, "ColumnGeneration+IP");
        if !schedule.feasible || schedule.num_duties() > greedy.num_duties() {
            log::warn!(
                "Integer selection ({} duties, feasible {}) rejected; rounding instead",
                schedule.num_duties(),
                schedule.feasible
            );
            return None;
        }
        log::info!("Integer master selected {} duties", schedule.num_duties());
        Some((schedule, solution.objective))
    }

    /// Integer selection from a fractional master solution.
    ///
    /// Columns above the threshold are taken in decreasing value order, then
    /// any other positive column disjoint from the selection, then the greedy
    /// constructor covers what is left. Never returns more duties than
    /// `greedy`.
    fn round(&self, master: &MasterProblem, solution: &LpSolution, greedy: &DutySchedule) -> DutySchedule {
        let mut candidates: Vec<(usize, f64)> = solution
            .primal
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, value)| value > VALUE_EPSILON)
            .collect();
        candidates.sort_by(|a, b| OrderedFloat(b.1).cmp(&OrderedFloat(a.1)).then(a.0.cmp(&b.0)));

        let mut tracker = AssignmentTracker::new(self.registry.len());
        let mut selected: Vec<Duty> = Vec::new();
        for threshold in [self.config.selection_threshold, VALUE_EPSILON] {
            for &(column, value) in &candidates {
                if value <= threshold {
                    break;
                }
                let duty = master.column(column);
                if duty.legs().iter().any(|&leg| tracker.is_assigned(leg)) {
                    continue;
                }
                for &leg in duty.legs() {
                    tracker.assign(leg);
                }
                selected.push(duty.clone());
            }
        }

        let from_lp = selected.len();
        let uncovered = self.registry.len() - tracker.num_assigned();
        let (repair, tracker) = GreedyDutyConstructor::new(self.oracle).construct_with(self.registry, tracker);
        debug_assert!(tracker.is_complete());
        log::debug!(
            "Rounding: {} duties from the LP, {} services repaired into {} duties",
            from_lp,
            uncovered,
            repair.len()
        );
        selected.extend(repair);
        selected.sort_by_key(|duty| (self.registry.service(duty.first()).start_time, duty.first()));

        let schedule = DutySchedule::from_duties(self.registry, self.oracle, selected, "ColumnGeneration");
        if !schedule.feasible || schedule.num_duties() > greedy.num_duties() {
            log::warn!(
                "Rounded schedule ({} duties, feasible {}) is worse than greedy ({}); keeping greedy",
                schedule.num_duties(),
                schedule.feasible,
                greedy.num_duties()
            );
            return greedy.clone();
        }
        schedule
    }
}
