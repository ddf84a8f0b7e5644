//! Crew Duty Solver Library
//!
//! Builds crew duties for a transit timetable: every scheduled service is
//! assigned to exactly one duty, each duty obeys the working-time and
//! rest-break rules, and the number of duties is minimized.
//!
//! # Features
//!
//! - CSV service loading with per-record validation
//! - Legality rules for service successions, duty length and crew jurisdictions
//! - Greedy duty construction with boundary backtracking
//! - Column generation over a set-partitioning LP, with labeling-based pricing
//! - Optional integer solve of the final column pool
//! - Built-in `good_lp` backend (clarabel relaxations, microlp integer
//!   programs), optional Gurobi backend (`gurobi` feature)
//! - Roster export (CSV and JSON) and a random timetable generator
//!
//! # Example
//!
//! ```no_run
//! use crew_duty_solver::config::SolverConfig;
//! use crew_duty_solver::graph::CompatibilityGraph;
//! use crew_duty_solver::instance::ServiceRegistry;
//! use crew_duty_solver::lp::ClarabelLpSolver;
//! use crew_duty_solver::optimization::ColumnGeneration;
//! use crew_duty_solver::roster::Roster;
//!
//! let registry = ServiceRegistry::from_file("services.csv").unwrap();
//! let config = SolverConfig::default();
//! let oracle = config.oracle();
//! let graph = CompatibilityGraph::build(&registry, &oracle);
//! let solver = ClarabelLpSolver::new();
//!
//! let result = ColumnGeneration::new(&registry, &oracle, &graph, &solver, config.column_generation.clone()).run();
//! println!("{}", result);
//!
//! let roster = Roster::build(&registry, &config, &result.schedule);
//! roster.save_csv("roster.csv").unwrap();
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod graph;
pub mod heuristics;
pub mod instance;
pub mod legality;
pub mod lp;
pub mod optimization;
pub mod roster;
pub mod solution;

pub use config::SolverConfig;
pub use error::{ConfigError, LoadError, RecordError, SolverError};
pub use graph::CompatibilityGraph;
pub use instance::{Service, ServiceIdx, ServiceRegistry};
pub use legality::LegalityOracle;
pub use solution::{Duty, DutySchedule};
