//! Crew Duty Solver - Command Line Interface
//!
//! Builds crew duties for a timetable and writes the resulting roster.

use clap::{Parser, Subcommand, ValueEnum};
use crew_duty_solver::config::SolverConfig;
use crew_duty_solver::generator::{GeneratorConfig, TimetableGenerator};
use crew_duty_solver::graph::CompatibilityGraph;
use crew_duty_solver::heuristics::{ConstructionHeuristic, GreedyDutyConstructor};
use crew_duty_solver::instance::{format_duration, ServiceRegistry};
use crew_duty_solver::lp::{ClarabelLpSolver, GurobiConfig, GurobiLpSolver, LpSolver};
use crew_duty_solver::optimization::ColumnGeneration;
use crew_duty_solver::roster::Roster;
use crew_duty_solver::solution::DutySchedule;

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "crew-duty-solver")]
#[command(version = "1.0")]
#[command(about = "Crew duty scheduling by greedy construction and column generation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build duties for a service file
    Solve {
        /// Service CSV file
        #[arg(short, long)]
        services: PathBuf,

        /// JSON solver configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Roster CSV output
        #[arg(short, long, default_value = "roster.csv")]
        output: PathBuf,

        /// Also write the roster as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Override the maximum number of pricing rounds
        #[arg(long)]
        max_iterations: Option<usize>,

        /// LP backend for the master problem
        #[arg(long, value_enum, default_value = "builtin")]
        solver: Backend,

        /// Skip column generation and keep the greedy duties
        #[arg(long)]
        greedy_only: bool,

        /// Solve the final column pool as an integer program before rounding
        #[arg(long)]
        integer: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Analyze a service file
    Analyze {
        /// Service CSV file
        #[arg(short, long)]
        services: PathBuf,

        /// JSON solver configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Generate a random service file
    Generate {
        /// Service CSV output
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "10")]
        vehicles: usize,

        #[arg(long, default_value = "6")]
        legs_per_vehicle: usize,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Backend {
    /// Built-in clarabel / microlp backend
    Builtin,
    /// Gurobi (requires the `gurobi` feature)
    Gurobi,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve { services, config, output, json, max_iterations, solver, greedy_only, integer, verbose } => {
            let options = SolveOptions { max_iterations, backend: solver, greedy_only, integer, verbose };
            solve(&services, config.as_deref(), &output, json.as_deref(), &options);
        }

        Commands::Analyze { services, config } => {
            analyze(&services, config.as_deref());
        }

        Commands::Generate { output, vehicles, legs_per_vehicle, seed } => {
            generate(&output, vehicles, legs_per_vehicle, seed);
        }
    }
}

fn load_registry(path: &Path) -> ServiceRegistry {
    match ServiceRegistry::from_file(path) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error loading services: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>) -> SolverConfig {
    let Some(path) = path else {
        return SolverConfig::default();
    };
    match SolverConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    }
}

struct SolveOptions {
    max_iterations: Option<usize>,
    backend: Backend,
    greedy_only: bool,
    integer: bool,
    verbose: bool,
}

fn solve(services: &Path, config_path: Option<&Path>, output: &Path, json: Option<&Path>, options: &SolveOptions) {
    let verbose = options.verbose;
    println!("Loading services from {:?}...", services);
    let registry = load_registry(services);
    let mut config = load_config(config_path);
    if let Some(max_iterations) = options.max_iterations {
        config.column_generation.max_iterations = max_iterations;
    }
    if options.integer {
        config.column_generation.integer_solve = true;
    }

    if !registry.rejected().is_empty() {
        println!("Rejected {} malformed records", registry.rejected().len());
        if verbose {
            for reason in registry.rejected() {
                println!("  {}", reason);
            }
        }
    }
    if verbose {
        println!("{}", registry.statistics());
    }

    let oracle = config.oracle();

    let schedule: DutySchedule = if options.greedy_only {
        println!("Building duties greedily...");
        GreedyDutyConstructor::new(&oracle).construct(&registry)
    } else {
        let graph = CompatibilityGraph::build(&registry, &oracle);
        if verbose {
            println!("{}", graph.statistics());
        }

        let solver: Box<dyn LpSolver> = match options.backend {
            Backend::Builtin => Box::new(ClarabelLpSolver::new()),
            Backend::Gurobi => Box::new(GurobiLpSolver::new(GurobiConfig {
                verbose,
                ..GurobiConfig::default()
            })),
        };

        println!("Running column generation with {} solver...", solver.name());
        let result = ColumnGeneration::new(
            &registry,
            &oracle,
            &graph,
            solver.as_ref(),
            config.column_generation.clone(),
        )
        .run();
        println!("{}", result);
        if verbose {
            for record in &result.history {
                println!(
                    "  iter {:>3}: LP {:>10.4}  +{:<3} columns",
                    record.iteration, record.lp_objective, record.columns_added
                );
            }
        }
        result.schedule
    };

    println!("{}", schedule);
    if !schedule.feasible {
        eprintln!("Warning: schedule is not a legal partition of the services");
    }

    let roster = Roster::build(&registry, &config, &schedule);
    println!("{}", roster);

    if let Err(e) = roster.save_csv(output) {
        eprintln!("Error writing roster: {}", e);
        std::process::exit(1);
    }
    println!("Roster saved to {:?}", output);

    if let Some(json) = json {
        let written = roster
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|text| std::fs::write(json, text).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("Error writing JSON roster: {}", e);
            std::process::exit(1);
        }
        println!("JSON roster saved to {:?}", json);
    }
}

fn analyze(services: &Path, config_path: Option<&Path>) {
    let registry = load_registry(services);
    let config = load_config(config_path);
    let oracle = config.oracle();

    println!("========== Timetable Analysis ==========\n");
    println!("{}", registry.statistics());

    if !registry.rejected().is_empty() {
        println!("Rejected records:");
        for reason in registry.rejected() {
            println!("  {}", reason);
        }
        println!();
    }

    let graph = CompatibilityGraph::build(&registry, &oracle);
    println!("{}", graph.statistics());

    if oracle.jurisdictions.is_unrestricted() {
        println!("Jurisdictions: unrestricted");
    } else {
        println!("Jurisdictions:");
        for group in oracle.jurisdictions.groups() {
            let departures = registry
                .services()
                .iter()
                .filter(|s| oracle.jurisdictions.jurisdiction_of(&s.start_station) == Some(group.name.as_str()))
                .count();
            println!("  {}: {} stations, {} departures", group.name, group.stations.len(), departures);
        }
        let unmapped = registry
            .services()
            .iter()
            .filter(|s| oracle.jurisdictions.jurisdiction_of(&s.start_station).is_none())
            .count();
        println!("  (none): {} departures", unmapped);
    }

    let greedy = GreedyDutyConstructor::new(&oracle).construct(&registry);
    let longest = greedy.duties.iter().map(|d| d.elapsed(&registry)).max().unwrap_or(0);
    println!("\nGreedy baseline:");
    println!("  Duties: {}", greedy.num_duties());
    println!("  Singletons: {}", greedy.duties.iter().filter(|d| d.len() == 1).count());
    println!("  Longest duty: {}", format_duration(longest));
    println!(
        "  Same jurisdiction: {:.1}%",
        greedy.same_jurisdiction_share(&registry, &oracle)
    );
}

fn generate(output: &Path, vehicles: usize, legs_per_vehicle: usize, seed: u64) {
    let generator = TimetableGenerator::new(GeneratorConfig {
        vehicles,
        legs_per_vehicle,
        ..GeneratorConfig::default()
    });
    let registry = generator.generate(seed);

    let written = std::fs::File::create(output)
        .map_err(csv::Error::from)
        .and_then(|file| registry.write_csv(file));
    if let Err(e) = written {
        eprintln!("Error writing services: {}", e);
        std::process::exit(1);
    }
    println!("Generated {} services for {} vehicles into {:?}", registry.len(), vehicles, output);
}
