#![warn(rust_2018_idioms)]

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;

use crate::{
    config::{AlgorithmConfig, JobConfig},
    error::NetworkError,
    localsearch::{metaheuristic::{CoolingSchedule, HillClimb, SimAnneal}, Solver},
};

mod config;
mod error;
mod localsearch;
mod network;
mod parse;
mod random;

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Optimise train routes over a rail network
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// TOML job file describing the run
    job: PathBuf,
    /// Start from a saved solution instead of a random one
    #[arg(long)]
    resume: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), NetworkError> {
    let config = JobConfig::load(&cli.job)?;
    let mut rng = config.rng();
    let run_id = format!("{}-{:016x}", config.run_name, config.seed.unwrap_or_else(|| rng.u64(..)));

    let mut network = parse::load_network(&config.stations, &config.connections)?;
    let mut params = config.search_params(&run_id);
    if let Some(path) = &cli.resume {
        network = parse::load_solution(&network, path)?;
        params.random_iterations = 0;
        log::info!("resuming from {} with score {}", path.display(), network.score());
    }
    log::info!(
        "running {:?} on {} stations and {} connections, theoretical max score {}",
        config.algorithm, network.station_count(), network.connection_count(),
        network.theoretical_max_score(config.max_duration)
    );

    let outcome = match &config.algorithm {
        AlgorithmConfig::Random => random::random_search(&network, &params, &mut rng)?,
        AlgorithmConfig::RouteHillClimber { policy } => {
            localsearch::route_hill_climber(&network, &params, *policy, &mut rng)?
        }
        AlgorithmConfig::MutationHillClimber { escalation, replace_below, policy } => {
            localsearch::mutation_hill_climber(&network, &params, *escalation, *replace_below, *policy, &mut rng)?
        }
        AlgorithmConfig::Annealing { step, cooling: CoolingSchedule::HillClimb } => {
            Solver::<HillClimb> { network: &network, params, step: *step, mh_params: () }.solve(&mut rng)?
        }
        AlgorithmConfig::Annealing { step, cooling } => {
            Solver::<SimAnneal> { network: &network, params, step: *step, mh_params: *cooling }.solve(&mut rng)?
        }
    };

    if !outcome.best.check_valid_solution(config.max_duration) {
        log::warn!("best network holds routes that are broken or over the duration limit");
    }
    parse::save_solution(&outcome.best, &config.target_folder, &run_id, &format!("{}_best", config.run_name))?;
    parse::save_scores(&outcome.scores, &config.target_folder, &run_id, &config.run_name)?;
    println!("{}: {}", run_id, outcome.best.score());
    Ok(())
}
