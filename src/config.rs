//! Job files describing a single optimisation run, in TOML format

use std::{fs, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};

use crate::{
    error::NetworkError,
    localsearch::{metaheuristic::{CoolingSchedule, StepFunction}, ExportTarget, ReplacementPolicy, SearchParams},
};

/// A full optimisation job
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct JobConfig {
    /// CSV file with `station,x,y` rows
    pub stations: PathBuf,
    /// CSV file with `station1,station2,distance` rows
    pub connections: PathBuf,
    /// The most routes a solution may use
    pub max_routes: usize,
    /// Every route must stay strictly under this duration
    pub max_duration: f64,
    #[serde(default = "default_target_folder")]
    pub target_folder: PathBuf,
    #[serde(default = "default_run_name")]
    pub run_name: String,
    /// Seed for the random source; unseeded runs are not reproducible
    #[serde(default)]
    pub seed: Option<u64>,
    /// Trials of random construction used to build the starting solution
    #[serde(default = "default_random_iterations")]
    pub random_iterations: usize,
    /// Iterations without improvement before a search stops
    #[serde(default = "default_convergence_limit")]
    pub convergence_limit: usize,
    /// Record every tried score in the history, not only accepted ones
    #[serde(default)]
    pub record_all: bool,
    /// Export every new best solution as it is found
    #[serde(default)]
    pub export_improvements: bool,
    pub algorithm: AlgorithmConfig,
}

/// The search driver to run, with its own parameters
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    /// Keep the best of many random solutions
    Random,
    /// Replace the weakest route with a fresh random one
    RouteHillClimber {
        #[serde(default)]
        policy: ReplacementPolicy,
    },
    /// Shorten and regrow route ends
    MutationHillClimber {
        /// How many stations to pop from an end per mutation, 1 to 3
        #[serde(default = "default_escalation")]
        escalation: usize,
        /// Below this many routes the weakest route is replaced instead of mutated
        #[serde(default)]
        replace_below: usize,
        #[serde(default)]
        policy: ReplacementPolicy,
    },
    /// Simulated annealing over whole-route steps
    Annealing {
        #[serde(default)]
        step: StepFunction,
        cooling: CoolingSchedule,
    },
}

fn default_target_folder() -> PathBuf {
    PathBuf::from("results")
}

fn default_run_name() -> String {
    "solution".to_string()
}

fn default_random_iterations() -> usize {
    1000
}

fn default_convergence_limit() -> usize {
    5000
}

fn default_escalation() -> usize {
    1
}

impl JobConfig {
    /// Reads and validates a job file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NetworkError> {
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects parameters no search can run with
    pub fn validate(&self) -> Result<(), NetworkError> {
        if !(self.max_duration > 0.0) {
            return Err(NetworkError::InvalidParameter(format!("max_duration must be positive, got {}", self.max_duration)));
        }
        if self.max_routes == 0 {
            return Err(NetworkError::InvalidParameter("max_routes must be at least 1".to_string()));
        }
        match &self.algorithm {
            AlgorithmConfig::MutationHillClimber { escalation, .. } if !(1..=3).contains(escalation) => {
                Err(NetworkError::InvalidParameter(format!("escalation must be between 1 and 3, got {escalation}")))
            }
            AlgorithmConfig::Annealing { cooling, .. } => cooling.validate(),
            _ => Ok(()),
        }
    }

    /// The driver parameters for this job. `run_id` names every file the run writes.
    pub fn search_params(&self, run_id: &str) -> SearchParams {
        SearchParams {
            max_routes: self.max_routes,
            max_duration: self.max_duration,
            convergence_limit: self.convergence_limit,
            random_iterations: self.random_iterations,
            record_all: self.record_all,
            export_improvements: self.export_improvements.then(|| ExportTarget {
                folder: self.target_folder.clone(),
                run_id: run_id.to_string(),
                run_name: self.run_name.clone(),
            }),
        }
    }

    /// The random source for this run
    pub fn rng(&self) -> fastrand::Rng {
        match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_annealing_job() {
        let config: JobConfig = toml::from_str(r#"
            stations = "data/stations.csv"
            connections = "data/connections.csv"
            max_routes = 7
            max_duration = 120.0
            seed = 3
            [algorithm]
            kind = "annealing"
            [algorithm.cooling]
            schedule = "geometric"
            initial_temperature = 500.0
            base = 0.999
        "#).unwrap();
        assert_eq!(config.run_name, "solution");
        assert_eq!(config.convergence_limit, 5000);
        assert_eq!(config.algorithm, AlgorithmConfig::Annealing {
            step: StepFunction::Route,
            cooling: CoolingSchedule::Geometric { initial_temperature: 500.0, base: 0.999 },
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reject_bad_parameters() {
        let mut config: JobConfig = toml::from_str(r#"
            stations = "s.csv"
            connections = "c.csv"
            max_routes = 7
            max_duration = 0.0
            [algorithm]
            kind = "mutation_hill_climber"
            escalation = 2
        "#).unwrap();
        assert!(matches!(config.validate(), Err(NetworkError::InvalidParameter(_))));
        config.max_duration = 180.0;
        assert!(config.validate().is_ok());
        config.algorithm = AlgorithmConfig::MutationHillClimber { escalation: 4, replace_below: 0, policy: ReplacementPolicy::default() };
        assert!(config.validate().is_err());
    }
}
