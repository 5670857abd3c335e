//! Defines the step functions and acceptance rules for the annealing climber

use fastrand::Rng;
use serde::{Deserialize, Serialize};

use crate::{error::NetworkError, network::Network, random};

use super::{mutate_route, Metaheuristic, SearchParams};

/// Chance of the route step removing a route
const REMOVE_CHANCE: f64 = 0.125;
/// Chance of the route step adding a route, on top of `REMOVE_CHANCE`
const ADD_CHANCE: f64 = 0.125;

/// How the annealing climber moves from one network to a neighbouring one
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepFunction {
    /// Remove, add or replace a whole random route (12.5% / 12.5% / 75%)
    #[default]
    Route,
    /// Cut and regrow one end of a single random route
    Mutate,
}
impl StepFunction {
    /// Apply one step to `network` in place
    pub fn apply(&self, network: &mut Network, params: &SearchParams, rng: &mut Rng) -> Result<(), NetworkError> {
        match self {
            Self::Route => route_step(network, params, rng),
            Self::Mutate => {
                let routes = network.route_ids();
                if routes.is_empty() {
                    random::random_route(network, params.max_duration, rng)?;
                    return Ok(());
                }
                let route = routes[rng.usize(..routes.len())];
                mutate_route(network, route, 1, params.max_duration, rng)
            }
        }
    }
}

fn remove_random_route(network: &mut Network, rng: &mut Rng) -> Result<(), NetworkError> {
    let routes = network.route_ids();
    if routes.is_empty() {
        return Ok(());
    }
    network.del_route(routes[rng.usize(..routes.len())])
}

fn route_step(network: &mut Network, params: &SearchParams, rng: &mut Rng) -> Result<(), NetworkError> {
    let roll = rng.f64();
    let routes = network.route_count();

    if roll < REMOVE_CHANCE && routes > 1 {
        return remove_random_route(network, rng);
    }
    // Also add when removing was rolled but would leave the network empty
    if (roll < REMOVE_CHANCE + ADD_CHANCE && routes < params.max_routes) || routes == 0 {
        random::random_route(network, params.max_duration, rng)?;
        return Ok(());
    }
    remove_random_route(network, rng)?;
    random::random_route(network, params.max_duration, rng)?;
    Ok(())
}

/// How the temperature falls over the iterations of an annealing run
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "schedule", rename_all = "snake_case")]
pub enum CoolingSchedule {
    /// Never accept a worse network
    HillClimb,
    /// `constant / log10(1 + iteration)`
    Logarithmic { constant: f64 },
    /// `initial_temperature * base^iteration`
    Geometric { initial_temperature: f64, base: f64 },
    /// `initial_temperature - speed * iteration`
    Linear { initial_temperature: f64, speed: f64 },
}
impl CoolingSchedule {
    /// The temperature at `iteration`, or `None` if worse networks are never accepted
    pub fn temperature(&self, iteration: usize) -> Option<f64> {
        let i = iteration as f64;
        match *self {
            Self::HillClimb => None,
            Self::Logarithmic { constant } => Some(constant / (1.0 + i).log10()),
            Self::Geometric { initial_temperature, base } => Some(initial_temperature * base.powf(i)),
            Self::Linear { initial_temperature, speed } => Some(initial_temperature - speed * i),
        }
    }

    pub fn validate(&self) -> Result<(), NetworkError> {
        let valid = match *self {
            Self::HillClimb => true,
            Self::Logarithmic { constant } => constant > 0.0,
            Self::Geometric { initial_temperature, base } => initial_temperature > 0.0 && base > 0.0 && base < 1.0,
            Self::Linear { initial_temperature, speed } => initial_temperature > 0.0 && speed >= 0.0,
        };
        if valid {
            Ok(())
        } else {
            Err(NetworkError::InvalidParameter(format!("bad cooling schedule {self:?}")))
        }
    }
}

/// Accepts a drop in score with probability `exp(-drop / temperature)`.
/// A non-positive temperature rejects every drop.
pub fn annealing_probability(score_drop: f64, temperature: f64, rng: &mut Rng) -> bool {
    if temperature <= 0.0 {
        return false;
    }
    rng.f64() < (-score_drop / temperature).exp()
}

/// Plain hill climbing: worse networks are always rejected
#[derive(Debug, Clone, Copy, Default)]
pub struct HillClimb;
impl Metaheuristic for HillClimb {
    type Params = ();
    fn new(_params: Self::Params) -> Self {
        Self
    }
    fn accept_worse(&mut self, _score_drop: f64, _iteration: usize, _rng: &mut Rng) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct SimAnneal {
    schedule: CoolingSchedule,
}
impl Metaheuristic for SimAnneal {
    type Params = CoolingSchedule;
    fn new(params: Self::Params) -> Self {
        Self { schedule: params }
    }
    fn accept_worse(&mut self, score_drop: f64, iteration: usize, rng: &mut Rng) -> bool {
        match self.schedule.temperature(iteration) {
            Some(temperature) => annealing_probability(score_drop, temperature, rng),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{localsearch::{ScoreIteration, Solver}, test::square_network};

    fn params() -> SearchParams {
        SearchParams {
            max_routes: 3,
            max_duration: 25.0,
            convergence_limit: 200,
            random_iterations: 0,
            record_all: false,
            export_improvements: None,
        }
    }

    #[test]
    fn test_cooling_schedules() {
        let log = CoolingSchedule::Logarithmic { constant: 10.0 };
        assert!((log.temperature(9).unwrap() - 10.0).abs() < 1e-9);
        let geo = CoolingSchedule::Geometric { initial_temperature: 100.0, base: 0.5 };
        assert_eq!(geo.temperature(2), Some(25.0));
        let lin = CoolingSchedule::Linear { initial_temperature: 100.0, speed: 10.0 };
        assert_eq!(lin.temperature(3), Some(70.0));
        assert_eq!(lin.temperature(20), Some(-100.0));
        assert_eq!(CoolingSchedule::HillClimb.temperature(1), None);
    }

    #[test]
    fn test_non_positive_temperature_rejects() {
        let mut rng = Rng::with_seed(1);
        let mut anneal = SimAnneal::new(CoolingSchedule::Linear { initial_temperature: 10.0, speed: 1.0 });
        assert!((0..100).all(|_| !anneal.accept_worse(0.001, 10, &mut rng)));
        assert!((0..100).all(|_| !anneal.accept_worse(0.001, 50, &mut rng)));
        assert!((0..100).all(|_| !annealing_probability(1.0, 0.0, &mut rng)));
    }

    #[test]
    fn test_hot_temperature_accepts_small_drops() {
        let mut rng = Rng::with_seed(1);
        let accepted = (0..1000).filter(|_| annealing_probability(1.0, 1e6, &mut rng)).count();
        assert!(accepted > 990);
        let accepted = (0..1000).filter(|_| annealing_probability(1e6, 1.0, &mut rng)).count();
        assert_eq!(accepted, 0);
    }

    #[test]
    fn test_route_step_respects_max_routes() {
        let mut network = square_network();
        let mut rng = Rng::with_seed(3);
        let params = params();
        for _ in 0..200 {
            StepFunction::Route.apply(&mut network, &params, &mut rng).unwrap();
            assert!(network.route_count() >= 1);
            assert!(network.route_count() <= params.max_routes);
        }
        assert!(network.check_valid_solution(params.max_duration));
    }

    #[test]
    fn test_annealing_tracks_best() {
        let network = square_network();
        let mut rng = Rng::with_seed(9);
        let solver = Solver::<SimAnneal> {
            network: &network,
            params: params(),
            step: StepFunction::Route,
            mh_params: CoolingSchedule::Geometric { initial_temperature: 500.0, base: 0.99 },
        };
        let outcome = solver.solve(&mut rng).unwrap();
        let best = outcome.scores.iter().find(|s| s.iteration == ScoreIteration::Best).unwrap();
        assert_eq!(best.score, outcome.best.score());
        assert!(outcome.scores.iter()
            .filter(|s| matches!(s.iteration, ScoreIteration::Iteration(_)))
            .all(|s| s.score <= best.score));
        let max = outcome.scores.last().unwrap();
        assert_eq!(max.iteration, ScoreIteration::TheoreticalMax);
        assert_eq!(max.score, network.theoretical_max_score(25.0));
    }

    #[test]
    fn test_hill_climb_solver_is_monotonic() {
        let network = square_network();
        let mut rng = Rng::with_seed(4);
        let solver = Solver::<HillClimb> { network: &network, params: params(), step: StepFunction::Mutate, mh_params: () };
        let outcome = solver.solve(&mut rng).unwrap();
        let accepted = outcome.scores.iter()
            .filter(|s| matches!(s.iteration, ScoreIteration::Iteration(_)))
            .collect::<Vec<_>>();
        // equal scores are accepted sideways, but never a lower one
        assert!(accepted.windows(2).all(|w| w[1].score >= w[0].score));
    }
}
