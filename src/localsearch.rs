//! Implements local search based algorithms for improving a set of train routes.
//!
//! Every driver follows the same loop: clone the current network, apply a random
//! step to the clone, score it and either keep the clone or throw it away. A rejected
//! step never touches the network it was cloned from.

use std::{collections::BTreeMap, path::PathBuf};

use fastrand::Rng;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize, Serializer};

use crate::{
    error::NetworkError,
    network::{MoveFilter, Neighbour, Network, RouteEnd, RouteId, StationId},
    parse, random,
};

pub mod metaheuristic;

use metaheuristic::StepFunction;

/// Which iteration a recorded score belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreIteration {
    Iteration(usize),
    /// The best score of the whole run
    Best,
    /// The upper bound from [`Network::theoretical_max_score`]
    TheoreticalMax,
}
impl Serialize for ScoreIteration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Iteration(i) => serializer.serialize_u64(*i as u64),
            Self::Best => serializer.serialize_str("Best"),
            Self::TheoreticalMax => serializer.serialize_str("Theoretical max"),
        }
    }
}

/// One point of a score history
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub iteration: ScoreIteration,
    pub score: f64,
}
impl ScoreRecord {
    pub fn new(iteration: usize, score: f64) -> Self {
        Self { iteration: ScoreIteration::Iteration(iteration), score }
    }
}

/// Where a driver writes improvements while it runs
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTarget {
    pub folder: PathBuf,
    pub run_id: String,
    pub run_name: String,
}
impl ExportTarget {
    pub(crate) fn export(&self, network: &Network, iteration: usize) -> Result<(), NetworkError> {
        parse::save_solution(network, &self.folder, &self.run_id, &format!("{}-{iteration}", self.run_name))?;
        Ok(())
    }
}

/// Parameters shared by every search driver
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// The most routes a solution may use
    pub max_routes: usize,
    /// Every route must stay strictly under this duration
    pub max_duration: f64,
    /// Iterations without improvement before the search stops
    pub convergence_limit: usize,
    /// Random solutions tried to find a starting point. `0` starts from the given network.
    pub random_iterations: usize,
    /// Record every tried score instead of only accepted ones
    pub record_all: bool,
    /// Export each new best solution here
    pub export_improvements: Option<ExportTarget>,
}

/// The result of a search: the best network found and how the score developed
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: Network,
    pub scores: Vec<ScoreRecord>,
}

/// Which route a replacement step throws away
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ReplacementPolicy {
    /// Replace routes with broken connections before looking at route scores
    pub prefer_broken: bool,
}
impl Default for ReplacementPolicy {
    fn default() -> Self {
        Self { prefer_broken: true }
    }
}

/// Defines a metaheuristic - the rule deciding whether
/// a worse neighbour is accepted anyway
pub trait Metaheuristic {
    type Params: Clone;

    /// Construct this metaheuristic from parameters
    fn new(params: Self::Params) -> Self;

    /// Decide whether a step that lowers the score by `score_drop` is accepted
    fn accept_worse(&mut self, score_drop: f64, iteration: usize, rng: &mut Rng) -> bool;
}

/// Parameters for the annealing climber.
/// Varying these will change the quality and speed
/// of the solution.
#[derive(Debug, Clone)]
pub struct Solver<'a, M: Metaheuristic> {
    /// The network to optimise
    pub network: &'a Network,
    pub params: SearchParams,
    /// How a neighbouring network is made
    pub step: StepFunction,
    /// Metaheuristic params to use for avoiding
    /// local optima
    pub mh_params: M::Params,
}
impl<'a, M: Metaheuristic> Solver<'a, M> {
    /// Run the search until the score stops improving.
    ///
    /// Tracks the best network ever seen separately from the current one, which
    /// the metaheuristic may move to a worse state.
    pub fn solve(&self, rng: &mut Rng) -> Result<SearchOutcome, NetworkError> {
        let params = &self.params;
        let mut best = starting_network(self.network, params, rng)?;
        let mut best_score = best.score();
        let mut current = best.clone();
        let mut current_score = best_score;
        let mut scores = vec![ScoreRecord::new(0, best_score)];

        let mut mh = M::new(self.mh_params.clone());
        let mut iteration = 1;
        let mut convergence = 0;
        while convergence < params.convergence_limit {
            if iteration % 1000 == 0 {
                log::debug!("iteration {iteration}, current score {current_score}");
            }
            let mut work = current.clone();
            self.step.apply(&mut work, params, rng)?;
            let score = work.score();

            if score > best_score {
                log::info!("new best found at iteration {iteration}: {score}");
                best_score = score;
                best = work.clone();
                if let Some(target) = &params.export_improvements {
                    target.export(&best, iteration)?;
                }
            }

            if score > current_score {
                current = work;
                current_score = score;
                convergence = 0;
                scores.push(ScoreRecord::new(iteration, score));
            } else {
                // sideways and accepted downhill moves do not count as progress
                convergence += 1;
                if score == current_score || mh.accept_worse(current_score - score, iteration, rng) {
                    current = work;
                    current_score = score;
                    scores.push(ScoreRecord::new(iteration, score));
                } else if params.record_all {
                    scores.push(ScoreRecord::new(iteration, score));
                }
            }
            iteration += 1;
        }

        scores.push(ScoreRecord::new(iteration, current_score));
        finish_scores(&mut scores, self.network, best_score, params.max_duration);
        log::info!("terminating after {iteration} iterations with best score {best_score}");
        Ok(SearchOutcome { best, scores })
    }
}

/// The network a driver starts from: the best of a batch of random solutions,
/// or a copy of `network` itself when no random trials are requested
pub(crate) fn starting_network(network: &Network, params: &SearchParams, rng: &mut Rng) -> Result<Network, NetworkError> {
    if params.random_iterations == 0 {
        return Ok(network.clone());
    }
    log::info!("generating random starting solution from {} trials", params.random_iterations);
    random::random_solution(network, params.max_routes, params.max_duration, params.random_iterations, rng)
}

/// Appends the `Best` and `Theoretical max` records closing a score history
pub(crate) fn finish_scores(scores: &mut Vec<ScoreRecord>, network: &Network, best_score: f64, max_duration: f64) {
    scores.push(ScoreRecord { iteration: ScoreIteration::Best, score: best_score });
    scores.push(ScoreRecord {
        iteration: ScoreIteration::TheoreticalMax,
        score: network.theoretical_max_score(max_duration),
    });
}

/// The route most worth replacing: a single station route if there is one,
/// then a broken route when the policy asks for it, otherwise the route with
/// the lowest route score
pub fn weakest_route(network: &Network, policy: ReplacementPolicy) -> Option<RouteId> {
    if let Some(route) = network.list_routes().find(|r| r.station_count() <= 1) {
        return Some(route.id());
    }
    if policy.prefer_broken {
        if let Some(route) = network.list_routes().find(|r| r.is_broken()) {
            return Some(route.id());
        }
    }
    let total = network.connection_count();
    network.list_routes()
        .min_by_key(|r| OrderedFloat(r.route_score(network.graph(), total)))
        .map(|r| r.id())
}

/// Grows a route by one random legal move. Returns false if the route cannot grow.
pub fn lengthen_route(network: &mut Network, route: RouteId, t_max: f64, rng: &mut Rng) -> Result<bool, NetworkError> {
    let moves = network.route(route)?.legal_moves(network.graph(), t_max, MoveFilter::default());
    let Some((end, station)) = pick_move(&moves, rng) else {
        return Ok(false);
    };
    network.extend_route(route, end, station)?;
    Ok(true)
}

/// A random open end and a random candidate station for it
pub(crate) fn pick_move(moves: &BTreeMap<RouteEnd, Vec<Neighbour>>, rng: &mut Rng) -> Option<(RouteEnd, StationId)> {
    if moves.is_empty() {
        return None;
    }
    let (&end, candidates) = moves.iter().nth(rng.usize(..moves.len()))?;
    let neighbour = candidates.get(rng.usize(..candidates.len().max(1)))?;
    Some((end, neighbour.station))
}

/// Shortens one end of a route by up to `depth` stations and regrows it with
/// `depth` random legal moves. With probability a third each the head is cut,
/// the tail is cut, or the route is only lengthened.
pub fn mutate_route(network: &mut Network, route: RouteId, depth: usize, t_max: f64, rng: &mut Rng) -> Result<(), NetworkError> {
    let roll = rng.f64();
    let cut = if roll < 1.0 / 3.0 {
        Some(RouteEnd::Tail)
    } else if roll < 2.0 / 3.0 {
        Some(RouteEnd::Head)
    } else {
        None
    };
    if let Some(end) = cut {
        for _ in 0..depth {
            if network.route(route)?.station_count() <= 1 {
                break;
            }
            let index = match end {
                RouteEnd::Head => Some(0),
                RouteEnd::Tail => None,
            };
            network.pop_station(route, index)?;
        }
    }
    for _ in 0..depth {
        if !lengthen_route(network, route, t_max, rng)? {
            break;
        }
    }
    Ok(())
}

/// Deletes the weakest route and generates a random route in its place
pub fn replace_weakest_route(network: &mut Network, params: &SearchParams, policy: ReplacementPolicy, rng: &mut Rng) -> Result<(), NetworkError> {
    if let Some(route) = weakest_route(network, policy) {
        log::trace!("replacing route {route}");
        network.del_route(route)?;
    }
    random::random_route(network, params.max_duration, rng)?;
    Ok(())
}

/// Shared accept-if-strictly-better loop of the hill climbers
fn climb(
    network: &Network,
    params: &SearchParams,
    rng: &mut Rng,
    mut step: impl FnMut(&mut Network, &mut Rng) -> Result<(), NetworkError>,
) -> Result<SearchOutcome, NetworkError> {
    let mut best = starting_network(network, params, rng)?;
    let mut best_score = best.score();
    let mut scores = vec![ScoreRecord::new(0, best_score)];

    let mut iteration = 1;
    let mut convergence = 0;
    while convergence < params.convergence_limit {
        if iteration % 1000 == 0 {
            log::debug!("iteration {iteration}, best score {best_score}");
        }
        let mut work = best.clone();
        step(&mut work, rng)?;
        let score = work.score();
        if score > best_score {
            log::info!("new best found at iteration {iteration}: {score}");
            best = work;
            best_score = score;
            convergence = 0;
            scores.push(ScoreRecord::new(iteration, score));
            if let Some(target) = &params.export_improvements {
                target.export(&best, iteration)?;
            }
        } else {
            convergence += 1;
            if params.record_all {
                scores.push(ScoreRecord::new(iteration, score));
            }
        }
        iteration += 1;
    }

    finish_scores(&mut scores, network, best_score, params.max_duration);
    log::info!("terminating after {iteration} iterations with best score {best_score}");
    Ok(SearchOutcome { best, scores })
}

/// Hill climber that keeps replacing the weakest route with a random one
pub fn route_hill_climber(network: &Network, params: &SearchParams, policy: ReplacementPolicy, rng: &mut Rng) -> Result<SearchOutcome, NetworkError> {
    climb(network, params, rng, |work, rng| replace_weakest_route(work, params, policy, rng))
}

/// Hill climber that mutates the ends of every route each iteration.
///
/// `escalation` is how many stations are cut and regrown per mutation. While the
/// network has fewer than `replace_below` routes, the weakest route is replaced
/// instead, so the route count can grow back.
pub fn mutation_hill_climber(
    network: &Network,
    params: &SearchParams,
    escalation: usize,
    replace_below: usize,
    policy: ReplacementPolicy,
    rng: &mut Rng,
) -> Result<SearchOutcome, NetworkError> {
    climb(network, params, rng, |work, rng| {
        if work.route_count() < replace_below.min(params.max_routes) || work.route_count() == 0 {
            return replace_weakest_route(work, params, policy, rng);
        }
        for route in work.route_ids() {
            mutate_route(work, route, escalation, params.max_duration, rng)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::square_network;

    fn params() -> SearchParams {
        SearchParams {
            max_routes: 3,
            max_duration: 25.0,
            convergence_limit: 50,
            random_iterations: 0,
            record_all: false,
            export_improvements: None,
        }
    }

    #[test]
    fn test_weakest_route_prefers_single_station() {
        let mut network = square_network();
        let [a, b, c, _] = crate::test::ids(&network);
        let long = network.create_route(a);
        network.append_station(long, b).unwrap();
        network.append_station(long, c).unwrap();
        let single = network.create_route(c);
        assert_eq!(weakest_route(&network, ReplacementPolicy::default()), Some(single));
    }

    #[test]
    fn test_weakest_route_broken_policy() {
        let mut network = square_network();
        let [a, b, c, d] = crate::test::ids(&network);
        let good = network.create_route(a);
        network.append_station(good, b).unwrap();
        let broken = network.create_route(c);
        for station in [a, b, d] {
            network.append_station(broken, station).unwrap();
        }
        // C-A is missing, but the two connections ridden outscore `good`
        assert!(network.route_score(broken).unwrap() > network.route_score(good).unwrap());
        assert_eq!(weakest_route(&network, ReplacementPolicy { prefer_broken: true }), Some(broken));
        assert_eq!(weakest_route(&network, ReplacementPolicy { prefer_broken: false }), Some(good));
    }

    #[test]
    fn test_lengthen_respects_budget() {
        let mut network = square_network();
        let [a, ..] = crate::test::ids(&network);
        let route = network.create_route(a);
        let mut rng = Rng::with_seed(7);
        while lengthen_route(&mut network, route, 25.0, &mut rng).unwrap() {}
        assert_eq!(network.route_duration(route).unwrap(), 20.0);
        assert!(network.route(route).unwrap().is_valid(network.graph(), 25.0));
    }

    #[test]
    fn test_route_hill_climber_never_gets_worse() {
        let network = square_network();
        let mut rng = Rng::with_seed(11);
        let mut start = network.clone();
        random::random_route(&mut start, 25.0, &mut rng).unwrap();
        let outcome = route_hill_climber(&start, &params(), ReplacementPolicy::default(), &mut rng).unwrap();
        assert!(outcome.best.score() >= start.score());
        assert!(outcome.best.check_valid_solution(25.0));
        assert!(outcome.scores.windows(2).take_while(|w| matches!(w[1].iteration, ScoreIteration::Iteration(_)))
            .all(|w| w[1].score > w[0].score));
        assert_eq!(outcome.scores.last().unwrap().iteration, ScoreIteration::TheoreticalMax);
    }

    #[test]
    fn test_mutation_hill_climber_keeps_valid_routes() {
        let network = square_network();
        let mut rng = Rng::with_seed(5);
        let params = SearchParams { random_iterations: 20, ..params() };
        let outcome = mutation_hill_climber(&network, &params, 2, 1, ReplacementPolicy::default(), &mut rng).unwrap();
        assert!(outcome.best.score() > 0.0);
        assert!(outcome.best.route_count() <= params.max_routes);
        assert!(outcome.best.list_routes().all(|r| r.duration(outcome.best.graph()) < params.max_duration));
    }
}
