//! Random construction of routes and whole solutions.
//!
//! These are used both as a baseline for comparison with the local search
//! drivers, and to build the solution those drivers start from.

use fastrand::Rng;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::{
    error::NetworkError,
    localsearch::{finish_scores, pick_move, ScoreRecord, SearchOutcome, SearchParams},
    network::{MoveFilter, Network, RouteId},
};

/// Attempts at building a route that scores above zero before giving up
const MAX_ROUTE_ATTEMPTS: usize = 10_000;

/// Adds a random route to the network.
///
/// The route starts at a random station and grows from random open ends until it
/// reaches a random target duration between the longest connection and
/// `max_duration`. Routes that score zero or less on their own are rebuilt from
/// scratch. Returns `None`, leaving the network unchanged, if no acceptable route
/// turns up.
pub fn random_route(network: &mut Network, max_duration: f64, rng: &mut Rng) -> Result<Option<RouteId>, NetworkError> {
    let longest = network.longest_duration();
    let route = network.create_route(rng.usize(network.list_stations()));

    for attempt in 0..MAX_ROUTE_ATTEMPTS {
        if attempt > 0 {
            network.empty_route(route)?;
            network.append_station(route, rng.usize(network.list_stations()))?;
        }
        let target = if max_duration > longest {
            longest + rng.f64() * (max_duration - longest)
        } else {
            max_duration
        };

        loop {
            let moves = network.route(route)?.legal_moves(network.graph(), target, MoveFilter::default());
            let Some((end, station)) = pick_move(&moves, rng) else {
                break;
            };
            network.extend_route(route, end, station)?;
        }

        if network.route_score(route)? > 0.0 {
            return Ok(Some(route));
        }
    }

    log::warn!("no route scoring above zero after {MAX_ROUTE_ATTEMPTS} attempts, max duration {max_duration}");
    network.del_route(route)?;
    Ok(None)
}

/// Adds between `min_routes` and `max_routes` random routes to the network.
///
/// Routes the network already holds count towards `max_routes`. Construction stops
/// early once the network is saturated.
pub fn random_algorithm(network: &mut Network, min_routes: usize, max_routes: usize, max_duration: f64, rng: &mut Rng) -> Result<(), NetworkError> {
    let routes = rng.usize(min_routes.min(max_routes)..=max_routes);
    for _ in 0..routes {
        if !network.has_legal_moves(max_duration, max_routes) {
            log::trace!("no legal moves left with {} routes", network.route_count());
            break;
        }
        if network.route_count() >= max_routes {
            break;
        }
        random_route(network, max_duration, rng)?;
    }
    Ok(())
}

/// The best of `iterations` independent random solutions, each holding at
/// least [`Network::minimum_routes`] routes where `max_routes` allows.
///
/// Trials run in parallel on their own copies of `network`. Each trial is seeded
/// from `rng` up front, so a seeded run gives the same result on any thread count.
/// Returns a copy of `network` if no trial scores above zero.
pub fn random_solution(network: &Network, max_routes: usize, max_duration: f64, iterations: usize, rng: &mut Rng) -> Result<Network, NetworkError> {
    let min_routes = network.minimum_routes(max_duration).max(1);
    let seeds = (0..iterations).map(|_| rng.u64(..)).collect::<Vec<_>>();

    let best = seeds.into_par_iter()
        .map(|seed| {
            let mut rng = Rng::with_seed(seed);
            let mut work = network.clone();
            random_algorithm(&mut work, min_routes, max_routes, max_duration, &mut rng)?;
            Ok::<_, NetworkError>((OrderedFloat(work.score()), work))
        })
        .try_reduce_with(|a, b| Ok(if b.0 > a.0 { b } else { a }))
        .transpose()?;

    Ok(match best {
        Some((score, work)) if score.0 > 0.0 => work,
        _ => network.clone(),
    })
}

/// Keeps generating random solutions until no better one turns up for
/// `convergence_limit` iterations
pub fn random_search(network: &Network, params: &SearchParams, rng: &mut Rng) -> Result<SearchOutcome, NetworkError> {
    let mut best = network.clone();
    let mut best_score = 0.0;
    let mut scores = vec![];

    let mut iteration = 1;
    let mut convergence = 0;
    while convergence < params.convergence_limit {
        if iteration % 1000 == 0 {
            log::debug!("iteration {iteration}, best score {best_score}");
        }
        let mut work = network.clone();
        random_algorithm(&mut work, 1, params.max_routes, params.max_duration, rng)?;
        let score = work.score();
        if score > best_score {
            log::info!("new best found at iteration {iteration}: {score}");
            best_score = score;
            scores.push(ScoreRecord::new(iteration, score));
            if let Some(target) = &params.export_improvements {
                target.export(&work, iteration)?;
            }
            best = work;
            convergence = 0;
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
