//! The rail network: stations and connections loaded once, plus the set of
//! routes a solver is currently optimising.
//!
//! Stations and connections live in arenas owned by a [`Graph`] and refer to each
//! other by index, so cloning a [`Network`] gives an independent copy that a solver
//! can mutate without touching the original.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

pub mod connection;
pub mod route;
pub mod station;

pub use connection::Connection;
pub use route::{MoveFilter, Route, RouteEnd};
pub use station::Station;

pub type StationId = usize;
pub type ConnectionId = usize;
pub type RouteId = usize;

/// Weight of full coverage in the score
const COVERAGE_WEIGHT: f64 = 10000.0;
/// Penalty per route in the score
const ROUTE_PENALTY: f64 = 100.0;

/// A station row as read from the stations file
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub station: String,
    pub x: f64,
    pub y: f64,
}

/// A connection row as read from the connections file
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ConnectionRecord {
    pub station1: String,
    pub station2: String,
    pub distance: f64,
}

/// Which optional fields [`Graph::list_stations`] fills in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeighbourInfo {
    pub connection_count: bool,
    pub unused_count: bool,
    pub unvisited_count: bool,
}
impl NeighbourInfo {
    #[allow(unused)]
    pub fn all() -> Self {
        Self { connection_count: true, unused_count: true, unvisited_count: true }
    }
}

/// A station adjacent to another, seen from that other station
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    pub station: StationId,
    pub connection: ConnectionId,
    pub duration: f64,
    /// How many connections the neighbour has
    pub connection_count: Option<usize>,
    /// How many of the neighbour's connections no route rides
    pub unused_count: Option<usize>,
    /// How many of the neighbour's own neighbours no route visits
    pub unvisited_count: Option<usize>,
}

/// The static part of the network, with the route registrations it carries
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    stations: Vec<Station>,
    names: HashMap<String, StationId>,
    connections: Vec<Connection>,
}
impl Graph {
    pub fn station(&self, id: StationId) -> &Station {
        &self.stations[id]
    }

    pub fn connection(&self, id: ConnectionId) -> &Connection {
        &self.connections[id]
    }

    #[allow(unused)]
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    #[allow(unused)]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn station_id(&self, name: &str) -> Result<StationId, NetworkError> {
        self.names.get(name).copied().ok_or_else(|| NetworkError::UnknownStation(name.to_string()))
    }

    /// Neighbours of `station`, enriched with the fields selected in `info`
    pub fn list_stations(&self, station: StationId, info: NeighbourInfo) -> Vec<Neighbour> {
        self.stations[station].connections().map(|(neighbour, connection)| {
            let other = &self.stations[neighbour];
            Neighbour {
                station: neighbour,
                connection,
                duration: self.connections[connection].duration(),
                connection_count: info.connection_count.then(|| other.connection_amount()),
                unused_count: info.unused_count.then(|| {
                    other.connections().filter(|&(_, c)| !self.connections[c].is_connected()).count()
                }),
                unvisited_count: info.unvisited_count.then(|| {
                    other.connections().filter(|&(s, _)| !self.stations[s].is_connected()).count()
                }),
            }
        }).collect()
    }

    /// The coordinates of both endpoints of a connection
    #[allow(unused)]
    pub fn connection_points(&self, connection: ConnectionId) -> ((f64, f64), (f64, f64)) {
        let (a, b) = self.connections[connection].stations();
        (self.stations[a].position(), self.stations[b].position())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    graph: Graph,
    routes: BTreeMap<RouteId, Route>,
    next_route_id: RouteId,
}
impl Network {
    /// Build a network from station and connection records.
    ///
    /// Connections naming an unknown station are skipped. A network without any
    /// connection cannot be scored and is rejected.
    pub fn new(stations: Vec<StationRecord>, connections: Vec<ConnectionRecord>) -> Result<Self, NetworkError> {
        let mut graph = Graph { stations: vec![], names: HashMap::new(), connections: vec![] };
        for record in stations {
            if graph.names.contains_key(&record.station) {
                log::warn!("skipping duplicate station {}", record.station);
                continue;
            }
            graph.names.insert(record.station.clone(), graph.stations.len());
            graph.stations.push(Station::new(record.station, record.x, record.y));
        }

        for record in connections {
            let (Some(&a), Some(&b)) = (graph.names.get(&record.station1), graph.names.get(&record.station2)) else {
                log::warn!("skipping connection {} - {}: unknown station", record.station1, record.station2);
                continue;
            };
            if !(record.distance >= 0.0) {
                return Err(NetworkError::InvalidParameter(format!(
                    "connection {} - {} has negative duration {}", record.station1, record.station2, record.distance
                )));
            }
            let id = graph.connections.len();
            graph.connections.push(Connection::new(id, a, b, record.distance));
            graph.stations[a].add_connection(b, id);
            graph.stations[b].add_connection(a, id);
        }

        if graph.connections.is_empty() {
            return Err(NetworkError::NoConnections);
        }
        log::debug!("loaded network with {} stations and {} connections", graph.stations.len(), graph.connections.len());
        Ok(Self { graph, routes: BTreeMap::new(), next_route_id: 0 })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn station(&self, id: StationId) -> &Station {
        self.graph.station(id)
    }

    pub fn connection(&self, id: ConnectionId) -> &Connection {
        self.graph.connection(id)
    }

    pub fn station_id(&self, name: &str) -> Result<StationId, NetworkError> {
        self.graph.station_id(name)
    }

    pub fn station_count(&self) -> usize {
        self.graph.stations.len()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.connections.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// All station ids, in load order
    pub fn list_stations(&self) -> std::ops::Range<StationId> {
        0..self.graph.stations.len()
    }

    /// All routes, ordered by id
    pub fn list_routes(&self) -> impl Iterator<Item = &Route> + '_ {
        self.routes.values()
    }

    pub fn route_ids(&self) -> Vec<RouteId> {
        self.routes.keys().copied().collect()
    }

    pub fn route(&self, id: RouteId) -> Result<&Route, NetworkError> {
        self.routes.get(&id).ok_or(NetworkError::UnknownRoute(id))
    }

    /// Splits the borrow so a route can be mutated against the graph it registers on
    fn route_parts(&mut self, id: RouteId) -> Result<(&mut Route, &mut Graph), NetworkError> {
        let route = self.routes.get_mut(&id).ok_or(NetworkError::UnknownRoute(id))?;
        Ok((route, &mut self.graph))
    }

    /// Start a new route at `station`, returning its id. Ids are never reused.
    pub fn create_route(&mut self, station: StationId) -> RouteId {
        let id = self.next_route_id;
        self.next_route_id += 1;
        let route = Route::new(id, station, &mut self.graph);
        self.routes.insert(id, route);
        id
    }

    /// Rebuild a route with a known id, as stored in a saved solution
    pub fn restore_route(&mut self, id: RouteId, stations: &[StationId]) -> Result<RouteId, NetworkError> {
        let (&root, rest) = stations.split_first()
            .ok_or_else(|| NetworkError::MalformedSolution(format!("route {id} has no stations")))?;
        if self.routes.contains_key(&id) {
            return Err(NetworkError::MalformedSolution(format!("route {id} appears twice")));
        }
        let mut route = Route::new(id, root, &mut self.graph);
        for &station in rest {
            route.append_station(&mut self.graph, station)?;
        }
        self.routes.insert(id, route);
        self.next_route_id = self.next_route_id.max(id + 1);
        Ok(id)
    }

    /// Empty a route and remove it from the network
    pub fn del_route(&mut self, id: RouteId) -> Result<(), NetworkError> {
        let (route, graph) = self.route_parts(id)?;
        route.empty(graph);
        self.routes.remove(&id);
        Ok(())
    }

    #[allow(unused)]
    pub fn insert_station(&mut self, route: RouteId, index: usize, station: StationId) -> Result<(), NetworkError> {
        let (route, graph) = self.route_parts(route)?;
        route.insert_station(graph, index, station)
    }

    pub fn append_station(&mut self, route: RouteId, station: StationId) -> Result<(), NetworkError> {
        let (route, graph) = self.route_parts(route)?;
        route.append_station(graph, station)
    }

    pub fn extend_route(&mut self, route: RouteId, end: RouteEnd, station: StationId) -> Result<(), NetworkError> {
        let (route, graph) = self.route_parts(route)?;
        route.extend(graph, end, station)
    }

    /// Remove the station at `index`, or the tail when `None`
    pub fn pop_station(&mut self, route: RouteId, index: Option<usize>) -> Result<StationId, NetworkError> {
        let (route, graph) = self.route_parts(route)?;
        route.pop_station(graph, index)
    }

    /// Remove every station from a route, keeping the (now empty) route in the network
    pub fn empty_route(&mut self, route: RouteId) -> Result<(), NetworkError> {
        let (route, graph) = self.route_parts(route)?;
        route.empty(graph);
        Ok(())
    }

    #[allow(unused)]
    pub fn route_duration(&self, route: RouteId) -> Result<f64, NetworkError> {
        Ok(self.route(route)?.duration(&self.graph))
    }

    pub fn route_score(&self, route: RouteId) -> Result<f64, NetworkError> {
        Ok(self.route(route)?.route_score(&self.graph, self.connection_count()))
    }

    /// Summed duration of all routes
    pub fn total_duration(&self) -> f64 {
        self.routes.values().map(|r| r.duration(&self.graph)).sum()
    }

    pub fn used_connections(&self) -> usize {
        self.graph.connections.iter().filter(|c| c.is_connected()).count()
    }

    /// Connections no route rides
    pub fn unused_connections(&self) -> Vec<ConnectionId> {
        self.graph.connections.iter().filter(|c| !c.is_connected()).map(Connection::id).collect()
    }

    /// Fraction of connections ridden by at least one route
    pub fn connection_coverage(&self) -> f64 {
        self.used_connections() as f64 / self.connection_count() as f64
    }

    /// The objective every solver maximises
    pub fn score(&self) -> f64 {
        self.connection_coverage() * COVERAGE_WEIGHT
            - (self.route_count() as f64 * ROUTE_PENALTY + self.total_duration())
    }

    /// True if every route is valid under `t_max`
    pub fn check_valid_solution(&self, t_max: f64) -> bool {
        self.routes.values().all(|r| r.is_valid(&self.graph, t_max))
    }

    /// True if another route may be added or any route can still grow
    pub fn has_legal_moves(&self, t_max: f64, max_routes: usize) -> bool {
        self.route_count() < max_routes
            || self.routes.values().any(|r| r.has_legal_moves(&self.graph, t_max))
    }

    /// The longest single connection
    pub fn longest_duration(&self) -> f64 {
        self.graph.connections.iter().map(Connection::duration).fold(0.0, f64::max)
    }

    fn summed_connection_duration(&self) -> f64 {
        self.graph.connections.iter().map(Connection::duration).sum()
    }

    /// Lower bound on the number of routes needed to ride every connection once
    pub fn minimum_routes(&self, max_duration: f64) -> usize {
        (self.summed_connection_duration() / max_duration).ceil() as usize
    }

    /// An upper bound on the score, used to put solver output in perspective
    pub fn theoretical_max_score(&self, max_duration: f64) -> f64 {
        COVERAGE_WEIGHT
            - (ROUTE_PENALTY * self.minimum_routes(max_duration) as f64 + self.summed_connection_duration())
    }

    /// Name and position of every station, for visualisers
    #[allow(unused)]
    pub fn station_points(&self) -> Vec<(&str, (f64, f64))> {
        self.graph.stations.iter().map(|s| (s.name(), s.position())).collect()
    }

    /// Endpoint coordinates of every connection, for visualisers
    #[allow(unused)]
    pub fn connection_points(&self) -> Vec<((f64, f64), (f64, f64))> {
        (0..self.connection_count()).map(|c| self.graph.connection_points(c)).collect()
    }

    /// Station names of a route in travel order
    pub fn route_names(&self, route: RouteId) -> Result<Vec<&str>, NetworkError> {
        Ok(self.route(route)?.list_stations().iter().map(|&s| self.station(s).name()).collect())
    }
}
