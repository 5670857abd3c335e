//! An undirected, timed rail connection between two stations

use std::collections::BTreeSet;

use super::{ConnectionId, RouteId, StationId};

#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    id: ConnectionId,
    stations: (StationId, StationId),
    duration: f64,
    routes: BTreeSet<RouteId>,
}
impl Connection {
    pub fn new(id: ConnectionId, a: StationId, b: StationId, duration: f64) -> Self {
        Self { id, stations: (a, b), duration, routes: BTreeSet::new() }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The two endpoints, in load order
    pub fn stations(&self) -> (StationId, StationId) {
        self.stations
    }

    /// The endpoint opposite `station`, or `None` if `station` is not an endpoint
    #[allow(unused)]
    pub fn other(&self, station: StationId) -> Option<StationId> {
        match self.stations {
            (a, b) if a == station => Some(b),
            (a, b) if b == station => Some(a),
            _ => None,
        }
    }

    pub fn add_route(&mut self, route: RouteId) {
        self.routes.insert(route);
    }

    pub fn remove_route(&mut self, route: RouteId) {
        self.routes.remove(&route);
    }

    #[allow(unused)]
    pub fn routes(&self) -> &BTreeSet<RouteId> {
        &self.routes
    }

    /// A connection is "in use" while at least one route rides it
    pub fn is_connected(&self) -> bool {
        !self.routes.is_empty()
    }
}
