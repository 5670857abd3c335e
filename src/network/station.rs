//! A station node in the rail network

use std::collections::{BTreeMap, BTreeSet};

use super::{ConnectionId, RouteId, StationId};

/// A station, identified by its unique name.
///
/// Neighbours are keyed by their interned `StationId`; the map is fixed once the
/// network is loaded. The set of routes visiting the station changes during search.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    name: String,
    /// Only used by visualisers
    position: (f64, f64),
    connections: BTreeMap<StationId, ConnectionId>,
    routes: BTreeSet<RouteId>,
}
impl Station {
    pub fn new(name: impl Into<String>, x: f64, y: f64) -> Self {
        Self { name: name.into(), position: (x, y), connections: BTreeMap::new(), routes: BTreeSet::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[allow(unused)]
    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    /// Registers a connection under a neighbour. A second registration
    /// for the same neighbour overwrites the first.
    pub fn add_connection(&mut self, neighbour: StationId, connection: ConnectionId) {
        self.connections.insert(neighbour, connection);
    }

    #[allow(unused)]
    pub fn has_connection(&self, neighbour: StationId) -> bool {
        self.connections.contains_key(&neighbour)
    }

    /// The connection joining this station to `neighbour`, if any
    pub fn connection(&self, neighbour: StationId) -> Option<ConnectionId> {
        self.connections.get(&neighbour).copied()
    }

    /// Neighbours with the connection leading to each, ordered by station id
    pub fn connections(&self) -> impl Iterator<Item = (StationId, ConnectionId)> + '_ {
        self.connections.iter().map(|(&s, &c)| (s, c))
    }

    pub fn connection_amount(&self) -> usize {
        self.connections.len()
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

    /// True if any route visits this station
    pub fn is_connected(&self) -> bool {
        !self.routes.is_empty()
    }
}
