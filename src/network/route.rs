//! A single train route: an ordered list of stations backed by connections.
//!
//! A route keeps two parallel lists. `stations[i]` and `stations[i + 1]` are joined
//! by `connections[i]`, which is `None` when the two stations share no direct
//! connection. Such a slot is a *broken* connection; the route still exists but is
//! not a valid part of a solution until it is repaired.
//!
//! Every mutation keeps the route registrations on stations and connections in
//! sync with the lists, so mutations go through the owning [`Graph`].

use std::collections::BTreeMap;

use crate::error::NetworkError;

use super::{ConnectionId, Graph, Neighbour, NeighbourInfo, RouteId, StationId};

/// One of the two ends of a route, the only places a route may legally grow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RouteEnd {
    Head,
    Tail,
}

/// Restricts which neighbours count as legal moves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveFilter {
    /// Only offer connections no route rides yet
    pub only_unused: bool,
    /// Only offer stations no route visits yet
    pub only_unvisited: bool,
}

/// A pair of adjacent positions with no connection between them
#[allow(unused)]
pub type BrokenConnection = ((StationId, usize), (StationId, usize));

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    id: RouteId,
    stations: Vec<StationId>,
    connections: Vec<Option<ConnectionId>>,
}
impl Route {
    /// Create a route holding only `root`, registering it on the station
    pub(crate) fn new(id: RouteId, root: StationId, graph: &mut Graph) -> Self {
        graph.stations[root].add_route(id);
        Self { id, stations: vec![root], connections: vec![] }
    }

    pub fn id(&self) -> RouteId {
        self.id
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// The number of connection slots, broken ones included
    pub fn length(&self) -> usize {
        self.connections.len()
    }

    pub fn list_stations(&self) -> &[StationId] {
        &self.stations
    }

    /// Connection slots in travel order; `None` marks a broken slot
    pub fn connections(&self) -> &[Option<ConnectionId>] {
        &self.connections
    }


    /// Inserts `station` at the end of the route
    pub fn append_station(&mut self, graph: &mut Graph, station: StationId) -> Result<(), NetworkError> {
        self.insert_station(graph, self.stations.len(), station)
    }

    /// Grows the route at one of its ends
    pub fn extend(&mut self, graph: &mut Graph, end: RouteEnd, station: StationId) -> Result<(), NetworkError> {
        match end {
            RouteEnd::Head => self.insert_station(graph, 0, station),
            RouteEnd::Tail => self.append_station(graph, station),
        }
    }

    /// Inserts `station` so that it ends up at position `index`.
    ///
    /// `0` inserts at the head and `station_count()` at the tail. Inserting in the
    /// interior replaces the slot that joined the two old neighbours by two slots,
    /// resolved against the new adjacencies.
    pub fn insert_station(&mut self, graph: &mut Graph, index: usize, station: StationId) -> Result<(), NetworkError> {
        let len = self.stations.len();
        if index > len {
            return Err(NetworkError::IndexOutOfBounds { route: self.id, index, len });
        }
        self.stations.insert(index, station);
        graph.stations[station].add_route(self.id);

        if len == 0 {
            return Ok(());
        }

        if index == 0 {
            let connection = self.link(graph, station, self.stations[1]);
            self.connections.insert(0, connection);
        } else if index == len {
            let connection = self.link(graph, self.stations[index - 1], station);
            self.connections.push(connection);
        } else {
            let before = self.link(graph, self.stations[index - 1], station);
            let after = self.link(graph, station, self.stations[index + 1]);
            let stale = std::mem::replace(&mut self.connections[index - 1], before);
            self.connections.insert(index, after);
            self.release_connection(graph, stale);
        }
        Ok(())
    }

    /// Removes the station at `index` (the tail when `None`) and returns it.
    ///
    /// The slots on either side of the station are dropped. When an interior station
    /// is removed, its two old neighbours become adjacent through a broken slot, even
    /// if they share a connection. Inserting a station there repairs the route.
    pub fn pop_station(&mut self, graph: &mut Graph, index: Option<usize>) -> Result<StationId, NetworkError> {
        let len = self.stations.len();
        if len == 0 {
            return Err(NetworkError::EmptyRoute(self.id));
        }
        let index = index.unwrap_or(len - 1);
        if index >= len {
            return Err(NetworkError::IndexOutOfBounds { route: self.id, index, len });
        }

        let station = self.stations.remove(index);
        let mut removed = Vec::with_capacity(2);
        if len > 1 {
            if index == 0 {
                removed.push(self.connections.remove(0));
            } else if index == len - 1 {
                removed.extend(self.connections.pop());
            } else {
                // the gap stays broken until a station is inserted back
                removed.push(std::mem::replace(&mut self.connections[index - 1], None));
                removed.push(self.connections.remove(index));
            }
        }

        if !self.stations.contains(&station) {
            graph.stations[station].remove_route(self.id);
        }
        for connection in removed {
            self.release_connection(graph, connection);
        }
        Ok(station)
    }

    /// Looks up the connection between two stations, registering this route on it
    fn link(&self, graph: &mut Graph, a: StationId, b: StationId) -> Option<ConnectionId> {
        let connection = graph.stations[a].connection(b)?;
        graph.connections[connection].add_route(self.id);
        Some(connection)
    }

    /// Deregisters a connection that left the route, unless another slot still uses it
    fn release_connection(&self, graph: &mut Graph, connection: Option<ConnectionId>) {
        if let Some(connection) = connection {
            if !self.connections.contains(&Some(connection)) {
                graph.connections[connection].remove_route(self.id);
            }
        }
    }

    /// Total travel time. Broken slots add nothing.
    pub fn duration(&self, graph: &Graph) -> f64 {
        self.connections.iter().flatten().map(|&c| graph.connections[c].duration()).sum()
    }

    /// Every broken slot as the two positioned stations around it
    #[allow(unused)]
    pub fn broken_connections(&self) -> Vec<BrokenConnection> {
        self.connections.iter().enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| ((self.stations[i], i), (self.stations[i + 1], i + 1)))
            .collect()
    }

    pub fn is_broken(&self) -> bool {
        self.connections.iter().any(Option::is_none)
    }

    /// A route is valid if it rides at least one connection, has no broken slots
    /// and, when `t_max` is positive, stays strictly under it
    pub fn is_valid(&self, graph: &Graph, t_max: f64) -> bool {
        !self.connections.is_empty()
            && !self.is_broken()
            && (t_max <= 0.0 || self.duration(graph) < t_max)
    }

    /// The stations at the ends of the route with their positions.
    /// A single station route has one open station.
    pub fn open_stations(&self) -> Vec<(RouteEnd, StationId, usize)> {
        match self.stations.len() {
            0 => vec![],
            1 => vec![(RouteEnd::Tail, self.stations[0], 0)],
            n => vec![(RouteEnd::Head, self.stations[0], 0), (RouteEnd::Tail, self.stations[n - 1], n - 1)],
        }
    }

    /// Neighbours of the open ends that keep the route strictly under `t_max`.
    /// Ends without any candidate are left out, so the map may be empty.
    pub fn legal_moves(&self, graph: &Graph, t_max: f64, filter: MoveFilter) -> BTreeMap<RouteEnd, Vec<Neighbour>> {
        let remaining = t_max - self.duration(graph);
        let mut moves = BTreeMap::new();
        for (end, station, _) in self.open_stations() {
            let candidates = graph.list_stations(station, NeighbourInfo::default()).into_iter()
                .filter(|n| n.duration < remaining)
                .filter(|n| !filter.only_unused || !graph.connections[n.connection].is_connected())
                .filter(|n| !filter.only_unvisited || !graph.stations[n.station].is_connected())
                .collect::<Vec<_>>();
            if !candidates.is_empty() {
                moves.insert(end, candidates);
            }
        }
        moves
    }

    /// True if the route is under `t_max` and at least one open end can still grow
    pub fn has_legal_moves(&self, graph: &Graph, t_max: f64) -> bool {
        let remaining = t_max - self.duration(graph);
        remaining > 0.0 && self.open_stations().into_iter().any(|(_, station, _)| {
            graph.stations[station].connections().any(|(_, c)| graph.connections[c].duration() < remaining)
        })
    }

    /// The number of distinct connections the route rides
    pub fn unique_connection_count(&self) -> usize {
        let mut seen = self.connections.iter().flatten().collect::<Vec<_>>();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Quality of this route on its own, used to rank routes within a network.
    /// Broken slots are ignored rather than penalised.
    pub fn route_score(&self, graph: &Graph, total_connections: usize) -> f64 {
        self.unique_connection_count() as f64 / total_connections as f64 * 10000.0
            - (100.0 + self.duration(graph))
    }

    /// Coordinate pairs of the connections ridden, for visualisers
    #[allow(unused)]
    pub fn connection_points(&self, graph: &Graph) -> Vec<((f64, f64), (f64, f64))> {
        self.connections.iter().flatten().map(|&c| graph.connection_points(c)).collect()
    }

    /// Deregisters the route from every station and connection and clears it.
    /// Must run before the route is dropped from a network.
    pub fn empty(&mut self, graph: &mut Graph) {
        for &station in &self.stations {
            graph.stations[station].remove_route(self.id);
        }
        for &connection in self.connections.iter().flatten() {
            graph.connections[connection].remove_route(self.id);
        }
        self.stations.clear();
        self.connections.clear();
    }
}
