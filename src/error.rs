//! Errors raised by the network data model and its loaders

use crate::network::RouteId;

#[derive(thiserror::Error, Debug)]
pub enum NetworkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error("network has no connections, coverage is undefined")]
    NoConnections,
    #[error("unknown station {0}")]
    UnknownStation(String),
    #[error("unknown route id {0}")]
    UnknownRoute(RouteId),
    #[error("cannot pop a station from empty route {0}")]
    EmptyRoute(RouteId),
    #[error("index {index} out of bounds for route {route} with {len} stations")]
    IndexOutOfBounds { route: RouteId, index: usize, len: usize },
    #[error("malformed solution row: {0}")]
    MalformedSolution(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
