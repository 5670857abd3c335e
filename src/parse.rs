//! Reads networks and saved solutions from CSV files, and writes solutions
//! and score histories back out.
//!
//! A solution file has a `train,stations` header, one row per route holding its id
//! and a bracketed station list, a `score` row and a `connections missing` row. The
//! missing connections are written as `name1:name2` pairs so they do not collide
//! with the CSV separator.

use std::{fs::{self, File}, io::{Read, Write}, path::{Path, PathBuf}};

use itertools::Itertools;

use crate::{
    error::NetworkError,
    localsearch::ScoreRecord,
    network::{ConnectionRecord, Network, StationRecord},
};

const SCORE_ROW: &str = "score";
const MISSING_ROW: &str = "connections missing";

/// Reads station rows with `station`, `x` and `y` columns, in any order
pub fn parse_stations(reader: impl Read) -> Result<Vec<StationRecord>, NetworkError> {
    csv::Reader::from_reader(reader)
        .deserialize()
        .map(|r| r.map_err(NetworkError::from))
        .collect()
}

/// Reads connection rows with `station1`, `station2` and `distance` columns
pub fn parse_connections(reader: impl Read) -> Result<Vec<ConnectionRecord>, NetworkError> {
    csv::Reader::from_reader(reader)
        .deserialize()
        .map(|r| r.map_err(NetworkError::from))
        .collect()
}

/// Loads a network from a stations file and a connections file
pub fn load_network(stations: impl AsRef<Path>, connections: impl AsRef<Path>) -> Result<Network, NetworkError> {
    let stations = parse_stations(File::open(stations)?)?;
    let connections = parse_connections(File::open(connections)?)?;
    Network::new(stations, connections)
}

/// Writes the routes of a network in solution format
pub fn write_solution(network: &Network, writer: impl Write) -> Result<(), NetworkError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(["train", "stations"])?;
    for route in network.list_routes() {
        let names = network.route_names(route.id())?;
        writer.write_record([route.id().to_string(), format!("[{}]", names.join(", "))])?;
    }
    writer.write_record([SCORE_ROW.to_string(), network.score().to_string()])?;
    let missing = network.unused_connections().into_iter().map(|c| {
        let (a, b) = network.connection(c).stations();
        format!("[{}:{}]", network.station(a).name(), network.station(b).name())
    }).join(", ");
    writer.write_record([MISSING_ROW.to_string(), format!("[{missing}]")])?;
    writer.flush()?;
    Ok(())
}

/// Rebuilds the routes of a saved solution on top of `base`, a network
/// loaded from the same stations and connections. Routes already in `base`
/// are discarded.
pub fn read_solution(base: &Network, reader: impl Read) -> Result<Network, NetworkError> {
    let mut network = base.clone();
    for id in network.route_ids() {
        network.del_route(id)?;
    }

    for record in csv::Reader::from_reader(reader).records() {
        let record = record?;
        let (Some(id), Some(stations)) = (record.get(0), record.get(1)) else {
            return Err(NetworkError::MalformedSolution(format!("{record:?}")));
        };
        if id == SCORE_ROW || id == MISSING_ROW {
            break;
        }
        let id = id.trim().parse()
            .map_err(|_| NetworkError::MalformedSolution(format!("bad route id {id}")))?;
        let stations = stations.trim()
            .strip_prefix('[').and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| NetworkError::MalformedSolution(format!("bad station list {stations}")))?
            .split(", ")
            .filter(|s| !s.is_empty())
            .map(|name| network.station_id(name.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        network.restore_route(id, &stations)?;
    }
    Ok(network)
}

/// Reads a solution file on top of `base`
pub fn load_solution(base: &Network, path: impl AsRef<Path>) -> Result<Network, NetworkError> {
    read_solution(base, File::open(path)?)
}

/// Writes a score history, one `iteration,score` row per record
pub fn write_scores(scores: &[ScoreRecord], writer: impl Write) -> Result<(), NetworkError> {
    let mut writer = csv::Writer::from_writer(writer);
    for score in scores {
        writer.serialize(score)?;
    }
    writer.flush()?;
    Ok(())
}

/// Saves a solution as `<folder>/<run_id>-<name>.csv`
pub fn save_solution(network: &Network, folder: impl AsRef<Path>, run_id: &str, name: &str) -> Result<PathBuf, NetworkError> {
    let path = output_path(folder.as_ref(), &format!("{run_id}-{name}.csv"))?;
    write_solution(network, File::create(&path)?)?;
    log::info!("saved solution to {}", path.display());
    Ok(path)
}

/// Saves a score history as `<folder>/<run_id>-summary-<name>.csv`
pub fn save_scores(scores: &[ScoreRecord], folder: impl AsRef<Path>, run_id: &str, name: &str) -> Result<PathBuf, NetworkError> {
    let path = output_path(folder.as_ref(), &format!("{run_id}-summary-{name}.csv"))?;
    write_scores(scores, File::create(&path)?)?;
    log::info!("saved score summary to {}", path.display());
    Ok(path)
}

fn output_path(folder: &Path, file_name: &str) -> Result<PathBuf, NetworkError> {
    fs::create_dir_all(folder)?;
    Ok(folder.join(file_name))
}
