//! Loading of nanowire and circuit descriptions from JSON.
//!
//! A nanowire is described by its intersections, each listing its branches
//! in clock order as `[outer, inner]` slot names. The wire graph is derived
//! from the layout unless an explicit vertex list and adjacency matrix are
//! given.
//!
//! ```json
//! {
//!     "intersections": [
//!         { "branches": [["a", "b"], ["c", "d"], ["e", "f"], ["g", "h"]] }
//!     ]
//! }
//! ```
//!
//! A circuit lists the initial particle positions and the gate programs to
//! compile, with braid steps written as `"a,b,direction"`.

use std::path::Path;
use std::{fs, io};

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::circuit::Circuit;
use crate::gate::GateProgram;
use crate::graph::{AdjacencyMatrix, RouteError, WireGraph};
use crate::nanowire::Positions;
use crate::topology::{NanowireStructure, Topology, TopologyError};

/// Serialized description of a nanowire.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NanowireConfig {
    /// Branch layout and extra links.
    #[serde(flatten)]
    pub structure: NanowireStructure,
    /// Names of the graph vertices, in matrix order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertices: Option<Vec<SmolStr>>,
    /// Symmetric adjacency matrix over `vertices`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Vec<Vec<u32>>>,
}

impl NanowireConfig {
    /// Build the topology described by the configuration.
    pub fn topology(&self) -> Result<Topology, ConfigError> {
        match (&self.vertices, &self.matrix) {
            (Some(vertices), Some(matrix)) => {
                let matrix = AdjacencyMatrix::new(matrix.clone())?;
                let graph = WireGraph::new(vertices.iter().cloned(), matrix)?;
                Ok(Topology::new(&self.structure, graph)?)
            }
            (None, None) => Ok(Topology::from_structure(&self.structure)?),
            _ => Err(ConfigError::IncompleteGraph),
        }
    }
}

/// Serialized description of a circuit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Number of particles.
    pub particles: usize,
    /// Number of logical qubits.
    pub qubits: usize,
    /// Position of every particle, in particle order.
    pub initial_positions: Positions,
    /// Gate programs, in application order.
    pub gates: Vec<GateProgram>,
}

impl CircuitConfig {
    /// Check the particle count and build the circuit.
    pub fn circuit(self) -> Result<Circuit, ConfigError> {
        if self.initial_positions.len() != self.particles {
            return Err(ConfigError::ParticleCount {
                expected: self.particles,
                found: self.initial_positions.len(),
            });
        }
        Ok(Circuit::new(self.qubits, self.initial_positions, self.gates))
    }
}

/// Load a nanowire topology from a JSON file.
pub fn load_nanowire_file(path: impl AsRef<Path>) -> Result<Topology, ConfigError> {
    let file = fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    load_nanowire_reader(reader)
}

/// Load a nanowire topology from a JSON reader.
pub fn load_nanowire_reader(json: impl io::Read) -> Result<Topology, ConfigError> {
    let config: NanowireConfig = serde_json::from_reader(json)?;
    config.topology()
}

/// Load a nanowire topology from a JSON string.
pub fn load_nanowire_str(json: &str) -> Result<Topology, ConfigError> {
    let reader = json.as_bytes();
    load_nanowire_reader(reader)
}

/// Load a circuit from a JSON file.
pub fn load_circuit_file(path: impl AsRef<Path>) -> Result<Circuit, ConfigError> {
    let file = fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    load_circuit_reader(reader)
}

/// Load a circuit from a JSON reader.
pub fn load_circuit_reader(json: impl io::Read) -> Result<Circuit, ConfigError> {
    let config: CircuitConfig = serde_json::from_reader(json)?;
    config.circuit()
}

/// Load a circuit from a JSON string.
pub fn load_circuit_str(json: &str) -> Result<Circuit, ConfigError> {
    let reader = json.as_bytes();
    load_circuit_reader(reader)
}

/// Error loading a configuration file.
#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum ConfigError {
    /// The layout does not describe a valid nanowire.
    #[display("{_0}")]
    #[from]
    Topology(TopologyError),
    /// The explicit wire graph is invalid.
    #[display("{_0}")]
    #[from]
    Graph(RouteError),
    /// Only one of the vertex list and the adjacency matrix was given.
    #[display("Explicit wire graphs need both a vertex list and an adjacency matrix.")]
    IncompleteGraph,
    /// The circuit places a different number of particles than it declares.
    #[display("The circuit declares {expected} particles but places {found}.")]
    ParticleCount {
        /// Declared particle count.
        expected: usize,
        /// Number of initial positions.
        found: usize,
    },
    /// Invalid JSON.
    #[display("Invalid configuration JSON. {_0}")]
    #[from]
    InvalidJson(serde_json::Error),
    /// File not found.
    #[display("Unable to load configuration file. {_0}")]
    #[from]
    FileLoadError(io::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gate::{BraidStep, Direction, Gate};
    use cool_asserts::assert_matches;

    const SINGLE: &str = r#"{
        "intersections": [
            { "branches": [["a", "b"], ["c", "d"], ["e", "f"], ["g", "h"]] }
        ]
    }"#;

    #[test]
    fn derived_nanowire() {
        let topology = load_nanowire_str(SINGLE).unwrap();
        assert_eq!(topology.graph().vertices().len(), 9);
        assert_eq!(topology.gate_count(), 2);
        assert_eq!(topology.graph().route("a", "h").unwrap(), vec!["a", "b", "x1", "h"]);
    }

    #[test]
    fn explicit_graph() {
        let json = r#"{
            "intersections": [
                { "name": "j", "branches": [["a", "b"], ["c", "d"]] }
            ],
            "vertices": ["a", "b", "j", "c", "d"],
            "matrix": [
                [0, 1, 0, 0, 0],
                [1, 0, 1, 0, 0],
                [0, 1, 0, 1, 0],
                [0, 0, 1, 0, 1],
                [0, 0, 0, 1, 0]
            ]
        }"#;
        let topology = load_nanowire_str(json).unwrap();
        assert_eq!(topology.graph().steps("a", "d").unwrap(), 4);
        assert_eq!(topology.nanowire().intersections()[0].name, "j");
    }

    #[test]
    fn bad_nanowires() {
        assert_matches!(
            load_nanowire_str(r#"{ "intersections": [], "vertices": ["a"] }"#),
            Err(ConfigError::IncompleteGraph)
        );
        assert_matches!(
            load_nanowire_str(r#"{ "intersections": [{ "branches": [["a"]] }] }"#),
            Err(ConfigError::Topology(TopologyError::BranchSize { .. }))
        );
        assert_matches!(load_nanowire_str("{"), Err(ConfigError::InvalidJson(_)));
        assert_matches!(
            load_nanowire_file("/nonexistent/nanowire.json"),
            Err(ConfigError::FileLoadError(_))
        );
    }

    #[test]
    fn circuit() {
        let json = r#"{
            "particles": 2,
            "qubits": 1,
            "initial_positions": ["a", "b"],
            "gates": [
                {
                    "gate": "pauli-x",
                    "braid_sequence": ["1,2,0", { "pair": [1, 2], "direction": "reversed" }],
                    "branch_config": "single opposite",
                    "groups": 2
                }
            ]
        }"#;
        let circuit = load_circuit_str(json).unwrap();
        assert_eq!(circuit.particles(), 2);
        assert_eq!(circuit.gates()[0].gate, Gate::PauliX);
        assert_eq!(
            circuit.gates()[0].braid_sequence,
            vec![
                BraidStep::new(1, 2, Direction::Forward),
                BraidStep::new(1, 2, Direction::Reversed)
            ]
        );

        let miscounted = json.replace(r#""particles": 2"#, r#""particles": 4"#);
        assert_matches!(
            load_circuit_str(&miscounted),
            Err(ConfigError::ParticleCount { expected: 4, found: 2 })
        );
    }
}
