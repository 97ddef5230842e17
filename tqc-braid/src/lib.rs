//! Braiding compiler for Majorana zero modes on nanowire networks.
//!
//! Logical gates of a topological quantum computer are implemented by
//! exchanging Majorana particles that live on the branches of a nanowire
//! network. This crate compiles the braid sequence of each gate into
//! concrete particle movements along the wire, keeping the voltage gates
//! that separate the wire segments consistent with the zero modes formed by
//! the particles.
//!
//! A [`Topology`] describes the wire: its intersections, their branches, the
//! routing graph and the voltage gate cutoffs. A [`Circuit`] lists the gate
//! programs to compile, and every committed movement is handed to a
//! [`Recorder`].
//!
//! # Example
//!
//! ```
//! use tqc_braid::record::MemoryRecorder;
//! use tqc_braid::serialize::{load_circuit_str, load_nanowire_str};
//! use tqc_braid::Positions;
//!
//! let topology = load_nanowire_str(
//!     r#"{ "intersections": [{ "branches": [["a", "b"], ["c", "d"], ["e", "f"], ["g", "h"]] }] }"#,
//! )
//! .unwrap();
//! let circuit = load_circuit_str(
//!     r#"{
//!         "particles": 2,
//!         "qubits": 1,
//!         "initial_positions": ["a", "b"],
//!         "gates": [{
//!             "gate": "pauli-x",
//!             "braid_sequence": ["1,2,0"],
//!             "branch_config": "single opposite",
//!             "groups": [2]
//!         }]
//!     }"#,
//! )
//! .unwrap();
//!
//! let mut recorder = MemoryRecorder::default();
//! let outcome = circuit.run(&topology, &mut recorder).unwrap();
//!
//! assert_eq!(outcome.positions, Positions::new(["b", "a"]));
//! assert_eq!(recorder.movements.len(), 4);
//! ```

pub mod braid;
pub mod circuit;
pub mod compiler;
pub mod context;
pub mod gate;
pub mod graph;
pub mod nanowire;
pub mod preprocess;
pub mod record;
pub mod serialize;
pub mod topology;
pub mod validation;
pub mod voltage;

pub use braid::{BraidError, BraidPhase, Braider};
pub use circuit::{Circuit, CircuitError, CircuitOutcome};
pub use compiler::GateCompiler;
pub use context::BraidContext;
pub use gate::{BraidPair, BraidStep, BranchConfig, Direction, Gate, GateProgram};
pub use nanowire::{Nanowire, ParticleId, Positions};
pub use record::{CsvRecorder, MemoryRecorder, Recorder};
pub use topology::{NanowireStructure, Topology, TopologyError};
