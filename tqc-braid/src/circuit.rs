//! Circuits of braided gates.

use derive_more::{Display, Error, From};

use crate::braid::BraidError;
use crate::compiler::GateCompiler;
use crate::context::BraidContext;
use crate::gate::{Gate, GateProgram};
use crate::nanowire::{Nanowire, Positions};
use crate::preprocess::Relocation;
use crate::record::{Recorder, LOG_TARGET};
use crate::topology::{Topology, TopologyError};

/// A sequence of gates applied to the same set of particles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Circuit {
    qubits: usize,
    initial_positions: Positions,
    gates: Vec<GateProgram>,
}

impl Circuit {
    /// A circuit over `qubits` logical qubits encoded by the particles in
    /// `initial_positions`.
    pub fn new(qubits: usize, initial_positions: Positions, gates: Vec<GateProgram>) -> Self {
        Self {
            qubits,
            initial_positions,
            gates,
        }
    }

    /// Number of logical qubits.
    pub fn qubits(&self) -> usize {
        self.qubits
    }

    /// Number of particles.
    pub fn particles(&self) -> usize {
        self.initial_positions.len()
    }

    /// Where the particles start.
    pub fn initial_positions(&self) -> &Positions {
        &self.initial_positions
    }

    /// The gates, in application order.
    pub fn gates(&self) -> &[GateProgram] {
        &self.gates
    }

    /// Compile every gate in order.
    ///
    /// Each gate starts from the positions the previous one ended with, with
    /// fresh zero modes and all voltage gates open. The first failing gate
    /// stops the run.
    pub fn run(&self, topology: &Topology, recorder: &mut dyn Recorder) -> Result<CircuitOutcome, CircuitError> {
        let mut positions = self.initial_positions.clone();
        let mut nanowire = topology.initiate(&positions)?;
        let mut context = BraidContext::new(topology.gate_count());
        let mut relocations = Vec::with_capacity(self.gates.len());

        for (index, program) in self.gates.iter().enumerate() {
            context.reset_for_gate();
            tracing::info!(target: LOG_TARGET, "Started {} braiding", program.gate);
            let relocation = GateCompiler::new(topology, program)
                .run(&mut nanowire, &mut positions, &mut context, recorder)
                .map_err(|source| CircuitError::Gate {
                    index,
                    gate: program.gate,
                    positions: positions.clone(),
                    source,
                })?;
            tracing::info!(target: LOG_TARGET, "{} braiding completed", program.gate);
            relocations.push(relocation);
        }

        Ok(CircuitOutcome {
            nanowire,
            positions,
            relocations,
        })
    }
}

/// State reached by a completed circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitOutcome {
    /// Final occupancy of the nanowire.
    pub nanowire: Nanowire,
    /// Final particle positions.
    pub positions: Positions,
    /// Relocation performed before every gate.
    pub relocations: Vec<Relocation>,
}

/// A circuit could not be compiled.
#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum CircuitError {
    /// A gate failed.
    #[display("Gate {index} ({gate}) failed at positions {positions}. {source}")]
    Gate {
        /// Index of the gate in the circuit.
        index: usize,
        /// The failing gate.
        gate: Gate,
        /// Last committed positions.
        positions: Positions,
        /// The braiding error.
        source: BraidError,
    },
    /// The initial positions do not fit the nanowire.
    #[display("{_0}")]
    #[from]
    Topology(TopologyError),
}
