//! Sequencer running the braid program of a single gate.

use crate::braid::{BraidError, Braider};
use crate::context::BraidContext;
use crate::gate::{BraidPair, GateProgram};
use crate::nanowire::{Nanowire, Positions};
use crate::preprocess::Relocation;
use crate::record::{LineRecord, Recorder, LOG_TARGET};
use crate::topology::Topology;

/// Compiles one gate program into particle movements.
#[derive(Clone, Copy, Debug)]
pub struct GateCompiler<'a> {
    topology: &'a Topology,
    program: &'a GateProgram,
}

impl<'a> GateCompiler<'a> {
    /// A compiler for `program` on the given topology.
    pub fn new(topology: &'a Topology, program: &'a GateProgram) -> Self {
        Self { topology, program }
    }

    /// The program being compiled.
    pub fn program(&self) -> &'a GateProgram {
        self.program
    }

    /// Relocate the particles for the gate and braid every step of its sequence.
    ///
    /// The braid line held by every particle is recorded before the first
    /// step and after each one, and the final positions once the sequence
    /// completes. `nanowire` and `positions` are updated in place and keep
    /// the last committed state when a step fails.
    pub fn run(
        &self,
        nanowire: &mut Nanowire,
        positions: &mut Positions,
        context: &mut BraidContext,
        recorder: &mut dyn Recorder,
    ) -> Result<Relocation, BraidError> {
        if let Some(particle) = self.program.particles().find(|&p| !positions.contains_particle(p)) {
            return Err(BraidError::UnknownParticle { particle });
        }

        tracing::info!(
            target: LOG_TARGET,
            "Compiling {} with {} braid steps",
            self.program.gate,
            self.program.braid_sequence.len()
        );
        let mut braider = Braider::new(
            self.topology,
            nanowire.clone(),
            positions.clone(),
            context,
            recorder,
        );
        let result = self.drive(&mut braider);
        (*nanowire, *positions) = braider.into_state();
        if let Err(e) = &result {
            tracing::warn!(target: LOG_TARGET, "Braiding interrupted: {e}");
        }
        result
    }

    fn drive(&self, braider: &mut Braider<'_>) -> Result<Relocation, BraidError> {
        let relocation = braider.move_particles(self.program)?;
        let Some(first) = self.program.braid_sequence.first() else {
            return Ok(relocation);
        };

        let mut lines = (1..=braider.positions().len()).collect::<Vec<_>>();
        braider.recorder().record_line(&LineRecord {
            pair: first.pair,
            lines: lines.clone(),
        })?;
        for step in &self.program.braid_sequence {
            braider.braid(step, self.program.gate)?;
            swap_lines(&mut lines, step.pair);
            braider.recorder().record_line(&LineRecord {
                pair: step.pair,
                lines: lines.clone(),
            })?;
        }

        let finals = braider.positions().clone();
        braider.recorder().record_final_positions(&finals)?;
        Ok(relocation)
    }
}

/// Exchange the braid lines of the two particles of a pair.
fn swap_lines(lines: &mut [usize], pair: BraidPair) {
    if let (Some(a), Some(b)) = (pair.0.index(), pair.1.index()) {
        if a < lines.len() && b < lines.len() {
            lines.swap(a, b);
        }
    }
}
