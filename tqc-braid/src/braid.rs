//! Braiding engine.
//!
//! A [`Braider`] owns the nanowire and the particle positions while a gate is
//! compiled, and exchanges pairs of particles one braid step at a time.
//! Every exchange first validates the state it would end in, then parks the
//! moving particles on free branches and finally brings them to their
//! swapped positions. Each individual move is routed along the nanowire
//! graph, checked against the other particles and the voltage gates, and
//! recorded.

use derive_more::{Display, Error, From};
use itertools::Itertools;
use smol_str::SmolStr;

use crate::context::BraidContext;
use crate::gate::{BraidPair, BraidStep, Direction, Gate};
use crate::graph::RouteError;
use crate::nanowire::{Nanowire, ParticleId, Positions, Token};
use crate::record::{MovementRecord, RecordError, Recorder, StateRecord, LOG_TARGET, PROGRESS_TARGET};
use crate::topology::{Topology, TopologyError};
use crate::validation::{
    check_unibranch_validity, validate_nanowire_state, validate_path_gates, validate_path_particle,
    MovementError, NanowireStateError, Obstruction, ValidationMode,
};

/// Progress of the exchange being performed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum BraidPhase {
    /// No exchange has been started.
    #[default]
    Ready,
    /// The final state of the exchange is being validated.
    Validating,
    /// Particles are moving to free branches.
    MovingToIntermediate,
    /// Particles are moving to their swapped positions.
    MovingToFinal,
    /// The last exchange completed.
    Committed,
    /// The last exchange failed. The nanowire keeps its last committed state.
    Aborted,
}

/// What to do when another particle stands on the path of a move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlockPolicy {
    /// Leave the particle where it is and carry on.
    Skip,
    /// Fail the move.
    Fail,
}

/// Performs braid exchanges on a nanowire.
pub struct Braider<'a> {
    topology: &'a Topology,
    nanowire: Nanowire,
    positions: Positions,
    context: &'a mut BraidContext,
    recorder: &'a mut dyn Recorder,
    phase: BraidPhase,
}

impl<'a> Braider<'a> {
    /// Create a braider for the given state.
    ///
    /// `nanowire` must be the topology's nanowire occupied as in `positions`.
    pub fn new(
        topology: &'a Topology,
        nanowire: Nanowire,
        positions: Positions,
        context: &'a mut BraidContext,
        recorder: &'a mut dyn Recorder,
    ) -> Self {
        Self {
            topology,
            nanowire,
            positions,
            context,
            recorder,
            phase: BraidPhase::Ready,
        }
    }

    /// Current particle positions.
    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    /// Current nanowire occupancy.
    pub fn nanowire(&self) -> &Nanowire {
        &self.nanowire
    }

    /// The topology being braided on.
    pub fn topology(&self) -> &'a Topology {
        self.topology
    }

    /// Zero-mode and voltage state.
    pub fn context(&self) -> &BraidContext {
        &*self.context
    }

    /// The sink receiving the movement records.
    pub fn recorder(&mut self) -> &mut dyn Recorder {
        &mut *self.recorder
    }

    /// Progress of the last exchange.
    pub fn phase(&self) -> BraidPhase {
        self.phase
    }

    /// Release the nanowire and the positions.
    pub fn into_state(self) -> (Nanowire, Positions) {
        (self.nanowire, self.positions)
    }

    /// Exchange the two particles of a braid step.
    ///
    /// Particles on the same branch are exchanged through two free branches.
    /// Particles on different branches follow the gate's exchange pattern.
    #[tracing::instrument(target = "tqc::metrics", skip(self))]
    pub fn braid(&mut self, step: &BraidStep, gate: Gate) -> Result<(), BraidError> {
        let result = self.exchange(step.pair, step.direction, gate);
        match &result {
            Ok(()) => self.phase = BraidPhase::Committed,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, "Braid {} aborted: {e}", step.pair);
                self.phase = BraidPhase::Aborted;
            }
        }
        result
    }

    fn exchange(&mut self, pair: BraidPair, direction: Direction, gate: Gate) -> Result<(), BraidError> {
        self.begin_exchange();
        let particle = self.position_of(pair.0)?;
        self.position_of(pair.1)?;
        let intersection = self
            .nanowire
            .intersection_of(&Token::Position(particle))
            .ok_or(BraidError::UnknownParticle { particle: pair.0 })?;

        tracing::info!(target: PROGRESS_TARGET, "Braiding {pair} {direction}");
        if check_unibranch_validity(pair, &self.positions, &self.nanowire, intersection) {
            self.braid_same_branch(pair, direction)
        } else {
            self.braid_diff_branch(pair, direction, gate)
        }
    }

    /// Settle the zero modes of the previous exchange and clear the gate forcing.
    pub(crate) fn begin_exchange(&mut self) {
        self.context.reset();
        self.context.refresh_zero_modes();
        self.context.update_zero_modes(&self.nanowire);
    }

    fn braid_same_branch(&mut self, pair: BraidPair, direction: Direction) -> Result<(), BraidError> {
        let finals = self.validate_final(pair)?;
        let [a, b] = pair.particles();
        let order = if self.nanowire.is_inner(&self.position_of(a)?) {
            [a, b]
        } else {
            [b, a]
        };

        self.phase = BraidPhase::MovingToIntermediate;
        for particle in order {
            self.move_to_intermediate(pair, particle, direction)?;
        }
        self.phase = BraidPhase::MovingToFinal;
        self.move_to_finals(pair, order, &finals)
    }

    fn braid_diff_branch(&mut self, pair: BraidPair, direction: Direction, gate: Gate) -> Result<(), BraidError> {
        let finals = self.validate_final(pair)?;
        let roles = match gate.qubits() {
            2 => self.entangling_roles(pair)?,
            _ => None,
        };

        let Some((inner, outer, blocker)) = roles else {
            self.phase = BraidPhase::MovingToIntermediate;
            for particle in pair.particles() {
                self.move_to_intermediate(pair, particle, direction)?;
            }
            self.phase = BraidPhase::MovingToFinal;
            return self.move_to_finals(pair, pair.particles(), &finals);
        };

        self.phase = BraidPhase::MovingToIntermediate;
        for particle in [inner, blocker] {
            self.move_to_intermediate(pair, particle, direction)?;
        }
        self.phase = BraidPhase::MovingToFinal;
        let target = self.final_of(&finals, outer)?;
        self.perform_move(pair, outer, &target, BlockPolicy::Skip)?;
        self.move_to_finals(pair, [inner, blocker], &finals)
    }

    /// The inner particle of the pair, the other particle of the pair and the
    /// particle sharing the other particle's branch.
    fn entangling_roles(&self, pair: BraidPair) -> Result<Option<(ParticleId, ParticleId, ParticleId)>, BraidError> {
        let [a, b] = pair.particles();
        let (inner, outer) = if self.nanowire.is_inner(&self.position_of(a)?) {
            (a, b)
        } else if self.nanowire.is_inner(&self.position_of(b)?) {
            (b, a)
        } else {
            return Ok(None);
        };
        let outer_position = self.position_of(outer)?;
        let blocker = self
            .nanowire
            .partner_slot(&outer_position)
            .and_then(|slot| self.positions.particle_at(slot))
            .filter(|&p| p != inner);
        Ok(blocker.map(|blocker| (inner, outer, blocker)))
    }

    /// Validate the state after the exchange and return its positions.
    fn validate_final(&mut self, pair: BraidPair) -> Result<Positions, BraidError> {
        self.phase = BraidPhase::Validating;
        let finals = self.positions.swapped(pair.0, pair.1).ok_or_else(|| {
            let particle = pair
                .particles()
                .into_iter()
                .find(|&p| !self.positions.contains_particle(p))
                .unwrap_or(pair.0);
            BraidError::UnknownParticle { particle }
        })?;
        let nanowire = self.topology.initiate(&finals)?;
        let isolated = self.context.isolated_positions(&finals);
        validate_nanowire_state(
            &nanowire,
            &finals,
            &isolated,
            self.context,
            self.topology,
            ValidationMode::Final,
        )
        .map_err(|source| BraidError::InvalidNanowireState { pair, source })?;
        Ok(finals)
    }

    /// Park a particle on the closest valid position of a free branch.
    fn move_to_intermediate(
        &mut self,
        pair: BraidPair,
        particle: ParticleId,
        direction: Direction,
    ) -> Result<(), BraidError> {
        let start = self.position_of(particle)?;
        let intersection = self
            .nanowire
            .intersection_of(&Token::Particle(particle))
            .ok_or(BraidError::UnknownParticle { particle })?;
        let mut candidates = self.nanowire.empty_positions(intersection);
        if direction == Direction::Reversed {
            candidates.reverse();
        }

        let mut best: Option<(usize, SmolStr)> = None;
        for candidate in candidates {
            let mut trial = self.positions.clone();
            trial
                .set(particle, candidate.clone())
                .ok_or(BraidError::UnknownParticle { particle })?;
            let nanowire = self.topology.initiate(&trial)?;
            let isolated = self.context.isolated_positions(&trial);
            validate_nanowire_state(
                &nanowire,
                &trial,
                &isolated,
                self.context,
                self.topology,
                ValidationMode::Intermediate,
            )
            .map_err(|source| BraidError::InvalidNanowireState { pair, source })?;

            let steps = self.topology.graph().steps(&start, &candidate)?;
            if best.as_ref().is_none_or(|(fewest, _)| steps < *fewest) {
                best = Some((steps, candidate));
            }
        }

        let Some((_, target)) = best else {
            return Err(BraidError::NoEmptyPosition {
                pair,
                particle,
                intersection: self.nanowire.intersection(intersection).name.clone(),
            });
        };
        self.perform_move(pair, particle, &target, BlockPolicy::Skip)?;
        Ok(())
    }

    /// Bring parked particles to their final positions, outer slots first.
    fn move_to_finals(
        &mut self,
        pair: BraidPair,
        particles: [ParticleId; 2],
        finals: &Positions,
    ) -> Result<(), BraidError> {
        let targets: Vec<(ParticleId, SmolStr)> = particles
            .into_iter()
            .map(|p| Ok((p, self.final_of(finals, p)?)))
            .collect::<Result<_, BraidError>>()?;
        for (particle, target) in targets
            .into_iter()
            .sorted_by_key(|(_, target)| self.nanowire.is_inner(target))
        {
            self.perform_move(pair, particle, &target, BlockPolicy::Skip)?;
        }
        Ok(())
    }

    /// Move a particle to `target` and commit the new state.
    ///
    /// The path must not cross more than one other particle. A path crossing
    /// exactly one is skipped or fails depending on `policy`; skipping
    /// returns `false` and leaves the state untouched. After the commit the
    /// zero modes and voltage gates are updated, and the move fails if a shut
    /// gate now separates the ends of the path.
    pub(crate) fn perform_move(
        &mut self,
        pair: BraidPair,
        particle: ParticleId,
        target: &SmolStr,
        policy: BlockPolicy,
    ) -> Result<bool, BraidError> {
        let start = self.position_of(particle)?;
        let path = self.topology.graph().route(&start, target)?;
        let mut moved = self.positions.clone();
        moved
            .set(particle, target.clone())
            .ok_or(BraidError::UnknownParticle { particle })?;

        let block = validate_path_particle(&path, &moved, particle)?;
        if !block.is_empty() {
            match policy {
                BlockPolicy::Skip => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        "Particle ({particle}) stays on {start}, [{}] is blocked by {}",
                        path.iter().join(", "),
                        block.iter().join(", ")
                    );
                    return Ok(false);
                }
                BlockPolicy::Fail => {
                    return Err(MovementError::PathBlocked {
                        particle,
                        path,
                        obstruction: Obstruction::Particles(block),
                    }
                    .into())
                }
            }
        }

        self.nanowire = self.topology.initiate(&moved)?;
        self.positions = moved;
        self.context.update_zero_modes(&self.nanowire);
        self.context
            .update_voltages(&self.positions, self.topology.cutoff_pairs_adjacent());
        validate_path_gates(
            particle,
            &path,
            self.context.voltages(),
            self.topology.cutoff_pairs_adjacent(),
            self.topology.cutoff_pairs_opposite(),
        )?;

        tracing::info!(
            target: PROGRESS_TARGET,
            "Particle ({particle}) moved along {} [{}]",
            path.iter().join("-"),
            self.context.voltages()
        );
        self.record_move(pair, particle, path)?;
        Ok(true)
    }

    fn record_move(&mut self, pair: BraidPair, particle: ParticleId, path: Vec<SmolStr>) -> Result<(), BraidError> {
        let voltages = self.context.voltages().clone();
        let states = path
            .iter()
            .map(|vertex| {
                let mut positions = self.positions.clone();
                positions.set(particle, vertex.clone())?;
                Some(StateRecord {
                    pair,
                    positions,
                    voltages: voltages.clone(),
                })
            })
            .collect::<Option<Vec<_>>>()
            .ok_or(BraidError::UnknownParticle { particle })?;
        self.recorder.record_movement(&MovementRecord {
            pair,
            particle,
            path,
            voltages,
        })?;
        for state in &states {
            self.recorder.record_state(state)?;
        }
        Ok(())
    }

    pub(crate) fn position_of(&self, particle: ParticleId) -> Result<SmolStr, BraidError> {
        self.positions
            .get(particle)
            .cloned()
            .ok_or(BraidError::UnknownParticle { particle })
    }

    fn final_of(&self, finals: &Positions, particle: ParticleId) -> Result<SmolStr, BraidError> {
        finals
            .get(particle)
            .cloned()
            .ok_or(BraidError::UnknownParticle { particle })
    }
}

/// A braid exchange could not be completed.
#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum BraidError {
    /// A particle has no free branch to move to.
    #[display("Error while trying to braid {pair}: no empty position for particle ({particle}) at intersection {intersection}.")]
    NoEmptyPosition {
        /// The pair being braided.
        pair: BraidPair,
        /// The particle that has to move.
        particle: ParticleId,
        /// The intersection holding the particle.
        intersection: SmolStr,
    },
    /// A state reached by the exchange is not valid.
    #[display("Error while trying to braid {pair}: {source}")]
    InvalidNanowireState {
        /// The pair being braided.
        pair: BraidPair,
        /// The broken rule.
        source: NanowireStateError,
    },
    /// The particles do not form the groups a gate expects.
    #[display("Invalid particle placement. {_0}")]
    Placement(NanowireStateError),
    /// A particle could not be moved.
    #[display("{_0}")]
    #[from]
    InvalidMovement(MovementError),
    /// A path could not be computed.
    #[display("{_0}")]
    #[from]
    Route(RouteError),
    /// The positions do not fit the topology.
    #[display("{_0}")]
    #[from]
    Topology(TopologyError),
    /// A record could not be written.
    #[display("{_0}")]
    #[from]
    Record(RecordError),
    /// A particle is not placed on the nanowire.
    #[display("Particle ({particle}) is not placed on the nanowire.")]
    UnknownParticle {
        /// The unknown particle.
        particle: ParticleId,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record::MemoryRecorder;
    use crate::topology::test::{double_topology, single_topology};
    use crate::topology::NanowireStructure;
    use crate::voltage::{GateState, VoltageGate};
    use cool_asserts::assert_matches;
    use rstest::rstest;

    fn pid(id: u32) -> ParticleId {
        ParticleId::new(id)
    }

    /// Run a sequence of steps from the given positions.
    fn run(
        topology: &Topology,
        positions: &[&str],
        steps: &[BraidStep],
        gate: Gate,
    ) -> (Result<(), BraidError>, Positions, BraidPhase, MemoryRecorder) {
        let positions = Positions::new(positions.iter().copied());
        let nanowire = topology.initiate(&positions).unwrap();
        let mut context = BraidContext::new(topology.gate_count());
        let mut recorder = MemoryRecorder::default();
        let mut braider = Braider::new(topology, nanowire, positions, &mut context, &mut recorder);
        let result = steps.iter().try_for_each(|step| braider.braid(step, gate));
        let phase = braider.phase();
        let (_, positions) = braider.into_state();
        (result, positions, phase, recorder)
    }

    #[rstest]
    fn same_branch_swap(single_topology: Topology) {
        let step = BraidStep::new(1, 2, Direction::Forward);
        let (result, positions, phase, recorder) = run(&single_topology, &["a", "b"], &[step], Gate::Hadamard);
        result.unwrap();
        assert_eq!(positions, Positions::new(["b", "a"]));
        assert_eq!(phase, BraidPhase::Committed);

        let paths = recorder
            .movements
            .iter()
            .map(|m| (m.particle, m.path.iter().join("-")))
            .collect_vec();
        assert_eq!(
            paths,
            vec![
                (pid(2), "b-x1-d".to_string()),
                (pid(1), "a-b-x1-f".to_string()),
                (pid(2), "d-x1-b-a".to_string()),
                (pid(1), "f-x1-b".to_string()),
            ]
        );
        // One state per crossed vertex.
        assert_eq!(recorder.states.len(), 3 + 4 + 4 + 3);
        assert_eq!(recorder.states[1].positions, Positions::new(["a", "x1"]));
        assert_eq!(recorder.movements_of(pid(1)).count(), 2);
    }

    #[rstest]
    fn double_swap_is_identity(single_topology: Topology) {
        let step = BraidStep::new(1, 2, Direction::Forward);
        let (result, positions, _, recorder) =
            run(&single_topology, &["a", "b"], &[step, step], Gate::Hadamard);
        result.unwrap();
        assert_eq!(positions, Positions::new(["a", "b"]));
        assert_eq!(recorder.movements.len(), 8);
    }

    #[rstest]
    fn entangling_exchange(double_topology: Topology) {
        let initial = ["a", "a'", "b", "b'", "e", "e'"];
        let step = BraidStep::new(2, 3, Direction::Reversed);
        let (result, positions, phase, recorder) = run(&double_topology, &initial, &[step], Gate::Cnot);
        result.unwrap();
        assert_eq!(phase, BraidPhase::Committed);
        assert_eq!(positions, Positions::new(["a", "b", "a'", "b'", "e", "e'"]));

        let movers = recorder.movements.iter().map(|m| m.particle).collect_vec();
        assert_eq!(movers, [2, 4, 3, 2, 4].map(pid));
        assert_eq!(recorder.movements[0].path, vec!["a'", "x1", "d'"]);
        assert_eq!(recorder.movements[2].path, vec!["b", "b'", "x1", "a'"]);
        assert_eq!(recorder.movements[2].voltages.to_string(), "O,O,S,O");
    }

    #[rstest]
    fn shut_gate_blocks_exchange(double_topology: Topology) {
        let initial = ["a", "a'", "b", "b'", "e", "e'"];
        let step = BraidStep::new(2, 3, Direction::Forward);
        let (result, positions, phase, recorder) = run(&double_topology, &initial, &[step], Gate::Cnot);
        assert_matches!(
            result,
            Err(BraidError::InvalidMovement(MovementError::PathBlocked {
                particle,
                obstruction: Obstruction::Gate(gate),
                ..
            })) => {
                assert_eq!(particle, pid(4));
                assert_eq!(gate, VoltageGate::new(0));
            }
        );
        assert_eq!(phase, BraidPhase::Aborted);
        // The blocked move is committed but not recorded.
        assert_eq!(positions, Positions::new(["a", "c'", "b", "d'", "e", "e'"]));
        assert_eq!(recorder.movements.len(), 1);
    }

    #[rstest]
    fn no_free_branch_at_intersection(double_topology: Topology) {
        let initial = ["a", "a'", "b", "b'", "c", "c'", "d", "d'"];
        let step = BraidStep::new(1, 2, Direction::Forward);
        let (result, positions, _, recorder) = run(&double_topology, &initial, &[step], Gate::Hadamard);
        assert_matches!(
            result,
            Err(BraidError::NoEmptyPosition { particle, intersection, .. }) => {
                assert_eq!(particle, pid(2));
                assert_eq!(intersection, "x1");
            }
        );
        assert_eq!(positions, Positions::new(initial));
        assert!(recorder.movements.is_empty());
    }

    #[rstest]
    fn invalid_final_state(single_topology: Topology) {
        let initial = ["a", "b", "c", "d", "e", "f"];
        let step = BraidStep::new(1, 2, Direction::Forward);
        let (result, positions, phase, recorder) = run(&single_topology, &initial, &[step], Gate::PauliX);
        assert_matches!(
            result,
            Err(BraidError::InvalidNanowireState {
                source: NanowireStateError::NoEmptyBranch {
                    mode: ValidationMode::Final,
                    required: 2
                },
                ..
            })
        );
        assert_eq!(phase, BraidPhase::Aborted);
        assert_eq!(positions, Positions::new(initial));
        assert!(recorder.states.is_empty());
    }

    /// Two branches around one junction. Swapping a pair leaves a single
    /// free branch, short of the two a final state needs.
    #[test]
    fn two_branch_swap_lacks_free_branches() {
        let structure = NanowireStructure::from_branches([[["a", "b"], ["c", "d"]]]);
        let topology = Topology::from_structure(&structure).unwrap();
        let step = BraidStep::new(1, 2, Direction::Forward);
        let (result, positions, phase, recorder) = run(&topology, &["a", "b"], &[step], Gate::PauliX);
        assert_matches!(
            result,
            Err(BraidError::InvalidNanowireState {
                source: NanowireStateError::NoEmptyBranch {
                    mode: ValidationMode::Final,
                    required: 2
                },
                ..
            })
        );
        assert_eq!(phase, BraidPhase::Aborted);
        assert_eq!(positions, Positions::new(["a", "b"]));
        assert!(recorder.movements.is_empty());
    }

    /// A lone particle crosses x11 from a to h. Its gate state alone decides
    /// the move, since a single isolated particle never drives the gates.
    #[rstest]
    #[case::shut(GateState::Shut)]
    #[case::open(GateState::Open)]
    fn gate_state_decides_move(single_topology: Topology, #[case] state: GateState) {
        let positions = Positions::new(["a"]);
        let nanowire = single_topology.initiate(&positions).unwrap();
        let mut context = BraidContext::new(single_topology.gate_count());
        context.voltages_mut().set(VoltageGate::new(0), state);
        let mut recorder = MemoryRecorder::default();
        let mut braider = Braider::new(&single_topology, nanowire, positions, &mut context, &mut recorder);

        let result = braider.perform_move(BraidPair::new(1, 2), pid(1), &"h".into(), BlockPolicy::Fail);
        assert_eq!(braider.context().voltages().get(VoltageGate::new(0)), state);
        match state {
            GateState::Shut => assert_matches!(
                result,
                Err(BraidError::InvalidMovement(MovementError::PathBlocked {
                    particle,
                    path,
                    obstruction: Obstruction::Gate(gate),
                })) => {
                    assert_eq!(particle, pid(1));
                    assert_eq!(path, vec!["a", "b", "x1", "h"]);
                    assert_eq!(gate, VoltageGate::new(0));
                }
            ),
            GateState::Open => assert_matches!(result, Ok(true)),
        }
        assert_eq!(braider.positions(), &Positions::new(["h"]));
        let moved = usize::from(state == GateState::Open);
        assert_eq!(recorder.movements.len(), moved);
    }

    #[rstest]
    fn unknown_particle(single_topology: Topology) {
        let step = BraidStep::new(1, 3, Direction::Forward);
        let (result, ..) = run(&single_topology, &["a", "b"], &[step], Gate::Hadamard);
        assert_matches!(result, Err(BraidError::UnknownParticle { particle }) => assert_eq!(particle, pid(3)));
    }
}
