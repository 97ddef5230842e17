//! Relocation of particles into a gate's branch configuration.
//!
//! Gates working on two pairs of particles expect the second pair on a
//! branch designated relative to the first pair's branch. When the initial
//! placement does not match, the second pair of every misplaced group is
//! moved onto its target branch before braiding starts. No logical braid is
//! performed by these moves.

use itertools::Itertools;
use smol_str::SmolStr;

use crate::braid::{BlockPolicy, BraidError, Braider};
use crate::gate::{BraidPair, BranchConfig, GateProgram};
use crate::nanowire::{BranchId, ParticleId};
use crate::validation::{
    group_spans, validate_particle_positions, MovementError, NanowireStateError, PositionCheck,
};

/// Result of relocating particles for a gate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Relocation {
    /// Placement check performed before relocating.
    pub check: PositionCheck,
    /// Pairs whose order was reversed on their new branch, formerly inner
    /// particle first.
    pub swapped: Vec<BraidPair>,
}

impl Relocation {
    /// Whether any particle was moved.
    pub fn relocated(&self) -> bool {
        self.check.needs_relocation()
    }
}

impl Braider<'_> {
    /// Move particles so they match the branch configuration of `program`.
    ///
    /// Only groups of four are relocated: their second pair moves to the
    /// branch designated by the configuration, which must be empty. Gates
    /// that do not preserve the order put the inner particle on the outer
    /// slot of the target and the outer particle behind it. Otherwise the
    /// inner particle parks on the nearest other free branch while the outer
    /// particle takes the outer slot, then completes the pair.
    pub fn move_particles(&mut self, program: &GateProgram) -> Result<Relocation, BraidError> {
        let check = validate_particle_positions(
            self.nanowire(),
            self.positions(),
            &program.branch_config,
            &program.groups,
        )
        .map_err(BraidError::Placement)?;
        if !check.needs_relocation() {
            return Ok(Relocation {
                check,
                swapped: Vec::new(),
            });
        }

        self.begin_exchange();
        let mut swapped = Vec::new();
        for span in group_spans(&program.groups, self.positions().len()) {
            let particles = span.map(ParticleId::from_index).collect_vec();
            let [anchor, _, p, q] = particles[..] else {
                continue;
            };
            if !check.misplaced.contains(&anchor) {
                continue;
            }
            let reversed = self.relocate_pair(
                anchor,
                [p, q],
                &program.branch_config,
                program.gate.preserves_order(),
            )?;
            swapped.extend(reversed);
        }
        Ok(Relocation { check, swapped })
    }

    fn relocate_pair(
        &mut self,
        anchor: ParticleId,
        [p, q]: [ParticleId; 2],
        config: &BranchConfig,
        preserves_order: bool,
    ) -> Result<Option<BraidPair>, BraidError> {
        if self.branch_of(p)? != self.branch_of(q)? {
            return Err(BraidError::Placement(
                NanowireStateError::InvalidZeroModePair {
                    particles: vec![p, q],
                },
            ));
        }
        let (inner, outer) = if self.nanowire().is_inner(&self.position_of(p)?) {
            (p, q)
        } else {
            (q, p)
        };

        let target = config.target_branch(self.nanowire(), self.branch_of(anchor)?);
        let branch = self.nanowire().branch(target);
        let target_outer = self.nanowire().name(branch.outer()).clone();
        let target_inner = self.nanowire().name(branch.inner()).clone();
        if !self.nanowire().is_branch_empty(target) {
            return Err(MovementError::TargetOccupied {
                particle: inner,
                position: target_outer,
            }
            .into());
        }

        let moved = BraidPair(inner, outer);
        tracing::info!(
            target: crate::record::PROGRESS_TARGET,
            "Relocating {moved} to {target_outer}|{target_inner}"
        );
        if !preserves_order {
            self.perform_move(moved, inner, &target_outer, BlockPolicy::Fail)?;
            self.perform_move(moved, outer, &target_inner, BlockPolicy::Fail)?;
            return Ok(Some(moved));
        }

        let parking = self.parking_slot(inner, target)?;
        self.perform_move(moved, inner, &parking, BlockPolicy::Fail)?;
        self.perform_move(moved, outer, &target_outer, BlockPolicy::Fail)?;
        self.perform_move(moved, inner, &target_inner, BlockPolicy::Fail)?;
        Ok(None)
    }

    /// Inner slot of the free branch closest to `particle`, other than `target`.
    fn parking_slot(&self, particle: ParticleId, target: BranchId) -> Result<SmolStr, BraidError> {
        let start = self.position_of(particle)?;
        let intersection = self.nanowire().branch(target).intersection();
        let mut best: Option<(usize, SmolStr)> = None;
        for branch in self.nanowire().empty_branches(intersection) {
            if branch == target {
                continue;
            }
            let slot = self.nanowire().name(self.nanowire().branch(branch).inner()).clone();
            let steps = self.topology().graph().steps(&start, &slot)?;
            if best.as_ref().is_none_or(|(fewest, _)| steps < *fewest) {
                best = Some((steps, slot));
            }
        }
        best.map(|(_, slot)| slot)
            .ok_or_else(|| MovementError::NoParkingPosition { particle }.into())
    }

    fn branch_of(&self, particle: ParticleId) -> Result<BranchId, BraidError> {
        self.nanowire()
            .branch_of(&self.position_of(particle)?)
            .ok_or(BraidError::UnknownParticle { particle })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::BraidContext;
    use crate::gate::Gate;
    use crate::nanowire::Positions;
    use crate::record::MemoryRecorder;
    use crate::topology::test::single_topology;
    use crate::topology::Topology;
    use cool_asserts::assert_matches;
    use rstest::rstest;

    fn pid(id: u32) -> ParticleId {
        ParticleId::new(id)
    }

    fn relocate(
        topology: &Topology,
        positions: &[&str],
        gate: Gate,
        groups: &[usize],
    ) -> (Result<Relocation, BraidError>, Positions, MemoryRecorder) {
        let program = GateProgram {
            gate,
            braid_sequence: vec![],
            branch_config: "double adjacent clockwise".parse().unwrap(),
            groups: groups.to_vec(),
        };
        let positions = Positions::new(positions.iter().copied());
        let nanowire = topology.initiate(&positions).unwrap();
        let mut context = BraidContext::new(topology.gate_count());
        let mut recorder = MemoryRecorder::default();
        let mut braider = Braider::new(topology, nanowire, positions, &mut context, &mut recorder);
        let result = braider.move_particles(&program);
        let (_, positions) = braider.into_state();
        (result, positions, recorder)
    }

    #[rstest]
    fn reversed_order(single_topology: Topology) {
        let (result, positions, recorder) = relocate(&single_topology, &["a", "b", "e", "f"], Gate::Hadamard, &[4]);
        let relocation = result.unwrap();
        assert!(relocation.relocated());
        assert_eq!(relocation.check.misplaced, [1, 2, 3, 4].map(pid));
        assert_eq!(relocation.swapped, vec![BraidPair::new(4, 3)]);
        assert_eq!(positions, Positions::new(["a", "b", "h", "g"]));
        assert_eq!(recorder.movements.len(), 2);
        assert_eq!(recorder.movements[0].path, vec!["f", "x1", "h", "g"]);
    }

    #[rstest]
    fn same_order(single_topology: Topology) {
        let (result, positions, recorder) = relocate(&single_topology, &["a", "b", "e", "f"], Gate::Cnot, &[4]);
        let relocation = result.unwrap();
        assert!(relocation.swapped.is_empty());
        assert_eq!(positions, Positions::new(["a", "b", "g", "h"]));

        let paths = recorder.movements.iter().map(|m| m.path.iter().join("-")).collect_vec();
        assert_eq!(paths, ["f-x1-d", "e-f-x1-h-g", "d-x1-h"]);
    }

    #[rstest]
    fn matching_placement(single_topology: Topology) {
        let (result, positions, recorder) = relocate(&single_topology, &["a", "b", "g", "h"], Gate::Cnot, &[4]);
        let relocation = result.unwrap();
        assert!(relocation.check.valid);
        assert!(!relocation.relocated());
        assert_eq!(positions, Positions::new(["a", "b", "g", "h"]));
        assert!(recorder.movements.is_empty());
    }

    #[rstest]
    fn occupied_target(single_topology: Topology) {
        let initial = ["a", "b", "e", "f", "g", "h"];
        let (result, positions, _) = relocate(&single_topology, &initial, Gate::Hadamard, &[4, 2]);
        assert_matches!(
            result,
            Err(BraidError::InvalidMovement(MovementError::TargetOccupied { particle, position })) => {
                assert_eq!(particle, pid(4));
                assert_eq!(position, "g");
            }
        );
        assert_eq!(positions, Positions::new(initial));
    }

    #[rstest]
    fn nowhere_to_park(single_topology: Topology) {
        let initial = ["a", "b", "e", "f", "c", "d"];
        let (result, _, recorder) = relocate(&single_topology, &initial, Gate::PhaseS, &[4, 2]);
        assert_matches!(
            result,
            Err(BraidError::InvalidMovement(MovementError::NoParkingPosition { particle })) => {
                assert_eq!(particle, pid(4));
            }
        );
        assert!(recorder.movements.is_empty());
    }
}
