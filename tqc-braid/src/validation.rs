//! Validity rules for nanowire states and particle movements.

use derive_more::{Display, Error, From};
use itertools::Itertools;
use smol_str::SmolStr;

use crate::context::BraidContext;
use crate::gate::{BraidPair, BranchConfig, Multiplicity};
use crate::graph::RouteError;
use crate::nanowire::{BranchId, IntersectionId, Nanowire, ParticleId, Positions};
use crate::topology::{Topology, TopologyError};
use crate::voltage::{CutoffTable, VoltageGate, Voltages};

/// Which kind of state is being validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum ValidationMode {
    /// The state at the end of a braid.
    #[strum(serialize = "final")]
    Final,
    /// A state where one particle is parked on a free branch.
    #[strum(serialize = "intermediate")]
    Intermediate,
}

impl ValidationMode {
    /// Free branches an intersection must keep for the state to be valid.
    pub fn min_empty_branches(self) -> usize {
        match self {
            ValidationMode::Final => 2,
            ValidationMode::Intermediate => 1,
        }
    }
}

/// Validate a nanowire state, returning its score.
///
/// At least one intersection must keep enough fully empty branches for the
/// given mode, and no two isolated particles may be separated by a shut
/// gate unless the pair is protected. The score is `1` for every valid
/// state.
pub fn validate_nanowire_state(
    nanowire: &Nanowire,
    positions: &Positions,
    isolated: &[SmolStr],
    context: &BraidContext,
    topology: &Topology,
    mode: ValidationMode,
) -> Result<u32, NanowireStateError> {
    validate_empty_branches(nanowire, mode)?;
    validate_multi_modal_crossing(positions, isolated, context, topology)?;
    Ok(1)
}

fn validate_empty_branches(nanowire: &Nanowire, mode: ValidationMode) -> Result<(), NanowireStateError> {
    let required = mode.min_empty_branches();
    let ids = (0..nanowire.intersections().len()).map(IntersectionId::from_index);
    let mut counts = ids.map(|i| nanowire.empty_branch_count(i));
    if counts.any(|free| free >= required) {
        Ok(())
    } else {
        Err(NanowireStateError::NoEmptyBranch { mode, required })
    }
}

fn validate_multi_modal_crossing(
    positions: &Positions,
    isolated: &[SmolStr],
    context: &BraidContext,
    topology: &Topology,
) -> Result<(), NanowireStateError> {
    let voltages = context.voltages();
    for (a, b) in isolated.iter().tuple_combinations() {
        if context.protection(a, b, positions, isolated).is_some() {
            continue;
        }
        let gate = topology
            .cutoff_pairs_adjacent()
            .shut_gate_for(a, b, voltages)
            .or_else(|| topology.cutoff_pairs_opposite().shut_gate_for(a, b, voltages));
        if let Some(gate) = gate {
            return Err(NanowireStateError::MultiModalCrossing {
                positions: [a.clone(), b.clone()],
                gate,
            });
        }
    }
    Ok(())
}

/// Check that a path is not obstructed by other particles.
///
/// `positions` is the state after the move. Every occupied vertex along the
/// path is collected and the last one, the destination, is dropped. More
/// than one remaining occupant blocks the path. Otherwise the remaining
/// occupants, if any, are returned.
pub fn validate_path_particle(
    path: &[SmolStr],
    positions: &Positions,
    particle: ParticleId,
) -> Result<Vec<SmolStr>, MovementError> {
    let mut block = path
        .iter()
        .filter(|v| positions.particle_at(v).is_some())
        .cloned()
        .collect_vec();
    block.pop();
    if block.len() > 1 {
        return Err(MovementError::PathBlocked {
            particle,
            path: path.to_vec(),
            obstruction: Obstruction::Particles(block),
        });
    }
    Ok(block)
}

/// Check that no shut gate separates the two ends of a path.
pub fn validate_path_gates(
    particle: ParticleId,
    path: &[SmolStr],
    voltages: &Voltages,
    adjacent: &CutoffTable,
    opposite: &CutoffTable,
) -> Result<(), MovementError> {
    let (Some(first), Some(last)) = (path.first(), path.last()) else {
        return Ok(());
    };
    let gate = adjacent
        .shut_gate_for(first, last, voltages)
        .or_else(|| opposite.shut_gate_for(first, last, voltages));
    match gate {
        Some(gate) => Err(MovementError::PathBlocked {
            particle,
            path: path.to_vec(),
            obstruction: Obstruction::Gate(gate),
        }),
        None => Ok(()),
    }
}

/// Whether both particles of a pair sit on the same branch of `intersection`.
pub fn check_unibranch_validity(
    pair: BraidPair,
    positions: &Positions,
    nanowire: &Nanowire,
    intersection: IntersectionId,
) -> bool {
    let branch = |p: ParticleId| {
        let b = nanowire.branch_of(positions.get(p)?)?;
        (nanowire.branch(b).intersection() == intersection).then_some(b)
    };
    match (branch(pair.0), branch(pair.1)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Placement of the particles relative to a gate's branch configuration.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PositionCheck {
    /// Whether every group matches the configuration.
    pub valid: bool,
    /// Intersection of every particle, in particle order.
    pub intersections: Vec<IntersectionId>,
    /// Branch of every particle, in particle order.
    pub branches: Vec<BranchId>,
    /// Particles of the groups that do not match the configuration.
    pub misplaced: Vec<ParticleId>,
}

impl PositionCheck {
    /// Whether the particles must be relocated before braiding.
    ///
    /// That is the case when the check failed with more than two misplaced
    /// particles spread over several branches.
    pub fn needs_relocation(&self) -> bool {
        !self.valid && self.misplaced.len() > 2 && self.branches.iter().unique().count() > 1
    }
}

/// Consecutive particle index ranges of the given group sizes.
pub(crate) fn group_spans(groups: &[usize], particles: usize) -> Vec<std::ops::Range<usize>> {
    let mut start = 0;
    groups
        .iter()
        .map(|&size| {
            let span = start.min(particles)..(start + size).min(particles);
            start += size;
            span
        })
        .collect()
}

/// Check the particle placement against a gate's branch configuration.
///
/// Particles are split into consecutive groups of the given sizes. Every
/// group must lie within one intersection and fill its branches in pairs.
pub fn validate_particle_positions(
    nanowire: &Nanowire,
    positions: &Positions,
    config: &BranchConfig,
    groups: &[usize],
) -> Result<PositionCheck, NanowireStateError> {
    let branches: Vec<BranchId> = positions
        .iter()
        .map(|name| {
            nanowire
                .branch_of(name)
                .ok_or_else(|| TopologyError::UnknownPosition { name: name.clone() })
        })
        .collect::<Result<_, _>>()?;
    let intersections = branches
        .iter()
        .map(|&b| nanowire.branch(b).intersection())
        .collect_vec();

    let mut check = PositionCheck {
        valid: true,
        intersections,
        branches,
        misplaced: Vec::new(),
    };
    let spans = group_spans(groups, positions.len());
    if spans
        .iter()
        .any(|span| !check.intersections[span.clone()].iter().all_equal())
    {
        check.valid = false;
        return Ok(check);
    }

    for span in spans {
        let branches = &check.branches[span.clone()];
        let particles = span.map(ParticleId::from_index).collect_vec();
        if branches.len() != 2 * branches.iter().unique().count() {
            return Err(NanowireStateError::InvalidZeroModePair { particles });
        }
        if !validate_branch_config(nanowire, config, branches) {
            check.valid = false;
            check.misplaced.extend(particles);
        }
    }
    Ok(check)
}

/// Whether the branches of a group of particles match a configuration.
///
/// Groups of two always match. In a group of four under a double
/// configuration, the second pair must sit on the branch the configuration
/// designates relative to the first pair's branch.
pub fn validate_branch_config(nanowire: &Nanowire, config: &BranchConfig, branches: &[BranchId]) -> bool {
    match branches {
        [_, _] => true,
        [b0, b1, b2, b3] => match config.multiplicity {
            Multiplicity::Single => true,
            Multiplicity::Double => {
                b0 == b1
                    && b2 == b3
                    && nanowire.branch(*b1).intersection() == nanowire.branch(*b2).intersection()
                    && config.target_branch(nanowire, *b1) == *b2
            }
        },
        _ => false,
    }
}

/// The nanowire state breaks a validity rule.
#[derive(Debug, Display, Clone, Error, PartialEq, Eq, From)]
#[non_exhaustive]
pub enum NanowireStateError {
    /// No intersection keeps enough free branches.
    #[display("No intersection keeps {required} empty branches for the {mode} state.")]
    NoEmptyBranch {
        /// The validated state kind.
        mode: ValidationMode,
        /// Free branches required per intersection.
        required: usize,
    },
    /// Two unpaired particles would be separated by a shut gate.
    #[display(
        "Isolated particles on {} and {} are cut off by shut voltage gate {gate}.",
        positions[0],
        positions[1]
    )]
    MultiModalCrossing {
        /// The two positions.
        positions: [SmolStr; 2],
        /// The shut gate between them.
        gate: VoltageGate,
    },
    /// A group of particles does not form zero-mode pairs.
    #[display("The particles [{}] are not a valid zero-mode pair.", particles.iter().join(", "))]
    InvalidZeroModePair {
        /// The particles of the group.
        particles: Vec<ParticleId>,
    },
    /// The positions do not match the nanowire.
    #[from]
    Topology(TopologyError),
}

/// Something in the way of a particle's path.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Obstruction {
    /// Other particles along the path.
    #[display("particles in [{}]", _0.iter().join(", "))]
    Particles(Vec<SmolStr>),
    /// A shut voltage gate.
    #[display("voltage gate {_0}")]
    Gate(VoltageGate),
}

/// A particle movement cannot be performed.
#[derive(Debug, Display, Clone, Error, PartialEq, Eq, From)]
#[non_exhaustive]
pub enum MovementError {
    /// The path of a move is obstructed.
    #[display("The particle ({particle}) with path [{}] is blocked by {obstruction}.", path.iter().join(", "))]
    PathBlocked {
        /// The moving particle.
        particle: ParticleId,
        /// The path it would take.
        path: Vec<SmolStr>,
        /// What blocks it.
        obstruction: Obstruction,
    },
    /// A relocation target is not free.
    #[display("Cannot move particle ({particle}) to the occupied position {position}.")]
    TargetOccupied {
        /// The particle to relocate.
        particle: ParticleId,
        /// The occupied target.
        position: SmolStr,
    },
    /// No free branch is available to park a particle.
    #[display("No free branch to park particle ({particle}).")]
    NoParkingPosition {
        /// The particle to park.
        particle: ParticleId,
    },
    /// Routing failed.
    #[from]
    Route(RouteError),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::test::{double_topology, single_topology};
    use crate::voltage::GateState;
    use cool_asserts::assert_matches;
    use rstest::rstest;

    fn pid(id: u32) -> ParticleId {
        ParticleId::new(id)
    }

    fn path(vertices: &[&str]) -> Vec<SmolStr> {
        vertices.iter().map(|&v| v.into()).collect()
    }

    #[rstest]
    fn slack(single_topology: Topology) {
        let ctx = BraidContext::new(single_topology.gate_count());
        let check = |names: &[&str], mode| {
            let positions = Positions::new(names.iter().copied());
            let wire = single_topology.initiate(&positions).unwrap();
            let isolated = ctx.isolated_positions(&positions);
            validate_nanowire_state(&wire, &positions, &isolated, &ctx, &single_topology, mode)
        };
        assert_eq!(check(&["a", "b"], ValidationMode::Final), Ok(1));
        assert_matches!(
            check(&["a", "b", "c", "d", "e"], ValidationMode::Final),
            Err(NanowireStateError::NoEmptyBranch { required: 2, .. })
        );
        assert_eq!(check(&["a", "b", "c", "d", "e"], ValidationMode::Intermediate), Ok(1));
        assert_matches!(
            check(&["a", "c", "e", "g"], ValidationMode::Intermediate),
            Err(NanowireStateError::NoEmptyBranch { required: 1, .. })
        );
    }

    #[rstest]
    fn slack_in_any_intersection(double_topology: Topology) {
        let ctx = BraidContext::new(double_topology.gate_count());
        // x1 is full, x2 is free.
        let positions = Positions::new(["a", "b", "c", "d"]);
        let wire = double_topology.initiate(&positions).unwrap();
        let isolated = ctx.isolated_positions(&positions);
        assert_eq!(
            validate_nanowire_state(&wire, &positions, &isolated, &ctx, &double_topology, ValidationMode::Final),
            Ok(1)
        );
    }

    #[rstest]
    fn multi_modal_crossing(single_topology: Topology) {
        let mut ctx = BraidContext::new(single_topology.gate_count());
        // Three loose particles, with a|b left free.
        let positions = Positions::new(["d", "f", "h"]);
        let wire = single_topology.initiate(&positions).unwrap();
        ctx.update_zero_modes(&wire);
        let isolated = ctx.isolated_positions(&positions);
        let validate = |ctx: &BraidContext| {
            validate_nanowire_state(&wire, &positions, &isolated, ctx, &single_topology, ValidationMode::Intermediate)
        };

        assert_eq!(validate(&ctx), Ok(1));
        ctx.voltages_mut().set(VoltageGate::new(0), GateState::Shut);
        assert_matches!(
            validate(&ctx),
            Err(NanowireStateError::MultiModalCrossing { positions, gate }) => {
                assert_eq!(positions, ["d", "f"]);
                assert_eq!(gate, VoltageGate::new(0));
            }
        );
    }

    #[test]
    fn path_particles() {
        // After the move: particle 1 reached d, particle 2 sits on b.
        let positions = Positions::new(["d", "b", "x1"]);
        assert_eq!(
            validate_path_particle(&path(&["a", "c", "d"]), &positions, pid(1)),
            Ok(vec![])
        );
        assert_eq!(
            validate_path_particle(&path(&["a", "b", "d"]), &positions, pid(1)),
            Ok(path(&["b"]))
        );
        assert_matches!(
            validate_path_particle(&path(&["a", "b", "x1", "d"]), &positions, pid(1)),
            Err(MovementError::PathBlocked { obstruction: Obstruction::Particles(block), .. }) => {
                assert_eq!(block, path(&["b", "x1"]));
            }
        );
    }

    #[rstest]
    fn path_gates(single_topology: Topology) {
        let mut voltages = Voltages::open(2);
        let adj = single_topology.cutoff_pairs_adjacent();
        let opp = single_topology.cutoff_pairs_opposite();
        let route = path(&["b", "x1", "h"]);

        assert_eq!(validate_path_gates(pid(1), &route, &voltages, adj, opp), Ok(()));
        voltages.set(VoltageGate::new(0), GateState::Shut);
        assert_matches!(
            validate_path_gates(pid(1), &route, &voltages, adj, opp),
            Err(MovementError::PathBlocked { obstruction: Obstruction::Gate(gate), .. }) => {
                assert_eq!(gate.to_string(), "x11");
            }
        );
        // Facing branches are cut by either gate.
        let facing = path(&["b", "x1", "f"]);
        assert_matches!(
            validate_path_gates(pid(1), &facing, &voltages, adj, opp),
            Err(MovementError::PathBlocked { .. })
        );
        voltages.set(VoltageGate::new(0), GateState::Open);
        assert_eq!(validate_path_gates(pid(1), &facing, &voltages, adj, opp), Ok(()));
    }

    #[rstest]
    fn unibranch(double_topology: Topology) {
        let positions = Positions::new(["a", "a'", "b", "e"]);
        let wire = double_topology.initiate(&positions).unwrap();
        let x1 = IntersectionId::from_index(0);
        assert!(check_unibranch_validity(BraidPair::new(1, 2), &positions, &wire, x1));
        assert!(!check_unibranch_validity(BraidPair::new(2, 3), &positions, &wire, x1));
        assert!(!check_unibranch_validity(BraidPair::new(3, 4), &positions, &wire, x1));
    }

    #[rstest]
    #[case::clockwise("double adjacent clockwise", ["a", "b", "g", "h"], true)]
    #[case::clockwise_wrong_side("double adjacent clockwise", ["a", "b", "c", "d"], false)]
    #[case::counter_clockwise("double adjacent counter clockwise", ["a", "b", "c", "d"], true)]
    #[case::opposite("double opposite", ["c", "d", "g", "h"], true)]
    #[case::opposite_wrong("opposite", ["c", "d", "e", "f"], false)]
    #[case::single("single adjacent clockwise", ["a", "b", "c", "d"], true)]
    fn branch_configs(
        single_topology: Topology,
        #[case] config: &str,
        #[case] names: [&str; 4],
        #[case] valid: bool,
    ) {
        let config: BranchConfig = config.parse().unwrap();
        let positions = Positions::new(names);
        let wire = single_topology.initiate(&positions).unwrap();
        let check = validate_particle_positions(&wire, &positions, &config, &[4]).unwrap();
        assert_eq!(check.valid, valid);
        assert_eq!(check.misplaced.is_empty(), valid);
    }

    #[rstest]
    fn particle_groups(double_topology: Topology) {
        let config: BranchConfig = "double opposite".parse().unwrap();

        // 1|2 on a, 3|4 on c, 5|6 on x2.
        let positions = Positions::new(["a", "a'", "c", "c'", "e", "e'"]);
        let wire = double_topology.initiate(&positions).unwrap();
        let check = validate_particle_positions(&wire, &positions, &config, &[4, 2]).unwrap();
        assert!(check.valid);
        assert!(!check.needs_relocation());

        // 3|4 on the neighbouring branch.
        let positions = Positions::new(["a", "a'", "b", "b'", "e", "e'"]);
        let wire = double_topology.initiate(&positions).unwrap();
        let check = validate_particle_positions(&wire, &positions, &config, &[4, 2]).unwrap();
        assert_eq!(check.misplaced, [pid(1), pid(2), pid(3), pid(4)]);
        assert!(check.needs_relocation());

        // A group split over two intersections.
        let positions = Positions::new(["a", "a'", "e", "e'"]);
        let wire = double_topology.initiate(&positions).unwrap();
        let check = validate_particle_positions(&wire, &positions, &config, &[4]).unwrap();
        assert!(!check.valid);
        assert!(!check.needs_relocation());

        // Loose particles cannot pair up.
        let positions = Positions::new(["a", "b", "c", "d"]);
        let wire = double_topology.initiate(&positions).unwrap();
        assert_matches!(
            validate_particle_positions(&wire, &positions, &config, &[4]),
            Err(NanowireStateError::InvalidZeroModePair { particles }) => assert_eq!(particles.len(), 4)
        );
    }
}
