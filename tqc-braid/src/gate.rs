//! Logical gates and their braid programs.

use std::str::FromStr;

use derive_more::{Display, Error};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};

use crate::nanowire::{BranchId, Nanowire, ParticleId};

/// Logical gates that can be compiled into braids.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    IntoStaticStr,
    strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[non_exhaustive]
pub enum Gate {
    /// Controlled NOT between two qubits.
    Cnot,
    /// Hadamard.
    Hadamard,
    /// Pauli X.
    PauliX,
    /// Phase S.
    PhaseS,
}

impl Gate {
    /// Number of qubits the gate acts on.
    pub fn qubits(self) -> usize {
        match self {
            Gate::Cnot => 2,
            Gate::Hadamard | Gate::PauliX | Gate::PhaseS => 1,
        }
    }

    /// Whether relocated particles keep their order on the target branch.
    ///
    /// Gates that do not preserve the order relocate the inner particle to
    /// the outer slot of the target branch and the outer particle behind it.
    pub fn preserves_order(self) -> bool {
        match self {
            Gate::Cnot | Gate::PhaseS => true,
            Gate::Hadamard | Gate::PauliX => false,
        }
    }
}

/// Order in which intermediate positions are tried during a braid.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    /// Free branches in clock order.
    #[default]
    Forward,
    /// Free branches in reverse clock order.
    Reversed,
}

/// Two particles to exchange.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display("({_0}, {_1})")]
pub struct BraidPair(pub ParticleId, pub ParticleId);

impl BraidPair {
    /// A pair from raw particle ids.
    pub const fn new(a: u32, b: u32) -> Self {
        Self(ParticleId::new(a), ParticleId::new(b))
    }

    /// Both particles, in pair order.
    pub fn particles(self) -> [ParticleId; 2] {
        [self.0, self.1]
    }
}

/// One exchange of a braid sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BraidStepRepr")]
pub struct BraidStep {
    /// The particles to exchange.
    pub pair: BraidPair,
    /// Search order of the intermediate positions.
    #[serde(default)]
    pub direction: Direction,
}

impl BraidStep {
    /// A step exchanging particles `a` and `b`.
    pub const fn new(a: u32, b: u32, direction: Direction) -> Self {
        Self {
            pair: BraidPair::new(a, b),
            direction,
        }
    }
}

/// Braid steps are written either in full or as `"a,b,d"`, where `d` is `0`
/// for forward and `1` for reversed.
#[derive(Deserialize)]
#[serde(untagged)]
enum BraidStepRepr {
    Compact(String),
    Full {
        pair: BraidPair,
        #[serde(default)]
        direction: Direction,
    },
}

impl TryFrom<BraidStepRepr> for BraidStep {
    type Error = GateConfigError;

    fn try_from(repr: BraidStepRepr) -> Result<Self, Self::Error> {
        match repr {
            BraidStepRepr::Compact(s) => s.parse(),
            BraidStepRepr::Full { pair, direction } => Ok(Self { pair, direction }),
        }
    }
}

impl FromStr for BraidStep {
    type Err = GateConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GateConfigError::InvalidBraidStep { step: s.to_string() };
        let fields: Vec<u32> = s
            .split(',')
            .map(|f| f.trim().parse())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        let direction = match fields.get(2) {
            None | Some(0) => Direction::Forward,
            Some(1) => Direction::Reversed,
            Some(_) => return Err(invalid()),
        };
        match fields[..] {
            [a, b] | [a, b, _] => Ok(Self::new(a, b, direction)),
            _ => Err(invalid()),
        }
    }
}

/// Where the second pair of a group must sit relative to the first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter)]
pub enum Orientation {
    /// On the facing branch.
    Opposite,
    /// On the previous branch in clock order.
    AdjacentClockwise,
    /// On the next branch in clock order.
    AdjacentCounterClockwise,
}

impl Orientation {
    /// Local index of the designated branch, among `n` branches.
    pub fn target(self, local: usize, n: usize) -> usize {
        match self {
            Orientation::Opposite => (local + n / 2) % n,
            Orientation::AdjacentClockwise => (local + n - 1) % n,
            Orientation::AdjacentCounterClockwise => (local + 1) % n,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Orientation::Opposite => "opposite",
            Orientation::AdjacentClockwise => "adjacent clockwise",
            Orientation::AdjacentCounterClockwise => "adjacent counter clockwise",
        }
    }
}

/// Whether a configuration constrains one pair or a double pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Multiplicity {
    /// Any placement of the group is accepted.
    Single,
    /// The second pair must follow the orientation.
    #[default]
    Double,
}

/// Branch configuration required by a gate, such as `double adjacent clockwise`.
///
/// A configuration without a `single` or `double` qualifier is a double one.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display("{multiplicity} {}", orientation.name())]
#[serde(try_from = "String", into = "String")]
pub struct BranchConfig {
    /// Placement of the second pair.
    pub orientation: Orientation,
    /// Whether the orientation is enforced.
    pub multiplicity: Multiplicity,
}

impl BranchConfig {
    /// A double configuration with the given orientation.
    pub fn double(orientation: Orientation) -> Self {
        Self {
            orientation,
            multiplicity: Multiplicity::Double,
        }
    }

    /// The branch designated for the second pair when the first pair is on `branch`.
    pub fn target_branch(&self, nanowire: &Nanowire, branch: BranchId) -> BranchId {
        let intersection = nanowire.intersection(nanowire.branch(branch).intersection());
        let branches = intersection.branches();
        let local = nanowire.local_index(branch);
        branches[self.orientation.target(local, branches.len())]
    }
}

impl FromStr for BranchConfig {
    type Err = GateConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words = s
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect_vec();
        let multiplicity = if words.iter().any(|w| w == "single") {
            Multiplicity::Single
        } else {
            Multiplicity::Double
        };
        let rest = words
            .iter()
            .filter(|w| *w != "single" && *w != "double")
            .join(" ");
        let orientation = match rest.as_str() {
            "opposite" => Orientation::Opposite,
            "adjacent clockwise" => Orientation::AdjacentClockwise,
            "adjacent counter clockwise" | "adjacent counterclockwise" | "adjacent anticlockwise" => {
                Orientation::AdjacentCounterClockwise
            }
            _ => {
                return Err(GateConfigError::InvalidBranchConfig {
                    config: s.to_string(),
                })
            }
        };
        Ok(Self {
            orientation,
            multiplicity,
        })
    }
}

impl TryFrom<String> for BranchConfig {
    type Error = GateConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BranchConfig> for String {
    fn from(config: BranchConfig) -> Self {
        config.to_string()
    }
}

/// A gate with the braid sequence implementing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateProgram {
    /// The logical gate.
    pub gate: Gate,
    /// Exchanges to perform, in order.
    pub braid_sequence: Vec<BraidStep>,
    /// Placement required before braiding.
    pub branch_config: BranchConfig,
    /// Sizes of the consecutive particle groups, one group per qubit.
    #[serde(deserialize_with = "deserialize_groups")]
    pub groups: Vec<usize>,
}

impl GateProgram {
    /// Particles referenced by the braid sequence, in order of appearance.
    pub fn particles(&self) -> impl Iterator<Item = ParticleId> + '_ {
        self.braid_sequence
            .iter()
            .flat_map(|s| s.pair.particles())
            .unique()
    }
}

/// Groups are written as a list, a single size or a comma separated string.
fn deserialize_groups<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<usize>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Groups {
        List(Vec<usize>),
        Single(usize),
        Text(String),
    }
    match Groups::deserialize(deserializer)? {
        Groups::List(groups) => Ok(groups),
        Groups::Single(size) => Ok(vec![size]),
        Groups::Text(text) => text
            .split(',')
            .map(|g| g.trim().parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(serde::de::Error::custom),
    }
}

/// Errors in a gate description.
#[derive(Debug, Display, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateConfigError {
    /// The branch configuration is not recognised.
    #[display("Unknown branch configuration '{config}'.")]
    InvalidBranchConfig {
        /// The configuration string.
        config: String,
    },
    /// A braid step is malformed.
    #[display("Invalid braid step '{step}'. Expected 'a,b' or 'a,b,direction'.")]
    InvalidBraidStep {
        /// The step string.
        step: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use cool_asserts::assert_matches;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case("cnot", Gate::Cnot)]
    #[case("hadamard", Gate::Hadamard)]
    #[case("pauli-x", Gate::PauliX)]
    #[case("phase-s", Gate::PhaseS)]
    fn gate_names(#[case] name: &str, #[case] gate: Gate) {
        assert_eq!(Gate::from_str(name), Ok(gate));
        assert_eq!(gate.to_string(), name);
        let json = serde_json::to_string(&gate).unwrap();
        assert_eq!(json, format!("\"{name}\""));
    }

    #[test]
    fn gate_properties() {
        let two_qubit = Gate::iter().filter(|g| g.qubits() == 2).collect_vec();
        assert_eq!(two_qubit, [Gate::Cnot]);
        assert!(Gate::Cnot.preserves_order());
        assert!(!Gate::Hadamard.preserves_order());
    }

    #[rstest]
    #[case("opposite", Orientation::Opposite, Multiplicity::Double)]
    #[case("double adjacent clockwise", Orientation::AdjacentClockwise, Multiplicity::Double)]
    #[case("adjacent counter clockwise", Orientation::AdjacentCounterClockwise, Multiplicity::Double)]
    #[case("single adjacent-counter-clockwise", Orientation::AdjacentCounterClockwise, Multiplicity::Single)]
    fn branch_configs(#[case] s: &str, #[case] orientation: Orientation, #[case] multiplicity: Multiplicity) {
        let config: BranchConfig = s.parse().unwrap();
        assert_eq!(config.orientation, orientation);
        assert_eq!(config.multiplicity, multiplicity);
        assert_eq!(config.to_string().parse::<BranchConfig>(), Ok(config));
    }

    #[test]
    fn bad_branch_config() {
        assert_matches!(
            "adjacent sideways".parse::<BranchConfig>(),
            Err(GateConfigError::InvalidBranchConfig { .. })
        );
    }

    #[rstest]
    #[case(Orientation::Opposite, [2, 3, 0, 1])]
    #[case(Orientation::AdjacentClockwise, [3, 0, 1, 2])]
    #[case(Orientation::AdjacentCounterClockwise, [1, 2, 3, 0])]
    fn orientation_targets(#[case] orientation: Orientation, #[case] expected: [usize; 4]) {
        let targets: Vec<usize> = (0..4).map(|b| orientation.target(b, 4)).collect();
        assert_eq!(targets, expected);
    }

    #[test]
    fn program_json() {
        let json = r#"{
            "gate": "pauli-x",
            "braid_sequence": ["3,4,0", "3,4,1", {"pair": [1, 2]}],
            "branch_config": "double adjacent clockwise",
            "groups": "4,2"
        }"#;
        let program: GateProgram = serde_json::from_str(json).unwrap();
        assert_eq!(program.gate, Gate::PauliX);
        assert_eq!(
            program.braid_sequence,
            [
                BraidStep::new(3, 4, Direction::Forward),
                BraidStep::new(3, 4, Direction::Reversed),
                BraidStep::new(1, 2, Direction::Forward),
            ]
        );
        assert_eq!(program.groups, [4, 2]);
        let particles = program.particles().map(u32::from).collect_vec();
        assert_eq!(particles, [3, 4, 1, 2]);

        assert_matches!("1;2".parse::<BraidStep>(), Err(GateConfigError::InvalidBraidStep { .. }));
        assert_matches!("1,2,7".parse::<BraidStep>(), Err(GateConfigError::InvalidBraidStep { .. }));
    }
}
