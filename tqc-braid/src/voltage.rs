//! Voltage gates and the position pairs they disconnect.
//!
//! Every intersection carries two voltage gates. Gates are numbered globally,
//! intersection `k` owning gates `2k` and `2k + 1`, and are displayed as
//! `x{k+1}1` and `x{k+1}2`.

use derive_more::{Display, From, Into};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use strum::{EnumIter, EnumString, IntoStaticStr};

/// Global index of a voltage gate.
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, From, Into, Serialize, Deserialize,
)]
#[display("x{}{}", _0 / 2 + 1, _0 % 2 + 1)]
pub struct VoltageGate(usize);

impl VoltageGate {
    /// The gate with global index `index`.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Global index of the gate.
    pub fn index(self) -> usize {
        self.0
    }

    /// Column header used for this gate in recorded output.
    pub fn header(self) -> String {
        format!("Vg{}{}", self.0 / 2 + 1, self.0 % 2 + 1)
    }
}

/// State of a voltage gate.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
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
pub enum GateState {
    /// Positions on both sides of the gate are connected.
    #[default]
    #[strum(serialize = "O")]
    #[serde(rename = "O")]
    Open,
    /// The gate severs its cutoff pairs.
    #[strum(serialize = "S")]
    #[serde(rename = "S")]
    Shut,
}

/// The state of every voltage gate of a nanowire.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Voltages(Vec<GateState>);

impl Voltages {
    /// `count` open gates.
    pub fn open(count: usize) -> Self {
        Self(vec![GateState::Open; count])
    }

    /// Number of gates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no gates.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// State of a gate. Unknown gates read as open.
    pub fn get(&self, gate: VoltageGate) -> GateState {
        self.0.get(gate.0).copied().unwrap_or_default()
    }

    /// Whether a gate is shut.
    pub fn is_shut(&self, gate: VoltageGate) -> bool {
        self.get(gate) == GateState::Shut
    }

    /// Set the state of a gate. Unknown gates are ignored.
    pub fn set(&mut self, gate: VoltageGate, state: GateState) {
        if let Some(slot) = self.0.get_mut(gate.0) {
            *slot = state;
        }
    }

    /// Open every gate.
    pub fn open_all(&mut self) {
        self.0.fill(GateState::Open);
    }

    /// Gate states in index order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = GateState> + '_ {
        self.0.iter().copied()
    }

    /// The gates, in index order.
    pub fn gates(&self) -> impl ExactSizeIterator<Item = VoltageGate> {
        (0..self.0.len()).map(VoltageGate)
    }
}

impl std::fmt::Display for Voltages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join(","))
    }
}

/// For every voltage gate, the position pairs it disconnects when shut.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CutoffTable(Vec<Vec<(SmolStr, SmolStr)>>);

impl CutoffTable {
    /// Create a table from per-gate pair lists, in gate order.
    pub fn new(pairs: Vec<Vec<(SmolStr, SmolStr)>>) -> Self {
        Self(pairs)
    }

    /// Number of gates in the table.
    pub fn gate_count(&self) -> usize {
        self.0.len()
    }

    /// Pairs disconnected by a gate.
    pub fn pairs(&self, gate: VoltageGate) -> &[(SmolStr, SmolStr)] {
        self.0.get(gate.0).map_or(&[][..], |p| p.as_slice())
    }

    /// Whether `gate` lists the pair, in either order.
    pub fn contains(&self, gate: VoltageGate, a: &str, b: &str) -> bool {
        self.pairs(gate)
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    /// The first shut gate listing the pair.
    pub fn shut_gate_for(&self, a: &str, b: &str, voltages: &Voltages) -> Option<VoltageGate> {
        (0..self.0.len())
            .map(VoltageGate)
            .find(|&gate| voltages.is_shut(gate) && self.contains(gate, a, b))
    }
}
