//! Zero-mode and voltage bookkeeping for a braiding run.
//!
//! Particles sharing a branch form a zero mode. The tracker keeps two
//! generations of zero modes: the settled ones, which accumulate every pair
//! seen during a braid, and the current ones. Particles outside the current
//! zero modes are isolated, and the voltage gates are driven so that no two
//! isolated particles end up connected through a cutoff pair.

use itertools::Itertools;
use smol_str::SmolStr;

use crate::nanowire::{same_pair, Nanowire, ParticleId, Positions, ZeroMode};
use crate::voltage::{CutoffTable, GateState, VoltageGate, Voltages};

/// Why a pair of isolated positions may share a cutoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protection {
    /// The two particles form a zero mode, settled or current.
    ZeroMode,
    /// One of the particles is part of a current zero mode.
    Paired,
    /// The pair is the last isolated pair on the wire.
    LastPair,
}

/// Voltage slots the gate forcing rotates over, two per junction of a
/// double junction wire.
///
/// Slots past the last gate of a smaller wire hold no gate, and forcing onto
/// them shuts nothing.
const FORCING_SLOTS: usize = 4;

/// One-shot gate forcing.
///
/// When the only isolated pair of the wire sits across a gate, that gate is
/// left open and a single gate is shut instead, picked by rotating from the
/// gate that raised the request over [`FORCING_SLOTS`] slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct GateForcing {
    requested: Option<usize>,
    applied: bool,
}

/// Mutable braiding state shared by every move of a circuit run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BraidContext {
    zero_modes_old: Vec<ZeroMode>,
    zero_modes_new: Vec<ZeroMode>,
    voltages: Voltages,
    forcing: GateForcing,
}

impl BraidContext {
    /// A fresh context for a wire with `gate_count` voltage gates.
    pub fn new(gate_count: usize) -> Self {
        Self {
            voltages: Voltages::open(gate_count),
            ..Default::default()
        }
    }

    /// Current state of the voltage gates.
    pub fn voltages(&self) -> &Voltages {
        &self.voltages
    }

    /// Mutable access to the voltage gates.
    pub fn voltages_mut(&mut self) -> &mut Voltages {
        &mut self.voltages
    }

    /// Settled zero modes.
    pub fn zero_modes_old(&self) -> &[ZeroMode] {
        &self.zero_modes_old
    }

    /// Current zero modes.
    pub fn zero_modes_new(&self) -> &[ZeroMode] {
        &self.zero_modes_new
    }

    /// Rescan the zero modes after a change of the nanowire.
    pub fn update_zero_modes(&mut self, nanowire: &Nanowire) {
        let scan = nanowire.zero_mode_pairs();
        if self.zero_modes_new.is_empty() {
            self.zero_modes_new = scan.clone();
        }
        for zm in &self.zero_modes_new {
            if !self.zero_modes_old.contains(zm) {
                self.zero_modes_old.push(*zm);
            }
        }
        self.zero_modes_new = scan;
    }

    /// Settle the current zero modes. Called between braid steps.
    pub fn refresh_zero_modes(&mut self) {
        self.zero_modes_old = std::mem::take(&mut self.zero_modes_new);
    }

    /// Clear the gate forcing. Called before braiding every pair.
    pub fn reset(&mut self) {
        self.forcing = GateForcing::default();
    }

    /// Clear all state. Called before every gate of a circuit.
    pub fn reset_for_gate(&mut self) {
        self.zero_modes_old.clear();
        self.zero_modes_new.clear();
        self.voltages.open_all();
        self.forcing = GateForcing::default();
    }

    fn in_current_zero_mode(&self, particle: ParticleId) -> bool {
        self.zero_modes_new.iter().any(|zm| zm.contains(&particle))
    }

    /// Positions of the particles outside the current zero modes, in particle order.
    pub fn isolated_positions(&self, positions: &Positions) -> Vec<SmolStr> {
        positions
            .enumerate()
            .filter(|&(p, _)| !self.in_current_zero_mode(p))
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Whether two positions may sit across a shut gate, without side effects.
    pub fn protection(
        &self,
        a: &str,
        b: &str,
        positions: &Positions,
        isolated: &[SmolStr],
    ) -> Option<Protection> {
        let (pa, pb) = (positions.particle_at(a), positions.particle_at(b));
        if let (Some(pa), Some(pb)) = (pa, pb) {
            let pair = [pa, pb];
            if self
                .zero_modes_old
                .iter()
                .chain(&self.zero_modes_new)
                .any(|zm| same_pair(zm, &pair))
            {
                return Some(Protection::ZeroMode);
            }
        }
        if [pa, pb]
            .into_iter()
            .flatten()
            .any(|p| self.in_current_zero_mode(p))
        {
            return Some(Protection::Paired);
        }
        (isolated.len() == 2).then_some(Protection::LastPair)
    }

    /// Whether two positions may sit across `gate`.
    ///
    /// A last isolated pair requests the gate forcing, unless it is already
    /// pending.
    pub fn is_protected_pair(
        &mut self,
        a: &str,
        b: &str,
        positions: &Positions,
        isolated: &[SmolStr],
        gate: Option<VoltageGate>,
    ) -> bool {
        match self.protection(a, b, positions, isolated) {
            Some(Protection::LastPair) => {
                if let (Some(gate), None) = (gate, self.forcing.requested) {
                    self.forcing.requested = Some(gate.index());
                }
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Recompute the voltage gates for the given positions.
    ///
    /// With fewer than two isolated particles the gates are left untouched.
    pub fn update_voltages(&mut self, positions: &Positions, cutoffs: &CutoffTable) {
        let isolated = self.isolated_positions(positions);
        if isolated.len() <= 1 {
            return;
        }
        let pairs = isolated.iter().tuple_combinations::<(_, _)>().collect_vec();
        for gate in (0..cutoffs.gate_count()).map(VoltageGate::new) {
            let shut = pairs.iter().any(|(a, b)| {
                cutoffs.contains(gate, a, b)
                    && !self.is_protected_pair(a, b, positions, &isolated, Some(gate))
            });
            let state = if shut { GateState::Shut } else { GateState::Open };
            self.voltages.set(gate, state);
        }
        self.apply_forcing();
    }

    fn apply_forcing(&mut self) {
        let (Some(requested), false) = (self.forcing.requested, self.forcing.applied) else {
            return;
        };
        let half = FORCING_SLOTS / 2;
        let index = requested + 1;
        let offset = if index >= half { half } else { 0 };
        self.voltages
            .set(VoltageGate::new(index % half + offset), GateState::Shut);
        self.forcing.applied = true;
    }
}
