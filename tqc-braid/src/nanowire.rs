//! Occupancy of the nanowire.
//!
//! A nanowire is a set of intersections. Every intersection has an ordered
//! list of branches radiating from it, and every branch holds two particle
//! slots: the outer slot at the tip of the branch and the inner slot next to
//! the intersection. The structure is stored as a flat arena of positions
//! with index cross-references, so snapshots are plain clones.

use std::collections::HashMap;

use delegate::delegate;
use derive_more::{Display, From, Into};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::topology::TopologyError;

/// Identifier of a particle. Particles are numbered from 1.
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, From, Into, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticleId(u32);

impl ParticleId {
    /// Create a particle id. Ids are 1-based.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The particle's slot in a [`Positions`] vector, if the id is valid.
    pub fn index(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }

    /// The particle stored at `index` of a [`Positions`] vector.
    pub fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }
}

/// A pair of particles occupying both slots of one branch, outer first.
pub type ZeroMode = [ParticleId; 2];

/// Whether two particle pairs contain the same particles, in any order.
pub fn same_pair(a: &[ParticleId; 2], b: &[ParticleId; 2]) -> bool {
    (a[0] == b[0] && a[1] == b[1]) || (a[0] == b[1] && a[1] == b[0])
}

/// Index of a position in the nanowire arena.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionId(usize);

/// Index of a branch in the nanowire arena.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchId(usize);

impl BranchId {
    /// Global index of the branch.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of an intersection in the nanowire arena.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntersectionId(usize);

impl IntersectionId {
    /// The intersection at `index` in layout order.
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Index of the intersection.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Something that can be located on the nanowire.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    /// A particle, located through its current position.
    Particle(ParticleId),
    /// A named position.
    Position(SmolStr),
}

impl From<ParticleId> for Token {
    fn from(p: ParticleId) -> Self {
        Self::Particle(p)
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Self::Position(name.into())
    }
}

/// A single particle slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Position {
    /// Unique name of the slot, also a vertex of the wire graph.
    pub name: SmolStr,
    /// Particle currently in the slot.
    pub occupant: Option<ParticleId>,
    branch: BranchId,
}

impl Position {
    /// The branch holding this slot.
    pub fn branch(&self) -> BranchId {
        self.branch
    }
}

/// An arm of an intersection with an outer and an inner slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    intersection: IntersectionId,
    slots: [PositionId; 2],
}

impl Branch {
    /// The intersection the branch belongs to.
    pub fn intersection(&self) -> IntersectionId {
        self.intersection
    }

    /// The outer slot, at the tip of the branch.
    pub fn outer(&self) -> PositionId {
        self.slots[0]
    }

    /// The inner slot, next to the intersection.
    pub fn inner(&self) -> PositionId {
        self.slots[1]
    }

    /// Both slots, outer first.
    pub fn slots(&self) -> [PositionId; 2] {
        self.slots
    }
}

/// A junction and its branches, in clock order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Intersection {
    /// Name of the junction vertex in the wire graph.
    pub name: SmolStr,
    branches: Vec<BranchId>,
}

impl Intersection {
    /// The branches of the intersection, in clock order.
    pub fn branches(&self) -> &[BranchId] {
        &self.branches
    }
}

/// The particle positions and their occupants.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Nanowire {
    positions: Vec<Position>,
    branches: Vec<Branch>,
    intersections: Vec<Intersection>,
    lookup: HashMap<SmolStr, PositionId>,
}

impl Nanowire {
    /// Build an empty nanowire from its intersections.
    ///
    /// Each intersection is given as its junction name and its branches in
    /// clock order, every branch listing its outer slot then its inner slot.
    pub fn new<'a>(
        layout: impl IntoIterator<Item = (SmolStr, &'a [Vec<SmolStr>])>,
    ) -> Result<Self, TopologyError> {
        let mut wire = Self::default();
        for (name, branches) in layout {
            let intersection = IntersectionId(wire.intersections.len());
            if branches.is_empty() || branches.len() % 2 != 0 {
                return Err(TopologyError::BranchCount {
                    intersection: name,
                    branches: branches.len(),
                });
            }
            let mut ids = Vec::with_capacity(branches.len());
            for slots in branches {
                let [outer, inner] = slots.as_slice() else {
                    return Err(TopologyError::BranchSize {
                        branch: slots.clone(),
                    });
                };
                let branch = BranchId(wire.branches.len());
                let slots = [wire.add_position(outer, branch)?, wire.add_position(inner, branch)?];
                wire.branches.push(Branch {
                    intersection,
                    slots,
                });
                ids.push(branch);
            }
            wire.intersections.push(Intersection {
                name,
                branches: ids,
            });
        }
        Ok(wire)
    }

    fn add_position(&mut self, name: &SmolStr, branch: BranchId) -> Result<PositionId, TopologyError> {
        let id = PositionId(self.positions.len());
        if self.lookup.insert(name.clone(), id).is_some() {
            return Err(TopologyError::DuplicatePosition { name: name.clone() });
        }
        self.positions.push(Position {
            name: name.clone(),
            occupant: None,
            branch,
        });
        Ok(id)
    }

    /// A copy of this nanowire with the occupants given by `positions`.
    pub fn with_positions(&self, positions: &Positions) -> Result<Self, TopologyError> {
        let mut wire = self.clone();
        wire.positions.iter_mut().for_each(|p| p.occupant = None);
        for (particle, name) in positions.enumerate() {
            let id = wire.position_id(name)?;
            let slot = &mut wire.positions[id.0];
            if let Some(other) = slot.occupant {
                return Err(TopologyError::SharedPosition {
                    name: name.clone(),
                    particles: [other, particle],
                });
            }
            slot.occupant = Some(particle);
        }
        Ok(wire)
    }

    /// All positions, in layout order.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// All branches, in layout order.
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// All intersections.
    pub fn intersections(&self) -> &[Intersection] {
        &self.intersections
    }

    /// A position record.
    pub fn position(&self, id: PositionId) -> &Position {
        &self.positions[id.0]
    }

    /// A branch record.
    pub fn branch(&self, id: BranchId) -> &Branch {
        &self.branches[id.0]
    }

    /// An intersection record.
    pub fn intersection(&self, id: IntersectionId) -> &Intersection {
        &self.intersections[id.0]
    }

    /// Look up a position by name.
    pub fn position_id(&self, name: &str) -> Result<PositionId, TopologyError> {
        self.lookup
            .get(name)
            .copied()
            .ok_or_else(|| TopologyError::UnknownPosition { name: name.into() })
    }

    /// Name of a position.
    pub fn name(&self, id: PositionId) -> &SmolStr {
        &self.positions[id.0].name
    }

    /// The particle at a named position.
    pub fn occupant(&self, name: &str) -> Option<ParticleId> {
        let id = self.lookup.get(name)?;
        self.positions[id.0].occupant
    }

    /// The branch holding a named position.
    pub fn branch_of(&self, name: &str) -> Option<BranchId> {
        let id = self.lookup.get(name)?;
        Some(self.positions[id.0].branch)
    }

    /// Position of a branch within its intersection's clock order.
    pub fn local_index(&self, branch: BranchId) -> usize {
        let intersection = self.branch(branch).intersection;
        self.intersection(intersection)
            .branches
            .iter()
            .position(|&b| b == branch)
            .unwrap_or_default()
    }

    /// The intersection where a particle or a position is located.
    pub fn intersection_of(&self, token: &Token) -> Option<IntersectionId> {
        let branch = match token {
            Token::Particle(p) => self
                .positions
                .iter()
                .find(|pos| pos.occupant == Some(*p))?
                .branch,
            Token::Position(name) => self.branch_of(name)?,
        };
        Some(self.branch(branch).intersection)
    }

    /// Whether both slots of a branch are free.
    pub fn is_branch_empty(&self, branch: BranchId) -> bool {
        self.branch(branch)
            .slots
            .iter()
            .all(|&s| self.position(s).occupant.is_none())
    }

    /// The fully empty branches of an intersection, in clock order.
    pub fn empty_branches(&self, intersection: IntersectionId) -> Vec<BranchId> {
        self.intersection(intersection)
            .branches
            .iter()
            .copied()
            .filter(|&b| self.is_branch_empty(b))
            .collect()
    }

    /// Number of fully empty branches of an intersection.
    pub fn empty_branch_count(&self, intersection: IntersectionId) -> usize {
        self.empty_branches(intersection).len()
    }

    /// Slots of the fully empty branches of an intersection.
    ///
    /// Branches are listed in clock order, each with its outer slot first.
    pub fn empty_positions(&self, intersection: IntersectionId) -> Vec<SmolStr> {
        self.empty_branches(intersection)
            .into_iter()
            .flat_map(|b| self.branch(b).slots)
            .map(|s| self.name(s).clone())
            .collect()
    }

    /// The other slot of the branch holding `name`.
    pub fn partner_slot(&self, name: &str) -> Option<&SmolStr> {
        let branch = self.branch(self.branch_of(name)?);
        branch
            .slots
            .iter()
            .map(|&s| self.name(s))
            .find(|n| n.as_str() != name)
    }

    /// Whether a named position is the inner slot of its branch.
    pub fn is_inner(&self, name: &str) -> bool {
        self.branch_of(name)
            .is_some_and(|b| self.name(self.branch(b).inner()) == name)
    }

    /// Particle pairs currently sharing a branch, outer particle first.
    pub fn zero_mode_pairs(&self) -> Vec<ZeroMode> {
        self.branches
            .iter()
            .filter_map(|b| {
                let [outer, inner] = b.slots.map(|s| self.position(s).occupant);
                Some([outer?, inner?])
            })
            .collect()
    }

    /// Number of occupied positions.
    pub fn occupied_count(&self) -> usize {
        self.positions.iter().filter(|p| p.occupant.is_some()).count()
    }

    /// Occupants in layout order, as a compact `name:particle` listing.
    pub fn occupancy(&self) -> String {
        self.positions
            .iter()
            .filter_map(|p| Some(format!("{}:{}", p.name, p.occupant?)))
            .join(" ")
    }
}

/// Current position of every particle.
///
/// Index `i` holds the position of particle `i + 1`.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Positions(Vec<SmolStr>);

impl Positions {
    /// Create a positions vector from position names, in particle order.
    pub fn new(names: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        Self(names.into_iter().map(Into::into).collect())
    }

    delegate! {
        to self.0 {
            /// Number of particles.
            pub fn len(&self) -> usize;
            /// Whether there are no particles.
            pub fn is_empty(&self) -> bool;
            /// Position names in particle order.
            pub fn iter(&self) -> std::slice::Iter<'_, SmolStr>;
            /// Position names as a slice.
            pub fn as_slice(&self) -> &[SmolStr];
        }
    }

    /// Position of a particle.
    pub fn get(&self, particle: ParticleId) -> Option<&SmolStr> {
        self.0.get(particle.index()?)
    }

    /// Move a particle to a new position, returning its previous one.
    ///
    /// Returns `None` and leaves the positions untouched if the particle is
    /// unknown.
    pub fn set(&mut self, particle: ParticleId, name: impl Into<SmolStr>) -> Option<SmolStr> {
        let slot = particle.index().and_then(|i| self.0.get_mut(i))?;
        Some(std::mem::replace(slot, name.into()))
    }

    /// A copy of the positions with two particles exchanged, or `None` if
    /// either particle is unknown.
    pub fn swapped(&self, a: ParticleId, b: ParticleId) -> Option<Self> {
        let (i, j) = (a.index()?, b.index()?);
        if i >= self.len() || j >= self.len() {
            return None;
        }
        let mut swapped = self.clone();
        swapped.0.swap(i, j);
        Some(swapped)
    }

    /// The particle at a named position.
    pub fn particle_at(&self, name: &str) -> Option<ParticleId> {
        self.0
            .iter()
            .position(|p| p == name)
            .map(ParticleId::from_index)
    }

    /// Whether a particle id refers to an entry of this vector.
    pub fn contains_particle(&self, particle: ParticleId) -> bool {
        particle.index().is_some_and(|i| i < self.len())
    }

    /// Iterate over `(particle, position)` pairs.
    pub fn enumerate(&self) -> impl Iterator<Item = (ParticleId, &SmolStr)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(i, name)| (ParticleId::from_index(i), name))
    }
}

impl std::fmt::Display for Positions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

impl<'a> IntoIterator for &'a Positions {
    type Item = &'a SmolStr;
    type IntoIter = std::slice::Iter<'a, SmolStr>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
