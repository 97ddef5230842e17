//! Static description of a nanowire network.
//!
//! A [`Topology`] combines the wire graph used for routing with the empty
//! nanowire layout and the voltage gate cutoff tables derived from it. It is
//! built once and shared by every braid of a circuit.

use derive_more::{Display, Error, From};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::graph::{AdjacencyMatrix, RouteError, WireGraph};
use crate::nanowire::{BranchId, Nanowire, ParticleId, Positions};
use crate::voltage::CutoffTable;

/// The branch layout of a nanowire, as written in configuration files.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NanowireStructure {
    /// The intersections of the wire.
    pub intersections: Vec<IntersectionLayout>,
    /// Extra wires between graph vertices, usually between junctions.
    #[serde(default)]
    pub links: Vec<(SmolStr, SmolStr)>,
}

/// One intersection of a [`NanowireStructure`].
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntersectionLayout {
    /// Name of the junction vertex. Defaults to `x{k}` for the k-th intersection.
    #[serde(default)]
    pub name: Option<SmolStr>,
    /// Branches in clock order, each listing its outer then its inner slot.
    pub branches: Vec<Vec<SmolStr>>,
}

impl NanowireStructure {
    /// A structure from plain branch lists, with default junction names.
    pub fn from_branches<S: Into<SmolStr>>(
        intersections: impl IntoIterator<Item = impl IntoIterator<Item = [S; 2]>>,
    ) -> Self {
        let intersections = intersections
            .into_iter()
            .map(|branches| IntersectionLayout {
                name: None,
                branches: branches
                    .into_iter()
                    .map(|b| b.into_iter().map(Into::into).collect())
                    .collect(),
            })
            .collect();
        Self {
            intersections,
            links: Vec::new(),
        }
    }

    /// Add an extra wire between two vertices.
    pub fn with_link(mut self, a: impl Into<SmolStr>, b: impl Into<SmolStr>) -> Self {
        self.links.push((a.into(), b.into()));
        self
    }

    /// Junction names, in intersection order.
    pub fn junction_names(&self) -> impl Iterator<Item = SmolStr> + '_ {
        self.intersections
            .iter()
            .enumerate()
            .map(|(k, i)| i.name.clone().unwrap_or_else(|| format!("x{}", k + 1).into()))
    }

    /// The wire graph implied by the layout.
    ///
    /// Every branch wires its outer slot to its inner slot, every inner slot is
    /// wired to its junction, and the extra links are added on top. Vertices
    /// are ordered intersection by intersection, slots first then junction.
    pub fn derive_graph(&self) -> Result<WireGraph, TopologyError> {
        let mut vertices: Vec<SmolStr> = Vec::new();
        let mut edges = Vec::new();
        for (layout, junction) in self.intersections.iter().zip(self.junction_names()) {
            let hub = vertices.len() + 2 * layout.branches.len();
            for branch in &layout.branches {
                let [outer, inner] = branch.as_slice() else {
                    return Err(TopologyError::BranchSize {
                        branch: branch.clone(),
                    });
                };
                let o = vertices.len();
                vertices.push(outer.clone());
                vertices.push(inner.clone());
                edges.push((o, o + 1));
                edges.push((o + 1, hub));
            }
            vertices.push(junction);
        }
        for (a, b) in &self.links {
            let find = |name: &SmolStr| {
                vertices
                    .iter()
                    .position(|v| v == name)
                    .ok_or_else(|| TopologyError::MissingVertex { name: name.clone() })
            };
            edges.push((find(a)?, find(b)?));
        }
        let matrix = AdjacencyMatrix::from_edges(vertices.len(), edges)?;
        Ok(WireGraph::new(vertices, matrix)?)
    }
}

/// A nanowire network: routing graph, layout and cutoff tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    graph: WireGraph,
    nanowire: Nanowire,
    inner: Vec<SmolStr>,
    outer: Vec<SmolStr>,
    cutoff_adjacent: CutoffTable,
    cutoff_opposite: CutoffTable,
}

impl Topology {
    /// Combine a branch layout with an explicit wire graph.
    ///
    /// Every particle position must be a vertex of the graph.
    pub fn new(structure: &NanowireStructure, graph: WireGraph) -> Result<Self, TopologyError> {
        let branches = structure
            .intersections
            .iter()
            .map(|i| i.branches.as_slice());
        let nanowire = Nanowire::new(structure.junction_names().zip(branches))?;
        if let Some(missing) = nanowire.positions().iter().find(|p| !graph.contains(&p.name)) {
            return Err(TopologyError::MissingVertex {
                name: missing.name.clone(),
            });
        }

        let (outer, inner) = nanowire
            .branches()
            .iter()
            .map(|b| (nanowire.name(b.outer()).clone(), nanowire.name(b.inner()).clone()))
            .unzip();
        let (cutoff_adjacent, cutoff_opposite) = cutoff_tables(&nanowire);

        Ok(Self {
            graph,
            nanowire,
            inner,
            outer,
            cutoff_adjacent,
            cutoff_opposite,
        })
    }

    /// Build a topology whose graph is derived from the layout.
    pub fn from_structure(structure: &NanowireStructure) -> Result<Self, TopologyError> {
        let graph = structure.derive_graph()?;
        Self::new(structure, graph)
    }

    /// Seed a nanowire with the given particle positions.
    pub fn initiate(&self, positions: &Positions) -> Result<Nanowire, TopologyError> {
        self.nanowire.with_positions(positions)
    }

    /// The routing graph.
    pub fn graph(&self) -> &WireGraph {
        &self.graph
    }

    /// The empty nanowire layout.
    pub fn nanowire(&self) -> &Nanowire {
        &self.nanowire
    }

    /// Inner slots, in branch order.
    pub fn inner(&self) -> &[SmolStr] {
        &self.inner
    }

    /// Outer slots, in branch order.
    pub fn outer(&self) -> &[SmolStr] {
        &self.outer
    }

    /// Pairs cut by each gate between neighbouring branches.
    pub fn cutoff_pairs_adjacent(&self) -> &CutoffTable {
        &self.cutoff_adjacent
    }

    /// Pairs cut by each gate between facing branches.
    pub fn cutoff_pairs_opposite(&self) -> &CutoffTable {
        &self.cutoff_opposite
    }

    /// Number of voltage gates, two per intersection.
    pub fn gate_count(&self) -> usize {
        self.cutoff_adjacent.gate_count()
    }
}

/// Build the adjacent and opposite cutoff tables of a nanowire.
///
/// With `n` branches `b0..b{n-1}` around an intersection, the first gate cuts
/// every even branch from its anticlockwise neighbour `b{2j} | b{2j-1}`, the
/// second cuts every odd branch from its anticlockwise neighbour
/// `b{2j+1} | b{2j}`. Both gates list the facing pairs `b{i} | b{i+n/2}` as
/// their opposite cutoffs.
fn cutoff_tables(nanowire: &Nanowire) -> (CutoffTable, CutoffTable) {
    let cross = |x: BranchId, y: BranchId| {
        let xs = nanowire.branch(x).slots();
        let ys = nanowire.branch(y).slots();
        xs.into_iter()
            .cartesian_product(ys)
            .map(|(p, q)| (nanowire.name(p).clone(), nanowire.name(q).clone()))
            .collect_vec()
    };

    let mut adjacent = Vec::new();
    let mut opposite = Vec::new();
    for intersection in nanowire.intersections() {
        let bs = intersection.branches();
        let n = bs.len();
        let half = n / 2;
        let even = (0..half)
            .flat_map(|j| cross(bs[2 * j], bs[(2 * j + n - 1) % n]))
            .collect_vec();
        let odd = (0..half)
            .flat_map(|j| cross(bs[2 * j + 1], bs[2 * j]))
            .collect_vec();
        let facing = (0..half)
            .flat_map(|i| cross(bs[i], bs[i + half]))
            .collect_vec();
        adjacent.push(even);
        adjacent.push(odd);
        opposite.push(facing.clone());
        opposite.push(facing);
    }
    (CutoffTable::new(adjacent), CutoffTable::new(opposite))
}

/// Errors raised while building a topology or placing particles on it.
#[derive(Debug, Display, Clone, Error, PartialEq, Eq, From)]
#[non_exhaustive]
pub enum TopologyError {
    /// A branch does not have exactly two slots.
    #[display("Branch [{}] must have exactly an outer and an inner slot.", branch.iter().join(", "))]
    BranchSize {
        /// The offending branch.
        branch: Vec<SmolStr>,
    },
    /// Intersections need a non-zero, even number of branches.
    #[display("Intersection {intersection} has {branches} branches, expected a non-zero even number.")]
    BranchCount {
        /// The intersection name.
        intersection: SmolStr,
        /// Its number of branches.
        branches: usize,
    },
    /// A position name is used twice.
    #[display("Position '{name}' appears more than once in the nanowire.")]
    DuplicatePosition {
        /// The repeated name.
        name: SmolStr,
    },
    /// A position name is not part of the nanowire.
    #[display("Unknown nanowire position '{name}'.")]
    UnknownPosition {
        /// The requested name.
        name: SmolStr,
    },
    /// Two particles were placed on the same position.
    #[display("Particles {} and {} both occupy position '{name}'.", particles[0], particles[1])]
    SharedPosition {
        /// The shared position.
        name: SmolStr,
        /// The colliding particles.
        particles: [ParticleId; 2],
    },
    /// A vertex referenced by the layout is missing from the wire graph.
    #[display("Vertex '{name}' is missing from the wire graph.")]
    MissingVertex {
        /// The missing vertex.
        name: SmolStr,
    },
    /// The wire graph is invalid.
    #[from]
    Route(RouteError),
}
