//! Connectivity of the nanowire network and shortest-path routing.
//!
//! The wire is represented as a symmetric adjacency matrix over named
//! vertices. Vertices are the particle positions plus one synthetic vertex
//! per intersection. Routing is a Dijkstra search whose tie-breaks are fully
//! deterministic, so that movement sequences can be reproduced.

use std::cmp::Reverse;

use derive_more::{Display, Error};
use indexmap::IndexSet;
use itertools::Itertools;
use priority_queue::PriorityQueue;
use smol_str::SmolStr;

/// A validated square, symmetric adjacency matrix.
///
/// A zero entry means there is no wire between two vertices. Any other value
/// is the cost of crossing that wire.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AdjacencyMatrix {
    rows: Vec<Vec<u32>>,
}

impl AdjacencyMatrix {
    /// Validate and wrap a raw matrix.
    pub fn new(rows: Vec<Vec<u32>>) -> Result<Self, RouteError> {
        validate_matrix(&rows)?;
        Ok(Self { rows })
    }

    /// Build the matrix of an unweighted graph from its edge list.
    pub fn from_edges(
        size: usize,
        edges: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, RouteError> {
        let mut rows = vec![vec![0; size]; size];
        for (a, b) in edges {
            if a >= size || b >= size {
                return Err(RouteError::IndexOutOfBounds {
                    index: a.max(b),
                    size,
                });
            }
            rows[a][b] = 1;
            rows[b][a] = 1;
        }
        Ok(Self { rows })
    }

    /// Number of vertices.
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// The raw rows of the matrix.
    pub fn rows(&self) -> &[Vec<u32>] {
        &self.rows
    }

    /// Cost of the wire between `a` and `b`, if they are connected.
    pub fn weight(&self, a: usize, b: usize) -> Option<u32> {
        match self.rows.get(a)?.get(b)? {
            0 => None,
            w => Some(*w),
        }
    }

    /// Shortest path between two vertex indices, both ends included.
    pub fn route(&self, start: usize, end: usize) -> Result<Vec<usize>, RouteError> {
        shortest_path(&self.rows, start, end)
    }
}

/// Shortest path between `start` and `end` over a raw adjacency matrix.
///
/// The matrix is validated first. Among vertices at equal distance the one
/// with the lowest index is settled first, and a vertex reachable through
/// several predecessors at equal cost keeps the one with the fewest hops.
pub fn route(matrix: &[Vec<u32>], start: usize, end: usize) -> Result<Vec<usize>, RouteError> {
    validate_matrix(matrix)?;
    shortest_path(matrix, start, end)
}

/// Check that a matrix is square and symmetric.
pub fn validate_matrix(matrix: &[Vec<u32>]) -> Result<(), RouteError> {
    let size = matrix.len();
    if let Some((row, cols)) = matrix
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != size)
        .map(|(i, row)| (i, row.len()))
    {
        return Err(RouteError::MalformedTopology {
            reason: format!("row {row} has {cols} columns, expected {size}"),
        });
    }
    if let Some((i, j)) = (0..size)
        .tuple_combinations()
        .find(|&(i, j)| matrix[i][j] != matrix[j][i])
    {
        return Err(RouteError::MalformedTopology {
            reason: format!("entries ({i}, {j}) and ({j}, {i}) differ"),
        });
    }
    Ok(())
}

fn shortest_path(matrix: &[Vec<u32>], start: usize, end: usize) -> Result<Vec<usize>, RouteError> {
    let size = matrix.len();
    for index in [start, end] {
        if index >= size {
            return Err(RouteError::IndexOutOfBounds { index, size });
        }
    }

    let mut dist: Vec<Option<u64>> = vec![None; size];
    let mut hops = vec![0usize; size];
    let mut prev: Vec<Option<usize>> = vec![None; size];
    let mut settled = vec![false; size];
    let mut queue = PriorityQueue::new();

    dist[start] = Some(0);
    queue.push(start, Reverse((0u64, start)));

    while let Some((u, Reverse((d, _)))) = queue.pop() {
        settled[u] = true;
        if u == end {
            break;
        }
        for (v, &w) in matrix[u].iter().enumerate() {
            if w == 0 || settled[v] {
                continue;
            }
            let candidate = d + u64::from(w);
            match dist[v] {
                Some(known) if candidate > known => {}
                Some(known) if candidate == known => {
                    if hops[u] + 1 < hops[v] {
                        prev[v] = Some(u);
                        hops[v] = hops[u] + 1;
                    }
                }
                _ => {
                    dist[v] = Some(candidate);
                    prev[v] = Some(u);
                    hops[v] = hops[u] + 1;
                    queue.push_increase(v, Reverse((candidate, v)));
                }
            }
        }
    }

    if !settled[end] {
        return Err(RouteError::NoPathFound { start, end });
    }
    let mut path = vec![end];
    let mut current = end;
    while let Some(p) = prev[current] {
        path.push(p);
        current = p;
    }
    path.reverse();
    Ok(path)
}

/// The nanowire connectivity graph, with named vertices.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct WireGraph {
    vertices: IndexSet<SmolStr>,
    matrix: AdjacencyMatrix,
}

impl WireGraph {
    /// Create a graph from a vertex list and its adjacency matrix.
    pub fn new(
        vertices: impl IntoIterator<Item = impl Into<SmolStr>>,
        matrix: AdjacencyMatrix,
    ) -> Result<Self, RouteError> {
        let vertices: IndexSet<SmolStr> = vertices.into_iter().map(Into::into).collect();
        if vertices.len() != matrix.size() {
            return Err(RouteError::MalformedTopology {
                reason: format!(
                    "{} distinct vertex names for a matrix of size {}",
                    vertices.len(),
                    matrix.size()
                ),
            });
        }
        Ok(Self { vertices, matrix })
    }

    /// The vertex names, in matrix order.
    pub fn vertices(&self) -> impl ExactSizeIterator<Item = &SmolStr> + '_ {
        self.vertices.iter()
    }

    /// The underlying adjacency matrix.
    pub fn matrix(&self) -> &AdjacencyMatrix {
        &self.matrix
    }

    /// Whether a vertex with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.vertices.contains(name)
    }

    /// Matrix index of a named vertex.
    pub fn index_of(&self, name: &str) -> Result<usize, RouteError> {
        self.vertices
            .get_index_of(name)
            .ok_or_else(|| RouteError::UnknownVertex { name: name.into() })
    }

    /// Name of the vertex at `index`.
    pub fn name(&self, index: usize) -> Result<&SmolStr, RouteError> {
        self.vertices
            .get_index(index)
            .ok_or(RouteError::IndexOutOfBounds {
                index,
                size: self.vertices.len(),
            })
    }

    /// Shortest path between two named vertices, as vertex names.
    pub fn route(&self, start: &str, end: &str) -> Result<Vec<SmolStr>, RouteError> {
        let path = self.matrix.route(self.index_of(start)?, self.index_of(end)?)?;
        self.path_names(&path)
    }

    /// Number of wire segments crossed when moving from `start` to `end`.
    pub fn steps(&self, start: &str, end: &str) -> Result<usize, RouteError> {
        Ok(self.route(start, end)?.len() - 1)
    }

    /// Translate a path of indices into vertex names.
    pub fn path_names(&self, path: &[usize]) -> Result<Vec<SmolStr>, RouteError> {
        path.iter().map(|&i| self.name(i).cloned()).collect()
    }
}

/// Errors raised while routing over the nanowire graph.
#[derive(Debug, Display, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouteError {
    /// The adjacency matrix is not square and symmetric.
    #[display("Malformed nanowire topology: {reason}.")]
    MalformedTopology {
        /// What is wrong with the matrix.
        reason: String,
    },
    /// The two vertices are not connected.
    #[display("No path between vertices {start} and {end}.")]
    NoPathFound {
        /// The starting vertex.
        start: usize,
        /// The target vertex.
        end: usize,
    },
    /// A vertex name is not part of the graph.
    #[display("Unknown nanowire vertex '{name}'.")]
    UnknownVertex {
        /// The requested name.
        name: SmolStr,
    },
    /// A vertex index is outside the matrix.
    #[display("Vertex index {index} is out of bounds for a graph of {size} vertices.")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The number of vertices.
        size: usize,
    },
}
