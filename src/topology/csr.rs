use std::ops::Range;

use rand::Rng;

use crate::primitives::parallel::ParallelRuntime;
use crate::types::{Edge, Node, PropertyIndex, Result, TrellisError};

use super::AdjacencyView;

/// Immutable compressed-sparse-row adjacency.
///
/// `adj_indices[i]` is one past the last edge of node `i`; node `i`'s edges
/// occupy `[adj_indices[i-1], adj_indices[i])` with an implicit zero before
/// node 0. `dests` holds each edge's destination in whatever order the
/// owning view established. Empty property-index vectors mean the identity
/// mapping into the property table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    adj_indices: Vec<Edge>,
    dests: Vec<Node>,
    edge_prop_indices: Vec<PropertyIndex>,
    node_prop_indices: Vec<PropertyIndex>,
}

impl Topology {
    /// Builds a base topology from offsets and destinations, validating the
    /// CSR invariants.
    pub fn new(adj_indices: Vec<Edge>, dests: Vec<Node>) -> Result<Self> {
        Self::from_parts(adj_indices, dests, Vec::new(), Vec::new())
    }

    /// Builds a topology with explicit property permutations. Pass empty
    /// vectors for identity mappings.
    pub fn from_parts(
        adj_indices: Vec<Edge>,
        dests: Vec<Node>,
        edge_prop_indices: Vec<PropertyIndex>,
        node_prop_indices: Vec<PropertyIndex>,
    ) -> Result<Self> {
        let num_nodes = adj_indices.len();
        let num_edges = dests.len();

        let mut prev = 0u64;
        for &bound in &adj_indices {
            if bound < prev {
                return Err(TrellisError::InvalidArgument(
                    "adjacency offsets must be non-decreasing".into(),
                ));
            }
            prev = bound;
        }
        if prev != num_edges as u64 {
            return Err(TrellisError::InvalidArgument(format!(
                "last adjacency offset {prev} does not match edge count {num_edges}"
            )));
        }
        if let Some(&bad) = dests.iter().find(|&&d| d as usize >= num_nodes) {
            return Err(TrellisError::InvalidArgument(format!(
                "edge destination {bad} out of range for {num_nodes} nodes"
            )));
        }
        if !edge_prop_indices.is_empty() && edge_prop_indices.len() != num_edges {
            return Err(TrellisError::InvalidArgument(format!(
                "edge property map holds {} entries for {num_edges} edges",
                edge_prop_indices.len()
            )));
        }
        if !node_prop_indices.is_empty() && node_prop_indices.len() != num_nodes {
            return Err(TrellisError::InvalidArgument(format!(
                "node property map holds {} entries for {num_nodes} nodes",
                node_prop_indices.len()
            )));
        }

        Ok(Self {
            adj_indices,
            dests,
            edge_prop_indices,
            node_prop_indices,
        })
    }

    /// Constructor for callers that established the invariants themselves.
    pub(crate) fn from_raw(
        adj_indices: Vec<Edge>,
        dests: Vec<Node>,
        edge_prop_indices: Vec<PropertyIndex>,
        node_prop_indices: Vec<PropertyIndex>,
    ) -> Self {
        debug_assert_eq!(
            adj_indices.last().copied().unwrap_or(0),
            dests.len() as u64
        );
        Self {
            adj_indices,
            dests,
            edge_prop_indices,
            node_prop_indices,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.adj_indices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.dests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adj_indices.is_empty()
    }

    pub fn out_degree(&self, n: Node) -> u64 {
        let range = self.out_edges(n);
        range.end - range.start
    }

    /// Edge handles of node `n` as a half-open range.
    pub fn out_edges(&self, n: Node) -> Range<Edge> {
        let n = n as usize;
        let begin = if n == 0 { 0 } else { self.adj_indices[n - 1] };
        begin..self.adj_indices[n]
    }

    pub fn out_edge_dst(&self, e: Edge) -> Node {
        self.dests[e as usize]
    }

    pub fn edge_property_index(&self, e: Edge) -> PropertyIndex {
        if self.edge_prop_indices.is_empty() {
            e
        } else {
            self.edge_prop_indices[e as usize]
        }
    }

    pub fn node_property_index(&self, n: Node) -> PropertyIndex {
        if self.node_prop_indices.is_empty() {
            n as PropertyIndex
        } else {
            self.node_prop_indices[n as usize]
        }
    }

    pub fn nodes(&self) -> Range<Node> {
        0..self.num_nodes() as Node
    }

    pub fn edges(&self) -> Range<Edge> {
        0..self.num_edges() as Edge
    }

    pub fn adj_indices(&self) -> &[Edge] {
        &self.adj_indices
    }

    pub fn dests(&self) -> &[Node] {
        &self.dests
    }

    pub fn edge_prop_indices(&self) -> &[PropertyIndex] {
        &self.edge_prop_indices
    }

    pub fn node_prop_indices(&self) -> &[PropertyIndex] {
        &self.node_prop_indices
    }

    /// Disjoint borrows for in-place edge reordering.
    pub(crate) fn edges_mut(&mut self) -> (&[Edge], &mut [Node], &mut [PropertyIndex]) {
        (
            &self.adj_indices,
            &mut self.dests,
            &mut self.edge_prop_indices,
        )
    }

    /// Random graph with a constant out-degree, for benches and stress
    /// tests. Destinations are drawn uniformly; multi-edges are possible.
    pub fn uniform_random(
        num_nodes: usize,
        edges_per_node: usize,
        rt: &ParallelRuntime,
    ) -> Result<Self> {
        if num_nodes == 0 {
            return Ok(Self::default());
        }
        if edges_per_node == 0 || edges_per_node > num_nodes {
            return Err(TrellisError::InvalidArgument(format!(
                "edges_per_node {edges_per_node} out of range for {num_nodes} nodes"
            )));
        }

        let mut adj_indices = vec![edges_per_node as Edge; num_nodes];
        rt.prefix_sum(&mut adj_indices);

        let num_edges = num_nodes * edges_per_node;
        let mut rng = rand::thread_rng();
        let dests: Vec<Node> = (0..num_edges)
            .map(|_| rng.gen_range(0..num_nodes as Node))
            .collect();

        Ok(Self::from_raw(adj_indices, dests, Vec::new(), Vec::new()))
    }
}

impl AdjacencyView for Topology {
    fn csr(&self) -> &Topology {
        self
    }
}
