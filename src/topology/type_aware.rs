use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;

use crate::primitives::parallel::ParallelRuntime;
use crate::types::{Edge, EntityTypeId, Node, Result, TrellisError};

use super::csr::Topology;
use super::persist::TopologyDescriptor;
use super::shuffle::EdgeShuffleTopology;
use super::type_map::CondensedTypeMap;
use super::{AdjacencyView, EdgeSortKind, TopologyKind};

/// Edge-shuffle view sorted by edge type, extended with a dense per-type
/// adjacency table.
///
/// `per_type_adj[n*T + t]` is one past the last edge of node `n` whose dense
/// type index is `t`; the range base for `t == 0` is the node's first edge.
/// Nodes without edges of a type get an empty half-open range.
pub struct EdgeTypeAwareTopology {
    base: Arc<EdgeShuffleTopology>,
    type_map: Arc<CondensedTypeMap>,
    per_type_adj: Vec<Edge>,
}

impl AdjacencyView for EdgeTypeAwareTopology {
    fn csr(&self) -> &Topology {
        self.base.csr()
    }
}

impl EdgeTypeAwareTopology {
    /// Builds the per-type index over a by-type-sorted shuffle.
    pub fn make_from(
        types: &dyn super::TypeSource,
        type_map: Arc<CondensedTypeMap>,
        base: Arc<EdgeShuffleTopology>,
        rt: &ParallelRuntime,
    ) -> Result<Self> {
        if !base.has_edges_sorted_by(EdgeSortKind::ByEdgeType) {
            return Err(TrellisError::AssertionFailed(
                "per-type adjacency requires edges sorted by edge type".into(),
            ));
        }
        let per_type_adj = build_per_type_index(types, &type_map, &base, rt)?;
        Ok(Self {
            base,
            type_map,
            per_type_adj,
        })
    }

    /// Edges of node `n` with dense type index `t`, in O(1).
    pub fn out_edges_of_type(&self, n: Node, t: u32) -> Range<Edge> {
        let num_types = self.type_map.num_unique_types();
        debug_assert!((t as usize) < num_types);
        let row = n as usize * num_types;
        let begin = if t == 0 {
            self.out_edges(n).start
        } else {
            self.per_type_adj[row + t as usize - 1]
        };
        begin..self.per_type_adj[row + t as usize]
    }

    /// Edges of node `n` with the given sparse type id; empty when the type
    /// is not present in the graph.
    pub fn out_edges_for(&self, n: Node, ty: EntityTypeId) -> Range<Edge> {
        match self.type_map.index_of(ty) {
            Some(t) => self.out_edges_of_type(n, t),
            None => 0..0,
        }
    }

    pub fn typed_degree(&self, n: Node, t: u32) -> u64 {
        let range = self.out_edges_of_type(n, t);
        range.end - range.start
    }

    pub fn type_map(&self) -> &Arc<CondensedTypeMap> {
        &self.type_map
    }

    /// The by-type-sorted shuffle this view extends.
    pub fn edge_shuffle(&self) -> &Arc<EdgeShuffleTopology> {
        &self.base
    }

    pub fn transpose_state(&self) -> super::TransposeKind {
        self.base.transpose_state()
    }

    pub fn has_transpose_state(&self, kind: super::TransposeKind) -> bool {
        self.base.has_transpose_state(kind)
    }

    pub fn has_edges_sorted_by(&self, kind: EdgeSortKind) -> bool {
        self.base.has_edges_sorted_by(kind)
    }

    pub fn to_descriptor(&self) -> TopologyDescriptor {
        TopologyDescriptor {
            kind: TopologyKind::EdgeTypeAware,
            transpose: self.base.transpose_state(),
            edge_sort: self.base.edge_sort_state(),
            node_sort: super::NodeSortKind::Any,
            num_nodes: self.num_nodes() as u64,
            adj_indices: self.per_type_adj.clone(),
            dests: self.csr().dests().to_vec(),
            edge_prop_indices: self.csr().edge_prop_indices().to_vec(),
            node_prop_indices: Vec::new(),
            index_to_type: self
                .type_map
                .index_to_type_map()
                .iter()
                .map(|ty| ty.0)
                .collect(),
        }
    }

    /// Rebuilds the view from a persisted per-type table over a freshly
    /// sorted shuffle. The descriptor must agree with the shuffle's
    /// dimensions and with the current type map; a disagreement means the
    /// persisted view is out of date.
    pub fn from_descriptor(
        desc: TopologyDescriptor,
        type_map: Arc<CondensedTypeMap>,
        base: Arc<EdgeShuffleTopology>,
    ) -> Result<Self> {
        if desc.kind != TopologyKind::EdgeTypeAware {
            return Err(TrellisError::FormatMismatch(format!(
                "expected an edge-type-aware descriptor, found {:?}",
                desc.kind
            )));
        }
        if !base.has_edges_sorted_by(EdgeSortKind::ByEdgeType) {
            return Err(TrellisError::AssertionFailed(
                "per-type adjacency requires edges sorted by edge type".into(),
            ));
        }
        let num_types = type_map.num_unique_types();
        let expected_len = base.num_nodes() * num_types;
        if !type_map.matches(&desc.index_to_type)
            || desc.num_nodes as usize != base.num_nodes()
            || desc.dests.len() != base.num_edges()
            || desc.adj_indices.len() != expected_len
        {
            return Err(TrellisError::FormatMismatch(
                "persisted edge-type-aware topology is out of date".into(),
            ));
        }
        Ok(Self {
            base,
            type_map,
            per_type_adj: desc.adj_indices,
        })
    }
}

fn build_per_type_index(
    types: &dyn super::TypeSource,
    type_map: &CondensedTypeMap,
    topo: &EdgeShuffleTopology,
    rt: &ParallelRuntime,
) -> Result<Vec<Edge>> {
    if topo.num_nodes() == 0 {
        if topo.num_edges() != 0 {
            return Err(TrellisError::AssertionFailed(
                "graph has edges but no nodes".into(),
            ));
        }
        return Ok(Vec::new());
    }
    let num_types = type_map.num_unique_types();
    if num_types == 0 {
        if topo.num_edges() != 0 {
            return Err(TrellisError::AssertionFailed(
                "graph has edges but no edge types".into(),
            ));
        }
        return Ok(Vec::new());
    }

    let mut per_type_adj = vec![0 as Edge; topo.num_nodes() * num_types];
    rt.install(|| {
        per_type_adj
            .par_chunks_mut(num_types)
            .enumerate()
            .for_each(|(node, row)| {
                // Walk this node's type-sorted edges; each time the type
                // advances, close out the skipped indices at the current
                // edge.
                let mut index = 0usize;
                for e in topo.out_edges(node as Node) {
                    let ty = types.edge_type(topo.edge_property_index(e));
                    while ty != type_map.type_of(index as u32) {
                        row[index] = e;
                        index += 1;
                        debug_assert!(index < num_types);
                    }
                }
                let end = topo.out_edges(node as Node).end;
                while index < num_types {
                    row[index] = end;
                    index += 1;
                }
            });
    });
    Ok(per_type_adj)
}
