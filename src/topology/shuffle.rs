use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Once;

use rayon::prelude::*;
use tracing::warn;

use crate::primitives::parallel::{split_segments_mut, ParallelRuntime};
use crate::types::{Edge, Node, PropertyIndex, Result, TrellisError};

use super::csr::Topology;
use super::persist::TopologyDescriptor;
use super::{AdjacencyView, EdgeSortKind, NodeSortKind, TopologyKind, TransposeKind, TypeSource};

/// Degree above which `find_edge` switches from a linear scan to binary
/// search on destination-sorted adjacency.
const BINARY_SEARCH_THRESHOLD: u64 = 64;

static DEGRADED_SCAN_WARNING: Once = Once::new();

/// CSR view whose edges have been reordered and optionally reversed.
///
/// The edge property map is always materialized here: once edges move, their
/// handles no longer equal their property-table rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeShuffleTopology {
    csr: Topology,
    transpose: TransposeKind,
    edge_sort: EdgeSortKind,
}

impl AdjacencyView for EdgeShuffleTopology {
    fn csr(&self) -> &Topology {
        &self.csr
    }
}

impl EdgeShuffleTopology {
    /// Copies `base` without reordering, materializing the identity edge
    /// property map.
    pub fn original_copy(base: &Topology, rt: &ParallelRuntime) -> Self {
        let num_nodes = base.num_nodes();
        let num_edges = base.num_edges();

        let mut adj_indices = vec![0u64; num_nodes];
        rt.copy(base.adj_indices(), &mut adj_indices);
        let mut dests = vec![0 as Node; num_edges];
        rt.copy(base.dests(), &mut dests);

        let mut edge_prop_indices = vec![0u64; num_edges];
        if base.edge_prop_indices().is_empty() {
            rt.iota(&mut edge_prop_indices, 0);
        } else {
            rt.copy(base.edge_prop_indices(), &mut edge_prop_indices);
        }

        Self {
            csr: Topology::from_raw(
                adj_indices,
                dests,
                edge_prop_indices,
                base.node_prop_indices().to_vec(),
            ),
            transpose: TransposeKind::No,
            edge_sort: EdgeSortKind::Any,
        }
    }

    /// Builds the reversed-edge view of `base`.
    ///
    /// In-degrees are counted with atomic adds, prefix-summed into the new
    /// offsets, and every edge is scattered to its destination's block with a
    /// fetch-and-add write cursor. Edge order within a block is unspecified
    /// until a later sort.
    pub fn transpose_copy(base: &Topology, rt: &ParallelRuntime) -> Self {
        if base.is_empty() {
            return Self {
                csr: Topology::default(),
                transpose: TransposeKind::Yes,
                edge_sort: EdgeSortKind::Any,
            };
        }

        let num_nodes = base.num_nodes();
        let num_edges = base.num_edges();

        let counters: Vec<AtomicU64> = std::iter::repeat_with(|| AtomicU64::new(0))
            .take(num_nodes)
            .collect();
        rt.do_all(num_edges, |e| {
            let dst = base.out_edge_dst(e as Edge) as usize;
            counters[dst].fetch_add(1, Ordering::Relaxed);
        });

        let mut adj_indices: Vec<u64> =
            counters.iter().map(|c| c.load(Ordering::Relaxed)).collect();
        rt.prefix_sum(&mut adj_indices);

        // Write cursor per destination, seeded with each block's start.
        let scatter: Vec<AtomicU64> = std::iter::repeat_with(|| AtomicU64::new(0))
            .take(num_nodes)
            .collect();
        rt.do_all(num_nodes, |i| {
            if i > 0 {
                scatter[i].store(adj_indices[i - 1], Ordering::Relaxed);
            }
        });

        let dest_cells: Vec<AtomicU32> = std::iter::repeat_with(|| AtomicU32::new(0))
            .take(num_edges)
            .collect();
        let prop_cells: Vec<AtomicU64> = std::iter::repeat_with(|| AtomicU64::new(0))
            .take(num_edges)
            .collect();
        rt.do_all(num_nodes, |src| {
            for e in base.out_edges(src as Node) {
                let dst = base.out_edge_dst(e) as usize;
                let w = scatter[dst].fetch_add(1, Ordering::Relaxed) as usize;
                dest_cells[w].store(src as Node, Ordering::Relaxed);
                prop_cells[w].store(base.edge_property_index(e), Ordering::Relaxed);
            }
        });

        let dests: Vec<Node> = dest_cells.into_iter().map(AtomicU32::into_inner).collect();
        let edge_prop_indices: Vec<PropertyIndex> =
            prop_cells.into_iter().map(AtomicU64::into_inner).collect();

        Self {
            csr: Topology::from_raw(adj_indices, dests, edge_prop_indices, Vec::new()),
            transpose: TransposeKind::Yes,
            edge_sort: EdgeSortKind::Any,
        }
    }

    /// Builds the view matching `transpose` and `edge_sort` from scratch.
    pub fn make(
        base: &Topology,
        transpose: TransposeKind,
        edge_sort: EdgeSortKind,
        types: &dyn TypeSource,
        rt: &ParallelRuntime,
    ) -> Self {
        let mut topo = match transpose {
            TransposeKind::No => Self::original_copy(base, rt),
            TransposeKind::Yes => Self::transpose_copy(base, rt),
        };
        match edge_sort {
            EdgeSortKind::Any => {}
            EdgeSortKind::ByDestId => topo.sort_edges_by_dest(rt),
            EdgeSortKind::ByEdgeType | EdgeSortKind::ByEdgeTypeThenDest => {
                topo.sort_edges_by_type_then_dest(types, rt)
            }
        }
        topo
    }

    /// Sorts each node's edges by destination id.
    pub fn sort_edges_by_dest(&mut self, rt: &ParallelRuntime) {
        joint_sort_edges(&mut self.csr, rt, &|_, dst| dst);
        self.edge_sort = EdgeSortKind::ByDestId;
    }

    /// Sorts each node's edges by `(edge type, destination id)`.
    pub fn sort_edges_by_type_then_dest(&mut self, types: &dyn TypeSource, rt: &ParallelRuntime) {
        joint_sort_edges(&mut self.csr, rt, &|prop, dst| (types.edge_type(prop), dst));
        self.edge_sort = EdgeSortKind::ByEdgeTypeThenDest;
    }

    /// Reserved: sorting edges by the destination node's type. Declared by
    /// the storage format but not yet implemented.
    pub fn sort_edges_by_dest_type(
        &mut self,
        _types: &dyn TypeSource,
        _node_prop_indices: &[PropertyIndex],
    ) -> Result<()> {
        Err(TrellisError::Unsupported(
            "sorting edges by destination node type",
        ))
    }

    /// Finds one edge `src -> dst`, or `None`.
    ///
    /// Binary search requires destination-sorted edges; anything else gets a
    /// linear scan, with a one-shot warning once a scan crosses the search
    /// threshold.
    pub fn find_edge(&self, src: Node, dst: Node) -> Option<Edge> {
        let range = self.out_edges(src);
        let degree = range.end - range.start;
        let sorted = self.has_edges_sorted_by(EdgeSortKind::ByDestId);

        if degree > BINARY_SEARCH_THRESHOLD && sorted {
            let slice = &self.csr.dests()[range.start as usize..range.end as usize];
            let at = slice.partition_point(|&d| d < dst);
            return (at < slice.len() && slice[at] == dst).then(|| range.start + at as u64);
        }

        if degree > BINARY_SEARCH_THRESHOLD {
            DEGRADED_SCAN_WARNING.call_once(|| {
                warn!(
                    degree,
                    "find_edge scanning a high-degree node; edges not sorted by destination"
                );
            });
        }
        range.clone().find(|&e| self.out_edge_dst(e) == dst)
    }

    /// All edges `src -> dst` as a half-open range. Requires
    /// destination-sorted edges.
    pub fn find_all_edges(&self, src: Node, dst: Node) -> std::ops::Range<Edge> {
        let range = self.out_edges(src);
        if range.is_empty() {
            return range;
        }
        assert!(
            self.has_edges_sorted_by(EdgeSortKind::ByDestId),
            "find_all_edges requires edges sorted by destination id"
        );

        let slice = &self.csr.dests()[range.start as usize..range.end as usize];
        let lo = slice.partition_point(|&d| d < dst);
        let hi = slice.partition_point(|&d| d <= dst);
        range.start + lo as u64..range.start + hi as u64
    }

    pub fn transpose_state(&self) -> TransposeKind {
        self.transpose
    }

    pub fn edge_sort_state(&self) -> EdgeSortKind {
        self.edge_sort
    }

    pub fn has_transpose_state(&self, kind: TransposeKind) -> bool {
        self.transpose == kind
    }

    pub fn has_edges_sorted_by(&self, kind: EdgeSortKind) -> bool {
        self.edge_sort.satisfies(kind)
    }

    pub fn to_descriptor(&self) -> TopologyDescriptor {
        TopologyDescriptor {
            kind: TopologyKind::EdgeShuffle,
            transpose: self.transpose,
            edge_sort: self.edge_sort,
            node_sort: NodeSortKind::Any,
            num_nodes: self.num_nodes() as u64,
            adj_indices: self.csr.adj_indices().to_vec(),
            dests: self.csr.dests().to_vec(),
            edge_prop_indices: self.csr.edge_prop_indices().to_vec(),
            node_prop_indices: Vec::new(),
            index_to_type: Vec::new(),
        }
    }

    pub fn from_descriptor(desc: TopologyDescriptor, rt: &ParallelRuntime) -> Result<Self> {
        if desc.kind != TopologyKind::EdgeShuffle {
            return Err(TrellisError::FormatMismatch(format!(
                "expected an edge-shuffle descriptor, found {:?}",
                desc.kind
            )));
        }
        let num_edges = desc.dests.len();
        let mut edge_prop_indices = desc.edge_prop_indices;
        if edge_prop_indices.is_empty() && num_edges > 0 {
            edge_prop_indices = vec![0u64; num_edges];
            rt.iota(&mut edge_prop_indices, 0);
        }
        let csr = Topology::from_parts(
            desc.adj_indices,
            desc.dests,
            edge_prop_indices,
            desc.node_prop_indices,
        )
        .map_err(|e| TrellisError::FormatMismatch(format!("bad edge-shuffle arrays: {e}")))?;
        Ok(Self {
            csr,
            transpose: desc.transpose,
            edge_sort: desc.edge_sort,
        })
    }
}

/// CSR view with both a node permutation and reordered edges.
///
/// `node_prop_indices` maps each renumbered node back to its original
/// property-table row; destinations are rewritten into the new numbering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShuffleTopology {
    csr: Topology,
    transpose: TransposeKind,
    edge_sort: EdgeSortKind,
    node_sort: NodeSortKind,
}

impl AdjacencyView for ShuffleTopology {
    fn csr(&self) -> &Topology {
        &self.csr
    }
}

impl ShuffleTopology {
    /// Permutes `seed`'s nodes per `node_sort`, rewrites destinations into
    /// the new numbering, then re-sorts edges per `edge_sort`. Edges must be
    /// re-sorted regardless of the seed's sort state because every
    /// destination id changes.
    pub fn make_from_topo(
        seed: &EdgeShuffleTopology,
        node_sort: NodeSortKind,
        edge_sort: EdgeSortKind,
        types: &dyn TypeSource,
        rt: &ParallelRuntime,
    ) -> Self {
        let num_nodes = seed.num_nodes();
        let num_edges = seed.num_edges();

        let mut perm: Vec<Node> = (0..num_nodes as Node).collect();
        match node_sort {
            NodeSortKind::Any => {}
            NodeSortKind::ByDegree => rt.install(|| {
                // Descending degree; ties by node id for determinism.
                perm.par_sort_by(|&a, &b| {
                    seed.out_degree(b)
                        .cmp(&seed.out_degree(a))
                        .then(a.cmp(&b))
                });
            }),
            NodeSortKind::ByNodeType => rt.install(|| {
                perm.par_sort_by(|&a, &b| {
                    let ka = types.node_type(seed.node_property_index(a));
                    let kb = types.node_type(seed.node_property_index(b));
                    ka.cmp(&kb).then(a.cmp(&b))
                });
            }),
        }

        let inv_cells: Vec<AtomicU32> = std::iter::repeat_with(|| AtomicU32::new(0))
            .take(num_nodes)
            .collect();
        rt.do_all(num_nodes, |i| {
            inv_cells[perm[i] as usize].store(i as Node, Ordering::Relaxed);
        });
        let inv: Vec<Node> = inv_cells.iter().map(|c| c.load(Ordering::Relaxed)).collect();

        let mut adj_indices = vec![0u64; num_nodes];
        rt.install(|| {
            adj_indices
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, slot)| *slot = seed.out_degree(perm[i]));
        });
        rt.prefix_sum(&mut adj_indices);

        let mut pairs: Vec<(PropertyIndex, Node)> = vec![(0, 0); num_edges];
        let segments = split_segments_mut(&mut pairs, &adj_indices);
        rt.install(|| {
            segments
                .into_par_iter()
                .enumerate()
                .for_each(|(new_node, segment)| {
                    let old_node = perm[new_node];
                    for (slot, e) in segment.iter_mut().zip(seed.out_edges(old_node)) {
                        *slot = (
                            seed.edge_property_index(e),
                            inv[seed.out_edge_dst(e) as usize],
                        );
                    }
                });
        });

        let mut dests = vec![0 as Node; num_edges];
        let mut edge_prop_indices = vec![0u64; num_edges];
        rt.install(|| {
            dests
                .par_iter_mut()
                .zip(edge_prop_indices.par_iter_mut())
                .zip(pairs.par_iter())
                .for_each(|((d, p), &(prop, dst))| {
                    *d = dst;
                    *p = prop;
                });
        });

        let mut node_prop_indices = vec![0u64; num_nodes];
        rt.install(|| {
            node_prop_indices
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, slot)| *slot = seed.node_property_index(perm[i]));
        });

        let mut csr = Topology::from_raw(adj_indices, dests, edge_prop_indices, node_prop_indices);
        let edge_sort_state = match edge_sort {
            EdgeSortKind::Any => EdgeSortKind::Any,
            EdgeSortKind::ByDestId => {
                joint_sort_edges(&mut csr, rt, &|_, dst| dst);
                EdgeSortKind::ByDestId
            }
            EdgeSortKind::ByEdgeType | EdgeSortKind::ByEdgeTypeThenDest => {
                joint_sort_edges(&mut csr, rt, &|prop, dst| (types.edge_type(prop), dst));
                EdgeSortKind::ByEdgeTypeThenDest
            }
        };

        Self {
            csr,
            transpose: seed.transpose_state(),
            edge_sort: edge_sort_state,
            node_sort,
        }
    }

    pub fn sorted_by_degree(
        seed: &EdgeShuffleTopology,
        edge_sort: EdgeSortKind,
        types: &dyn TypeSource,
        rt: &ParallelRuntime,
    ) -> Self {
        Self::make_from_topo(seed, NodeSortKind::ByDegree, edge_sort, types, rt)
    }

    pub fn sorted_by_node_type(
        seed: &EdgeShuffleTopology,
        edge_sort: EdgeSortKind,
        types: &dyn TypeSource,
        rt: &ParallelRuntime,
    ) -> Self {
        Self::make_from_topo(seed, NodeSortKind::ByNodeType, edge_sort, types, rt)
    }

    /// Reserved: building a node-shuffled view directly from an edge-shuffle
    /// seed's arrays without recomputation. Declared by the storage format
    /// but not yet implemented.
    pub fn from_edge_shuffle(_seed: &EdgeShuffleTopology) -> Result<Self> {
        Err(TrellisError::Unsupported(
            "building a node-shuffled view in place from an edge-shuffle seed",
        ))
    }

    pub fn transpose_state(&self) -> TransposeKind {
        self.transpose
    }

    pub fn edge_sort_state(&self) -> EdgeSortKind {
        self.edge_sort
    }

    pub fn node_sort_state(&self) -> NodeSortKind {
        self.node_sort
    }

    pub fn has_transpose_state(&self, kind: TransposeKind) -> bool {
        self.transpose == kind
    }

    pub fn has_edges_sorted_by(&self, kind: EdgeSortKind) -> bool {
        self.edge_sort.satisfies(kind)
    }

    pub fn has_nodes_sorted_by(&self, kind: NodeSortKind) -> bool {
        self.node_sort.satisfies(kind)
    }

    pub fn to_descriptor(&self) -> TopologyDescriptor {
        TopologyDescriptor {
            kind: TopologyKind::Shuffle,
            transpose: self.transpose,
            edge_sort: self.edge_sort,
            node_sort: self.node_sort,
            num_nodes: self.num_nodes() as u64,
            adj_indices: self.csr.adj_indices().to_vec(),
            dests: self.csr.dests().to_vec(),
            edge_prop_indices: self.csr.edge_prop_indices().to_vec(),
            node_prop_indices: self.csr.node_prop_indices().to_vec(),
            index_to_type: Vec::new(),
        }
    }

    pub fn from_descriptor(desc: TopologyDescriptor) -> Result<Self> {
        if desc.kind != TopologyKind::Shuffle {
            return Err(TrellisError::FormatMismatch(format!(
                "expected a shuffle descriptor, found {:?}",
                desc.kind
            )));
        }
        let csr = Topology::from_parts(
            desc.adj_indices,
            desc.dests,
            desc.edge_prop_indices,
            desc.node_prop_indices,
        )
        .map_err(|e| TrellisError::FormatMismatch(format!("bad shuffle arrays: {e}")))?;
        Ok(Self {
            csr,
            transpose: desc.transpose,
            edge_sort: desc.edge_sort,
            node_sort: desc.node_sort,
        })
    }
}

/// Jointly sorts each node's `(edge_prop_indices, dests)` slice by `key`,
/// preserving the pairing. The sort is stable, so re-sorting an already
/// sorted view leaves it bit-for-bit unchanged.
fn joint_sort_edges<K: Ord>(
    csr: &mut Topology,
    rt: &ParallelRuntime,
    key: &(impl Fn(PropertyIndex, Node) -> K + Sync),
) {
    let (adj_indices, dests, edge_prop_indices) = csr.edges_mut();
    debug_assert_eq!(dests.len(), edge_prop_indices.len());

    let mut pairs: Vec<(PropertyIndex, Node)> = rt.install(|| {
        edge_prop_indices
            .par_iter()
            .zip(dests.par_iter())
            .map(|(&p, &d)| (p, d))
            .collect()
    });

    let segments = split_segments_mut(&mut pairs, adj_indices);
    rt.install(|| {
        segments
            .into_par_iter()
            .for_each(|segment| segment.sort_by_key(|&(p, d)| key(p, d)));
    });

    rt.install(|| {
        dests
            .par_iter_mut()
            .zip(edge_prop_indices.par_iter_mut())
            .zip(pairs.par_iter())
            .for_each(|((d, p), &(prop, dst))| {
                *d = dst;
                *p = prop;
            });
    });
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::topology::SliceTypeSource;
    use crate::types::EntityTypeId;

    fn runtime() -> ParallelRuntime {
        ParallelRuntime::new(4).unwrap()
    }

    fn sample() -> Topology {
        Topology::new(vec![2, 2, 3, 5], vec![1, 2, 3, 0, 2]).unwrap()
    }

    /// Multiset of `(src, dst, edge property row)` triples of a view.
    fn edge_triples(view: &impl AdjacencyView) -> BTreeMap<(Node, Node, PropertyIndex), usize> {
        let mut triples = BTreeMap::new();
        for n in view.csr().nodes() {
            for e in view.out_edges(n) {
                *triples
                    .entry((n, view.out_edge_dst(e), view.edge_property_index(e)))
                    .or_default() += 1;
            }
        }
        triples
    }

    #[test]
    fn original_copy_is_identity() {
        let rt = runtime();
        let base = sample();
        let copy = EdgeShuffleTopology::original_copy(&base, &rt);
        assert_eq!(copy.transpose_state(), TransposeKind::No);
        assert_eq!(copy.edge_sort_state(), EdgeSortKind::Any);
        assert_eq!(copy.csr().dests(), base.dests());
        assert_eq!(copy.edge_property_index(4), 4);
    }

    #[test]
    fn transpose_offsets_are_in_degree_prefix_sums() {
        let rt = runtime();
        let base = sample();
        let tposed = EdgeShuffleTopology::transpose_copy(&base, &rt);
        // In-degrees [1, 1, 2, 1] prefix-sum to [1, 2, 4, 5].
        assert_eq!(tposed.csr().adj_indices(), &[1, 2, 4, 5]);
        assert_eq!(tposed.transpose_state(), TransposeKind::Yes);
    }

    #[test]
    fn transpose_involution_is_graph_equivalent() {
        let rt = runtime();
        let base = sample();
        let once = EdgeShuffleTopology::transpose_copy(&base, &rt);
        let twice = EdgeShuffleTopology::transpose_copy(once.csr(), &rt);

        // Re-transposing restores the original (src, dst) multiset; property
        // rows in `once` point at the original table, so `twice` composes
        // through them.
        assert_eq!(edge_triples(&base), edge_triples(&twice));
    }

    #[test]
    fn transpose_of_empty_topology() {
        let rt = runtime();
        let tposed = EdgeShuffleTopology::transpose_copy(&Topology::default(), &rt);
        assert!(tposed.is_empty());
        assert_eq!(tposed.transpose_state(), TransposeKind::Yes);
    }

    #[test]
    fn sort_then_find() {
        let rt = runtime();
        let base = sample();
        let mut view = EdgeShuffleTopology::original_copy(&base, &rt);
        view.sort_edges_by_dest(&rt);

        assert_eq!(view.find_edge(0, 2), Some(1));
        assert_eq!(view.find_edge(0, 5), None);
        assert!(view.find_all_edges(1, 0).is_empty());
        assert_eq!(view.find_all_edges(3, 2), 4..5);
    }

    #[test]
    fn find_edge_scans_unsorted_views() {
        let rt = runtime();
        let base = sample();
        let view = EdgeShuffleTopology::original_copy(&base, &rt);
        assert_eq!(view.find_edge(3, 0), Some(3));
        assert_eq!(view.find_edge(3, 1), None);
    }

    #[test]
    fn find_edge_binary_search_on_high_degree() {
        let rt = runtime();
        // Two nodes; node 0 has 200 edges alternating between them.
        let num_edges = 200u64;
        let wide = Topology::new(
            vec![num_edges, num_edges],
            (0..num_edges as Node).map(|i| i % 2).collect(),
        )
        .unwrap();
        let mut view = EdgeShuffleTopology::original_copy(&wide, &rt);
        view.sort_edges_by_dest(&rt);
        assert_eq!(view.find_edge(0, 1), Some(100));
        assert_eq!(view.find_all_edges(0, 0), 0..100);
        assert!(view.find_edge(1, 0).is_none());
    }

    #[test]
    fn sort_by_dest_is_idempotent() {
        let rt = runtime();
        let base = sample();
        let mut view = EdgeShuffleTopology::transpose_copy(&base, &rt);
        view.sort_edges_by_dest(&rt);
        let snapshot = view.clone();
        view.sort_edges_by_dest(&rt);
        assert_eq!(view, snapshot);
    }

    #[test]
    fn sort_by_type_groups_edges() {
        let rt = runtime();
        let base = sample();
        let edge_types: Vec<EntityTypeId> = [7, 3, 7, 3, 7].map(EntityTypeId).to_vec();
        let node_types = vec![EntityTypeId(0); 4];
        let source = SliceTypeSource {
            edge_types: &edge_types,
            node_types: &node_types,
        };

        let mut view = EdgeShuffleTopology::original_copy(&base, &rt);
        view.sort_edges_by_type_then_dest(&source, &rt);
        assert!(view.has_edges_sorted_by(EdgeSortKind::ByEdgeType));

        for n in view.csr().nodes() {
            let keys: Vec<(EntityTypeId, Node)> = view
                .out_edges(n)
                .map(|e| {
                    (
                        source.edge_type(view.edge_property_index(e)),
                        view.out_edge_dst(e),
                    )
                })
                .collect();
            let mut sorted = keys.clone();
            sorted.sort();
            assert_eq!(keys, sorted);
        }
        // Graph is unchanged, only reordered.
        assert_eq!(
            edge_triples(&view),
            edge_triples(&EdgeShuffleTopology::original_copy(&base, &rt))
        );
    }

    #[test]
    fn shuffle_by_degree_renumbers_nodes() {
        let rt = runtime();
        let base = sample();
        let seed = EdgeShuffleTopology::original_copy(&base, &rt);
        let node_types = vec![EntityTypeId(0); 4];
        let source = SliceTypeSource {
            edge_types: &[],
            node_types: &node_types,
        };

        let shuffled =
            ShuffleTopology::sorted_by_degree(&seed, EdgeSortKind::ByDestId, &source, &rt);
        // Degrees were [2, 0, 1, 2]; descending with id tie-break puts the
        // original nodes in order 0, 3, 2, 1.
        assert_eq!(shuffled.csr().node_prop_indices(), &[0, 3, 2, 1]);
        let degrees: Vec<u64> = shuffled
            .csr()
            .nodes()
            .map(|n| shuffled.out_degree(n))
            .collect();
        assert_eq!(degrees, vec![2, 2, 1, 0]);
        assert!(shuffled.has_nodes_sorted_by(NodeSortKind::ByDegree));
        assert!(shuffled.has_edges_sorted_by(EdgeSortKind::ByDestId));

        // Same graph modulo renumbering: map destinations back through the
        // node property rows and compare multisets.
        let mut restored = BTreeMap::new();
        for n in shuffled.csr().nodes() {
            let src = shuffled.node_property_index(n) as Node;
            for e in shuffled.out_edges(n) {
                let dst = shuffled.node_property_index(shuffled.out_edge_dst(e)) as Node;
                *restored
                    .entry((src, dst, shuffled.edge_property_index(e)))
                    .or_default() += 1;
            }
        }
        assert_eq!(restored, edge_triples(&base));
    }

    #[test]
    fn shuffle_by_node_type_orders_types() {
        let rt = runtime();
        let base = sample();
        let seed = EdgeShuffleTopology::original_copy(&base, &rt);
        let node_types: Vec<EntityTypeId> = [5, 1, 5, 1].map(EntityTypeId).to_vec();
        let source = SliceTypeSource {
            edge_types: &[],
            node_types: &node_types,
        };

        let shuffled =
            ShuffleTopology::sorted_by_node_type(&seed, EdgeSortKind::Any, &source, &rt);
        // Type 1 nodes (1, 3) come before type 5 nodes (0, 2).
        assert_eq!(shuffled.csr().node_prop_indices(), &[1, 3, 0, 2]);
    }

    #[test]
    fn reserved_extension_points_are_unsupported() {
        let rt = runtime();
        let base = sample();
        let mut view = EdgeShuffleTopology::original_copy(&base, &rt);
        let source = SliceTypeSource {
            edge_types: &[],
            node_types: &[],
        };
        assert!(matches!(
            view.sort_edges_by_dest_type(&source, &[]),
            Err(TrellisError::Unsupported(_))
        ));
        assert!(matches!(
            ShuffleTopology::from_edge_shuffle(&view),
            Err(TrellisError::Unsupported(_))
        ));
    }
}
