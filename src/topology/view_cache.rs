use std::sync::Arc;

use tracing::debug;

use crate::primitives::parallel::ParallelRuntime;
use crate::types::{Result, TrellisError};

use super::csr::Topology;
use super::persist::{DescriptorStore, ShadowKey, TopologyDescriptor};
use super::shuffle::{EdgeShuffleTopology, ShuffleTopology};
use super::type_aware::EdgeTypeAwareTopology;
use super::type_map::CondensedTypeMap;
use super::{AdjacencyView, EdgeSortKind, NodeSortKind, TopologyKind, TransposeKind, TypeSource};

/// External collaborators a view lookup may need: the property graph's type
/// columns, an optional persistent descriptor store, and the worker pool.
pub struct ViewContext<'a> {
    pub types: &'a dyn TypeSource,
    pub store: Option<&'a dyn DescriptorStore>,
    pub runtime: &'a ParallelRuntime,
}

impl<'a> ViewContext<'a> {
    fn load(&self, key: ShadowKey) -> Option<TopologyDescriptor> {
        self.store.and_then(|s| s.load(&key))
    }
}

/// Memoizes the derived views of one base topology.
///
/// The cache is the sole owner of every derived view; lookups hand out
/// shared references. Construction and lookup mutate the cache and must be
/// serialized by the caller, but finished views are safe for any number of
/// concurrent readers.
pub struct ViewCache {
    base: Arc<Topology>,
    base_edge_sort: EdgeSortKind,
    edge_shuffles: Vec<Arc<EdgeShuffleTopology>>,
    shuffles: Vec<Arc<ShuffleTopology>>,
    type_aware: Vec<Arc<EdgeTypeAwareTopology>>,
    type_map: Option<Arc<CondensedTypeMap>>,
}

impl ViewCache {
    pub fn new(base: Topology) -> Self {
        Self {
            base: Arc::new(base),
            base_edge_sort: EdgeSortKind::Any,
            edge_shuffles: Vec::new(),
            shuffles: Vec::new(),
            type_aware: Vec::new(),
            type_map: None,
        }
    }

    /// The default (base) topology.
    pub fn base(&self) -> &Arc<Topology> {
        &self.base
    }

    /// Replaces the base topology. Allowed only while the current base's
    /// edge order is unconstrained; once a caller depends on a sorted
    /// default, reseating would pull the order out from under it.
    pub fn reseat_base(&mut self, new_base: Arc<Topology>, edge_sort: EdgeSortKind) -> Result<()> {
        if self.base_edge_sort != EdgeSortKind::Any {
            return Err(TrellisError::InvalidArgument(
                "cannot reseat the default topology: its edge order is already pinned".into(),
            ));
        }
        self.base = new_base;
        self.base_edge_sort = edge_sort;
        Ok(())
    }

    /// Reverts to an empty cache over a fresh empty base.
    pub fn drop_all(&mut self) {
        self.base = Arc::new(Topology::default());
        self.base_edge_sort = EdgeSortKind::Any;
        self.edge_shuffles.clear();
        self.shuffles.clear();
        self.type_aware.clear();
        self.type_map = None;
    }

    /// Build-or-get the condensed edge-type map.
    pub fn type_map(&mut self, ctx: &ViewContext<'_>) -> Arc<CondensedTypeMap> {
        if let Some(map) = &self.type_map {
            return map.clone();
        }
        let map = Arc::new(CondensedTypeMap::from_edge_types(
            &self.base,
            ctx.types,
            ctx.runtime,
        ));
        self.type_map = Some(map.clone());
        map
    }

    /// Returns the cached edge-shuffle view matching the tags, loading it
    /// from storage or synthesizing it from the base when absent.
    pub fn edge_shuffle(
        &mut self,
        ctx: &ViewContext<'_>,
        transpose: TransposeKind,
        edge_sort: EdgeSortKind,
    ) -> Result<Arc<EdgeShuffleTopology>> {
        if let Some(hit) = self
            .edge_shuffles
            .iter()
            .find(|t| t.has_transpose_state(transpose) && t.has_edges_sorted_by(edge_sort))
        {
            debug!(?transpose, ?edge_sort, "edge shuffle cache hit");
            return Ok(hit.clone());
        }

        // A type-sorted request can be answered by an edge-type-aware view's
        // inner shuffle.
        if matches!(
            edge_sort,
            EdgeSortKind::ByEdgeType | EdgeSortKind::ByEdgeTypeThenDest
        ) {
            if let Some(aware) = self.type_aware.iter().find(|t| {
                t.has_transpose_state(transpose) && t.has_edges_sorted_by(edge_sort)
            }) {
                debug!(?transpose, ?edge_sort, "serving edge shuffle from type-aware view");
                return Ok(aware.edge_shuffle().clone());
            }
        }

        let topo = self.make_edge_shuffle(ctx, transpose, edge_sort)?;
        let arc = Arc::new(topo);
        self.edge_shuffles.push(arc.clone());
        Ok(arc)
    }

    /// Like [`Self::edge_shuffle`] but removes the view from the cache and
    /// returns it by value, for constructions that consume their seed.
    pub fn pop_edge_shuffle(
        &mut self,
        ctx: &ViewContext<'_>,
        transpose: TransposeKind,
        edge_sort: EdgeSortKind,
    ) -> Result<EdgeShuffleTopology> {
        if let Some(pos) = self
            .edge_shuffles
            .iter()
            .position(|t| t.has_transpose_state(transpose) && t.has_edges_sorted_by(edge_sort))
        {
            let arc = self.edge_shuffles.remove(pos);
            // Outstanding readers keep their copy; we take ours by value.
            return Ok(Arc::try_unwrap(arc).unwrap_or_else(|shared| (*shared).clone()));
        }

        if matches!(
            edge_sort,
            EdgeSortKind::ByEdgeType | EdgeSortKind::ByEdgeTypeThenDest
        ) {
            if let Some(aware) = self.type_aware.iter().find(|t| {
                t.has_transpose_state(transpose) && t.has_edges_sorted_by(edge_sort)
            }) {
                // Aware views are never popped apart.
                return Ok((**aware.edge_shuffle()).clone());
            }
        }

        self.make_edge_shuffle(ctx, transpose, edge_sort)
    }

    fn make_edge_shuffle(
        &self,
        ctx: &ViewContext<'_>,
        transpose: TransposeKind,
        edge_sort: EdgeSortKind,
    ) -> Result<EdgeShuffleTopology> {
        let shadow = ShadowKey {
            kind: TopologyKind::EdgeShuffle,
            transpose,
            edge_sort,
            node_sort: NodeSortKind::Any,
        };
        let topo = match ctx.load(shadow) {
            Some(desc) => {
                debug!(?transpose, ?edge_sort, "loading edge shuffle from storage");
                let topo = EdgeShuffleTopology::from_descriptor(desc, ctx.runtime)?;
                self.check_dimensions(topo.csr())?;
                topo
            }
            None => {
                debug!(?transpose, ?edge_sort, "synthesizing edge shuffle");
                EdgeShuffleTopology::make(&self.base, transpose, edge_sort, ctx.types, ctx.runtime)
            }
        };
        Ok(topo)
    }

    /// Returns the cached node-and-edge shuffled view matching the tags,
    /// loading or synthesizing it when absent.
    pub fn shuffle(
        &mut self,
        ctx: &ViewContext<'_>,
        transpose: TransposeKind,
        node_sort: NodeSortKind,
        edge_sort: EdgeSortKind,
    ) -> Result<Arc<ShuffleTopology>> {
        if let Some(hit) = self.shuffles.iter().find(|t| {
            t.has_transpose_state(transpose)
                && t.has_edges_sorted_by(edge_sort)
                && t.has_nodes_sorted_by(node_sort)
        }) {
            debug!(?transpose, ?node_sort, ?edge_sort, "shuffle cache hit");
            return Ok(hit.clone());
        }

        let shadow = ShadowKey {
            kind: TopologyKind::Shuffle,
            transpose,
            edge_sort,
            node_sort,
        };
        let topo = match ctx.load(shadow) {
            Some(desc) => {
                debug!(?transpose, ?node_sort, ?edge_sort, "loading shuffle from storage");
                let topo = ShuffleTopology::from_descriptor(desc)?;
                self.check_dimensions(topo.csr())?;
                topo
            }
            None => {
                // The seed only contributes its transpose state; node
                // permutation invalidates any existing edge order anyway.
                let seed = self.edge_shuffle(ctx, transpose, EdgeSortKind::Any)?;
                debug!(?transpose, ?node_sort, ?edge_sort, "synthesizing shuffle");
                ShuffleTopology::make_from_topo(&seed, node_sort, edge_sort, ctx.types, ctx.runtime)
            }
        };
        let arc = Arc::new(topo);
        self.shuffles.push(arc.clone());
        Ok(arc)
    }

    /// Returns the cached edge-type-aware view for `transpose`, loading or
    /// synthesizing it when absent. The by-type-sorted seed shuffle is
    /// consumed, not cached.
    pub fn edge_type_aware(
        &mut self,
        ctx: &ViewContext<'_>,
        transpose: TransposeKind,
    ) -> Result<Arc<EdgeTypeAwareTopology>> {
        if let Some(hit) = self
            .type_aware
            .iter()
            .find(|t| t.has_transpose_state(transpose))
        {
            debug!(?transpose, "edge-type-aware cache hit");
            return Ok(hit.clone());
        }

        let shadow = ShadowKey {
            kind: TopologyKind::EdgeTypeAware,
            transpose,
            edge_sort: EdgeSortKind::ByEdgeType,
            node_sort: NodeSortKind::Any,
        };
        let loaded = ctx.load(shadow);

        let sorted = self.pop_edge_shuffle(ctx, transpose, EdgeSortKind::ByEdgeType)?;
        let type_map = self.type_map(ctx);

        let topo = match loaded {
            Some(desc) => {
                debug!(?transpose, "loading edge-type-aware view from storage");
                EdgeTypeAwareTopology::from_descriptor(desc, type_map, Arc::new(sorted))?
            }
            None => {
                debug!(?transpose, "synthesizing edge-type-aware view");
                EdgeTypeAwareTopology::make_from(
                    ctx.types,
                    type_map,
                    Arc::new(sorted),
                    ctx.runtime,
                )?
            }
        };
        let arc = Arc::new(topo);
        self.type_aware.push(arc.clone());
        Ok(arc)
    }

    /// Serializable descriptors for every cached view, in fixed order:
    /// edge-shuffles, then shuffles, then edge-type-aware views.
    pub fn to_persistable(&self) -> Vec<TopologyDescriptor> {
        let mut descriptors =
            Vec::with_capacity(self.edge_shuffles.len() + self.shuffles.len() + self.type_aware.len());
        descriptors.extend(self.edge_shuffles.iter().map(|t| t.to_descriptor()));
        descriptors.extend(self.shuffles.iter().map(|t| t.to_descriptor()));
        descriptors.extend(self.type_aware.iter().map(|t| t.to_descriptor()));
        descriptors
    }

    fn check_dimensions(&self, loaded: &Topology) -> Result<()> {
        if loaded.num_nodes() != self.base.num_nodes()
            || loaded.num_edges() != self.base.num_edges()
        {
            return Err(TrellisError::FormatMismatch(format!(
                "loaded view is {}x{}, base topology is {}x{}",
                loaded.num_nodes(),
                loaded.num_edges(),
                self.base.num_nodes(),
                self.base.num_edges()
            )));
        }
        Ok(())
    }
}
