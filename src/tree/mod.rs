//! The geodesic quadtree.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Two
//! [`AccessList`]s order resident nodes and resident layer data by last use;
//! they hold ids only, so unlinking an item never frees anything by itself.

mod node;

pub use node::{LayerId, MAX_PATH_LEN, Node, NodeId, SaveReport};
pub(crate) use node::LayerEntry;

use crate::error::{MapError, Result};
use crate::geometry::{Icosahedron, Tile};
use crate::layer::{LayerData, LayerKind};
use crate::lru::AccessList;
use crate::storage::TileStore;
use geoquad_types::coord::{Ecef, Geodetic};
use geoquad_types::stats::MapStats;
use rustc_hash::FxHashMap;

type LayerKey = (NodeId, LayerKind);

/// Reference to layer data found by a query.
///
/// A handle goes stale when its data is erased, released or its node evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerHandle {
    node: NodeId,
    kind: LayerKind,
    layer: LayerId,
}

impl LayerHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestructReport {
    pub nodes_evicted: usize,
    pub layers_released: usize,
    /// Items skipped because their content could not be saved
    pub failures: usize,
}

pub struct Tree {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    roots: Vec<NodeId>,
    root_tiles: Vec<Tile>,
    node_lru: AccessList<NodeId>,
    layer_lru: AccessList<LayerKey>,
    store: TileStore,
    tile_limits: FxHashMap<LayerKind, usize>,
    max_depth: usize,
    next_layer_id: u64,
    stats: MapStats,
}

impl Tree {
    /// Build the 20 roots, restoring whatever shape `store` remembers.
    pub(crate) fn open(
        store: TileStore,
        tile_limits: FxHashMap<LayerKind, usize>,
        max_depth: usize,
    ) -> Self {
        let root_tiles = Icosahedron::get().root_tiles();
        let mut tree = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            roots: Vec::with_capacity(root_tiles.len()),
            root_tiles: root_tiles.clone(),
            node_lru: AccessList::new(),
            layer_lru: AccessList::new(),
            store,
            tile_limits,
            max_depth,
            next_layer_id: 0,
            stats: MapStats::new(),
        };

        for (i, tile) in root_tiles.into_iter().enumerate() {
            let mut node = Node::root(i as u8, tile);
            tree.restore(&mut node);
            let id = tree.alloc(node);
            tree.roots.push(id);
            tree.node_lru.touch(id);
        }
        tree
    }

    fn restore(&mut self, node: &mut Node) {
        let Some(path) = node.get_path(MAX_PATH_LEN) else {
            return;
        };
        match self.store.read_manifest(&path) {
            Ok(Some(manifest)) => {
                let mut next = self.next_layer_id;
                node.apply_manifest(&manifest, || {
                    next += 1;
                    LayerId(next)
                });
                self.next_layer_id = next;
            }
            Ok(None) => {
                if !node.is_root() {
                    log::debug!("No manifest for node {}, starting empty", path);
                }
            }
            Err(e) => {
                log::warn!("Failed to load manifest of node {}: {}; starting empty", path, e);
            }
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release_slot(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        Some(node)
    }

    fn next_layer_id(&mut self) -> LayerId {
        self.next_layer_id += 1;
        LayerId(self.next_layer_id)
    }

    fn tile_limit(&self, kind: LayerKind) -> usize {
        self.tile_limits.get(&kind).copied().unwrap_or(usize::MAX)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)?.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| MapError::NotFound(format!("node {id:?} is not resident")))
    }

    fn entry_mut(&mut self, id: NodeId, kind: LayerKind) -> Result<&mut LayerEntry> {
        self.node_mut(id)?
            .layers
            .get_mut(&kind)
            .ok_or_else(|| MapError::NotFound(format!("node {id:?} holds no {kind} data")))
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn resident_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Resident child `index` of `parent_id`, loading it from disk if it was evicted.
    fn ensure_child(&mut self, parent_id: NodeId, index: usize) -> Result<NodeId> {
        let mut child = {
            let parent = self
                .node(parent_id)
                .ok_or_else(|| MapError::NotFound(format!("node {parent_id:?} is not resident")))?;
            let Some(slots) = parent.children() else {
                return Err(MapError::Topology(format!(
                    "node {} has no children",
                    parent.get_path(MAX_PATH_LEN).unwrap_or_default()
                )));
            };
            if let Some(Some(child)) = slots.get(index) {
                return Ok(*child);
            }
            let tile = parent
                .tile()
                .subdivide()
                .into_iter()
                .nth(index)
                .ok_or_else(|| MapError::Topology(format!("child index {index} out of range")))?;
            Node::child(parent_id, parent, index as u8, tile)
        };

        self.restore(&mut child);
        let id = self.alloc(child);
        self.node_mut(parent_id)?.set_child(index, Some(id));
        self.node_lru.touch(id);
        Ok(id)
    }

    /// Bring the content of `kind` into memory and mark it most recently used.
    fn activate_layer(&mut self, id: NodeId, kind: LayerKind) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| MapError::NotFound(format!("node {id:?} is not resident")))?;
        let path = node.path_string()?;
        let entry = node
            .layers
            .get_mut(&kind)
            .ok_or_else(|| MapError::NotFound(format!("node {path} holds no {kind} data")))?;

        if !entry.active {
            entry.data = self.store.read_layer(&path, kind)?;
            entry.active = true;
            entry.dirty = false;
            log::debug!("Loaded {} data of node {} ({} bytes)", kind, path, entry.data.size());
        }
        self.layer_lru.touch((id, kind));
        Ok(())
    }

    fn activate_all(&mut self, id: NodeId) -> Result<()> {
        let kinds: Vec<LayerKind> = self
            .node(id)
            .map(|n| n.layer_kinds().collect())
            .unwrap_or_default();
        for kind in kinds {
            self.activate_layer(id, kind)?;
        }
        Ok(())
    }

    /// Data of `kind` held by node `id`, loaded from disk if needed.
    ///
    /// The node becomes the most recently used one.
    pub fn get_layer_data(&mut self, id: NodeId, kind: LayerKind) -> Option<&LayerData> {
        self.node(id)?;
        self.node_lru.touch(id);
        if let Err(e) = self.activate_layer(id, kind) {
            if !matches!(e, MapError::NotFound(_)) {
                log::warn!("Failed to load {} data of node {:?}: {}", kind, id, e);
            }
            return None;
        }
        self.node(id)?.resident_layer(kind)
    }

    /// Insert `data` below the roots, splitting it at root boundaries first.
    pub(crate) fn insert(&mut self, data: LayerData, size_limit: usize) -> Result<()> {
        let shares = data.split(&self.root_tiles);
        let mut placed = false;
        for (i, share) in shares.into_iter().enumerate() {
            let Some(share) = share else { continue };
            let root = self.roots.get(i).copied().ok_or_else(|| {
                MapError::Topology(format!("no root for icosahedron face {i}"))
            })?;
            self.add_layer_data(root, share, size_limit)?;
            placed = true;
        }
        debug_assert!(placed, "non-empty data matched no root tile");
        if !placed {
            return Err(MapError::Topology("data lies in no root tile".into()));
        }
        Ok(())
    }

    /// Merge `data` into node `id`, subdividing once the result exceeds `size_limit`.
    pub(crate) fn add_layer_data(
        &mut self,
        id: NodeId,
        data: LayerData,
        size_limit: usize,
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.node_lru.touch(id);

        let (subdivided, present) = {
            let node = self
                .node(id)
                .ok_or_else(|| MapError::NotFound(format!("node {id:?} is not resident")))?;
            (node.is_subdivided(), node.layers.contains_key(&data.kind()))
        };
        if subdivided {
            return self.distribute(id, data, size_limit);
        }

        let kind = data.kind();
        let loaded = present
            && match self.activate_layer(id, kind) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Replacing unreadable {} data of node {:?}: {}", kind, id, e);
                    false
                }
            };
        if loaded {
            let entry = self.entry_mut(id, kind)?;
            entry.data.merge(data)?;
            entry.dirty = true;
        } else {
            let layer_id = self.next_layer_id();
            self.node_mut(id)?.install(LayerEntry::resident(layer_id, data));
            self.layer_lru.touch((id, kind));
        }

        let (size, depth) = {
            let node = self.node_mut(id)?;
            let size = node.layers.get(&kind).map_or(0, |e| e.data.size());
            (size, node.depth())
        };
        if size <= size_limit {
            return Ok(());
        }

        if depth < self.max_depth {
            if let Err(e) = self.activate_all(id) {
                log::warn!("Postponing subdivision of node {:?}: {}", id, e);
                return Ok(());
            }
            return self.subdivide(id, kind, size_limit);
        }

        let entry = self.entry_mut(id, kind)?;
        let fits = entry.data.reduce(size_limit);
        entry.dirty = true;
        log::warn!(
            "Reduced {} data at maximum depth {} to {} bytes (limit {}, fits: {})",
            kind,
            depth,
            entry.data.size(),
            size_limit,
            fits
        );
        Ok(())
    }

    /// Hand `data` down to the children of a subdivided node.
    fn distribute(&mut self, id: NodeId, data: LayerData, size_limit: usize) -> Result<()> {
        let tiles = self
            .node(id)
            .ok_or_else(|| MapError::NotFound(format!("node {id:?} is not resident")))?
            .tile()
            .subdivide();
        for (i, share) in data.split(&tiles).into_iter().enumerate() {
            if let Some(share) = share {
                let child = self.ensure_child(id, i)?;
                self.add_layer_data(child, share, size_limit)?;
            }
        }
        Ok(())
    }

    /// Create the four children of leaf `id` and move all its layer data into them.
    fn subdivide(&mut self, id: NodeId, trigger: LayerKind, trigger_limit: usize) -> Result<()> {
        if let Some(node) = self.node(id)
            && node.is_subdivided()
        {
            let path = node.get_path(MAX_PATH_LEN).unwrap_or_default();
            debug_assert!(false, "node {path} subdivided twice");
            return Err(MapError::Topology(format!("node {path} is already subdivided")));
        }
        self.activate_all(id)?;

        let node = self.node_mut(id)?;
        let tiles = node.tile().subdivide();
        let entries = node.make_internal();
        let path = node.get_path(MAX_PATH_LEN).unwrap_or_default();
        for kind in entries.keys() {
            self.layer_lru.remove(&(id, *kind));
        }

        let mut children = [id; 4];
        for (i, tile) in tiles.iter().enumerate() {
            let child = {
                let parent = self.node_mut(id)?;
                Node::child(id, parent, i as u8, tile.clone())
            };
            let cid = self.alloc(child);
            self.node_mut(id)?.set_child(i, Some(cid));
            self.node_lru.touch(cid);
            children[i] = cid;
        }
        self.stats.subdivisions += 1;
        log::debug!("Subdivided node {} ({} layer kinds)", path, entries.len());

        for (kind, entry) in entries {
            let limit = if kind == trigger {
                trigger_limit
            } else {
                self.tile_limit(kind)
            };
            for (i, share) in entry.data.split(&tiles).into_iter().enumerate() {
                if let Some(share) = share {
                    self.add_layer_data(children[i], share, limit)?;
                }
            }
        }
        Ok(())
    }

    /// Handles of data of `kinds` near (`center`, `radius`), one list per kind.
    pub(crate) fn query(
        &mut self,
        kinds: &[LayerKind],
        center: &Geodetic,
        radius: f64,
        resolution: f64,
    ) -> Vec<Vec<LayerHandle>> {
        let mut out = vec![Vec::new(); kinds.len()];
        let center_ecef = center.to_ecef();
        for root in self.roots.clone() {
            if self
                .node(root)
                .is_some_and(|n| n.collision_circle(center, radius))
            {
                self.get_layer_data_within(root, kinds, &center_ecef, radius, resolution, &mut out);
            }
        }
        out
    }

    fn get_layer_data_within(
        &mut self,
        id: NodeId,
        kinds: &[LayerKind],
        center: &Ecef,
        radius: f64,
        resolution: f64,
        out: &mut [Vec<LayerHandle>],
    ) {
        self.node_lru.touch(id);
        let Some(node) = self.node(id) else { return };

        if node.is_subdivided() {
            let tiles = node.tile().subdivide();
            for (i, tile) in tiles.iter().enumerate() {
                if !tile.intersects_circle(center, radius) {
                    continue;
                }
                match self.ensure_child(id, i) {
                    Ok(child) => {
                        self.get_layer_data_within(child, kinds, center, radius, resolution, out)
                    }
                    Err(e) => log::warn!("Skipping child {} of node {:?}: {}", i, id, e),
                }
            }
            return;
        }

        for (slot, kind) in kinds.iter().enumerate() {
            if !self.node(id).is_some_and(|n| n.layers.contains_key(kind)) {
                continue;
            }
            if let Err(e) = self.activate_layer(id, *kind) {
                log::warn!("Skipping {} data of node {:?}: {}", kind, id, e);
                continue;
            }
            let Some(entry) = self.node(id).and_then(|n| n.layers.get(kind)) else {
                continue;
            };
            let fine_enough = resolution <= 0.0 || entry.data.resolution() <= resolution;
            if fine_enough
                && entry.data.intersects_circle(center, radius)
                && let Some(list) = out.get_mut(slot)
            {
                list.push(LayerHandle {
                    node: id,
                    kind: *kind,
                    layer: entry.id,
                });
            }
        }
    }

    /// Resident data behind `handle`, if the handle is still current.
    pub fn resolve(&self, handle: &LayerHandle) -> Option<&LayerData> {
        self.node(handle.node)?
            .layers
            .get(&handle.kind)
            .filter(|e| e.id == handle.layer && e.active)
            .map(|e| &e.data)
    }

    pub(crate) fn erase(&mut self, handle: &LayerHandle) -> Result<()> {
        let stale = || MapError::NotFound(format!("stale layer handle {handle:?}"));
        let node = self
            .nodes
            .get_mut(handle.node.0)
            .and_then(Option::as_mut)
            .ok_or_else(stale)?;
        if !node
            .layers
            .get(&handle.kind)
            .is_some_and(|e| e.id == handle.layer)
        {
            return Err(stale());
        }
        node.delete_layer_data(handle.layer).ok_or_else(stale)?;
        self.layer_lru.remove(&(handle.node, handle.kind));
        Ok(())
    }

    /// Write all dirty state, parents before children.
    pub(crate) fn save(&mut self) -> SaveReport {
        let mut report = SaveReport::default();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id.0).and_then(Option::as_mut) else {
                continue;
            };
            report.absorb(node.flush(&self.store));
            if let Some(children) = node.children() {
                stack.extend(children.iter().rev().flatten().copied());
            }
        }
        self.stats.files_written += report.written as u64;
        report
    }

    fn is_evictable(&self, id: NodeId) -> bool {
        self.node(id)
            .is_some_and(|n| !n.is_root() && !n.has_resident_children())
    }

    /// Save and drop leaf `id`. Returns false if its state could not be saved.
    fn evict_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::as_mut) else {
            return false;
        };
        let report = node.flush(&self.store);
        self.stats.files_written += report.written as u64;
        if node.needs_save() {
            return false;
        }

        let kinds: Vec<LayerKind> = node.layer_kinds().collect();
        let parent = node.parent();
        let index = node.index() as usize;
        for kind in kinds {
            self.layer_lru.remove(&(id, kind));
        }
        self.node_lru.remove(&id);
        if let Some(pid) = parent
            && let Some(parent) = self.nodes.get_mut(pid.0).and_then(Option::as_mut)
        {
            parent.set_child(index, None);
        }
        self.release_slot(id);
        self.stats.nodes_evicted += 1;
        true
    }

    /// Evict least recently used leaves until at most `max_nodes` remain.
    pub(crate) fn restruct_nodes(&mut self, max_nodes: usize, report: &mut RestructReport) {
        while self.resident_nodes() > max_nodes {
            let candidates: Vec<NodeId> = self.node_lru.iter_lru().collect();
            let mut progressed = false;
            for id in candidates {
                if self.resident_nodes() <= max_nodes {
                    return;
                }
                if !self.is_evictable(id) {
                    continue;
                }
                if self.evict_node(id) {
                    report.nodes_evicted += 1;
                    progressed = true;
                } else {
                    report.failures += 1;
                }
            }
            if !progressed {
                log::warn!(
                    "Cannot evict below {} resident nodes (limit {})",
                    self.resident_nodes(),
                    max_nodes
                );
                return;
            }
        }
    }

    fn layer_size(&self, (id, kind): LayerKey) -> usize {
        self.node(id)
            .and_then(|n| n.resident_layer(kind))
            .map_or(0, LayerData::size)
    }

    /// Save if dirty, then free the content of one layer entry.
    ///
    /// Returns the bytes freed, or `None` if the content could not be saved.
    fn release_layer(&mut self, (id, kind): LayerKey) -> Option<usize> {
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::as_mut) else {
            self.layer_lru.remove(&(id, kind));
            return Some(0);
        };
        let path = node.get_path(MAX_PATH_LEN)?;
        let entry = node.layers.get_mut(&kind)?;

        if entry.dirty {
            if let Err(e) = self.store.write_layer(&path, &entry.data) {
                log::warn!("Failed to save {} data of node {} before release: {}", kind, path, e);
                return None;
            }
            entry.dirty = false;
            self.stats.record_write();
        }
        let size = entry.data.size();
        entry.data.release();
        entry.active = false;
        self.layer_lru.remove(&(id, kind));
        self.stats.layers_released += 1;
        Some(size)
    }

    /// Release least recently used layer data until every per-kind bound and
    /// the aggregate bound hold.
    pub(crate) fn restruct_layers(
        &mut self,
        resident_limits: &FxHashMap<LayerKind, usize>,
        max_total: usize,
        report: &mut RestructReport,
    ) {
        let mut per_kind: FxHashMap<LayerKind, usize> = FxHashMap::default();
        let mut total = 0usize;
        for key in self.layer_lru.iter_lru() {
            let size = self.layer_size(key);
            *per_kind.entry(key.1).or_default() += size;
            total += size;
        }

        for kind in LayerKind::ALL {
            let limit = resident_limits.get(&kind).copied().unwrap_or(usize::MAX);
            let candidates: Vec<LayerKey> = self
                .layer_lru
                .iter_lru()
                .filter(|(_, k)| *k == kind)
                .collect();
            for key in candidates {
                let used = per_kind.get(&kind).copied().unwrap_or(0);
                if used <= limit {
                    break;
                }
                match self.release_layer(key) {
                    Some(size) => {
                        per_kind.insert(kind, used.saturating_sub(size));
                        total = total.saturating_sub(size);
                        report.layers_released += 1;
                    }
                    None => report.failures += 1,
                }
            }
        }

        if total > max_total {
            let candidates: Vec<LayerKey> = self.layer_lru.iter_lru().collect();
            for key in candidates {
                if total <= max_total {
                    break;
                }
                match self.release_layer(key) {
                    Some(size) => {
                        total = total.saturating_sub(size);
                        report.layers_released += 1;
                    }
                    None => report.failures += 1,
                }
            }
        }
    }

    pub(crate) fn record_operation(&mut self) {
        self.stats.record_operation();
    }

    pub fn stats(&self) -> MapStats {
        let mut stats = self.stats.clone();
        stats.resident_nodes = self.resident_nodes();
        stats.resident_layers = self.layer_lru.len();
        stats.resident_layer_bytes = self.layer_lru.iter_lru().map(|k| self.layer_size(k)).sum();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::CoastLine;
    use tempfile::TempDir;

    fn open(dir: &TempDir, tile_limit: usize) -> Tree {
        let store = TileStore::open(dir.path()).unwrap();
        let mut limits = FxHashMap::default();
        limits.insert(LayerKind::CoastLine, tile_limit);
        Tree::open(store, limits, 8)
    }

    /// `per_child` points clustered around the centroid of each child of root 0.
    fn spread_over_root0(per_child: usize) -> CoastLine {
        let children = Icosahedron::get().face_tile(0).unwrap().subdivide();
        let mut coast = CoastLine::new();
        for child in &children {
            let c = child.centroid().to_geodetic();
            let line: Vec<Geodetic> = (0..per_child)
                .map(|i| Geodetic::surface(c.lat + i as f64 * 0.001, c.lon))
                .collect();
            coast.add(line).unwrap();
        }
        coast
    }

    #[test]
    fn test_open_creates_roots() {
        let dir = TempDir::new().unwrap();
        let tree = open(&dir, usize::MAX);
        assert_eq!(tree.roots().len(), 20);
        assert_eq!(tree.resident_nodes(), 20);
        for (i, id) in tree.roots().iter().enumerate() {
            let node = tree.node(*id).unwrap();
            assert_eq!(node.index() as usize, i);
            assert!(!node.is_subdivided());
        }
    }

    #[test]
    fn test_insert_stays_in_leaf_under_limit() {
        let dir = TempDir::new().unwrap();
        let mut tree = open(&dir, usize::MAX);
        tree.insert(spread_over_root0(3).into(), usize::MAX).unwrap();

        let root = tree.node(tree.roots()[0]).unwrap();
        assert!(!root.is_subdivided());
        assert_eq!(root.resident_layer(LayerKind::CoastLine).unwrap().size(), 4 * (4 + 3 * CoastLine::POINT_BYTES));
        assert_eq!(tree.stats().subdivisions, 0);
    }

    #[test]
    fn test_subdivision_moves_everything_to_children() {
        let dir = TempDir::new().unwrap();
        let per_child = 5;
        let coast = spread_over_root0(per_child);
        let limit = coast.size() - 1;
        let mut tree = open(&dir, limit);
        tree.insert(coast.into(), limit).unwrap();

        let root_id = tree.roots()[0];
        let root = tree.node(root_id).unwrap();
        assert!(root.is_subdivided());
        assert_eq!(root.layer_kinds().count(), 0);
        assert_eq!(tree.stats().subdivisions, 1);
        assert_eq!(tree.resident_nodes(), 24);

        let children = root.children().unwrap();
        let expected_tiles = root.tile().subdivide();
        for (i, child) in children.iter().enumerate() {
            let child = tree.node(child.unwrap()).unwrap();
            assert_eq!(child.tile(), &expected_tiles[i]);
            assert_eq!(child.parent(), Some(root_id));
            let coast = child.resident_layer(LayerKind::CoastLine).unwrap();
            assert_eq!(coast.as_coast_line().unwrap().num_points(), per_child);
        }
    }

    #[test]
    fn test_data_arriving_at_internal_node_descends() {
        let dir = TempDir::new().unwrap();
        let coast = spread_over_root0(5);
        let limit = coast.size() - 1;
        let mut tree = open(&dir, limit);
        tree.insert(coast.into(), limit).unwrap();

        let child0 = Icosahedron::get().face_tile(0).unwrap().subdivide()[0].centroid().to_geodetic();
        let mut extra = CoastLine::new();
        extra.add([Geodetic::surface(child0.lat - 0.01, child0.lon)]).unwrap();
        tree.insert(extra.into(), limit).unwrap();

        let root = tree.node(tree.roots()[0]).unwrap();
        let c0 = tree.node(root.children().unwrap()[0].unwrap()).unwrap();
        let coast = c0.resident_layer(LayerKind::CoastLine).unwrap();
        assert_eq!(coast.as_coast_line().unwrap().num_points(), 6);
        assert_eq!(tree.stats().subdivisions, 1);
    }

    #[test]
    fn test_reduce_at_max_depth() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).unwrap();
        let mut tree = Tree::open(store, FxHashMap::default(), 0);

        let coast = spread_over_root0(20);
        let limit = coast.size() / 2;
        tree.insert(coast.into(), limit).unwrap();

        let root = tree.node(tree.roots()[0]).unwrap();
        assert!(!root.is_subdivided());
        assert!(root.resident_layer(LayerKind::CoastLine).unwrap().size() <= limit);
    }

    #[test]
    fn test_query_resolve_erase() {
        let dir = TempDir::new().unwrap();
        let mut tree = open(&dir, usize::MAX);
        let mut coast = CoastLine::new();
        coast.add([Geodetic::surface(35.0, 139.0), Geodetic::surface(35.001, 139.0)]).unwrap();
        tree.insert(coast.into(), usize::MAX).unwrap();

        let found = tree.query(&[LayerKind::CoastLine], &Geodetic::surface(35.0, 139.0), 500.0, 0.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].len(), 1);
        let handle = found[0][0];
        assert!(tree.resolve(&handle).is_some());

        tree.erase(&handle).unwrap();
        assert!(tree.resolve(&handle).is_none());
        assert!(matches!(tree.erase(&handle), Err(MapError::NotFound(_))));
        assert_eq!(tree.stats().resident_layers, 0);
    }

    #[test]
    fn test_resolution_filter() {
        let dir = TempDir::new().unwrap();
        let mut tree = open(&dir, usize::MAX);
        let mut coast = CoastLine::new();
        // ~111 m spacing
        coast.add([Geodetic::surface(10.0, 10.0), Geodetic::surface(10.001, 10.0)]).unwrap();
        tree.insert(coast.into(), usize::MAX).unwrap();

        let center = Geodetic::surface(10.0, 10.0);
        let coarse = tree.query(&[LayerKind::CoastLine], &center, 1_000.0, 500.0);
        assert_eq!(coarse[0].len(), 1);
        let fine = tree.query(&[LayerKind::CoastLine], &center, 1_000.0, 10.0);
        assert!(fine[0].is_empty());
    }

    #[test]
    fn test_release_and_lazy_reload() {
        let dir = TempDir::new().unwrap();
        let mut tree = open(&dir, usize::MAX);
        tree.insert(spread_over_root0(3).into(), usize::MAX).unwrap();
        let root = tree.roots()[0];
        let before = tree.node(root).unwrap().resident_layer(LayerKind::CoastLine).cloned().unwrap();

        let mut report = RestructReport::default();
        tree.restruct_layers(&FxHashMap::default(), 1, &mut report);
        assert_eq!(report.layers_released, 1);
        assert_eq!(tree.stats().resident_layer_bytes, 0);
        assert!(tree.node(root).unwrap().resident_layer(LayerKind::CoastLine).is_none());

        let reloaded = tree.get_layer_data(root, LayerKind::CoastLine).cloned().unwrap();
        assert_eq!(reloaded, before);
    }

    #[test]
    fn test_evict_and_reload_child() {
        let dir = TempDir::new().unwrap();
        let coast = spread_over_root0(5);
        let limit = coast.size() - 1;
        let mut tree = open(&dir, limit);
        tree.insert(coast.into(), limit).unwrap();
        assert_eq!(tree.resident_nodes(), 24);

        let mut report = RestructReport::default();
        tree.restruct_nodes(20, &mut report);
        assert_eq!(report.nodes_evicted, 4);
        assert_eq!(tree.resident_nodes(), 20);
        assert_eq!(tree.stats().resident_layers, 0);

        let everywhere = tree.query(&[LayerKind::CoastLine], &Geodetic::surface(0.0, 0.0), 2.1e7, 0.0);
        let points: usize = everywhere[0]
            .iter()
            .filter_map(|h| tree.resolve(h))
            .filter_map(LayerData::as_coast_line)
            .map(CoastLine::num_points)
            .sum();
        assert_eq!(points, 20);
        assert_eq!(tree.resident_nodes(), 24);
    }
}
