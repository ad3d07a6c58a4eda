//! A single triangular tile of the quadtree.

use crate::error::Result;
use crate::geometry::Tile;
use crate::layer::{LayerData, LayerKind};
use crate::storage::{NodeManifest, TileStore};
use geoquad_types::coord::Geodetic;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Longest node path accepted when naming files.
pub const MAX_PATH_LEN: usize = 1024;

/// Index of a resident node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Identity of one installed layer data instance. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) u64);

/// Layer data held by a node, with its residency flags.
#[derive(Debug, Clone)]
pub(crate) struct LayerEntry {
    pub(crate) id: LayerId,
    pub(crate) data: LayerData,
    /// Content differs from what is on disk
    pub(crate) dirty: bool,
    /// Content is in memory
    pub(crate) active: bool,
}

impl LayerEntry {
    pub(crate) fn resident(id: LayerId, data: LayerData) -> Self {
        Self {
            id,
            data,
            dirty: true,
            active: true,
        }
    }

    /// Shell of data that lives on disk only.
    pub(crate) fn on_disk(id: LayerId, kind: LayerKind) -> Self {
        Self {
            id,
            data: LayerData::create(kind),
            dirty: false,
            active: false,
        }
    }
}

/// Counters of one save pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Files written or removed
    pub written: usize,
    /// Files that could not be written or removed
    pub failed: usize,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    pub(crate) fn absorb(&mut self, other: SaveReport) {
        self.written += other.written;
        self.failed += other.failed;
    }
}

/// One triangular tile.
///
/// A node starts as a leaf and may be subdivided once into four children.
/// Children are referenced by arena index; a `None` slot in a subdivided node
/// means the child is on disk and gets loaded on access.
#[derive(Debug)]
pub struct Node {
    index: u8,
    parent: Option<NodeId>,
    path: SmallVec<[u8; 24]>,
    children: Option<[Option<NodeId>; 4]>,
    tile: Tile,
    dirty: bool,
    pub(crate) layers: FxHashMap<LayerKind, LayerEntry>,
    /// Kinds whose files must be deleted on the next save
    erased: SmallVec<[LayerKind; 2]>,
}

impl Node {
    pub(crate) fn root(index: u8, tile: Tile) -> Self {
        Self {
            index,
            parent: None,
            path: SmallVec::from_slice(&[index]),
            children: None,
            tile,
            dirty: false,
            layers: FxHashMap::default(),
            erased: SmallVec::new(),
        }
    }

    pub(crate) fn child(parent_id: NodeId, parent: &Node, index: u8, tile: Tile) -> Self {
        let mut path = parent.path.clone();
        path.push(index);
        Self {
            index,
            parent: Some(parent_id),
            path,
            children: None,
            tile,
            dirty: true,
            layers: FxHashMap::default(),
            erased: SmallVec::new(),
        }
    }

    /// Restore the persisted shape. Layer entries become on-disk shells.
    pub(crate) fn apply_manifest(
        &mut self,
        manifest: &NodeManifest,
        mut next_id: impl FnMut() -> LayerId,
    ) {
        self.children = manifest.subdivided.then_some([None; 4]);
        self.layers = manifest
            .kinds
            .iter()
            .map(|&kind| (kind, LayerEntry::on_disk(next_id(), kind)))
            .collect();
        self.dirty = false;
    }

    pub(crate) fn manifest(&self) -> NodeManifest {
        let mut kinds: Vec<LayerKind> = self.layers.keys().copied().collect();
        kinds.sort();
        NodeManifest::new(self.is_subdivided(), kinds)
    }

    /// Position in the parent (0-3), or root index (0-19).
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Number of subdivisions between the root and this node.
    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_subdivided(&self) -> bool {
        self.children.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn tile(&self) -> &Tile {
        &self.tile
    }

    pub fn children(&self) -> Option<[Option<NodeId>; 4]> {
        self.children
    }

    pub(crate) fn set_child(&mut self, index: usize, child: Option<NodeId>) {
        if let Some(slots) = self.children.as_mut()
            && let Some(slot) = slots.get_mut(index)
        {
            *slot = child;
        }
    }

    /// Turn a leaf into an internal node. Its layer entries are handed back
    /// for redistribution and their files are scheduled for removal.
    pub(crate) fn make_internal(&mut self) -> FxHashMap<LayerKind, LayerEntry> {
        debug_assert!(!self.is_subdivided());
        self.children = Some([None; 4]);
        self.dirty = true;
        let entries = std::mem::take(&mut self.layers);
        for kind in entries.keys() {
            if !self.erased.contains(kind) {
                self.erased.push(*kind);
            }
        }
        entries
    }

    pub(crate) fn has_resident_children(&self) -> bool {
        self.children
            .is_some_and(|slots| slots.iter().any(Option::is_some))
    }

    pub fn layer_kinds(&self) -> impl Iterator<Item = LayerKind> + '_ {
        self.layers.keys().copied()
    }

    /// Resident data of `kind`, without loading or touching anything.
    pub fn resident_layer(&self, kind: LayerKind) -> Option<&LayerData> {
        self.layers
            .get(&kind)
            .filter(|e| e.active)
            .map(|e| &e.data)
    }

    pub(crate) fn install(&mut self, entry: LayerEntry) {
        let kind = entry.data.kind();
        self.erased.retain(|k| *k != kind);
        self.layers.insert(kind, entry);
        self.dirty = true;
    }

    /// Remove the layer data with identity `id`.
    ///
    /// Returns `None` when this node does not own it.
    pub fn delete_layer_data(&mut self, id: LayerId) -> Option<LayerKind> {
        let kind = self
            .layers
            .iter()
            .find(|(_, e)| e.id == id)
            .map(|(k, _)| *k)?;
        self.layers.remove(&kind);
        if !self.erased.contains(&kind) {
            self.erased.push(kind);
        }
        self.dirty = true;
        Some(kind)
    }

    /// Path from the root as child indices, e.g. `7/2/0`.
    ///
    /// Returns `None` if the path would exceed `max_len` bytes.
    pub fn get_path(&self, max_len: usize) -> Option<String> {
        let mut out = String::new();
        for (i, id) in self.path.iter().enumerate() {
            if i > 0 {
                out.push('/');
            }
            out.push_str(&id.to_string());
            if out.len() > max_len {
                return None;
            }
        }
        Some(out)
    }

    pub(crate) fn path_string(&self) -> Result<String> {
        self.get_path(MAX_PATH_LEN).ok_or_else(|| {
            crate::error::MapError::Topology(format!(
                "node path at depth {} exceeds {MAX_PATH_LEN} bytes",
                self.depth()
            ))
        })
    }

    /// Whether `location` falls inside this node's triangle.
    pub fn collision(&self, location: &Geodetic) -> bool {
        self.tile.contains(&location.to_ecef())
    }

    /// Whether the circle of `radius` meters around `center` touches this node's triangle.
    pub fn collision_circle(&self, center: &Geodetic, radius: f64) -> bool {
        self.tile.intersects_circle(&center.to_ecef(), radius)
    }

    /// Write this node's own dirty state: layer files, then the manifest,
    /// then removal of erased layer files. Dirty flags are cleared only for
    /// what was written successfully.
    pub(crate) fn flush(&mut self, store: &TileStore) -> SaveReport {
        let mut report = SaveReport::default();
        let path = match self.path_string() {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Cannot save node {:?}: {}", self.path, e);
                report.failed += 1;
                return report;
            }
        };

        for entry in self.layers.values_mut() {
            if !(entry.active && entry.dirty) {
                continue;
            }
            match store.write_layer(&path, &entry.data) {
                Ok(()) => {
                    entry.dirty = false;
                    report.written += 1;
                }
                Err(e) => {
                    log::warn!("Failed to save {} data of node {}: {}", entry.data.kind(), path, e);
                    report.failed += 1;
                }
            }
        }

        if self.dirty {
            match store.write_manifest(&path, &self.manifest()) {
                Ok(()) => {
                    self.dirty = false;
                    report.written += 1;
                }
                Err(e) => {
                    log::warn!("Failed to save manifest of node {}: {}", path, e);
                    report.failed += 1;
                    return report;
                }
            }
        }

        let mut kept = SmallVec::<[LayerKind; 2]>::new();
        for kind in self.erased.drain(..) {
            match store.remove_layer(&path, kind) {
                Ok(true) => report.written += 1,
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Failed to remove {} file of node {}: {}", kind, path, e);
                    report.failed += 1;
                    kept.push(kind);
                }
            }
        }
        self.erased = kept;

        report
    }

    /// Whether anything of this node still has to be written.
    pub(crate) fn needs_save(&self) -> bool {
        self.dirty
            || !self.erased.is_empty()
            || self.layers.values().any(|e| e.active && e.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Icosahedron;
    use crate::layer::CoastLine;
    use tempfile::TempDir;

    fn root(index: u8) -> Node {
        Node::root(index, Icosahedron::get().face_tile(index as usize).unwrap())
    }

    fn coast_at(lat: f64, lon: f64) -> LayerData {
        let mut c = CoastLine::new();
        c.add([Geodetic::surface(lat, lon)]).unwrap();
        c.into()
    }

    #[test]
    fn test_paths() {
        let r = root(7);
        assert_eq!(r.get_path(MAX_PATH_LEN).as_deref(), Some("7"));
        assert_eq!(r.depth(), 0);

        let tiles = r.tile().subdivide();
        let c = Node::child(NodeId(0), &r, 2, tiles[2].clone());
        let tiles = c.tile().subdivide();
        let g = Node::child(NodeId(1), &c, 3, tiles[3].clone());
        assert_eq!(g.get_path(MAX_PATH_LEN).as_deref(), Some("7/2/3"));
        assert_eq!(g.get_path(3), None);
        assert_eq!(g.depth(), 2);
        assert_eq!(g.parent(), Some(NodeId(1)));
    }

    #[test]
    fn test_collision() {
        let r = root(0);
        let inside = r.tile().centroid().to_geodetic();
        assert!(r.collision(&inside));
        let outside = (-r.tile().centroid()).to_geodetic();
        assert!(!r.collision(&outside));
        assert!(r.collision_circle(&outside, 30_000_000.0));
    }

    #[test]
    fn test_delete_by_identity() {
        let mut r = root(3);
        r.install(LayerEntry::resident(LayerId(5), coast_at(0.0, 0.0)));
        assert_eq!(r.delete_layer_data(LayerId(6)), None);
        assert_eq!(r.delete_layer_data(LayerId(5)), Some(LayerKind::CoastLine));
        assert_eq!(r.layer_kinds().count(), 0);
        assert!(r.needs_save());
    }

    #[test]
    fn test_flush_clears_dirty_and_removes_erased() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).unwrap();

        let mut r = root(11);
        r.install(LayerEntry::resident(LayerId(1), coast_at(10.0, 10.0)));
        let report = r.flush(&store);
        assert_eq!(report, SaveReport { written: 2, failed: 0 });
        assert!(!r.needs_save());
        assert!(dir.path().join("11/CoastLine.dat").exists());

        assert_eq!(r.flush(&store), SaveReport::default());

        r.delete_layer_data(LayerId(1));
        let report = r.flush(&store);
        assert_eq!(report.written, 2);
        assert!(!dir.path().join("11/CoastLine.dat").exists());
        let manifest = store.read_manifest("11").unwrap().unwrap();
        assert!(manifest.kinds.is_empty());
    }

    #[test]
    fn test_make_internal_schedules_removal() {
        let mut r = root(1);
        r.install(LayerEntry::resident(LayerId(1), coast_at(0.0, 0.0)));
        let entries = r.make_internal();
        assert_eq!(entries.len(), 1);
        assert!(r.is_subdivided());
        assert!(!r.has_resident_children());
        assert_eq!(r.manifest(), NodeManifest::new(true, vec![]));
    }
}
