//! The map database facade.
//!
//! [`MapDb`] owns the configuration and, once initialized, the quadtree with
//! its two residency lists. All operations run on the calling thread.

use crate::config::Config;
use crate::error::{MapError, Result};
use crate::layer::{LayerData, LayerKind};
use crate::storage::TileStore;
use crate::tree::{LayerHandle, Node, NodeId, RestructReport, SaveReport, Tree};
use geoquad_types::coord::Geodetic;
use geoquad_types::stats::MapStats;
use rustc_hash::FxHashMap;

#[cfg(feature = "sync")]
mod sync;

#[cfg(feature = "sync")]
pub use sync::{MaintenanceHandle, SyncMapDb};

/// Persistent geospatial tile database (single-threaded by design).
///
/// Data is inserted into the 20 faces of an icosahedron and pushed down a
/// quadtree whose leaves are subdivided once a layer outgrows its per-tile
/// byte limit. `restruct()` keeps the number of resident nodes and the
/// resident payload within the configured bounds by spilling to disk;
/// spilled content is reloaded on the next access.
///
/// For shared use across threads see `SyncMapDb` (feature `sync`).
///
/// # Examples
///
/// ```rust
/// use geoquad::{CoastLine, Geodetic, LayerKind, LayerLimits, MapDb};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::tempdir()?;
/// let mut db = MapDb::builder()
///     .storage_path(dir.path())
///     .max_nodes(64)
///     .max_total_layer_bytes(1 << 20)
///     .layer_limits(LayerKind::CoastLine, LayerLimits::new(64 * 1024, 1 << 20))
///     .build()?;
///
/// let mut coast = CoastLine::new();
/// coast.add([Geodetic::surface(35.0, 139.0), Geodetic::surface(35.001, 139.001)])?;
/// db.insert(coast.into())?;
///
/// let found = db.request(&[LayerKind::CoastLine], &Geodetic::surface(35.0, 139.0), 1_000.0, 0.0)?;
/// assert_eq!(found[0].len(), 1);
///
/// db.restruct()?;
/// db.save()?;
/// # Ok(())
/// # }
/// ```
pub struct MapDb {
    config: Config,
    tree: Option<Tree>,
}

impl MapDb {
    /// Create an uninitialized database. Call [`MapDb::init`] before use.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tree: None,
        }
    }

    pub fn builder() -> crate::builder::MapDbBuilder {
        crate::builder::MapDbBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.tree.is_some()
    }

    /// Validate the configuration and load or create the 20 root tiles.
    ///
    /// Calling this on an initialized database does nothing.
    pub fn init(&mut self) -> Result<()> {
        if self.tree.is_some() {
            return Ok(());
        }
        self.config.validate().map_err(MapError::Config)?;
        let path = self
            .config
            .storage_path
            .clone()
            .ok_or_else(|| MapError::Config("storage_path is not set".into()))?;

        let store = TileStore::open(&path)?;
        let tile_limits: FxHashMap<LayerKind, usize> = self
            .config
            .layers
            .iter()
            .map(|(kind, limits)| (*kind, limits.max_tile_bytes))
            .collect();
        let tree = Tree::open(store, tile_limits, self.config.max_depth as usize);

        log::info!(
            "Opened map database at {} ({} root tiles)",
            path.display(),
            tree.roots().len()
        );
        self.tree = Some(tree);
        Ok(())
    }

    fn tree_mut(&mut self) -> Result<&mut Tree> {
        self.tree.as_mut().ok_or(MapError::NotInitialized)
    }

    fn tree(&self) -> Result<&Tree> {
        self.tree.as_ref().ok_or(MapError::NotInitialized)
    }

    /// Find layer data of `kinds` within `radius` meters of `center`.
    ///
    /// Returns one list of handles per requested kind, in request order.
    /// A positive `resolution` skips data coarser than that spacing in meters.
    pub fn request(
        &mut self,
        kinds: &[LayerKind],
        center: &Geodetic,
        radius: f64,
        resolution: f64,
    ) -> Result<Vec<Vec<LayerHandle>>> {
        if !center.is_valid() {
            return Err(MapError::InvalidInput(format!(
                "invalid query center {center:?}"
            )));
        }
        if !radius.is_finite() || radius < 0.0 {
            return Err(MapError::InvalidInput(format!("invalid query radius {radius}")));
        }
        let tree = self.tree_mut()?;
        let found = tree.query(kinds, center, radius, resolution);
        tree.record_operation();
        Ok(found)
    }

    /// Insert `data`, splitting it at root tile boundaries.
    pub fn insert(&mut self, data: LayerData) -> Result<()> {
        if data.is_empty() {
            return Err(MapError::InvalidInput("cannot insert empty layer data".into()));
        }
        let kind = data.kind();
        let limits = self
            .config
            .layer_limits(kind)
            .ok_or_else(|| MapError::Config(format!("no limits configured for {kind}")))?;
        let tree = self.tree_mut()?;
        tree.insert(data, limits.max_tile_bytes)?;
        tree.record_operation();
        Ok(())
    }

    /// Delete the layer data behind `handle`.
    ///
    /// Fails with [`MapError::NotFound`] if the handle is stale.
    pub fn erase(&mut self, handle: &LayerHandle) -> Result<()> {
        let tree = self.tree_mut()?;
        tree.erase(handle)?;
        tree.record_operation();
        Ok(())
    }

    /// Data behind a handle from [`MapDb::request`], if still resident.
    pub fn resolve(&self, handle: &LayerHandle) -> Option<&LayerData> {
        self.tree.as_ref()?.resolve(handle)
    }

    /// One maintenance pass: evict idle leaves beyond the node bound, then
    /// release layer content beyond the per-kind and aggregate byte bounds.
    pub fn restruct(&mut self) -> Result<RestructReport> {
        let max_nodes = self.config.max_nodes.unwrap_or(usize::MAX);
        let max_total = self.config.max_total_layer_bytes.unwrap_or(usize::MAX);
        let resident_limits: FxHashMap<LayerKind, usize> = self
            .config
            .layers
            .iter()
            .map(|(kind, limits)| (*kind, limits.max_resident_bytes))
            .collect();

        let tree = self.tree_mut()?;
        let mut report = RestructReport::default();
        tree.restruct_nodes(max_nodes, &mut report);
        tree.restruct_layers(&resident_limits, max_total, &mut report);

        if report.nodes_evicted > 0 || report.layers_released > 0 {
            log::debug!(
                "Restruct evicted {} nodes and released {} layers ({} failures)",
                report.nodes_evicted,
                report.layers_released,
                report.failures
            );
        }
        Ok(report)
    }

    /// Persist all dirty state. Individual failures are logged and counted.
    pub fn save(&mut self) -> Result<SaveReport> {
        let report = self.tree_mut()?.save();
        if report.failed > 0 {
            log::warn!("Save finished with {} failures", report.failed);
        }
        Ok(report)
    }

    /// Save and return to the uninitialized state.
    pub fn close(&mut self) -> Result<SaveReport> {
        let report = self.save()?;
        self.tree = None;
        Ok(report)
    }

    pub fn roots(&self) -> Result<&[NodeId]> {
        Ok(self.tree()?.roots())
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.as_ref()?.node(id)
    }

    /// Counters since `init()`; all zero while uninitialized.
    pub fn stats(&self) -> MapStats {
        self.tree.as_ref().map(Tree::stats).unwrap_or_default()
    }
}

impl Drop for MapDb {
    fn drop(&mut self) {
        if let Some(tree) = self.tree.as_mut() {
            let report = tree.save();
            if report.failed > 0 {
                log::warn!("Save on drop finished with {} failures", report.failed);
            }
        }
    }
}
