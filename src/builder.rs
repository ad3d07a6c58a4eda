//! Database builder for flexible configuration
//!
//! This module provides a builder pattern for creating an initialized
//! [`MapDb`] without assembling a [`Config`] by hand.

use crate::config::{Config, LayerLimits};
use crate::db::MapDb;
use crate::error::Result;
use crate::layer::LayerKind;
use std::path::PathBuf;

/// Builder for database configuration with a storage path and size bounds.
#[derive(Debug)]
pub struct MapDbBuilder {
    config: Config,
}

impl MapDbBuilder {
    /// Create a new builder with an empty configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the directory holding node manifests and layer files.
    pub fn storage_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.storage_path = Some(path.into());
        self
    }

    /// Set the maximum number of resident nodes (at least one per root tile).
    pub fn max_nodes(mut self, max_nodes: usize) -> Self {
        self.config.max_nodes = Some(max_nodes);
        self
    }

    /// Set the maximum total bytes of resident layer data.
    pub fn max_total_layer_bytes(mut self, bytes: usize) -> Self {
        self.config.max_total_layer_bytes = Some(bytes);
        self
    }

    /// Set the tile and residency limits of one layer kind.
    pub fn layer_limits(mut self, kind: LayerKind, limits: LayerLimits) -> Self {
        self.config.layers.insert(kind, limits);
        self
    }

    pub fn max_depth(mut self, depth: u8) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the database and load the tree shape found on disk.
    pub fn build(self) -> Result<MapDb> {
        let mut db = MapDb::new(self.config);
        db.init()?;
        Ok(db)
    }
}

impl Default for MapDbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapError;
    use tempfile::TempDir;

    fn limits() -> LayerLimits {
        LayerLimits::new(1 << 16, 1 << 20)
    }

    #[test]
    fn test_builder_default() {
        let builder = MapDbBuilder::new();
        assert_eq!(builder.config, Config::default());
    }

    #[test]
    fn test_builder_builds_initialized_db() {
        let dir = TempDir::new().unwrap();
        let db = MapDbBuilder::new()
            .storage_path(dir.path())
            .max_nodes(32)
            .max_total_layer_bytes(1 << 20)
            .layer_limits(LayerKind::CoastLine, limits())
            .max_depth(10)
            .build()
            .unwrap();

        assert!(db.is_initialized());
        assert_eq!(db.config().max_depth, 10);
        assert_eq!(db.config().max_nodes, Some(32));
        assert_eq!(db.roots().unwrap().len(), 20);
    }

    #[test]
    fn test_builder_with_config() {
        let dir = TempDir::new().unwrap();
        let config = Config::default()
            .with_storage_path(dir.path())
            .with_max_nodes(20)
            .with_max_total_layer_bytes(1024)
            .with_layer_limits(LayerKind::CoastLine, limits());

        let db = MapDbBuilder::new().config(config.clone()).build().unwrap();
        assert_eq!(db.config(), &config);
    }

    #[test]
    fn test_builder_missing_limits() {
        let dir = TempDir::new().unwrap();
        let result = MapDbBuilder::new()
            .storage_path(dir.path())
            .max_nodes(32)
            .max_total_layer_bytes(1 << 20)
            .build();
        assert!(matches!(result, Err(MapError::Config(_))));
    }

    #[test]
    fn test_builder_too_few_nodes() {
        let dir = TempDir::new().unwrap();
        let result = MapDbBuilder::new()
            .storage_path(dir.path())
            .max_nodes(19)
            .max_total_layer_bytes(1 << 20)
            .layer_limits(LayerKind::CoastLine, limits())
            .build();
        assert!(matches!(result, Err(MapError::Config(_))));
    }
}
