//! Configuration for the map database.
//!
//! Every limit must be set before `init()`; [`Config::validate`] reports the
//! first missing or inconsistent value.
use crate::geometry::Icosahedron;
use crate::layer::LayerKind;
use serde::de::Error;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Size limits of one layer kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerLimits {
    /// Bytes one tile may hold of this kind before it subdivides
    pub max_tile_bytes: usize,
    /// Bytes of this kind that may stay resident across all tiles
    pub max_resident_bytes: usize,
}

impl LayerLimits {
    pub const fn new(max_tile_bytes: usize, max_resident_bytes: usize) -> Self {
        Self {
            max_tile_bytes,
            max_resident_bytes,
        }
    }
}

/// Map database configuration
///
/// # Example
///
/// ```rust
/// use geoquad::Config;
///
/// let json = r#"{
///     "storage_path": "/var/lib/geoquad",
///     "max_nodes": 4096,
///     "max_total_layer_bytes": 67108864,
///     "layers": {
///         "coast_line": { "max_tile_bytes": 4194304, "max_resident_bytes": 33554432 }
///     }
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.max_nodes, Some(4096));
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding node manifests and layer files
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    /// Maximum number of nodes kept in memory
    #[serde(default)]
    pub max_nodes: Option<usize>,

    /// Maximum total bytes of resident layer data
    #[serde(default)]
    pub max_total_layer_bytes: Option<usize>,

    /// Per-kind limits; every kind needs an entry
    #[serde(default)]
    pub layers: BTreeMap<LayerKind, LayerLimits>,

    /// Depth below which tiles no longer subdivide
    #[serde(default = "Config::default_max_depth")]
    pub max_depth: u8,
}

impl Config {
    const fn default_max_depth() -> u8 {
        24
    }

    pub fn with_storage_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.storage_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }

    pub fn with_max_total_layer_bytes(mut self, bytes: usize) -> Self {
        self.max_total_layer_bytes = Some(bytes);
        self
    }

    pub fn with_layer_limits(mut self, kind: LayerKind, limits: LayerLimits) -> Self {
        self.layers.insert(kind, limits);
        self
    }

    pub fn with_max_depth(mut self, depth: u8) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn layer_limits(&self, kind: LayerKind) -> Option<LayerLimits> {
        self.layers.get(&kind).copied()
    }

    pub fn validate(&self) -> Result<(), String> {
        match &self.storage_path {
            None => return Err("Storage path is not set".to_string()),
            Some(path) if path.as_os_str().is_empty() => {
                return Err("Storage path is empty".to_string());
            }
            Some(_) => {}
        }

        let roots = Icosahedron::get().num_faces();
        match self.max_nodes {
            None => return Err("Maximum node count is not set".to_string()),
            Some(n) if n < roots => {
                return Err(format!(
                    "Maximum node count must be at least {roots} (one per root tile)"
                ));
            }
            Some(_) => {}
        }

        match self.max_total_layer_bytes {
            None => return Err("Maximum total layer data size is not set".to_string()),
            Some(0) => return Err("Maximum total layer data size must be positive".to_string()),
            Some(_) => {}
        }

        for kind in LayerKind::ALL {
            let Some(limits) = self.layers.get(&kind) else {
                return Err(format!("Size limits for layer kind {kind} are not set"));
            };
            if limits.max_tile_bytes == 0 || limits.max_resident_bytes == 0 {
                return Err(format!("Size limits for layer kind {kind} must be positive"));
            }
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: None,
            max_nodes: None,
            max_total_layer_bytes: None,
            layers: BTreeMap::new(),
            max_depth: Self::default_max_depth(),
        }
    }
}
