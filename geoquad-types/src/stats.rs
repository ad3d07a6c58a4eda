use serde::{Deserialize, Serialize};

/// Residency and I/O counters of a map database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapStats {
    /// Nodes currently held in memory
    pub resident_nodes: usize,
    /// Layer data instances whose content is in memory
    pub resident_layers: usize,
    /// Total byte footprint of resident layer data
    pub resident_layer_bytes: usize,
    /// Number of node subdivisions performed
    pub subdivisions: u64,
    /// Nodes evicted from memory by restruct
    pub nodes_evicted: u64,
    /// Layer data instances released by restruct
    pub layers_released: u64,
    /// Node manifests and layer files written to disk
    pub files_written: u64,
    /// Public operations performed
    pub operations_count: u64,
}

impl MapStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&mut self) {
        self.operations_count += 1;
    }

    pub fn record_write(&mut self) {
        self.files_written += 1;
    }
}
