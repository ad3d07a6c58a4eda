//! On-disk tile store.
//!
//! Every node owns a directory named by its path from the root, e.g.
//! `7/2/0/3`. It holds the node manifest (`node.bin`) and one file per
//! resident layer kind (`<KindName>.dat`). Files are written to a temporary
//! sibling and renamed into place, so a record is either the old or the new
//! version.

pub(crate) mod codec;

use crate::error::{MapError, Result};
use crate::layer::{LayerData, LayerKind};
use codec::{read_u8, write_u8};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const LAYER_MAGIC: &[u8] = b"GEOQUAD_LAYER";
const LAYER_VERSION: u8 = 1;

pub const MANIFEST_FILE: &str = "node.bin";
const MANIFEST_VERSION: u8 = 1;

/// Persisted shape of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeManifest {
    pub version: u8,
    pub subdivided: bool,
    pub kinds: Vec<LayerKind>,
}

impl NodeManifest {
    pub fn new(subdivided: bool, kinds: Vec<LayerKind>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            subdivided,
            kinds,
        }
    }
}

/// File layout rooted at the configured storage directory.
#[derive(Debug, Clone)]
pub struct TileStore {
    root: PathBuf,
}

impl TileStore {
    /// Open the store, creating the root directory if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn node_dir(&self, node_path: &str) -> PathBuf {
        self.root.join(node_path)
    }

    pub fn layer_file(&self, node_path: &str, kind: LayerKind) -> PathBuf {
        self.node_dir(node_path).join(format!("{}.dat", kind.name()))
    }

    pub fn manifest_file(&self, node_path: &str) -> PathBuf {
        self.node_dir(node_path).join(MANIFEST_FILE)
    }

    pub fn write_layer(&self, node_path: &str, data: &LayerData) -> Result<()> {
        write_atomic(&self.layer_file(node_path, data.kind()), |writer| {
            writer.write_all(LAYER_MAGIC)?;
            write_u8(writer, LAYER_VERSION)?;
            write_u8(writer, data.kind().tag())?;
            data.save(writer)
        })
    }

    pub fn read_layer(&self, node_path: &str, kind: LayerKind) -> Result<LayerData> {
        let path = self.layer_file(node_path, kind);
        let mut reader = BufReader::new(File::open(&path)?);

        let mut magic = vec![0u8; LAYER_MAGIC.len()];
        reader.read_exact(&mut magic)?;
        if magic != LAYER_MAGIC {
            return Err(MapError::InvalidFormat(format!(
                "{} is not a layer file",
                path.display()
            )));
        }
        let version = read_u8(&mut reader)?;
        if version != LAYER_VERSION {
            return Err(MapError::InvalidFormat(format!(
                "unsupported layer file version {version}"
            )));
        }
        let stored_kind = LayerKind::from_tag(read_u8(&mut reader)?);
        if stored_kind != Some(kind) {
            return Err(MapError::InvalidFormat(format!(
                "{} does not hold {kind} data",
                path.display()
            )));
        }

        let mut data = LayerData::create(kind);
        data.load(&mut reader)?;
        Ok(data)
    }

    /// Delete a layer file. Returns whether it existed.
    pub fn remove_layer(&self, node_path: &str, kind: LayerKind) -> Result<bool> {
        match std::fs::remove_file(self.layer_file(node_path, kind)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_manifest(&self, node_path: &str, manifest: &NodeManifest) -> Result<()> {
        write_atomic(&self.manifest_file(node_path), |writer| {
            bincode::serialize_into(writer, manifest)?;
            Ok(())
        })
    }

    /// Read a node manifest; `None` when the node was never saved.
    pub fn read_manifest(&self, node_path: &str) -> Result<Option<NodeManifest>> {
        let path = self.manifest_file(node_path);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest: NodeManifest = bincode::deserialize_from(BufReader::new(file))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(MapError::InvalidFormat(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(Some(manifest))
    }
}

fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = temp_path(path);

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;
    let mut writer = BufWriter::new(file);
    write(&mut writer)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.to_path_buf();
    if let Some(name) = temp.file_name() {
        let mut new_name = name.to_string_lossy().into_owned();
        new_name.push_str(".tmp");
        temp.set_file_name(new_name);
    }
    temp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::CoastLine;
    use geoquad_types::coord::Geodetic;
    use tempfile::TempDir;

    fn coast() -> LayerData {
        let mut c = CoastLine::new();
        c.add([Geodetic::surface(1.0, 2.0), Geodetic::surface(1.5, 2.5)])
            .unwrap();
        c.into()
    }

    #[test]
    fn test_layer_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).unwrap();

        let data = coast();
        store.write_layer("4/1", &data).unwrap();
        assert!(dir.path().join("4/1/CoastLine.dat").exists());
        assert!(!dir.path().join("4/1/CoastLine.dat.tmp").exists());

        let loaded = store.read_layer("4/1", LayerKind::CoastLine).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_layer_bad_magic() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("2")).unwrap();
        std::fs::write(dir.path().join("2/CoastLine.dat"), b"not a layer file").unwrap();

        let err = store.read_layer("2", LayerKind::CoastLine).unwrap_err();
        assert!(matches!(err, MapError::InvalidFormat(_)));
    }

    #[test]
    fn test_missing_layer_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).unwrap();
        let err = store.read_layer("9", LayerKind::CoastLine).unwrap_err();
        assert!(matches!(err, MapError::Io(_)));
    }

    #[test]
    fn test_remove_layer() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).unwrap();
        store.write_layer("0", &coast()).unwrap();
        assert!(store.remove_layer("0", LayerKind::CoastLine).unwrap());
        assert!(!store.remove_layer("0", LayerKind::CoastLine).unwrap());
    }

    #[test]
    fn test_manifest_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).unwrap();
        assert_eq!(store.read_manifest("5/3").unwrap(), None);

        let manifest = NodeManifest::new(true, vec![LayerKind::CoastLine]);
        store.write_manifest("5/3", &manifest).unwrap();
        assert_eq!(store.read_manifest("5/3").unwrap(), Some(manifest));
    }

    #[test]
    fn test_corrupt_manifest() {
        let dir = TempDir::new().unwrap();
        let store = TileStore::open(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("1")).unwrap();
        std::fs::write(dir.path().join("1").join(MANIFEST_FILE), [7u8]).unwrap();
        assert!(store.read_manifest("1").is_err());
    }
}
