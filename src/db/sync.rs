//! Thread-safe wrapper for shared database access.
//!
//! `SyncMapDb` wraps [`MapDb`] in `Arc<RwLock<_>>`. Queries reorder the
//! residency lists, so every operation except `stats` takes the write lock
//! and the database is effectively guarded by one coarse lock.
//!
//! # Examples
//!
//! ```rust
//! use geoquad::{CoastLine, Config, Geodetic, LayerKind, LayerLimits, SyncMapDb};
//! use std::thread;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let config = Config::default()
//!     .with_storage_path(dir.path())
//!     .with_max_nodes(64)
//!     .with_max_total_layer_bytes(1 << 20)
//!     .with_layer_limits(LayerKind::CoastLine, LayerLimits::new(1 << 16, 1 << 20));
//! let db = SyncMapDb::open(config)?;
//!
//! let writer = db.clone();
//! thread::spawn(move || {
//!     let mut coast = CoastLine::new();
//!     coast.add([Geodetic::surface(35.0, 139.0)]).unwrap();
//!     writer.insert(coast.into()).unwrap();
//! })
//! .join()
//! .unwrap();
//!
//! let found = db.request_data(&[LayerKind::CoastLine], &Geodetic::surface(35.0, 139.0), 100.0, 0.0)?;
//! assert_eq!(found[0].len(), 1);
//! # Ok(())
//! # }
//! ```

use super::MapDb;
use crate::config::Config;
use crate::error::Result;
use crate::layer::{LayerData, LayerKind};
use crate::tree::{LayerHandle, RestructReport, SaveReport};
use geoquad_types::coord::Geodetic;
use geoquad_types::stats::MapStats;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep of the maintenance thread.
const MAINTENANCE_TICK: Duration = Duration::from_millis(50);

/// Thread-safe wrapper around `MapDb` using `Arc<RwLock<MapDb>>`.
#[derive(Clone)]
pub struct SyncMapDb {
    inner: Arc<RwLock<MapDb>>,
}

impl SyncMapDb {
    /// Wrap an already constructed database.
    pub fn new(db: MapDb) -> Self {
        Self {
            inner: Arc::new(RwLock::new(db)),
        }
    }

    /// Create and initialize a database with `config`.
    pub fn open(config: Config) -> Result<Self> {
        let mut db = MapDb::new(config);
        db.init()?;
        Ok(Self::new(db))
    }

    pub fn request(
        &self,
        kinds: &[LayerKind],
        center: &Geodetic,
        radius: f64,
        resolution: f64,
    ) -> Result<Vec<Vec<LayerHandle>>> {
        self.inner.write().request(kinds, center, radius, resolution)
    }

    /// Like [`SyncMapDb::request`], but returns copies of the matching data
    /// taken under the same lock.
    pub fn request_data(
        &self,
        kinds: &[LayerKind],
        center: &Geodetic,
        radius: f64,
        resolution: f64,
    ) -> Result<Vec<Vec<LayerData>>> {
        let mut db = self.inner.write();
        let handles = db.request(kinds, center, radius, resolution)?;
        Ok(handles
            .iter()
            .map(|list| list.iter().filter_map(|h| db.resolve(h).cloned()).collect())
            .collect())
    }

    pub fn insert(&self, data: LayerData) -> Result<()> {
        self.inner.write().insert(data)
    }

    pub fn erase(&self, handle: &LayerHandle) -> Result<()> {
        self.inner.write().erase(handle)
    }

    pub fn restruct(&self) -> Result<RestructReport> {
        self.inner.write().restruct()
    }

    pub fn save(&self) -> Result<SaveReport> {
        self.inner.write().save()
    }

    pub fn stats(&self) -> MapStats {
        self.inner.read().stats()
    }

    pub fn config(&self) -> Config {
        self.inner.read().config().clone()
    }

    /// Acquires a read lock for direct access to the database.
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, MapDb> {
        self.inner.read()
    }

    /// Acquires a write lock for direct access to the database.
    ///
    /// This allows several operations under a single lock, e.g. a request
    /// followed by [`MapDb::resolve`] on its handles.
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, MapDb> {
        self.inner.write()
    }

    /// Run `restruct()` and `save()` every `interval` on a dedicated thread.
    ///
    /// The thread stops when the returned handle is stopped or dropped.
    pub fn spawn_maintenance(&self, interval: Duration) -> MaintenanceHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let db = self.clone();
        let flag = Arc::clone(&stop);

        let thread = std::thread::spawn(move || {
            let mut next = Instant::now() + interval;
            while !flag.load(Ordering::Acquire) {
                let now = Instant::now();
                if now < next {
                    std::thread::sleep((next - now).min(MAINTENANCE_TICK));
                    continue;
                }
                next = now + interval;

                let mut guard = db.inner.write();
                match guard.restruct() {
                    Ok(report) if report.failures > 0 => {
                        log::warn!("Background restruct skipped {} items", report.failures)
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Background restruct failed: {}", e),
                }
                if let Err(e) = guard.save() {
                    log::warn!("Background save failed: {}", e);
                }
            }
            log::debug!("Maintenance thread stopped");
        });

        MaintenanceHandle {
            stop,
            thread: Some(thread),
        }
    }
}

/// Handle of a maintenance thread started by [`SyncMapDb::spawn_maintenance`].
pub struct MaintenanceHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Signal the thread and wait for it to finish its current pass.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::warn!("Maintenance thread panicked");
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// Ensure SyncMapDb is Send + Sync
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<SyncMapDb>;
};
