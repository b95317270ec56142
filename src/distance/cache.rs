//! Shared distance-matrix cache.
//!
//! Entries are keyed by a content hash of the coordinate-key list, the
//! provider's distance type and a provider scope. The scope separates
//! providers of the same type that would answer differently for the same
//! coordinates. The map is read-mostly behind an `RwLock`; each
//! key owns a slot mutex that is held while the matrix is computed, so
//! concurrent callers for the same key wait for a single computation instead
//! of fetching the matrix twice.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fxhash::{FxHashMap, FxHasher64};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::RoutingError;
use crate::models::CoordKey;

use super::{DistanceMatrix, DistanceType};

#[derive(Debug)]
struct CachedMatrix {
    keys: Vec<CoordKey>,
    scope: u64,
    matrix: Arc<DistanceMatrix>,
    inserted: Instant,
}

type Slot = Arc<Mutex<Option<CachedMatrix>>>;

/// Injectable cache of distance matrices.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use u_delivery::distance::{DistanceMatrix, DistanceType, MatrixCache};
/// use u_delivery::models::CoordKey;
///
/// let cache = MatrixCache::new(Some(Duration::from_secs(60)));
/// let keys = vec![CoordKey::new(0.0, 0.0, 6), CoordKey::new(0.0, 1.0, 6)];
/// let mut calls = 0;
/// for _ in 0..3 {
///     cache
///         .get_or_compute(&keys, DistanceType::Haversine, || {
///             calls += 1;
///             Ok(DistanceMatrix::new(2))
///         })
///         .unwrap();
/// }
/// assert_eq!(calls, 1);
/// ```
#[derive(Debug, Default)]
pub struct MatrixCache {
    entries: RwLock<FxHashMap<u64, Slot>>,
    ttl: Option<Duration>,
}

impl MatrixCache {
    /// Creates a cache whose entries expire after `ttl` (never if `None`).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            ttl,
        }
    }

    /// Content hash of a coordinate list for a given source.
    pub fn content_hash(keys: &[CoordKey], distance_type: DistanceType) -> u64 {
        Self::scoped_hash(keys, distance_type, 0)
    }

    /// Content hash of a coordinate list for a given source and provider scope.
    pub fn scoped_hash(keys: &[CoordKey], distance_type: DistanceType, scope: u64) -> u64 {
        let mut hasher = FxHasher64::default();
        keys.len().hash(&mut hasher);
        for key in keys {
            key.hash(&mut hasher);
        }
        distance_type.hash(&mut hasher);
        scope.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns the cached matrix for `keys`, computing it on a miss.
    ///
    /// `compute` runs at most once at a time per key. Errors are returned to
    /// the caller and not cached, so a later call retries.
    pub fn get_or_compute<F>(
        &self,
        keys: &[CoordKey],
        distance_type: DistanceType,
        compute: F,
    ) -> Result<Arc<DistanceMatrix>, RoutingError>
    where
        F: FnOnce() -> Result<DistanceMatrix, RoutingError>,
    {
        self.get_or_compute_scoped(keys, distance_type, 0, compute)
    }

    /// Like [`get_or_compute`](Self::get_or_compute), with entries kept apart
    /// per provider `scope`.
    pub fn get_or_compute_scoped<F>(
        &self,
        keys: &[CoordKey],
        distance_type: DistanceType,
        scope: u64,
        compute: F,
    ) -> Result<Arc<DistanceMatrix>, RoutingError>
    where
        F: FnOnce() -> Result<DistanceMatrix, RoutingError>,
    {
        let hash = Self::scoped_hash(keys, distance_type, scope);
        let slot = self.slot(hash);
        let mut guard = slot.lock();

        if let Some(cached) = guard.as_ref() {
            if cached.scope != scope || cached.keys.as_slice() != keys {
                warn!(hash, "matrix cache hash collision; computing without caching");
                drop(guard);
                return compute().map(Arc::new);
            }
            if !self.is_expired(cached) {
                debug!(hash, "matrix cache hit");
                return Ok(cached.matrix.clone());
            }
            debug!(hash, "matrix cache entry expired");
        } else {
            debug!(hash, "matrix cache miss");
        }

        let matrix = Arc::new(compute()?);
        *guard = Some(CachedMatrix {
            keys: keys.to_vec(),
            scope,
            matrix: matrix.clone(),
            inserted: Instant::now(),
        });
        Ok(matrix)
    }

    /// Drops the entry for `keys`, returning `true` if one was cached.
    pub fn invalidate(&self, keys: &[CoordKey], distance_type: DistanceType) -> bool {
        self.invalidate_scoped(keys, distance_type, 0)
    }

    /// Drops the entry for `keys` under `scope`.
    ///
    /// The slot itself stays in the map and is emptied under its own lock, so
    /// an in-flight computation finishes first and later callers still queue
    /// on the same slot.
    pub fn invalidate_scoped(
        &self,
        keys: &[CoordKey],
        distance_type: DistanceType,
        scope: u64,
    ) -> bool {
        let hash = Self::scoped_hash(keys, distance_type, scope);
        let Some(slot) = self.entries.read().get(&hash).cloned() else {
            return false;
        };
        let mut guard = slot.lock();
        guard.take().is_some()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let slots: Vec<Slot> = self.entries.read().values().cloned().collect();
        for slot in slots {
            slot.lock().take();
        }
    }

    /// Number of cached matrices.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|slot| slot.lock().is_some())
            .count()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, hash: u64) -> Slot {
        if let Some(slot) = self.entries.read().get(&hash) {
            return slot.clone();
        }
        self.entries.write().entry(hash).or_default().clone()
    }

    fn is_expired(&self, cached: &CachedMatrix) -> bool {
        self.ttl
            .is_some_and(|ttl| cached.inserted.elapsed() > ttl)
    }
}
