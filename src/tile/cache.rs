//! Tile cache for decoded tile buffers.
//!
//! This module memoizes decoded tiles by address so viewport renders that
//! overlap don't fetch and decode the same tile twice.
//!
//! # Single-flight
//!
//! Each address maps to a slot that is initialized at most once. The first
//! caller for an address runs the loader; concurrent callers for the same
//! address wait on the slot and observe the same result. Absent tiles are
//! memoized as well. A loader that fails leaves its slot empty, so the next
//! caller loads again.
//!
//! # Ownership
//!
//! The cache owns every buffer it holds. Callers get an `Arc` to a shared,
//! immutable buffer that may be in use by other renders at the same time.
//! Buffers are released on [`TileCache::clear`], on eviction, or when the
//! cache is dropped.
//!
//! # Eviction
//!
//! [`TileCache::unbounded`] never evicts. [`TileCache::with_capacity`] bounds
//! the number of resident entries with LRU eviction; an evicted address is
//! loaded again on its next request. Loads still in flight are kept apart
//! from the resident set and are never evicted, so a request for an address
//! that is being loaded always joins that load.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, OnceCell};

use super::TileAddress;
use crate::raster::PixelBuffer;

/// A decoded tile shared between the cache and its readers.
pub type SharedTile = Arc<PixelBuffer>;

/// One cache entry: empty while loading, then the tile or a memoized absence.
type Slot = Arc<OnceCell<Option<SharedTile>>>;

// =============================================================================
// Tile Cache
// =============================================================================

struct Entries {
    /// Completed loads, evicted in LRU order
    resident: LruCache<TileAddress, Slot>,

    /// Loads in flight, or failed and awaiting a retry
    loading: HashMap<TileAddress, Slot>,
}

impl Entries {
    fn new(resident: LruCache<TileAddress, Slot>) -> Self {
        Self {
            resident,
            loading: HashMap::new(),
        }
    }

    /// Move a completed slot from `loading` to `resident`, unless another
    /// caller already did or the entry was removed meanwhile.
    fn promote(&mut self, address: TileAddress, slot: &Slot) {
        if self
            .loading
            .get(&address)
            .is_some_and(|pending| Arc::ptr_eq(pending, slot))
        {
            self.loading.remove(&address);
            self.resident.put(address, slot.clone());
        }
    }

    /// Drop a failed slot nobody else is waiting on.
    fn discard(&mut self, address: TileAddress, slot: &Slot) {
        // One reference in the map, one held by the caller
        if self
            .loading
            .get(&address)
            .is_some_and(|pending| Arc::ptr_eq(pending, slot) && Arc::strong_count(slot) == 2)
        {
            self.loading.remove(&address);
        }
    }
}

/// Single-flight memo of decoded tile buffers keyed by [`TileAddress`].
///
/// # Thread Safety
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
/// The internal lock is only held while looking up or inserting a slot, never
/// while a loader runs.
///
/// # Example
///
/// ```
/// use deepzoom::raster::PixelBuffer;
/// use deepzoom::tile::{TileAddress, TileCache};
///
/// #[tokio::main]
/// async fn main() {
///     let cache = TileCache::unbounded();
///     let address = TileAddress::new(0, 1, 2);
///
///     let tile = cache
///         .get_or_create(address, |_| async {
///             Ok::<_, std::convert::Infallible>(Some(PixelBuffer::new(4, 4)))
///         })
///         .await
///         .unwrap();
///
///     assert_eq!(tile.unwrap().dimensions(), (4, 4));
///     assert_eq!(cache.load_count(), 1);
/// }
/// ```
pub struct TileCache {
    /// Slots indexed by address
    entries: Mutex<Entries>,

    /// Maximum number of resident entries, `None` when unbounded
    capacity: Option<NonZeroUsize>,

    /// Number of loader invocations
    loads: AtomicUsize,
}

impl TileCache {
    /// Create a cache that never evicts.
    ///
    /// Suitable for short-lived tools; the loader runs at most once per
    /// address for the lifetime of the cache.
    pub fn unbounded() -> Self {
        Self {
            entries: Mutex::new(Entries::new(LruCache::unbounded())),
            capacity: None,
            loads: AtomicUsize::new(0),
        }
    }

    /// Create a cache holding at most `capacity` completed entries with LRU
    /// eviction. In-flight loads don't count against the capacity.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(Entries::new(LruCache::new(capacity))),
            capacity: Some(capacity),
            loads: AtomicUsize::new(0),
        }
    }

    /// Get a tile, running `loader` only if no load for this address has
    /// completed or is in flight.
    ///
    /// `Ok(None)` means the tile doesn't exist; that answer is cached too.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error. Failed loads are not cached.
    pub async fn get_or_create<F, Fut, E>(
        &self,
        address: TileAddress,
        loader: F,
    ) -> Result<Option<SharedTile>, E>
    where
        F: FnOnce(TileAddress) -> Fut,
        Fut: Future<Output = Result<Option<PixelBuffer>, E>>,
    {
        let slot = {
            let mut entries = self.entries.lock().await;
            if let Some(slot) = entries.resident.get(&address) {
                return Ok(slot.get().cloned().flatten());
            }
            entries
                .loading
                .entry(address)
                .or_insert_with(Slot::default)
                .clone()
        };

        let result = slot
            .get_or_try_init(|| async move {
                self.loads.fetch_add(1, Ordering::SeqCst);
                loader(address).await.map(|tile| tile.map(Arc::new))
            })
            .await
            .cloned();

        let mut entries = self.entries.lock().await;
        match result {
            Ok(tile) => {
                entries.promote(address, &slot);
                Ok(tile)
            }
            Err(e) => {
                entries.discard(address, &slot);
                Err(e)
            }
        }
    }

    /// Get a loaded tile without triggering a load.
    ///
    /// Returns `None` if the address is not resident, still loading, or
    /// known to be absent. Marks the entry as recently used.
    pub async fn get(&self, address: &TileAddress) -> Option<SharedTile> {
        let mut entries = self.entries.lock().await;
        let tile = entries.resident.get(address)?.get()?.clone();
        tile
    }

    /// Check if a completed load (present or absent) is resident for this
    /// address, without updating LRU order.
    pub async fn contains(&self, address: &TileAddress) -> bool {
        let entries = self.entries.lock().await;
        entries
            .resident
            .peek(address)
            .is_some_and(|slot| slot.initialized())
    }

    /// Remove an entry. Returns the tile if one was loaded.
    ///
    /// A load in flight for `address` still completes for its callers but is
    /// not cached.
    pub async fn remove(&self, address: &TileAddress) -> Option<SharedTile> {
        let mut entries = self.entries.lock().await;
        entries.loading.remove(address);
        let slot = entries.resident.pop(address)?;
        let tile = slot.get()?.clone();
        tile
    }

    /// Release every held buffer.
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.resident.clear();
        entries.loading.clear();
    }

    /// Number of entries, including in-flight loads.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.resident.len() + entries.loading.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total number of loader invocations so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Maximum number of entries, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

// =============================================================================
// Tests
// =============================================================================
