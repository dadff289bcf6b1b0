use crate::cache::lru::LruMap;
use crate::foundation::geom::Rect;
use crate::tile::Tile;
use std::sync::{Arc, Mutex};

/// Per-node tile cache: a mutex-guarded LRU map from region to shared tile.
///
/// Capacity is measured in tile slots. Under concurrent use one `put_sync`
/// may evict an entry another thread just inserted; callers must treat the
/// cache as a hint, never as the only holder of a tile they still need.
#[derive(Debug)]
pub struct TileCache {
    inner: Mutex<LruMap<Rect, Arc<Tile>>>,
}

impl TileCache {
    /// Cache holding at most `capacity` tiles.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruMap::new(capacity)),
        }
    }

    /// Cache in the degenerate capacity-0 state; `resize` re-enables it.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Number of resident tiles.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Return `true` when no tiles are resident.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Current capacity in tile slots.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Look up a region, refreshing its recency on a hit.
    pub fn get_sync(&self, rect: Rect) -> Option<Arc<Tile>> {
        self.lock().get(&rect).cloned()
    }

    /// Insert a tile, evicting least-recently-used entries as needed.
    pub fn put_sync(&self, rect: Rect, tile: Arc<Tile>) {
        self.lock().insert(rect, tile);
    }

    /// Change the capacity, truncating LRU-first when shrinking.
    pub fn resize(&self, capacity: usize) {
        self.lock().recapacitate(capacity);
    }

    /// Key-only snapshot at the same capacity, for the simulator.
    pub fn to_proto(&self) -> ProtoCache {
        let inner = self.lock();
        let mut proto = ProtoCache::new(inner.capacity());
        for (rect, _) in inner.iter() {
            proto.put(*rect);
        }
        proto
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruMap<Rect, Arc<Tile>>> {
        // A poisoned cache mutex means a kernel panicked mid-insert; the
        // map itself is still structurally sound.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Key-only shadow of a [`TileCache`] with identical LRU semantics.
///
/// Used by the proto-graph adaptor, which runs on a single thread; no lock.
#[derive(Debug)]
pub struct ProtoCache {
    set: LruMap<Rect, ()>,
}

impl ProtoCache {
    /// Proto-cache holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            set: LruMap::new(capacity),
        }
    }

    /// Number of resident keys.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Return `true` when no keys are resident.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Current capacity in key slots.
    pub fn capacity(&self) -> usize {
        self.set.capacity()
    }

    /// Membership test; refreshes recency on a hit.
    pub fn contains(&mut self, rect: Rect) -> bool {
        self.set.contains(&rect)
    }

    /// Insert a key, evicting LRU keys as needed.
    pub fn put(&mut self, rect: Rect) {
        self.set.insert(rect, ());
    }

    /// Change the capacity, truncating LRU-first when shrinking.
    pub fn resize(&mut self, capacity: usize) {
        self.set.recapacitate(capacity);
    }
}
