//! Node contracts: the `OutNode` and `SinkNode` traits the executor drives.
//!
//! The original design expressed node capabilities through an inheritance
//! lattice; here a node is one trait object and the executor queries optional
//! capabilities (`cache()`, `timing()`) for presence.

mod grid;
mod timing;

pub use grid::TileGrid;
pub use timing::DurationEstimator;

use crate::cache::{ProtoCache, TileCache};
use crate::foundation::error::TileGraphResult;
use crate::foundation::geom::{Dimensions, Point, Rect};
use crate::tile::{PixelFormat, Tile};
use std::sync::Arc;
use std::time::Instant;

/// Shared handle to an output-producing node.
pub type SharedOutNode = Arc<dyn OutNode>;
/// Shared handle to a sink node.
pub type SharedSinkNode = Arc<dyn SinkNode>;
/// Shared handle to a finished tile.
pub type SharedTile = Arc<Tile>;

/// Canonical tile size nodes compute in unless they override
/// [`OutNode::tile_dimensions`].
pub const TILE_DIMENSIONS: Dimensions = Dimensions {
    width: 32,
    height: 32,
};

/// Caching policy of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MemoryMode {
    /// The node never caches.
    NoMemory,
    /// The node may cache tiles up to an assigned byte budget.
    AnyMemory,
    /// The node holds its entire output in memory; its full size counts
    /// against the budget up front.
    FullMemory,
}

/// Identity of a node within a graph, derived from its shared allocation.
///
/// Two handles to the same node always map to the same id; distinct nodes
/// never collide while either is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Identity of an output node.
    pub fn of_out(node: &SharedOutNode) -> Self {
        Self(Arc::as_ptr(node) as *const () as usize)
    }

    /// Identity of a sink node.
    pub fn of_sink(node: &SharedSinkNode) -> Self {
        Self(Arc::as_ptr(node) as *const () as usize)
    }
}

/// An output-producing node: a pure tile function plus the metadata the
/// scheduler, cache layer, and annealer need.
///
/// Implementations must be immutable once created (interior caches and
/// estimators aside): `input_region` is deterministic and monotone (a larger
/// output rectangle maps to an input rectangle containing the image of any
/// sub-rectangle), and `compute` depends only on its inputs.
pub trait OutNode: Send + Sync {
    /// Short name used in diagnostics.
    fn label(&self) -> &str {
        "node"
    }

    /// Output extent in pixels.
    fn dimensions(&self) -> Dimensions;

    /// Number of interleaved channels.
    fn channels(&self) -> usize;

    /// Element type of produced tiles.
    fn format(&self) -> PixelFormat;

    /// Caching policy.
    fn memory_mode(&self) -> MemoryMode;

    /// Number of inputs.
    fn input_count(&self) -> usize;

    /// Input node at `index`; panics when `index >= input_count()`.
    fn input(&self, index: usize) -> &SharedOutNode;

    /// Unclipped input region needed to compute `out_rect` from input
    /// `index`.
    fn raw_input_region(&self, index: usize, out_rect: Rect) -> Rect;

    /// Input region needed to compute `out_rect`, clipped to the input's
    /// dimensions.
    fn input_region(&self, index: usize, out_rect: Rect) -> Rect {
        self.raw_input_region(index, out_rect)
            .clip_to(self.input(index).dimensions())
    }

    /// Canonical tile size.
    fn tile_dimensions(&self) -> Dimensions {
        TILE_DIMENSIONS
    }

    /// Canonical tile grid.
    fn grid(&self) -> TileGrid {
        TileGrid::new(self.dimensions(), self.tile_dimensions())
    }

    /// Tile cache, present on caching nodes only.
    fn cache(&self) -> Option<&TileCache> {
        None
    }

    /// Duration estimator, present on nodes with meaningful kernel cost.
    fn timing(&self) -> Option<&DurationEstimator> {
        None
    }

    /// Return `true` when `rect` may be cached (canonical tiles of caching
    /// nodes only).
    fn is_cacheable(&self, rect: Rect) -> bool {
        self.cache().is_some() && self.grid().is_tile(rect)
    }

    /// Element width in bytes.
    fn element_bytes(&self) -> usize {
        self.format().bytes_per_element()
    }

    /// Bytes needed to hold the node's entire output.
    fn full_byte_count(&self) -> usize {
        self.element_bytes() * self.dimensions().area() * self.channels()
    }

    /// Convert a byte budget into a cache capacity in tile slots.
    fn cache_slots_from_bytes(&self, bytes: usize) -> usize {
        self.grid()
            .slots_from_bytes(self.element_bytes() * self.channels(), bytes)
    }

    /// Program the cache to a byte budget; no-op on cacheless nodes.
    fn set_cache_bytes(&self, bytes: usize) {
        if let Some(cache) = self.cache() {
            cache.resize(self.cache_slots_from_bytes(bytes));
        }
    }

    /// Key-only snapshot of the cache for the simulator.
    fn create_proto_cache(&self) -> Option<ProtoCache> {
        self.cache().map(TileCache::to_proto)
    }

    /// The kernel: fill `output` from `inputs`, which arrive in input order
    /// covering (at least) the regions reported by `input_region`.
    fn compute(&self, inputs: &[SharedTile], output: &mut Tile) -> TileGraphResult<()>;

    /// Measure one cold kernel run on zero-filled synthetic inputs; seeds
    /// the duration estimator for unseen tile dimensions.
    fn cold_duration(&self, dims: Dimensions) -> f64 {
        let rect = Rect::from_dims(dims);
        let inputs: Vec<SharedTile> = (0..self.input_count())
            .map(|i| {
                let input = self.input(i);
                Arc::new(Tile::zeroed(
                    self.input_region(i, rect),
                    input.channels(),
                    input.format(),
                ))
            })
            .collect();
        let mut output = Tile::zeroed(rect, self.channels(), self.format());
        let start = Instant::now();
        match self.compute(&inputs, &mut output) {
            Ok(()) => start.elapsed().as_secs_f64(),
            Err(_) => 0.0,
        }
    }

    /// Estimated duration (seconds) to compute a tile of this shape.
    fn tile_duration(&self, rect: Rect) -> f64 {
        match self.timing() {
            Some(estimator) => {
                estimator.duration(rect.dims(), || self.cold_duration(rect.dims()))
            }
            None => 0.0,
        }
    }

    /// Fold a measured tile duration into the estimator.
    fn record_tile_duration(&self, rect: Rect, seconds: f64) {
        if let Some(estimator) = self.timing() {
            estimator.update(rect.dims(), seconds);
        }
    }

    /// Annealer hint: probability that a cached tile is invalidated by an
    /// edit to this node.
    fn change_probability(&self) -> f64 {
        0.0
    }

    /// Annealer hint: probability that this node's cache is dropped
    /// entirely.
    fn removal_probability(&self) -> f64 {
        0.5
    }

    /// Annealer hint: caches flagged important are funded before the rest.
    fn is_cache_important(&self) -> bool {
        false
    }
}

/// A terminal node consuming tiles for side effects.
///
/// The engine requests every canonical tile of the sink's input in
/// Hilbert-spiral order around [`SinkNode::central_point`], feeds each to
/// [`SinkNode::consume_tile`] as it completes, and calls
/// [`SinkNode::finalize`] once after all tiles arrived. File output and
/// other externally visible effects belong in `finalize`; `consume_tile`
/// may only accumulate per-tile state and must tolerate concurrent calls.
pub trait SinkNode: Send + Sync {
    /// Short name used in diagnostics.
    fn label(&self) -> &str {
        "sink"
    }

    /// The node this sink drains.
    fn input(&self) -> &SharedOutNode;

    /// Consumed extent; equals the input's extent.
    fn dimensions(&self) -> Dimensions {
        self.input().dimensions()
    }

    /// Scheduling weight; must be positive and finite.
    fn relevance(&self) -> f64 {
        1.0
    }

    /// Point of interest; tiles near it are requested first.
    fn central_point(&self) -> Point {
        let dims = self.dimensions();
        Point::new(dims.width / 2, dims.height / 2)
    }

    /// Canonical tile size requested from the input.
    fn tile_dimensions(&self) -> Dimensions {
        TILE_DIMENSIONS
    }

    /// Spiral block size, in tiles.
    fn block_dimensions(&self) -> Dimensions {
        Dimensions::square(2)
    }

    /// Accumulate one finished tile. May run concurrently on pool threads.
    fn consume_tile(&self, tile: &Tile) -> TileGraphResult<()>;

    /// Run the sink's side effects once every tile has been consumed.
    fn finalize(&self) -> TileGraphResult<()> {
        Ok(())
    }
}
