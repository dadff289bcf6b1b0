//! tilegraph is a tiled, demand-driven image-processing engine.
//!
//! Build a DAG of tile-producing nodes and terminal sinks, then execute it
//! under a fixed memory budget:
//!
//! - Only tiles a sink actually needs are computed.
//! - Caching nodes keep tiles in bounded LRU caches; a simulated-annealing
//!   optimizer splits the byte budget across them, guided by a symbolic
//!   cost simulator that replays the schedule without pixels.
//! - Kernels run on a fixed worker pool while one control thread owns all
//!   scheduling state; `finish` cancels cooperatively.
//!
//! The public surface is [`Graph`]: add nodes implementing [`OutNode`] and
//! [`SinkNode`] (or the stock ones in [`nodes`]), then call
//! [`Graph::compute`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod budget;
mod cache;
mod curve;
mod exec;
mod foundation;
mod graph;
mod node;
mod sim;
mod tile;

pub mod nodes;

pub use crate::budget::{AnnealOpts, MemoryAmount, MemoryDistribution, NodeBudget};
pub use crate::cache::{LruMap, ProtoCache, TileCache};
pub use crate::curve::{HilbertSpiralTiles, HilbertTiles};
pub use crate::exec::driver::ComputeStats;
pub use crate::foundation::error::{TileGraphError, TileGraphResult};
pub use crate::foundation::geom::{Dimensions, Point, Rect, RectF};
pub use crate::graph::{ComputeOpts, Graph, Optimizer};
pub use crate::node::{
    DurationEstimator, MemoryMode, NodeId, OutNode, SharedOutNode, SharedSinkNode, SharedTile,
    SinkNode, TileGrid, TILE_DIMENSIONS,
};
pub use crate::sim::{OutNodeReport, SimReport, SinkReport};
pub use crate::tile::{PixelFormat, Tile, TileBuffer};
