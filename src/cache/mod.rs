//! Bounded LRU containers and the per-node tile cache built on them.

mod lru;
mod tile_cache;

pub use lru::LruMap;
pub use tile_cache::{ProtoCache, TileCache};
