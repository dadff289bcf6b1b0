//! Space-filling traversal orders for tile scheduling.
//!
//! Interior tiling tasks walk their tiles in generalized-Hilbert order;
//! sink merge tasks walk the whole image in a Hilbert-spiral centered on
//! the sink's point of interest. All walks are lazy iterators owned by a
//! single task and dropped at task retirement.

mod gilbert;
mod spiral;
mod tiles;

pub use tiles::{HilbertSpiralTiles, HilbertTiles};
