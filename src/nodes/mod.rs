//! A minimal set of concrete nodes: an in-memory source, two point/area
//! kernels, and an in-memory collecting sink.
//!
//! Production pipelines bring their own node implementations; these cover
//! one node of every role and double as the engine's test fixtures.

mod filter;
mod map;
mod sink;
mod source;

pub use filter::MeanFilterNode;
pub use map::LinearMapNode;
pub use sink::CollectSinkNode;
pub use source::ImageSourceNode;
