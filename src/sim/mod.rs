//! The proto-graph adaptor: replays the scheduler's tile requests
//! symbolically, without pixels, to estimate the cost of a cache
//! configuration.
//!
//! Requests walk the same dependency structure the real adaptor would
//! build; per-node proto-caches decide hit or miss, and per-tile duration
//! estimates accumulate into per-node and per-sink totals.

use crate::cache::ProtoCache;
use crate::curve::{HilbertSpiralTiles, HilbertTiles};
use crate::exec::relevance::RelevanceChoice;
use crate::foundation::geom::Rect;
use crate::node::{MemoryMode, NodeId, SharedOutNode, SharedSinkNode};
use rustc_hash::FxHashMap;

/// Per-node counters accumulated during one simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OutNodeReport {
    /// Regions requested from the node.
    pub requests: u64,
    /// Requests that missed the cache and forced a computation.
    pub computations: u64,
    /// Estimated seconds spent computing this node's tiles.
    pub duration: f64,
}

/// Per-sink totals accumulated during one simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SinkReport {
    /// The sink's scheduling weight.
    pub relevance: f64,
    /// Estimated seconds attributed to this sink's requests.
    pub duration: f64,
}

/// Everything a simulation run produced.
#[derive(Clone, Debug, Default)]
pub struct SimReport {
    /// Counters per out node.
    pub out: FxHashMap<NodeId, OutNodeReport>,
    /// Totals per sink, in registration order.
    pub sinks: Vec<SinkReport>,
    /// Total estimated seconds for the whole schedule.
    pub total: f64,
}

struct OutSim {
    cache: Option<ProtoCache>,
    report: OutNodeReport,
}

struct SinkSim {
    sink: SharedSinkNode,
    tiles: HilbertSpiralTiles,
    next: Option<Rect>,
    report: SinkReport,
}

/// Symbolic twin of the graph adaptor.
pub(crate) struct ProtoGraphAdaptor {
    out: FxHashMap<NodeId, OutSim>,
    sinks: Vec<SinkSim>,
    chooser: RelevanceChoice<usize>,
}

impl ProtoGraphAdaptor {
    pub(crate) fn new() -> Self {
        Self {
            out: FxHashMap::default(),
            sinks: Vec::new(),
            chooser: RelevanceChoice::new(),
        }
    }

    /// Register an out node with the given proto-cache capacity (ignored
    /// for nodes that do not cache).
    pub(crate) fn add_out_node(&mut self, node: &SharedOutNode, capacity: usize) {
        let mut cache = node.create_proto_cache();
        if node.memory_mode() == MemoryMode::AnyMemory {
            if let Some(cache) = cache.as_mut() {
                cache.resize(capacity);
            }
        }
        self.out.insert(
            NodeId::of_out(node),
            OutSim {
                cache,
                report: OutNodeReport::default(),
            },
        );
    }

    /// Register a sink; its tile requests join the relevance schedule.
    pub(crate) fn add_sink(&mut self, sink: &SharedSinkNode) {
        let region = Rect::from_dims(sink.dimensions());
        let mut tiles = HilbertSpiralTiles::new(
            region,
            sink.central_point(),
            sink.input().dimensions(),
            sink.tile_dimensions(),
            sink.block_dimensions(),
        );
        let next = tiles.next();
        let index = self.sinks.len();
        let relevance = sink.relevance();
        if next.is_some() {
            self.chooser.add(index, relevance);
        }
        self.sinks.push(SinkSim {
            sink: SharedSinkNode::clone(sink),
            tiles,
            next,
            report: SinkReport {
                relevance,
                duration: 0.0,
            },
        });
    }

    /// Advance the preferred sink by one tile request; returns the
    /// estimated seconds that request cost, or `None` when done.
    pub(crate) fn step(&mut self) -> Option<f64> {
        let index = self.chooser.pick()?;
        let (input, region) = {
            let sim = &mut self.sinks[index];
            let region = sim.next.take()?;
            sim.next = sim.tiles.next();
            (SharedOutNode::clone(sim.sink.input()), region)
        };

        let time = self.request_out(&input, region);

        let sim = &mut self.sinks[index];
        if sim.next.is_none() {
            self.chooser.remove(&index);
        }
        sim.report.duration += time;
        Some(time)
    }

    /// Run the whole schedule; returns the total estimated seconds.
    pub(crate) fn run(&mut self) -> f64 {
        let mut total = 0.0;
        while let Some(time) = self.step() {
            total += time;
        }
        total
    }

    /// Counters gathered so far.
    pub(crate) fn report(&self) -> SimReport {
        let mut out = FxHashMap::default();
        let mut total = 0.0;
        for (id, sim) in &self.out {
            out.insert(*id, sim.report);
        }
        let sinks = self
            .sinks
            .iter()
            .map(|s| {
                total += s.report.duration;
                s.report
            })
            .collect();
        SimReport { out, sinks, total }
    }

    /// One region request against a node: count it, and recurse into a
    /// computation on a cache miss.
    fn request_out(&mut self, node: &SharedOutNode, region: Rect) -> f64 {
        let id = NodeId::of_out(node);
        let miss = {
            // Nodes the caller forgot to register simulate as uncached.
            let sim = self.out.entry(id).or_insert_with(|| OutSim {
                cache: None,
                report: OutNodeReport::default(),
            });
            sim.report.requests += 1;
            node.memory_mode() != MemoryMode::AnyMemory
                || !sim.cache.as_mut().map_or(false, |c| c.contains(region))
        };
        if !miss {
            return 0.0;
        }
        if let Some(sim) = self.out.get_mut(&id) {
            sim.report.computations += 1;
        }
        self.compute_out(node, region)
    }

    /// Symbolic computation of one region: recurse into the dependencies
    /// the real task would request, then charge the node's own tile cost.
    fn compute_out(&mut self, node: &SharedOutNode, region: Rect) -> f64 {
        let is_tile = node.grid().is_tile(region);
        let mut dep_time = 0.0;

        if is_tile {
            for index in 0..node.input_count() {
                let dep = SharedOutNode::clone(node.input(index));
                let dep_region = node.input_region(index, region);
                dep_time += self.request_out(&dep, dep_region);
            }
        } else {
            let tiles: Vec<Rect> =
                HilbertTiles::new(region, node.dimensions(), node.tile_dimensions()).collect();
            for sub in tiles {
                dep_time += self.request_out(node, sub);
            }
        }

        let own_time = if is_tile { node.tile_duration(region) } else { 0.0 };
        if let Some(sim) = self.out.get_mut(&NodeId::of_out(node)) {
            if node.memory_mode() == MemoryMode::AnyMemory && node.is_cacheable(region) {
                if let Some(cache) = sim.cache.as_mut() {
                    cache.put(region);
                }
            }
            sim.report.duration += own_time;
        }
        own_time + dep_time
    }
}
