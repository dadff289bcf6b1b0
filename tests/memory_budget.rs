//! Memory distribution end to end: feasibility classes, annealed budgets,
//! and the pure simulator call.

use std::sync::Arc;
use tilegraph::nodes::{CollectSinkNode, ImageSourceNode, LinearMapNode, MeanFilterNode};
use tilegraph::{
    AnnealOpts, ComputeOpts, Dimensions, Graph, MemoryAmount, PixelFormat, Rect, SharedOutNode,
    Tile,
};

fn image(dims: Dimensions) -> Tile {
    let mut tile = Tile::zeroed(Rect::from_dims(dims), 1, PixelFormat::U8);
    for y in 0..dims.height {
        for x in 0..dims.width {
            tile.set_value(x, y, 0, ((7 * x + y) % 256) as f64);
        }
    }
    tile
}

struct Fixture {
    graph: Graph,
    sink: Arc<CollectSinkNode>,
}

/// source (full memory, 4096 B) -> linear map (cache) -> mean filter
/// (important cache) -> sink.
fn pipeline() -> Fixture {
    let mut graph = Graph::new();
    let source = graph.add_out_node(ImageSourceNode::new(image(Dimensions::new(64, 64))).unwrap());
    let map = graph.add_out_node(
        LinearMapNode::new(source as SharedOutNode, 1.0, 0.0).with_change_probability(0.3),
    );
    let filter = graph.add_out_node(MeanFilterNode::new(map as SharedOutNode));
    let sink = graph.add_sink_node(CollectSinkNode::new(filter as SharedOutNode));
    Fixture { graph, sink }
}

#[test]
fn a_generous_budget_is_enough_for_all() {
    let fixture = pipeline();
    let dist = fixture.graph.optimize_memory_distribution(1 << 24);
    assert_eq!(dist.amount(), MemoryAmount::EnoughForAll);
    assert!(dist.cache_nodes().iter().all(|b| b.bytes == b.max_bytes));
}

#[test]
fn an_overflowing_full_memory_reserve_is_too_little() {
    let fixture = pipeline();
    // The source alone needs 4096 bytes.
    let dist = fixture.graph.optimize_memory_distribution(1000);
    assert_eq!(dist.amount(), MemoryAmount::TooLittle);
    assert_eq!(dist.memory_limit(), 0);
    assert!(dist.cache_nodes().iter().all(|b| b.bytes == 0));

    // Zero cache bytes still computes, it just recomputes tiles.
    let stats = fixture
        .graph
        .compute_with(&dist, ComputeOpts { threads: Some(2) })
        .unwrap();
    assert!(!stats.cancelled);
    assert!(fixture.sink.is_complete());
}

#[test]
fn a_middling_budget_is_annealed_over_the_cache_nodes() {
    let fixture = pipeline();
    let opts = AnnealOpts {
        seed: Some(42),
        ..AnnealOpts::default()
    };
    // Source reserve (4096) + one full cache (4096) + half a cache (2048):
    // sufficient for the important filter, annealed with the map.
    let dist = fixture
        .graph
        .optimize_memory_distribution_with(4096 + 4096 + 2048, &opts);

    assert_eq!(dist.amount(), MemoryAmount::Sufficient);
    let total: usize = dist.cache_nodes().iter().map(|b| b.bytes).sum();
    assert!(total <= 4096 + 2048, "assigned {total} bytes");
    assert_eq!(dist.cache_nodes().len(), 2);

    let stats = fixture
        .graph
        .compute_with(&dist, ComputeOpts { threads: Some(2) })
        .unwrap();
    assert!(!stats.cancelled);
    assert!(fixture.sink.is_complete());
}

#[test]
fn the_annealed_distribution_is_reproducible_under_a_seed() {
    let fixture = pipeline();
    let opts = AnnealOpts {
        seed: Some(7),
        ..AnnealOpts::default()
    };
    let budget = 4096 + 4096 + 2048;

    // First call probes and caches tile durations; run it once so both
    // measured trajectories see identical estimates.
    let _ = fixture.graph.optimize_memory_distribution_with(budget, &opts);

    let first = fixture.graph.optimize_memory_distribution_with(budget, &opts);
    let second = fixture.graph.optimize_memory_distribution_with(budget, &opts);

    let bytes = |dist: &tilegraph::MemoryDistribution| -> Vec<usize> {
        dist.cache_nodes().iter().map(|b| b.bytes).collect()
    };
    assert_eq!(bytes(&first), bytes(&second));
}

#[test]
fn computation_duration_is_a_pure_and_stable_estimate() {
    let fixture = pipeline();
    // Seed the duration estimators once.
    let _ = fixture.graph.computation_duration(4);

    let first = fixture.graph.computation_duration(4);
    let second = fixture.graph.computation_duration(4);
    assert_eq!(first, second);

    // The simulator alone must not run any sink side effects.
    assert!(!fixture.sink.is_complete());
    assert!(fixture.sink.snapshot().is_none());
}

#[test]
fn cache_budgets_shrink_with_the_offered_memory() {
    let fixture = pipeline();
    let generous = fixture.graph.optimize_memory_distribution(1 << 24);
    let tight = fixture.graph.optimize_memory_distribution(4096 + 1024);

    let sum = |d: &tilegraph::MemoryDistribution| -> usize {
        d.cache_nodes().iter().map(|b| b.bytes).sum()
    };
    assert!(sum(&tight) < sum(&generous));
}
