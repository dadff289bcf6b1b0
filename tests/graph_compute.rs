//! End-to-end pipelines: build a small graph, compute it, and check the
//! sink's bytes.

use std::sync::atomic::{AtomicUsize, Ordering};
use tilegraph::nodes::{CollectSinkNode, ImageSourceNode, LinearMapNode, MeanFilterNode};
use tilegraph::{
    ComputeOpts, Dimensions, Graph, MemoryMode, OutNode, PixelFormat, Rect, SharedOutNode,
    SharedTile, Tile, TileCache, TileGraphError, TileGraphResult,
};

fn gradient(dims: Dimensions, channels: usize) -> Tile {
    let mut tile = Tile::zeroed(Rect::from_dims(dims), channels, PixelFormat::U8);
    for y in 0..dims.height {
        for x in 0..dims.width {
            for c in 0..channels {
                tile.set_value(x, y, c, ((x + 3 * y + 17 * c) % 256) as f64);
            }
        }
    }
    tile
}

fn opts() -> ComputeOpts {
    ComputeOpts { threads: Some(2) }
}

#[test]
fn empty_graph_returns_immediately() {
    let graph = Graph::new();
    let stats = graph.compute(1 << 24, opts()).unwrap();
    assert_eq!(stats.tasks_completed, 0);
    assert!(!stats.cancelled);
}

#[test]
fn single_source_reaches_the_sink_byte_for_byte() {
    let image = gradient(Dimensions::new(64, 64), 3);
    let mut graph = Graph::new();
    let source = graph.add_out_node(ImageSourceNode::new(image.clone()).unwrap());
    let sink = graph.add_sink_node(CollectSinkNode::new(source as SharedOutNode));

    let stats = graph.compute(1 << 24, opts()).unwrap();
    assert!(!stats.cancelled);
    assert!(sink.is_complete());
    assert_eq!(sink.take().unwrap(), image);
}

#[test]
fn linear_map_transforms_every_pixel() {
    let image = gradient(Dimensions::new(64, 48), 1);
    let mut graph = Graph::new();
    let source = graph.add_out_node(ImageSourceNode::new(image.clone()).unwrap());
    let map = graph.add_out_node(LinearMapNode::new(source as SharedOutNode, 2.0, 1.0));
    let sink = graph.add_sink_node(CollectSinkNode::new(map as SharedOutNode));

    graph.compute(1 << 24, opts()).unwrap();
    let out = sink.take().unwrap();
    for y in 0..48 {
        for x in 0..64 {
            let expected = (2.0 * image.value_at(x, y, 0) + 1.0).min(255.0);
            assert_eq!(out.value_at(x, y, 0), expected, "at ({x}, {y})");
        }
    }
}

#[test]
fn mean_filter_keeps_a_flat_image_flat() {
    let mut image = Tile::zeroed(Rect::from_dims(Dimensions::new(80, 50)), 2, PixelFormat::U8);
    for y in 0..50 {
        for x in 0..80 {
            for c in 0..2 {
                image.set_value(x, y, c, 40.0 + 10.0 * c as f64);
            }
        }
    }
    let mut graph = Graph::new();
    let source = graph.add_out_node(ImageSourceNode::new(image).unwrap());
    let filter = graph.add_out_node(MeanFilterNode::new(source as SharedOutNode));
    let sink = graph.add_sink_node(CollectSinkNode::new(filter as SharedOutNode));

    graph.compute(1 << 24, opts()).unwrap();
    let out = sink.take().unwrap();
    for y in 0..50 {
        for x in 0..80 {
            assert_eq!(out.value_at(x, y, 0), 40.0, "at ({x}, {y})");
            assert_eq!(out.value_at(x, y, 1), 50.0, "at ({x}, {y})");
        }
    }
}

/// Pass-through node that counts kernel invocations.
struct CountingNode {
    input: SharedOutNode,
    cache: TileCache,
    computes: AtomicUsize,
}

impl CountingNode {
    fn new(input: SharedOutNode) -> Self {
        Self {
            input,
            cache: TileCache::disabled(),
            computes: AtomicUsize::new(0),
        }
    }
}

impl OutNode for CountingNode {
    fn dimensions(&self) -> Dimensions {
        self.input.dimensions()
    }
    fn channels(&self) -> usize {
        self.input.channels()
    }
    fn format(&self) -> PixelFormat {
        self.input.format()
    }
    fn memory_mode(&self) -> MemoryMode {
        MemoryMode::AnyMemory
    }
    fn input_count(&self) -> usize {
        1
    }
    fn input(&self, _: usize) -> &SharedOutNode {
        &self.input
    }
    fn raw_input_region(&self, _: usize, out_rect: Rect) -> Rect {
        out_rect
    }
    fn cache(&self) -> Option<&TileCache> {
        Some(&self.cache)
    }
    fn cold_duration(&self, _: Dimensions) -> f64 {
        1e-3
    }
    fn compute(&self, inputs: &[SharedTile], output: &mut Tile) -> TileGraphResult<()> {
        self.computes.fetch_add(1, Ordering::SeqCst);
        let input = inputs
            .first()
            .ok_or_else(|| TileGraphError::kernel("missing input"))?;
        output.copy_overlap(input)
    }
}

#[test]
fn a_shared_intermediate_is_computed_once_per_tile() {
    let image = gradient(Dimensions::new(64, 64), 1);
    let mut graph = Graph::new();
    let source = graph.add_out_node(ImageSourceNode::new(image).unwrap());
    let shared = graph.add_out_node(CountingNode::new(source as SharedOutNode));
    let sink_a = graph.add_sink_node(CollectSinkNode::new(shared.clone() as SharedOutNode));
    let sink_b = graph.add_sink_node(CollectSinkNode::new(shared.clone() as SharedOutNode));

    graph.compute(1 << 24, opts()).unwrap();
    assert!(sink_a.is_complete());
    assert!(sink_b.is_complete());

    // 64x64 in 32x32 tiles: 4 canonical tiles, each computed exactly once
    // thanks to task deduplication and the warm cache.
    assert_eq!(shared.computes.load(Ordering::SeqCst), 4);
    assert_eq!(sink_a.take(), sink_b.take());
}

#[test]
fn computing_twice_yields_identical_results() {
    let image = gradient(Dimensions::new(96, 64), 2);
    let mut graph = Graph::new();
    let source = graph.add_out_node(ImageSourceNode::new(image).unwrap());
    let map = graph.add_out_node(LinearMapNode::new(source as SharedOutNode, 0.5, 8.0));
    let sink = graph.add_sink_node(CollectSinkNode::new(map as SharedOutNode));

    graph.compute(1 << 24, opts()).unwrap();
    let first = sink.take().unwrap();

    graph.compute(1 << 24, opts()).unwrap();
    let second = sink.take().unwrap();
    assert_eq!(first, second);
}

/// Pass-through node that sleeps per tile, to give cancellation a window.
struct SlowNode {
    input: SharedOutNode,
    delay: std::time::Duration,
}

impl OutNode for SlowNode {
    fn dimensions(&self) -> Dimensions {
        self.input.dimensions()
    }
    fn channels(&self) -> usize {
        self.input.channels()
    }
    fn format(&self) -> PixelFormat {
        self.input.format()
    }
    fn memory_mode(&self) -> MemoryMode {
        MemoryMode::NoMemory
    }
    fn input_count(&self) -> usize {
        1
    }
    fn input(&self, _: usize) -> &SharedOutNode {
        &self.input
    }
    fn raw_input_region(&self, _: usize, out_rect: Rect) -> Rect {
        out_rect
    }
    fn cold_duration(&self, _: Dimensions) -> f64 {
        self.delay.as_secs_f64()
    }
    fn compute(&self, inputs: &[SharedTile], output: &mut Tile) -> TileGraphResult<()> {
        std::thread::sleep(self.delay);
        let input = inputs
            .first()
            .ok_or_else(|| TileGraphError::kernel("missing input"))?;
        output.copy_overlap(input)
    }
}

#[test]
fn finish_cancels_a_running_compute_and_allows_another() {
    let image = gradient(Dimensions::new(256, 256), 1);
    let mut graph = Graph::new();
    let source = graph.add_out_node(ImageSourceNode::new(image).unwrap());
    let slow = graph.add_out_node(SlowNode {
        input: source as SharedOutNode,
        delay: std::time::Duration::from_millis(5),
    });
    let sink = graph.add_sink_node(CollectSinkNode::new(slow as SharedOutNode));

    let stats = std::thread::scope(|scope| {
        let handle = scope.spawn(|| graph.compute(1 << 24, opts()).unwrap());
        std::thread::sleep(std::time::Duration::from_millis(30));
        graph.finish();
        handle.join().unwrap()
    });
    // 64 slow tiles at 5 ms on 2 workers leave plenty of schedule to cut.
    assert!(stats.cancelled);
    assert!(!sink.is_complete());

    // The graph is reusable after cancellation.
    sink.take();
    let stats = graph.compute(1 << 24, opts()).unwrap();
    assert!(!stats.cancelled);
    assert!(sink.is_complete());
    assert!(stats.tasks_completed > 0);
}

/// Node whose kernel always fails.
struct FailingNode {
    input: SharedOutNode,
}

impl OutNode for FailingNode {
    fn dimensions(&self) -> Dimensions {
        self.input.dimensions()
    }
    fn channels(&self) -> usize {
        self.input.channels()
    }
    fn format(&self) -> PixelFormat {
        self.input.format()
    }
    fn memory_mode(&self) -> MemoryMode {
        MemoryMode::NoMemory
    }
    fn input_count(&self) -> usize {
        1
    }
    fn input(&self, _: usize) -> &SharedOutNode {
        &self.input
    }
    fn raw_input_region(&self, _: usize, out_rect: Rect) -> Rect {
        out_rect
    }
    fn cold_duration(&self, _: Dimensions) -> f64 {
        0.0
    }
    fn compute(&self, _: &[SharedTile], _: &mut Tile) -> TileGraphResult<()> {
        Err(TileGraphError::kernel("deliberate failure"))
    }
}

#[test]
fn a_failing_kernel_fails_the_compute() {
    let image = gradient(Dimensions::new(64, 64), 1);
    let mut graph = Graph::new();
    let source = graph.add_out_node(ImageSourceNode::new(image).unwrap());
    let failing = graph.add_out_node(FailingNode {
        input: source as SharedOutNode,
    });
    graph.add_sink_node(CollectSinkNode::new(failing as SharedOutNode));

    let result = graph.compute(1 << 24, opts());
    assert!(matches!(result, Err(TileGraphError::Kernel(_))));

    // A failed compute releases the run state for the next attempt.
    let result = graph.compute(1 << 24, opts());
    assert!(result.is_err());
}
