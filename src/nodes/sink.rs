use crate::foundation::error::TileGraphResult;
use crate::foundation::geom::{Point, Rect};
use crate::node::{SharedOutNode, SinkNode};
use crate::tile::Tile;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-memory sink: assembles its input into one tile and flags completion.
///
/// Tiles are folded into the output as they arrive (they never overlap, so
/// arrival order does not matter); `finalize` only flips the completion
/// flag, keeping all side effects in the finalization step.
pub struct CollectSinkNode {
    input: SharedOutNode,
    relevance: f64,
    centre: Option<Point>,
    output: Mutex<Option<Tile>>,
    complete: AtomicBool,
}

impl CollectSinkNode {
    /// Collect every tile of `input` with relevance 1.
    pub fn new(input: SharedOutNode) -> Self {
        Self::with_relevance(input, 1.0)
    }

    /// Collect every tile of `input` with the given scheduling weight.
    pub fn with_relevance(input: SharedOutNode, relevance: f64) -> Self {
        Self {
            input,
            relevance,
            centre: None,
            output: Mutex::new(None),
            complete: AtomicBool::new(false),
        }
    }

    /// Override the point of interest tiles spiral out from.
    pub fn with_central_point(mut self, centre: Point) -> Self {
        self.centre = Some(centre);
        self
    }

    /// `true` once `finalize` ran.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Copy of the assembled image, if any tiles arrived yet.
    pub fn snapshot(&self) -> Option<Tile> {
        self.lock().clone()
    }

    /// Take the assembled image, resetting the sink for another run.
    pub fn take(&self) -> Option<Tile> {
        self.complete.store(false, Ordering::Release);
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Tile>> {
        self.output.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SinkNode for CollectSinkNode {
    fn label(&self) -> &str {
        "collect-sink"
    }

    fn input(&self) -> &SharedOutNode {
        &self.input
    }

    fn relevance(&self) -> f64 {
        self.relevance
    }

    fn central_point(&self) -> Point {
        self.centre.unwrap_or_else(|| {
            let dims = self.dimensions();
            Point::new(dims.width / 2, dims.height / 2)
        })
    }

    fn consume_tile(&self, tile: &Tile) -> TileGraphResult<()> {
        let mut output = self.lock();
        let assembled = output.get_or_insert_with(|| {
            Tile::zeroed(
                Rect::from_dims(self.input.dimensions()),
                self.input.channels(),
                self.input.format(),
            )
        });
        assembled.copy_overlap(tile)
    }

    fn finalize(&self) -> TileGraphResult<()> {
        self.complete.store(true, Ordering::Release);
        Ok(())
    }
}
