use crate::curve::{HilbertSpiralTiles, HilbertTiles};
use crate::foundation::error::{TileGraphError, TileGraphResult};
use crate::foundation::geom::Rect;
use crate::node::{NodeId, SharedOutNode, SharedSinkNode, SharedTile};
use crate::tile::Tile;
use smallvec::SmallVec;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Instant;

/// Identity of a live task: tasks are deduplicated per `(node, rect)` within
/// one adaptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TaskKey {
    pub(crate) node: NodeId,
    pub(crate) rect: Rect,
}

/// Write-once slot for a task's result, shared with every dependant.
///
/// Scheduling guarantees the slot is fulfilled before any dependant reads
/// it, so `get` never blocks; an empty read is a scheduling bug surfaced as
/// a region error.
#[derive(Clone, Debug)]
pub(crate) struct TilePromise {
    cell: Arc<OnceLock<SharedTile>>,
}

impl TilePromise {
    pub(crate) fn new() -> Self {
        Self {
            cell: Arc::new(OnceLock::new()),
        }
    }

    /// Promise that is already fulfilled (cache hits).
    pub(crate) fn ready(tile: SharedTile) -> Self {
        let promise = Self::new();
        promise.fulfill(tile);
        promise
    }

    pub(crate) fn fulfill(&self, tile: SharedTile) {
        let fresh = self.cell.set(tile).is_ok();
        debug_assert!(fresh, "task promise fulfilled twice");
    }

    pub(crate) fn get(&self) -> TileGraphResult<SharedTile> {
        self.cell
            .get()
            .cloned()
            .ok_or_else(|| TileGraphError::region("dependency tile is not available yet"))
    }
}

/// State of a tiling or sink merge task: sub-tiles requested but not yet
/// folded into the result.
#[derive(Debug, Default)]
pub(crate) struct MergeState {
    pending: Vec<(Rect, TilePromise)>,
    output: Option<Tile>,
}

impl MergeState {
    fn take_pending(&mut self, rect: Rect) -> TileGraphResult<TilePromise> {
        let pos = self
            .pending
            .iter()
            .position(|(r, _)| *r == rect)
            .ok_or_else(|| {
                TileGraphError::region(format!("no pending sub-tile for {rect:?}"))
            })?;
        Ok(self.pending.swap_remove(pos).1)
    }
}

/// The shareable execution state of one task.
///
/// The adaptor owns the bookkeeping (queues, counters, dependants); this is
/// the part pool workers touch from `perform_single`/`perform_full` jobs.
pub(crate) enum TaskExec {
    /// Computes exactly one canonical tile by running the node's kernel.
    Compute {
        node: SharedOutNode,
        region: Rect,
        /// Input promises in input order, stored at request time.
        inputs: Mutex<SmallVec<[TilePromise; 4]>>,
        promise: TilePromise,
    },
    /// Assembles a non-canonical rectangle from canonical sub-tiles.
    Tiling {
        node: SharedOutNode,
        region: Rect,
        state: Mutex<MergeState>,
        promise: TilePromise,
    },
    /// Streams the sink's input tiles into the sink.
    Sink {
        sink: SharedSinkNode,
        state: Mutex<MergeState>,
    },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl TaskExec {
    pub(crate) fn compute(node: SharedOutNode, region: Rect) -> Self {
        TaskExec::Compute {
            node,
            region,
            inputs: Mutex::new(SmallVec::new()),
            promise: TilePromise::new(),
        }
    }

    pub(crate) fn tiling(node: SharedOutNode, region: Rect) -> Self {
        TaskExec::Tiling {
            node,
            region,
            state: Mutex::new(MergeState::default()),
            promise: TilePromise::new(),
        }
    }

    pub(crate) fn sink(sink: SharedSinkNode) -> Self {
        TaskExec::Sink {
            sink,
            state: Mutex::new(MergeState::default()),
        }
    }

    /// The result promise; sinks have no externally observable result.
    pub(crate) fn promise(&self) -> Option<TilePromise> {
        match self {
            TaskExec::Compute { promise, .. } | TaskExec::Tiling { promise, .. } => {
                Some(promise.clone())
            }
            TaskExec::Sink { .. } => None,
        }
    }

    /// Store the promise of a freshly requested dependency.
    pub(crate) fn store_dependency(&self, rect: Rect, promise: TilePromise) {
        match self {
            TaskExec::Compute { inputs, .. } => lock(inputs).push(promise),
            TaskExec::Tiling { state, .. } | TaskExec::Sink { state, .. } => {
                lock(state).pending.push((rect, promise));
            }
        }
    }

    /// Per-dependency work, run on a pool thread once the dependency's tile
    /// exists.
    pub(crate) fn perform_single(&self, node: NodeId, rect: Rect) -> TileGraphResult<()> {
        match self {
            // Compute tasks read their inputs in one go at finalization.
            TaskExec::Compute { .. } => Ok(()),
            TaskExec::Tiling {
                node: own,
                region,
                state,
                ..
            } => {
                debug_assert_eq!(node, NodeId::of_out(own));
                let mut state = lock(state);
                let tile = state.take_pending(rect)?.get()?;
                let output = state.output.get_or_insert_with(|| {
                    Tile::zeroed(*region, own.channels(), own.format())
                });
                // Sub-tiles are disjoint, so merge order does not matter.
                output.copy_overlap(&tile)
            }
            TaskExec::Sink { sink, state } => {
                debug_assert_eq!(node, NodeId::of_out(sink.input()));
                let tile = lock(state).take_pending(rect)?.get()?;
                sink.consume_tile(&tile)
            }
        }
    }

    /// Finalization, run on a pool thread once every dependency is done.
    pub(crate) fn perform_full(&self) -> TileGraphResult<()> {
        match self {
            TaskExec::Compute {
                node,
                region,
                inputs,
                promise,
            } => {
                let promises: SmallVec<[TilePromise; 4]> = lock(inputs).clone();
                let mut tiles: SmallVec<[SharedTile; 4]> = SmallVec::new();
                for p in &promises {
                    tiles.push(p.get()?);
                }

                let mut output = Tile::zeroed(*region, node.channels(), node.format());
                let start = Instant::now();
                node.compute(&tiles, &mut output)?;
                node.record_tile_duration(*region, start.elapsed().as_secs_f64());

                let output = Arc::new(output);
                if let Some(cache) = node.cache() {
                    if node.is_cacheable(*region) {
                        cache.put_sync(*region, Arc::clone(&output));
                    }
                }
                promise.fulfill(output);
                Ok(())
            }
            TaskExec::Tiling {
                node,
                region,
                state,
                promise,
            } => {
                let output = lock(state)
                    .output
                    .take()
                    .unwrap_or_else(|| Tile::zeroed(*region, node.channels(), node.format()));
                promise.fulfill(Arc::new(output));
                Ok(())
            }
            TaskExec::Sink { sink, .. } => sink.finalize(),
        }
    }
}

/// Dependency request produced by a task generator: the adaptor resolves it
/// against the cache or the live task set.
pub(crate) struct DepRequest {
    /// Node whose output is needed.
    pub(crate) target: SharedOutNode,
    /// Region of the target.
    pub(crate) region: Rect,
    /// `(node, rect)` reported back through the single-finished queue when
    /// the request resolves synchronously from a cache.
    pub(crate) payload: (NodeId, Rect),
}

/// Control-thread-only generator of a task's dependencies, advanced exactly
/// one dependency at a time.
pub(crate) enum TaskGen {
    /// One request per input of a compute task.
    Compute { next_input: usize },
    /// Canonical sub-tiles of a tiling task, in Hilbert order.
    Tiling { tiles: HilbertTiles, next: Option<Rect> },
    /// Canonical input tiles of a sink task, in Hilbert-spiral order.
    Sink { tiles: HilbertSpiralTiles, next: Option<Rect> },
}

impl TaskGen {
    pub(crate) fn compute() -> Self {
        TaskGen::Compute { next_input: 0 }
    }

    pub(crate) fn tiling(mut tiles: HilbertTiles) -> Self {
        let next = tiles.next();
        TaskGen::Tiling { tiles, next }
    }

    pub(crate) fn sink(mut tiles: HilbertSpiralTiles) -> Self {
        let next = tiles.next();
        TaskGen::Sink { tiles, next }
    }

    /// Return `true` while dependencies remain to be emitted.
    pub(crate) fn remaining(&self, exec: &TaskExec) -> bool {
        match (self, exec) {
            (TaskGen::Compute { next_input }, TaskExec::Compute { node, .. }) => {
                *next_input < node.input_count()
            }
            (TaskGen::Tiling { next, .. }, _) | (TaskGen::Sink { next, .. }, _) => next.is_some(),
            _ => false,
        }
    }

    /// Emit the next dependency request. Must only be called while
    /// [`TaskGen::remaining`] holds.
    pub(crate) fn next_request(&mut self, exec: &TaskExec) -> Option<DepRequest> {
        match (self, exec) {
            (
                TaskGen::Compute { next_input },
                TaskExec::Compute { node, region, .. },
            ) => {
                if *next_input >= node.input_count() {
                    return None;
                }
                let index = *next_input;
                *next_input += 1;
                let target = Arc::clone(node.input(index));
                let dep_region = node.input_region(index, *region);
                Some(DepRequest {
                    target,
                    region: dep_region,
                    // Compute tasks do no per-dependency work; the payload
                    // only has to route the counter decrement back here.
                    payload: (NodeId::of_out(node), *region),
                })
            }
            (TaskGen::Tiling { tiles, next }, TaskExec::Tiling { node, .. }) => {
                let rect = next.take()?;
                *next = tiles.next();
                Some(DepRequest {
                    target: Arc::clone(node),
                    region: rect,
                    payload: (NodeId::of_out(node), rect),
                })
            }
            (TaskGen::Sink { tiles, next }, TaskExec::Sink { sink, .. }) => {
                let rect = next.take()?;
                *next = tiles.next();
                let input = Arc::clone(sink.input());
                let payload = (NodeId::of_out(&input), rect);
                Some(DepRequest {
                    target: input,
                    region: rect,
                    payload,
                })
            }
            _ => None,
        }
    }
}
