use crate::curve::{HilbertSpiralTiles, HilbertTiles};
use crate::exec::relevance::RelevanceChoice;
use crate::exec::task::{TaskExec, TaskGen, TaskKey, TilePromise};
use crate::foundation::error::{TileGraphError, TileGraphResult};
use crate::foundation::geom::Rect;
use crate::node::{MemoryMode, NodeId, SharedOutNode, SharedSinkNode};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::Arc;

/// Where a live task currently sits in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TaskMode {
    /// Non-sink task with dependencies still to emit.
    OutRequestable,
    /// Sink task with dependencies still to emit, scheduled by relevance.
    SinkRequestable,
    /// All dependencies emitted, some still outstanding.
    Requested,
    /// Ready to finalize (queued or already handed to the pool).
    Performable,
}

/// Bookkeeping the adaptor keeps per live task. Only the control thread
/// touches this; pool threads see just the `Arc<TaskExec>`.
pub(crate) struct TaskEntry {
    pub(crate) exec: Arc<TaskExec>,
    gen: TaskGen,
    /// Dependencies emitted but not yet acknowledged as performed.
    outstanding: usize,
    /// Tasks to notify when this one's result is published. A dependant
    /// appears once per dependency it requested from this task.
    pub(crate) dependants: SmallVec<[TaskKey; 4]>,
    mode: TaskMode,
}

impl TaskEntry {
    fn all_generated(&self) -> bool {
        !self.gen.remaining(&self.exec)
    }

    fn all_single_performed(&self) -> bool {
        self.all_generated() && self.outstanding == 0
    }
}

/// A dependency that resolved synchronously (from a cache); the owning task
/// still gets a `perform_single` pass for it.
pub(crate) struct SingleFinished {
    pub(crate) task: TaskKey,
    pub(crate) node: NodeId,
    pub(crate) rect: Rect,
}

/// Result of [`GraphAdaptor::generate_region`].
pub(crate) struct GeneratedTile {
    pub(crate) promise: TilePromise,
    /// `true` when the region came out of a cache and no task was involved.
    pub(crate) finished: bool,
}

/// Owns the live task set and routes every scheduling event.
///
/// Invariants: each `(node, rect)` maps to at most one live task; a
/// completed task is removed only after every dependant saw its result; the
/// single-finished queue drains before the owning tasks can finalize.
#[derive(Default)]
pub(crate) struct GraphAdaptor {
    tasks: FxHashMap<TaskKey, TaskEntry>,
    out_requestable: VecDeque<TaskKey>,
    performable: VecDeque<TaskKey>,
    chooser: RelevanceChoice<TaskKey>,
    single_finished: Vec<SingleFinished>,
}

impl GraphAdaptor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn has_performable(&self) -> bool {
        !self.performable.is_empty()
    }

    pub(crate) fn has_requestable(&self) -> bool {
        !self.out_requestable.is_empty() || !self.chooser.is_empty()
    }

    pub(crate) fn lookup_exec(&self, key: TaskKey) -> Option<Arc<TaskExec>> {
        self.tasks.get(&key).map(|e| Arc::clone(&e.exec))
    }

    /// Pop the next task ready to finalize.
    pub(crate) fn pop_performable(&mut self) -> Option<(TaskKey, Arc<TaskExec>)> {
        let key = self.performable.pop_front()?;
        let exec = self.lookup_exec(key)?;
        Some((key, exec))
    }

    /// Queue a root task for every tile of a sink.
    pub(crate) fn add_sink_task(&mut self, sink: &SharedSinkNode) {
        let region = Rect::from_dims(sink.dimensions());
        let key = TaskKey {
            node: NodeId::of_sink(sink),
            rect: region,
        };
        let exec = Arc::new(TaskExec::sink(Arc::clone(sink)));
        let input = sink.input();
        let gen = TaskGen::sink(HilbertSpiralTiles::new(
            region,
            sink.central_point(),
            input.dimensions(),
            sink.tile_dimensions(),
            sink.block_dimensions(),
        ));

        let mut entry = TaskEntry {
            exec,
            gen,
            outstanding: 0,
            dependants: SmallVec::new(),
            mode: TaskMode::SinkRequestable,
        };
        if entry.all_generated() {
            entry.mode = TaskMode::Performable;
            self.performable.push_back(key);
        } else {
            self.chooser.add(key, sink.relevance());
        }
        self.tasks.insert(key, entry);
    }

    /// Advance the preferred requestable task by exactly one dependency.
    ///
    /// Plain tasks are preferred over sink tasks so intermediate pipelines
    /// drain before new sink tiles are opened; among sinks the relevance
    /// chooser decides.
    pub(crate) fn advance_requestable(&mut self) -> TileGraphResult<()> {
        if let Some(&key) = self.out_requestable.front() {
            self.next_required_task(key)
        } else if let Some(key) = self.chooser.pick() {
            self.next_required_task(key)
        } else {
            Err(TileGraphError::region("no requestable task"))
        }
    }

    fn next_required_task(&mut self, key: TaskKey) -> TileGraphResult<()> {
        let request = {
            let entry = self
                .tasks
                .get_mut(&key)
                .ok_or_else(|| TileGraphError::region("requestable task disappeared"))?;
            let exec = Arc::clone(&entry.exec);
            let request = entry.gen.next_request(&exec).ok_or_else(|| {
                TileGraphError::region("task had no more dependencies to emit")
            })?;
            entry.outstanding += 1;
            request
        };

        let generated = self.generate_region(key, &request.target, request.region);
        if let Some(entry) = self.tasks.get(&key) {
            entry.exec.store_dependency(request.region, generated.promise);
        }
        if generated.finished {
            self.single_finished.push(SingleFinished {
                task: key,
                node: request.payload.0,
                rect: request.payload.1,
            });
        }

        self.reclassify(key);
        Ok(())
    }

    /// Resolve a region of `node`: from its cache, from an existing task, or
    /// by creating a new one.
    fn generate_region(
        &mut self,
        caller: TaskKey,
        node: &SharedOutNode,
        region: Rect,
    ) -> GeneratedTile {
        if node.memory_mode() == MemoryMode::AnyMemory {
            if let Some(tile) = node.cache().and_then(|c| c.get_sync(region)) {
                return GeneratedTile {
                    promise: TilePromise::ready(tile),
                    finished: true,
                };
            }
        }

        let key = TaskKey {
            node: NodeId::of_out(node),
            rect: region,
        };
        if let Some(entry) = self.tasks.get_mut(&key) {
            entry.dependants.push(caller);
            let promise = entry
                .exec
                .promise()
                .expect("dependency tasks always carry a result promise");
            return GeneratedTile {
                promise,
                finished: false,
            };
        }

        let (exec, gen) = if node.grid().is_tile(region) {
            (TaskExec::compute(Arc::clone(node), region), TaskGen::compute())
        } else {
            (
                TaskExec::tiling(Arc::clone(node), region),
                TaskGen::tiling(HilbertTiles::new(
                    region,
                    node.dimensions(),
                    node.tile_dimensions(),
                )),
            )
        };
        let exec = Arc::new(exec);
        let promise = exec
            .promise()
            .expect("out-node tasks always carry a result promise");

        let mut entry = TaskEntry {
            exec,
            gen,
            outstanding: 0,
            dependants: SmallVec::new(),
            mode: TaskMode::OutRequestable,
        };
        entry.dependants.push(caller);
        if entry.all_generated() {
            // No dependencies at all (source tiles): straight to the pool.
            entry.mode = TaskMode::Performable;
            self.performable.push_back(key);
        } else {
            self.out_requestable.push_front(key);
        }
        self.tasks.insert(key, entry);

        GeneratedTile {
            promise,
            finished: false,
        }
    }

    /// Re-queue a task after its generator advanced.
    fn reclassify(&mut self, key: TaskKey) {
        let Some(entry) = self.tasks.get_mut(&key) else {
            return;
        };
        let all_generated = entry.all_generated();
        let all_performed = entry.all_single_performed();
        match entry.mode {
            TaskMode::OutRequestable => {
                if all_generated || all_performed {
                    if let Some(pos) = self.out_requestable.iter().position(|k| *k == key) {
                        self.out_requestable.remove(pos);
                    }
                }
                if all_performed {
                    entry.mode = TaskMode::Performable;
                    self.performable.push_back(key);
                } else if all_generated {
                    entry.mode = TaskMode::Requested;
                }
            }
            TaskMode::SinkRequestable => {
                debug_assert!(self.chooser.contains(&key));
                if all_generated || all_performed {
                    self.chooser.remove(&key);
                }
                if all_performed {
                    entry.mode = TaskMode::Performable;
                    self.performable.push_back(key);
                } else if all_generated {
                    entry.mode = TaskMode::Requested;
                }
            }
            TaskMode::Requested | TaskMode::Performable => {}
        }
    }

    /// Acknowledge one performed dependency of `key`.
    pub(crate) fn single_performed(&mut self, key: TaskKey) {
        let Some(entry) = self.tasks.get_mut(&key) else {
            return;
        };
        entry.outstanding = entry.outstanding.saturating_sub(1);
        if entry.mode == TaskMode::Requested && entry.all_single_performed() {
            entry.mode = TaskMode::Performable;
            self.performable.push_back(key);
        }
    }

    /// Retire a finalized task, handing its entry (and dependant list) to
    /// the caller.
    pub(crate) fn finish_task(&mut self, key: TaskKey) -> Option<TaskEntry> {
        self.tasks.remove(&key)
    }

    pub(crate) fn take_single_finished(&mut self) -> Vec<SingleFinished> {
        std::mem::take(&mut self.single_finished)
    }
}
