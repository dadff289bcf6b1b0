use crate::exec::adaptor::GraphAdaptor;
use crate::exec::pool::WorkerPool;
use crate::exec::task::TaskKey;
use crate::foundation::error::{TileGraphError, TileGraphResult};
use crate::node::SharedSinkNode;
use std::sync::{Condvar, Mutex};
use tracing::{debug, trace};

/// Statistics of one `compute` run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ComputeStats {
    /// Tasks finalized (compute, tiling, and sink tasks alike).
    pub tasks_completed: u64,
    /// `true` when the run was ended early by `finish()`.
    pub cancelled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    NotRunning,
    StopRunning,
    Running,
}

/// Cooperative run/cancel flag shared between `compute` and `finish`.
pub(crate) struct RunFlag {
    state: Mutex<RunState>,
    finished: Condvar,
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl RunFlag {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RunState::NotRunning),
            finished: Condvar::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enter the running state; fails when a compute is already in flight.
    pub(crate) fn begin(&self) -> TileGraphResult<RunGuard<'_>> {
        let mut state = self.lock();
        if *state != RunState::NotRunning {
            return Err(TileGraphError::graph("a compute is already running"));
        }
        *state = RunState::Running;
        Ok(RunGuard { flag: self })
    }

    /// `true` while no stop has been requested.
    pub(crate) fn keep_running(&self) -> bool {
        *self.lock() == RunState::Running
    }

    /// Request a cooperative stop and wait until the run acknowledges.
    /// A no-op when nothing is running.
    pub(crate) fn finish(&self) {
        let mut state = self.lock();
        if *state == RunState::NotRunning {
            return;
        }
        if *state == RunState::Running {
            *state = RunState::StopRunning;
        }
        while *state != RunState::NotRunning {
            state = self
                .finished
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Resets the flag to `NotRunning` when the compute scope ends.
pub(crate) struct RunGuard<'a> {
    flag: &'a RunFlag,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.flag.lock() = RunState::NotRunning;
        self.flag.finished.notify_all();
    }
}

/// Pool job identifier: which task, and whether the job was per-dependency
/// work (`perform_single`) or finalization (`perform_full`).
#[derive(Clone, Copy, Debug)]
struct PoolJob {
    task: TaskKey,
    dependency: bool,
}

type Pool = WorkerPool<PoolJob>;
type FailSlot = std::sync::Arc<Mutex<Option<TileGraphError>>>;

fn record_failure(slot: &FailSlot, result: TileGraphResult<()>) {
    if let Err(error) = result {
        let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.get_or_insert(error);
    }
}

fn take_failure(slot: &FailSlot) -> Option<TileGraphError> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}

fn failed(slot: &FailSlot) -> bool {
    slot.lock()
        .unwrap_or_else(|e| e.into_inner())
        .is_some()
}

/// Dispatch queued cache-resolved dependencies as `perform_single` jobs.
fn dispatch_single_finished(adaptor: &mut GraphAdaptor, pool: &Pool, fail: &FailSlot) -> bool {
    let events = adaptor.take_single_finished();
    let any = !events.is_empty();
    for event in events {
        let Some(exec) = adaptor.lookup_exec(event.task) else {
            continue;
        };
        let fail = FailSlot::clone(fail);
        let (node, rect) = (event.node, event.rect);
        pool.execute(
            PoolJob {
                task: event.task,
                dependency: true,
            },
            move || record_failure(&fail, exec.perform_single(node, rect)),
        );
    }
    any
}

/// Process pool completions: acknowledge dependency work, publish finished
/// tasks to their dependants, retire them.
fn handle_finished(
    adaptor: &mut GraphAdaptor,
    pool: &Pool,
    fail: &FailSlot,
    stats: &mut ComputeStats,
) -> bool {
    let finished = pool.drain_finished();
    let any = !finished.is_empty();
    for job in finished {
        if job.dependency {
            adaptor.single_performed(job.task);
            continue;
        }

        stats.tasks_completed += 1;
        let Some(entry) = adaptor.finish_task(job.task) else {
            continue;
        };
        trace!(dependants = entry.dependants.len(), "task retired");
        for dependant in entry.dependants {
            let Some(exec) = adaptor.lookup_exec(dependant) else {
                continue;
            };
            let fail = FailSlot::clone(fail);
            let (node, rect) = (job.task.node, job.task.rect);
            pool.execute(
                PoolJob {
                    task: dependant,
                    dependency: true,
                },
                move || record_failure(&fail, exec.perform_single(node, rect)),
            );
        }
    }
    any
}

/// Run the task graph of `sinks` to completion on `threads` workers.
///
/// The calling thread owns all adaptor bookkeeping; kernels run on the
/// pool. Returns early (cleanly) when `run` flips to stopping, and with the
/// first recorded error when a kernel or merge step fails.
pub(crate) fn run_compute(
    sinks: &[SharedSinkNode],
    run: &RunFlag,
    threads: usize,
) -> TileGraphResult<ComputeStats> {
    let pool = Pool::new(threads);
    let mut adaptor = GraphAdaptor::new();
    let fail: FailSlot = FailSlot::default();
    let mut stats = ComputeStats::default();

    for sink in sinks {
        adaptor.add_sink_task(sink);
    }
    debug!(sinks = sinks.len(), threads, "compute started");

    while !adaptor.is_empty() && run.keep_running() && !failed(&fail) {
        let mut progressed = false;

        while !adaptor.has_performable() && run.keep_running() && !failed(&fail) {
            if dispatch_single_finished(&mut adaptor, &pool, &fail)
                || handle_finished(&mut adaptor, &pool, &fail, &mut stats)
            {
                progressed = true;
                continue;
            }
            if adaptor.has_requestable() {
                adaptor.advance_requestable()?;
                progressed = true;
                continue;
            }
            break;
        }

        while run.keep_running() && !failed(&fail) {
            let Some((key, exec)) = adaptor.pop_performable() else {
                break;
            };
            progressed = true;
            let fail_slot = FailSlot::clone(&fail);
            pool.execute(
                PoolJob {
                    task: key,
                    dependency: false,
                },
                move || record_failure(&fail_slot, exec.perform_full()),
            );
        }

        if run.keep_running() && !failed(&fail) {
            progressed |= dispatch_single_finished(&mut adaptor, &pool, &fail);
            progressed |= handle_finished(&mut adaptor, &pool, &fail, &mut stats);
        }

        if !progressed {
            // Workers are still busy; completions will arrive shortly.
            std::thread::yield_now();
        }
    }

    drop(pool);
    if let Some(error) = take_failure(&fail) {
        debug!(%error, "compute failed");
        return Err(error);
    }
    stats.cancelled = !run.keep_running();
    debug!(
        tasks = stats.tasks_completed,
        cancelled = stats.cancelled,
        "compute finished"
    );
    Ok(stats)
}
