use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send>;

struct PoolState<I> {
    slot: Option<(I, Job)>,
    finished: VecDeque<I>,
    stop: bool,
}

struct PoolShared<I> {
    state: Mutex<PoolState<I>>,
    /// A job landed in the slot (or the pool is stopping).
    work_ready: Condvar,
    /// A worker emptied the slot (or the pool is stopping).
    slot_free: Condvar,
}

impl<I> PoolShared<I> {
    fn lock(&self) -> MutexGuard<'_, PoolState<I>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fixed-size worker pool with a single submission slot.
///
/// `execute` blocks until a worker has taken the closure, which bounds
/// in-flight handoffs at one and gives the control thread natural
/// backpressure. Workers push the job's id onto a completion queue when the
/// closure returns; completion order is unrelated to submission order.
pub(crate) struct WorkerPool<I: Send + 'static> {
    shared: Arc<PoolShared<I>>,
    workers: Vec<JoinHandle<()>>,
}

impl<I: Send + 'static> WorkerPool<I> {
    /// Spawn `size` workers (at least one).
    pub(crate) fn new(size: usize) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                slot: None,
                finished: VecDeque::new(),
                stop: false,
            }),
            work_ready: Condvar::new(),
            slot_free: Condvar::new(),
        });

        let workers = (0..size.max(1))
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || loop {
                    let (id, job) = {
                        let mut state = shared.lock();
                        loop {
                            if state.stop {
                                return;
                            }
                            if let Some(job) = state.slot.take() {
                                break job;
                            }
                            state = shared
                                .work_ready
                                .wait(state)
                                .unwrap_or_else(|e| e.into_inner());
                        }
                    };
                    shared.slot_free.notify_one();

                    // A panicking job must not take the worker down; the
                    // id still has to reach the completion queue so the
                    // control loop can observe the task and surface the
                    // failure through its promise.
                    if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!("worker job panicked");
                    }

                    shared.lock().finished.push_back(id);
                })
            })
            .collect();

        Self { shared, workers }
    }

    /// Hand `job` to a worker, blocking until one has picked it up.
    pub(crate) fn execute(&self, id: I, job: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.shared.lock();
            debug_assert!(state.slot.is_none(), "submission slot already occupied");
            state.slot = Some((id, Box::new(job)));
        }
        self.shared.work_ready.notify_one();

        let mut state = self.shared.lock();
        while !state.stop && state.slot.is_some() {
            state = self
                .shared
                .slot_free
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Return and clear the ids of jobs that finished since the last call.
    pub(crate) fn drain_finished(&self) -> Vec<I> {
        let mut state = self.shared.lock();
        state.finished.drain(..).collect()
    }

    /// Signal all workers to exit and join them.
    pub(crate) fn finish(&mut self) {
        self.shared.lock().stop = true;
        self.shared.work_ready.notify_all();
        self.shared.slot_free.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl<I: Send + 'static> Drop for WorkerPool<I> {
    fn drop(&mut self) {
        self.finish();
    }
}
