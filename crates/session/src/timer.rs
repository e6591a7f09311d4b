//! One-shot delayed tasks.
//!
//! `ThreadTimer` runs tasks on a single background thread. `ManualTimer`
//! fires them only when a test advances its `ManualClock`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::clock::{to_chrono, Clock, ManualClock};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned by [`Timer::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

pub trait Timer: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Drop a pending task. Returns false if it already ran or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
}

fn run_guarded(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        log::error!("timer task panicked");
    }
}

// ============================================================================
// ThreadTimer
// ============================================================================

/// Cancelled entries tolerated in the heap beyond the live count.
const PRUNE_SLACK: usize = 64;

struct ThreadState {
    next_id: u64,
    queue: BinaryHeap<Reverse<(Instant, u64)>>,
    tasks: HashMap<u64, Task>,
    shutdown: bool,
}

impl ThreadState {
    /// Drop heap entries whose task was cancelled, once they outnumber the
    /// live ones.
    fn prune(&mut self) {
        if self.queue.len() > 2 * self.tasks.len() + PRUNE_SLACK {
            let tasks = &self.tasks;
            self.queue.retain(|Reverse((_, id))| tasks.contains_key(id));
        }
    }
}

struct Shared {
    state: Mutex<ThreadState>,
    wake: Condvar,
}

pub struct ThreadTimer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    pub fn new() -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(ThreadState {
                next_id: 0,
                queue: BinaryHeap::new(),
                tasks: HashMap::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("dupmerge-timer".into())
            .spawn(move || worker_loop(&worker_shared))?;
        Ok(Self { shared, worker: Some(worker) })
    }

    pub fn pending(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }
}

fn worker_loop(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            return;
        }
        match state.queue.peek().copied() {
            None => shared.wake.wait(&mut state),
            Some(Reverse((deadline, id))) if deadline <= Instant::now() => {
                state.queue.pop();
                // Cancelled tasks leave their heap entry behind.
                if let Some(task) = state.tasks.remove(&id) {
                    MutexGuard::unlocked(&mut state, || run_guarded(task));
                }
            }
            Some(Reverse((deadline, _))) => {
                shared.wake.wait_until(&mut state, deadline);
            }
        }
    }
}

impl Timer for ThreadTimer {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let deadline = Instant::now() + delay;
        let mut state = self.shared.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.queue.push(Reverse((deadline, id)));
        state.tasks.insert(id, task);
        drop(state);
        self.shared.wake.notify_one();
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.shared.state.lock();
        let removed = state.tasks.remove(&id.0).is_some();
        if removed {
            state.prune();
        }
        removed
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wake.notify_one();
        if let Some(worker) = self.worker.take() {
            // The last owner may be a task running on the worker itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

// ============================================================================
// ManualTimer
// ============================================================================

struct Pending {
    due: DateTime<Utc>,
    id: u64,
    task: Task,
}

/// Deterministic timer for tests.
pub struct ManualTimer {
    clock: ManualClock,
    state: Mutex<(u64, Vec<Pending>)>,
}

impl ManualTimer {
    pub fn new(clock: ManualClock) -> Self {
        Self { clock, state: Mutex::new((0, Vec::new())) }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn pending(&self) -> usize {
        self.state.lock().1.len()
    }

    /// Move the clock forward by `by`, firing every task that comes due on
    /// the way in deadline order. The clock reads each task's deadline
    /// while it runs. Tasks scheduled by fired tasks also fire if they fall
    /// inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.now() + to_chrono(by);
        loop {
            let next = {
                let mut state = self.state.lock();
                let pending = &mut state.1;
                let earliest = pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.id))
                    .map(|(i, _)| i);
                earliest.map(|i| pending.remove(i))
            };
            let Some(Pending { due, task, .. }) = next else {
                break;
            };
            if due > self.clock.now() {
                self.clock.set(due);
            }
            run_guarded(task);
        }
        if target > self.clock.now() {
            self.clock.set(target);
        }
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let due = self.clock.now() + to_chrono(delay);
        let mut state = self.state.lock();
        let id = state.0;
        state.0 += 1;
        state.1.push(Pending { due, id, task });
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.lock();
        let before = state.1.len();
        state.1.retain(|p| p.id != id.0);
        state.1.len() != before
    }
}
