//! The constraint-aware thread pool and its shared condition gate.

use super::super::ThreadGroup;
use smol_str::SmolStr;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

pub(crate) type Job = Box<dyn FnOnce() + Send>;

struct ConditionState {
    /// Pending firings, each tagged with the task's constraint set.
    jobs: VecDeque<(ThreadGroup, Job)>,
    terminated: bool,
}

/// The group-aware gate workers block on.
///
/// `wait` returns `Some(job)` while work may still arrive and `None` once
/// [`terminate`](Self::terminate) has been called. A worker only receives
/// jobs whose constraint set allows its group.
pub(crate) struct Condition {
    state: Mutex<ConditionState>,
    available: Condvar,
}

impl Condition {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConditionState {
                jobs: VecDeque::new(),
                terminated: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Queue a job and wake the workers.
    pub fn submit(&self, constraints: ThreadGroup, job: Job) {
        let mut state = self.state.lock().unwrap();
        if state.terminated {
            return;
        }
        state.jobs.push_back((constraints, job));
        drop(state);
        self.available.notify_all();
    }

    /// Block until a job compatible with `group` is available, or the gate
    /// is terminated.
    pub fn wait(&self, group: &str) -> Option<Job> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.terminated {
                return None;
            }
            if let Some(pos) = state
                .jobs
                .iter()
                .position(|(constraints, _)| constraints.allows(group))
            {
                return state.jobs.remove(pos).map(|(_, job)| job);
            }
            state = self.available.wait(state).unwrap();
        }
    }

    /// Drain the workers. Pending, not-yet-dispatched jobs are dropped.
    pub fn terminate(&self) {
        let mut state = self.state.lock().unwrap();
        state.terminated = true;
        state.jobs.clear();
        drop(state);
        self.available.notify_all();
    }
}

/// A pool of worker threads partitioned into named groups.
///
/// Each worker loops on [`Condition::wait`] with its group; dropping the
/// pool terminates the condition and joins every worker.
pub(crate) struct ThreadPool {
    condition: Arc<Condition>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new<I: IntoIterator<Item = (SmolStr, usize)>>(groups: I) -> Self {
        let condition = Arc::new(Condition::new());
        let mut workers = Vec::new();
        for (group, count) in groups {
            for n in 0..count {
                let condition = condition.clone();
                let group = group.clone();
                let worker = std::thread::Builder::new()
                    .name(format!("weft-{group}-{n}"))
                    .spawn(move || {
                        while let Some(job) = condition.wait(&group) {
                            job();
                        }
                    })
                    .expect("failed to spawn a pool worker");
                workers.push(worker);
            }
        }
        Self { condition, workers }
    }

    pub fn submit(&self, constraints: ThreadGroup, job: Job) {
        self.condition.submit(constraints, job);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.condition.terminate();
        for worker in self.workers.drain(..) {
            // A worker that panicked through a task already unwound; there's
            // nothing left to salvage from its handle.
            let _ = worker.join();
        }
    }
}
