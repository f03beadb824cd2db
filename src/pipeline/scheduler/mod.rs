//! Schedulers: drive a built pipeline's containers to completion.
//!
//! [`Scheduler::new`] is the plain round-robin variant: every worker sits
//! in one anonymous group and tasks are picked in index order.
//! [`Scheduler::with_workers`] partitions the workers into named thread
//! groups and dispatches each task only to workers its constraint set
//! allows. Both share the same contract: [`run`](Scheduler::run) returns
//! once every container reports finished.

use super::builder::{BuildError, Pipeline};
use super::container::AbstractContainer;
use super::{TaskId, ThreadGroup};
use self::pool::{Job, ThreadPool};
use smol_str::SmolStr;
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex};
use thiserror::Error;

pub(crate) mod pool;

#[cfg(test)]
mod tests;

/// An error from running a scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task's constraint set is disjoint from every worker group; raised
    /// before any firing.
    #[error("task {task:?} requires a thread group in {constraints}, but the pool only provides {available}")]
    ThreadConstraintUnsatisfiable {
        task: SmolStr,
        constraints: ThreadGroup,
        available: ThreadGroup,
    },
    /// A task's `run` step panicked; the pipeline was terminated.
    #[error("task {task:?} panicked during a firing")]
    TaskPanicked { task: SmolStr },
}

impl crate::utils::LogErr for SchedulerError {
    fn log_err(&self) {
        tracing::error!("{self}");
    }
}

#[derive(Default)]
struct SignalState {
    /// Tasks whose firing completed since the last scan.
    completed: Vec<usize>,
    /// Tasks whose external inputs saw activity since the last scan.
    external: BTreeSet<usize>,
    panicked: Option<SmolStr>,
}

/// Wakes the scheduler's main loop from workers and external feeders.
struct Signal {
    state: Mutex<SignalState>,
    wake: Condvar,
}

impl Signal {
    fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::default()),
            wake: Condvar::new(),
        }
    }
    fn notify_external(&self, task: usize) {
        self.state.lock().unwrap().external.insert(task);
        self.wake.notify_all();
    }
    fn notify_complete(&self, task: usize) {
        self.state.lock().unwrap().completed.push(task);
        self.wake.notify_all();
    }
    fn notify_panic(&self, task: SmolStr) {
        self.state.lock().unwrap().panicked = Some(task);
        self.wake.notify_all();
    }
}

/// Immutable per-task data the scheduler reads without locking containers.
struct TaskMeta {
    name: SmolStr,
    constraints: ThreadGroup,
    following: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Idle,
    Running,
    Finished,
}

/// Runs a pipeline's task containers on a constraint-aware thread pool.
pub struct Scheduler {
    containers: Arc<Vec<Mutex<Box<dyn AbstractContainer>>>>,
    meta: Vec<TaskMeta>,
    signal: Arc<Signal>,
    workers: Vec<(SmolStr, usize)>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.containers.len())
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Build `pipeline` and prepare to run it with one unconstrained worker
    /// per available CPU.
    pub fn new(pipeline: Pipeline) -> Result<Self, BuildError> {
        let threads = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self::with_workers(pipeline, [(SmolStr::new_static("main"), threads)])
    }

    /// Build `pipeline` and prepare to run it on workers partitioned into
    /// thread groups, `count` workers per `(group, count)` entry.
    pub fn with_workers<G: Into<SmolStr>, I: IntoIterator<Item = (G, usize)>>(
        pipeline: Pipeline,
        workers: I,
    ) -> Result<Self, BuildError> {
        let signal = Arc::new(Signal::new());
        let notify = {
            let signal = signal.clone();
            Arc::new(move |task| signal.notify_external(task))
        };
        let containers = pipeline.build(notify)?;
        let meta = containers
            .iter()
            .map(|container| TaskMeta {
                name: container.name().clone(),
                constraints: container.thread_constraints().clone(),
                following: container.following().to_vec(),
            })
            .collect();
        Ok(Self {
            containers: Arc::new(containers.into_iter().map(Mutex::new).collect()),
            meta,
            signal,
            workers: workers
                .into_iter()
                .map(|(group, count)| (group.into(), count))
                .collect(),
        })
    }

    /// Run the pipeline to completion.
    ///
    /// Returns once every container is finished: each input has been drained
    /// and no external producer remains active. Constraint satisfiability is
    /// checked up front, before any firing.
    pub fn run(self) -> Result<(), SchedulerError> {
        let _guard = tracing::error_span!("scheduler", tasks = self.containers.len()).entered();
        let n = self.containers.len();
        let available: ThreadGroup = self
            .workers
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(group, _)| group.clone())
            .collect();
        let total_workers: usize = self.workers.iter().map(|(_, count)| *count).sum();
        for meta in &self.meta {
            let unsatisfiable = if meta.constraints.is_unconstrained() {
                total_workers == 0
            } else {
                !meta.constraints.iter().any(|group| available.contains(group))
            };
            if unsatisfiable {
                return Err(SchedulerError::ThreadConstraintUnsatisfiable {
                    task: meta.name.clone(),
                    constraints: meta.constraints.clone(),
                    available,
                });
            }
        }

        let pool = ThreadPool::new(self.workers.iter().cloned());
        tracing::debug!(workers = pool.worker_count(), "pool started");
        let mut status = vec![TaskState::Idle; n];
        let mut finished = 0usize;
        // Everything gets one look up front; afterwards only tasks whose
        // queues may have changed are re-examined.
        let mut dirty: BTreeSet<usize> = (0..n).collect();

        loop {
            while let Some(i) = dirty.pop_first() {
                if status[i] != TaskState::Idle {
                    continue;
                }
                let container = self.containers[i].lock().unwrap();
                if container.is_finished() {
                    container.close_downstream();
                    drop(container);
                    status[i] = TaskState::Finished;
                    finished += 1;
                    tracing::debug!(id = %TaskId::new(i), name = %self.meta[i].name, "task finished");
                    dirty.extend(self.meta[i].following.iter().copied());
                } else if container.can_run() {
                    drop(container);
                    status[i] = TaskState::Running;
                    let containers = self.containers.clone();
                    let signal = self.signal.clone();
                    let name = self.meta[i].name.clone();
                    let job: Job = Box::new(move || {
                        let result = catch_unwind(AssertUnwindSafe(|| {
                            let mut container = containers[i].lock().unwrap();
                            let _guard =
                                tracing::error_span!("run", task = %name, id = i).entered();
                            container.run();
                        }));
                        match result {
                            Ok(()) => signal.notify_complete(i),
                            Err(_) => signal.notify_panic(name),
                        }
                    });
                    tracing::trace!(id = %TaskId::new(i), "dispatching firing");
                    pool.submit(self.meta[i].constraints.clone(), job);
                }
            }

            if finished == n {
                break;
            }

            let mut state = self.signal.state.lock().unwrap();
            loop {
                if let Some(task) = state.panicked.take() {
                    drop(state);
                    return Err(SchedulerError::TaskPanicked { task });
                }
                if !state.completed.is_empty() || !state.external.is_empty() {
                    for i in state.completed.drain(..) {
                        status[i] = TaskState::Idle;
                        dirty.insert(i);
                        dirty.extend(self.meta[i].following.iter().copied());
                    }
                    dirty.extend(std::mem::take(&mut state.external));
                    break;
                }
                state = self.signal.wake.wait(state).unwrap();
            }
        }

        drop(pool);
        tracing::debug!("pipeline finished");
        Ok(())
    }
}
