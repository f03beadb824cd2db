//! Task containers: the per-task runtime constructed by `build`.

use super::ThreadGroup;
use super::list::{InputList, OutputList, PortList};
use super::options::OptionStore;
use super::queue::Closer;
use super::task::Task;
use smol_str::SmolStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The runtime facade of one task: readiness, one firing, and termination.
pub(crate) trait AbstractContainer: Send {
    fn name(&self) -> &SmolStr;
    /// Whether a firing could consume one element from every input queue.
    fn can_run(&self) -> bool;
    /// Perform one firing: dequeue, run, fan out.
    fn run(&mut self);
    /// Whether this task can never fire again.
    fn is_finished(&self) -> bool;
    /// Close every downstream queue fed by this task's outputs.
    ///
    /// The scheduler calls this once, when it first observes the container
    /// finished.
    fn close_downstream(&self);
    fn thread_constraints(&self) -> &ThreadGroup;
    /// Indices of the tasks consuming this task's outputs.
    fn following(&self) -> &[usize];
}

/// The container for one task, owning the node instance and the typed
/// storage relinquished by its connection helper.
pub(crate) struct TaskContainer<T: Task> {
    pub name: SmolStr,
    pub task: T,
    pub queues: <T::Input as InputList>::Queues,
    pub callbacks: <T::Output as OutputList>::Callbacks,
    pub options: Arc<OptionStore>,
    pub closers: Vec<Closer>,
    pub following: Vec<usize>,
    pub constraints: ThreadGroup,
    /// Latched by `is_finished`; a finished container never comes back.
    pub finished: AtomicBool,
}

impl<T: Task> AbstractContainer for TaskContainer<T> {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn can_run(&self) -> bool {
        !self.is_finished()
            && <T::Input as PortList>::COUNT > 0
            && <T::Input as InputList>::all_nonempty(&self.queues)
    }

    fn run(&mut self) {
        let Some(values) = <T::Input as InputList>::pop_values(&self.queues) else {
            tracing::error!(task = %self.name, "fired without a full set of inputs");
            return;
        };
        let output = self.task.run(values, &self.options);
        <T::Output as OutputList>::fan_out(&self.callbacks, output);
    }

    fn is_finished(&self) -> bool {
        if self.finished.load(Ordering::Acquire) {
            return true;
        }
        let states = <T::Input as InputList>::slot_states(&self.queues);
        // Once any exhausted queue has drained, no further firing can ever
        // assemble a full input set; leftover unmatched elements on sibling
        // queues don't hold the pipeline open.
        let done = states.iter().all(|state| state.closed)
            && (states.is_empty() || states.iter().any(|state| state.empty));
        if done {
            self.finished.store(true, Ordering::Release);
        }
        done
    }

    fn close_downstream(&self) {
        for closer in &self.closers {
            closer();
        }
    }

    fn thread_constraints(&self) -> &ThreadGroup {
        &self.constraints
    }

    fn following(&self) -> &[usize] {
        &self.following
    }
}
