//! Task configurators: the per-task build-time state.

use super::ThreadGroup;
use super::container::{AbstractContainer, TaskContainer};
use super::helper::{ConnectionHelper, HelperBindError, PortKind, TypedHelper};
use super::list::{InputList, PortList};
use super::options::OptionStore;
use super::port::{InputSlot, OutputSlot, PortId};
use super::queue::Notify;
use super::task::Task;
use smol_str::SmolStr;
use std::any::Any;
use std::sync::Arc;

/// The object-safe face of a [`TaskConfigurator`], as stored by the pipeline.
///
/// Port lookup, type checking, and the error surface live on
/// [`Pipeline`](super::builder::Pipeline), which sees both ends of every
/// operation; the configurator exposes its slots and typed construction
/// steps.
pub(crate) trait AbstractConfigurator: Send {
    fn name(&self) -> &SmolStr;
    fn input_slots(&self) -> &[InputSlot];
    fn input_slots_mut(&mut self) -> &mut [InputSlot];
    fn output_slots(&self) -> &[OutputSlot];
    /// The pre-created external writer core for an input slot, type-erased.
    fn writer(&self, slot: usize) -> &(dyn Any + Send + Sync);
    /// Queue an erased listener callback for an output slot.
    fn push_listener(&mut self, slot: usize, callback: Box<dyn Any + Send>);
    fn add_thread_constraint(&mut self, group: &ThreadGroup);
    fn thread_constraints(&self) -> &ThreadGroup;
    fn options(&self) -> &Arc<OptionStore>;
    /// Materialize the connection helper carrying the typed queues and
    /// callback lists (with the queued listeners already bound).
    fn construct_connection_helper(&mut self) -> Result<Box<dyn ConnectionHelper>, HelperBindError>;
    /// Consume the helper and the task instance into the runtime container.
    ///
    /// The configurator is unusable afterwards; `build` calls this exactly
    /// once per task.
    fn construct_task_container(
        &mut self,
        helper: Box<dyn ConnectionHelper>,
        notify: Notify,
    ) -> Box<dyn AbstractContainer>;
}

pub(crate) struct TaskConfigurator<T: Task> {
    name: SmolStr,
    task: Option<T>,
    inputs: Vec<InputSlot>,
    outputs: Vec<OutputSlot>,
    /// `Arc<WriterCore<Ti>>` per input slot, created eagerly so external
    /// handles can be handed out before the queues exist.
    writers: Vec<Box<dyn Any + Send + Sync>>,
    listeners: Vec<(usize, Box<dyn Any + Send>)>,
    constraints: ThreadGroup,
    options: Arc<OptionStore>,
}

impl<T: Task> TaskConfigurator<T> {
    /// Create the configurator, checking identifier uniqueness per
    /// direction.
    pub fn new(task: T, name: SmolStr) -> Result<Self, (PortKind, PortId)> {
        let inputs: Vec<InputSlot> = <T::Input as PortList>::ids()
            .into_iter()
            .zip(<T::Input as PortList>::types())
            .zip(<T::Input as PortList>::type_names())
            .map(|((id, ty), ty_name)| InputSlot {
                id,
                ty,
                ty_name,
                source: None,
                external: false,
            })
            .collect();
        let outputs: Vec<OutputSlot> = <T::Output as PortList>::ids()
            .into_iter()
            .zip(<T::Output as PortList>::types())
            .zip(<T::Output as PortList>::type_names())
            .map(|((id, ty), ty_name)| OutputSlot { id, ty, ty_name })
            .collect();
        if let Some(id) = first_duplicate(inputs.iter().map(|slot| slot.id)) {
            return Err((PortKind::Input, id));
        }
        if let Some(id) = first_duplicate(outputs.iter().map(|slot| slot.id)) {
            return Err((PortKind::Output, id));
        }
        Ok(Self {
            name,
            task: Some(task),
            inputs,
            outputs,
            writers: <T::Input as InputList>::make_writers(),
            listeners: Vec::new(),
            constraints: T::thread_constraints(),
            options: Arc::new(OptionStore::from_map(T::options())),
        })
    }
}

fn first_duplicate(ids: impl Iterator<Item = PortId>) -> Option<PortId> {
    let mut seen = smallvec::SmallVec::<[PortId; 4]>::new();
    for id in ids {
        if seen.contains(&id) {
            return Some(id);
        }
        seen.push(id);
    }
    None
}

impl<T: Task> AbstractConfigurator for TaskConfigurator<T> {
    fn name(&self) -> &SmolStr {
        &self.name
    }
    fn input_slots(&self) -> &[InputSlot] {
        &self.inputs
    }
    fn input_slots_mut(&mut self) -> &mut [InputSlot] {
        &mut self.inputs
    }
    fn output_slots(&self) -> &[OutputSlot] {
        &self.outputs
    }
    fn writer(&self, slot: usize) -> &(dyn Any + Send + Sync) {
        &*self.writers[slot]
    }
    fn push_listener(&mut self, slot: usize, callback: Box<dyn Any + Send>) {
        self.listeners.push((slot, callback));
    }
    fn add_thread_constraint(&mut self, group: &ThreadGroup) {
        self.constraints |= group;
    }
    fn thread_constraints(&self) -> &ThreadGroup {
        &self.constraints
    }
    fn options(&self) -> &Arc<OptionStore> {
        &self.options
    }

    fn construct_connection_helper(&mut self) -> Result<Box<dyn ConnectionHelper>, HelperBindError> {
        let listeners = std::mem::take(&mut self.listeners);
        Ok(Box::new(TypedHelper::<T>::new(listeners)?))
    }

    fn construct_task_container(
        &mut self,
        helper: Box<dyn ConnectionHelper>,
        notify: Notify,
    ) -> Box<dyn AbstractContainer> {
        let Ok(helper) = helper.into_any().downcast::<TypedHelper<T>>() else {
            unreachable!("connection helper constructed for a different task type");
        };
        let helper = *helper;
        let Some(task) = self.task.take() else {
            unreachable!("task container constructed twice");
        };
        <T::Input as InputList>::attach_writers(&self.writers, &helper.queues, &notify);
        Box::new(TaskContainer::<T> {
            name: self.name.clone(),
            task,
            queues: helper.queues,
            callbacks: helper.callbacks,
            options: self.options.clone(),
            closers: helper.closers,
            following: helper.following.into_iter().collect(),
            constraints: self.constraints.clone(),
            finished: std::sync::atomic::AtomicBool::new(false),
        })
    }
}
