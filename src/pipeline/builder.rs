//! The pipeline builder: task registration, wiring, and `build`.

use super::configurator::{AbstractConfigurator, TaskConfigurator};
use super::container::AbstractContainer;
use super::external::{ExternalInput, WriterCore};
use super::helper::{ConnectionHelper, HelperBindError, PortKind};
use super::options::OptionStore;
use super::port::{OutputAddr, PortId};
use super::queue::DataCallback;
use super::task::Task;
use super::{TaskId, ThreadGroup};
use disqualified::ShortName;
use smol_str::SmolStr;
use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use thiserror::Error;

/// An error that occurs if a task ID can't be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("task {0} isn't part of this pipeline")]
pub struct InvalidTaskId(pub TaskId);

/// An error from [`Pipeline::add`] or [`Pipeline::add_named`].
#[derive(Debug, Error)]
pub enum AddTaskError {
    /// Two inputs or two outputs of the task share an identifier.
    #[error("task {task:?} declares two {kind} ports with identifier {port}")]
    DuplicatePortId {
        task: SmolStr,
        kind: PortKind,
        port: PortId,
    },
    /// The requested name is already taken.
    #[error("duplicate task name {name:?} (previously {old})")]
    DuplicateName { name: SmolStr, old: TaskId },
}

/// An error from [`Pipeline::bind`].
#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    UnknownTask(#[from] InvalidTaskId),
    #[error("task {task:?} has no output port {port}")]
    UnknownOutput { task: SmolStr, port: PortId },
    #[error("task {task:?} has no input port {port}")]
    UnknownInput { task: SmolStr, port: PortId },
    /// The two ports carry different element types.
    #[error("can't bind a {src} output to a {dest} input")]
    TypeMismatch {
        src: ShortName<'static>,
        dest: ShortName<'static>,
    },
    /// The input already has a bound output; an input consumes exactly one
    /// producer.
    #[error("input {port} of task {task:?} already has a bound output")]
    AlreadyBound { task: SmolStr, port: PortId },
    #[error("input {port} of task {task:?} is marked as external")]
    InputIsExternal { task: SmolStr, port: PortId },
}

impl crate::utils::LogErr for BindError {
    fn log_err(&self) {
        tracing::error!("{self}");
    }
}

/// An error from [`Pipeline::mark_external`].
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error(transparent)]
    UnknownTask(#[from] InvalidTaskId),
    #[error("task {task:?} has no input port {port}")]
    UnknownInput { task: SmolStr, port: PortId },
    #[error("external values of type {pushed} can't feed a {expected} input")]
    TypeMismatch {
        expected: ShortName<'static>,
        pushed: ShortName<'static>,
    },
    /// A bound input can't also be fed externally.
    #[error("input {port} of task {task:?} already has a bound output")]
    AlreadyBound { task: SmolStr, port: PortId },
}

/// An error from [`Pipeline::add_listener`].
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    UnknownTask(#[from] InvalidTaskId),
    #[error("task {task:?} has no output port {port}")]
    UnknownOutput { task: SmolStr, port: PortId },
    #[error("a {listener} listener can't observe a {output} output")]
    TypeMismatch {
        output: ShortName<'static>,
        listener: ShortName<'static>,
    },
}

/// An error from building the pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A non-external input has no bound output.
    #[error("input {port} of task {task:?} ({id}) has no bound output and isn't external")]
    UnboundInput {
        id: TaskId,
        task: SmolStr,
        port: PortId,
    },
    /// The erased helper protocol rejected an address or a type; with the
    /// checks on the pipeline surface this indicates an internal bug.
    #[error(transparent)]
    Helper(#[from] HelperBindError),
}

impl crate::utils::LogErr for BuildError {
    fn log_err(&self) {
        tracing::error!("{self}");
    }
}

/// An under-construction pipeline.
///
/// Add tasks with [`add`](Self::add), wire them with [`bind`](Self::bind),
/// feed them from outside with [`mark_external`](Self::mark_external), and
/// observe them with [`add_listener`](Self::add_listener). A
/// [`Scheduler`](super::scheduler::Scheduler) consumes the pipeline, builds
/// the task containers, and runs them; see the
/// [module documentation](super) for a complete example.
#[derive(Default)]
pub struct Pipeline {
    tasks: Vec<Box<dyn AbstractConfigurator>>,
    lookup: HashMap<SmolStr, TaskId>,
}

impl Debug for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("tasks", &self.tasks.len())
            .field("lookup", &self.lookup)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a new, empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of tasks added so far.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The name of a task.
    pub fn task_name(&self, task: TaskId) -> Option<&SmolStr> {
        self.tasks.get(task.index()).map(|cfg| cfg.name())
    }

    /// Add a task under a name derived from its type.
    ///
    /// If the derived name is taken, an index suffix disambiguates it.
    pub fn add<T: Task>(&mut self, task: T) -> Result<TaskId, AddTaskError> {
        let base = ShortName::of::<T>().to_string();
        let name = if self.lookup.contains_key(base.as_str()) {
            SmolStr::from(format!("{base}-{}", self.tasks.len()))
        } else {
            SmolStr::from(base)
        };
        self.add_named(task, name)
    }

    /// Add a task under an explicit, unique name.
    pub fn add_named<T: Task>(
        &mut self,
        task: T,
        name: impl Into<SmolStr>,
    ) -> Result<TaskId, AddTaskError> {
        let name = name.into();
        let configurator =
            TaskConfigurator::new(task, name.clone()).map_err(|(kind, port)| {
                AddTaskError::DuplicatePortId {
                    task: name.clone(),
                    kind,
                    port,
                }
            })?;
        match self.lookup.entry(name.clone()) {
            Entry::Occupied(e) => Err(AddTaskError::DuplicateName {
                name,
                old: *e.get(),
            }),
            Entry::Vacant(e) => {
                let id = TaskId::new(self.tasks.len());
                self.tasks.push(Box::new(configurator));
                tracing::trace!(task = %id, name = %e.key(), "added task");
                e.insert(id);
                Ok(id)
            }
        }
    }

    /// Look up a task by name.
    pub fn lookup(&self, name: &str) -> Option<TaskId> {
        self.lookup.get(name).copied()
    }

    /// Bind an output port of `src` to an input port of `dst`.
    ///
    /// An output may fan out to any number of inputs; an input accepts
    /// exactly one bound output.
    pub fn bind(
        &mut self,
        src: TaskId,
        output: impl Into<PortId>,
        dst: TaskId,
        input: impl Into<PortId>,
    ) -> Result<(), BindError> {
        let output = output.into();
        let input = input.into();
        let src_cfg = self
            .tasks
            .get(src.index())
            .ok_or(InvalidTaskId(src))?;
        let out_slot = *src_cfg
            .output_slots()
            .iter()
            .find(|slot| slot.id == output)
            .ok_or_else(|| BindError::UnknownOutput {
                task: src_cfg.name().clone(),
                port: output,
            })?;
        let dst_cfg = self
            .tasks
            .get_mut(dst.index())
            .ok_or(InvalidTaskId(dst))?;
        let dst_name = dst_cfg.name().clone();
        let in_slot = dst_cfg
            .input_slots_mut()
            .iter_mut()
            .find(|slot| slot.id == input)
            .ok_or(BindError::UnknownInput {
                task: dst_name.clone(),
                port: input,
            })?;
        if in_slot.ty != out_slot.ty {
            return Err(BindError::TypeMismatch {
                src: out_slot.ty_name,
                dest: in_slot.ty_name,
            });
        }
        if in_slot.external {
            return Err(BindError::InputIsExternal {
                task: dst_name,
                port: input,
            });
        }
        if in_slot.source.is_some() {
            return Err(BindError::AlreadyBound {
                task: dst_name,
                port: input,
            });
        }
        in_slot.source = Some(OutputAddr {
            task: src,
            port: output,
        });
        tracing::trace!(src = %src, %output, dst = %dst, %input, "bound ports");
        Ok(())
    }

    /// Mark an input as external and return the feeder for it.
    ///
    /// External inputs are skipped when the pipeline's connections are
    /// resolved; the returned [`ExternalInput`] is their only ingress.
    /// Marking the same input again returns a handle to the same feeder.
    pub fn mark_external<V: Send + 'static>(
        &mut self,
        task: TaskId,
        input: impl Into<PortId>,
    ) -> Result<ExternalInput<V>, ExternalError> {
        let input = input.into();
        let cfg = self
            .tasks
            .get_mut(task.index())
            .ok_or(InvalidTaskId(task))?;
        let name = cfg.name().clone();
        let Some(slot) = cfg
            .input_slots()
            .iter()
            .position(|slot| slot.id == input)
        else {
            return Err(ExternalError::UnknownInput { task: name, port: input });
        };
        let in_slot = &cfg.input_slots()[slot];
        if in_slot.ty != TypeId::of::<V>() {
            return Err(ExternalError::TypeMismatch {
                expected: in_slot.ty_name,
                pushed: ShortName::of::<V>(),
            });
        }
        if in_slot.source.is_some() {
            return Err(ExternalError::AlreadyBound {
                task: name,
                port: input,
            });
        }
        cfg.input_slots_mut()[slot].external = true;
        let Some(core) = cfg.writer(slot).downcast_ref::<Arc<WriterCore<V>>>() else {
            unreachable!("writer core type diverged from its slot type");
        };
        Ok(ExternalInput { core: core.clone() })
    }

    /// Attach a listener to an output port.
    ///
    /// The callable is invoked with every value the output produces, after
    /// the pushers of any bound inputs. Listeners are ordinary output
    /// callbacks, not a distinct mechanism.
    pub fn add_listener<V: Send + 'static, F: Fn(V) + Send + Sync + 'static>(
        &mut self,
        task: TaskId,
        output: impl Into<PortId>,
        listener: F,
    ) -> Result<(), ListenerError> {
        let output = output.into();
        let cfg = self
            .tasks
            .get_mut(task.index())
            .ok_or(InvalidTaskId(task))?;
        let name = cfg.name().clone();
        let Some(slot) = cfg
            .output_slots()
            .iter()
            .position(|slot| slot.id == output)
        else {
            return Err(ListenerError::UnknownOutput { task: name, port: output });
        };
        let out_slot = &cfg.output_slots()[slot];
        if out_slot.ty != TypeId::of::<V>() {
            return Err(ListenerError::TypeMismatch {
                output: out_slot.ty_name,
                listener: ShortName::of::<V>(),
            });
        }
        let callback: DataCallback<V> = Box::new(listener);
        cfg.push_listener(slot, Box::new(callback));
        Ok(())
    }

    /// Union additional thread groups into a task's constraint set.
    pub fn add_thread_constraint(
        &mut self,
        task: TaskId,
        groups: &ThreadGroup,
    ) -> Result<(), InvalidTaskId> {
        self.tasks
            .get_mut(task.index())
            .ok_or(InvalidTaskId(task))?
            .add_thread_constraint(groups);
        Ok(())
    }

    /// A task's current constraint set.
    pub fn thread_constraints(&self, task: TaskId) -> Result<&ThreadGroup, InvalidTaskId> {
        Ok(self
            .tasks
            .get(task.index())
            .ok_or(InvalidTaskId(task))?
            .thread_constraints())
    }

    /// The options store of a task.
    ///
    /// The store stays valid after the pipeline is built; this is how option
    /// values are tuned from outside while the pipeline runs.
    pub fn options(&self, task: TaskId) -> Result<Arc<OptionStore>, InvalidTaskId> {
        Ok(self
            .tasks
            .get(task.index())
            .ok_or(InvalidTaskId(task))?
            .options()
            .clone())
    }

    /// Resolve all bindings and construct the task containers.
    ///
    /// `notify` is invoked with a task's index whenever one of its external
    /// inputs sees activity. The returned containers are ordered by task
    /// index.
    pub(crate) fn build(
        mut self,
        notify: Arc<dyn Fn(usize) + Send + Sync>,
    ) -> Result<Vec<Box<dyn AbstractContainer>>, BuildError> {
        let _guard = tracing::error_span!("build", tasks = self.tasks.len()).entered();
        let mut helpers: Vec<Box<dyn ConnectionHelper>> = Vec::with_capacity(self.tasks.len());
        for cfg in &mut self.tasks {
            helpers.push(cfg.construct_connection_helper()?);
        }

        for i in 0..self.tasks.len() {
            let inputs: Vec<_> = self.tasks[i]
                .input_slots()
                .iter()
                .map(|slot| (slot.id, slot.source, slot.external))
                .collect();
            for (port, source, external) in inputs {
                if external {
                    continue;
                }
                let Some(source) = source else {
                    return Err(BuildError::UnboundInput {
                        id: TaskId::new(i),
                        task: self.tasks[i].name().clone(),
                        port,
                    });
                };
                // Outputs are unique addresses, so the owner index is part
                // of the address itself.
                let target = helpers[i].target(port).map_err(HelperBindError::from)?;
                let j = source.task.index();
                helpers[j].bind(source.port, target)?;
                helpers[j].add_following(i);
            }
        }

        let containers = self
            .tasks
            .iter_mut()
            .zip(helpers)
            .enumerate()
            .map(|(i, (cfg, helper))| {
                let notify = notify.clone();
                cfg.construct_task_container(helper, Arc::new(move || notify(i)))
            })
            .collect();
        tracing::debug!("pipeline built");
        Ok(containers)
    }
}
