//! Connection helpers: the type-erased boundary between tasks during wiring.
//!
//! Each task gets one helper at build time. The helper owns the typed queue
//! and callback tuples until the task container is constructed, and is the
//! only place where erased callbacks cross between tasks: `target` hands out
//! a pusher for one of its input queues, and `bind` reinterprets a received
//! pusher as a callback on one of its output slots. Every erased pointer is
//! downcast back to the slot's declared element type, which is fixed by the
//! task's `run` signature.

use super::list::{ErasedBindError, InputList, OutputList, PortList};
use super::port::PortId;
use super::queue::Closer;
use super::task::Task;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Which direction of port an operation addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Input,
    Output,
}

impl Display for PortKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// A helper operation referenced a port address it does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no {kind} port {port} on this task")]
pub struct SlotNotFound {
    pub kind: PortKind,
    pub port: PortId,
}

/// An error from binding an erased callback to an output slot.
#[derive(Debug, Error)]
pub enum HelperBindError {
    #[error(transparent)]
    SlotNotFound(#[from] SlotNotFound),
    #[error("callback type doesn't match the output element type {expected}")]
    TypeMismatch {
        expected: disqualified::ShortName<'static>,
    },
}

/// An erased pusher into one input queue, plus the closer invoked when the
/// producing task is exhausted.
pub(crate) struct InputTarget {
    pub pusher: Box<dyn Any + Send>,
    pub closer: Closer,
}

/// The type-erased facade over a task's typed queues and callback lists.
///
/// Addresses are port identifiers; each helper maps them to slot indices
/// internally, in declaration order.
pub(crate) trait ConnectionHelper: Send {
    /// Hand out the pusher for one of this task's input queues.
    fn target(&mut self, input: PortId) -> Result<InputTarget, SlotNotFound>;
    /// Append a received pusher to one of this task's output slots.
    fn bind(&mut self, output: PortId, target: InputTarget) -> Result<(), HelperBindError>;
    /// Record that another task consumes one of this task's outputs.
    fn add_following(&mut self, node: usize);
    /// Relinquish the typed storage to the container constructor.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// The typed helper for one task, consumed into its container at build.
pub(crate) struct TypedHelper<T: Task> {
    pub queues: <T::Input as InputList>::Queues,
    pub callbacks: <T::Output as OutputList>::Callbacks,
    pub closers: Vec<Closer>,
    pub following: BTreeSet<usize>,
    input_ids: SmallVec<[PortId; 4]>,
    output_ids: SmallVec<[PortId; 4]>,
}

impl<T: Task> TypedHelper<T> {
    /// Create the helper, binding the configurator's listeners as ordinary
    /// output callbacks.
    pub fn new(
        listeners: impl IntoIterator<Item = (usize, Box<dyn Any + Send>)>,
    ) -> Result<Self, HelperBindError> {
        let mut this = Self {
            queues: <T::Input as InputList>::make_queues(),
            callbacks: Default::default(),
            closers: Vec::new(),
            following: BTreeSet::new(),
            input_ids: <T::Input as PortList>::ids(),
            output_ids: <T::Output as PortList>::ids(),
        };
        for (slot, callback) in listeners {
            this.bind_slot(slot, callback)?;
        }
        Ok(this)
    }

    fn bind_slot(&mut self, slot: usize, callback: Box<dyn Any + Send>) -> Result<(), HelperBindError> {
        <T::Output as OutputList>::bind_erased(&mut self.callbacks, slot, callback).map_err(
            |err| match err {
                ErasedBindError::SlotNotFound(_) => SlotNotFound {
                    kind: PortKind::Output,
                    port: self
                        .output_ids
                        .get(slot)
                        .copied()
                        .unwrap_or(PortId(u64::MAX)),
                }
                .into(),
                ErasedBindError::TypeMismatch { expected } => {
                    HelperBindError::TypeMismatch { expected }
                }
            },
        )
    }
}

impl<T: Task> ConnectionHelper for TypedHelper<T> {
    fn target(&mut self, input: PortId) -> Result<InputTarget, SlotNotFound> {
        let missing = SlotNotFound {
            kind: PortKind::Input,
            port: input,
        };
        let slot = self
            .input_ids
            .iter()
            .position(|id| *id == input)
            .ok_or(missing)?;
        let pusher = <T::Input as InputList>::pusher(&self.queues, slot).ok_or(missing)?;
        let closer = <T::Input as InputList>::closer(&self.queues, slot).ok_or(missing)?;
        Ok(InputTarget { pusher, closer })
    }

    fn bind(&mut self, output: PortId, target: InputTarget) -> Result<(), HelperBindError> {
        let slot = self
            .output_ids
            .iter()
            .position(|id| *id == output)
            .ok_or(SlotNotFound {
                kind: PortKind::Output,
                port: output,
            })?;
        self.bind_slot(slot, target.pusher)?;
        self.closers.push(target.closer);
        Ok(())
    }

    fn add_following(&mut self, node: usize) {
        self.following.insert(node);
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
