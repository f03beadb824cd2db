//! Port lists: the typed tuple machinery behind a task's `run` signature.
//!
//! A task declares its ports as tuples of [`Port`] markers; the traits here
//! derive everything the runtime needs from those tuples: the value types
//! `run` consumes and produces, the typed queue tuple, the typed callback
//! tuple, and the slot-indexed erased operations the connection helper
//! dispatches through.

use super::external::WriterCore;
use super::port::{Port, PortId};
use super::queue::{Closer, DataCallback, InputQueue, Notify, SlotState};
use smallvec::{SmallVec, smallvec};
use std::any::{Any, TypeId};
use std::sync::Arc;
use thiserror::Error;

/// The value tuple carried by a port list.
pub type Values<L> = <L as PortList>::Values;

/// An error from the slot-indexed erased binding protocol.
///
/// Neither case can be produced through the public pipeline surface, which
/// validates addresses and element types before handing callbacks across the
/// helper boundary.
#[derive(Debug, Error)]
pub enum ErasedBindError {
    #[error("no output slot {0}")]
    SlotNotFound(usize),
    #[error("callback type doesn't match the output element type {expected}")]
    TypeMismatch {
        expected: disqualified::ShortName<'static>,
    },
}

/// Common metadata of a list of ports: slot count, identifiers, and element
/// types in slot order.
pub trait PortList: 'static {
    /// The tuple of element values flowing through these ports.
    type Values: Send + 'static;
    const COUNT: usize;
    fn ids() -> SmallVec<[PortId; 4]>;
    fn types() -> SmallVec<[TypeId; 4]>;
    fn type_names() -> SmallVec<[disqualified::ShortName<'static>; 4]>;
}

/// A port list usable as a task's input set.
///
/// Carries the typed queue tuple and the slot-indexed operations over it.
/// The erased values crossing the helper boundary are `Box<dyn Any>`s
/// wrapping a [`DataCallback`] of the slot's element type.
pub trait InputList: PortList {
    /// One shared [`InputQueue`] per slot.
    type Queues: Send + Sync + 'static;
    fn make_queues() -> Self::Queues;
    /// One pre-created external writer core per slot, type-erased.
    ///
    /// Cores are created eagerly so that `mark_as_external` can hand out a
    /// feeder handle long before the queues exist; unused cores simply never
    /// see a value.
    fn make_writers() -> Vec<Box<dyn Any + Send + Sync>>;
    /// An erased pusher appending to the slot's queue.
    fn pusher(queues: &Self::Queues, slot: usize) -> Option<Box<dyn Any + Send>>;
    /// A callback closing the slot's queue.
    fn closer(queues: &Self::Queues, slot: usize) -> Option<Closer>;
    /// Wire every writer core to its queue and the scheduler's notifier,
    /// draining values buffered before the pipeline was built.
    fn attach_writers(
        writers: &[Box<dyn Any + Send + Sync>],
        queues: &Self::Queues,
        notify: &Notify,
    );
    fn slot_states(queues: &Self::Queues) -> SmallVec<[SlotState; 4]>;
    fn all_nonempty(queues: &Self::Queues) -> bool;
    /// Dequeue the head of every queue in slot order, all or nothing.
    fn pop_values(queues: &Self::Queues) -> Option<Self::Values>;
}

/// A port list usable as a task's output set.
///
/// In addition to tuples, a single bare [`Port`] (one output) and `()` (no
/// outputs) are output lists.
pub trait OutputList: PortList {
    /// One callback list per slot, frozen once the pipeline is built.
    type Callbacks: Default + Send + Sync + 'static;
    /// Append an erased [`DataCallback`] to a slot's list.
    fn bind_erased(
        callbacks: &mut Self::Callbacks,
        slot: usize,
        callback: Box<dyn Any + Send>,
    ) -> Result<(), ErasedBindError>;
    /// Invoke every callback of every slot with the firing's values, in
    /// registration order within each slot.
    fn fan_out(callbacks: &Self::Callbacks, values: Self::Values);
}

impl PortList for () {
    type Values = ();
    const COUNT: usize = 0;
    fn ids() -> SmallVec<[PortId; 4]> {
        SmallVec::new()
    }
    fn types() -> SmallVec<[TypeId; 4]> {
        SmallVec::new()
    }
    fn type_names() -> SmallVec<[disqualified::ShortName<'static>; 4]> {
        SmallVec::new()
    }
}

impl InputList for () {
    type Queues = ();
    fn make_queues() -> Self::Queues {}
    fn make_writers() -> Vec<Box<dyn Any + Send + Sync>> {
        Vec::new()
    }
    fn pusher(_queues: &Self::Queues, _slot: usize) -> Option<Box<dyn Any + Send>> {
        None
    }
    fn closer(_queues: &Self::Queues, _slot: usize) -> Option<Closer> {
        None
    }
    fn attach_writers(
        _writers: &[Box<dyn Any + Send + Sync>],
        _queues: &Self::Queues,
        _notify: &Notify,
    ) {
    }
    fn slot_states(_queues: &Self::Queues) -> SmallVec<[SlotState; 4]> {
        SmallVec::new()
    }
    fn all_nonempty(_queues: &Self::Queues) -> bool {
        true
    }
    fn pop_values(_queues: &Self::Queues) -> Option<Self::Values> {
        Some(())
    }
}

impl OutputList for () {
    type Callbacks = ();
    fn bind_erased(
        _callbacks: &mut Self::Callbacks,
        slot: usize,
        _callback: Box<dyn Any + Send>,
    ) -> Result<(), ErasedBindError> {
        Err(ErasedBindError::SlotNotFound(slot))
    }
    fn fan_out(_callbacks: &Self::Callbacks, _values: Self::Values) {}
}

impl<T: Clone + Send + 'static, const ID: u64> PortList for Port<T, ID> {
    type Values = T;
    const COUNT: usize = 1;
    fn ids() -> SmallVec<[PortId; 4]> {
        smallvec![PortId(ID)]
    }
    fn types() -> SmallVec<[TypeId; 4]> {
        smallvec![TypeId::of::<T>()]
    }
    fn type_names() -> SmallVec<[disqualified::ShortName<'static>; 4]> {
        smallvec![disqualified::ShortName::of::<T>()]
    }
}

impl<T: Clone + Send + 'static, const ID: u64> OutputList for Port<T, ID> {
    type Callbacks = Vec<DataCallback<T>>;
    fn bind_erased(
        callbacks: &mut Self::Callbacks,
        slot: usize,
        callback: Box<dyn Any + Send>,
    ) -> Result<(), ErasedBindError> {
        if slot != 0 {
            return Err(ErasedBindError::SlotNotFound(slot));
        }
        let callback = callback.downcast::<DataCallback<T>>().map_err(|_| {
            ErasedBindError::TypeMismatch {
                expected: disqualified::ShortName::of::<T>(),
            }
        })?;
        callbacks.push(*callback);
        Ok(())
    }
    fn fan_out(callbacks: &Self::Callbacks, values: Self::Values) {
        for callback in callbacks {
            callback(values.clone());
        }
    }
}

macro_rules! impl_port_lists {
    ($count:literal; $(($T:ident, $I:ident, $idx:tt)),+) => {
        impl<$($T: Clone + Send + 'static, const $I: u64),+> PortList for ($(Port<$T, $I>,)+) {
            type Values = ($($T,)+);
            const COUNT: usize = $count;
            fn ids() -> SmallVec<[PortId; 4]> {
                smallvec![$(PortId($I)),+]
            }
            fn types() -> SmallVec<[TypeId; 4]> {
                smallvec![$(TypeId::of::<$T>()),+]
            }
            fn type_names() -> SmallVec<[disqualified::ShortName<'static>; 4]> {
                smallvec![$(disqualified::ShortName::of::<$T>()),+]
            }
        }
        impl<$($T: Clone + Send + 'static, const $I: u64),+> InputList for ($(Port<$T, $I>,)+) {
            type Queues = ($(Arc<InputQueue<$T>>,)+);
            fn make_queues() -> Self::Queues {
                ($(Arc::new(InputQueue::<$T>::new()),)+)
            }
            fn make_writers() -> Vec<Box<dyn Any + Send + Sync>> {
                vec![$(Box::new(Arc::new(WriterCore::<$T>::new())) as Box<dyn Any + Send + Sync>),+]
            }
            fn pusher(queues: &Self::Queues, slot: usize) -> Option<Box<dyn Any + Send>> {
                match slot {
                    $($idx => {
                        let queue = queues.$idx.clone();
                        let callback: DataCallback<$T> = Box::new(move |value| queue.push(value));
                        Some(Box::new(callback))
                    })+
                    _ => None,
                }
            }
            fn closer(queues: &Self::Queues, slot: usize) -> Option<Closer> {
                match slot {
                    $($idx => {
                        let queue = queues.$idx.clone();
                        Some(Box::new(move || queue.close()))
                    })+
                    _ => None,
                }
            }
            fn attach_writers(
                writers: &[Box<dyn Any + Send + Sync>],
                queues: &Self::Queues,
                notify: &Notify,
            ) {
                $(
                    if let Some(core) = writers
                        .get($idx)
                        .and_then(|w| w.downcast_ref::<Arc<WriterCore<$T>>>())
                    {
                        core.attach(queues.$idx.clone(), notify.clone());
                    }
                )+
            }
            fn slot_states(queues: &Self::Queues) -> SmallVec<[SlotState; 4]> {
                smallvec![$(SlotState {
                    empty: queues.$idx.is_empty(),
                    closed: queues.$idx.is_closed(),
                }),+]
            }
            fn all_nonempty(queues: &Self::Queues) -> bool {
                true $(&& !queues.$idx.is_empty())+
            }
            fn pop_values(queues: &Self::Queues) -> Option<Self::Values> {
                // The owning container is the only consumer, so a non-empty
                // check up front keeps the pops below from half-draining.
                if !Self::all_nonempty(queues) {
                    return None;
                }
                Some(($(queues.$idx.pop()?,)+))
            }
        }
        impl<$($T: Clone + Send + 'static, const $I: u64),+> OutputList for ($(Port<$T, $I>,)+) {
            type Callbacks = ($(Vec<DataCallback<$T>>,)+);
            fn bind_erased(
                callbacks: &mut Self::Callbacks,
                slot: usize,
                callback: Box<dyn Any + Send>,
            ) -> Result<(), ErasedBindError> {
                match slot {
                    $($idx => {
                        let callback = callback.downcast::<DataCallback<$T>>().map_err(|_| {
                            ErasedBindError::TypeMismatch {
                                expected: disqualified::ShortName::of::<$T>(),
                            }
                        })?;
                        callbacks.$idx.push(*callback);
                        Ok(())
                    })+
                    _ => Err(ErasedBindError::SlotNotFound(slot)),
                }
            }
            #[allow(non_snake_case)]
            fn fan_out(callbacks: &Self::Callbacks, values: Self::Values) {
                let ($($T,)+) = values;
                $(
                    for callback in &callbacks.$idx {
                        callback($T.clone());
                    }
                )+
            }
        }
    };
}

impl_port_lists!(1; (T0, I0, 0));
impl_port_lists!(2; (T0, I0, 0), (T1, I1, 1));
impl_port_lists!(3; (T0, I0, 0), (T1, I1, 1), (T2, I2, 2));
impl_port_lists!(4; (T0, I0, 0), (T1, I1, 1), (T2, I2, 2), (T3, I3, 3));
impl_port_lists!(5; (T0, I0, 0), (T1, I1, 1), (T2, I2, 2), (T3, I3, 3), (T4, I4, 4));
impl_port_lists!(6; (T0, I0, 0), (T1, I1, 1), (T2, I2, 2), (T3, I3, 3), (T4, I4, 4), (T5, I5, 5));
impl_port_lists!(7; (T0, I0, 0), (T1, I1, 1), (T2, I2, 2), (T3, I3, 3), (T4, I4, 4), (T5, I5, 5), (T6, I6, 6));
impl_port_lists!(8; (T0, I0, 0), (T1, I1, 1), (T2, I2, 2), (T3, I3, 3), (T4, I4, 4), (T5, I5, 5), (T6, I6, 6), (T7, I7, 7));
