//! Per-input FIFO queues and the typed callback aliases used for fan-out.

use crate::mutex::Mutex;
use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The FIFO behind one input port.
///
/// Producers append at the tail (through the pushers handed out at bind
/// time), the owning container removes from the head. The `closed` flag is
/// set once the producer side is exhausted: by the upstream container
/// finishing, or by the external feeder sending its last element.
pub struct InputQueue<T> {
    items: Mutex<VecDeque<T>>,
    closed: AtomicBool,
}

impl<T> InputQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }
    pub fn push(&self, value: T) {
        self.items.lock().unwrap().push_back(value);
    }
    pub fn pop(&self) -> Option<T> {
        self.items.lock().unwrap().pop_front()
    }
    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> Debug for InputQueue<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputQueue")
            .field("len", &self.items.lock().unwrap().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A typed callback on an output slot: either a pusher into a bound input
/// queue, or a user listener.
pub(crate) type DataCallback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Closes one downstream queue when the producing container finishes.
pub(crate) type Closer = Box<dyn Fn() + Send + Sync>;

/// Tells the scheduler that an external input saw activity.
pub(crate) type Notify = Arc<dyn Fn() + Send + Sync>;

/// Emptiness and exhaustion of one input slot, observed together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotState {
    pub empty: bool,
    pub closed: bool,
}
