//! External inputs: user-held feeders for inputs produced outside the
//! pipeline.

use super::queue::{InputQueue, Notify};
use crate::mutex::Mutex;
use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

struct WriterState<T> {
    /// Values pushed before the pipeline was built.
    buffered: VecDeque<T>,
    sink: Option<Arc<InputQueue<T>>>,
    notify: Option<Notify>,
    closed: bool,
}

/// The shared core behind an [`ExternalInput`] handle.
///
/// One core is created per input slot at configurator construction; it's
/// wired to the slot's queue and the scheduler's notifier when the container
/// is built. Values pushed before that point are buffered and drained into
/// the queue on attach.
pub(crate) struct WriterCore<T> {
    state: Mutex<WriterState<T>>,
}

impl<T: Send + 'static> WriterCore<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WriterState {
                buffered: VecDeque::new(),
                sink: None,
                notify: None,
                closed: false,
            }),
        }
    }

    pub fn push(&self, value: T, is_last: bool) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            tracing::error!("value pushed into an external input after its last element");
            return;
        }
        if let Some(sink) = state.sink.clone() {
            sink.push(value);
            if is_last {
                state.closed = true;
                sink.close();
            }
            let notify = state.notify.clone();
            drop(state);
            if let Some(notify) = notify {
                notify();
            }
        } else {
            state.buffered.push_back(value);
            if is_last {
                state.closed = true;
            }
        }
    }

    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        if let Some(sink) = &state.sink {
            sink.close();
        }
        let notify = state.notify.clone();
        drop(state);
        if let Some(notify) = notify {
            notify();
        }
    }

    /// Wire this core to its queue and the scheduler's notifier.
    pub(crate) fn attach(&self, sink: Arc<InputQueue<T>>, notify: Notify) {
        let mut state = self.state.lock().unwrap();
        while let Some(value) = state.buffered.pop_front() {
            sink.push(value);
        }
        if state.closed {
            sink.close();
        }
        state.sink = Some(sink);
        state.notify = Some(notify);
    }
}

/// A feeder for an input that was marked as external.
///
/// This is the sole ingress for external inputs: each [`push`](Self::push)
/// appends one value to the input's queue, and pushing with `is_last = true`
/// (or calling [`close`](Self::close)) signals that no further values will
/// arrive, letting the pipeline terminate. The handle is cheap to clone and
/// may be used from any thread, before or while the pipeline runs.
///
/// Values pushed after the last element are dropped with an error log.
pub struct ExternalInput<T> {
    pub(crate) core: Arc<WriterCore<T>>,
}

impl<T> Clone for ExternalInput<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Send + 'static> ExternalInput<T> {
    /// Push one value, marking it as the final one if `is_last` is set.
    pub fn push(&self, value: T, is_last: bool) {
        self.core.push(value, is_last);
    }
    /// Signal exhaustion without pushing a value.
    pub fn close(&self) {
        self.core.close();
    }
}

impl<T> Debug for ExternalInput<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalInput")
            .field("type", &disqualified::ShortName::of::<T>())
            .finish_non_exhaustive()
    }
}
