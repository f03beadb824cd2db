//! Typed dataflow pipelines.
//!
//! A pipeline is a set of tasks with statically typed input and output ports,
//! wired together by binding outputs to inputs. Once built, a [`Scheduler`]
//! drives the tasks concurrently on a thread pool, honoring per-task
//! thread-group constraints and waiting on externally fed inputs.
//!
//! See the [`pipeline`] module documentation for a full example.
//!
//! [`Scheduler`]: pipeline::Scheduler

pub mod pipeline;
pub mod utils;

/// Locks used throughout the crate.
///
/// Either a re-export of [`std::sync`]'s primitives or a wrapper around
/// [`no_deadlocks`]' checked ones, based on whether the `debug-tools` feature
/// is enabled.
pub mod mutex {
    #[cfg(feature = "debug-tools")]
    mod inner {
        use no_deadlocks as nd;
        pub use no_deadlocks::MutexGuard;
        use std::fmt::{self, Debug, Formatter};
        use std::ops::{Deref, DerefMut};
        use std::sync::{LockResult, TryLockError};

        #[derive(Default)]
        pub struct Mutex<T: ?Sized>(nd::Mutex<T>);
        impl<T> Mutex<T> {
            pub fn new(inner: T) -> Self {
                Self(nd::Mutex::new(inner))
            }
            pub fn into_inner(self) -> LockResult<T> {
                self.0.into_inner()
            }
        }
        impl<T: ?Sized> Deref for Mutex<T> {
            type Target = nd::Mutex<T>;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
        impl<T: ?Sized> DerefMut for Mutex<T> {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }
        impl<T: Debug> Debug for Mutex<T> {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                let mut s = f.debug_struct("Mutex");
                match self.try_lock() {
                    Ok(guard) => {
                        s.field("inner", &*guard).field("is_poisoned", &false);
                    }
                    Err(TryLockError::Poisoned(err)) => {
                        s.field("inner", &*err.into_inner())
                            .field("is_poisoned", &true);
                    }
                    Err(TryLockError::WouldBlock) => {}
                }
                s.finish_non_exhaustive()
            }
        }
    }
    #[cfg(feature = "debug-tools")]
    pub use inner::{Mutex, MutexGuard};
    #[cfg(not(feature = "debug-tools"))]
    pub use std::sync::{Mutex, MutexGuard};
}
