//! Pipeline building and running utilities
//!
//! A pipeline is a collection of tasks whose typed output ports are bound to
//! typed input ports. To run one, declare tasks with the [`Task`] trait, wire
//! them up on a [`Pipeline`], and hand the result to a [`Scheduler`].
//!
//! # Example
//!
//! ```rust
//! use weft::pipeline::prelude::*;
//! use std::sync::mpsc::channel;
//!
//! struct Double;
//! impl Task for Double {
//!     type Input = (Port<i32, { port_id("value") }>,);
//!     type Output = (Port<i32, { port_id("doubled") }>,);
//!     fn run(&mut self, (value,): (i32,), _options: &OptionStore) -> (i32,) {
//!         (value * 2,)
//!     }
//! }
//!
//! let mut pipeline = Pipeline::new();
//! let double = pipeline.add(Double).unwrap();
//!
//! // Values enter through an external input and leave through a listener.
//! let feed = pipeline.mark_external::<i32>(double, "value").unwrap();
//! let (send, recv) = channel();
//! pipeline
//!     .add_listener(double, "doubled", move |v: i32| {
//!         send.send(v).unwrap();
//!     })
//!     .unwrap();
//!
//! feed.push(21, true);
//! Scheduler::new(pipeline).unwrap().run().unwrap();
//! assert_eq!(recv.recv().unwrap(), 42);
//! ```

use smallvec::SmallVec;
use smol_str::SmolStr;
use std::fmt::{self, Debug, Display, Formatter};

pub mod builder;
pub mod configurator;
pub mod container;
pub mod external;
pub mod helper;
pub mod list;
pub mod options;
pub mod port;
pub mod queue;
pub mod scheduler;
pub mod task;

#[cfg(test)]
mod tests;

pub use builder::Pipeline;
pub use external::ExternalInput;
pub use options::{OptionStore, OptionsMap};
pub use port::{Port, PortId, port_id};
pub use scheduler::Scheduler;
pub use task::Task;

/// A unique identifier for tasks within a [`Pipeline`].
///
/// TaskId is a transparent wrapper around a `usize` that serves as an index
/// into the pipeline's task storage, with a special `TaskId::PLACEHOLDER`
/// value to indicate an unassigned task.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    pub raw: usize,
}

impl TaskId {
    /// A placeholder task, with a value equal to `usize::MAX`.
    pub const PLACEHOLDER: Self = Self { raw: usize::MAX };
    /// Create a new `TaskId` from an index.
    #[inline(always)]
    pub const fn new(index: usize) -> Self {
        Self { raw: index }
    }
    /// Check if `self == Self::PLACEHOLDER`
    #[inline(always)]
    pub const fn is_placeholder(&self) -> bool {
        self.raw == usize::MAX
    }
    /// Opposite of [`is_placeholder`](Self::is_placeholder)
    #[inline(always)]
    pub const fn is_valid(&self) -> bool {
        self.raw != usize::MAX
    }
    /// Get the index of this task in its pipeline.
    #[inline(always)]
    pub const fn index(&self) -> usize {
        self.raw
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            f.write_str("PLACEHOLDER")
        } else {
            write!(f, "#{}", self.index())
        }
    }
}

impl Debug for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        #[derive(Debug)]
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        struct PLACEHOLDER;
        let mut f = f.debug_struct("TaskId");
        if self.is_placeholder() {
            f.field("index", &PLACEHOLDER);
        } else {
            f.field("index", &self.index());
        }
        f.finish()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::PLACEHOLDER
    }
}

/// A set of thread-group names constraining where a task may run.
///
/// Pool workers each belong to exactly one group. A task only fires on
/// workers whose group is in its constraint set; an empty set means any
/// worker may take it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ThreadGroup {
    groups: SmallVec<[SmolStr; 2]>,
}

impl ThreadGroup {
    /// The empty set: any worker may run the task.
    #[inline(always)]
    pub const fn unconstrained() -> Self {
        Self {
            groups: SmallVec::new_const(),
        }
    }
    /// Create a constraint set from group names.
    pub fn of<S: Into<SmolStr>, I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut this = Self::unconstrained();
        for group in iter {
            this.insert(group);
        }
        this
    }
    /// Add a group to the set.
    pub fn insert(&mut self, group: impl Into<SmolStr>) {
        let group = group.into();
        if let Err(idx) = self.groups.binary_search(&group) {
            self.groups.insert(idx, group);
        }
    }
    /// Union another set into this one.
    pub fn union(&mut self, other: &ThreadGroup) {
        for group in &other.groups {
            self.insert(group.clone());
        }
    }
    #[inline(always)]
    pub fn contains(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
    #[inline(always)]
    pub fn is_unconstrained(&self) -> bool {
        self.groups.is_empty()
    }
    /// Check whether a worker in `group` may run a task constrained by this set.
    #[inline(always)]
    pub fn allows(&self, group: &str) -> bool {
        self.is_unconstrained() || self.contains(group)
    }
    pub fn iter(&self) -> impl Iterator<Item = &SmolStr> {
        self.groups.iter()
    }
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.groups.len()
    }
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl std::ops::BitOrAssign<&ThreadGroup> for ThreadGroup {
    fn bitor_assign(&mut self, rhs: &ThreadGroup) {
        self.union(rhs);
    }
}

impl<S: Into<SmolStr>> FromIterator<S> for ThreadGroup {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::of(iter)
    }
}

impl Display for ThreadGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_unconstrained() {
            return f.write_str("any");
        }
        f.write_str("{")?;
        for (n, group) in self.groups.iter().enumerate() {
            if n > 0 {
                f.write_str(", ")?;
            }
            f.write_str(group)?;
        }
        f.write_str("}")
    }
}

impl Debug for ThreadGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadGroup({self})")
    }
}

pub mod prelude {
    pub use super::builder::Pipeline;
    pub use super::external::ExternalInput;
    pub use super::list::{InputList, OutputList, PortList, Values};
    pub use super::options::{OptionStore, OptionsMap};
    pub use super::port::{Port, PortId, port_id};
    pub use super::scheduler::Scheduler;
    pub use super::task::Task;
    pub use super::{TaskId, ThreadGroup};
    pub use crate::utils::LogErr;
}
