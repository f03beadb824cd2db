//! Definition of the [`Task`] trait
//!
//! See the documentation for [`Task`] for more information on implementation.

use super::ThreadGroup;
use super::list::{InputList, OutputList, Values};
use super::options::{OptionStore, OptionsMap};

/// A unit of computation in a pipeline.
///
/// A task's ports are declared through its associated types: each element of
/// [`Input`](Self::Input) is one input port, and [`Output`](Self::Output) is
/// a tuple of output ports, a single bare [`Port`](super::port::Port) (one
/// port), or `()` (no ports). The value tuples the `run` step consumes and
/// produces are derived from the declarations, so the element types line up
/// with the queues and callbacks behind the ports by construction.
///
/// One call to [`run`](Self::run) is a *firing*: the scheduler dequeues one
/// element per input port and fans the returned values out to every bound
/// input and listener. A task never fires with a partial input set.
///
/// # Example
///
/// ```rust
/// use weft::pipeline::prelude::*;
///
/// struct Scale;
/// impl Task for Scale {
///     type Input = (Port<f64, { port_id("value") }>,);
///     type Output = (Port<f64, { port_id("scaled") }>,);
///
///     fn run(&mut self, (value,): (f64,), options: &OptionStore) -> (f64,) {
///         let factor = options.get("factor").unwrap_or(1.0);
///         (value * factor,)
///     }
///
///     fn options() -> OptionsMap {
///         OptionsMap::new().with("factor", 2.0)
///     }
/// }
/// ```
#[allow(unused_variables)]
pub trait Task: Send + 'static {
    /// The input ports, as a tuple of [`Port`](super::port::Port) markers.
    type Input: InputList;
    /// The output ports: a tuple of markers, a single bare marker, or `()`.
    type Output: OutputList;

    /// Perform one firing on one element from each input port.
    fn run(&mut self, input: Values<Self::Input>, options: &OptionStore) -> Values<Self::Output>;

    /// The default thread-group constraints for this task.
    ///
    /// Further groups can be added per instance with
    /// [`Pipeline::add_thread_constraint`](super::builder::Pipeline::add_thread_constraint).
    fn thread_constraints() -> ThreadGroup
    where
        Self: Sized,
    {
        ThreadGroup::unconstrained()
    }

    /// The options this task exposes, with their defaults.
    fn options() -> OptionsMap
    where
        Self: Sized,
    {
        OptionsMap::new()
    }
}
