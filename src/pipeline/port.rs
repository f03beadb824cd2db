//! The port model: identifiers, typed port markers, and build-time connectors.

use super::TaskId;
use std::any::TypeId;
use std::fmt::{self, Debug, Display, Formatter};
use std::marker::PhantomData;

/// Hash a port name into its 64-bit identifier.
///
/// This is a FNV-1a hash over the bytes of the name, usable both at runtime
/// and in const-generic position:
///
/// ```rust
/// use weft::pipeline::port::{Port, port_id};
/// type Out = Port<i32, { port_id("out") }>;
/// assert_eq!(port_id("out"), port_id("out"));
/// assert_ne!(port_id("out"), port_id("in"));
/// ```
pub const fn port_id(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

/// The identifier of a port, stable across runs and call sites.
///
/// Identifiers are scoped to a single task's input set or output set; a task
/// must not declare two inputs (or two outputs) with the same identifier.
/// Collisions across tasks are harmless.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(pub u64);

impl PortId {
    /// The identifier for a declared port name.
    #[inline(always)]
    pub const fn of(name: &str) -> Self {
        Self(port_id(name))
    }
}

impl From<&str> for PortId {
    #[inline(always)]
    fn from(name: &str) -> Self {
        Self::of(name)
    }
}
impl From<u64> for PortId {
    #[inline(always)]
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl Display for PortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "${:016x}", self.0)
    }
}
impl Debug for PortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PortId({self})")
    }
}

/// A typed port marker tying an element type to an identifier.
///
/// Ports only exist at the type level; a task declares its inputs and outputs
/// as tuples of markers (see [`Task`](super::task::Task)) and the runtime
/// machinery is derived from them. The element type must be
/// `Clone + Send + 'static`.
pub struct Port<T, const ID: u64>(PhantomData<fn(T)>);

/// The address of an output port: the task that owns it plus its identifier.
///
/// Outputs are globally unique under this addressing since distinct ports of
/// one task have distinct identifiers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct OutputAddr {
    pub task: TaskId,
    pub port: PortId,
}

/// Build-time record of one input port of a task.
#[derive(Debug)]
pub(crate) struct InputSlot {
    pub id: PortId,
    pub ty: TypeId,
    pub ty_name: disqualified::ShortName<'static>,
    /// The bound upstream output, if any.
    pub source: Option<OutputAddr>,
    pub external: bool,
}

/// Build-time record of one output port of a task.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OutputSlot {
    pub id: PortId,
    pub ty: TypeId,
    pub ty_name: disqualified::ShortName<'static>,
}
