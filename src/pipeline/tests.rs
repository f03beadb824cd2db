use crate::pipeline::builder::{AddTaskError, BindError, BuildError, ExternalError};
use crate::pipeline::helper::PortKind;
use crate::pipeline::options::OptionError;
use crate::pipeline::prelude::*;

struct Forward;
impl Task for Forward {
    type Input = (Port<i32, { port_id("in") }>,);
    type Output = (Port<i32, { port_id("out") }>,);
    fn run(&mut self, (value,): (i32,), _options: &OptionStore) -> (i32,) {
        (value,)
    }
}

struct TakesString;
impl Task for TakesString {
    type Input = (Port<String, { port_id("in") }>,);
    type Output = ();
    fn run(&mut self, _input: (String,), _options: &OptionStore) {}
}

struct DupInputs;
impl Task for DupInputs {
    type Input = (Port<i32, { port_id("same") }>, Port<i32, { port_id("same") }>);
    type Output = ();
    fn run(&mut self, _input: (i32, i32), _options: &OptionStore) {}
}

#[test]
fn port_ids_are_stable() {
    assert_eq!(port_id("foo"), port_id("foo"));
    assert_ne!(port_id("foo"), port_id("bar"));
    assert_eq!(PortId::of("foo"), PortId::from("foo"));
    assert_eq!(PortId::of("foo").0, port_id("foo"));
}

#[test]
fn duplicate_port_ids_are_rejected() {
    let mut pipeline = Pipeline::new();
    let err = pipeline.add(DupInputs).unwrap_err();
    assert!(matches!(
        err,
        AddTaskError::DuplicatePortId {
            kind: PortKind::Input,
            port,
            ..
        } if port == PortId::of("same")
    ));
}

#[test]
fn duplicate_names_are_rejected() {
    let mut pipeline = Pipeline::new();
    let first = pipeline.add_named(Forward, "fwd").unwrap();
    let err = pipeline.add_named(Forward, "fwd").unwrap_err();
    assert!(matches!(err, AddTaskError::DuplicateName { old, .. } if old == first));
}

#[test]
fn auto_names_disambiguate() {
    let mut pipeline = Pipeline::new();
    let a = pipeline.add(Forward).unwrap();
    let b = pipeline.add(Forward).unwrap();
    assert_ne!(pipeline.task_name(a), pipeline.task_name(b));
}

#[test]
fn bind_validates_ports() {
    let mut pipeline = Pipeline::new();
    let a = pipeline.add(Forward).unwrap();
    let b = pipeline.add(Forward).unwrap();
    assert!(matches!(
        pipeline.bind(a, "nope", b, "in"),
        Err(BindError::UnknownOutput { port, .. }) if port == PortId::of("nope")
    ));
    assert!(matches!(
        pipeline.bind(a, "out", b, "nope"),
        Err(BindError::UnknownInput { port, .. }) if port == PortId::of("nope")
    ));
    assert!(matches!(
        pipeline.bind(TaskId::new(17), "out", b, "in"),
        Err(BindError::UnknownTask(_))
    ));
}

#[test]
fn bind_checks_element_types() {
    let mut pipeline = Pipeline::new();
    let ints = pipeline.add(Forward).unwrap();
    let strings = pipeline.add(TakesString).unwrap();
    assert!(matches!(
        pipeline.bind(ints, "out", strings, "in"),
        Err(BindError::TypeMismatch { .. })
    ));
}

#[test]
fn inputs_accept_one_producer() {
    let mut pipeline = Pipeline::new();
    let a = pipeline.add(Forward).unwrap();
    let b = pipeline.add(Forward).unwrap();
    let c = pipeline.add(Forward).unwrap();
    pipeline.bind(a, "out", c, "in").unwrap();
    assert!(matches!(
        pipeline.bind(b, "out", c, "in"),
        Err(BindError::AlreadyBound { .. })
    ));
    // Marking a bound input as external is just as invalid.
    assert!(matches!(
        pipeline.mark_external::<i32>(c, "in"),
        Err(ExternalError::AlreadyBound { .. })
    ));
}

#[test]
fn external_inputs_cant_be_bound() {
    let mut pipeline = Pipeline::new();
    let a = pipeline.add(Forward).unwrap();
    let b = pipeline.add(Forward).unwrap();
    pipeline.mark_external::<i32>(b, "in").unwrap();
    assert!(matches!(
        pipeline.bind(a, "out", b, "in"),
        Err(BindError::InputIsExternal { .. })
    ));
}

#[test]
fn external_type_is_checked() {
    let mut pipeline = Pipeline::new();
    let a = pipeline.add(Forward).unwrap();
    assert!(matches!(
        pipeline.mark_external::<String>(a, "in"),
        Err(ExternalError::TypeMismatch { .. })
    ));
}

#[test]
fn mark_external_is_idempotent() {
    let mut pipeline = Pipeline::new();
    let a = pipeline.add(Forward).unwrap();
    pipeline.mark_external::<i32>(a, "in").unwrap();
    pipeline.mark_external::<i32>(a, "in").unwrap();
}

#[test]
fn unbound_input_fails_build() {
    let mut pipeline = Pipeline::new();
    pipeline.add_named(Forward, "lonely").unwrap();
    let err = Scheduler::new(pipeline).unwrap_err();
    assert!(matches!(
        err,
        BuildError::UnboundInput { ref task, port, .. }
            if task == "lonely" && port == PortId::of("in")
    ));
}

#[test]
fn options_are_typed() {
    let store = OptionStore::from_map(OptionsMap::new().with("factor", 2i32));
    assert_eq!(store.get::<i32>("factor").unwrap(), 2);
    store.set("factor", 5i32).unwrap();
    assert_eq!(store.get::<i32>("factor").unwrap(), 5);
    assert!(matches!(
        store.set("factor", "five"),
        Err(OptionError::TypeMismatch { .. })
    ));
    assert!(matches!(
        store.get::<i32>("missing"),
        Err(OptionError::UnknownOption(_))
    ));
}

#[test]
fn thread_groups_are_sets() {
    let mut group = ThreadGroup::of(["b", "a", "a"]);
    assert_eq!(group.len(), 2);
    assert!(group.allows("a"));
    assert!(!group.allows("c"));
    group |= &ThreadGroup::of(["c"]);
    assert!(group.allows("c"));
    assert_eq!(group.to_string(), "{a, b, c}");
    assert_eq!(ThreadGroup::unconstrained().to_string(), "any");
    assert!(ThreadGroup::unconstrained().allows("anything"));
}
