use crate::pipeline::prelude::*;
use crate::pipeline::scheduler::SchedulerError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Run the scheduler on another thread and panic if it doesn't terminate.
fn run_within(scheduler: Scheduler, secs: u64) -> Result<(), SchedulerError> {
    let (done_send, done_recv) = channel();
    let handle = std::thread::spawn(move || {
        let result = scheduler.run();
        let _ = done_send.send(());
        result
    });
    match done_recv.recv_timeout(Duration::from_secs(secs)) {
        Ok(()) => handle.join().unwrap(),
        Err(_) => panic!("pipeline didn't terminate within {secs}s"),
    }
}

fn collector(
    pipeline: &mut Pipeline,
    task: TaskId,
    output: &str,
) -> Arc<Mutex<Vec<i32>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    pipeline
        .add_listener(task, output, move |value: i32| {
            sink.lock().unwrap().push(value);
        })
        .unwrap();
    seen
}

struct Forward;
impl Task for Forward {
    type Input = (Port<i32, { port_id("in") }>,);
    type Output = (Port<i32, { port_id("out") }>,);
    fn run(&mut self, (value,): (i32,), _options: &OptionStore) -> (i32,) {
        (value,)
    }
}

struct Sum;
impl Task for Sum {
    type Input = (Port<i32, { port_id("a") }>, Port<i32, { port_id("b") }>);
    type Output = (Port<i32, { port_id("sum") }>,);
    fn run(&mut self, (a, b): (i32, i32), _options: &OptionStore) -> (i32,) {
        (a + b,)
    }
}

/// Forwards its input, counting firings and recording the worker it ran on.
struct Recorder {
    firings: Arc<AtomicUsize>,
    threads: Arc<Mutex<Vec<String>>>,
}
impl Recorder {
    fn new() -> (Self, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let firings = Arc::new(AtomicUsize::new(0));
        let threads = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                firings: firings.clone(),
                threads: threads.clone(),
            },
            firings,
            threads,
        )
    }
}
impl Task for Recorder {
    type Input = (Port<i32, { port_id("in") }>,);
    type Output = (Port<i32, { port_id("out") }>,);
    fn run(&mut self, (value,): (i32,), _options: &OptionStore) -> (i32,) {
        self.firings.fetch_add(1, Ordering::Relaxed);
        let name = std::thread::current().name().unwrap_or("?").to_string();
        self.threads.lock().unwrap().push(name);
        (value,)
    }
}

#[test]
fn identity_chain_preserves_order() {
    init_logging();
    let mut pipeline = Pipeline::new();
    let a = pipeline.add_named(Forward, "a").unwrap();
    let b = pipeline.add_named(Forward, "b").unwrap();
    let c = pipeline.add_named(Forward, "c").unwrap();
    pipeline.bind(a, "out", b, "in").unwrap();
    pipeline.bind(b, "out", c, "in").unwrap();
    let feed = pipeline.mark_external::<i32>(a, "in").unwrap();
    let seen = collector(&mut pipeline, c, "out");

    feed.push(1, false);
    feed.push(2, false);
    feed.push(3, true);
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    assert_eq!(*seen.lock().unwrap(), [1, 2, 3]);
}

#[test]
fn fan_out_replicates_values() {
    init_logging();
    let mut pipeline = Pipeline::new();
    let a = pipeline.add_named(Forward, "a").unwrap();
    let b = pipeline.add_named(Forward, "b").unwrap();
    let c = pipeline.add_named(Forward, "c").unwrap();
    pipeline.bind(a, "out", b, "in").unwrap();
    pipeline.bind(a, "out", c, "in").unwrap();
    let feed = pipeline.mark_external::<i32>(a, "in").unwrap();
    // A listener on the fanned-out port sees every value too.
    let direct = collector(&mut pipeline, a, "out");
    let via_b = collector(&mut pipeline, b, "out");
    let via_c = collector(&mut pipeline, c, "out");

    feed.push(10, false);
    feed.push(20, true);
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    assert_eq!(*direct.lock().unwrap(), [10, 20]);
    assert_eq!(*via_b.lock().unwrap(), [10, 20]);
    assert_eq!(*via_c.lock().unwrap(), [10, 20]);
}

#[test]
fn join_consumes_one_element_per_input() {
    init_logging();
    let mut pipeline = Pipeline::new();
    let join = pipeline.add_named(Sum, "join").unwrap();
    let feed_a = pipeline.mark_external::<i32>(join, "a").unwrap();
    let feed_b = pipeline.mark_external::<i32>(join, "b").unwrap();
    let seen = collector(&mut pipeline, join, "sum");

    // Two feeders race; per-queue order is all that matters.
    let feeders = [
        std::thread::spawn(move || {
            for (n, value) in [1, 2, 3].into_iter().enumerate() {
                std::thread::sleep(Duration::from_millis(3));
                feed_a.push(value, n == 2);
            }
        }),
        std::thread::spawn(move || {
            for (n, value) in [10, 20, 30].into_iter().enumerate() {
                std::thread::sleep(Duration::from_millis(5));
                feed_b.push(value, n == 2);
            }
        }),
    ];
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    for feeder in feeders {
        feeder.join().unwrap();
    }
    assert_eq!(*seen.lock().unwrap(), [11, 22, 33]);
}

#[test]
fn values_are_consumed_exactly_once() {
    init_logging();
    let mut pipeline = Pipeline::new();
    let (recorder, firings, _) = Recorder::new();
    let a = pipeline.add_named(Forward, "a").unwrap();
    let b = pipeline.add_named(recorder, "b").unwrap();
    pipeline.bind(a, "out", b, "in").unwrap();
    let feed = pipeline.mark_external::<i32>(a, "in").unwrap();
    let seen = collector(&mut pipeline, b, "out");

    for n in 0..100 {
        feed.push(n, n == 99);
    }
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    assert_eq!(firings.load(Ordering::Relaxed), 100);
}

#[test]
fn constraints_pick_the_right_workers() {
    init_logging();
    let mut pipeline = Pipeline::new();
    let (first, first_count, first_threads) = Recorder::new();
    let (second, second_count, second_threads) = Recorder::new();
    let one = pipeline.add_named(first, "one").unwrap();
    let two = pipeline.add_named(second, "two").unwrap();
    pipeline
        .add_thread_constraint(one, &ThreadGroup::of(["g1"]))
        .unwrap();
    pipeline
        .add_thread_constraint(two, &ThreadGroup::of(["g2"]))
        .unwrap();
    let feed_one = pipeline.mark_external::<i32>(one, "in").unwrap();
    let feed_two = pipeline.mark_external::<i32>(two, "in").unwrap();
    for n in 0..10 {
        feed_one.push(n, n == 9);
        feed_two.push(n, n == 9);
    }
    let scheduler = Scheduler::with_workers(pipeline, [("g1", 1), ("g2", 1)]).unwrap();
    run_within(scheduler, 5).unwrap();

    assert_eq!(first_count.load(Ordering::Relaxed), 10);
    assert_eq!(second_count.load(Ordering::Relaxed), 10);
    for thread in &*first_threads.lock().unwrap() {
        assert!(thread.starts_with("weft-g1-"), "task one fired on {thread}");
    }
    for thread in &*second_threads.lock().unwrap() {
        assert!(thread.starts_with("weft-g2-"), "task two fired on {thread}");
    }
}

#[test]
fn static_constraints_are_picked_up() {
    struct Pinned;
    impl Task for Pinned {
        type Input = (Port<i32, { port_id("in") }>,);
        type Output = ();
        fn run(&mut self, _input: (i32,), _options: &OptionStore) {}
        fn thread_constraints() -> ThreadGroup {
            ThreadGroup::of(["g1"])
        }
    }
    let mut pipeline = Pipeline::new();
    let pinned = pipeline.add(Pinned).unwrap();
    assert!(pipeline.thread_constraints(pinned).unwrap().contains("g1"));
}

#[test]
fn disjoint_constraints_fail_before_any_firing() {
    init_logging();
    let mut pipeline = Pipeline::new();
    let (recorder, firings, _) = Recorder::new();
    let task = pipeline.add_named(recorder, "pinned").unwrap();
    pipeline
        .add_thread_constraint(task, &ThreadGroup::of(["g1"]))
        .unwrap();
    let feed = pipeline.mark_external::<i32>(task, "in").unwrap();
    feed.push(1, true);
    let scheduler = Scheduler::with_workers(pipeline, [("g2", 1)]).unwrap();
    let err = run_within(scheduler, 5).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::ThreadConstraintUnsatisfiable { ref task, .. } if task == "pinned"
    ));
    assert_eq!(firings.load(Ordering::Relaxed), 0);
}

#[test]
fn feeding_while_running_terminates() {
    init_logging();
    let mut pipeline = Pipeline::new();
    let a = pipeline.add_named(Forward, "a").unwrap();
    let b = pipeline.add_named(Forward, "b").unwrap();
    pipeline.bind(a, "out", b, "in").unwrap();
    let feed = pipeline.mark_external::<i32>(a, "in").unwrap();
    let seen = collector(&mut pipeline, b, "out");

    let feeder = std::thread::spawn(move || {
        for n in 0..20 {
            std::thread::sleep(Duration::from_millis(2));
            feed.push(n, n == 19);
        }
    });
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    feeder.join().unwrap();
    assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
}

#[test]
fn options_reach_the_running_task() {
    struct Scale;
    impl Task for Scale {
        type Input = (Port<i32, { port_id("value") }>,);
        type Output = (Port<i32, { port_id("scaled") }>,);
        fn run(&mut self, (value,): (i32,), options: &OptionStore) -> (i32,) {
            (value * options.get("factor").unwrap_or(1),)
        }
        fn options() -> OptionsMap {
            OptionsMap::new().with("factor", 1i32)
        }
    }
    init_logging();
    let mut pipeline = Pipeline::new();
    let scale = pipeline.add(Scale).unwrap();
    let feed = pipeline.mark_external::<i32>(scale, "value").unwrap();
    let seen = collector(&mut pipeline, scale, "scaled");
    pipeline.options(scale).unwrap().set("factor", 3i32).unwrap();

    feed.push(1, false);
    feed.push(2, true);
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    assert_eq!(*seen.lock().unwrap(), [3, 6]);
}

#[test]
fn pushes_after_the_last_element_are_dropped() {
    init_logging();
    let mut pipeline = Pipeline::new();
    let a = pipeline.add_named(Forward, "a").unwrap();
    let feed = pipeline.mark_external::<i32>(a, "in").unwrap();
    let seen = collector(&mut pipeline, a, "out");

    feed.push(1, true);
    feed.push(2, false);
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    assert_eq!(*seen.lock().unwrap(), [1]);
}

#[test]
fn closing_without_a_value_terminates() {
    init_logging();
    let mut pipeline = Pipeline::new();
    let a = pipeline.add_named(Forward, "a").unwrap();
    let feed = pipeline.mark_external::<i32>(a, "in").unwrap();
    let seen = collector(&mut pipeline, a, "out");

    feed.close();
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn external_feeders_share_one_queue() {
    init_logging();
    let mut pipeline = Pipeline::new();
    let a = pipeline.add_named(Forward, "a").unwrap();
    let first = pipeline.mark_external::<i32>(a, "in").unwrap();
    let second = pipeline.mark_external::<i32>(a, "in").unwrap();
    let seen = collector(&mut pipeline, a, "out");

    first.push(1, false);
    second.push(2, true);
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    assert_eq!(*seen.lock().unwrap(), [1, 2]);
}

#[test]
fn tuple_outputs_fan_out_per_slot() {
    struct Split;
    impl Task for Split {
        type Input = (Port<i32, { port_id("n") }>,);
        type Output = (Port<i32, { port_id("half") }>, Port<i32, { port_id("double") }>);
        fn run(&mut self, (n,): (i32,), _options: &OptionStore) -> (i32, i32) {
            (n / 2, n * 2)
        }
    }
    init_logging();
    let mut pipeline = Pipeline::new();
    let split = pipeline.add(Split).unwrap();
    let feed = pipeline.mark_external::<i32>(split, "n").unwrap();
    let halves = collector(&mut pipeline, split, "half");
    let doubles = collector(&mut pipeline, split, "double");

    feed.push(8, false);
    feed.push(10, true);
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    assert_eq!(*halves.lock().unwrap(), [4, 5]);
    assert_eq!(*doubles.lock().unwrap(), [16, 20]);
}

#[test]
fn bare_port_output_is_one_port() {
    struct Negate;
    impl Task for Negate {
        type Input = (Port<i32, { port_id("in") }>,);
        type Output = Port<i32, { port_id("out") }>;
        fn run(&mut self, (value,): (i32,), _options: &OptionStore) -> i32 {
            -value
        }
    }
    init_logging();
    let mut pipeline = Pipeline::new();
    let negate = pipeline.add(Negate).unwrap();
    let feed = pipeline.mark_external::<i32>(negate, "in").unwrap();
    let seen = collector(&mut pipeline, negate, "out");

    feed.push(7, true);
    run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap();
    assert_eq!(*seen.lock().unwrap(), [-7]);
}

#[test]
fn task_panics_terminate_the_pipeline() {
    struct Panicker;
    impl Task for Panicker {
        type Input = (Port<i32, { port_id("in") }>,);
        type Output = ();
        fn run(&mut self, _input: (i32,), _options: &OptionStore) {
            panic!("task failure");
        }
    }
    init_logging();
    let mut pipeline = Pipeline::new();
    let bad = pipeline.add_named(Panicker, "bad").unwrap();
    let feed = pipeline.mark_external::<i32>(bad, "in").unwrap();
    feed.push(1, true);
    let err = run_within(Scheduler::new(pipeline).unwrap(), 5).unwrap_err();
    assert!(matches!(err, SchedulerError::TaskPanicked { ref task } if task == "bad"));
}
