use tracing::info;
use weft::pipeline::prelude::*;

struct Sum;
impl Task for Sum {
    type Input = (Port<i64, { port_id("a") }>, Port<i64, { port_id("b") }>);
    type Output = (Port<i64, { port_id("sum") }>,);
    fn run(&mut self, (a, b): (i64, i64), _options: &OptionStore) -> (i64,) {
        (a + b,)
    }
}

struct Scale;
impl Task for Scale {
    type Input = (Port<i64, { port_id("value") }>,);
    type Output = (Port<i64, { port_id("scaled") }>,);
    fn run(&mut self, (value,): (i64,), options: &OptionStore) -> (i64,) {
        (value * options.get("factor").unwrap_or(1),)
    }
    fn options() -> OptionsMap {
        OptionsMap::new().with("factor", 1i64)
    }
}

fn main() {
    tracing_subscriber::fmt().init();
    let mut pipeline = Pipeline::new();
    let sum = pipeline.add_named(Sum, "sum").unwrap();
    let scale = pipeline.add_named(Scale, "scale").unwrap();
    pipeline.bind(sum, "sum", scale, "value").unwrap();
    pipeline.options(scale).unwrap().set("factor", 10i64).unwrap();
    let feed_a = pipeline.mark_external::<i64>(sum, "a").unwrap();
    let feed_b = pipeline.mark_external::<i64>(sum, "b").unwrap();
    pipeline
        .add_listener(scale, "scaled", |value: i64| info!("scaled sum: {value}"))
        .unwrap();

    for n in 0..5i64 {
        feed_a.push(n, n == 4);
        feed_b.push(n * 100, n == 4);
    }
    Scheduler::new(pipeline).unwrap().run().unwrap();
}
