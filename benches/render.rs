#[macro_use]
extern crate criterion;
extern crate mandel;

use criterion::Criterion;
use mandel::{render, Backend, HostDispatcher, RenderConfig, Strategy};

fn host_config(strategy: Strategy) -> RenderConfig {
    RenderConfig {
        width: 200,
        height: 150,
        strategy,
        backend: Backend::Host { threads: 4 },
        ..RenderConfig::default()
    }
}

fn single_shot(c: &mut Criterion) {
    let config = host_config(Strategy::SingleShot);
    let mut host = HostDispatcher::with_all_cpus();
    c.bench_function("host single-shot 200x150", move |b| {
        b.iter(|| render(&config, &mut host).unwrap())
    });
}

fn resumable(c: &mut Criterion) {
    for &max_loop in [16u32, 64, 256].iter() {
        let config = host_config(Strategy::Resumable { max_loop });
        let mut host = HostDispatcher::with_all_cpus();
        c.bench_function(
            &format!("host resumable 200x150 max_loop={}", max_loop),
            move |b| b.iter(|| render(&config, &mut host).unwrap()),
        );
    }
}

criterion_group!(benches, single_shot, resumable);
criterion_main!(benches);
