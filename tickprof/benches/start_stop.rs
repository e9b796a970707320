use std::hint::black_box;
use tickprof::{Config, Profiler};

#[global_allocator]
static ALLOC: divan::AllocProfiler = divan::AllocProfiler::system();

fn main() {
    divan::main();
}

#[divan::bench]
fn start_stop_pair(bencher: divan::Bencher) {
    let profiler = Profiler::new(Config::default());
    let group = profiler.group();
    group.start("bench");
    group.stop();

    bencher.bench_local(|| {
        black_box(group.start("bench"));
        group.stop();
    });
}

#[divan::bench]
fn start_stop_pair_cached_slot(bencher: divan::Bencher) {
    let profiler = Profiler::new(Config::default());
    let group = profiler.group();
    let slot = group.start("bench");
    group.stop();

    bencher.bench_local(|| {
        group.start_slot(slot);
        group.stop();
    });
}

#[divan::bench]
fn start_stop_pair_disabled(bencher: divan::Bencher) {
    let profiler = Profiler::new(Config::default());
    let group = profiler.group();
    group.start("bench");
    group.stop();
    profiler.set_enabled(false);

    bencher.bench_local(|| {
        black_box(group.start("bench"));
        group.stop();
    });
}

#[divan::bench(args = [4, 16])]
fn frame_with_nested_scopes(bencher: divan::Bencher, scopes: usize) {
    let profiler = Profiler::new(Config {
        realtime_events: true,
        ..Config::default()
    });
    let group = profiler.group();

    bencher.bench_local(|| {
        group.begin_frame();
        for _ in 0..scopes {
            group.start("scope");
        }
        for _ in 0..scopes {
            group.stop();
        }
        group.end_frame()
    });
}
