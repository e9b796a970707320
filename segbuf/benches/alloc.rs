use segbuf::SegBuf;
use std::hint::black_box;

#[global_allocator]
static ALLOC: divan::AllocProfiler = divan::AllocProfiler::system();

fn main() {
    divan::main();
}

#[divan::bench(args = [256, 4096, 65536])]
fn alloc_sequential(bencher: divan::Bencher, count: usize) {
    bencher
        .with_inputs(|| SegBuf::<u64>::with_segment_capacity(4096))
        .bench_local_values(|mut buf| {
            for n in 0..count as u64 {
                black_box(buf.alloc(n));
            }
            buf
        });
}

#[divan::bench(args = [4096, 65536])]
fn alloc_into_retained_segments(bencher: divan::Bencher, count: usize) {
    bencher
        .with_inputs(|| {
            let mut buf = SegBuf::<u64>::with_segment_capacity(4096);
            for n in 0..count as u64 {
                buf.alloc(n);
            }
            buf.reset();
            buf
        })
        .bench_local_values(|mut buf| {
            for n in 0..count as u64 {
                black_box(buf.alloc(n));
            }
            buf
        });
}
