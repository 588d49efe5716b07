//! Benchmarks for pre-compress
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use filetime::FileTime;
use std::fs;

fn benchmark_queue_operations(c: &mut Criterion) {
    use pre_compress::walker::queue::{WorkItem, WorkQueue};

    c.bench_function("queue_send_recv", |b| {
        let (sender, receiver) = WorkQueue::new(10000).split();

        b.iter(|| {
            sender.send(WorkItem::new("static/js/app.js")).unwrap();
            let received = receiver.try_recv().unwrap();
            black_box(received);
        })
    });
}

fn benchmark_compress(c: &mut Criterion) {
    use pre_compress::compress::{try_compress, CompressBuffers};

    let dir = tempfile::tempdir().unwrap();
    let text = dir.path().join("page.html");
    let noise = dir.path().join("image.bin");
    fs::write(&text, "<li class=\"item\">entry</li>\n".repeat(4000)).unwrap();

    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let random: Vec<u8> = (0..100_000)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect();
    fs::write(&noise, random).unwrap();

    let mtime = FileTime::from_unix_time(0, 0);
    let mut bufs = CompressBuffers::new();

    c.bench_function("compress_text_112k", |b| {
        b.iter(|| black_box(try_compress(&text, mtime, &mut bufs).unwrap()))
    });

    // Aborts early once the budget is exhausted
    c.bench_function("reject_noise_100k", |b| {
        b.iter(|| black_box(try_compress(&noise, mtime, &mut bufs).unwrap()))
    });
}

criterion_group!(benches, benchmark_queue_operations, benchmark_compress);
criterion_main!(benches);
