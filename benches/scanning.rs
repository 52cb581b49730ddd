use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[path = "../tests/common/mod.rs"]
mod common;

use common::{DbxBuilder, TestMessage};
use dbxtract::container::DbxFile;
use dbxtract::recovery::RecoveredFile;

fn sample_container() -> Vec<u8> {
    let body: Vec<u8> = (0..3000u32).map(|i| b' ' + (i % 90) as u8).collect();
    let mut builder = DbxBuilder::new();
    for i in 0..100 {
        builder = builder.message(
            TestMessage::new(&format!("Message {i}"), &body)
                .from("sender@example.com")
                .to("receiver@example.com"),
        );
    }
    for _ in 0..20 {
        builder = builder.deleted(&body);
    }
    builder.build()
}

fn bench_open(c: &mut Criterion) {
    let bytes = sample_container();
    c.bench_function("open_and_index", |b| {
        b.iter(|| DbxFile::from_bytes(black_box(bytes.clone())).message_count())
    });
}

fn bench_scan(c: &mut Criterion) {
    let bytes = sample_container();
    c.bench_function("recovery_scan", |b| {
        b.iter(|| RecoveredFile::scan_bytes(black_box(bytes.clone())).message_count())
    });
}

criterion_group!(benches, bench_open, bench_scan);
criterion_main!(benches);
