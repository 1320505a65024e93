//! Benchmarks for the streaming writer.
//!
//! Run with: cargo bench -p cellar-xlsx

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cellar_core::CellAddress;
use cellar_xlsx::{Package, RowOptions, StreamCell};

const COLS: usize = 20;

fn row(n: u32) -> Vec<StreamCell> {
    (0..COLS)
        .map(|c| match c % 3 {
            0 => StreamCell::from(n as f64 * c as f64),
            1 => StreamCell::from(format!("r{}c{}", n, c)),
            _ => StreamCell::from(c % 2 == 0),
        })
        .collect()
}

/// Stream rows into a fresh package and serialize it
fn write_rows(rows: u32) -> Vec<u8> {
    let mut package = Package::new();
    let mut writer = package.stream_writer(0, None).expect("stream writer");
    let options = RowOptions::default();
    for n in 0..rows {
        writer
            .write_row(CellAddress::new(n, 0), row(n), &options)
            .expect("write row");
    }
    package.flush_stream(writer).expect("flush");
    package.to_bytes(None).expect("save")
}

fn bench_stream_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_write");
    for rows in [1_000u32, 10_000] {
        group.throughput(Throughput::Elements(rows as u64 * COLS as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            b.iter(|| write_rows(black_box(rows)))
        });
    }
    group.finish();
}

fn bench_stream_read(c: &mut Criterion) {
    let bytes = write_rows(10_000);
    c.bench_function("stream_read_10000", |b| {
        b.iter(|| {
            let package =
                Package::from_bytes(black_box(bytes.clone()), Default::default()).expect("open");
            package
                .stream_rows(0, None)
                .expect("stream")
                .map(|r| r.expect("row").cells.len())
                .sum::<usize>()
        })
    });
}

criterion_group!(benches, bench_stream_write, bench_stream_read);
criterion_main!(benches);
