/// Fragment grouping and planning benchmarks
///
/// Measures grouping throughput on listings with a varying share of
/// multi-part titles.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mdc_core::{plan, FragmentDetector, IdentifierParser};
use std::path::PathBuf;

// Every `stride`th title is split into three parts
fn listing(titles: usize, stride: usize) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for i in 0..titles {
        if stride > 0 && i % stride == 0 {
            for part in 1..=3 {
                paths.push(PathBuf::from(format!("/library/SSIS-{i:04}-cd{part}.mp4")));
            }
        } else {
            paths.push(PathBuf::from(format!("/library/ABP-{i:04}.mp4")));
        }
    }
    paths
}

fn bench_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("group");
    let detector = FragmentDetector::new();

    for (name, stride) in [("no_parts", 0), ("one_in_ten", 10), ("all_parts", 1)] {
        let paths = listing(1000, stride);
        group.throughput(Throughput::Elements(paths.len() as u64));
        group.bench_with_input(BenchmarkId::new("titles_1000", name), &paths, |b, paths| {
            b.iter(|| detector.group(black_box(paths.as_slice())));
        });
    }

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let detector = FragmentDetector::new();
    let path = PathBuf::from("/library/MIDE-500_part_2.mp4");
    c.bench_function("parse_fragment", |b| {
        b.iter(|| detector.parse(black_box(&path)));
    });
}

fn bench_plan(c: &mut Criterion) {
    let parser = IdentifierParser::default();
    let detector = FragmentDetector::new();
    let paths = listing(1000, 10);

    c.bench_function("plan_1000", |b| {
        b.iter(|| plan(black_box(paths.as_slice()), &parser, &detector));
    });
}

criterion_group!(benches, bench_group, bench_parse, bench_plan);
criterion_main!(benches);
