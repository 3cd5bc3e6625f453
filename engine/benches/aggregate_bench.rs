// Aggregation benchmarks for the holdscan engine.
//
// Covers merging pages with overlapping accounts, materializing the sorted
// holder list, and computing the distribution summary over it.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use holdscan_engine::{summarize, Aggregator, HolderRecord};

/// Deterministic records: `n` accounts spread over `n / 4` owners, with
/// roughly one in eight repeated from an earlier position.
fn records(n: usize) -> Vec<HolderRecord> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..n)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let account = if i > 0 && state % 8 == 0 { (state as usize) % i } else { i };
            let amount = (state % 10_000_000) as f64 / 100.0 + 0.01;
            HolderRecord::new(
                format!("owner-{}", account / 4),
                format!("acct-{}", account),
                amount,
            )
        })
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate/merge");

    for size in [1_000, 10_000, 100_000] {
        let input = records(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                let mut agg = Aggregator::new();
                agg.extend(input.iter().cloned());
                agg.len()
            });
        });
    }

    group.finish();
}

fn bench_materialize(c: &mut Criterion) {
    let mut agg = Aggregator::new();
    agg.extend(records(100_000));

    c.bench_function("aggregate/materialize_100k", |b| {
        b.iter_batched(|| agg.clone(), Aggregator::materialize, BatchSize::LargeInput);
    });
}

fn bench_summarize(c: &mut Criterion) {
    let mut agg = Aggregator::new();
    agg.extend(records(100_000));
    let holders = agg.materialize();

    c.bench_function("stats/summarize_100k", |b| {
        b.iter(|| summarize(&holders));
    });
}

criterion_group!(benches, bench_merge, bench_materialize, bench_summarize);
criterion_main!(benches);
