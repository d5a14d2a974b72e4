//! Pipeline throughput benchmarks.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use muletrace::{FraudRingAnalyzer, Transaction, TransactionGraph};

/// Mixed batch: background traffic plus embedded cycles, a smurf hub, and
/// shell chains.
fn build_batch(size: usize) -> Vec<Transaction> {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
    let mut transactions = Vec::with_capacity(size);

    for i in 0..size {
        let (from, to) = match i % 7 {
            // Short cycle segment.
            0 => (format!("CYC-{:03}-A", i % 40), format!("CYC-{:03}-B", i % 40)),
            1 => (format!("CYC-{:03}-B", i % 40), format!("CYC-{:03}-C", i % 40)),
            2 => (format!("CYC-{:03}-C", i % 40), format!("CYC-{:03}-A", i % 40)),
            // Fan-in toward a shared hub.
            3 | 4 => (format!("SRC-{:04}", i), "HUB-CENTRAL".to_string()),
            // Background pair traffic.
            _ => (format!("ACC-{:04}", i % 211), format!("ACC-{:04}", (i * 13 + 1) % 211)),
        };
        if from == to {
            continue;
        }
        transactions.push(Transaction {
            transaction_id: format!("TXN-{:06}", i),
            sender_id: from,
            receiver_id: to,
            amount: 50.0 + (i as f64 * 17.3) % 9_400.0,
            timestamp: base + Duration::minutes((i % 10_080) as i64),
        });
    }
    transactions
}

fn bench_graph_build(c: &mut Criterion) {
    let batch = build_batch(5_000);
    c.bench_function("graph_build_5k", |b| {
        b.iter(|| TransactionGraph::build(black_box(&batch)))
    });
}

fn bench_full_pipeline(c: &mut Criterion) {
    let analyzer = FraudRingAnalyzer::new();
    let small = build_batch(1_000);
    let large = build_batch(10_000);

    c.bench_function("analyze_1k", |b| {
        b.iter(|| analyzer.analyze(black_box(&small)).unwrap())
    });
    c.bench_function("analyze_10k", |b| {
        b.iter(|| analyzer.analyze(black_box(&large)).unwrap())
    });
}

criterion_group!(benches, bench_graph_build, bench_full_pipeline);
criterion_main!(benches);
