//! Benchmarks for decoding and accumulating replay frames
//!
//! Run with: cargo bench --bench accumulator
//!
//! Frames are synthetic but shaped like a busy mid-game turn: many pods shuttling between a
//! few dozen buildings, a couple of arrivals and a grouped teleport.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use selenia_replay::__internal::{decode_base91, encode_base91, unpack_digit_pairs};
use selenia_replay::codec::payload::compress_payload;
use selenia_replay::{FrameInfo, ReplayBuilder, ReplayConfig};
use std::hint::black_box;

const BUILDINGS: i32 = 40;

fn global_record() -> String {
    let mut lines = vec![
        "0".to_string(),
        "0".to_string(),
        "160".to_string(),
        "90".to_string(),
        "0".to_string(),
        "-1".to_string(),
        BUILDINGS.to_string(),
    ];
    lines.extend((0..BUILDINGS).map(|id| {
        format!("{} {} {} {}", id, id % 8, (id * 37) % 160, (id * 53) % 90)
    }));
    lines.push("1000".to_string());
    lines.join("\n")
}

/// A frame with `pods` pod transports, two arrivals and one grouped teleport.
fn busy_frame(pods: usize, seed: usize) -> String {
    let mut events = Vec::with_capacity(pods + 3);
    for i in 0..pods {
        let from = ((i + seed) * 7) as i32 % BUILDINGS;
        let to = ((i + seed) * 11 + 3) as i32 % BUILDINGS;
        let workers: Vec<u8> = (0..(i % 5 + 1)).map(|k| ((i + k) % 7 + 1) as u8).collect();
        let start = (i * 13) % 800;
        events.push(format!(
            "2 {} {} {} {} {} {}",
            start,
            start + 150,
            from,
            to,
            i,
            encode_base91(&workers).unwrap_or_default()
        ));
    }
    events.push("5 0 600 0 3 2 1".to_string());
    events.push("5 200 800 8 0 4 0 1".to_string());
    events.push("3 100 0 1 2 20 100 3 4 5 2".to_string());

    let mut lines = vec!["0".to_string(), "0".to_string(), events.len().to_string()];
    lines.extend(events);
    lines.join("\n")
}

fn bench_base91(c: &mut Criterion) {
    let mut group = c.benchmark_group("base91");
    for len in [2usize, 10, 40] {
        let codes: Vec<u8> = (0..len).map(|i| (i % 99 + 1) as u8).collect();
        let text = encode_base91(&codes).unwrap_or_default();
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("decode", len), &text, |b, text| {
            b.iter(|| {
                let value = decode_base91(black_box(text)).unwrap_or_default();
                black_box(unpack_digit_pairs(&value))
            });
        });
    }
    group.finish();
}

fn bench_handle_frame(c: &mut Criterion) {
    let global = global_record();
    let mut group = c.benchmark_group("handle_frame");
    for pods in [10usize, 100, 400] {
        let payloads: Vec<String> = (0..16)
            .map(|seed| compress_payload(&busy_frame(pods, seed)).unwrap_or_default())
            .collect();
        group.throughput(Throughput::Elements(payloads.len() as u64));
        group.bench_with_input(BenchmarkId::new("pods", pods), &payloads, |b, payloads| {
            b.iter(|| {
                let Ok(mut session) = ReplayBuilder::new()
                    .with_config(ReplayConfig::deterministic(1))
                    .start_plaintext(&global)
                else {
                    return;
                };
                for (n, payload) in payloads.iter().enumerate() {
                    let info = FrameInfo::new(n as u32, 1000.0, 0.0);
                    black_box(session.handle_frame(info, black_box(payload)).ok());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_base91, bench_handle_frame);
criterion_main!(benches);
