use chrono::{FixedOffset, NaiveDate};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use wearable_sync::services::mapper::{map_hr_intraday, HeartRateIntradayResponse};

/// A full day of one-second samples, as returned at `1sec` detail level.
fn full_day_payload() -> String {
    let points: Vec<String> = (0..24 * 60 * 60)
        .map(|s| {
            format!(
                r#"{{"time":"{:02}:{:02}:{:02}","value":{}}}"#,
                s / 3600,
                (s / 60) % 60,
                s % 60,
                55 + s % 90
            )
        })
        .collect();
    format!(
        r#"{{"activities-heart":[],"activities-heart-intraday":{{"dataset":[{}],"datasetInterval":1,"datasetType":"second"}}}}"#,
        points.join(",")
    )
}

fn benchmark_hr_intraday(c: &mut Criterion) {
    let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    let tz = FixedOffset::east_opt(9 * 3600).unwrap();

    let raw = full_day_payload();
    let parsed: HeartRateIntradayResponse =
        serde_json::from_str(&raw).expect("Failed to parse payload");

    let mut group = c.benchmark_group("hr_intraday");

    group.bench_function("decode_full_day", |b| {
        b.iter(|| serde_json::from_str::<HeartRateIntradayResponse>(black_box(&raw)))
    });

    group.bench_function("map_full_day", |b| {
        b.iter(|| map_hr_intraday(black_box(&parsed), date, tz))
    });

    group.finish();
}

criterion_group!(benches, benchmark_hr_intraday);
criterion_main!(benches);
