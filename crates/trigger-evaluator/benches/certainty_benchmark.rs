//! Performance benchmarks for certainty evaluation and the full pipeline
//!
//! Measures:
//! - Window evaluation cost as the device log grows
//! - End-to-end evaluation latency against in-memory stores
//!
//! Run with:
//! ```bash
//! cargo bench --bench certainty_benchmark
//! ```

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use shared::models::{format_timestamp, Comparison, EvaluationRequest, Event, Rule};
use shared::{EvaluatorConfig, NotifierConfig};
use std::sync::Arc;
use std::time::Instant;
use trigger_evaluator::notifier::{ChannelRouter, LogNotifier};
use trigger_evaluator::store::{InMemoryBlobStore, InMemoryStateStore};
use trigger_evaluator::{CertaintyEvaluator, TriggerProcessor};

const ITERATIONS: u32 = 1_000;

fn rule() -> Rule {
    Rule {
        trigger_name: "lot_is_occupied".to_string(),
        trigger_attribute: "distance".to_string(),
        comparison: Comparison {
            below: Some(4.0),
            ..Default::default()
        },
        certainty: 0.8,
        period: Duration::seconds(60),
    }
}

fn bench_window_evaluation() {
    println!("\n=== Benchmark: Window Evaluation ===");

    let evaluator = CertaintyEvaluator::from_rule(&rule());
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    for log_size in [10_i64, 100, 1_000] {
        // Spread the log over the 300s retention horizon
        let events: Vec<Event> = (0..log_size)
            .map(|i| {
                let offset = Duration::milliseconds(i * 300_000 / log_size);
                Event::new("g88_pi", "distance", (i % 6) as f64, t0 + offset)
            })
            .collect();
        let now = t0 + Duration::seconds(300);

        let start = Instant::now();
        for _ in 0..ITERATIONS {
            std::hint::black_box(evaluator.evaluate(&events, now));
        }
        let avg = start.elapsed().as_nanos() / u128::from(ITERATIONS);

        println!("{:>5} events: {}ns per evaluation", log_size, avg);
    }
}

async fn bench_pipeline_latency() {
    println!("\n=== Benchmark: Pipeline Latency (in-memory stores) ===");

    let processor = TriggerProcessor::new(
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(LogNotifier::new(ChannelRouter::from_config(&NotifierConfig::default()))),
        &EvaluatorConfig::default(),
    );
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    let start = Instant::now();
    for i in 0..ITERATIONS {
        let request: EvaluationRequest = serde_json::from_value(json!({
            "device": "g88_pi",
            "attribute": "distance",
            "value": i % 6,
            "timestamp": format_timestamp(t0 + Duration::seconds(i64::from(i))),
            "trigger_name": "lot_is_occupied",
            "trigger_attribute": "distance",
            "trigger_lower_limit": 4,
            "trigger_certainty": 0.8,
            "trigger_period": 60
        }))
        .expect("valid request");

        let _ = processor.evaluate(&request).await;
    }
    let avg = start.elapsed().as_micros() / u128::from(ITERATIONS);

    println!("Average: {}μs ({:.2}ms) per evaluation", avg, avg as f64 / 1000.0);
}

#[tokio::main]
async fn main() {
    println!("====================================");
    println!("Certainty Evaluator Benchmark Suite");
    println!("====================================");

    bench_window_evaluation();
    bench_pipeline_latency().await;

    println!("\n====================================");
    println!("Benchmark suite completed!");
    println!("====================================");
}
