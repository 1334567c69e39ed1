//! Decision latency benchmarks.
//!
//! Strategy selection runs on every state or emotion change, so it must stay
//! well under a frame. Target: p95 of `generate_behaviors` < 1ms with the
//! stock catalog plus 200 extra records.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use companion_behavior::{ActionSpec, Environment, ExecutionContext, Strategy, StrategyManager};
use companion_core::types::{EmotionType, PetState, Timestamp};

/// Stock manager padded with synthetic records spread over every pair.
fn loaded_manager(extra: usize) -> StrategyManager {
    let manager = StrategyManager::with_builtin_rules().unwrap();
    for i in 0..extra {
        let state = PetState::ALL[i % PetState::ALL.len()];
        let emotion = EmotionType::ALL[i % EmotionType::ALL.len()];
        let strategy = Strategy::builder(format!("synthetic_{}", i), format!("Synthetic {}", i))
            .states([state])
            .emotions([emotion])
            .priority((i % 10) as i32)
            .cooldown_ms(if i % 3 == 0 { 0 } else { 1_000 })
            .action(ActionSpec::new("idle_animation").duration(500))
            .action(ActionSpec::new("user_prompt").delay(100).message("hi"))
            .build()
            .unwrap();
        manager.register_strategy(strategy).unwrap();
    }
    manager
}

fn contexts() -> Vec<ExecutionContext> {
    let mut contexts = Vec::new();
    for (i, state) in PetState::ALL.iter().enumerate() {
        for (j, emotion) in EmotionType::ALL.iter().enumerate() {
            let intensity = 0.3 + 0.1 * ((i + j) % 7) as f64;
            contexts.push(
                ExecutionContext::new(*state, *emotion, Timestamp(1_000_000))
                    .with_intensity(intensity)
                    .with_environment(Environment::at(((i * 6 + j) % 24) as u32, 30_000)),
            );
        }
    }
    contexts
}

fn bench_strategy_selection(c: &mut Criterion) {
    let stock = loaded_manager(0);
    let loaded = loaded_manager(200);
    let contexts = contexts();

    let mut group = c.benchmark_group("strategy_selection");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(10));

    // Stock catalog only
    group.bench_function("stock_generate", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let ctx = &contexts[idx % contexts.len()];
            idx += 1;
            stock.generate_behaviors(ctx)
        });
    });

    // Stock plus 200 records
    group.bench_function("loaded_generate", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let ctx = &contexts[idx % contexts.len()];
            idx += 1;
            loaded.generate_behaviors(ctx)
        });
    });

    // Matching without a context
    group.bench_function("loaded_match_no_context", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let ctx = &contexts[idx % contexts.len()];
            idx += 1;
            loaded.get_matching_strategies(ctx.state, ctx.emotion_type(), None)
        });
    });

    group.finish();
}

fn bench_selection_latency_assertion(c: &mut Criterion) {
    let manager = loaded_manager(200);
    let contexts = contexts();
    let target = Duration::from_micros(1000);

    let mut group = c.benchmark_group("selection_latency_assertion");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));
    group.bench_function("generate_per_decision", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let ctx = &contexts[idx % contexts.len()];
            idx += 1;
            manager.generate_behaviors(ctx)
        });
    });
    group.finish();

    let mut times = Vec::with_capacity(1000);
    for i in 0..1000 {
        let ctx = &contexts[i % contexts.len()];
        let start = std::time::Instant::now();
        let _behaviors = manager.generate_behaviors(ctx);
        times.push(start.elapsed());
    }

    times.sort();
    let p95 = times[949];
    let median = times[499];
    let max = *times.last().unwrap();

    eprintln!("\n=== Strategy Selection Latency (1000 decisions, 210 rules) ===");
    eprintln!("Median:  {:?}", median);
    eprintln!("p95:     {:?} (target: {:?})", p95, target);
    eprintln!("Max:     {:?}", max);

    assert!(
        p95 < target,
        "Strategy selection p95 {:?} exceeds target {:?}",
        p95,
        target
    );
}

criterion_group!(
    benches,
    bench_strategy_selection,
    bench_selection_latency_assertion
);
criterion_main!(benches);
