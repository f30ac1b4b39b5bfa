//! AURA Benchmark Suite
//!
//! Per-tick cost targets (the default tick budget is 5ms):
//!   fuse_three_sources ............... < 5μs
//!   plan_descriptor .................. < 10μs
//!   full_tick_fuse_and_plan .......... < 20μs
//!   chord_advance .................... < 5μs

use std::time::{Duration, Instant};

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use aura_core::chord::{GameStateLabel, StochasticChordEngine};
use aura_core::config::{ChordConfig, ModulationConfig, WeightDefaults};
use aura_core::fusion::{EmotionFusionEngine, ManualOverride, WeightTable};
use aura_core::modulation::{ModulationPlanner, TrackInfo};
use aura_core::registry::SourceRegistry;
use aura_core::types::{GameTelemetry, LabeledEmotion, SourceId};

fn populated_registry(now: Instant) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.record_at(
        SourceId::GameState,
        GameTelemetry {
            health: 640.0,
            enemy_count: 3,
            score: 1200.0,
            speed: 0.7,
            threat_proximity: 0.55,
            elapsed_time: 84.0,
            shots_fired: 6,
        }
        .into(),
        now,
    );
    registry.record_at(SourceId::Face, LabeledEmotion::new("surprise", 0.82).into(), now);
    registry.record_at(SourceId::Speech, LabeledEmotion::new("angry", 0.6).into(), now);
    registry
}

/// Benchmark: Fusion over three live sources (target: < 5μs).
fn bench_fusion(c: &mut Criterion) {
    let now = Instant::now();
    let registry = populated_registry(now);
    let weights = WeightTable::from_config(&WeightDefaults::default());
    let manual = ManualOverride::default();
    let engine = EmotionFusionEngine::new(Duration::from_secs(5));

    c.bench_function("fuse_three_sources", |b| {
        b.iter(|| {
            let v = engine.fuse(
                black_box(&registry),
                black_box(&weights),
                black_box(&manual),
                black_box(now),
            );
            black_box(v);
        });
    });
}

/// Benchmark: One planner pass with a loaded track (target: < 10μs).
fn bench_plan(c: &mut Criterion) {
    let now = Instant::now();
    let registry = populated_registry(now);
    let weights = WeightTable::from_config(&WeightDefaults::default());
    let engine = EmotionFusionEngine::new(Duration::from_secs(5));
    let vector = engine.fuse(&registry, &weights, &ManualOverride::default(), now);

    let mut planner = ModulationPlanner::new(ModulationConfig::default());
    let track = TrackInfo::new("bench_theme.wav", 120.0);
    let mut t = now;

    c.bench_function("plan_descriptor", |b| {
        b.iter(|| {
            t += Duration::from_millis(500);
            let d = planner.plan(black_box(&vector), black_box(Some(&track)), t);
            black_box(d);
        });
    });
}

/// Benchmark: Full tick, fuse then plan (target: < 20μs).
fn bench_full_tick(c: &mut Criterion) {
    let now = Instant::now();
    let registry = populated_registry(now);
    let weights = WeightTable::from_config(&WeightDefaults::default());
    let manual = ManualOverride::default();
    let engine = EmotionFusionEngine::new(Duration::from_secs(3600));
    let mut planner = ModulationPlanner::new(ModulationConfig::default());
    let track = TrackInfo::new("bench_theme.wav", 120.0);
    let mut t = now;

    c.bench_function("full_tick_fuse_and_plan", |b| {
        b.iter(|| {
            t += Duration::from_millis(500);
            let fusion = engine.fuse_detailed(black_box(&registry), &weights, &manual, t);
            let d = planner.plan(&fusion.vector, Some(&track), t);
            black_box((fusion, d));
        });
    });
}

/// Benchmark: One chord advance (target: < 5μs).
fn bench_chord_advance(c: &mut Criterion) {
    let mut engine = StochasticChordEngine::with_default_banks(ChordConfig {
        seed: Some(42),
        ..ChordConfig::default()
    });
    let labels = [
        GameStateLabel::Exploration,
        GameStateLabel::Approach,
        GameStateLabel::Combat,
    ];
    let mut now = Duration::ZERO;
    let mut i = 0usize;

    c.bench_function("chord_advance", |b| {
        b.iter(|| {
            now += Duration::from_millis(400);
            i = i.wrapping_add(1);
            let label = labels[(i / 16) % labels.len()];
            let event = engine.advance(black_box(now), label, black_box(650.0));
            black_box(event);
        });
    });
}

criterion_group!(
    benches,
    bench_fusion,
    bench_plan,
    bench_full_tick,
    bench_chord_advance,
);
criterion_main!(benches);
