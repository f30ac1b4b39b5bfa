//! Property-Based Tests for AURA Core
//!
//! Uses `proptest` to check the pipeline invariants under arbitrary inputs:
//! bounded fusion output, renormalized weights, override and staleness
//! short-circuits, smoothing without overshoot, and stochastic chord rows.

use std::time::{Duration, Instant};

use proptest::prelude::*;

use aura_core::chord::{ChordBank, ChordBankSet};
use aura_core::config::ModulationConfig;
use aura_core::fusion::{EmotionFusionEngine, ManualOverride, WeightTable, effective_weights};
use aura_core::modulation::{ModulationPlanner, TrackInfo, phrase_seed};
use aura_core::registry::SourceRegistry;
use aura_core::types::{EmotionVector, GameTelemetry, LabeledEmotion, SourceId, SourceReading};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_vector() -> impl Strategy<Value = EmotionVector> {
    (0.0..=1.0f64, 0.0..=1.0f64, 0.0..=1.0f64, 0.0..=1.0f64, 0.0..=1.0f64)
        .prop_map(|(t, e, f, j, c)| EmotionVector::new(t, e, f, j, c))
}

fn arb_telemetry() -> impl Strategy<Value = GameTelemetry> {
    (0.0..=1.0f64, 0.0..=1.0f64, 0u32..100, 0.0..5000.0f64).prop_map(|(threat, speed, shots, score)| {
        GameTelemetry {
            threat_proximity: threat,
            speed,
            shots_fired: shots,
            score,
            ..GameTelemetry::default()
        }
    })
}

fn arb_label() -> impl Strategy<Value = LabeledEmotion> {
    (
        prop::sample::select(vec![
            "angry", "disgust", "fear", "happy", "sad", "surprise", "neutral", "bored",
        ]),
        0.0..=1.0f64,
    )
        .prop_map(|(label, confidence)| LabeledEmotion::new(label, confidence))
}

fn arb_weights() -> impl Strategy<Value = WeightTable> {
    (0.0..=1.0f64, 0.0..=1.0f64, 0.0..=1.0f64, 0.0..=1.0f64).prop_map(|(g, f, s, a)| WeightTable {
        game_state: g,
        face: f,
        speech: s,
        audience: a,
    })
}

/// Registry with each source either fresh, stale, or absent.
fn arb_registry(now: Instant) -> impl Strategy<Value = SourceRegistry> {
    (
        prop::option::of((arb_telemetry(), any::<bool>())),
        prop::option::of((arb_label(), any::<bool>())),
        prop::option::of((arb_label(), any::<bool>())),
    )
        .prop_map(move |(game, face, speech)| {
            let at = |fresh: bool| if fresh { now } else { now - Duration::from_secs(10) };
            let mut registry = SourceRegistry::new();
            if let Some((t, fresh)) = game {
                registry.record_at(SourceId::GameState, SourceReading::from(t), at(fresh));
            }
            if let Some((e, fresh)) = face {
                registry.record_at(SourceId::Face, SourceReading::from(e), at(fresh));
            }
            if let Some((e, fresh)) = speech {
                registry.record_at(SourceId::Speech, SourceReading::from(e), at(fresh));
            }
            registry
        })
}

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn fused_values_always_bounded(
        (now, registry) in Just(Instant::now()).prop_flat_map(|now| (Just(now), arb_registry(now))),
        weights in arb_weights(),
    ) {
        let fused = EmotionFusionEngine::default().fuse(&registry, &weights, &ManualOverride::default(), now);
        prop_assert!(fused.is_bounded());
    }

    #[test]
    fn effective_weights_sum_to_one(
        weights in arb_weights(),
        live in prop::sample::subsequence(SourceId::ALL.to_vec(), 1..=3),
    ) {
        let effective = effective_weights(&weights, &live);
        let sum: f64 = effective.values().sum();
        prop_assert!((sum - 1.0).abs() < 1e-9);
        prop_assert_eq!(effective.len(), live.len());
    }

    #[test]
    fn override_is_returned_exactly(
        (now, registry) in Just(Instant::now()).prop_flat_map(|now| (Just(now), arb_registry(now))),
        weights in arb_weights(),
        forced in arb_vector(),
    ) {
        let mut manual = ManualOverride::default();
        manual.set(true, Some(forced));
        let fused = EmotionFusionEngine::default().fuse(&registry, &weights, &manual, now);
        prop_assert_eq!(fused, forced);
    }

    #[test]
    fn all_stale_is_zero(
        telemetry in arb_telemetry(),
        face in arb_label(),
        weights in arb_weights(),
        age_ms in 5001u64..60_000,
    ) {
        let now = Instant::now();
        let then = now - Duration::from_millis(age_ms);
        let mut registry = SourceRegistry::new();
        registry.record_at(SourceId::GameState, telemetry.into(), then);
        registry.record_at(SourceId::Face, face.into(), then);
        let fused = EmotionFusionEngine::default().fuse(&registry, &weights, &ManualOverride::default(), now);
        prop_assert_eq!(fused, EmotionVector::ZERO);
    }
}

// ---------------------------------------------------------------------------
// Modulation
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn smoothing_is_monotone_and_never_overshoots(
        start in arb_vector(),
        steady in arb_vector(),
        base in 60.0..200.0f64,
        ticks in 1usize..60,
    ) {
        let mut planner = ModulationPlanner::new(ModulationConfig::default());
        let track = TrackInfo::new("t", base);
        let now = Instant::now();

        let first = planner.plan(&start, Some(&track), now).map(|d| d.tempo_bpm);
        prop_assert!(first.is_some());
        let mut last = first.unwrap_or_default();
        let mut target = last;

        for _ in 0..ticks {
            let d = planner.plan(&steady, Some(&track), now);
            prop_assert!(d.is_some());
            let Some(d) = d else { break };
            target = d.target_tempo_bpm;
            let lo = last.min(target) - 0.01;
            let hi = last.max(target) + 0.01;
            prop_assert!(d.tempo_bpm >= lo && d.tempo_bpm <= hi);
            prop_assert!((d.tempo_bpm - target).abs() <= (last - target).abs() + 0.01);
            last = d.tempo_bpm;
        }
        prop_assert!((last - target).abs() <= (first.unwrap_or_default() - target).abs() + 0.01);
    }

    #[test]
    fn same_position_same_variation(
        section in 0u64..1000,
        phrase in 0u64..10_000,
    ) {
        prop_assert_eq!(phrase_seed(section, phrase), phrase_seed(section, phrase));
    }

    #[test]
    fn planned_values_stay_in_range(v in arb_vector(), base in 40.0..240.0f64) {
        let mut planner = ModulationPlanner::new(ModulationConfig::default());
        let d = planner.plan(&v, Some(&TrackInfo::new("t", base)), Instant::now());
        prop_assert!(d.is_some());
        if let Some(d) = d {
            prop_assert!((0.0..=1.0).contains(&d.energy));
            prop_assert!((0.0..=1.0).contains(&d.valence));
            prop_assert!(d.tempo_multiplier >= 0.8 - 1e-4 && d.tempo_multiplier <= 1.4 + 1e-4);
            prop_assert!(d.layers.core);
        }
    }
}

// ---------------------------------------------------------------------------
// Chord banks
// ---------------------------------------------------------------------------

fn arb_bank() -> impl Strategy<Value = ChordBank> {
    (1usize..10).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(0.0..5.0f64, n), n).prop_map(move |rows| {
            let chords = (0..n).map(|i| format!("c{i}")).collect();
            ChordBank::new("arb", "x", chords, rows).unwrap_or_else(|_| ChordBankSet::default().calm)
        })
    })
}

proptest! {
    #[test]
    fn smoothed_rows_are_stochastic(bank in arb_bank(), index in 0usize..100, epsilon in 0.001..0.5f64) {
        let row = bank.smoothed_row(index, epsilon);
        let sum: f64 = row.iter().sum();
        prop_assert!((sum - 1.0).abs() < 1e-9);
        prop_assert!(row.iter().all(|p| *p > 0.0));
    }
}
