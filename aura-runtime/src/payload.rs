//! Payloads published to subscribers each tick.
//!
//! No wire format is imposed; everything derives `Serialize` so the transport
//! layer can pick one. Field names follow the descriptor contract.

use std::collections::BTreeMap;

use aura_core::fusion::{ManualOverride, WeightTable};
use aura_core::metrics::CounterSnapshot;
use aura_core::modulation::ModulationDescriptor;
use aura_core::registry::SourceStatus;
use aura_core::types::{EmotionKey, EmotionVector, SourceId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Coarse hints for consumers that predate the full descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LegacyHints {
    /// Largest fused value.
    pub intensity: f64,
    /// `500 + 4500 * intensity`.
    pub filter_cutoff_hz: f64,
    /// `0.6 + 0.4 * intensity`.
    pub gain: f64,
}

impl LegacyHints {
    /// Hints derived from a fused vector.
    #[must_use]
    pub fn from_vector(v: &EmotionVector) -> Self {
        let intensity = v.max_value();
        Self {
            intensity,
            filter_cutoff_hz: 500.0 + 4500.0 * intensity,
            gain: 0.6 + 0.4 * intensity,
        }
    }
}

/// Observability snapshot accompanying each update.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    /// Sources that contributed this tick.
    pub live_sources: Vec<SourceId>,
    /// Renormalized weights of the contributing sources.
    pub effective_weights: BTreeMap<SourceId, f64>,
    /// Configured weights, audience included.
    pub weights: WeightTable,
    /// Vote counts per key.
    pub audience_tally: BTreeMap<EmotionKey, u64>,
    /// `count / total` per key.
    pub audience_ratios: EmotionVector,
    /// Manual override flag and vector.
    pub override_state: ManualOverride,
    /// Per-source liveness and age.
    pub sources: Vec<SourceStatus>,
    /// Pipeline counters.
    pub counters: CounterSnapshot,
}

/// Everything published for one tick.
#[derive(Debug, Clone, Serialize)]
pub struct AuraUpdate {
    /// Monotonic tick number, starting at 1.
    pub sequence: u64,
    /// Wall-clock time the tick was computed.
    pub timestamp: DateTime<Utc>,
    /// Fused emotion vector.
    pub emotions: EmotionVector,
    /// `None` while no track is loaded.
    pub modulation: Option<ModulationDescriptor>,
    /// Coarse legacy hints.
    pub hints: LegacyHints,
    /// Loaded track, if any.
    pub track_name: Option<String>,
    /// Smoothed tempo over base tempo.
    pub tempo_multiplier: Option<f64>,
    /// Observability snapshot.
    pub diagnostics: Diagnostics,
}

/// Reduced directive for the game client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameInstruction {
    /// Tick this directive came from.
    pub sequence: u64,
    /// Dominant fused emotion.
    pub primary_emotion: EmotionKey,
    /// Suggested tempo, if a track is loaded.
    pub tempo_bpm: Option<f64>,
}

impl AuraUpdate {
    /// The game-facing subset of this update.
    #[must_use]
    pub fn game_instruction(&self) -> GameInstruction {
        let primary_emotion = self
            .modulation
            .as_ref()
            .map_or_else(|| self.emotions.primary().0, |d| d.primary_emotion);
        GameInstruction {
            sequence: self.sequence,
            primary_emotion,
            tempo_bpm: self.modulation.as_ref().map(|d| d.tempo_bpm),
        }
    }
}
