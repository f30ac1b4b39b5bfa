//! Emotion Fusion — blending live sources into one bounded vector.
//!
//! Each tick, every live source is converted into a partial [`EmotionVector`]
//! and the partials are blended with weights renormalized over the live set
//! only, so the output still moves when the dominant source drops out.
//!
//! ```text
//! effective[s] = w[s] / Σ w[live]          (uniform if Σ == 0)
//! final[k]     = clamp01(Σ effective[s] · partial_s[k])
//! ```
//!
//! The audience is tallied here but never blended. Its weight is carried in
//! the [`WeightTable`] for reporting only.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::AuraError;
use crate::registry::{DEFAULT_STALE_TIMEOUT, SourceRegistry};
use crate::types::{
    EmotionKey, EmotionVector, ExpressionLabel, GameTelemetry, LabeledEmotion, SourceId,
    SourceReading, clamp01,
};

// ---------------------------------------------------------------------------
// Configuration writes
// ---------------------------------------------------------------------------

/// Why a configuration write was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The key is not part of the table.
    UnknownKey,
    /// The value is not a number or numeric string.
    NotNumeric,
    /// The value is NaN or infinite.
    NotFinite,
    /// The payload was not a key/value object.
    NotAnObject,
}

/// Result of a single fire-and-forget configuration write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Stored as given.
    Accepted {
        /// Stored value.
        value: f64,
    },
    /// Stored after clamping into `[0, 1]`.
    Clamped {
        /// What the caller asked for.
        requested: f64,
        /// What was stored.
        stored: f64,
    },
    /// Not stored.
    Rejected {
        /// Why.
        reason: RejectReason,
    },
}

impl WriteOutcome {
    /// Whether a value was stored.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        !matches!(self, WriteOutcome::Rejected { .. })
    }

    fn rejected(reason: RejectReason) -> Self {
        WriteOutcome::Rejected { reason }
    }
}

/// Outcome of one key in a batch write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldWrite {
    /// Key as supplied by the caller.
    pub key: String,
    /// What happened to it.
    #[serde(flatten)]
    pub outcome: WriteOutcome,
}

/// Clamp a requested scalar into `[0, 1]`, reporting what was stored.
fn store_unit_scalar(requested: f64) -> (Option<f64>, WriteOutcome) {
    if !requested.is_finite() {
        return (None, WriteOutcome::rejected(RejectReason::NotFinite));
    }
    let stored = requested.clamp(0.0, 1.0);
    let outcome = if (stored - requested).abs() > f64::EPSILON {
        WriteOutcome::Clamped { requested, stored }
    } else {
        WriteOutcome::Accepted { value: stored }
    };
    (Some(stored), outcome)
}

/// Numbers and numeric strings are accepted; anything else is rejected.
fn scalar_from_json(value: &Value) -> Result<f64, RejectReason> {
    match value {
        Value::Number(n) => n.as_f64().ok_or(RejectReason::NotNumeric),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| RejectReason::NotNumeric),
        _ => Err(RejectReason::NotNumeric),
    }
}

fn log_rejections(table: &str, writes: &[FieldWrite]) {
    for write in writes {
        if let WriteOutcome::Rejected { reason } = &write.outcome {
            warn!(table, key = %write.key, ?reason, "Rejected configuration write");
        }
    }
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// A row of the weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightKey {
    /// Gameplay telemetry.
    GameState,
    /// Face classifier.
    Face,
    /// Speech classifier.
    Speech,
    /// Audience polling (never blended).
    Audience,
}

impl WeightKey {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WeightKey::GameState => "game_state",
            WeightKey::Face => "face",
            WeightKey::Speech => "speech",
            WeightKey::Audience => "audience",
        }
    }
}

impl From<SourceId> for WeightKey {
    fn from(source: SourceId) -> Self {
        match source {
            SourceId::GameState => WeightKey::GameState,
            SourceId::Face => WeightKey::Face,
            SourceId::Speech => WeightKey::Speech,
        }
    }
}

impl fmt::Display for WeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightKey {
    type Err = AuraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "game_state" => Ok(WeightKey::GameState),
            "face" => Ok(WeightKey::Face),
            "speech" => Ok(WeightKey::Speech),
            "audience" => Ok(WeightKey::Audience),
            other => Err(AuraError::UnknownSource(other.to_string())),
        }
    }
}

/// Runtime-mutable source weights, each in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightTable {
    /// Gameplay telemetry weight.
    pub game_state: f64,
    /// Face classifier weight.
    pub face: f64,
    /// Speech classifier weight.
    pub speech: f64,
    /// Audience weight.
    pub audience: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::from_config(&crate::config::WeightDefaults::default())
    }
}

impl WeightTable {
    /// Initial table from configuration, clamped into `[0, 1]`.
    #[must_use]
    pub fn from_config(defaults: &crate::config::WeightDefaults) -> Self {
        Self {
            game_state: clamp01(defaults.game_state),
            face: clamp01(defaults.face),
            speech: clamp01(defaults.speech),
            audience: clamp01(defaults.audience),
        }
    }

    /// Current weight for a key.
    #[must_use]
    pub fn get(&self, key: WeightKey) -> f64 {
        match key {
            WeightKey::GameState => self.game_state,
            WeightKey::Face => self.face,
            WeightKey::Speech => self.speech,
            WeightKey::Audience => self.audience,
        }
    }

    /// Set one weight, clamping into `[0, 1]`.
    pub fn set(&mut self, key: WeightKey, requested: f64) -> WriteOutcome {
        let (stored, outcome) = store_unit_scalar(requested);
        if let Some(v) = stored {
            match key {
                WeightKey::GameState => self.game_state = v,
                WeightKey::Face => self.face = v,
                WeightKey::Speech => self.speech = v,
                WeightKey::Audience => self.audience = v,
            }
        }
        outcome
    }

    /// Apply a partial `{key: value}` object as received from a controller.
    ///
    /// Every key gets its own outcome; rejected keys leave the table untouched.
    pub fn apply_json(&mut self, partial: &Value) -> Vec<FieldWrite> {
        let Some(map) = partial.as_object() else {
            return vec![FieldWrite {
                key: String::new(),
                outcome: WriteOutcome::rejected(RejectReason::NotAnObject),
            }];
        };
        let writes: Vec<FieldWrite> = map
            .iter()
            .map(|(key, value)| {
                let outcome = match key.parse::<WeightKey>() {
                    Err(_) => WriteOutcome::rejected(RejectReason::UnknownKey),
                    Ok(wk) => match scalar_from_json(value) {
                        Ok(v) => self.set(wk, v),
                        Err(reason) => WriteOutcome::rejected(reason),
                    },
                };
                FieldWrite {
                    key: key.clone(),
                    outcome,
                }
            })
            .collect();
        log_rejections("weights", &writes);
        writes
    }
}

// ---------------------------------------------------------------------------
// Manual override
// ---------------------------------------------------------------------------

/// Demo / director override that replaces fusion entirely while active.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManualOverride {
    /// Whether fusion is bypassed.
    pub active: bool,
    /// Vector returned while active.
    pub vector: EmotionVector,
}

impl ManualOverride {
    /// Toggle the override and replace the whole vector.
    pub fn set(&mut self, active: bool, vector: Option<EmotionVector>) {
        self.active = active;
        if let Some(v) = vector {
            self.vector = v.clamped();
        }
    }

    /// Toggle the override and apply a partial `{emotion: value}` object.
    ///
    /// `null` or an absent vector leaves the stored vector unchanged.
    pub fn apply_json(&mut self, active: bool, partial: Option<&Value>) -> Vec<FieldWrite> {
        self.active = active;
        let Some(partial) = partial.filter(|v| !v.is_null()) else {
            return Vec::new();
        };
        let Some(map) = partial.as_object() else {
            return vec![FieldWrite {
                key: String::new(),
                outcome: WriteOutcome::rejected(RejectReason::NotAnObject),
            }];
        };
        let writes: Vec<FieldWrite> = map
            .iter()
            .map(|(key, value)| {
                let outcome = match key.parse::<EmotionKey>() {
                    Err(_) => WriteOutcome::rejected(RejectReason::UnknownKey),
                    Ok(ek) => match scalar_from_json(value) {
                        Ok(requested) => {
                            let (stored, outcome) = store_unit_scalar(requested);
                            if let Some(v) = stored {
                                self.vector.set(ek, v);
                            }
                            outcome
                        }
                        Err(reason) => WriteOutcome::rejected(reason),
                    },
                };
                FieldWrite {
                    key: key.clone(),
                    outcome,
                }
            })
            .collect();
        log_rejections("override", &writes);
        writes
    }
}

// ---------------------------------------------------------------------------
// Audience
// ---------------------------------------------------------------------------

/// Running vote count per emotion key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudienceTally {
    counts: BTreeMap<EmotionKey, u64>,
}

impl AudienceTally {
    /// Empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one vote and return the updated tally for that key.
    pub fn vote(&mut self, mood: EmotionKey) -> u64 {
        let count = self.counts.entry(mood).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Votes for one key.
    #[must_use]
    pub fn count(&self, mood: EmotionKey) -> u64 {
        self.counts.get(&mood).copied().unwrap_or(0)
    }

    /// Total votes across all keys.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Counts for every key, including zeros.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<EmotionKey, u64> {
        EmotionKey::ALL.into_iter().map(|k| (k, self.count(k))).collect()
    }

    /// `count / total` per key; the zero vector when nobody voted.
    #[must_use]
    pub fn ratios(&self) -> EmotionVector {
        let total = self.total();
        if total == 0 {
            return EmotionVector::ZERO;
        }
        let mut v = EmotionVector::ZERO;
        for key in EmotionKey::ALL {
            v.set(key, self.count(key) as f64 / total as f64);
        }
        v
    }

    /// Clear every count.
    pub fn reset(&mut self) {
        self.counts.clear();
    }
}

// ---------------------------------------------------------------------------
// Partial vectors
// ---------------------------------------------------------------------------

/// Heuristic mapping from gameplay telemetry to emotion.
///
/// Threat drives fear and tension; speed and firing drive excitement; score
/// under low threat drives joy; stillness under low threat drives calm.
#[must_use]
pub fn telemetry_partial(t: &GameTelemetry) -> EmotionVector {
    let threat = t.threat_proximity;
    let shots = (f64::from(t.shots_fired) / 10.0).min(1.0);
    let score = (t.score / 1000.0).min(1.0);
    let low_threat = 1.0 - threat;

    EmotionVector::new(
        threat * 0.6,
        0.5 * t.speed + 0.5 * shots,
        threat * 0.8,
        low_threat * score * 0.5,
        low_threat * (1.0 - t.speed) * 0.7,
    )
}

/// Fixed intensity table for classifier labels, before confidence scaling.
#[must_use]
pub fn label_profile(label: &ExpressionLabel) -> EmotionVector {
    use EmotionKey::{Calm, Excitement, Fear, Joy, Tension};

    let entries: &[(EmotionKey, f64)] = match label {
        ExpressionLabel::Angry => &[(Tension, 0.8), (Excitement, 0.4)],
        ExpressionLabel::Disgust => &[(Tension, 0.6)],
        ExpressionLabel::Fear => &[(Fear, 1.0), (Tension, 0.7)],
        ExpressionLabel::Happy => &[(Joy, 1.0), (Excitement, 0.6)],
        ExpressionLabel::Sad => &[(Calm, 0.5)],
        ExpressionLabel::Surprise => &[(Excitement, 0.9), (Fear, 0.2)],
        ExpressionLabel::Neutral => &[(Calm, 0.8)],
        ExpressionLabel::Other(_) => &[],
    };
    let mut v = EmotionVector::ZERO;
    for (key, value) in entries {
        v.set(*key, *value);
    }
    v
}

/// Classifier reading scaled by its confidence.
#[must_use]
pub fn labeled_partial(e: &LabeledEmotion) -> EmotionVector {
    let mut v = EmotionVector::ZERO;
    v.add_weighted(&label_profile(&e.label), clamp01(e.confidence));
    v.clamped()
}

/// Partial vector for any reading.
#[must_use]
pub fn partial_vector(reading: &SourceReading) -> EmotionVector {
    match reading {
        SourceReading::GameTelemetry(t) => telemetry_partial(t),
        SourceReading::LabeledEmotion(e) => labeled_partial(e),
    }
}

/// Weights renormalized over the live sources.
///
/// Sums to 1.0 whenever `live` is non-empty; falls back to uniform when every
/// live weight is zero.
#[must_use]
pub fn effective_weights(weights: &WeightTable, live: &[SourceId]) -> BTreeMap<SourceId, f64> {
    if live.is_empty() {
        return BTreeMap::new();
    }
    let sum: f64 = live.iter().map(|s| weights.get((*s).into())).sum();
    if sum == 0.0 {
        let uniform = 1.0 / live.len() as f64;
        return live.iter().map(|s| (*s, uniform)).collect();
    }
    live.iter()
        .map(|s| (*s, weights.get((*s).into()) / sum))
        .collect()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Full result of one fusion pass, for publishing and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fusion {
    /// The blended vector.
    pub vector: EmotionVector,
    /// Sources that contributed, in blend order.
    pub live_sources: Vec<SourceId>,
    /// Renormalized weights of the contributing sources.
    pub effective_weights: BTreeMap<SourceId, f64>,
    /// Whether the manual override short-circuited the blend.
    pub overridden: bool,
}

/// Stateless blender over a registry snapshot.
#[derive(Debug, Clone, Copy)]
pub struct EmotionFusionEngine {
    stale_timeout: Duration,
}

impl Default for EmotionFusionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TIMEOUT)
    }
}

impl EmotionFusionEngine {
    /// Engine treating sources older than `stale_timeout` as absent.
    #[must_use]
    pub fn new(stale_timeout: Duration) -> Self {
        Self { stale_timeout }
    }

    /// The staleness window in use.
    #[must_use]
    pub fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }

    /// Blend the registry into a single vector as of `now`.
    #[must_use]
    pub fn fuse(
        &self,
        registry: &SourceRegistry,
        weights: &WeightTable,
        manual: &ManualOverride,
        now: Instant,
    ) -> EmotionVector {
        self.fuse_detailed(registry, weights, manual, now).vector
    }

    /// Blend and report which sources contributed with what weight.
    #[must_use]
    pub fn fuse_detailed(
        &self,
        registry: &SourceRegistry,
        weights: &WeightTable,
        manual: &ManualOverride,
        now: Instant,
    ) -> Fusion {
        if manual.active {
            return Fusion {
                vector: manual.vector,
                live_sources: Vec::new(),
                effective_weights: BTreeMap::new(),
                overridden: true,
            };
        }

        let live = registry.live_sources(now, self.stale_timeout);
        let effective = effective_weights(weights, &live);

        let mut blended = EmotionVector::ZERO;
        for source in &live {
            let (Some(entry), Some(weight)) = (registry.get(*source), effective.get(source)) else {
                continue;
            };
            blended.add_weighted(&partial_vector(&entry.reading), *weight);
        }

        Fusion {
            vector: blended.clamped(),
            live_sources: live,
            effective_weights: effective,
            overridden: false,
        }
    }
}
