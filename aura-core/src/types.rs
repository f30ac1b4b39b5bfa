//! Core type definitions for the AURA emotion pipeline.
//!
//! Everything that crosses a component boundary lives here: the closed
//! emotion key set, the bounded [`EmotionVector`], source identifiers and the
//! readings producers push into the registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuraError;

// ---------------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------------

/// Clamp into `[0, 1]`, mapping NaN to zero.
#[must_use]
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Round to a fixed number of decimal places for published values.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Emotion keys
// ---------------------------------------------------------------------------

/// One of the five fused emotion dimensions.
///
/// Declaration order is significant: it is the iteration order used for
/// argmax tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionKey {
    /// Suspense, unresolved threat.
    Tension,
    /// Action, speed, firing.
    Excitement,
    /// Immediate danger.
    Fear,
    /// Success, positive affect.
    Joy,
    /// Low threat, low speed.
    Calm,
}

impl EmotionKey {
    /// All keys in canonical order.
    pub const ALL: [EmotionKey; 5] = [
        EmotionKey::Tension,
        EmotionKey::Excitement,
        EmotionKey::Fear,
        EmotionKey::Joy,
        EmotionKey::Calm,
    ];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EmotionKey::Tension => "tension",
            EmotionKey::Excitement => "excitement",
            EmotionKey::Fear => "fear",
            EmotionKey::Joy => "joy",
            EmotionKey::Calm => "calm",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EmotionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionKey {
    type Err = AuraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmotionKey::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AuraError::UnknownEmotion(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Emotion vector
// ---------------------------------------------------------------------------

/// A bounded five-dimensional emotion estimate.
///
/// Each dimension is independently clamped to `[0, 1]`; there is no
/// sum-to-one constraint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionVector {
    /// Tension intensity.
    #[serde(default)]
    pub tension: f64,
    /// Excitement intensity.
    #[serde(default)]
    pub excitement: f64,
    /// Fear intensity.
    #[serde(default)]
    pub fear: f64,
    /// Joy intensity.
    #[serde(default)]
    pub joy: f64,
    /// Calm intensity.
    #[serde(default)]
    pub calm: f64,
}

impl EmotionVector {
    /// The all-zero (neutral / silent) vector.
    pub const ZERO: EmotionVector = EmotionVector {
        tension: 0.0,
        excitement: 0.0,
        fear: 0.0,
        joy: 0.0,
        calm: 0.0,
    };

    /// Build from per-key values, clamping each into `[0, 1]`.
    #[must_use]
    pub fn new(tension: f64, excitement: f64, fear: f64, joy: f64, calm: f64) -> Self {
        Self::from_array([tension, excitement, fear, joy, calm])
    }

    /// A vector with a single non-zero dimension.
    #[must_use]
    pub fn only(key: EmotionKey, value: f64) -> Self {
        let mut v = Self::ZERO;
        v.set(key, value);
        v
    }

    fn from_array(values: [f64; 5]) -> Self {
        Self {
            tension: clamp01(values[0]),
            excitement: clamp01(values[1]),
            fear: clamp01(values[2]),
            joy: clamp01(values[3]),
            calm: clamp01(values[4]),
        }
    }

    fn as_array(&self) -> [f64; 5] {
        [self.tension, self.excitement, self.fear, self.joy, self.calm]
    }

    /// Value of one dimension.
    #[must_use]
    pub fn get(&self, key: EmotionKey) -> f64 {
        self.as_array()[key.index()]
    }

    /// Set one dimension, clamped into `[0, 1]`.
    pub fn set(&mut self, key: EmotionKey, value: f64) {
        let v = clamp01(value);
        match key {
            EmotionKey::Tension => self.tension = v,
            EmotionKey::Excitement => self.excitement = v,
            EmotionKey::Fear => self.fear = v,
            EmotionKey::Joy => self.joy = v,
            EmotionKey::Calm => self.calm = v,
        }
    }

    /// Iterate `(key, value)` in canonical key order.
    pub fn iter(&self) -> impl Iterator<Item = (EmotionKey, f64)> + '_ {
        EmotionKey::ALL.into_iter().map(|k| (k, self.get(k)))
    }

    /// Highest dimension; ties go to the earliest key in canonical order.
    #[must_use]
    pub fn primary(&self) -> (EmotionKey, f64) {
        let mut best = (EmotionKey::Tension, self.tension);
        for (key, value) in self.iter().skip(1) {
            if value > best.1 {
                best = (key, value);
            }
        }
        best
    }

    /// Largest component value.
    #[must_use]
    pub fn max_value(&self) -> f64 {
        self.primary().1
    }

    /// Accumulate `weight * other` into `self` without clamping.
    ///
    /// Callers blend several partials and clamp once at the end with
    /// [`EmotionVector::clamped`].
    pub fn add_weighted(&mut self, other: &EmotionVector, weight: f64) {
        self.tension += other.tension * weight;
        self.excitement += other.excitement * weight;
        self.fear += other.fear * weight;
        self.joy += other.joy * weight;
        self.calm += other.calm * weight;
    }

    /// Copy with every dimension clamped into `[0, 1]`.
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self::from_array(self.as_array())
    }

    /// Whether every dimension is within `[0, 1]`.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.iter().all(|(_, v)| (0.0..=1.0).contains(&v))
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// A live input feeding the fusion blend.
///
/// The audience is deliberately not a source: votes are tallied separately
/// and never blended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Gameplay telemetry from the game client.
    GameState,
    /// Facial-expression classifier output.
    Face,
    /// Speech-emotion classifier output.
    Speech,
}

impl SourceId {
    /// All blendable sources, in blend order.
    pub const ALL: [SourceId; 3] = [SourceId::GameState, SourceId::Face, SourceId::Speech];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::GameState => "game_state",
            SourceId::Face => "face",
            SourceId::Speech => "speech",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = AuraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "game_state" | "game" => Ok(SourceId::GameState),
            "face" | "face_emotion" => Ok(SourceId::Face),
            "speech" | "speech_emotion" => Ok(SourceId::Speech),
            _ => Err(AuraError::UnknownSource(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Gameplay telemetry snapshot pushed by the game client.
///
/// Field aliases accept the game client's native payload names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameTelemetry {
    /// Player hit points.
    #[serde(default = "default_health", alias = "player_health")]
    pub health: f64,
    /// Enemies currently alive.
    #[serde(default)]
    pub enemy_count: u32,
    /// Running score.
    #[serde(default)]
    pub score: f64,
    /// Normalized player speed, expected in `[0, 1]`.
    #[serde(default, alias = "player_speed")]
    pub speed: f64,
    /// Normalized threat proximity, expected in `[0, 1]`.
    #[serde(default)]
    pub threat_proximity: f64,
    /// Seconds since the level started.
    #[serde(default, alias = "game_time")]
    pub elapsed_time: f64,
    /// Shots fired in the recent window.
    #[serde(default, alias = "bullets_fired")]
    pub shots_fired: u32,
}

impl Default for GameTelemetry {
    fn default() -> Self {
        Self {
            health: default_health(),
            enemy_count: 0,
            score: 0.0,
            speed: 0.0,
            threat_proximity: 0.0,
            elapsed_time: 0.0,
            shots_fired: 0,
        }
    }
}

fn default_health() -> f64 {
    100.0
}

/// Discrete label emitted by the face and speech classifiers.
///
/// Parsing is total: anything unrecognised becomes [`ExpressionLabel::Other`]
/// and contributes nothing to the blend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExpressionLabel {
    /// "angry"
    Angry,
    /// "disgust"
    Disgust,
    /// "fear"
    Fear,
    /// "happy"
    Happy,
    /// "sad"
    Sad,
    /// "surprise"
    Surprise,
    /// "neutral"
    Neutral,
    /// Any other label, kept verbatim for diagnostics.
    Other(String),
}

impl ExpressionLabel {
    /// Parse a classifier label, case-insensitively.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "angry" => ExpressionLabel::Angry,
            "disgust" => ExpressionLabel::Disgust,
            "fear" => ExpressionLabel::Fear,
            "happy" => ExpressionLabel::Happy,
            "sad" => ExpressionLabel::Sad,
            "surprise" => ExpressionLabel::Surprise,
            "neutral" => ExpressionLabel::Neutral,
            _ => ExpressionLabel::Other(label.to_string()),
        }
    }

    /// Label text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            ExpressionLabel::Angry => "angry",
            ExpressionLabel::Disgust => "disgust",
            ExpressionLabel::Fear => "fear",
            ExpressionLabel::Happy => "happy",
            ExpressionLabel::Sad => "sad",
            ExpressionLabel::Surprise => "surprise",
            ExpressionLabel::Neutral => "neutral",
            ExpressionLabel::Other(s) => s,
        }
    }
}

impl From<String> for ExpressionLabel {
    fn from(s: String) -> Self {
        ExpressionLabel::parse(&s)
    }
}

impl From<ExpressionLabel> for String {
    fn from(label: ExpressionLabel) -> Self {
        label.as_str().to_string()
    }
}

/// Output of an external emotion classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledEmotion {
    /// Dominant label.
    #[serde(alias = "emotion")]
    pub label: ExpressionLabel,
    /// Classifier confidence, `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
}

impl LabeledEmotion {
    /// Create a labeled reading with confidence clamped into `[0, 1]`.
    #[must_use]
    pub fn new(label: impl AsRef<str>, confidence: f64) -> Self {
        Self {
            label: ExpressionLabel::parse(label.as_ref()),
            confidence: clamp01(confidence),
        }
    }
}

impl Default for LabeledEmotion {
    fn default() -> Self {
        Self {
            label: ExpressionLabel::Neutral,
            confidence: 0.0,
        }
    }
}

/// A single reading from any source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceReading {
    /// Gameplay telemetry.
    GameTelemetry(GameTelemetry),
    /// Classifier label + confidence.
    LabeledEmotion(LabeledEmotion),
}

impl From<GameTelemetry> for SourceReading {
    fn from(t: GameTelemetry) -> Self {
        SourceReading::GameTelemetry(t)
    }
}

impl From<LabeledEmotion> for SourceReading {
    fn from(e: LabeledEmotion) -> Self {
        SourceReading::LabeledEmotion(e)
    }
}

impl SourceReading {
    /// Decode a raw payload according to the source it arrived from.
    ///
    /// Game-state payloads are telemetry; face and speech payloads are
    /// `{label | emotion, confidence}` objects.
    ///
    /// # Errors
    /// Returns `AuraError::Serialization` if the payload does not match.
    pub fn from_json(source: SourceId, payload: serde_json::Value) -> crate::error::Result<Self> {
        Ok(match source {
            SourceId::GameState => {
                SourceReading::GameTelemetry(serde_json::from_value(payload)?)
            }
            SourceId::Face | SourceId::Speech => {
                SourceReading::LabeledEmotion(serde_json::from_value(payload)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_constructor_clamps() {
        let v = EmotionVector::new(-1.0, 2.0, 0.5, f64::NAN, 1.0);
        assert_eq!(v.tension, 0.0);
        assert_eq!(v.excitement, 1.0);
        assert_eq!(v.fear, 0.5);
        assert_eq!(v.joy, 0.0);
        assert!(v.is_bounded());
    }

    #[test]
    fn primary_prefers_first_on_tie() {
        let v = EmotionVector::new(0.4, 0.4, 0.1, 0.4, 0.0);
        assert_eq!(v.primary(), (EmotionKey::Tension, 0.4));

        let v = EmotionVector::new(0.1, 0.2, 0.3, 0.3, 0.3);
        assert_eq!(v.primary().0, EmotionKey::Fear);

        assert_eq!(EmotionVector::ZERO.primary(), (EmotionKey::Tension, 0.0));
    }

    #[test]
    fn emotion_key_parses_case_insensitively() {
        assert_eq!("Joy".parse::<EmotionKey>().ok(), Some(EmotionKey::Joy));
        assert!("boredom".parse::<EmotionKey>().is_err());
    }

    #[test]
    fn source_id_accepts_legacy_names() {
        assert_eq!("face_emotion".parse::<SourceId>().ok(), Some(SourceId::Face));
        assert!("audience".parse::<SourceId>().is_err());
    }

    #[test]
    fn expression_label_is_total() {
        assert_eq!(ExpressionLabel::parse("HAPPY"), ExpressionLabel::Happy);
        assert_eq!(
            ExpressionLabel::parse("contempt"),
            ExpressionLabel::Other("contempt".into())
        );
    }

    #[test]
    fn telemetry_accepts_game_client_field_names() {
        let json = r#"{"player_health": 80, "player_speed": 0.5, "bullets_fired": 3, "threat_proximity": 0.2}"#;
        let t: GameTelemetry = serde_json::from_str(json).expect("parse");
        assert!((t.health - 80.0).abs() < f64::EPSILON);
        assert!((t.speed - 0.5).abs() < f64::EPSILON);
        assert_eq!(t.shots_fired, 3);
    }

    #[test]
    fn labeled_reading_accepts_emotion_alias() {
        let json = r#"{"emotion": "Fear", "confidence": 0.9}"#;
        let e: LabeledEmotion = serde_json::from_str(json).expect("parse");
        assert_eq!(e.label, ExpressionLabel::Fear);
    }

    #[test]
    fn vector_serializes_with_key_names() {
        let v = EmotionVector::only(EmotionKey::Joy, 1.0);
        let json = serde_json::to_value(v).expect("serialize");
        assert_eq!(json["joy"], 1.0);
        assert_eq!(json["tension"], 0.0);
    }

    #[test]
    fn reading_from_json_by_source() {
        let game = SourceReading::from_json(
            SourceId::GameState,
            serde_json::json!({"player_health": 250, "threat_proximity": 0.4, "bullets_fired": 3}),
        )
        .expect("telemetry payload");
        let SourceReading::GameTelemetry(t) = game else {
            panic!("expected telemetry");
        };
        assert_eq!(t.health, 250.0);
        assert_eq!(t.shots_fired, 3);

        let face = SourceReading::from_json(
            SourceId::Face,
            serde_json::json!({"emotion": "Happy", "confidence": 0.7}),
        )
        .expect("label payload");
        assert_eq!(face, SourceReading::LabeledEmotion(LabeledEmotion::new("happy", 0.7)));

        let bad = SourceReading::from_json(SourceId::Speech, serde_json::json!({"confidence": 1}));
        assert!(matches!(bad, Err(AuraError::Serialization(_))));
    }
}
