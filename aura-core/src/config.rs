//! Configuration for the AURA pipeline.
//!
//! Maps directly to `aura.toml`. Every section and field has a default, so an
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::AuraError;
use crate::types::EmotionKey;

/// Top-level AURA configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuraConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Source liveness and blend weights.
    #[serde(default)]
    pub fusion: FusionConfig,
    /// Tempo, structure and effect planning.
    #[serde(default)]
    pub modulation: ModulationConfig,
    /// Tick loop cadence and channel sizing.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Stochastic chord engine tuning.
    #[serde(default)]
    pub chords: ChordConfig,
    /// Looped level-music cross-fades.
    #[serde(default)]
    pub level_music: LevelMusicConfig,
    /// Enemy-distance buckets for the coarse game state.
    #[serde(default)]
    pub proximity: ProximityConfig,
}

impl AuraConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `AuraError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| AuraError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    /// Returns `AuraError::Config` naming the first offending field.
    pub fn validate(&self) -> crate::error::Result<()> {
        let m = &self.modulation;
        if !(m.smoothing_alpha > 0.0 && m.smoothing_alpha <= 1.0) {
            return Err(config_err("modulation.smoothing_alpha must be in (0, 1]"));
        }
        if m.default_base_tempo <= 0.0 || !m.default_base_tempo.is_finite() {
            return Err(config_err("modulation.default_base_tempo must be positive"));
        }
        if m.section_beats == 0 || m.phrase_beats == 0 {
            return Err(config_err("modulation beat lengths must be non-zero"));
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(config_err("scheduler.tick_interval_ms must be non-zero"));
        }
        if self.scheduler.broadcast_capacity == 0 || self.scheduler.command_capacity == 0 {
            return Err(config_err("scheduler channel capacities must be non-zero"));
        }
        let c = &self.chords;
        if !(c.epsilon > 0.0 && c.epsilon.is_finite()) {
            return Err(config_err("chords.epsilon must be positive"));
        }
        if c.gain_min > c.gain_max {
            return Err(config_err("chords.gain_min must not exceed chords.gain_max"));
        }
        if c.poll_interval_ms == 0 {
            return Err(config_err("chords.poll_interval_ms must be non-zero"));
        }
        if self.proximity.combat_distance >= self.proximity.approach_distance {
            return Err(config_err(
                "proximity.combat_distance must be below proximity.approach_distance",
            ));
        }
        Ok(())
    }
}

fn config_err(msg: &str) -> AuraError {
    AuraError::Config(msg.to_string())
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Source liveness and initial blend weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// A source older than this is excluded from the blend.
    #[serde(default = "default_5000")]
    pub stale_timeout_ms: u64,
    /// Initial weights; mutable at runtime.
    #[serde(default)]
    pub weights: WeightDefaults,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            stale_timeout_ms: 5000,
            weights: WeightDefaults::default(),
        }
    }
}

/// Initial per-source blend weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightDefaults {
    /// Gameplay telemetry weight.
    #[serde(default = "default_0_8")]
    pub game_state: f64,
    /// Face classifier weight.
    #[serde(default = "default_0_1")]
    pub face: f64,
    /// Speech classifier weight.
    #[serde(default = "default_0_1")]
    pub speech: f64,
    /// Audience weight. Stored and reported but never blended.
    #[serde(default)]
    pub audience: f64,
}

impl Default for WeightDefaults {
    fn default() -> Self {
        Self {
            game_state: 0.8,
            face: 0.1,
            speech: 0.1,
            audience: 0.0,
        }
    }
}

/// Tempo, structure and effect planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulationConfig {
    /// Exponential smoothing factor for tempo (higher = more responsive).
    #[serde(default = "default_0_15")]
    pub smoothing_alpha: f64,
    /// Tempo assumed for a loaded track until tempo detection exists.
    #[serde(default = "default_120")]
    pub default_base_tempo: f64,
    /// Beats per structural section.
    #[serde(default = "default_32")]
    pub section_beats: u32,
    /// Beats per phrase.
    #[serde(default = "default_8")]
    pub phrase_beats: u32,
    /// Per-emotion tempo multiplier ranges.
    #[serde(default)]
    pub tempo_ranges: TempoRanges,
}

impl Default for ModulationConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.15,
            default_base_tempo: 120.0,
            section_beats: 32,
            phrase_beats: 8,
            tempo_ranges: TempoRanges::default(),
        }
    }
}

/// A `(min, max)` tempo multiplier pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoRange {
    /// Multiplier at zero intensity.
    pub min: f64,
    /// Multiplier at full intensity.
    pub max: f64,
}

impl TempoRange {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Interpolate the multiplier for an intensity in `[0, 1]`.
    #[must_use]
    pub fn multiplier(&self, intensity: f64) -> f64 {
        self.min + (self.max - self.min) * intensity
    }
}

/// Tempo multiplier range per primary emotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoRanges {
    /// Speed up noticeably.
    #[serde(default = "default_excitement_range")]
    pub excitement: TempoRange,
    /// Mild push.
    #[serde(default = "default_tension_range")]
    pub tension: TempoRange,
    /// Either side of the base rate.
    #[serde(default = "default_fear_range")]
    pub fear: TempoRange,
    /// Slight lift.
    #[serde(default = "default_joy_range")]
    pub joy: TempoRange,
    /// Slow down.
    #[serde(default = "default_calm_range")]
    pub calm: TempoRange,
}

impl TempoRanges {
    /// Range for a given primary emotion.
    #[must_use]
    pub fn for_key(&self, key: EmotionKey) -> TempoRange {
        match key {
            EmotionKey::Excitement => self.excitement,
            EmotionKey::Tension => self.tension,
            EmotionKey::Fear => self.fear,
            EmotionKey::Joy => self.joy,
            EmotionKey::Calm => self.calm,
        }
    }
}

impl Default for TempoRanges {
    fn default() -> Self {
        Self {
            excitement: default_excitement_range(),
            tension: default_tension_range(),
            fear: default_fear_range(),
            joy: default_joy_range(),
            calm: default_calm_range(),
        }
    }
}

/// Tick loop cadence and channel sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Milliseconds between fusion ticks (500 = 2 Hz).
    #[serde(default = "default_500")]
    pub tick_interval_ms: u64,
    /// Emit a heartbeat log line every N ticks.
    #[serde(default = "default_40")]
    pub heartbeat_every_ticks: u64,
    /// Buffered updates per subscriber before the slowest one lags.
    #[serde(default = "default_16")]
    pub broadcast_capacity: usize,
    /// Pending commands before producers wait.
    #[serde(default = "default_256")]
    pub command_capacity: usize,
    /// Log any tick that takes longer than this.
    #[serde(default = "default_5_0")]
    pub tick_budget_ms: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            heartbeat_every_ticks: 40,
            broadcast_capacity: 16,
            command_capacity: 256,
            tick_budget_ms: 5.0,
        }
    }
}

/// Stochastic chord engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChordConfig {
    /// Additive smoothing applied to every transition row.
    #[serde(default = "default_0_03")]
    pub epsilon: f64,
    /// Chance of borrowing from the alternate bank while exploring.
    #[serde(default = "default_0_2")]
    pub calm_alternate_probability: f64,
    /// Chance of borrowing from the alternate bank on approach.
    #[serde(default = "default_0_15")]
    pub approach_alternate_probability: f64,
    /// Chance of borrowing from the alternate bank in combat.
    #[serde(default = "default_0_2")]
    pub combat_alternate_probability: f64,
    /// Base interval in combat with low health.
    #[serde(default = "default_300")]
    pub combat_low_health_interval_ms: u64,
    /// Base interval in combat.
    #[serde(default = "default_400")]
    pub combat_interval_ms: u64,
    /// Base interval on approach.
    #[serde(default = "default_450")]
    pub approach_interval_ms: u64,
    /// Base interval while exploring.
    #[serde(default = "default_500")]
    pub calm_interval_ms: u64,
    /// Uniform jitter half-width applied to each interval.
    #[serde(default = "default_120_i64")]
    pub jitter_ms: i64,
    /// Floor for the next scheduled time.
    #[serde(default = "default_200")]
    pub min_interval_ms: u64,
    /// Delay before the first chord.
    #[serde(default = "default_650")]
    pub initial_delay_ms: u64,
    /// Health at or below which combat uses the fastest interval.
    #[serde(default = "default_400_f64")]
    pub low_health_threshold: f64,
    /// Maximum absolute stereo pan per chord.
    #[serde(default = "default_0_25")]
    pub pan_spread: f64,
    /// Lowest per-chord gain.
    #[serde(default = "default_0_65")]
    pub gain_min: f64,
    /// Highest per-chord gain.
    #[serde(default = "default_1_0")]
    pub gain_max: f64,
    /// How often the driver loop checks whether a chord is due.
    #[serde(default = "default_20")]
    pub poll_interval_ms: u64,
    /// Seed for the chord engine RNG. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.03,
            calm_alternate_probability: 0.2,
            approach_alternate_probability: 0.15,
            combat_alternate_probability: 0.2,
            combat_low_health_interval_ms: 300,
            combat_interval_ms: 400,
            approach_interval_ms: 450,
            calm_interval_ms: 500,
            jitter_ms: 120,
            min_interval_ms: 200,
            initial_delay_ms: 650,
            low_health_threshold: 400.0,
            pan_spread: 0.25,
            gain_min: 0.65,
            gain_max: 1.0,
            poll_interval_ms: 20,
            seed: None,
        }
    }
}

/// Looped level-music settings (the non-chord playback mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelMusicConfig {
    /// Cross-fade duration between loops.
    #[serde(default = "default_500")]
    pub fade_ms: u64,
    /// Full playback volume once faded in.
    #[serde(default = "default_0_8")]
    pub volume: f64,
    /// Loop played while exploring.
    #[serde(default = "default_exploration_loop")]
    pub exploration_asset: String,
    /// Loop played on approach.
    #[serde(default = "default_approach_loop")]
    pub approach_asset: String,
    /// Loop played in combat.
    #[serde(default = "default_combat_loop")]
    pub combat_asset: String,
}

impl Default for LevelMusicConfig {
    fn default() -> Self {
        Self {
            fade_ms: 500,
            volume: 0.8,
            exploration_asset: default_exploration_loop(),
            approach_asset: default_approach_loop(),
            combat_asset: default_combat_loop(),
        }
    }
}

/// Nearest-enemy distance thresholds (world units).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Below this distance the player is approaching an enemy.
    #[serde(default = "default_400_f64")]
    pub approach_distance: f64,
    /// At or below this distance the player is in combat.
    #[serde(default = "default_200_f64")]
    pub combat_distance: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            approach_distance: 400.0,
            combat_distance: 200.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_log_level() -> String { "info".to_string() }
fn default_exploration_loop() -> String { "adaptive/Exploration.mp3".to_string() }
fn default_approach_loop() -> String { "adaptive/Enemy.mp3".to_string() }
fn default_combat_loop() -> String { "adaptive/Battle.mp3".to_string() }
fn default_excitement_range() -> TempoRange { TempoRange::new(1.10, 1.40) }
fn default_tension_range() -> TempoRange { TempoRange::new(1.05, 1.25) }
fn default_fear_range() -> TempoRange { TempoRange::new(0.90, 1.10) }
fn default_joy_range() -> TempoRange { TempoRange::new(1.00, 1.20) }
fn default_calm_range() -> TempoRange { TempoRange::new(0.80, 0.95) }
fn default_0_03() -> f64 { 0.03 }
fn default_0_1() -> f64 { 0.1 }
fn default_0_15() -> f64 { 0.15 }
fn default_0_2() -> f64 { 0.2 }
fn default_0_25() -> f64 { 0.25 }
fn default_0_65() -> f64 { 0.65 }
fn default_0_8() -> f64 { 0.8 }
fn default_1_0() -> f64 { 1.0 }
fn default_5_0() -> f64 { 5.0 }
fn default_120() -> f64 { 120.0 }
fn default_120_i64() -> i64 { 120 }
fn default_200_f64() -> f64 { 200.0 }
fn default_400_f64() -> f64 { 400.0 }
fn default_8() -> u32 { 8 }
fn default_16() -> usize { 16 }
fn default_20() -> u64 { 20 }
fn default_32() -> u32 { 32 }
fn default_40() -> u64 { 40 }
fn default_200() -> u64 { 200 }
fn default_256() -> usize { 256 }
fn default_300() -> u64 { 300 }
fn default_400() -> u64 { 400 }
fn default_450() -> u64 { 450 }
fn default_500() -> u64 { 500 }
fn default_650() -> u64 { 650 }
fn default_5000() -> u64 { 5000 }
