//! The stochastic chord walker.
//!
//! Runs on its own clock, expressed as time elapsed since the driver started.
//! Each time the scheduled instant passes, one chord is chosen, assigned to
//! the idle playback channel and given a fresh pan / gain, and the next
//! instant is drawn from a jittered, state-dependent interval.

use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bank::{ChordBank, ChordBankSet};
use crate::config::{ChordConfig, ProximityConfig};
use crate::types::clamp01;

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// Coarse game state derived from the nearest enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStateLabel {
    /// No enemy nearby.
    #[default]
    Exploration,
    /// An enemy is closing in.
    Approach,
    /// An enemy is within striking range.
    Combat,
}

impl GameStateLabel {
    /// Bucket the nearest-enemy distance. `None` means no enemies.
    ///
    /// `d <= combat` is combat, `combat < d < approach` is approach,
    /// everything else is exploration.
    #[must_use]
    pub fn classify(nearest_enemy: Option<f64>, proximity: &ProximityConfig) -> Self {
        match nearest_enemy {
            Some(d) if d <= proximity.combat_distance => Self::Combat,
            Some(d) if d < proximity.approach_distance => Self::Approach,
            _ => Self::Exploration,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exploration => "exploration",
            Self::Approach => "approach",
            Self::Combat => "combat",
        }
    }
}

impl fmt::Display for GameStateLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which bank family and scheduling constants apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodFamily {
    /// Exploration.
    Calm,
    /// Approach.
    Approach,
    /// Combat.
    Combat,
}

impl From<GameStateLabel> for MoodFamily {
    fn from(label: GameStateLabel) -> Self {
        match label {
            GameStateLabel::Exploration => Self::Calm,
            GameStateLabel::Approach => Self::Approach,
            GameStateLabel::Combat => Self::Combat,
        }
    }
}

impl MoodFamily {
    /// Calm uses the calm banks; approach and combat share the tension banks.
    #[must_use]
    pub fn is_calm(self) -> bool {
        matches!(self, Self::Calm)
    }
}

/// One of the two alternating playback channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Channel {
    /// First channel.
    A,
    /// Second channel.
    B,
}

impl Channel {
    /// The other channel.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

// ---------------------------------------------------------------------------
// Events and state
// ---------------------------------------------------------------------------

/// A chord the playback layer should start now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChordEvent {
    /// Family the chord was drawn for.
    pub family: MoodFamily,
    /// Bank it came from.
    pub bank: String,
    /// Whether the alternate bank was borrowed from.
    pub borrowed: bool,
    /// Whether this advance crossed the calm / tension boundary.
    pub family_switched: bool,
    /// Index within the bank.
    pub chord_index: usize,
    /// Chord name.
    pub chord: String,
    /// Audio asset path.
    pub asset: String,
    /// Channel to play on.
    pub channel: Channel,
    /// Stereo pan, `[-pan_spread, pan_spread]`.
    pub pan: f64,
    /// Overall gain, `[gain_min, gain_max]`.
    pub gain: f64,
    /// Left channel level.
    pub left: f64,
    /// Right channel level.
    pub right: f64,
    /// When the chord was due.
    pub at: Duration,
    /// When the next chord is due.
    pub next_at: Duration,
}

/// State carried between advances.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordEngineState {
    /// Last chosen index; wrapped into whichever bank is used next.
    pub current_index: usize,
    /// Channel of the last chord; `None` before the first.
    pub channel: Option<Channel>,
    /// When the next chord is due.
    pub next_at: Duration,
    /// Label seen at the last advance.
    pub label: Option<GameStateLabel>,
    /// Latched calm / tension flag.
    pub is_calm: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Base interval before jitter for a state and health.
#[must_use]
pub fn base_interval(label: GameStateLabel, health: f64, config: &ChordConfig) -> Duration {
    let ms = match label {
        GameStateLabel::Combat if health <= config.low_health_threshold => {
            config.combat_low_health_interval_ms
        }
        GameStateLabel::Combat => config.combat_interval_ms,
        GameStateLabel::Approach => config.approach_interval_ms,
        GameStateLabel::Exploration => config.calm_interval_ms,
    };
    Duration::from_millis(ms)
}

fn family_banks(banks: &ChordBankSet, family: MoodFamily) -> (&ChordBank, &ChordBank) {
    if family.is_calm() {
        (&banks.calm, &banks.calm_low)
    } else {
        (&banks.tension, &banks.tension_turbo)
    }
}

/// Markov-chain chord generator with its own RNG stream.
#[derive(Debug, Clone)]
pub struct StochasticChordEngine {
    config: ChordConfig,
    banks: ChordBankSet,
    state: ChordEngineState,
    rng: StdRng,
}

impl StochasticChordEngine {
    /// Create an engine over `banks`. The first chord is due after
    /// `initial_delay_ms`.
    #[must_use]
    pub fn new(config: ChordConfig, banks: ChordBankSet) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = ChordEngineState {
            current_index: 0,
            channel: None,
            next_at: Duration::from_millis(config.initial_delay_ms),
            label: None,
            is_calm: true,
        };
        Self {
            config,
            banks,
            state,
            rng,
        }
    }

    /// Engine over the built-in banks.
    #[must_use]
    pub fn with_default_banks(config: ChordConfig) -> Self {
        Self::new(config, ChordBankSet::default())
    }

    /// Inspect the carried state.
    #[must_use]
    pub fn state(&self) -> &ChordEngineState {
        &self.state
    }

    /// When the next chord is due.
    #[must_use]
    pub fn next_due(&self) -> Duration {
        self.state.next_at
    }

    /// Primary and alternate bank for a family.
    #[must_use]
    pub fn banks_for(&self, family: MoodFamily) -> (&ChordBank, &ChordBank) {
        family_banks(&self.banks, family)
    }

    fn alternate_probability(&self, family: MoodFamily) -> f64 {
        match family {
            MoodFamily::Calm => self.config.calm_alternate_probability,
            MoodFamily::Approach => self.config.approach_alternate_probability,
            MoodFamily::Combat => self.config.combat_alternate_probability,
        }
    }

    /// Advance if a chord is due at `now`; otherwise `None`.
    pub fn poll(&mut self, now: Duration, label: GameStateLabel, health: f64) -> Option<ChordEvent> {
        if now < self.state.next_at {
            return None;
        }
        Some(self.advance(now, label, health))
    }

    /// Choose, place and schedule one chord unconditionally.
    pub fn advance(&mut self, now: Duration, label: GameStateLabel, health: f64) -> ChordEvent {
        let family = MoodFamily::from(label);

        let family_switched = family.is_calm() != self.state.is_calm;
        if family_switched {
            self.state.is_calm = family.is_calm();
            let primary_len = self.banks_for(family).0.len().max(1);
            self.state.current_index %= primary_len;
            debug!(
                family = ?family,
                index = self.state.current_index,
                "Chord family switched"
            );
        }
        self.state.label = Some(label);

        let borrowed = self.rng.r#gen::<f64>() < self.alternate_probability(family);
        let epsilon = self.config.epsilon;
        let current = self.state.current_index;
        let (bank_name, chord_index, chord, asset) = {
            let (primary, alternate) = family_banks(&self.banks, family);
            let bank = if borrowed { alternate } else { primary };
            let from = bank.wrap(current);
            let next = bank.next_index(from, epsilon, &mut self.rng);
            (bank.name().to_string(), next, bank.chord(next).to_string(), bank.asset(next))
        };
        self.state.current_index = chord_index;

        let channel = self.state.channel.map_or(Channel::A, Channel::other);
        self.state.channel = Some(channel);

        let gain = self.config.gain_min + self.rng.r#gen::<f64>() * (self.config.gain_max - self.config.gain_min);
        let pan = (self.rng.r#gen::<f64>() - 0.5) * 2.0 * self.config.pan_spread;

        let jitter = if self.config.jitter_ms > 0 {
            self.rng.gen_range(-self.config.jitter_ms..=self.config.jitter_ms)
        } else {
            0
        };
        let base = i64::try_from(base_interval(label, health, &self.config).as_millis()).unwrap_or(i64::MAX);
        let offset = base.saturating_add(jitter);
        let scheduled = if offset >= 0 {
            now.saturating_add(Duration::from_millis(offset.unsigned_abs()))
        } else {
            now.saturating_sub(Duration::from_millis(offset.unsigned_abs()))
        };
        // Floors the absolute schedule, so it only bites right after start.
        let next_at = scheduled.max(Duration::from_millis(self.config.min_interval_ms));
        self.state.next_at = next_at;

        ChordEvent {
            family,
            bank: bank_name,
            borrowed,
            family_switched,
            chord_index,
            chord,
            asset,
            channel,
            pan,
            gain,
            left: clamp01(gain * (1.0 - pan)),
            right: clamp01(gain * (1.0 + pan)),
            at: now,
            next_at,
        }
    }
}
