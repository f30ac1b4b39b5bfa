//! Level-music cross-fader.
//!
//! The alternative to chord mode: one looped track per game state. When the
//! state changes, the outgoing loop fades to silence while the new one fades
//! in from silence, both linear in `elapsed / fade`.

use std::time::Duration;

use serde::Serialize;

use super::engine::GameStateLabel;
use crate::config::LevelMusicConfig;

/// A loop and the level it should play at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopLevel {
    /// Game state the loop belongs to.
    pub label: GameStateLabel,
    /// Audio asset path.
    pub asset: String,
    /// Playback volume.
    pub volume: f64,
}

/// Levels for the incoming and, while fading, the outgoing loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossfadeLevels {
    /// Loop fading in or already at full volume.
    pub incoming: Option<LoopLevel>,
    /// Loop fading out; `None` once silent.
    pub outgoing: Option<LoopLevel>,
    /// Whether a fade is still in progress.
    pub fading: bool,
}

#[derive(Debug, Clone)]
struct Fade {
    from: Option<(GameStateLabel, f64)>,
    to: GameStateLabel,
    started: Duration,
}

/// Tracks the active loop and the fade in progress.
#[derive(Debug, Clone)]
pub struct LoopCrossfader {
    config: LevelMusicConfig,
    fade: Option<Fade>,
}

impl LoopCrossfader {
    /// A silent fader; the first [`LoopCrossfader::update`] starts a fade-in.
    #[must_use]
    pub fn new(config: LevelMusicConfig) -> Self {
        Self { config, fade: None }
    }

    /// Loop asset for a state.
    #[must_use]
    pub fn asset(&self, label: GameStateLabel) -> &str {
        match label {
            GameStateLabel::Exploration => &self.config.exploration_asset,
            GameStateLabel::Approach => &self.config.approach_asset,
            GameStateLabel::Combat => &self.config.combat_asset,
        }
    }

    /// Current target label, if any loop was started.
    #[must_use]
    pub fn current(&self) -> Option<GameStateLabel> {
        self.fade.as_ref().map(|f| f.to)
    }

    /// Feed the current state. Returns `true` if a new fade started.
    ///
    /// The outgoing loop fades from whatever level it had reached, so a
    /// state flapping mid-fade does not jump in volume.
    pub fn update(&mut self, now: Duration, label: GameStateLabel) -> bool {
        if self.current() == Some(label) {
            return false;
        }
        let from = self.fade.as_ref().map(|f| (f.to, self.incoming_volume(f, now)));
        self.fade = Some(Fade {
            from,
            to: label,
            started: now,
        });
        true
    }

    fn fraction(&self, fade: &Fade, now: Duration) -> f64 {
        if self.config.fade_ms == 0 {
            return 1.0;
        }
        let elapsed = now.saturating_sub(fade.started).as_secs_f64() * 1000.0;
        (elapsed / self.config.fade_ms as f64).min(1.0)
    }

    fn incoming_volume(&self, fade: &Fade, now: Duration) -> f64 {
        self.fraction(fade, now) * self.config.volume
    }

    /// Volumes at `now`.
    #[must_use]
    pub fn levels(&self, now: Duration) -> CrossfadeLevels {
        let Some(fade) = &self.fade else {
            return CrossfadeLevels {
                incoming: None,
                outgoing: None,
                fading: false,
            };
        };
        let fraction = self.fraction(fade, now);
        let incoming = Some(LoopLevel {
            label: fade.to,
            asset: self.asset(fade.to).to_string(),
            volume: fraction * self.config.volume,
        });
        let outgoing = fade.from.filter(|_| fraction < 1.0).map(|(label, start)| LoopLevel {
            label,
            asset: self.asset(label).to_string(),
            volume: start * (1.0 - fraction),
        });
        CrossfadeLevels {
            incoming,
            outgoing,
            fading: fraction < 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn silent_until_first_update() {
        let fader = LoopCrossfader::new(LevelMusicConfig::default());
        let levels = fader.levels(ms(100));
        assert!(levels.incoming.is_none());
        assert!(!levels.fading);
    }

    #[test]
    fn fade_in_is_linear_to_target_volume() {
        let mut fader = LoopCrossfader::new(LevelMusicConfig::default());
        assert!(fader.update(ms(0), GameStateLabel::Exploration));
        assert!(!fader.update(ms(10), GameStateLabel::Exploration));

        let half = fader.levels(ms(250)).incoming.expect("incoming");
        assert!((half.volume - 0.4).abs() < 1e-9);
        assert_eq!(half.asset, "adaptive/Exploration.mp3");

        let done = fader.levels(ms(900));
        assert!(!done.fading);
        assert!((done.incoming.expect("incoming").volume - 0.8).abs() < 1e-9);
    }

    #[test]
    fn state_change_fades_out_previous_loop() {
        let mut fader = LoopCrossfader::new(LevelMusicConfig::default());
        fader.update(ms(0), GameStateLabel::Exploration);
        assert!(fader.update(ms(1000), GameStateLabel::Combat));

        let mid = fader.levels(ms(1250));
        let out = mid.outgoing.expect("outgoing");
        assert_eq!(out.label, GameStateLabel::Exploration);
        assert!((out.volume - 0.4).abs() < 1e-9);
        let inc = mid.incoming.expect("incoming");
        assert_eq!(inc.asset, "adaptive/Battle.mp3");
        assert!((inc.volume - 0.4).abs() < 1e-9);

        let end = fader.levels(ms(1500));
        assert!(end.outgoing.is_none());
    }

    #[test]
    fn interrupted_fade_starts_from_reached_level() {
        let mut fader = LoopCrossfader::new(LevelMusicConfig::default());
        fader.update(ms(0), GameStateLabel::Exploration);
        fader.update(ms(125), GameStateLabel::Approach);
        let out = fader.levels(ms(125)).outgoing.expect("outgoing");
        assert!((out.volume - 0.2).abs() < 1e-9);
    }
}
