//! Coarse game-state classification for the chord loop.
//!
//! The game loop classifies once per frame and publishes an immutable
//! [`GameSnapshot`] over a `watch` channel; the chord loop only ever reads
//! the latest value.

use aura_core::chord::GameStateLabel;
use aura_core::config::ProximityConfig;
use serde::Serialize;
use tokio::sync::watch;

/// What the chord engine needs from the game each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GameSnapshot {
    /// Proximity bucket.
    pub label: GameStateLabel,
    /// Player hit points.
    pub health: f64,
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self {
            label: GameStateLabel::Exploration,
            health: 1000.0,
        }
    }
}

impl GameSnapshot {
    /// Classify from world positions.
    #[must_use]
    pub fn from_positions(
        player: (f64, f64),
        enemies: &[(f64, f64)],
        health: f64,
        proximity: &ProximityConfig,
    ) -> Self {
        Self {
            label: GameStateLabel::classify(nearest_enemy(player, enemies), proximity),
            health,
        }
    }
}

/// Euclidean distance to the closest enemy, `None` when there are none.
#[must_use]
pub fn nearest_enemy(player: (f64, f64), enemies: &[(f64, f64)]) -> Option<f64> {
    enemies
        .iter()
        .map(|(x, y)| (x - player.0).hypot(y - player.1))
        .min_by(f64::total_cmp)
}

/// Channel the game loop publishes snapshots on.
#[must_use]
pub fn channel(initial: GameSnapshot) -> (watch::Sender<GameSnapshot>, watch::Receiver<GameSnapshot>) {
    watch::channel(initial)
}
