//! Chord loop — drives the chord engine (or the level-music fader) on its own
//! timer, decoupled from the emotion tick.
//!
//! Reads the latest [`GameSnapshot`] from a `watch` channel and sends
//! [`PlaybackCommand`]s to the audio layer. Stops when the game-state sender
//! or the playback receiver is dropped, or when [`ChordLoopHandle::stop`] is
//! called.

use std::sync::Arc;
use std::time::Duration;

use aura_core::chord::{ChordEvent, CrossfadeLevels, LoopCrossfader, StochasticChordEngine};
use aura_core::config::AuraConfig;
use aura_core::metrics::{AuraCounters, spans};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{Level, debug, info, span};

use crate::game_state::GameSnapshot;

/// Which generative mode drives playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Markov chord walk.
    #[default]
    Chords,
    /// One looped track per game state, cross-faded.
    LevelMusic,
}

/// Instruction for the audio layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackCommand {
    /// Start a chord.
    Chord(ChordEvent),
    /// Set loop volumes.
    LoopLevels(CrossfadeLevels),
}

/// Stops a running chord loop.
#[derive(Debug)]
pub struct ChordLoopHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ChordLoopHandle {
    /// Stop the loop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.task.await;
    }

    /// Whether the loop task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

enum Driver {
    Chords(StochasticChordEngine),
    LevelMusic { fader: LoopCrossfader, was_fading: bool },
}

impl Driver {
    fn poll(&mut self, now: Duration, game: GameSnapshot, counters: &AuraCounters) -> Option<PlaybackCommand> {
        match self {
            Driver::Chords(engine) => {
                let _span = span!(Level::TRACE, spans::CHORD).entered();
                let event = engine.poll(now, game.label, game.health)?;
                AuraCounters::incr(&counters.chords_played);
                if event.borrowed {
                    AuraCounters::incr(&counters.alternate_bank_picks);
                }
                if event.family_switched {
                    AuraCounters::incr(&counters.family_switches);
                }
                Some(PlaybackCommand::Chord(event))
            }
            Driver::LevelMusic { fader, was_fading } => {
                let started = fader.update(now, game.label);
                if started {
                    debug!(label = %game.label, "Level music cross-fade started");
                }
                let levels = fader.levels(now);
                // Emit while fading plus once when a fade settles.
                let emit = started || levels.fading || *was_fading;
                *was_fading = levels.fading;
                emit.then_some(PlaybackCommand::LoopLevels(levels))
            }
        }
    }
}

/// Spawn the chord loop on the current tokio runtime.
#[must_use]
pub fn spawn(
    config: &AuraConfig,
    mode: PlaybackMode,
    game: watch::Receiver<GameSnapshot>,
    playback: mpsc::Sender<PlaybackCommand>,
    counters: Arc<AuraCounters>,
) -> ChordLoopHandle {
    let driver = match mode {
        PlaybackMode::Chords => Driver::Chords(StochasticChordEngine::with_default_banks(config.chords.clone())),
        PlaybackMode::LevelMusic => Driver::LevelMusic {
            fader: LoopCrossfader::new(config.level_music.clone()),
            was_fading: false,
        },
    };
    let poll = Duration::from_millis(config.chords.poll_interval_ms);
    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(run(driver, poll, game, playback, counters, stop_rx));
    ChordLoopHandle {
        stop: Some(stop_tx),
        task,
    }
}

async fn run(
    mut driver: Driver,
    poll: Duration,
    mut game: watch::Receiver<GameSnapshot>,
    playback: mpsc::Sender<PlaybackCommand>,
    counters: Arc<AuraCounters>,
    mut stop: oneshot::Receiver<()>,
) {
    let start = Instant::now();
    let mut ticker = time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(poll_ms = poll.as_millis() as u64, "Chord loop started");

    loop {
        tokio::select! {
            _ = &mut stop => break,
            changed = game.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let snapshot = *game.borrow();
                let Some(command) = driver.poll(start.elapsed(), snapshot, &counters) else {
                    continue;
                };
                if playback.send(command).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(chords = counters.snapshot().chords_played, "Chord loop stopped");
}
