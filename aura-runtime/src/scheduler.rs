//! Tick Scheduler — the orchestrator task and its handle.
//!
//! One tokio task owns the [`AuraState`]. Producers and controllers talk to it
//! through an [`AuraHandle`] over a bounded command channel; every tick the
//! task fuses, plans and broadcasts an [`AuraUpdate`].
//!
//! ```text
//!  producers ──┐                    ┌──► subscriber
//!  controllers ┼─► mpsc ─► task ─► broadcast ──► subscriber
//!  interval ───┘   (commands) (tick)
//! ```
//!
//! Commands and ticks are handled strictly one at a time, so a tick never
//! sees a half-applied write. Shutdown stops the loop after the command or
//! tick in progress completes; no update is published after it returns.

use std::sync::Arc;
use std::time::Duration;

use aura_core::config::{AuraConfig, SchedulerConfig};
use aura_core::fusion::FieldWrite;
use aura_core::metrics::{AuraCounters, CounterSnapshot, TickBudgetMonitor, spans};
use aura_core::modulation::TrackInfo;
use aura_core::types::{EmotionKey, SourceId, SourceReading};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{Level, debug, info, span, warn};

use crate::error::Result;
use crate::payload::{AuraUpdate, Diagnostics};
use crate::service::AuraState;

/// Messages accepted by the orchestrator task.
#[derive(Debug)]
enum Command {
    Reading {
        source: SourceId,
        reading: SourceReading,
        at: Option<std::time::Instant>,
    },
    Vote {
        mood: EmotionKey,
        reply: oneshot::Sender<u64>,
    },
    SetWeights {
        partial: Value,
        reply: oneshot::Sender<Vec<FieldWrite>>,
    },
    SetOverride {
        active: bool,
        vector: Option<Value>,
        reply: oneshot::Sender<Vec<FieldWrite>>,
    },
    LoadTrack(TrackInfo),
    UnloadTrack,
    Diagnostics {
        reply: oneshot::Sender<Diagnostics>,
    },
    Shutdown,
}

/// Cloneable handle to a running orchestrator.
#[derive(Debug, Clone)]
pub struct AuraHandle {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<AuraUpdate>,
    counters: Arc<AuraCounters>,
}

impl AuraHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(build(tx)).await?;
        Ok(rx.await?)
    }

    /// Receive every update published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuraUpdate> {
        self.updates.subscribe()
    }

    /// Push a reading; it is timestamped when the task receives it.
    ///
    /// # Errors
    /// `ServiceStopped` if the task has exited.
    pub async fn register_reading(&self, source: SourceId, reading: SourceReading) -> Result<()> {
        self.send_reading(source, reading, None).await
    }

    /// Push a reading stamped with the time the transport received it.
    ///
    /// Staleness is measured from `at`, so a reading that sat in a queue
    /// expires on schedule.
    ///
    /// # Errors
    /// `ServiceStopped` if the task has exited.
    pub async fn register_reading_at(
        &self,
        source: SourceId,
        reading: SourceReading,
        at: std::time::Instant,
    ) -> Result<()> {
        self.send_reading(source, reading, Some(at)).await
    }

    async fn send_reading(
        &self,
        source: SourceId,
        reading: SourceReading,
        at: Option<std::time::Instant>,
    ) -> Result<()> {
        self.commands.send(Command::Reading { source, reading, at }).await?;
        Ok(())
    }

    /// Decode and push a raw reading from the transport layer.
    ///
    /// # Errors
    /// `Core(UnknownSource | Serialization)` for an invalid payload, or
    /// `ServiceStopped`.
    pub async fn register_json(&self, source: &str, payload: Value) -> Result<()> {
        let source: SourceId = source.parse()?;
        let reading = SourceReading::from_json(source, payload)?;
        self.register_reading(source, reading).await
    }

    /// Count one audience vote and return the updated tally for that mood.
    ///
    /// # Errors
    /// `Core(UnknownEmotion)` for a mood outside the key set, or
    /// `ServiceStopped`.
    pub async fn register_audience_vote(&self, mood: &str) -> Result<u64> {
        let mood: EmotionKey = mood.parse()?;
        self.request(|reply| Command::Vote { mood, reply }).await
    }

    /// Apply a partial `{source: weight}` map. Each key reports its outcome.
    ///
    /// # Errors
    /// `ServiceStopped` if the task has exited.
    pub async fn set_weights(&self, partial: Value) -> Result<Vec<FieldWrite>> {
        self.request(|reply| Command::SetWeights { partial, reply }).await
    }

    /// Toggle the manual override, optionally patching its vector.
    ///
    /// # Errors
    /// `ServiceStopped` if the task has exited.
    pub async fn set_override(&self, active: bool, vector: Option<Value>) -> Result<Vec<FieldWrite>> {
        self.request(|reply| Command::SetOverride {
            active,
            vector,
            reply,
        })
        .await
    }

    /// Start modulating a track.
    ///
    /// # Errors
    /// `ServiceStopped` if the task has exited.
    pub async fn load_track(&self, track: TrackInfo) -> Result<()> {
        self.commands.send(Command::LoadTrack(track)).await?;
        Ok(())
    }

    /// Stop modulating.
    ///
    /// # Errors
    /// `ServiceStopped` if the task has exited.
    pub async fn unload_track(&self) -> Result<()> {
        self.commands.send(Command::UnloadTrack).await?;
        Ok(())
    }

    /// Current diagnostics without waiting for the next tick.
    ///
    /// # Errors
    /// `ServiceStopped` if the task has exited.
    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        self.request(|reply| Command::Diagnostics { reply }).await
    }

    /// Counter values; readable even after shutdown.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// The counters themselves, for sharing with the chord loop.
    #[must_use]
    pub fn shared_counters(&self) -> Arc<AuraCounters> {
        Arc::clone(&self.counters)
    }

    /// Ask the task to stop after the work in progress.
    ///
    /// # Errors
    /// `ServiceStopped` if it already has.
    pub async fn shutdown(&self) -> Result<()> {
        self.commands.send(Command::Shutdown).await?;
        Ok(())
    }

    /// Whether the task still accepts commands.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Spawn the orchestrator on the current tokio runtime.
///
/// The task runs until [`AuraHandle::shutdown`] is called or every handle is
/// dropped.
#[must_use]
pub fn spawn(config: &AuraConfig) -> (AuraHandle, JoinHandle<()>) {
    let counters = Arc::new(AuraCounters::new());
    let (commands, rx) = mpsc::channel(config.scheduler.command_capacity);
    let (updates, _) = broadcast::channel(config.scheduler.broadcast_capacity);

    let state = AuraState::new(config, Arc::clone(&counters));
    let task = tokio::spawn(run(
        state,
        rx,
        updates.clone(),
        config.scheduler.clone(),
        Arc::clone(&counters),
    ));

    (
        AuraHandle {
            commands,
            updates,
            counters,
        },
        task,
    )
}

async fn run(
    mut state: AuraState,
    mut commands: mpsc::Receiver<Command>,
    updates: broadcast::Sender<AuraUpdate>,
    config: SchedulerConfig,
    counters: Arc<AuraCounters>,
) {
    let period = Duration::from_millis(config.tick_interval_ms);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let monitor = TickBudgetMonitor::new(config.tick_budget_ms);

    info!(
        tick_interval_ms = config.tick_interval_ms,
        heartbeat_every_ticks = config.heartbeat_every_ticks,
        "AURA scheduler started"
    );

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => break,
                Some(command) => handle_command(&mut state, command),
            },

            _ = ticker.tick() => {
                tick(&mut state, &updates, &config, &monitor, &counters);
            }
        }
    }

    let pct = monitor.percentiles();
    info!(
        ticks = state.sequence(),
        timing = %pct.summary(monitor.budget_ms()),
        "AURA scheduler stopped"
    );
}

fn handle_command(state: &mut AuraState, command: Command) {
    match command {
        Command::Reading { source, reading, at } => {
            let at = at.unwrap_or_else(|| Instant::now().into_std());
            state.record_reading(source, reading, at);
        }
        Command::Vote { mood, reply } => {
            let _ = reply.send(state.vote(mood));
        }
        Command::SetWeights { partial, reply } => {
            let _ = reply.send(state.set_weights(&partial));
        }
        Command::SetOverride {
            active,
            vector,
            reply,
        } => {
            let _ = reply.send(state.set_override(active, vector.as_ref()));
        }
        Command::LoadTrack(track) => state.load_track(track),
        Command::UnloadTrack => state.unload_track(),
        Command::Diagnostics { reply } => {
            let _ = reply.send(state.snapshot(Instant::now().into_std()));
        }
        Command::Shutdown => {}
    }
}

fn tick(
    state: &mut AuraState,
    updates: &broadcast::Sender<AuraUpdate>,
    config: &SchedulerConfig,
    monitor: &TickBudgetMonitor,
    counters: &AuraCounters,
) {
    let _span = span!(Level::DEBUG, spans::TICK).entered();

    let guard = monitor.begin_tick();
    let update = state.tick(Instant::now().into_std());
    let elapsed_ms = guard.elapsed_ms();
    drop(guard);
    if elapsed_ms > config.tick_budget_ms {
        warn!(
            sequence = update.sequence,
            elapsed_ms,
            budget_ms = config.tick_budget_ms,
            "Tick exceeded budget"
        );
    }

    if config.heartbeat_every_ticks > 0 && update.sequence % config.heartbeat_every_ticks == 0 {
        info!(
            sequence = update.sequence,
            live = ?update.diagnostics.live_sources,
            emotions = ?update.emotions,
            track = ?update.track_name,
            "AURA heartbeat"
        );
    }

    let _publish = span!(Level::TRACE, spans::PUBLISH).entered();
    let sequence = update.sequence;
    match updates.send(update) {
        Ok(receivers) => {
            AuraCounters::incr(&counters.publishes);
            debug!(sequence, receivers, "Published update");
        }
        Err(_) => debug!(sequence, "No subscribers for update"),
    }
}
