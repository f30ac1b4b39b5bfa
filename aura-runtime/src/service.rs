//! Orchestrator state — the single owner of all fusion and planning state.
//!
//! Nothing here is shared: the scheduler task owns one [`AuraState`] and
//! applies commands and ticks to it in arrival order, so a tick always sees
//! one consistent registry snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aura_core::config::AuraConfig;
use aura_core::fusion::{
    AudienceTally, EmotionFusionEngine, FieldWrite, Fusion, ManualOverride, WeightTable,
};
use aura_core::metrics::{AuraCounters, spans};
use aura_core::modulation::{ModulationPlanner, TrackInfo};
use aura_core::registry::SourceRegistry;
use aura_core::types::{EmotionKey, SourceId, SourceReading};
use chrono::Utc;
use serde_json::Value;
use tracing::{Level, debug, info, span};

use crate::payload::{AuraUpdate, Diagnostics, LegacyHints};

/// Registry, weights, override, tally, planner and loaded track.
#[derive(Debug)]
pub struct AuraState {
    registry: SourceRegistry,
    weights: WeightTable,
    manual: ManualOverride,
    tally: AudienceTally,
    engine: EmotionFusionEngine,
    planner: ModulationPlanner,
    track: Option<TrackInfo>,
    sequence: u64,
    counters: Arc<AuraCounters>,
}

impl AuraState {
    /// Fresh state from configuration.
    #[must_use]
    pub fn new(config: &AuraConfig, counters: Arc<AuraCounters>) -> Self {
        Self {
            registry: SourceRegistry::new(),
            weights: WeightTable::from_config(&config.fusion.weights),
            manual: ManualOverride::default(),
            tally: AudienceTally::new(),
            engine: EmotionFusionEngine::new(Duration::from_millis(config.fusion.stale_timeout_ms)),
            planner: ModulationPlanner::new(config.modulation.clone()),
            track: None,
            sequence: 0,
            counters,
        }
    }

    /// Store a reading for `source` as of `at`.
    pub fn record_reading(&mut self, source: SourceId, reading: SourceReading, at: Instant) {
        self.registry.record_at(source, reading, at);
        AuraCounters::incr(&self.counters.readings_recorded);
    }

    /// Tally one vote and return the new count for that mood.
    pub fn vote(&mut self, mood: EmotionKey) -> u64 {
        AuraCounters::incr(&self.counters.votes);
        self.tally.vote(mood)
    }

    /// Apply a partial weight map.
    pub fn set_weights(&mut self, partial: &Value) -> Vec<FieldWrite> {
        let writes = self.weights.apply_json(partial);
        self.count_rejections(&writes);
        writes
    }

    /// Toggle the override and optionally patch its vector.
    pub fn set_override(&mut self, active: bool, vector: Option<&Value>) -> Vec<FieldWrite> {
        let was_active = self.manual.active;
        let writes = self.manual.apply_json(active, vector);
        self.count_rejections(&writes);
        if was_active != active {
            info!(active, vector = ?self.manual.vector, "Manual override toggled");
        }
        writes
    }

    fn count_rejections(&self, writes: &[FieldWrite]) {
        for write in writes.iter().filter(|w| !w.outcome.is_stored()) {
            debug!(key = %write.key, "Counting rejected write");
            AuraCounters::incr(&self.counters.rejected_writes);
        }
    }

    /// Start modulating `track`.
    pub fn load_track(&mut self, track: TrackInfo) {
        info!(name = %track.name, base_tempo = track.base_tempo, "Track loaded");
        self.track = Some(track);
    }

    /// Stop modulating; ticks publish no descriptor until a track is loaded.
    pub fn unload_track(&mut self) {
        if let Some(track) = self.track.take() {
            info!(name = %track.name, "Track unloaded");
        }
    }

    /// The loaded track.
    #[must_use]
    pub fn track(&self) -> Option<&TrackInfo> {
        self.track.as_ref()
    }

    /// Ticks computed so far.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn diagnostics(&self, fusion: &Fusion, now: Instant) -> Diagnostics {
        Diagnostics {
            live_sources: fusion.live_sources.clone(),
            effective_weights: fusion.effective_weights.clone(),
            weights: self.weights.clone(),
            audience_tally: self.tally.counts(),
            audience_ratios: self.tally.ratios(),
            override_state: self.manual.clone(),
            sources: self.registry.status(now, self.engine.stale_timeout()),
            counters: self.counters.snapshot(),
        }
    }

    /// Diagnostics as of `now` without advancing the planner.
    #[must_use]
    pub fn snapshot(&self, now: Instant) -> Diagnostics {
        let fusion = self
            .engine
            .fuse_detailed(&self.registry, &self.weights, &self.manual, now);
        self.diagnostics(&fusion, now)
    }

    /// One fusion + planning pass.
    pub fn tick(&mut self, now: Instant) -> AuraUpdate {
        self.sequence += 1;
        AuraCounters::incr(&self.counters.ticks);

        let fusion = {
            let _span = span!(Level::TRACE, spans::FUSE).entered();
            self.engine
                .fuse_detailed(&self.registry, &self.weights, &self.manual, now)
        };
        let modulation = {
            let _span = span!(Level::TRACE, spans::PLAN).entered();
            self.planner.plan(&fusion.vector, self.track.as_ref(), now)
        };

        AuraUpdate {
            sequence: self.sequence,
            timestamp: Utc::now(),
            emotions: fusion.vector,
            hints: LegacyHints::from_vector(&fusion.vector),
            track_name: self.track.as_ref().map(|t| t.name.clone()),
            tempo_multiplier: modulation.as_ref().map(|d| d.tempo_multiplier),
            modulation,
            diagnostics: self.diagnostics(&fusion, now),
        }
    }
}
