//! Source Registry — latest reading per input source.
//!
//! Producers overwrite their own slot (last-write-wins); fusion reads every
//! slot together with its age. A source whose last update is older than the
//! staleness timeout simply drops out of the live set. Staleness is a
//! structural condition, not an error.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::types::{SourceId, SourceReading};

/// Default staleness window.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(5);

/// One stored reading with the time it was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    /// The reading as pushed by the producer.
    pub reading: SourceReading,
    /// When it was recorded.
    pub last_update: Instant,
}

impl RegistryEntry {
    /// Time since the reading was recorded, saturating at zero for
    /// timestamps in the future.
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_update)
    }
}

/// Diagnostic view of a single source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    /// Which source.
    pub source: SourceId,
    /// Whether it currently contributes to the blend.
    pub live: bool,
    /// Milliseconds since the last reading, if one was ever recorded.
    pub age_ms: Option<u64>,
    /// The last reading, if any.
    pub reading: Option<SourceReading>,
}

/// Latest reading and update time for every source.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    entries: BTreeMap<SourceId, RegistryEntry>,
}

impl SourceRegistry {
    /// Create an empty registry. Every source starts stale.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a reading stamped with the current time.
    pub fn record(&mut self, source: SourceId, reading: SourceReading) {
        self.record_at(source, reading, Instant::now());
    }

    /// Store a reading with an explicit timestamp, replacing any prior value.
    pub fn record_at(&mut self, source: SourceId, reading: SourceReading, at: Instant) {
        self.entries.insert(
            source,
            RegistryEntry {
                reading,
                last_update: at,
            },
        );
    }

    /// Entry for a source, live or not.
    #[must_use]
    pub fn get(&self, source: SourceId) -> Option<&RegistryEntry> {
        self.entries.get(&source)
    }

    /// Whether `source` reported within `timeout` of `now`.
    ///
    /// A source that never reported is stale.
    #[must_use]
    pub fn is_live(&self, source: SourceId, now: Instant, timeout: Duration) -> bool {
        self.entries
            .get(&source)
            .is_some_and(|entry| entry.age(now) <= timeout)
    }

    /// All live sources in blend order.
    #[must_use]
    pub fn live_sources(&self, now: Instant, timeout: Duration) -> Vec<SourceId> {
        SourceId::ALL
            .into_iter()
            .filter(|s| self.is_live(*s, now, timeout))
            .collect()
    }

    /// Clone of every stored reading, keyed by source.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<SourceId, SourceReading> {
        self.entries
            .iter()
            .map(|(source, entry)| (*source, entry.reading.clone()))
            .collect()
    }

    /// Per-source liveness and age for diagnostics.
    #[must_use]
    pub fn status(&self, now: Instant, timeout: Duration) -> Vec<SourceStatus> {
        SourceId::ALL
            .into_iter()
            .map(|source| {
                let entry = self.entries.get(&source);
                SourceStatus {
                    source,
                    live: self.is_live(source, now, timeout),
                    age_ms: entry.map(|e| u64::try_from(e.age(now).as_millis()).unwrap_or(u64::MAX)),
                    reading: entry.map(|e| e.reading.clone()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameTelemetry, LabeledEmotion};

    #[test]
    fn unrecorded_source_is_stale() {
        let registry = SourceRegistry::new();
        assert!(!registry.is_live(SourceId::Face, Instant::now(), DEFAULT_STALE_TIMEOUT));
    }

    #[test]
    fn liveness_expires_after_timeout() {
        let mut registry = SourceRegistry::new();
        let t0 = Instant::now();
        registry.record_at(SourceId::GameState, GameTelemetry::default().into(), t0);

        assert!(registry.is_live(SourceId::GameState, t0, DEFAULT_STALE_TIMEOUT));
        assert!(registry.is_live(
            SourceId::GameState,
            t0 + Duration::from_secs(5),
            DEFAULT_STALE_TIMEOUT
        ));
        assert!(!registry.is_live(
            SourceId::GameState,
            t0 + Duration::from_millis(5001),
            DEFAULT_STALE_TIMEOUT
        ));
    }

    #[test]
    fn last_write_wins() {
        let mut registry = SourceRegistry::new();
        let t0 = Instant::now();
        registry.record_at(SourceId::Face, LabeledEmotion::new("happy", 0.9).into(), t0);
        registry.record_at(
            SourceId::Face,
            LabeledEmotion::new("sad", 0.4).into(),
            t0 + Duration::from_millis(10),
        );

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot.get(&SourceId::Face),
            Some(&SourceReading::LabeledEmotion(LabeledEmotion::new("sad", 0.4)))
        );
    }

    #[test]
    fn live_sources_in_blend_order() {
        let mut registry = SourceRegistry::new();
        let t0 = Instant::now();
        registry.record_at(SourceId::Speech, LabeledEmotion::new("fear", 1.0).into(), t0);
        registry.record_at(SourceId::GameState, GameTelemetry::default().into(), t0);

        let live = registry.live_sources(t0, DEFAULT_STALE_TIMEOUT);
        assert_eq!(live, vec![SourceId::GameState, SourceId::Speech]);
    }

    #[test]
    fn status_reports_age_and_absence() {
        let mut registry = SourceRegistry::new();
        let t0 = Instant::now();
        registry.record_at(SourceId::Face, LabeledEmotion::new("happy", 0.5).into(), t0);

        let status = registry.status(t0 + Duration::from_millis(250), DEFAULT_STALE_TIMEOUT);
        assert_eq!(status.len(), 3);
        let face = status.iter().find(|s| s.source == SourceId::Face).expect("face");
        assert!(face.live);
        assert_eq!(face.age_ms, Some(250));
        let game = status.iter().find(|s| s.source == SourceId::GameState).expect("game");
        assert!(!game.live);
        assert!(game.age_ms.is_none());
    }
}
