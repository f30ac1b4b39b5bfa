//! Runtime Metrics & Instrumentation
//!
//! Lock-free counters for pipeline events and a tick-budget monitor for the
//! scheduler loop. Counters are bumped on the hot path with relaxed atomics
//! and exported as Prometheus text on demand; tick timings go into a small
//! ring buffer behind `parking_lot::Mutex`, read rarely.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters for pipeline events.
#[derive(Debug)]
pub struct AuraCounters {
    /// Scheduler ticks completed.
    pub ticks: AtomicU64,
    /// Updates handed to the broadcast channel with at least one receiver.
    pub publishes: AtomicU64,
    /// Source readings recorded.
    pub readings_recorded: AtomicU64,
    /// Audience votes tallied.
    pub votes: AtomicU64,
    /// Weight / override writes rejected.
    pub rejected_writes: AtomicU64,
    /// Chords emitted by the chord engine.
    pub chords_played: AtomicU64,
    /// Chords drawn from an alternate bank.
    pub alternate_bank_picks: AtomicU64,
    /// Calm / tension family crossings.
    pub family_switches: AtomicU64,
}

impl AuraCounters {
    /// Zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            publishes: AtomicU64::new(0),
            readings_recorded: AtomicU64::new(0),
            votes: AtomicU64::new(0),
            rejected_writes: AtomicU64::new(0),
            chords_played: AtomicU64::new(0),
            alternate_bank_picks: AtomicU64::new(0),
            family_switches: AtomicU64::new(0),
        }
    }

    /// Add one to a counter.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            readings_recorded: self.readings_recorded.load(Ordering::Relaxed),
            votes: self.votes.load(Ordering::Relaxed),
            rejected_writes: self.rejected_writes.load(Ordering::Relaxed),
            chords_played: self.chords_played.load(Ordering::Relaxed),
            alternate_bank_picks: self.alternate_bank_picks.load(Ordering::Relaxed),
            family_switches: self.family_switches.load(Ordering::Relaxed),
        }
    }
}

impl Default for AuraCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Scheduler ticks completed.
    pub ticks: u64,
    /// Updates published.
    pub publishes: u64,
    /// Readings recorded.
    pub readings_recorded: u64,
    /// Votes tallied.
    pub votes: u64,
    /// Writes rejected.
    pub rejected_writes: u64,
    /// Chords emitted.
    pub chords_played: u64,
    /// Alternate-bank draws.
    pub alternate_bank_picks: u64,
    /// Family crossings.
    pub family_switches: u64,
}

impl CounterSnapshot {
    fn rows(&self) -> [(&'static str, &'static str, u64); 8] {
        [
            ("aura_ticks_total", "Scheduler ticks completed", self.ticks),
            ("aura_publishes_total", "Updates published to subscribers", self.publishes),
            ("aura_readings_recorded_total", "Source readings recorded", self.readings_recorded),
            ("aura_votes_total", "Audience votes tallied", self.votes),
            ("aura_rejected_writes_total", "Configuration writes rejected", self.rejected_writes),
            ("aura_chords_played_total", "Chords emitted", self.chords_played),
            (
                "aura_alternate_bank_picks_total",
                "Chords drawn from an alternate bank",
                self.alternate_bank_picks,
            ),
            ("aura_family_switches_total", "Calm / tension family crossings", self.family_switches),
        ]
    }

    /// Format as Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        for (name, help, value) in self.rows() {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tick Budget Monitor
// ---------------------------------------------------------------------------

const HISTORY_LEN: usize = 256;

/// Tracks how long each scheduler tick takes against a budget.
///
/// ```rust
/// # use aura_core::metrics::TickBudgetMonitor;
/// let monitor = TickBudgetMonitor::new(5.0);
/// {
///     let _guard = monitor.begin_tick();
///     // fuse + plan
/// }
/// assert_eq!(monitor.tick_count(), 1);
/// ```
#[derive(Debug)]
pub struct TickBudgetMonitor {
    budget_ms: f64,
    history: Mutex<TickHistory>,
}

#[derive(Debug)]
struct TickHistory {
    timings: [f64; HISTORY_LEN],
    write_idx: usize,
    count: u64,
    over_budget: u64,
}

impl TickBudgetMonitor {
    /// Monitor with a budget in milliseconds.
    #[must_use]
    pub fn new(budget_ms: f64) -> Self {
        Self {
            budget_ms,
            history: Mutex::new(TickHistory {
                timings: [0.0; HISTORY_LEN],
                write_idx: 0,
                count: 0,
                over_budget: 0,
            }),
        }
    }

    /// Start timing a tick; elapsed time is recorded when the guard drops.
    pub fn begin_tick(&self) -> TickGuard<'_> {
        TickGuard {
            monitor: self,
            start: Instant::now(),
        }
    }

    /// Record a tick duration. Returns whether it exceeded the budget.
    pub fn record(&self, ms: f64) -> bool {
        let over = ms > self.budget_ms;
        let mut h = self.history.lock();
        let idx = h.write_idx;
        h.timings[idx] = ms;
        h.write_idx = (idx + 1) % HISTORY_LEN;
        h.count += 1;
        if over {
            h.over_budget += 1;
        }
        over
    }

    /// Duration of the most recent tick, or zero.
    #[must_use]
    pub fn last_tick_ms(&self) -> f64 {
        let h = self.history.lock();
        if h.count == 0 {
            return 0.0;
        }
        h.timings[(h.write_idx + HISTORY_LEN - 1) % HISTORY_LEN]
    }

    /// Ticks recorded since creation.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.history.lock().count
    }

    /// Ticks over budget since creation.
    #[must_use]
    pub fn over_budget_count(&self) -> u64 {
        self.history.lock().over_budget
    }

    /// The configured budget.
    #[must_use]
    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }

    /// P50 / P95 / P99 / max over the retained window.
    #[must_use]
    pub fn percentiles(&self) -> TickPercentiles {
        let h = self.history.lock();
        let n = usize::try_from(h.count).unwrap_or(usize::MAX).min(HISTORY_LEN);
        if n == 0 {
            return TickPercentiles::default();
        }
        let mut sorted = h.timings[..n].to_vec();
        drop(h);
        sorted.sort_by(f64::total_cmp);

        let at = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];
        let over = sorted.iter().filter(|t| **t > self.budget_ms).count();
        TickPercentiles {
            p50: at(0.5),
            p95: at(0.95),
            p99: at(0.99),
            max: sorted[n - 1],
            over_budget_ratio: over as f64 / n as f64,
        }
    }
}

/// Records elapsed time on drop.
pub struct TickGuard<'a> {
    monitor: &'a TickBudgetMonitor,
    start: Instant,
}

impl TickGuard<'_> {
    /// Milliseconds since the guard was created.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.monitor.record(self.elapsed_ms());
    }
}

/// Percentiles of recent tick durations, in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TickPercentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Slowest retained tick.
    pub max: f64,
    /// Fraction of retained ticks over budget.
    pub over_budget_ratio: f64,
}

impl TickPercentiles {
    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self, budget_ms: f64) -> String {
        format!(
            "P50={:.3}ms P95={:.3}ms P99={:.3}ms Max={:.3}ms Budget={budget_ms:.1}ms Over={:.1}%",
            self.p50,
            self.p95,
            self.p99,
            self.max,
            self.over_budget_ratio * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Span names
// ---------------------------------------------------------------------------

/// Names for `tracing` spans around pipeline stages.
pub mod spans {
    /// One scheduler tick.
    pub const TICK: &str = "aura::tick";
    /// Fusion of live sources.
    pub const FUSE: &str = "aura::fuse";
    /// Modulation planning.
    pub const PLAN: &str = "aura::plan";
    /// Broadcast of an update.
    pub const PUBLISH: &str = "aura::publish";
    /// Chord engine advance.
    pub const CHORD: &str = "aura::chord";
}
