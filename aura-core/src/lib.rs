//! # AURA Core Library
//!
//! Emotion-driven adaptive music: turns game telemetry and facial / vocal
//! emotion labels into a fused emotional state, and that state into
//! music-modulation directives.
//!
//! - [`registry`] — latest reading per source, with staleness
//! - [`fusion`] — weighted blend of live sources into an [`EmotionVector`]
//! - [`modulation`] — tempo smoothing, structural clock, effects, layers,
//!   deterministic micro-variation
//! - [`chord`] — Markov-chain chord walker on its own clock, plus
//!   level-music cross-fades
//!
//! Everything here is synchronous and takes time as an argument, so the same
//! inputs always produce the same outputs. The async tick loop lives in
//! `aura-runtime`.
//!
//! ## Performance Contract
//!
//! Fusion and planning are O(1) over a fixed key set; a full tick
//! (fuse + plan) stays well under 50μs. Chord advancement is bounded by bank
//! size.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod chord;
pub mod config;
pub mod error;
pub mod fusion;
pub mod metrics;
pub mod modulation;
pub mod registry;
pub mod types;

pub use chord::{ChordEvent, GameStateLabel, StochasticChordEngine};
pub use config::AuraConfig;
pub use error::AuraError;
pub use fusion::{EmotionFusionEngine, ManualOverride, WeightTable, WriteOutcome};
pub use modulation::{ModulationDescriptor, ModulationPlanner, TrackInfo};
pub use registry::SourceRegistry;
pub use types::*;
