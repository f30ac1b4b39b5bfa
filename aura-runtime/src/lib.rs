//! # aura-runtime — Async Orchestration for AURA
//!
//! Runs the game-agnostic core on tokio:
//!
//! - [`scheduler`] — the orchestrator task: owns all fusion and planning
//!   state, applies commands from producers and controllers, ticks at a fixed
//!   cadence (2 Hz by default) and broadcasts an [`AuraUpdate`] per tick
//! - [`chord_loop`] — the chord engine on its own timer, fed by a
//!   [`GameSnapshot`] watch channel
//! - [`game_state`] — nearest-enemy classification
//!
//! The two loops share no mutable state; counters are the only thing they
//! both touch, and those are atomics.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod chord_loop;
pub mod error;
pub mod game_state;
pub mod payload;
pub mod scheduler;
pub mod service;

pub use chord_loop::{ChordLoopHandle, PlaybackCommand, PlaybackMode};
pub use error::RuntimeError;
pub use game_state::GameSnapshot;
pub use payload::{AuraUpdate, Diagnostics, GameInstruction, LegacyHints};
pub use scheduler::AuraHandle;
pub use service::AuraState;
