//! Stochastic chord engine and level-music cross-fades.
//!
//! Independent of the emotion tick: driven by a coarse [`GameStateLabel`]
//! and player health handed in by the game loop.

pub mod bank;
pub mod crossfade;
pub mod engine;

pub use bank::{ChordBank, ChordBankSet};
pub use crossfade::{CrossfadeLevels, LoopCrossfader, LoopLevel};
pub use engine::{
    Channel, ChordEngineState, ChordEvent, GameStateLabel, MoodFamily, StochasticChordEngine,
    base_interval,
};
