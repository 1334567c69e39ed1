//! Pacing for the companion's feedback.
//!
//! Watches the same (state, emotion) stream as the behavior scheduler and
//! derives a qualitative rhythm mode from recent interaction frequency and
//! idle time. The visual layer reads the mode or listens for
//! `RhythmModeChanged` events.

pub mod engine;
pub mod state;

pub use engine::RhythmAdaptationEngine;
pub use state::{tempo_for, RhythmIntensity, RhythmState, RhythmStats};
