//! Rhythm adaptation.
//!
//! Two rolling structures drive the mode: interaction timestamps (pruned to
//! the retention window) and a bounded ring of recent emotions. Every update
//! re-derives the mode from scratch; only real interactions enter the window.

use std::collections::VecDeque;
use std::sync::Mutex;

use companion_core::config::RhythmConfig;
use companion_core::error::{CompanionError, Result};
use companion_core::events::{DomainEvent, EventBus};
use companion_core::types::{EmotionType, PetState, RhythmMode, Timestamp};

use crate::state::{tempo_for, RhythmIntensity, RhythmState, RhythmStats};

#[derive(Debug, Default)]
struct RhythmInner {
    interactions: VecDeque<Timestamp>,
    emotions: VecDeque<EmotionType>,
    state: RhythmState,
    rate: u32,
    idle_ms: u64,
    last_state: Option<PetState>,
    external_source: Option<String>,
}

/// Inputs to one mode decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RhythmSignals {
    pub emotion: EmotionType,
    /// Interactions in the trailing rate window, excluding the current event.
    pub rate: u32,
    pub idle_ms: u64,
    pub has_history: bool,
}

/// Ordered decision table; the first matching row wins.
pub fn select_mode(signals: RhythmSignals, config: &RhythmConfig) -> RhythmMode {
    let high = config.high_frequency_threshold;
    let low = config.low_frequency_threshold;
    let RhythmSignals {
        emotion,
        rate,
        idle_ms,
        has_history,
    } = signals;

    if rate >= high.saturating_mul(2) {
        return RhythmMode::Pulse;
    }
    match emotion {
        EmotionType::Excited if rate >= high => RhythmMode::Pulse,
        EmotionType::Focused => RhythmMode::Adaptive,
        EmotionType::Curious | EmotionType::Happy if low <= rate && rate <= high => {
            RhythmMode::Adaptive
        }
        EmotionType::Sleepy if has_history && idle_ms > config.idle_threshold_ms / 2 => {
            RhythmMode::Sequence
        }
        EmotionType::Sleepy => RhythmMode::Steady,
        EmotionType::Calm if idle_ms > config.idle_threshold_ms => RhythmMode::Sequence,
        _ => RhythmMode::Steady,
    }
}

pub struct RhythmAdaptationEngine {
    config: RhythmConfig,
    inner: Mutex<RhythmInner>,
    events: Option<EventBus>,
}

impl RhythmAdaptationEngine {
    pub fn new(config: RhythmConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(RhythmInner::default()),
            events: None,
        }
    }

    /// Publish mode changes on `bus`.
    pub fn with_events(config: RhythmConfig, bus: EventBus) -> Self {
        Self {
            events: Some(bus),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &RhythmConfig {
        &self.config
    }

    /// Feed one (state, emotion) observation and return the resulting mode.
    ///
    /// Pass `is_interaction = false` for status checks; they update the mode
    /// but never count as user activity.
    pub fn update_rhythm_by_context(
        &self,
        state: PetState,
        emotion: EmotionType,
        timestamp: Timestamp,
        is_interaction: bool,
    ) -> RhythmMode {
        let (previous, current) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let retention = self.config.retention_ms;
            inner
                .interactions
                .retain(|t| timestamp.millis_since(*t) < retention);

            let window = self.config.rate_window_ms;
            let rate = inner
                .interactions
                .iter()
                .filter(|t| **t <= timestamp && timestamp.millis_since(**t) < window)
                .count() as u32;
            let idle_ms = inner
                .interactions
                .back()
                .map_or(window, |last| timestamp.millis_since(*last));
            let has_history = !inner.interactions.is_empty();

            let mode = select_mode(
                RhythmSignals {
                    emotion,
                    rate,
                    idle_ms,
                    has_history,
                },
                &self.config,
            );

            if is_interaction {
                inner.interactions.push_back(timestamp);
            }
            inner.emotions.push_back(emotion);
            while inner.emotions.len() > self.config.emotion_history_window {
                inner.emotions.pop_front();
            }

            let previous = inner.state.clone();
            inner.state = RhythmState {
                mode,
                tempo_ms: tempo_for(mode),
                intensity: RhythmIntensity::from_rate(
                    rate,
                    self.config.low_frequency_threshold,
                    self.config.high_frequency_threshold,
                ),
                active: !inner.interactions.is_empty(),
            };
            inner.rate = rate;
            inner.idle_ms = idle_ms;
            inner.last_state = Some(state);
            inner.external_source = None;
            (previous, inner.state.clone())
        };

        tracing::trace!(
            %state,
            %emotion,
            mode = %current.mode,
            intensity = %current.intensity,
            "Rhythm updated"
        );
        if previous.mode != current.mode {
            self.announce(previous.mode, &current, timestamp);
        }
        current.mode
    }

    pub fn get_current_rhythm(&self) -> RhythmMode {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state.mode
    }

    pub fn get_state(&self) -> RhythmState {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .state
            .clone()
    }

    pub fn get_stats(&self) -> RhythmStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        RhythmStats {
            emotion_history: inner.emotions.iter().copied().collect(),
            interaction_count: inner.interactions.len(),
            interaction_rate: inner.rate,
            idle_ms: inner.idle_ms,
            last_state: inner.last_state,
            external_source: inner.external_source.clone(),
        }
    }

    /// Follow an external beat until the next context update.
    pub fn sync_with_external(&self, source: &str, interval_ms: u64) -> Result<RhythmState> {
        if interval_ms == 0 {
            return Err(CompanionError::Validation(
                "sync interval must be greater than zero".to_string(),
            ));
        }
        let (previous, current) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let previous = inner.state.mode;
            inner.state.mode = RhythmMode::Sync;
            inner.state.tempo_ms = interval_ms;
            inner.external_source = Some(source.to_string());
            (previous, inner.state.clone())
        };
        tracing::info!(source = %source, interval_ms, "Rhythm synced to external source");
        if previous != RhythmMode::Sync {
            self.announce(previous, &current, Timestamp::now());
        }
        Ok(current)
    }

    /// Forget all history and return to steady.
    pub fn reset(&self) {
        let previous = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let previous = inner.state.mode;
            *inner = RhythmInner::default();
            previous
        };
        tracing::debug!("Rhythm reset");
        if previous != RhythmMode::Steady {
            self.announce(previous, &RhythmState::default(), Timestamp::now());
        }
    }

    fn announce(&self, from: RhythmMode, current: &RhythmState, timestamp: Timestamp) {
        tracing::debug!(from = %from, to = %current.mode, tempo_ms = current.tempo_ms, "Rhythm mode changed");
        if let Some(bus) = &self.events {
            bus.publish(DomainEvent::RhythmModeChanged {
                from,
                to: current.mode,
                tempo_ms: current.tempo_ms,
                timestamp,
            });
        }
    }
}

impl Default for RhythmAdaptationEngine {
    fn default() -> Self {
        Self::new(RhythmConfig::default())
    }
}
