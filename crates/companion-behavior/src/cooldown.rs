//! Per-strategy cooldown bookkeeping.

use std::collections::HashMap;
use std::sync::Mutex;

use companion_core::types::Timestamp;

/// Remembers when each strategy last fired.
///
/// Writes from overlapping batches are last-write-wins.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_fired: Mutex<HashMap<String, Timestamp>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the strategy never fired, has no cooldown, or its cooldown elapsed at `now`.
    pub fn may_fire(&self, strategy_id: &str, cooldown_ms: Option<u64>, now: Timestamp) -> bool {
        let cooldown = match cooldown_ms {
            Some(ms) if ms > 0 => ms,
            _ => return true,
        };
        let last_fired = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
        match last_fired.get(strategy_id) {
            Some(last) => now.millis_since(*last) >= cooldown && now >= *last,
            None => true,
        }
    }

    /// Record that the strategy fired at `at`.
    pub fn mark_fired(&self, strategy_id: &str, at: Timestamp) {
        self.last_fired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(strategy_id.to_string(), at);
    }

    pub fn last_fired(&self, strategy_id: &str) -> Option<Timestamp> {
        self.last_fired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(strategy_id)
            .copied()
    }

    /// Milliseconds until the strategy may fire again; zero if it may fire now.
    pub fn remaining_ms(&self, strategy_id: &str, cooldown_ms: Option<u64>, now: Timestamp) -> u64 {
        match (self.last_fired(strategy_id), cooldown_ms) {
            (Some(last), Some(cooldown)) => cooldown.saturating_sub(now.millis_since(last)),
            _ => 0,
        }
    }

    pub fn forget(&self, strategy_id: &str) {
        self.last_fired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(strategy_id);
    }

    pub fn reset(&self) {
        self.last_fired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
