//! Per-strategy execution statistics.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use companion_core::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Number of recent errors kept per strategy.
pub const ERROR_RING_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyError {
    pub message: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub strategy_id: String,
    pub execution_count: u64,
    pub success_count: u64,
    pub last_executed_at: Option<Timestamp>,
    /// Cumulative mean over every recorded attempt.
    pub rolling_avg_duration_ms: f64,
    /// Share of attempts that completed without an effect error.
    pub success_rate: f64,
    pub errors: VecDeque<StrategyError>,
}

impl ExecutionStats {
    fn new(strategy_id: &str) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            execution_count: 0,
            success_count: 0,
            last_executed_at: None,
            rolling_avg_duration_ms: 0.0,
            success_rate: 1.0,
            errors: VecDeque::with_capacity(ERROR_RING_CAPACITY),
        }
    }
}

/// Statistics keyed by strategy id. Only the executor writes here.
#[derive(Debug, Default)]
pub struct StatsStore {
    stats: Mutex<HashMap<String, ExecutionStats>>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt of a strategy's behaviors.
    pub fn record_execution(&self, strategy_id: &str, at: Timestamp, duration_ms: u64, success: bool) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        let entry = stats
            .entry(strategy_id.to_string())
            .or_insert_with(|| ExecutionStats::new(strategy_id));

        entry.execution_count += 1;
        if success {
            entry.success_count += 1;
        }
        entry.last_executed_at = Some(at);
        let n = entry.execution_count as f64;
        entry.rolling_avg_duration_ms += (duration_ms as f64 - entry.rolling_avg_duration_ms) / n;
        entry.success_rate = entry.success_count as f64 / n;
    }

    /// Append to the strategy's error ring, evicting the oldest past capacity.
    pub fn record_error(&self, strategy_id: &str, message: impl Into<String>, at: Timestamp) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        let entry = stats
            .entry(strategy_id.to_string())
            .or_insert_with(|| ExecutionStats::new(strategy_id));
        if entry.errors.len() == ERROR_RING_CAPACITY {
            entry.errors.pop_front();
        }
        entry.errors.push_back(StrategyError {
            message: message.into(),
            timestamp: at,
        });
    }

    pub fn get(&self, strategy_id: &str) -> Option<ExecutionStats> {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(strategy_id)
            .cloned()
    }

    pub fn execution_count(&self, strategy_id: &str) -> u64 {
        self.get(strategy_id).map_or(0, |s| s.execution_count)
    }

    /// Every tracked strategy, ordered by id.
    pub fn all(&self) -> Vec<ExecutionStats> {
        let stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<ExecutionStats> = stats.values().cloned().collect();
        all.sort_by(|a, b| a.strategy_id.cmp(&b.strategy_id));
        all
    }

    pub fn remove(&self, strategy_id: &str) {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(strategy_id);
    }

    pub fn clear(&self) {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
