//! Sequential behavior execution.
//!
//! Runs one decision's behaviors in order. Delays and durations are awaited
//! sleeps, so overlapping batches never block each other. A bulk clear bumps a
//! generation counter that every pending sleep watches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use companion_core::events::{DomainEvent, EventBus};
use companion_core::types::Timestamp;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::cooldown::CooldownTracker;
use crate::effect::EffectRegistry;
use crate::stats::StatsStore;
use crate::types::{Behavior, BehaviorFailure, ExecutionContext};

/// What happened to one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub executed: Vec<Behavior>,
    pub failures: Vec<BehaviorFailure>,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct StrategyTally {
    elapsed: Duration,
    failed: bool,
}

pub struct BehaviorExecutor {
    effects: EffectRegistry,
    cooldowns: Arc<CooldownTracker>,
    stats: Arc<StatsStore>,
    events: EventBus,
    generation: watch::Sender<u64>,
    pending_timers: AtomicUsize,
}

impl BehaviorExecutor {
    pub fn new(
        effects: EffectRegistry,
        cooldowns: Arc<CooldownTracker>,
        stats: Arc<StatsStore>,
        events: EventBus,
    ) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            effects,
            cooldowns,
            stats,
            events,
            generation,
            pending_timers: AtomicUsize::new(0),
        }
    }

    /// Delay or duration sleeps currently waiting.
    pub fn pending_timers(&self) -> usize {
        self.pending_timers.load(Ordering::SeqCst)
    }

    /// Cancel every pending sleep in every running batch. Returns how many were waiting.
    pub fn clear_scheduled(&self) -> usize {
        let pending = self.pending_timers();
        self.generation.send_modify(|g| *g = g.wrapping_add(1));
        pending
    }

    /// Run `behaviors` in order against `ctx`.
    ///
    /// A strategy's cooldown starts at `ctx.timestamp` when its first behavior
    /// begins. Effect errors go to the strategy's error ring and the batch
    /// continues. Statistics are recorded for every strategy that started.
    pub async fn execute(&self, behaviors: Vec<Behavior>, ctx: &ExecutionContext) -> BatchOutcome {
        let started = Instant::now();
        let mut cancel = self.generation.subscribe();
        let mut outcome = BatchOutcome::default();
        let mut tallies: Vec<(String, StrategyTally)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for behavior in behaviors {
            let behavior_started = Instant::now();

            if let Some(delay) = behavior.delay_ms.filter(|ms| *ms > 0) {
                if !self.pause(delay, &mut cancel).await {
                    outcome.cancelled = true;
                    break;
                }
            }

            let slot = match index.get(&behavior.strategy_id) {
                Some(slot) => *slot,
                None => {
                    if !behavior.strategy_id.is_empty() {
                        self.cooldowns.mark_fired(&behavior.strategy_id, ctx.timestamp);
                    }
                    tallies.push((behavior.strategy_id.clone(), StrategyTally::default()));
                    index.insert(behavior.strategy_id.clone(), tallies.len() - 1);
                    tallies.len() - 1
                }
            };

            let effect = self.effects.get(&behavior.behavior_type);
            tracing::debug!(
                session_id = %ctx.session_id,
                description = %effect.describe(&behavior),
                "Executing behavior"
            );
            let succeeded = match effect.perform(&behavior, ctx).await {
                Ok(_) => {
                    self.events.publish(DomainEvent::BehaviorExecuted {
                        session_id: ctx.session_id,
                        behavior_type: behavior.behavior_type.to_string(),
                        strategy_id: behavior.strategy_id.clone(),
                        timestamp: Timestamp::now(),
                    });
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        behavior_type = %behavior.behavior_type,
                        strategy_id = %behavior.strategy_id,
                        error = %e,
                        "Behavior effect failed"
                    );
                    self.stats
                        .record_error(&behavior.strategy_id, e.to_string(), Timestamp::now());
                    tallies[slot].1.failed = true;
                    self.events.publish(DomainEvent::BehaviorFailed {
                        session_id: ctx.session_id,
                        behavior_type: behavior.behavior_type.to_string(),
                        strategy_id: behavior.strategy_id.clone(),
                        reason: e.to_string(),
                        timestamp: Timestamp::now(),
                    });
                    outcome.failures.push(BehaviorFailure {
                        behavior_type: behavior.behavior_type.clone(),
                        strategy_id: behavior.strategy_id.clone(),
                        error: e.to_string(),
                    });
                    false
                }
            };

            let duration = behavior.duration_ms.filter(|ms| *ms > 0);
            if succeeded {
                outcome.executed.push(behavior);
            }

            if let Some(duration) = duration {
                if !self.pause(duration, &mut cancel).await {
                    tallies[slot].1.elapsed += behavior_started.elapsed();
                    outcome.cancelled = true;
                    break;
                }
            }
            tallies[slot].1.elapsed += behavior_started.elapsed();
        }

        for (strategy_id, tally) in &tallies {
            if strategy_id.is_empty() {
                continue;
            }
            self.stats.record_execution(
                strategy_id,
                ctx.timestamp,
                tally.elapsed.as_millis() as u64,
                !tally.failed,
            );
        }

        if outcome.cancelled {
            tracing::info!(
                session_id = %ctx.session_id,
                executed = outcome.executed.len(),
                "Behavior batch cancelled"
            );
        }
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    /// Sleep for `ms`; false if a clear arrived first.
    ///
    /// Only clears issued after the sleep starts cancel it. A clear that
    /// landed while an effect was running had no timer to stop.
    async fn pause(&self, ms: u64, cancel: &mut watch::Receiver<u64>) -> bool {
        cancel.borrow_and_update();
        self.pending_timers.fetch_add(1, Ordering::SeqCst);
        let completed = tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => true,
            _ = cancel.changed() => false,
        };
        self.pending_timers.fetch_sub(1, Ordering::SeqCst);
        completed
    }
}
