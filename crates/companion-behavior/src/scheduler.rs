//! The decision pipeline.
//!
//! Each `schedule` call is one-shot: build a context, ask the strategy manager
//! for behaviors, fall back to the legacy table if nothing matched, then run
//! the batch. Calls are independent; overlapping calls interleave unless the
//! state is configured as exclusive.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use companion_core::config::SchedulerConfig;
use companion_core::error::CompanionError;
use companion_core::events::{DomainEvent, EventBus};
use companion_core::types::{EmotionContext, EmotionType, PetState, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::effect::{EffectRegistry, PluginHost};
use crate::executor::BehaviorExecutor;
use crate::legacy::LegacyTable;
use crate::manager::{dedup_by_type, StrategyManager};
use crate::stats::ExecutionStats;
use crate::strategy::BehaviorRule;
use crate::types::{Behavior, Environment, ExecutionContext, ExecutionResult};

/// Supplies the emotion engine's current reading.
pub trait EmotionSource: Send + Sync {
    fn current_context(&self) -> Option<EmotionContext>;
}

/// Snapshot for debug panels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub session_id: Uuid,
    pub pending_timers: usize,
    pub active_batches: usize,
    pub registered_strategies: usize,
    pub legacy_rules: usize,
}

/// Multiplier applied to the base interval for the state.
pub fn state_multiplier(state: PetState) -> f64 {
    match state {
        PetState::Idle => 2.0,
        PetState::Hover => 0.5,
        PetState::Awaken => 0.3,
        PetState::Control => 0.8,
    }
}

/// Multiplier applied to the base interval for the emotion.
pub fn emotion_multiplier(emotion: EmotionType) -> f64 {
    match emotion {
        EmotionType::Excited => 0.5,
        EmotionType::Sleepy => 2.0,
        EmotionType::Focused => 1.5,
        _ => 1.0,
    }
}

pub struct BehaviorScheduler {
    manager: Arc<StrategyManager>,
    legacy: LegacyTable,
    executor: BehaviorExecutor,
    emotion_source: Option<Arc<dyn EmotionSource>>,
    events: EventBus,
    config: SchedulerConfig,
    session_id: Uuid,
    last_interaction: Mutex<Timestamp>,
    system_load: Mutex<f64>,
    in_flight: Mutex<HashSet<(PetState, EmotionType)>>,
    active_batches: AtomicUsize,
}

impl BehaviorScheduler {
    pub fn builder(config: SchedulerConfig) -> BehaviorSchedulerBuilder {
        BehaviorSchedulerBuilder::new(config)
    }

    /// A scheduler with default configuration, built-in rules and stock records.
    pub fn with_defaults() -> Result<Self, CompanionError> {
        Self::builder(SchedulerConfig::default()).build()
    }

    pub fn manager(&self) -> &Arc<StrategyManager> {
        &self.manager
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Note that the user just interacted.
    pub fn update_last_interaction(&self) {
        self.mark_interaction(Timestamp::now());
    }

    pub fn mark_interaction(&self, at: Timestamp) {
        *self.last_interaction.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn last_interaction(&self) -> Timestamp {
        *self.last_interaction.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Latest system load sample, 0.0-1.0.
    pub fn set_system_load(&self, load: f64) {
        *self.system_load.lock().unwrap_or_else(|e| e.into_inner()) = load.clamp(0.0, 1.0);
    }

    pub fn add_legacy_rule(&self, state: PetState, emotion: EmotionType, behavior: Behavior) {
        self.legacy.add_behavior(state, emotion, behavior);
    }

    /// Snapshot of the world at `now`.
    pub fn build_context(
        &self,
        state: PetState,
        emotion: EmotionType,
        now: Timestamp,
        user_context: Option<Value>,
    ) -> ExecutionContext {
        let mut emotion_ctx = self
            .emotion_source
            .as_ref()
            .and_then(|source| source.current_context())
            .unwrap_or_else(|| EmotionContext::new(emotion, self.config.default_intensity));
        // The caller's emotion wins over whatever the source last saw.
        emotion_ctx.current_emotion = emotion;

        let idle_ms = now.millis_since(self.last_interaction());
        let mut environment = Environment::at(now.local_hour(), idle_ms);
        environment.system_load = *self.system_load.lock().unwrap_or_else(|e| e.into_inner());

        ExecutionContext {
            state,
            emotion: emotion_ctx,
            timestamp: now,
            session_id: self.session_id,
            environment,
            user_context,
        }
    }

    /// Decide and run behaviors for the pair at the current time.
    ///
    /// Any state other than idle counts as a user interaction once the
    /// context is built.
    pub async fn schedule(
        &self,
        state: PetState,
        emotion: EmotionType,
        user_context: Option<Value>,
    ) -> ExecutionResult {
        let now = Timestamp::now();
        let ctx = self.build_context(state, emotion, now, user_context);
        if state != PetState::Idle {
            self.mark_interaction(now);
        }
        self.schedule_with_context(ctx).await
    }

    /// Decide and run behaviors for a caller-built context.
    pub async fn schedule_with_context(&self, ctx: ExecutionContext) -> ExecutionResult {
        let started = Instant::now();
        let state = ctx.state;
        let emotion = ctx.emotion_type();

        let _claim = if self.config.exclusive_states.contains(&state) {
            match InFlightClaim::acquire(&self.in_flight, (state, emotion)) {
                Some(claim) => Some(claim),
                None => {
                    tracing::debug!(%state, %emotion, "Overlapping call rejected for exclusive state");
                    return ExecutionResult {
                        message: Some(format!(
                            "A batch for state={} emotion={} is already running",
                            state, emotion
                        )),
                        ..ExecutionResult::nothing_matched(state, emotion, 0)
                    };
                }
            }
        } else {
            None
        };

        let mut behaviors = self.manager.generate_behaviors(&ctx);
        if behaviors.is_empty() && self.config.use_legacy_fallback {
            behaviors = dedup_by_type(self.legacy.behaviors_for(&ctx));
            if !behaviors.is_empty() {
                tracing::debug!(%state, %emotion, count = behaviors.len(), "Using legacy fallback");
            }
        }

        if behaviors.is_empty() {
            tracing::info!(%state, %emotion, "No behaviors matched");
            self.events.publish(DomainEvent::NothingMatched {
                session_id: self.session_id,
                state,
                emotion,
                timestamp: ctx.timestamp,
            });
            return ExecutionResult::nothing_matched(
                state,
                emotion,
                started.elapsed().as_millis() as u64,
            );
        }

        let total = behaviors.len();
        self.events.publish(DomainEvent::BehaviorsScheduled {
            session_id: self.session_id,
            state,
            emotion,
            behavior_count: total,
            timestamp: ctx.timestamp,
        });

        self.active_batches.fetch_add(1, Ordering::SeqCst);
        let outcome = self.executor.execute(behaviors, &ctx).await;
        self.active_batches.fetch_sub(1, Ordering::SeqCst);

        tracing::info!(
            %state,
            %emotion,
            executed = outcome.executed.len(),
            failed = outcome.failures.len(),
            cancelled = outcome.cancelled,
            "Behavior batch finished"
        );

        let message = if outcome.cancelled {
            format!("Cancelled after {} of {} behaviors", outcome.executed.len(), total)
        } else {
            format!("Executed {} of {} behaviors", outcome.executed.len(), total)
        };

        ExecutionResult {
            success: true,
            executed_behaviors: outcome.executed,
            failures: outcome.failures,
            elapsed_ms: started.elapsed().as_millis() as u64,
            message: Some(message),
            next_schedule_hint: Some(self.next_schedule_hint(state, emotion, ctx.timestamp)),
            cancelled: outcome.cancelled,
        }
    }

    /// When the caller might schedule again. Advisory only.
    pub fn next_schedule_hint(&self, state: PetState, emotion: EmotionType, now: Timestamp) -> Timestamp {
        let interval = self.config.base_interval_ms as f64
            * state_multiplier(state)
            * emotion_multiplier(emotion);
        now.add_millis(interval.round() as u64)
    }

    /// Cancel every pending delay and duration. Running batches stop early.
    pub fn clear_scheduled_behaviors(&self) -> usize {
        let cancelled = self.executor.clear_scheduled();
        tracing::info!(cancelled, "Scheduled behaviors cleared");
        self.events.publish(DomainEvent::ScheduledBehaviorsCleared {
            session_id: self.session_id,
            timestamp: Timestamp::now(),
        });
        cancelled
    }

    pub fn get_matching_strategies(
        &self,
        state: PetState,
        emotion: EmotionType,
        ctx: Option<&ExecutionContext>,
    ) -> Vec<Arc<dyn BehaviorRule>> {
        self.manager.get_matching_strategies(state, emotion, ctx)
    }

    pub fn get_execution_stats(&self) -> Vec<ExecutionStats> {
        self.manager.get_execution_stats()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            session_id: self.session_id,
            pending_timers: self.executor.pending_timers(),
            active_batches: self.active_batches.load(Ordering::SeqCst),
            registered_strategies: self.manager.catalog().len(),
            legacy_rules: self.legacy.len(),
        }
    }

    /// Stop everything in flight.
    pub fn shutdown(&self) {
        tracing::info!(session_id = %self.session_id, "Behavior scheduler shutting down");
        self.clear_scheduled_behaviors();
    }
}

/// Marks a (state, emotion) pair busy until dropped.
struct InFlightClaim<'a> {
    set: &'a Mutex<HashSet<(PetState, EmotionType)>>,
    key: (PetState, EmotionType),
}

impl<'a> InFlightClaim<'a> {
    fn acquire(
        set: &'a Mutex<HashSet<(PetState, EmotionType)>>,
        key: (PetState, EmotionType),
    ) -> Option<Self> {
        let inserted = set.lock().unwrap_or_else(|e| e.into_inner()).insert(key);
        inserted.then_some(Self { set, key })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

pub struct BehaviorSchedulerBuilder {
    config: SchedulerConfig,
    manager: Option<Arc<StrategyManager>>,
    legacy: Option<LegacyTable>,
    effects: EffectRegistry,
    emotion_source: Option<Arc<dyn EmotionSource>>,
    events: Option<EventBus>,
}

impl BehaviorSchedulerBuilder {
    fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            manager: None,
            legacy: None,
            effects: EffectRegistry::default(),
            emotion_source: None,
            events: None,
        }
    }

    /// Use an existing manager as is; the built-in flags in the config are ignored.
    pub fn manager(mut self, manager: Arc<StrategyManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn legacy_table(mut self, legacy: LegacyTable) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub fn effects(mut self, effects: EffectRegistry) -> Self {
        self.effects = effects;
        self
    }

    pub fn plugin_host(mut self, host: Arc<dyn PluginHost>) -> Self {
        self.effects.register_plugin_host(host);
        self
    }

    pub fn emotion_source(mut self, source: Arc<dyn EmotionSource>) -> Self {
        self.emotion_source = Some(source);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<BehaviorScheduler, CompanionError> {
        let events = self.events.unwrap_or_default();
        let manager = match self.manager {
            Some(manager) => manager,
            None => {
                let catalog = Arc::new(crate::catalog::StrategyCatalog::with_events(events.clone()));
                let manager = StrategyManager::new(catalog);
                if self.config.builtin_rules {
                    manager.register_builtin_rules();
                }
                if self.config.default_strategies {
                    manager.register_default_strategies()?;
                }
                Arc::new(manager)
            }
        };

        let executor = BehaviorExecutor::new(
            self.effects,
            Arc::clone(manager.cooldowns()),
            Arc::clone(manager.stats()),
            events.clone(),
        );
        let session_id = Uuid::new_v4();
        tracing::info!(
            session_id = %session_id,
            strategies = manager.catalog().len(),
            "Behavior scheduler ready"
        );

        Ok(BehaviorScheduler {
            manager,
            legacy: self.legacy.unwrap_or_else(LegacyTable::standard),
            executor,
            emotion_source: self.emotion_source,
            events,
            config: self.config,
            session_id,
            last_interaction: Mutex::new(Timestamp::now()),
            system_load: Mutex::new(0.0),
            in_flight: Mutex::new(HashSet::new()),
            active_batches: AtomicUsize::new(0),
        })
    }
}
