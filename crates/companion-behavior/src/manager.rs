//! Strategy selection.
//!
//! Queries here are pure: they read the catalog, cooldowns and statistics but
//! never write them. Only the executor records executions.

use std::collections::HashSet;
use std::sync::Arc;

use companion_core::types::{EmotionType, PetState, Timestamp};

use crate::builtin::{default_strategies, EmotionDrivenRule, StateRule, TimeAwareRule};
use crate::catalog::{CatalogRule, StrategyCatalog};
use crate::condition::{ConditionEvaluator, CustomPredicate};
use crate::cooldown::CooldownTracker;
use crate::error::{ImportError, ValidationError};
use crate::stats::{ExecutionStats, StatsStore};
use crate::strategy::{BehaviorRule, Strategy};
use crate::types::{Behavior, ExecutionContext, StrategySummary};

pub struct StrategyManager {
    catalog: Arc<StrategyCatalog>,
    cooldowns: Arc<CooldownTracker>,
    stats: Arc<StatsStore>,
    evaluator: ConditionEvaluator,
}

impl StrategyManager {
    pub fn new(catalog: Arc<StrategyCatalog>) -> Self {
        Self {
            catalog,
            cooldowns: Arc::new(CooldownTracker::new()),
            stats: Arc::new(StatsStore::new()),
            evaluator: ConditionEvaluator::new(),
        }
    }

    /// Register the code-defined capability rules.
    pub fn register_builtin_rules(&self) {
        for rule in StateRule::all() {
            self.catalog.register_rule(Arc::new(rule));
        }
        self.catalog.register_rule(Arc::new(EmotionDrivenRule));
        self.catalog.register_rule(Arc::new(TimeAwareRule));
    }

    /// Register the stock strategy records.
    pub fn register_default_strategies(&self) -> Result<(), ValidationError> {
        for strategy in default_strategies()? {
            self.catalog.register_strategy(strategy)?;
        }
        Ok(())
    }

    /// A manager over a fresh catalog holding the built-in rules and stock records.
    pub fn with_builtin_rules() -> Result<Self, ValidationError> {
        let manager = Self::new(Arc::new(StrategyCatalog::new()));
        manager.register_builtin_rules();
        manager.register_default_strategies()?;
        Ok(manager)
    }

    pub fn catalog(&self) -> &Arc<StrategyCatalog> {
        &self.catalog
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    pub fn stats(&self) -> &Arc<StatsStore> {
        &self.stats
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    pub fn register_predicate(&self, key: impl Into<String>, predicate: CustomPredicate) {
        self.evaluator.register_predicate(key, predicate);
    }

    // =========================================================================
    // Catalog management
    // =========================================================================

    pub fn register_strategy(&self, strategy: Strategy) -> Result<(), ValidationError> {
        self.catalog.register_strategy(strategy)
    }

    pub fn register_rule(&self, rule: Arc<dyn BehaviorRule>) {
        self.catalog.register_rule(rule);
    }

    /// Remove a rule and forget its cooldown and statistics.
    pub fn remove_strategy(&self, strategy_id: &str) -> bool {
        let removed = self.catalog.remove(strategy_id);
        if removed {
            self.cooldowns.forget(strategy_id);
            self.stats.remove(strategy_id);
        }
        removed
    }

    pub fn set_strategy_enabled(&self, strategy_id: &str, enabled: bool) -> bool {
        self.catalog.set_enabled(strategy_id, enabled)
    }

    pub fn get_strategies(&self) -> Vec<StrategySummary> {
        self.catalog.summaries()
    }

    pub fn export_catalog(&self) -> Result<String, serde_json::Error> {
        self.catalog.export_json()
    }

    pub fn import_catalog(&self, json: &str) -> Result<usize, ImportError> {
        self.catalog.import_json(json)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Eligible rules for the pair, highest priority first, ties in registration order.
    ///
    /// Without a context, declared conditions and `can_apply` are not
    /// evaluated and cooldowns are checked against the wall clock.
    pub fn get_matching_strategies(
        &self,
        state: PetState,
        emotion: EmotionType,
        ctx: Option<&ExecutionContext>,
    ) -> Vec<Arc<dyn BehaviorRule>> {
        let now = ctx.map_or_else(Timestamp::now, |c| c.timestamp);
        let mut matching: Vec<Arc<dyn BehaviorRule>> = self
            .catalog
            .snapshot()
            .into_iter()
            .filter(|entry| self.is_eligible(entry, state, emotion, ctx, now))
            .map(|entry| entry.rule)
            .collect();
        // Stable: equal priorities keep registration order.
        matching.sort_by(|a, b| b.priority().cmp(&a.priority()));
        matching
    }

    fn is_eligible(
        &self,
        entry: &CatalogRule,
        state: PetState,
        emotion: EmotionType,
        ctx: Option<&ExecutionContext>,
        now: Timestamp,
    ) -> bool {
        let rule = &entry.rule;
        if !entry.enabled || !rule.applies_to(state, emotion) {
            return false;
        }
        if !self.evaluator.evaluate_all(rule.conditions(), ctx) {
            return false;
        }
        if let Some(ctx) = ctx {
            if !rule.can_apply(ctx) {
                return false;
            }
        }
        if !self.cooldowns.may_fire(rule.id(), rule.cooldown_ms(), now) {
            tracing::trace!(
                strategy_id = %rule.id(),
                remaining_ms = self.cooldowns.remaining_ms(rule.id(), rule.cooldown_ms(), now),
                "Strategy cooling down"
            );
            return false;
        }
        if let Some(max) = rule.max_executions() {
            if self.stats.execution_count(rule.id()) >= max {
                tracing::trace!(strategy_id = %rule.id(), max, "Strategy reached execution cap");
                return false;
            }
        }
        true
    }

    /// Every eligible rule's behaviors, deduplicated by type.
    pub fn generate_behaviors(&self, ctx: &ExecutionContext) -> Vec<Behavior> {
        let behaviors: Vec<Behavior> = self
            .get_matching_strategies(ctx.state, ctx.emotion_type(), Some(ctx))
            .iter()
            .flat_map(|rule| rule.generate(ctx))
            .collect();
        dedup_by_type(behaviors)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    pub fn get_execution_stats(&self) -> Vec<ExecutionStats> {
        self.stats.all()
    }

    pub fn get_strategy_stats(&self, strategy_id: &str) -> Option<ExecutionStats> {
        self.stats.get(strategy_id)
    }

    /// Drop all statistics and cooldowns.
    pub fn clear_stats(&self) {
        self.stats.clear();
        self.cooldowns.reset();
    }
}

/// Keep only the highest-priority behavior of each type, ordered by priority.
///
/// On equal priority the earlier behavior wins.
pub fn dedup_by_type(mut behaviors: Vec<Behavior>) -> Vec<Behavior> {
    behaviors.sort_by(|a, b| b.priority.cmp(&a.priority));
    let mut seen = HashSet::new();
    behaviors.retain(|b| seen.insert(b.behavior_type.clone()));
    behaviors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, ConditionKind, Operator};
    use crate::strategy::ActionSpec;
    use crate::types::{BehaviorType, Environment};
    use serde_json::json;

    fn record(id: &str, state: PetState, emotion: EmotionType, priority: i32) -> Strategy {
        Strategy::builder(id, id)
            .states([state])
            .emotions([emotion])
            .priority(priority)
            .action(ActionSpec::new("idle_animation"))
            .build()
            .unwrap()
    }

    fn manager() -> StrategyManager {
        StrategyManager::new(Arc::new(StrategyCatalog::new()))
    }

    fn ctx(state: PetState, emotion: EmotionType, at: i64) -> ExecutionContext {
        ExecutionContext::new(state, emotion, Timestamp(at)).with_environment(Environment::at(14, 0))
    }

    fn ids(rules: &[Arc<dyn BehaviorRule>]) -> Vec<&str> {
        rules.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn test_matching_sorted_by_priority_then_registration() {
        let m = manager();
        m.register_strategy(record("low", PetState::Idle, EmotionType::Calm, 1)).unwrap();
        m.register_strategy(record("tie_a", PetState::Idle, EmotionType::Calm, 5)).unwrap();
        m.register_strategy(record("high", PetState::Idle, EmotionType::Calm, 9)).unwrap();
        m.register_strategy(record("tie_b", PetState::Idle, EmotionType::Calm, 5)).unwrap();
        m.register_strategy(record("other", PetState::Hover, EmotionType::Calm, 10)).unwrap();

        let matching = m.get_matching_strategies(PetState::Idle, EmotionType::Calm, None);
        assert_eq!(ids(&matching), vec!["high", "tie_a", "tie_b", "low"]);
    }

    #[test]
    fn test_disabled_strategies_excluded() {
        let m = manager();
        m.register_strategy(record("a", PetState::Idle, EmotionType::Calm, 1)).unwrap();
        m.set_strategy_enabled("a", false);
        assert!(m
            .get_matching_strategies(PetState::Idle, EmotionType::Calm, None)
            .is_empty());
    }

    #[test]
    fn test_conditions_filter_with_context_only() {
        let m = manager();
        let s = Strategy::builder("intense", "Intense")
            .states([PetState::Idle])
            .emotions([EmotionType::Happy])
            .condition(Condition::new(
                ConditionKind::EmotionIntensity,
                Operator::Gt,
                json!(0.8),
            ))
            .action(ActionSpec::new("emotional_expression"))
            .build()
            .unwrap();
        m.register_strategy(s).unwrap();

        let calm_ctx = ctx(PetState::Idle, EmotionType::Happy, 0).with_intensity(0.5);
        let hot_ctx = ctx(PetState::Idle, EmotionType::Happy, 0).with_intensity(0.9);
        assert!(m
            .get_matching_strategies(PetState::Idle, EmotionType::Happy, Some(&calm_ctx))
            .is_empty());
        assert_eq!(
            m.get_matching_strategies(PetState::Idle, EmotionType::Happy, Some(&hot_ctx))
                .len(),
            1
        );
        assert_eq!(
            m.get_matching_strategies(PetState::Idle, EmotionType::Happy, None)
                .len(),
            1
        );
    }

    #[test]
    fn test_cooldown_excludes_until_elapsed() {
        let m = manager();
        let s = Strategy::builder("burst", "Burst")
            .states([PetState::Awaken])
            .emotions([EmotionType::Excited])
            .priority(9)
            .cooldown_ms(5_000)
            .action(ActionSpec::new("awaken_response"))
            .build()
            .unwrap();
        m.register_strategy(s).unwrap();
        m.cooldowns().mark_fired("burst", Timestamp(1_000));

        let during = ctx(PetState::Awaken, EmotionType::Excited, 5_999);
        let after = ctx(PetState::Awaken, EmotionType::Excited, 6_000);
        assert!(m
            .get_matching_strategies(PetState::Awaken, EmotionType::Excited, Some(&during))
            .is_empty());
        assert_eq!(
            m.get_matching_strategies(PetState::Awaken, EmotionType::Excited, Some(&after))
                .len(),
            1
        );
    }

    #[test]
    fn test_max_executions_cap() {
        let m = manager();
        let s = Strategy::builder("once", "Once")
            .states([PetState::Idle])
            .emotions([EmotionType::Calm])
            .max_executions(1)
            .action(ActionSpec::new("idle_animation"))
            .build()
            .unwrap();
        m.register_strategy(s).unwrap();
        assert_eq!(
            m.get_matching_strategies(PetState::Idle, EmotionType::Calm, None)
                .len(),
            1
        );
        m.stats().record_execution("once", Timestamp(0), 10, true);
        assert!(m
            .get_matching_strategies(PetState::Idle, EmotionType::Calm, None)
            .is_empty());
    }

    #[test]
    fn test_query_is_idempotent_and_side_effect_free() {
        let m = StrategyManager::with_builtin_rules().unwrap();
        let c = ctx(PetState::Awaken, EmotionType::Excited, 10_000).with_intensity(0.9);
        let first = m.get_matching_strategies(PetState::Awaken, EmotionType::Excited, Some(&c));
        let second = m.get_matching_strategies(PetState::Awaken, EmotionType::Excited, Some(&c));
        assert_eq!(ids(&first), ids(&second));
        let _ = m.generate_behaviors(&c);
        assert!(m.get_execution_stats().is_empty());
        assert!(m.cooldowns().last_fired("excited_awaken_highpower").is_none());
    }

    #[test]
    fn test_generate_dedups_keeping_max_priority() {
        let m = manager();
        m.register_strategy(record("low", PetState::Idle, EmotionType::Calm, 2)).unwrap();
        m.register_strategy(record("high", PetState::Idle, EmotionType::Calm, 7)).unwrap();
        let behaviors = m.generate_behaviors(&ctx(PetState::Idle, EmotionType::Calm, 0));
        assert_eq!(behaviors.len(), 1);
        assert_eq!(behaviors[0].priority, 7);
        assert_eq!(behaviors[0].strategy_id, "high");
    }

    #[test]
    fn test_generate_with_builtin_rules() {
        let m = StrategyManager::with_builtin_rules().unwrap();
        let c = ctx(PetState::Awaken, EmotionType::Excited, 0).with_intensity(0.9);
        let behaviors = m.generate_behaviors(&c);
        let types: Vec<&BehaviorType> = behaviors.iter().map(|b| &b.behavior_type).collect();
        // excited_awaken_highpower (p10), celebration_video (p8), emotion_driven (p9 / p6),
        // awaken_state (p8 / p7)
        assert_eq!(behaviors[0].strategy_id, "excited_awaken_highpower");
        assert!(types.contains(&&BehaviorType::EmotionalExpression));
        assert!(types.contains(&&BehaviorType::AnimationSequence));
        assert!(types.contains(&&BehaviorType::Custom("celebration_start".into())));
        let plugin_triggers = types
            .iter()
            .filter(|t| ***t == BehaviorType::PluginTrigger)
            .count();
        assert_eq!(plugin_triggers, 1);
    }

    #[test]
    fn test_dedup_by_type() {
        let behaviors = vec![
            Behavior::new(BehaviorType::IdleAnimation, 3).from_strategy("a"),
            Behavior::new(BehaviorType::UserPrompt, 4).from_strategy("a"),
            Behavior::new(BehaviorType::IdleAnimation, 5).from_strategy("b"),
            Behavior::new(BehaviorType::UserPrompt, 4).from_strategy("b"),
        ];
        let deduped = dedup_by_type(behaviors);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].behavior_type, BehaviorType::IdleAnimation);
        assert_eq!(deduped[0].strategy_id, "b");
        assert_eq!(deduped[1].behavior_type, BehaviorType::UserPrompt);
        assert_eq!(deduped[1].strategy_id, "a");
    }

    #[test]
    fn test_remove_forgets_cooldown() {
        let m = manager();
        m.register_strategy(record("a", PetState::Idle, EmotionType::Calm, 1)).unwrap();
        m.cooldowns().mark_fired("a", Timestamp(0));
        assert!(m.remove_strategy("a"));
        assert!(m.cooldowns().last_fired("a").is_none());
    }

    #[test]
    fn test_remove_clears_stats_for_reregistered_id() {
        let m = manager();
        m.register_strategy(record("a", PetState::Idle, EmotionType::Calm, 1)).unwrap();
        m.stats().record_execution("a", Timestamp(0), 10, true);
        m.stats().record_error("a", "sprite missing".to_string(), Timestamp(0));
        assert!(m.remove_strategy("a"));
        assert!(m.get_strategy_stats("a").is_none());

        let capped = Strategy::builder("a", "a")
            .states([PetState::Idle])
            .emotions([EmotionType::Calm])
            .max_executions(1)
            .action(ActionSpec::new("idle_animation"))
            .build()
            .unwrap();
        m.register_strategy(capped).unwrap();
        assert_eq!(
            m.get_matching_strategies(PetState::Idle, EmotionType::Calm, None)
                .len(),
            1
        );
        assert!(!m.remove_strategy("missing"));
    }

    #[test]
    fn test_custom_predicate_through_manager() {
        let m = manager();
        let s = Strategy::builder("vip", "VIP")
            .states([PetState::Hover])
            .emotions([EmotionType::Happy])
            .condition(Condition::custom("is_vip"))
            .action(ActionSpec::new("hover_feedback"))
            .build()
            .unwrap();
        m.register_strategy(s).unwrap();
        m.register_predicate(
            "is_vip",
            CustomPredicate::new(|c| {
                c.user_context
                    .as_ref()
                    .and_then(|u| u.get("vip"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            }),
        );

        let plain = ctx(PetState::Hover, EmotionType::Happy, 0);
        let vip = plain.clone().with_user_context(json!({"vip": true}));
        assert!(m.generate_behaviors(&plain).is_empty());
        assert_eq!(m.generate_behaviors(&vip).len(), 1);
    }
}
