//! Strategy records and the rule capability every decision source implements.
//!
//! Persisted records, built-in capability rules and the legacy fallback table
//! all reach the manager as `dyn BehaviorRule`, so the query path never
//! branches on where a rule came from.

use std::fmt;

use companion_core::types::{EmotionType, PetState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::condition::Condition;
use crate::error::{FieldViolation, ValidationError};
use crate::types::{Behavior, BehaviorType, ExecutionContext, RuleOrigin};

/// A decision rule.
pub trait BehaviorRule: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    /// Higher wins.
    fn priority(&self) -> i32;

    fn origin(&self) -> RuleOrigin;

    /// State-set and emotion-set membership.
    fn applies_to(&self, state: PetState, emotion: EmotionType) -> bool;

    fn conditions(&self) -> &[Condition] {
        &[]
    }

    fn cooldown_ms(&self) -> Option<u64> {
        None
    }

    fn max_executions(&self) -> Option<u64> {
        None
    }

    /// Rule-specific check on top of declared conditions.
    fn can_apply(&self, _ctx: &ExecutionContext) -> bool {
        true
    }

    fn generate(&self, ctx: &ExecutionContext) -> Vec<Behavior>;

    /// The persisted record, for rules that have one.
    fn record(&self) -> Option<&Strategy> {
        None
    }
}

// =============================================================================
// Records
// =============================================================================

/// One action of a strategy record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default, alias = "delay", skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Overrides the strategy priority for this action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

impl ActionSpec {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            ..Self::default()
        }
    }

    pub fn delay(mut self, ms: u64) -> Self {
        self.delay_ms = Some(ms);
        self
    }

    pub fn duration(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    pub fn animation(mut self, animation: impl Into<String>) -> Self {
        self.animation = Some(animation.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn to_behavior(&self, strategy: &Strategy) -> Behavior {
        let mut payload = self.payload.clone();
        if let Some(id) = &self.id {
            payload.insert("actionId".to_string(), Value::String(id.clone()));
        }
        Behavior {
            behavior_type: BehaviorType::from(self.action_type.as_str()),
            priority: self.priority.unwrap_or(strategy.priority),
            delay_ms: self.delay_ms,
            duration_ms: self.duration_ms,
            animation: self.animation.clone(),
            message: self.message.clone(),
            plugin_id: self.plugin_id.clone(),
            payload,
            strategy_id: strategy.id.clone(),
        }
    }
}

/// A persisted strategy record.
///
/// Deserializing goes through [`StrategyDraft`], so a record that parses is
/// always valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StrategyDraft")]
pub struct Strategy {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub states: Vec<PetState>,
    pub emotions: Vec<EmotionType>,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_executions: Option<u64>,
    pub enabled: bool,
    pub actions: Vec<ActionSpec>,
}

impl Strategy {
    /// Start a record with the required fields; chain the rest.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> StrategyBuilder {
        StrategyBuilder {
            strategy: Strategy {
                id: id.into(),
                name: name.into(),
                description: None,
                states: Vec::new(),
                emotions: Vec::new(),
                priority: 0,
                conditions: Vec::new(),
                cooldown_ms: None,
                max_executions: None,
                enabled: true,
                actions: Vec::new(),
            },
        }
    }

    /// Check the record, collecting every violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        if self.id.trim().is_empty() {
            violations.push(FieldViolation::new("id", "must not be empty"));
        }
        if self.name.trim().is_empty() {
            violations.push(FieldViolation::new("name", "must not be empty"));
        }
        if self.states.is_empty() {
            violations.push(FieldViolation::new("states", "must list at least one state"));
        }
        if self.emotions.is_empty() {
            violations.push(FieldViolation::new(
                "emotions",
                "must list at least one emotion",
            ));
        }
        validate_actions(&self.actions, &mut violations);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                strategy_id: self.id.clone(),
                violations,
            })
        }
    }
}

fn validate_actions(actions: &[ActionSpec], violations: &mut Vec<FieldViolation>) {
    if actions.is_empty() {
        violations.push(FieldViolation::new(
            "actions",
            "must list at least one action",
        ));
    }
    for (i, action) in actions.iter().enumerate() {
        if action.action_type.trim().is_empty() {
            violations.push(FieldViolation::new(
                format!("actions[{}].type", i),
                "must not be empty",
            ));
        }
    }
}

pub struct StrategyBuilder {
    strategy: Strategy,
}

impl StrategyBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.strategy.description = Some(description.into());
        self
    }

    pub fn states(mut self, states: impl IntoIterator<Item = PetState>) -> Self {
        self.strategy.states = states.into_iter().collect();
        self
    }

    pub fn emotions(mut self, emotions: impl IntoIterator<Item = EmotionType>) -> Self {
        self.strategy.emotions = emotions.into_iter().collect();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.strategy.priority = priority;
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.strategy.conditions.push(condition);
        self
    }

    pub fn cooldown_ms(mut self, ms: u64) -> Self {
        self.strategy.cooldown_ms = Some(ms);
        self
    }

    pub fn max_executions(mut self, max: u64) -> Self {
        self.strategy.max_executions = Some(max);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.strategy.enabled = enabled;
        self
    }

    pub fn action(mut self, action: ActionSpec) -> Self {
        self.strategy.actions.push(action);
        self
    }

    pub fn build(self) -> Result<Strategy, ValidationError> {
        self.strategy.validate()?;
        Ok(self.strategy)
    }
}

/// Loosely-typed record as read from an external source.
///
/// Everything is optional or stringly typed so that validation can report all
/// problems at once instead of stopping at the first serde error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDraft {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub emotions: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
    #[serde(default)]
    pub max_executions: Option<u64>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl StrategyDraft {
    pub fn validate(self) -> Result<Strategy, ValidationError> {
        let mut violations = Vec::new();
        if self.id.trim().is_empty() {
            violations.push(FieldViolation::new("id", "must not be empty"));
        }
        if self.name.trim().is_empty() {
            violations.push(FieldViolation::new("name", "must not be empty"));
        }

        if self.states.is_empty() {
            violations.push(FieldViolation::new("states", "must list at least one state"));
        }
        let mut states = Vec::with_capacity(self.states.len());
        for (i, raw) in self.states.iter().enumerate() {
            match raw.parse::<PetState>() {
                Ok(state) => states.push(state),
                Err(_) => violations.push(FieldViolation::new(
                    format!("states[{}]", i),
                    format!("unknown state '{}'", raw),
                )),
            }
        }

        if self.emotions.is_empty() {
            violations.push(FieldViolation::new(
                "emotions",
                "must list at least one emotion",
            ));
        }
        let mut emotions = Vec::with_capacity(self.emotions.len());
        for (i, raw) in self.emotions.iter().enumerate() {
            match raw.parse::<EmotionType>() {
                Ok(emotion) => emotions.push(emotion),
                Err(_) => violations.push(FieldViolation::new(
                    format!("emotions[{}]", i),
                    format!("unknown emotion '{}'", raw),
                )),
            }
        }

        validate_actions(&self.actions, &mut violations);

        if !violations.is_empty() {
            return Err(ValidationError {
                strategy_id: self.id,
                violations,
            });
        }

        Ok(Strategy {
            id: self.id,
            name: self.name,
            description: self.description,
            states,
            emotions,
            priority: self.priority,
            conditions: self.conditions,
            cooldown_ms: self.cooldown_ms,
            max_executions: self.max_executions,
            enabled: self.enabled.unwrap_or(true),
            actions: self.actions,
        })
    }
}

impl TryFrom<StrategyDraft> for Strategy {
    type Error = ValidationError;

    fn try_from(draft: StrategyDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

// =============================================================================
// Record-backed rule
// =============================================================================

/// Adapts a [`Strategy`] record to [`BehaviorRule`].
#[derive(Debug, Clone)]
pub struct StrategyRule {
    strategy: Strategy,
}

impl StrategyRule {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy }
    }
}

impl BehaviorRule for StrategyRule {
    fn id(&self) -> &str {
        &self.strategy.id
    }

    fn name(&self) -> &str {
        &self.strategy.name
    }

    fn description(&self) -> Option<&str> {
        self.strategy.description.as_deref()
    }

    fn priority(&self) -> i32 {
        self.strategy.priority
    }

    fn origin(&self) -> RuleOrigin {
        RuleOrigin::Record
    }

    fn applies_to(&self, state: PetState, emotion: EmotionType) -> bool {
        self.strategy.states.contains(&state) && self.strategy.emotions.contains(&emotion)
    }

    fn conditions(&self) -> &[Condition] {
        &self.strategy.conditions
    }

    fn cooldown_ms(&self) -> Option<u64> {
        self.strategy.cooldown_ms
    }

    fn max_executions(&self) -> Option<u64> {
        self.strategy.max_executions
    }

    fn generate(&self, _ctx: &ExecutionContext) -> Vec<Behavior> {
        self.strategy
            .actions
            .iter()
            .map(|action| action.to_behavior(&self.strategy))
            .collect()
    }

    fn record(&self) -> Option<&Strategy> {
        Some(&self.strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionKind, Operator};
    use companion_core::types::Timestamp;
    use serde_json::json;

    fn curious_explore() -> Strategy {
        Strategy::builder("curious_awaken_explore", "Curious exploration")
            .states([PetState::Awaken])
            .emotions([EmotionType::Curious])
            .priority(8)
            .cooldown_ms(5_000)
            .action(ActionSpec::new("plugin_trigger").delay(300).plugin("explorer"))
            .action(ActionSpec::new("user_prompt").delay(800).message("Want to look around?"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_produces_valid_record() {
        let s = curious_explore();
        assert!(s.enabled);
        assert_eq!(s.actions.len(), 2);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let err = Strategy::builder("", " ").build().unwrap_err();
        assert_eq!(err.fields(), vec!["id", "name", "states", "emotions", "actions"]);
    }

    #[test]
    fn test_empty_action_type_is_rejected() {
        let err = Strategy::builder("s", "S")
            .states([PetState::Idle])
            .emotions([EmotionType::Calm])
            .action(ActionSpec::new("idle_animation"))
            .action(ActionSpec::new(""))
            .build()
            .unwrap_err();
        assert_eq!(err.fields(), vec!["actions[1].type"]);
    }

    #[test]
    fn test_draft_reports_unknown_enums() {
        let draft: StrategyDraft = serde_json::from_value(json!({
            "id": "odd",
            "name": "Odd",
            "states": ["idle", "asleep"],
            "emotions": ["grumpy"],
            "actions": []
        }))
        .unwrap();
        let err = draft.validate().unwrap_err();
        assert_eq!(err.strategy_id, "odd");
        assert_eq!(err.fields(), vec!["states[1]", "emotions[0]", "actions"]);
    }

    #[test]
    fn test_record_json_uses_camel_case() {
        let json = serde_json::to_value(curious_explore()).unwrap();
        assert_eq!(json["cooldownMs"], 5_000);
        assert_eq!(json["states"], json!(["awaken"]));
        assert_eq!(json["actions"][0]["delayMs"], 300);
        assert_eq!(json["actions"][0]["pluginId"], "explorer");
        assert!(json.get("maxExecutions").is_none());
    }

    #[test]
    fn test_record_deserialize_validates() {
        let ok: Strategy = serde_json::from_value(json!({
            "id": "sleepy_idle_rest",
            "name": "Sleepy rest",
            "states": ["idle"],
            "emotions": ["sleepy"],
            "priority": 3,
            "conditions": [{"type": "emotion_intensity", "operator": "gte", "value": 0.6}],
            "cooldownMs": 10000,
            "actions": [{"type": "idle_animation", "duration": 4000}]
        }))
        .unwrap();
        assert!(ok.enabled);
        assert_eq!(ok.actions[0].duration_ms, Some(4_000));
        assert_eq!(ok.conditions[0].kind, ConditionKind::EmotionIntensity);
        assert_eq!(ok.conditions[0].operator, Operator::Gte);

        let bad = serde_json::from_value::<Strategy>(json!({"id": "x", "name": "X"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_strategy_rule_generates_behaviors_in_order() {
        let rule = StrategyRule::new(curious_explore());
        let ctx = ExecutionContext::new(PetState::Awaken, EmotionType::Curious, Timestamp(0));
        assert!(rule.applies_to(PetState::Awaken, EmotionType::Curious));
        assert!(!rule.applies_to(PetState::Idle, EmotionType::Curious));

        let behaviors = rule.generate(&ctx);
        assert_eq!(behaviors.len(), 2);
        assert_eq!(behaviors[0].behavior_type, BehaviorType::PluginTrigger);
        assert_eq!(behaviors[0].priority, 8);
        assert_eq!(behaviors[0].strategy_id, "curious_awaken_explore");
        assert_eq!(behaviors[1].message.as_deref(), Some("Want to look around?"));
    }

    #[test]
    fn test_action_priority_override_and_id() {
        let mut s = curious_explore();
        s.actions[1].priority = Some(2);
        s.actions[1].id = Some("prompt".to_string());
        let behaviors = StrategyRule::new(s).generate(&ExecutionContext::new(
            PetState::Awaken,
            EmotionType::Curious,
            Timestamp(0),
        ));
        assert_eq!(behaviors[1].priority, 2);
        assert_eq!(behaviors[1].payload["actionId"], "prompt");
    }
}
