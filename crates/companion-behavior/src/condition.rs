//! Condition evaluation for strategy eligibility.
//!
//! A condition names a context field, an operator and a threshold. All of a
//! strategy's conditions must hold for it to be eligible.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ExecutionContext;

/// Context field a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    EmotionIntensity,
    /// Local hour of day.
    TimeRange,
    SystemLoad,
    /// Milliseconds since the last interaction.
    IdleTime,
    /// Named predicate registered on the evaluator.
    Custom,
    /// Anything this build does not know. Always passes.
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    #[default]
    Eq,
    In,
    Between,
    /// Never satisfied.
    #[serde(other)]
    Unsupported,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Gt => write!(f, "gt"),
            Operator::Gte => write!(f, "gte"),
            Operator::Lt => write!(f, "lt"),
            Operator::Lte => write!(f, "lte"),
            Operator::Eq => write!(f, "eq"),
            Operator::In => write!(f, "in"),
            Operator::Between => write!(f, "between"),
            Operator::Unsupported => write!(f, "unsupported"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub operator: Operator,
    /// Number for comparisons, array for `in`, `[lo, hi]` for `between`.
    #[serde(default)]
    pub value: Value,
    /// Predicate name for `custom` conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Condition {
    pub fn new(kind: ConditionKind, operator: Operator, value: Value) -> Self {
        Self {
            kind,
            operator,
            value,
            key: None,
        }
    }

    pub fn custom(key: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Custom,
            operator: Operator::Eq,
            value: Value::Null,
            key: Some(key.into()),
        }
    }
}

/// Caller-supplied check for `custom` conditions.
#[derive(Clone)]
pub struct CustomPredicate(Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>);

impl CustomPredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn check(&self, ctx: &ExecutionContext) -> bool {
        (self.0)(ctx)
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomPredicate(..)")
    }
}

/// Evaluates conditions against an execution context.
#[derive(Debug, Default)]
pub struct ConditionEvaluator {
    predicates: RwLock<HashMap<String, CustomPredicate>>,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the predicate that `custom` conditions with this key call.
    pub fn register_predicate(&self, key: impl Into<String>, predicate: CustomPredicate) {
        let key = key.into();
        tracing::debug!(key = %key, "Custom condition predicate registered");
        self.predicates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, predicate);
    }

    /// AND of every condition. With no context the conditions are not evaluated.
    pub fn evaluate_all(&self, conditions: &[Condition], ctx: Option<&ExecutionContext>) -> bool {
        match ctx {
            Some(ctx) => conditions.iter().all(|c| self.evaluate(c, ctx)),
            None => true,
        }
    }

    pub fn evaluate(&self, condition: &Condition, ctx: &ExecutionContext) -> bool {
        let actual = match condition.kind {
            ConditionKind::EmotionIntensity => ctx.emotion.intensity,
            ConditionKind::TimeRange => f64::from(ctx.environment.hour),
            ConditionKind::SystemLoad => ctx.environment.system_load,
            ConditionKind::IdleTime => ctx.environment.idle_ms as f64,
            ConditionKind::Custom => return self.evaluate_custom(condition, ctx),
            ConditionKind::Unsupported => {
                tracing::warn!(
                    operator = %condition.operator,
                    "Unsupported condition type treated as satisfied"
                );
                return true;
            }
        };
        compare(actual, condition.operator, &condition.value)
    }

    fn evaluate_custom(&self, condition: &Condition, ctx: &ExecutionContext) -> bool {
        let Some(key) = condition.key.as_deref() else {
            return true;
        };
        let predicates = self.predicates.read().unwrap_or_else(|e| e.into_inner());
        match predicates.get(key) {
            Some(predicate) => predicate.check(ctx),
            None => {
                tracing::debug!(key = %key, "No predicate registered for custom condition");
                true
            }
        }
    }
}

/// Compare a context value against a threshold. Malformed thresholds never match.
pub fn compare(actual: f64, operator: Operator, expected: &Value) -> bool {
    match operator {
        Operator::Gt => expected.as_f64().is_some_and(|e| actual > e),
        Operator::Gte => expected.as_f64().is_some_and(|e| actual >= e),
        Operator::Lt => expected.as_f64().is_some_and(|e| actual < e),
        Operator::Lte => expected.as_f64().is_some_and(|e| actual <= e),
        Operator::Eq => expected
            .as_f64()
            .is_some_and(|e| (actual - e).abs() < f64::EPSILON),
        Operator::In => expected.as_array().is_some_and(|values| {
            values
                .iter()
                .filter_map(Value::as_f64)
                .any(|e| (actual - e).abs() < f64::EPSILON)
        }),
        Operator::Between => match expected.as_array().map(Vec::as_slice) {
            Some([lo, hi]) => match (lo.as_f64(), hi.as_f64()) {
                (Some(lo), Some(hi)) => lo <= actual && actual <= hi,
                _ => false,
            },
            _ => false,
        },
        Operator::Unsupported => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Environment;
    use companion_core::types::{EmotionType, PetState, Timestamp};
    use serde_json::json;

    fn ctx(intensity: f64, hour: u32) -> ExecutionContext {
        ExecutionContext::new(PetState::Idle, EmotionType::Calm, Timestamp(0))
            .with_intensity(intensity)
            .with_environment(Environment::at(hour, 0))
    }

    #[test]
    fn test_comparison_operators() {
        assert!(compare(0.9, Operator::Gt, &json!(0.8)));
        assert!(!compare(0.8, Operator::Gt, &json!(0.8)));
        assert!(compare(0.8, Operator::Gte, &json!(0.8)));
        assert!(compare(0.5, Operator::Lt, &json!(0.8)));
        assert!(compare(0.8, Operator::Lte, &json!(0.8)));
        assert!(compare(3.0, Operator::Eq, &json!(3)));
        assert!(!compare(3.0, Operator::Eq, &json!(4)));
    }

    #[test]
    fn test_in_and_between() {
        assert!(compare(9.0, Operator::In, &json!([8, 9, 10])));
        assert!(!compare(11.0, Operator::In, &json!([8, 9, 10])));
        assert!(compare(22.0, Operator::Between, &json!([22, 23])));
        assert!(compare(23.0, Operator::Between, &json!([22, 23])));
        assert!(!compare(21.0, Operator::Between, &json!([22, 23])));
    }

    #[test]
    fn test_malformed_thresholds_fail() {
        assert!(!compare(1.0, Operator::Gt, &json!("high")));
        assert!(!compare(1.0, Operator::In, &json!(1)));
        assert!(!compare(1.0, Operator::Between, &json!([0])));
        assert!(!compare(1.0, Operator::Between, &json!(["a", 2])));
        assert!(!compare(1.0, Operator::Unsupported, &json!(1)));
    }

    #[test]
    fn test_unknown_operator_deserializes_and_fails() {
        let c: Condition =
            serde_json::from_value(json!({"type": "emotion_intensity", "operator": "approx", "value": 0.5}))
                .unwrap();
        assert_eq!(c.operator, Operator::Unsupported);
        assert!(!ConditionEvaluator::new().evaluate(&c, &ctx(0.5, 12)));
    }

    #[test]
    fn test_unknown_condition_type_passes() {
        let c: Condition =
            serde_json::from_value(json!({"type": "weather", "operator": "eq", "value": "rain"}))
                .unwrap();
        assert_eq!(c.kind, ConditionKind::Unsupported);
        assert!(ConditionEvaluator::new().evaluate(&c, &ctx(0.0, 0)));
    }

    #[test]
    fn test_fields_are_read_from_context() {
        let evaluator = ConditionEvaluator::new();
        let context = ctx(0.65, 23);
        let intensity = Condition::new(ConditionKind::EmotionIntensity, Operator::Gte, json!(0.6));
        let night = Condition::new(ConditionKind::TimeRange, Operator::Between, json!([22, 23]));
        let busy = Condition::new(ConditionKind::SystemLoad, Operator::Gt, json!(0.9));
        assert!(evaluator.evaluate(&intensity, &context));
        assert!(evaluator.evaluate(&night, &context));
        assert!(!evaluator.evaluate(&busy, &context));
    }

    #[test]
    fn test_idle_time_condition() {
        let evaluator = ConditionEvaluator::new();
        let long_idle = Condition::new(ConditionKind::IdleTime, Operator::Gt, json!(120_000));
        let context = ctx(0.5, 12).with_environment(Environment::at(12, 180_000));
        assert!(evaluator.evaluate(&long_idle, &context));
        assert!(!evaluator.evaluate(&long_idle, &ctx(0.5, 12)));
    }

    #[test]
    fn test_evaluate_all_is_conjunction() {
        let evaluator = ConditionEvaluator::new();
        let conditions = vec![
            Condition::new(ConditionKind::EmotionIntensity, Operator::Gt, json!(0.5)),
            Condition::new(ConditionKind::TimeRange, Operator::Lt, json!(12)),
        ];
        assert!(evaluator.evaluate_all(&conditions, Some(&ctx(0.9, 8))));
        assert!(!evaluator.evaluate_all(&conditions, Some(&ctx(0.9, 14))));
        assert!(evaluator.evaluate_all(&[], Some(&ctx(0.0, 0))));
    }

    #[test]
    fn test_no_context_skips_evaluation() {
        let evaluator = ConditionEvaluator::new();
        let impossible = vec![Condition::new(
            ConditionKind::EmotionIntensity,
            Operator::Gt,
            json!(2.0),
        )];
        assert!(evaluator.evaluate_all(&impossible, None));
    }

    #[test]
    fn test_custom_predicates() {
        let evaluator = ConditionEvaluator::new();
        evaluator.register_predicate(
            "has_user",
            CustomPredicate::new(|ctx| ctx.user_context.is_some()),
        );

        let with_user = ctx(0.5, 12).with_user_context(json!({"name": "Ada"}));
        assert!(evaluator.evaluate(&Condition::custom("has_user"), &with_user));
        assert!(!evaluator.evaluate(&Condition::custom("has_user"), &ctx(0.5, 12)));

        // Unregistered or unnamed custom conditions pass.
        assert!(evaluator.evaluate(&Condition::custom("missing"), &ctx(0.5, 12)));
        let unnamed = Condition::new(ConditionKind::Custom, Operator::Eq, Value::Null);
        assert!(evaluator.evaluate(&unnamed, &ctx(0.5, 12)));
    }
}
