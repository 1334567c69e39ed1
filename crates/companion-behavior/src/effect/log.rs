//! Effects that only report through the log.
//!
//! The visual layer reacts to `BehaviorExecuted` events, so for animation-like
//! behaviors logging is the whole effect.

use async_trait::async_trait;

use crate::effect::{BehaviorEffect, EffectOutcome};
use crate::error::ActionError;
use crate::types::{Behavior, ExecutionContext};

/// Fallback effect for any behavior type.
pub struct LogEffect;

#[async_trait]
impl BehaviorEffect for LogEffect {
    fn name(&self) -> &str {
        "log"
    }

    async fn perform(
        &self,
        behavior: &Behavior,
        ctx: &ExecutionContext,
    ) -> Result<EffectOutcome, ActionError> {
        tracing::info!(
            behavior_type = %behavior.behavior_type,
            strategy_id = %behavior.strategy_id,
            animation = behavior.animation.as_deref().unwrap_or(""),
            state = %ctx.state,
            emotion = %ctx.emotion_type(),
            "Behavior performed"
        );
        Ok(EffectOutcome::message(format!(
            "Performed {}",
            behavior.behavior_type
        )))
    }

    fn describe(&self, behavior: &Behavior) -> String {
        match &behavior.animation {
            Some(animation) => format!("Play {} ({})", animation, behavior.behavior_type),
            None => format!("Perform {}", behavior.behavior_type),
        }
    }
}

/// Shows a speech bubble or notification.
pub struct PromptEffect;

impl PromptEffect {
    fn text(behavior: &Behavior) -> Option<&str> {
        behavior.message.as_deref().or_else(|| {
            behavior
                .payload
                .get("message")
                .and_then(|v| v.as_str())
        })
    }
}

#[async_trait]
impl BehaviorEffect for PromptEffect {
    fn name(&self) -> &str {
        "prompt"
    }

    async fn perform(
        &self,
        behavior: &Behavior,
        _ctx: &ExecutionContext,
    ) -> Result<EffectOutcome, ActionError> {
        let text = Self::text(behavior).unwrap_or("");
        if text.trim().is_empty() {
            tracing::debug!(strategy_id = %behavior.strategy_id, "Prompt without text, showing attention cue");
            return Ok(EffectOutcome::message("Attention cue shown"));
        }
        tracing::info!(
            behavior_type = %behavior.behavior_type,
            strategy_id = %behavior.strategy_id,
            text = %text,
            "Prompt shown"
        );
        Ok(EffectOutcome::message(format!("Prompt shown: {}", text)))
    }

    fn describe(&self, behavior: &Behavior) -> String {
        format!("Show prompt: {}", Self::text(behavior).unwrap_or("<no text>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BehaviorType;
    use companion_core::types::{EmotionType, PetState, Timestamp};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(PetState::Idle, EmotionType::Happy, Timestamp(0))
    }

    #[tokio::test]
    async fn test_log_effect_always_succeeds() {
        let behavior = Behavior::new(BehaviorType::IdleAnimation, 3).with_animation("happy_idle");
        let outcome = LogEffect.perform(&behavior, &ctx()).await.unwrap();
        assert_eq!(outcome.message, "Performed idle_animation");
        assert_eq!(LogEffect.describe(&behavior), "Play happy_idle (idle_animation)");
    }

    #[tokio::test]
    async fn test_prompt_uses_message_field() {
        let behavior = Behavior::new(BehaviorType::UserPrompt, 4).with_message("Hi there");
        let outcome = PromptEffect.perform(&behavior, &ctx()).await.unwrap();
        assert_eq!(outcome.message, "Prompt shown: Hi there");
    }

    #[tokio::test]
    async fn test_prompt_falls_back_to_payload_message() {
        let behavior = Behavior::new(BehaviorType::UserPrompt, 4)
            .with_payload("message", serde_json::json!("From payload"));
        let outcome = PromptEffect.perform(&behavior, &ctx()).await.unwrap();
        assert_eq!(outcome.message, "Prompt shown: From payload");
    }

    #[tokio::test]
    async fn test_prompt_without_text() {
        let behavior = Behavior::new(BehaviorType::UserPrompt, 4);
        let outcome = PromptEffect.perform(&behavior, &ctx()).await.unwrap();
        assert_eq!(outcome.message, "Attention cue shown");
        assert_eq!(PromptEffect.describe(&behavior), "Show prompt: <no text>");
    }
}
