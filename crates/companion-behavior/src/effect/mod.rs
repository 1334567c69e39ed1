//! Behavior effect registry and trait definition.
//!
//! An effect is what actually happens when a behavior runs: an animation cue,
//! a prompt, a plugin call. Effects are looked up by behavior type; anything
//! without a dedicated effect falls back to [`LogEffect`].

pub mod log;
pub mod plugin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ActionError;
use crate::types::{Behavior, BehaviorType, ExecutionContext};

pub use log::{LogEffect, PromptEffect};
pub use plugin::{PluginHost, PluginResponse, PluginTriggerEffect};

/// What an effect reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectOutcome {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl EffectOutcome {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }
}

#[async_trait]
pub trait BehaviorEffect: Send + Sync {
    fn name(&self) -> &str;

    async fn perform(
        &self,
        behavior: &Behavior,
        ctx: &ExecutionContext,
    ) -> Result<EffectOutcome, ActionError>;

    /// One-line human description, for logs and debug panels.
    fn describe(&self, behavior: &Behavior) -> String {
        format!("{} ({})", behavior.behavior_type, self.name())
    }
}

/// Maps behavior types to effects.
pub struct EffectRegistry {
    effects: HashMap<BehaviorType, Arc<dyn BehaviorEffect>>,
    fallback: Arc<dyn BehaviorEffect>,
}

impl EffectRegistry {
    /// An empty registry; every behavior goes to [`LogEffect`].
    pub fn new() -> Self {
        Self {
            effects: HashMap::new(),
            fallback: Arc::new(LogEffect),
        }
    }

    /// Prompt effects for prompt-like types. Plugin triggers log until a host is attached.
    pub fn register_defaults(&mut self) {
        let prompt: Arc<dyn BehaviorEffect> = Arc::new(PromptEffect);
        self.register(BehaviorType::UserPrompt, Arc::clone(&prompt));
        self.register(BehaviorType::SystemNotification, prompt);
    }

    /// Route `plugin_trigger` behaviors to `host`.
    pub fn register_plugin_host(&mut self, host: Arc<dyn PluginHost>) {
        self.register(
            BehaviorType::PluginTrigger,
            Arc::new(PluginTriggerEffect::new(host)),
        );
    }

    pub fn register(&mut self, behavior_type: BehaviorType, effect: Arc<dyn BehaviorEffect>) {
        tracing::debug!(behavior_type = %behavior_type, effect = effect.name(), "Effect registered");
        self.effects.insert(behavior_type, effect);
    }

    pub fn set_fallback(&mut self, effect: Arc<dyn BehaviorEffect>) {
        self.fallback = effect;
    }

    pub fn get(&self, behavior_type: &BehaviorType) -> Arc<dyn BehaviorEffect> {
        self.effects
            .get(behavior_type)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn has_dedicated(&self, behavior_type: &BehaviorType) -> bool {
        self.effects.contains_key(behavior_type)
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }
}
