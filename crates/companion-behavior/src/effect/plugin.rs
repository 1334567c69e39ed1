//! Plugin trigger effect.
//!
//! Forwards `plugin_trigger` behaviors to the host's plugin contract. The
//! engine never looks inside plugin data.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::effect::{BehaviorEffect, EffectOutcome};
use crate::error::ActionError;
use crate::types::{Behavior, ExecutionContext};

/// Reply from a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Whatever runs plugins on the host side.
#[async_trait]
pub trait PluginHost: Send + Sync {
    async fn execute(&self, plugin_id: &str, payload: Value) -> Result<PluginResponse, ActionError>;
}

pub struct PluginTriggerEffect {
    host: Arc<dyn PluginHost>,
}

impl PluginTriggerEffect {
    pub fn new(host: Arc<dyn PluginHost>) -> Self {
        Self { host }
    }

    fn plugin_id(behavior: &Behavior) -> Option<&str> {
        behavior.plugin_id.as_deref().or_else(|| {
            behavior
                .payload
                .get("pluginId")
                .and_then(|v| v.as_str())
        })
    }

    fn request(behavior: &Behavior, ctx: &ExecutionContext) -> Value {
        json!({
            "behavior": behavior,
            "state": ctx.state,
            "emotion": ctx.emotion_type(),
            "intensity": ctx.emotion.intensity,
            "sessionId": ctx.session_id,
            "timestamp": ctx.timestamp,
        })
    }
}

#[async_trait]
impl BehaviorEffect for PluginTriggerEffect {
    fn name(&self) -> &str {
        "plugin_trigger"
    }

    async fn perform(
        &self,
        behavior: &Behavior,
        ctx: &ExecutionContext,
    ) -> Result<EffectOutcome, ActionError> {
        let plugin_id = Self::plugin_id(behavior).ok_or_else(|| {
            ActionError::InvalidPayload("plugin_trigger requires a plugin id".to_string())
        })?;

        let response = self
            .host
            .execute(plugin_id, Self::request(behavior, ctx))
            .await?;

        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| "plugin reported failure".to_string());
            tracing::warn!(plugin_id = %plugin_id, message = %message, "Plugin trigger failed");
            return Err(ActionError::Plugin {
                plugin_id: plugin_id.to_string(),
                message,
            });
        }

        tracing::info!(plugin_id = %plugin_id, strategy_id = %behavior.strategy_id, "Plugin triggered");
        Ok(EffectOutcome {
            message: response
                .message
                .unwrap_or_else(|| format!("Plugin {} triggered", plugin_id)),
            data: response.data,
        })
    }

    fn describe(&self, behavior: &Behavior) -> String {
        format!(
            "Trigger plugin: {}",
            Self::plugin_id(behavior).unwrap_or("<none>")
        )
    }
}
