//! Domain types for behavior decisions and their execution.

use std::fmt;

use companion_core::types::{
    EmotionContext, EmotionType, PetState, TimeOfDay, Timestamp, UserActivity,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// =============================================================================
// Behavior
// =============================================================================

/// What a behavior does. Records may name types the engine has no variant for;
/// those round-trip through `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BehaviorType {
    IdleAnimation,
    HoverFeedback,
    AwakenResponse,
    ControlActivation,
    EmotionalExpression,
    MoodTransition,
    PluginTrigger,
    PluginCallback,
    UserPrompt,
    SystemNotification,
    DelayedAction,
    AnimationSequence,
    Custom(String),
}

impl BehaviorType {
    pub fn as_str(&self) -> &str {
        match self {
            BehaviorType::IdleAnimation => "idle_animation",
            BehaviorType::HoverFeedback => "hover_feedback",
            BehaviorType::AwakenResponse => "awaken_response",
            BehaviorType::ControlActivation => "control_activation",
            BehaviorType::EmotionalExpression => "emotional_expression",
            BehaviorType::MoodTransition => "mood_transition",
            BehaviorType::PluginTrigger => "plugin_trigger",
            BehaviorType::PluginCallback => "plugin_callback",
            BehaviorType::UserPrompt => "user_prompt",
            BehaviorType::SystemNotification => "system_notification",
            BehaviorType::DelayedAction => "delayed_action",
            BehaviorType::AnimationSequence => "animation_sequence",
            BehaviorType::Custom(name) => name,
        }
    }
}

impl fmt::Display for BehaviorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for BehaviorType {
    fn from(s: &str) -> Self {
        match s {
            "idle_animation" => BehaviorType::IdleAnimation,
            "hover_feedback" => BehaviorType::HoverFeedback,
            "awaken_response" => BehaviorType::AwakenResponse,
            "control_activation" => BehaviorType::ControlActivation,
            "emotional_expression" => BehaviorType::EmotionalExpression,
            "mood_transition" => BehaviorType::MoodTransition,
            "plugin_trigger" => BehaviorType::PluginTrigger,
            "plugin_callback" => BehaviorType::PluginCallback,
            "user_prompt" => BehaviorType::UserPrompt,
            "system_notification" => BehaviorType::SystemNotification,
            "delayed_action" => BehaviorType::DelayedAction,
            "animation_sequence" => BehaviorType::AnimationSequence,
            other => BehaviorType::Custom(other.to_string()),
        }
    }
}

impl From<String> for BehaviorType {
    fn from(s: String) -> Self {
        BehaviorType::from(s.as_str())
    }
}

impl From<BehaviorType> for String {
    fn from(t: BehaviorType) -> Self {
        t.as_str().to_string()
    }
}

/// A single action produced by a decision. Transient: built per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Behavior {
    #[serde(rename = "type")]
    pub behavior_type: BehaviorType,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Rule that produced this behavior.
    #[serde(default)]
    pub strategy_id: String,
}

impl Behavior {
    pub fn new(behavior_type: BehaviorType, priority: i32) -> Self {
        Self {
            behavior_type,
            priority,
            delay_ms: None,
            duration_ms: None,
            animation: None,
            message: None,
            plugin_id: None,
            payload: Map::new(),
            strategy_id: String::new(),
        }
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = Some(ms);
        self
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn with_animation(mut self, animation: impl Into<String>) -> Self {
        self.animation = Some(animation.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn from_strategy(mut self, strategy_id: impl Into<String>) -> Self {
        self.strategy_id = strategy_id.into();
        self
    }
}

// =============================================================================
// Execution Context
// =============================================================================

/// Environment facts sampled when the context was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub time_of_day: TimeOfDay,
    /// Local hour of day, 0-23.
    pub hour: u32,
    /// 0.0-1.0; zero when unknown.
    pub system_load: f64,
    pub user_activity: UserActivity,
    /// Milliseconds since the last user interaction.
    pub idle_ms: u64,
}

impl Environment {
    pub fn at(hour: u32, idle_ms: u64) -> Self {
        Self {
            time_of_day: TimeOfDay::from_hour(hour),
            hour,
            system_load: 0.0,
            user_activity: UserActivity::from_idle_ms(idle_ms),
            idle_ms,
        }
    }
}

/// Read-only snapshot a decision is computed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub state: PetState,
    pub emotion: EmotionContext,
    pub timestamp: Timestamp,
    pub session_id: Uuid,
    pub environment: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<Value>,
}

impl ExecutionContext {
    /// A context at `timestamp` with the fallback emotion and an active user.
    pub fn new(state: PetState, emotion: EmotionType, timestamp: Timestamp) -> Self {
        Self {
            state,
            emotion: EmotionContext::fallback(emotion),
            timestamp,
            session_id: Uuid::new_v4(),
            environment: Environment::at(timestamp.local_hour(), 0),
            user_context: None,
        }
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.emotion.intensity = intensity.clamp(0.0, 1.0);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_user_context(mut self, user_context: Value) -> Self {
        self.user_context = Some(user_context);
        self
    }

    pub fn emotion_type(&self) -> EmotionType {
        self.emotion.current_emotion
    }
}

// =============================================================================
// Execution Result
// =============================================================================

/// A behavior whose effect failed during a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorFailure {
    pub behavior_type: BehaviorType,
    pub strategy_id: String,
    pub error: String,
}

/// Outcome of one `schedule` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// False only when nothing matched or the call was rejected.
    pub success: bool,
    pub executed_behaviors: Vec<Behavior>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BehaviorFailure>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Advisory; the engine never enforces it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_schedule_hint: Option<Timestamp>,
    /// Set when `clear_scheduled_behaviors` interrupted the batch.
    #[serde(default)]
    pub cancelled: bool,
}

impl ExecutionResult {
    pub fn nothing_matched(state: PetState, emotion: EmotionType, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            executed_behaviors: Vec::new(),
            failures: Vec::new(),
            elapsed_ms,
            message: Some(format!("No behaviors matched state={} emotion={}", state, emotion)),
            next_schedule_hint: None,
            cancelled: false,
        }
    }
}

/// Row for debug panels listing the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    pub origin: RuleOrigin,
}

/// Where a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrigin {
    /// A persisted strategy record.
    Record,
    /// A capability rule written in code.
    Builtin,
    /// An entry of the static fallback table.
    Legacy,
}

impl fmt::Display for RuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOrigin::Record => write!(f, "record"),
            RuleOrigin::Builtin => write!(f, "builtin"),
            RuleOrigin::Legacy => write!(f, "legacy"),
        }
    }
}
