//! Capability rules written in code, and the stock strategy records.

use companion_core::types::{EmotionType, PetState, TimeOfDay};
use serde_json::json;

use crate::condition::{Condition, ConditionKind, Operator};
use crate::error::ValidationError;
use crate::legacy::standard_cells;
use crate::strategy::{ActionSpec, BehaviorRule, Strategy};
use crate::types::{Behavior, BehaviorType, ExecutionContext, RuleOrigin};

/// Reacts to strong emotions regardless of state.
#[derive(Debug, Default)]
pub struct EmotionDrivenRule;

impl EmotionDrivenRule {
    pub const ID: &'static str = "emotion_driven";
    const APPLY_THRESHOLD: f64 = 0.7;
    const INTENSE_THRESHOLD: f64 = 0.8;
}

impl BehaviorRule for EmotionDrivenRule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Emotion driven"
    }

    fn description(&self) -> Option<&str> {
        Some("Expresses intense emotions and excitement bursts")
    }

    fn priority(&self) -> i32 {
        2
    }

    fn origin(&self) -> RuleOrigin {
        RuleOrigin::Builtin
    }

    fn applies_to(&self, _state: PetState, _emotion: EmotionType) -> bool {
        true
    }

    fn can_apply(&self, ctx: &ExecutionContext) -> bool {
        ctx.emotion.intensity > Self::APPLY_THRESHOLD
    }

    fn generate(&self, ctx: &ExecutionContext) -> Vec<Behavior> {
        let intensity = ctx.emotion.intensity;
        let emotion = ctx.emotion_type();
        let mut behaviors = Vec::new();

        if intensity > Self::INTENSE_THRESHOLD {
            behaviors.push(
                Behavior::new(BehaviorType::EmotionalExpression, 9)
                    .with_duration((intensity * 2000.0).round() as u64)
                    .with_animation(format!("{}_intense", emotion))
                    .with_payload("intensity", json!(intensity))
                    .from_strategy(Self::ID),
            );
        }

        if emotion == EmotionType::Excited && intensity > Self::APPLY_THRESHOLD {
            behaviors.push(
                Behavior::new(BehaviorType::AnimationSequence, 6)
                    .with_duration(3000)
                    .with_animation("excitement_burst")
                    .from_strategy(Self::ID),
            );
        }

        behaviors
    }
}

/// Greets in the morning and winds down at night.
#[derive(Debug, Default)]
pub struct TimeAwareRule;

impl TimeAwareRule {
    pub const ID: &'static str = "time_aware";
}

impl BehaviorRule for TimeAwareRule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Time aware"
    }

    fn description(&self) -> Option<&str> {
        Some("Morning greeting when idle, nudge toward sleepy at night")
    }

    fn priority(&self) -> i32 {
        1
    }

    fn origin(&self) -> RuleOrigin {
        RuleOrigin::Builtin
    }

    fn applies_to(&self, _state: PetState, _emotion: EmotionType) -> bool {
        true
    }

    fn can_apply(&self, ctx: &ExecutionContext) -> bool {
        match ctx.environment.time_of_day {
            TimeOfDay::Morning => ctx.state == PetState::Idle,
            TimeOfDay::Night => ctx.emotion_type() != EmotionType::Sleepy,
            _ => false,
        }
    }

    fn generate(&self, ctx: &ExecutionContext) -> Vec<Behavior> {
        match ctx.environment.time_of_day {
            TimeOfDay::Morning if ctx.state == PetState::Idle => vec![Behavior::new(
                BehaviorType::UserPrompt,
                4,
            )
            .with_delay(5000)
            .with_message("Good morning! Ready for today?")
            .from_strategy(Self::ID)],
            TimeOfDay::Night if ctx.emotion_type() != EmotionType::Sleepy => {
                vec![Behavior::new(BehaviorType::MoodTransition, 3)
                    .with_duration(2000)
                    .with_animation("yawn")
                    .with_payload("targetEmotion", json!(EmotionType::Sleepy))
                    .from_strategy(Self::ID)]
            }
            _ => Vec::new(),
        }
    }
}

/// The reaction proper to one interaction state, per emotion.
///
/// Runs alongside the emotion and time rules, so a strong emotion or the
/// hour of day never hides the state's own feedback.
#[derive(Debug, Clone)]
pub struct StateRule {
    id: String,
    name: String,
    state: PetState,
    priority: i32,
    cells: Vec<(EmotionType, Vec<Behavior>)>,
}

impl StateRule {
    pub fn new(state: PetState, priority: i32) -> Self {
        let id = format!("{}_state", state);
        let cells = standard_cells()
            .into_iter()
            .filter(|(s, _, _)| *s == state)
            .map(|(_, emotion, behaviors)| {
                let tagged = behaviors
                    .into_iter()
                    .map(|b| b.from_strategy(id.clone()))
                    .collect();
                (emotion, tagged)
            })
            .collect();
        Self {
            name: format!("{} state", state),
            id,
            state,
            priority,
            cells,
        }
    }

    pub fn idle() -> Self {
        Self::new(PetState::Idle, 3)
    }

    pub fn hover() -> Self {
        Self::new(PetState::Hover, 5)
    }

    pub fn awaken() -> Self {
        Self::new(PetState::Awaken, 7)
    }

    pub fn control() -> Self {
        Self::new(PetState::Control, 8)
    }

    /// One rule per state.
    pub fn all() -> [Self; 4] {
        [Self::idle(), Self::hover(), Self::awaken(), Self::control()]
    }

    pub fn state(&self) -> PetState {
        self.state
    }
}

impl BehaviorRule for StateRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn origin(&self) -> RuleOrigin {
        RuleOrigin::Builtin
    }

    fn applies_to(&self, state: PetState, _emotion: EmotionType) -> bool {
        state == self.state
    }

    fn can_apply(&self, ctx: &ExecutionContext) -> bool {
        ctx.state == self.state
    }

    fn generate(&self, ctx: &ExecutionContext) -> Vec<Behavior> {
        let emotion = ctx.emotion_type();
        self.cells
            .iter()
            .find(|(e, _)| *e == emotion)
            .map(|(_, behaviors)| behaviors.clone())
            .unwrap_or_default()
    }
}

/// The stock strategy records shipped with the companion.
pub fn default_strategies() -> Result<Vec<Strategy>, ValidationError> {
    Ok(vec![
        Strategy::builder("curious_awaken_explore", "Curious exploration")
            .description("Offer something to explore when woken up curious")
            .states([PetState::Awaken])
            .emotions([EmotionType::Curious])
            .priority(8)
            .cooldown_ms(5_000)
            .action(
                ActionSpec::new("plugin_trigger")
                    .delay(300)
                    .plugin("discovery"),
            )
            .action(
                ActionSpec::new("user_prompt")
                    .delay(800)
                    .message("Found something interesting, want to see?"),
            )
            .build()?,
        Strategy::builder("focused_control_tools", "Focused tool panel")
            .description("Open productivity tools when focused")
            .states([PetState::Control])
            .emotions([EmotionType::Focused])
            .priority(9)
            .cooldown_ms(3_000)
            .action(
                ActionSpec::new("control_activation")
                    .duration(1_100)
                    .animation("focused_tools"),
            )
            .action(
                ActionSpec::new("plugin_trigger")
                    .delay(200)
                    .plugin("productivity"),
            )
            .build()?,
        Strategy::builder("happy_hover_interaction", "Happy hover")
            .states([PetState::Hover])
            .emotions([EmotionType::Happy])
            .priority(6)
            .cooldown_ms(2_000)
            .action(
                ActionSpec::new("hover_feedback")
                    .duration(800)
                    .animation("happy_wiggle"),
            )
            .build()?,
        Strategy::builder("sleepy_idle_rest", "Sleepy rest")
            .states([PetState::Idle])
            .emotions([EmotionType::Sleepy])
            .priority(3)
            .condition(Condition::new(
                ConditionKind::EmotionIntensity,
                Operator::Gte,
                json!(0.6),
            ))
            .cooldown_ms(10_000)
            .action(
                ActionSpec::new("idle_animation")
                    .duration(4_000)
                    .animation("sleepy_doze"),
            )
            .build()?,
        Strategy::builder("excited_awaken_highpower", "Excited wake-up")
            .states([PetState::Awaken])
            .emotions([EmotionType::Excited])
            .priority(10)
            .cooldown_ms(1_000)
            .action(
                ActionSpec::new("awaken_response")
                    .duration(800)
                    .animation("excited_jump"),
            )
            .action(
                ActionSpec::new("plugin_trigger")
                    .delay(200)
                    .plugin("quick_actions"),
            )
            .build()?,
        Strategy::builder("calm_universal_basic", "Calm baseline")
            .description("Gentle feedback in any state while calm")
            .states(PetState::ALL)
            .emotions([EmotionType::Calm])
            .priority(2)
            .condition(Condition::new(
                ConditionKind::EmotionIntensity,
                Operator::Lt,
                json!(0.8),
            ))
            .cooldown_ms(8_000)
            .action(
                ActionSpec::new("idle_animation")
                    .duration(3_000)
                    .animation("calm_breathe"),
            )
            .build()?,
        Strategy::builder("celebration_video", "Celebration")
            .states([PetState::Awaken, PetState::Hover])
            .emotions([EmotionType::Excited])
            .priority(8)
            .condition(Condition::new(
                ConditionKind::EmotionIntensity,
                Operator::Gt,
                json!(0.8),
            ))
            .cooldown_ms(15_000)
            .action(ActionSpec::new("celebration_start").duration(500))
            .action(
                ActionSpec::new("plugin_trigger")
                    .plugin("video_player")
                    .message("celebration"),
            )
            .build()?,
        Strategy::builder("ambient_video_idle", "Ambient video")
            .description("Play a calm background clip after two idle minutes")
            .states([PetState::Idle])
            .emotions([EmotionType::Calm, EmotionType::Sleepy])
            .priority(3)
            .condition(Condition::new(
                ConditionKind::IdleTime,
                Operator::Gt,
                json!(120_000),
            ))
            .cooldown_ms(300_000)
            .action(ActionSpec::new("video_preparation").duration(1_000))
            .action(
                ActionSpec::new("plugin_trigger")
                    .plugin("video_player")
                    .message("ambient"),
            )
            .build()?,
    ])
}
