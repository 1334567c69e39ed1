//! The static state/emotion fallback table.
//!
//! Consulted only when no catalog rule produces anything. Each table cell is
//! turned into a [`LegacyRule`] when the table is built.

use std::sync::{Arc, RwLock};

use companion_core::types::{EmotionType, PetState};

use crate::strategy::BehaviorRule;
use crate::types::{Behavior, BehaviorType, ExecutionContext, RuleOrigin};

/// Fixed behaviors for one (state, emotion) cell.
#[derive(Debug, Clone)]
pub struct LegacyRule {
    id: String,
    state: PetState,
    emotion: EmotionType,
    behaviors: Vec<Behavior>,
}

impl LegacyRule {
    pub fn new(state: PetState, emotion: EmotionType, behaviors: Vec<Behavior>) -> Self {
        let id = format!("legacy_{}_{}", state, emotion);
        let behaviors = behaviors
            .into_iter()
            .map(|b| b.from_strategy(id.clone()))
            .collect();
        Self {
            id,
            state,
            emotion,
            behaviors,
        }
    }

    pub fn behaviors(&self) -> &[Behavior] {
        &self.behaviors
    }
}

impl BehaviorRule for LegacyRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.behaviors.iter().map(|b| b.priority).max().unwrap_or(0)
    }

    fn origin(&self) -> RuleOrigin {
        RuleOrigin::Legacy
    }

    fn applies_to(&self, state: PetState, emotion: EmotionType) -> bool {
        self.state == state && self.emotion == emotion
    }

    fn generate(&self, _ctx: &ExecutionContext) -> Vec<Behavior> {
        self.behaviors.clone()
    }
}

/// All fallback rules, in table order.
#[derive(Debug, Default)]
pub struct LegacyTable {
    rules: RwLock<Vec<Arc<LegacyRule>>>,
}

impl LegacyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The stock table covering every state and emotion.
    pub fn standard() -> Self {
        let table = Self::empty();
        for (state, emotion, behaviors) in standard_cells() {
            table.add(LegacyRule::new(state, emotion, behaviors));
        }
        table
    }

    /// Append a rule. A cell may hold several.
    pub fn add(&self, rule: LegacyRule) {
        self.rules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(rule));
    }

    pub fn add_behavior(&self, state: PetState, emotion: EmotionType, behavior: Behavior) {
        self.add(LegacyRule::new(state, emotion, vec![behavior]));
    }

    pub fn rules_for(&self, state: PetState, emotion: EmotionType) -> Vec<Arc<LegacyRule>> {
        self.rules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.applies_to(state, emotion))
            .cloned()
            .collect()
    }

    /// Every behavior the table yields for the cell, in rule order.
    pub fn behaviors_for(&self, ctx: &ExecutionContext) -> Vec<Behavior> {
        self.rules_for(ctx.state, ctx.emotion_type())
            .iter()
            .flat_map(|r| r.generate(ctx))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn anim(t: BehaviorType, priority: i32, duration_ms: u64, animation: &str) -> Behavior {
    Behavior::new(t, priority)
        .with_duration(duration_ms)
        .with_animation(animation)
}

fn delayed(t: BehaviorType, priority: i32, delay_ms: u64) -> Behavior {
    Behavior::new(t, priority).with_delay(delay_ms)
}

/// The stock cells, untagged. Also the source of the per-state built-in rules.
pub(crate) fn standard_cells() -> Vec<(PetState, EmotionType, Vec<Behavior>)> {
    use BehaviorType::*;
    use EmotionType::*;
    use PetState::Idle as IdleState;
    use PetState::{Awaken, Control, Hover};

    vec![
        (IdleState, Happy, vec![
            anim(IdleAnimation, 3, 2000, "happy_idle"),
            Behavior::new(EmotionalExpression, 2).with_duration(1500),
        ]),
        (IdleState, Calm, vec![anim(IdleAnimation, 2, 3000, "calm_idle")]),
        (IdleState, Excited, vec![
            anim(IdleAnimation, 4, 1000, "excited_idle"),
            delayed(UserPrompt, 3, 2000).with_message("Let's do something fun!"),
        ]),
        (IdleState, Curious, vec![anim(IdleAnimation, 3, 2500, "curious_look")]),
        (IdleState, Sleepy, vec![anim(IdleAnimation, 2, 4000, "sleepy_idle")]),
        (IdleState, Focused, vec![anim(IdleAnimation, 2, 3000, "focused_idle")]),

        (Hover, Happy, vec![anim(HoverFeedback, 5, 800, "happy_hover")]),
        (Hover, Calm, vec![anim(HoverFeedback, 3, 1200, "calm_hover")]),
        (Hover, Excited, vec![
            anim(HoverFeedback, 6, 600, "excited_hover"),
            delayed(UserPrompt, 4, 1000).with_message("Click me!"),
        ]),
        (Hover, Curious, vec![anim(HoverFeedback, 4, 1000, "curious_hover")]),
        (Hover, Sleepy, vec![anim(HoverFeedback, 2, 1500, "sleepy_hover")]),
        (Hover, Focused, vec![anim(HoverFeedback, 3, 1000, "focused_hover")]),

        (Awaken, Happy, vec![
            anim(AwakenResponse, 7, 1000, "happy_awaken"),
            delayed(PluginTrigger, 6, 500).with_plugin("greeting"),
        ]),
        (Awaken, Calm, vec![anim(AwakenResponse, 5, 1500, "calm_awaken")]),
        (Awaken, Excited, vec![
            anim(AwakenResponse, 8, 800, "excited_awaken"),
            delayed(PluginTrigger, 7, 200).with_plugin("quick_actions"),
        ]),
        (Awaken, Curious, vec![anim(AwakenResponse, 6, 1200, "curious_awaken")]),
        (Awaken, Sleepy, vec![anim(AwakenResponse, 3, 2000, "sleepy_awaken")]),
        (Awaken, Focused, vec![anim(AwakenResponse, 6, 1000, "focused_awaken")]),

        (Control, Happy, vec![
            anim(ControlActivation, 8, 1200, "happy_control"),
            delayed(PluginTrigger, 7, 300).with_plugin("toolbox"),
        ]),
        (Control, Calm, vec![anim(ControlActivation, 6, 1500, "calm_control")]),
        (Control, Excited, vec![
            anim(ControlActivation, 9, 1000, "excited_control"),
            delayed(PluginTrigger, 8, 100).with_plugin("toolbox"),
        ]),
        (Control, Curious, vec![anim(ControlActivation, 7, 1300, "curious_control")]),
        (Control, Sleepy, vec![anim(ControlActivation, 4, 2000, "sleepy_control")]),
        (Control, Focused, vec![anim(ControlActivation, 8, 1100, "focused_control")]),
    ]
}
