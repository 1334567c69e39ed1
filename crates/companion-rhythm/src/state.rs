use companion_core::types::{EmotionType, PetState, RhythmMode};
use serde::{Deserialize, Serialize};

/// How strongly feedback should land, from the interaction rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhythmIntensity {
    #[default]
    Low,
    Medium,
    High,
    Burst,
}

impl RhythmIntensity {
    /// Band for `rate` interactions per minute.
    pub fn from_rate(rate: u32, low: u32, high: u32) -> Self {
        if rate >= high.saturating_mul(2) {
            RhythmIntensity::Burst
        } else if rate >= high {
            RhythmIntensity::High
        } else if rate >= low {
            RhythmIntensity::Medium
        } else {
            RhythmIntensity::Low
        }
    }
}

impl std::fmt::Display for RhythmIntensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RhythmIntensity::Low => write!(f, "low"),
            RhythmIntensity::Medium => write!(f, "medium"),
            RhythmIntensity::High => write!(f, "high"),
            RhythmIntensity::Burst => write!(f, "burst"),
        }
    }
}

/// Base tempo for a mode, in milliseconds per beat.
pub fn tempo_for(mode: RhythmMode) -> u64 {
    match mode {
        RhythmMode::Steady => 1000,
        RhythmMode::Pulse => 400,
        RhythmMode::Sequence => 500,
        RhythmMode::Adaptive => 600,
        RhythmMode::Sync => 1000,
    }
}

/// What the visual layer paces itself by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RhythmState {
    pub mode: RhythmMode,
    pub tempo_ms: u64,
    pub intensity: RhythmIntensity,
    /// True while the retention window holds at least one interaction.
    pub active: bool,
}

impl Default for RhythmState {
    fn default() -> Self {
        Self {
            mode: RhythmMode::Steady,
            tempo_ms: tempo_for(RhythmMode::Steady),
            intensity: RhythmIntensity::Low,
            active: false,
        }
    }
}

/// Rolling statistics behind the current mode, for debug panels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RhythmStats {
    pub emotion_history: Vec<EmotionType>,
    pub interaction_count: usize,
    /// Interactions in the trailing rate window at the last update.
    pub interaction_rate: u32,
    pub idle_ms: u64,
    pub last_state: Option<PetState>,
    pub external_source: Option<String>,
}
