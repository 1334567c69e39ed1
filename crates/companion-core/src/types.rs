use std::fmt;

use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CompanionError;

// =============================================================================
// Enums
// =============================================================================

/// Interaction state of the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetState {
    /// Nobody is interacting.
    Idle,
    /// The pointer rests over the companion.
    Hover,
    /// Clicked once.
    Awaken,
    /// Clicked again; the tool surface is open.
    Control,
}

impl PetState {
    pub const ALL: [PetState; 4] = [
        PetState::Idle,
        PetState::Hover,
        PetState::Awaken,
        PetState::Control,
    ];
}

impl fmt::Display for PetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PetState::Idle => write!(f, "idle"),
            PetState::Hover => write!(f, "hover"),
            PetState::Awaken => write!(f, "awaken"),
            PetState::Control => write!(f, "control"),
        }
    }
}

impl std::str::FromStr for PetState {
    type Err = CompanionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(PetState::Idle),
            "hover" => Ok(PetState::Hover),
            "awaken" => Ok(PetState::Awaken),
            "control" => Ok(PetState::Control),
            _ => Err(CompanionError::UnknownVariant {
                kind: "pet state",
                value: s.to_string(),
            }),
        }
    }
}

/// Emotion reported by the emotion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionType {
    Happy,
    Calm,
    Excited,
    Curious,
    Sleepy,
    Focused,
}

impl EmotionType {
    pub const ALL: [EmotionType; 6] = [
        EmotionType::Happy,
        EmotionType::Calm,
        EmotionType::Excited,
        EmotionType::Curious,
        EmotionType::Sleepy,
        EmotionType::Focused,
    ];
}

impl fmt::Display for EmotionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmotionType::Happy => write!(f, "happy"),
            EmotionType::Calm => write!(f, "calm"),
            EmotionType::Excited => write!(f, "excited"),
            EmotionType::Curious => write!(f, "curious"),
            EmotionType::Sleepy => write!(f, "sleepy"),
            EmotionType::Focused => write!(f, "focused"),
        }
    }
}

impl std::str::FromStr for EmotionType {
    type Err = CompanionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "happy" => Ok(EmotionType::Happy),
            "calm" => Ok(EmotionType::Calm),
            "excited" => Ok(EmotionType::Excited),
            "curious" => Ok(EmotionType::Curious),
            "sleepy" => Ok(EmotionType::Sleepy),
            "focused" => Ok(EmotionType::Focused),
            _ => Err(CompanionError::UnknownVariant {
                kind: "emotion",
                value: s.to_string(),
            }),
        }
    }
}

/// Coarse part of the day, derived from the local hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// Morning 6-12, afternoon 12-18, evening 18-22, night otherwise.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Afternoon,
            18..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOfDay::Morning => write!(f, "morning"),
            TimeOfDay::Afternoon => write!(f, "afternoon"),
            TimeOfDay::Evening => write!(f, "evening"),
            TimeOfDay::Night => write!(f, "night"),
        }
    }
}

/// How present the user currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserActivity {
    Active,
    Idle,
    Away,
}

impl UserActivity {
    const ACTIVE_WINDOW_MS: u64 = 60_000;
    const IDLE_WINDOW_MS: u64 = 5 * 60_000;

    /// Active under a minute since the last interaction, idle under five, away after.
    pub fn from_idle_ms(idle_ms: u64) -> Self {
        if idle_ms < Self::ACTIVE_WINDOW_MS {
            UserActivity::Active
        } else if idle_ms < Self::IDLE_WINDOW_MS {
            UserActivity::Idle
        } else {
            UserActivity::Away
        }
    }
}

/// Pacing mode produced by the rhythm engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhythmMode {
    #[default]
    Steady,
    Pulse,
    Sequence,
    Adaptive,
    Sync,
}

impl fmt::Display for RhythmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RhythmMode::Steady => write!(f, "steady"),
            RhythmMode::Pulse => write!(f, "pulse"),
            RhythmMode::Sequence => write!(f, "sequence"),
            RhythmMode::Adaptive => write!(f, "adaptive"),
            RhythmMode::Sync => write!(f, "sync"),
        }
    }
}

impl std::str::FromStr for RhythmMode {
    type Err = CompanionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "steady" => Ok(RhythmMode::Steady),
            "pulse" => Ok(RhythmMode::Pulse),
            "sequence" => Ok(RhythmMode::Sequence),
            "adaptive" => Ok(RhythmMode::Adaptive),
            "sync" => Ok(RhythmMode::Sync),
            _ => Err(CompanionError::UnknownVariant {
                kind: "rhythm mode",
                value: s.to_string(),
            }),
        }
    }
}

// =============================================================================
// Emotion Context
// =============================================================================

/// Snapshot of the emotion engine's output at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionContext {
    pub current_emotion: EmotionType,
    /// Clamped to `[0, 1]`.
    pub intensity: f64,
    pub duration_ms: u64,
    pub triggers: Vec<String>,
    #[serde(default)]
    pub history: Vec<EmotionType>,
}

impl EmotionContext {
    pub const DEFAULT_INTENSITY: f64 = 0.7;
    pub const DEFAULT_DURATION_MS: u64 = 30_000;

    pub fn new(current_emotion: EmotionType, intensity: f64) -> Self {
        Self {
            current_emotion,
            intensity: intensity.clamp(0.0, 1.0),
            duration_ms: Self::DEFAULT_DURATION_MS,
            triggers: vec!["state_change".to_string()],
            history: Vec::new(),
        }
    }

    /// The context used when no emotion source is attached.
    pub fn fallback(current_emotion: EmotionType) -> Self {
        Self::new(current_emotion, Self::DEFAULT_INTENSITY)
    }
}

// =============================================================================
// Timestamp
// =============================================================================

/// Milliseconds since the Unix epoch.
///
/// Every decision in the engine is anchored to one of these so that callers can
/// replay a sequence of events with explicit times.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// Hour of day in the local time zone.
    pub fn local_hour(&self) -> u32 {
        self.to_datetime().with_timezone(&Local).hour()
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0).max(0) as u64
    }

    pub fn add_millis(&self, ms: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(ms as i64))
    }

    pub fn sub_millis(&self, ms: u64) -> Timestamp {
        Timestamp(self.0.saturating_sub(ms as i64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}
