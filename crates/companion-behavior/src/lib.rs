//! Behavior decision engine for the desktop companion.
//!
//! Picks behaviors for a (state, emotion) pair from prioritized rules, gates
//! them by conditions and cooldowns, and runs the chosen batch in order.

pub mod builtin;
pub mod catalog;
pub mod condition;
pub mod cooldown;
pub mod effect;
pub mod error;
pub mod executor;
pub mod legacy;
pub mod manager;
pub mod scheduler;
pub mod stats;
pub mod strategy;
pub mod types;
pub mod watcher;

pub use catalog::{parse_records, StrategyCatalog};
pub use condition::{Condition, ConditionEvaluator, ConditionKind, CustomPredicate, Operator};
pub use cooldown::CooldownTracker;
pub use effect::{BehaviorEffect, EffectRegistry, PluginHost, PluginResponse};
pub use error::{ActionError, ImportError, ValidationError};
pub use legacy::LegacyTable;
pub use manager::StrategyManager;
pub use scheduler::{BehaviorScheduler, BehaviorSchedulerBuilder, EmotionSource, SchedulerStats};
pub use stats::{ExecutionStats, StatsStore};
pub use strategy::{ActionSpec, BehaviorRule, Strategy};
pub use types::{
    Behavior, BehaviorType, Environment, ExecutionContext, ExecutionResult, RuleOrigin,
    StrategySummary,
};
pub use watcher::CatalogWatcher;
