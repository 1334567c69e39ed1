//! The set of registered rules.
//!
//! Holds persisted strategy records and code-defined capability rules in
//! registration order. Registration order breaks priority ties, so a record
//! replaced by id keeps its slot.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use companion_core::events::{DomainEvent, EventBus};
use companion_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ImportError, ValidationError};
use crate::strategy::{BehaviorRule, Strategy, StrategyDraft, StrategyRule};
use crate::types::{RuleOrigin, StrategySummary};

/// Current export format version.
pub const CATALOG_VERSION: u32 = 1;

/// A rule plus its catalog-managed enable flag.
#[derive(Debug, Clone)]
pub struct CatalogRule {
    pub rule: Arc<dyn BehaviorRule>,
    pub enabled: bool,
}

#[derive(Debug)]
struct CatalogEntry {
    rule: Arc<dyn BehaviorRule>,
    enabled: bool,
}

/// Export format. Import also accepts a bare array of records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub strategies: Vec<Strategy>,
}

#[derive(Debug, Default)]
pub struct StrategyCatalog {
    entries: RwLock<Vec<CatalogEntry>>,
    events: Option<EventBus>,
}

impl StrategyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish catalog changes on `bus`.
    pub fn with_events(bus: EventBus) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            events: Some(bus),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<CatalogEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<CatalogEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Validate and register a record, replacing any rule with the same id.
    pub fn register_strategy(&self, strategy: Strategy) -> Result<(), ValidationError> {
        strategy.validate()?;
        let enabled = strategy.enabled;
        self.insert(Arc::new(StrategyRule::new(strategy)), enabled);
        Ok(())
    }

    /// Register a code-defined rule, enabled.
    pub fn register_rule(&self, rule: Arc<dyn BehaviorRule>) {
        self.insert(rule, true);
    }

    fn insert(&self, rule: Arc<dyn BehaviorRule>, enabled: bool) {
        let id = rule.id().to_string();
        {
            let mut entries = self.write();
            match entries.iter_mut().find(|e| e.rule.id() == id) {
                Some(existing) => {
                    tracing::debug!(strategy_id = %id, "Replacing registered strategy");
                    existing.rule = rule;
                    existing.enabled = enabled;
                }
                None => entries.push(CatalogEntry { rule, enabled }),
            }
        }
        tracing::info!(strategy_id = %id, "Strategy registered");
        self.publish(DomainEvent::StrategyRegistered {
            strategy_id: id,
            timestamp: Timestamp::now(),
        });
    }

    pub fn remove(&self, strategy_id: &str) -> bool {
        let removed = {
            let mut entries = self.write();
            let before = entries.len();
            entries.retain(|e| e.rule.id() != strategy_id);
            entries.len() != before
        };
        if removed {
            tracing::info!(strategy_id = %strategy_id, "Strategy removed");
            self.publish(DomainEvent::StrategyRemoved {
                strategy_id: strategy_id.to_string(),
                timestamp: Timestamp::now(),
            });
        }
        removed
    }

    pub fn set_enabled(&self, strategy_id: &str, enabled: bool) -> bool {
        let found = {
            let mut entries = self.write();
            match entries.iter_mut().find(|e| e.rule.id() == strategy_id) {
                Some(entry) => {
                    entry.enabled = enabled;
                    true
                }
                None => false,
            }
        };
        if found {
            tracing::info!(strategy_id = %strategy_id, enabled, "Strategy toggled");
            self.publish(DomainEvent::StrategyToggled {
                strategy_id: strategy_id.to_string(),
                enabled,
                timestamp: Timestamp::now(),
            });
        }
        found
    }

    pub fn is_enabled(&self, strategy_id: &str) -> Option<bool> {
        self.read()
            .iter()
            .find(|e| e.rule.id() == strategy_id)
            .map(|e| e.enabled)
    }

    pub fn get(&self, strategy_id: &str) -> Option<Arc<dyn BehaviorRule>> {
        self.read()
            .iter()
            .find(|e| e.rule.id() == strategy_id)
            .map(|e| Arc::clone(&e.rule))
    }

    pub fn contains(&self, strategy_id: &str) -> bool {
        self.read().iter().any(|e| e.rule.id() == strategy_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Every rule in registration order.
    pub fn snapshot(&self) -> Vec<CatalogRule> {
        self.read()
            .iter()
            .map(|e| CatalogRule {
                rule: Arc::clone(&e.rule),
                enabled: e.enabled,
            })
            .collect()
    }

    pub fn summaries(&self) -> Vec<StrategySummary> {
        self.read()
            .iter()
            .map(|e| StrategySummary {
                id: e.rule.id().to_string(),
                name: e.rule.name().to_string(),
                description: e.rule.description().map(str::to_string),
                priority: e.rule.priority(),
                enabled: e.enabled,
                origin: e.rule.origin(),
            })
            .collect()
    }

    /// Persisted records, with their current enable flag.
    pub fn records(&self) -> Vec<Strategy> {
        self.read()
            .iter()
            .filter_map(|e| {
                e.rule.record().map(|s| {
                    let mut s = s.clone();
                    s.enabled = e.enabled;
                    s
                })
            })
            .collect()
    }

    /// Swap every persisted record for `records`; code-defined rules stay.
    ///
    /// All records are validated first. On any failure nothing changes.
    pub fn replace_records(&self, records: Vec<Strategy>) -> Result<usize, ImportError> {
        let errors: Vec<ValidationError> = records
            .iter()
            .filter_map(|s| s.validate().err())
            .collect();
        if !errors.is_empty() {
            return Err(ImportError::Invalid(errors));
        }

        let count = records.len();
        {
            let mut entries = self.write();
            entries.retain(|e| e.rule.origin() != RuleOrigin::Record);
            for strategy in records {
                let enabled = strategy.enabled;
                let rule: Arc<dyn BehaviorRule> = Arc::new(StrategyRule::new(strategy));
                match entries.iter_mut().find(|e| e.rule.id() == rule.id()) {
                    Some(existing) => {
                        existing.rule = rule;
                        existing.enabled = enabled;
                    }
                    None => entries.push(CatalogEntry { rule, enabled }),
                }
            }
        }

        tracing::info!(strategy_count = count, "Strategy catalog replaced");
        self.publish(DomainEvent::CatalogReloaded {
            strategy_count: count,
            timestamp: Timestamp::now(),
        });
        Ok(count)
    }

    pub fn export_document(&self) -> CatalogDocument {
        CatalogDocument {
            version: CATALOG_VERSION,
            exported_at: Utc::now(),
            strategies: self.records(),
        }
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.export_document())
    }

    /// Register every record in `json`, replacing by id.
    ///
    /// All-or-nothing: a malformed document or any invalid record leaves the
    /// catalog untouched.
    pub fn import_json(&self, json: &str) -> Result<usize, ImportError> {
        let records = parse_records(json)?;
        let count = records.len();
        for strategy in records {
            let enabled = strategy.enabled;
            self.insert(Arc::new(StrategyRule::new(strategy)), enabled);
        }
        tracing::info!(strategy_count = count, "Strategies imported");
        Ok(count)
    }
}

/// Parse and validate a catalog document or bare record array.
pub fn parse_records(json: &str) -> Result<Vec<Strategy>, ImportError> {
    let value: Value = serde_json::from_str(json)?;
    let raw = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => match map.remove("strategies") {
            Some(strategies) => strategies,
            None => {
                return Err(ImportError::Malformed(serde::de::Error::custom(
                    "expected an array of strategies or an object with a 'strategies' field",
                )))
            }
        },
        _ => {
            return Err(ImportError::Malformed(serde::de::Error::custom(
                "expected an array of strategies or an object with a 'strategies' field",
            )))
        }
    };

    let drafts: Vec<StrategyDraft> = serde_json::from_value(raw)?;
    let mut records = Vec::with_capacity(drafts.len());
    let mut errors = Vec::new();
    for draft in drafts {
        match draft.validate() {
            Ok(strategy) => records.push(strategy),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(records)
    } else {
        Err(ImportError::Invalid(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{default_strategies, EmotionDrivenRule};
    use crate::strategy::ActionSpec;
    use companion_core::types::{EmotionType, PetState};

    fn record(id: &str, priority: i32) -> Strategy {
        Strategy::builder(id, id)
            .states([PetState::Idle])
            .emotions([EmotionType::Calm])
            .priority(priority)
            .action(ActionSpec::new("idle_animation"))
            .build()
            .unwrap()
    }

    fn ids(catalog: &StrategyCatalog) -> Vec<String> {
        catalog
            .snapshot()
            .iter()
            .map(|r| r.rule.id().to_string())
            .collect()
    }

    #[test]
    fn test_register_keeps_registration_order() {
        let catalog = StrategyCatalog::new();
        catalog.register_strategy(record("a", 1)).unwrap();
        catalog.register_strategy(record("b", 5)).unwrap();
        catalog.register_rule(Arc::new(EmotionDrivenRule));
        assert_eq!(ids(&catalog), vec!["a", "b", "emotion_driven"]);
    }

    #[test]
    fn test_register_replaces_by_id_in_place() {
        let catalog = StrategyCatalog::new();
        catalog.register_strategy(record("a", 1)).unwrap();
        catalog.register_strategy(record("b", 1)).unwrap();
        catalog.register_strategy(record("a", 7)).unwrap();
        assert_eq!(ids(&catalog), vec!["a", "b"]);
        assert_eq!(catalog.get("a").unwrap().priority(), 7);
    }

    #[test]
    fn test_register_rejects_invalid() {
        let catalog = StrategyCatalog::new();
        let mut bad = record("a", 1);
        bad.actions.clear();
        bad.name.clear();
        let err = catalog.register_strategy(bad).unwrap_err();
        assert_eq!(err.fields(), vec!["name", "actions"]);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_remove_and_toggle() {
        let catalog = StrategyCatalog::new();
        catalog.register_strategy(record("a", 1)).unwrap();
        assert!(catalog.set_enabled("a", false));
        assert_eq!(catalog.is_enabled("a"), Some(false));
        assert!(!catalog.set_enabled("zzz", false));
        assert!(catalog.remove("a"));
        assert!(!catalog.remove("a"));
        assert!(!catalog.contains("a"));
    }

    #[test]
    fn test_records_reflect_enable_flag() {
        let catalog = StrategyCatalog::new();
        catalog.register_strategy(record("a", 1)).unwrap();
        catalog.register_rule(Arc::new(EmotionDrivenRule));
        catalog.set_enabled("a", false);
        let records = catalog.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].enabled);
    }

    #[test]
    fn test_replace_records_keeps_builtin_rules() {
        let catalog = StrategyCatalog::new();
        catalog.register_strategy(record("old", 1)).unwrap();
        catalog.register_rule(Arc::new(EmotionDrivenRule));

        let count = catalog
            .replace_records(vec![record("new1", 2), record("new2", 3)])
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(ids(&catalog), vec!["emotion_driven", "new1", "new2"]);
    }

    #[test]
    fn test_replace_records_is_atomic() {
        let catalog = StrategyCatalog::new();
        catalog.register_strategy(record("keep", 1)).unwrap();
        let mut bad = record("bad", 1);
        bad.states.clear();

        let result = catalog.replace_records(vec![record("new", 2), bad]);
        assert!(matches!(result, Err(ImportError::Invalid(ref e)) if e.len() == 1));
        assert_eq!(ids(&catalog), vec!["keep"]);
    }

    #[test]
    fn test_export_import_round_trip() {
        let source = StrategyCatalog::new();
        for s in default_strategies().unwrap() {
            source.register_strategy(s).unwrap();
        }
        source.set_enabled("celebration_video", false);
        let json = source.export_json().unwrap();

        let target = StrategyCatalog::new();
        assert_eq!(target.import_json(&json).unwrap(), 8);
        assert_eq!(target.records(), source.records());
        assert_eq!(target.is_enabled("celebration_video"), Some(false));
    }

    #[test]
    fn test_import_accepts_bare_array() {
        let catalog = StrategyCatalog::new();
        let json = r#"[{"id": "x", "name": "X", "states": ["hover"], "emotions": ["happy"],
                       "priority": 4, "actions": [{"type": "hover_feedback"}]}]"#;
        assert_eq!(catalog.import_json(json).unwrap(), 1);
        assert_eq!(catalog.get("x").unwrap().priority(), 4);
    }

    #[test]
    fn test_import_failure_leaves_catalog_unchanged() {
        let catalog = StrategyCatalog::new();
        catalog.register_strategy(record("a", 1)).unwrap();

        assert!(matches!(
            catalog.import_json("{ not json"),
            Err(ImportError::Malformed(_))
        ));
        assert!(matches!(
            catalog.import_json(r#"{"version": 1}"#),
            Err(ImportError::Malformed(_))
        ));

        let partly_bad = r#"[
            {"id": "good", "name": "Good", "states": ["idle"], "emotions": ["calm"], "actions": [{"type": "idle_animation"}]},
            {"id": "bad", "name": "", "states": ["nowhere"], "emotions": ["calm"], "actions": []}
        ]"#;
        match catalog.import_json(partly_bad) {
            Err(ImportError::Invalid(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].fields(), vec!["name", "states[0]", "actions"]);
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
        assert_eq!(ids(&catalog), vec!["a"]);
    }

    #[tokio::test]
    async fn test_catalog_publishes_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let catalog = StrategyCatalog::with_events(bus);

        catalog.register_strategy(record("a", 1)).unwrap();
        catalog.set_enabled("a", false);
        catalog.remove("a");

        let names: Vec<&str> = vec![
            rx.recv().await.unwrap().event_name(),
            rx.recv().await.unwrap().event_name(),
            rx.recv().await.unwrap().event_name(),
        ];
        assert_eq!(
            names,
            vec!["strategy_registered", "strategy_toggled", "strategy_removed"]
        );
    }
}
