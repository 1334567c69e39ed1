use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{EmotionType, PetState, RhythmMode, Timestamp};

/// All domain events emitted by the engine.
///
/// Events are published on the [`EventBus`] and consumed by:
/// - The visual layer (animation playback, rhythm-driven pacing)
/// - Debug panels and logs
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DomainEvent {
    // =========================================================================
    // Scheduling Events
    // =========================================================================
    /// A decision produced a non-empty behavior list.
    BehaviorsScheduled {
        session_id: Uuid,
        state: PetState,
        emotion: EmotionType,
        behavior_count: usize,
        timestamp: Timestamp,
    },

    /// One behavior's effect completed.
    BehaviorExecuted {
        session_id: Uuid,
        behavior_type: String,
        strategy_id: String,
        timestamp: Timestamp,
    },

    /// One behavior's effect failed; the batch continued.
    BehaviorFailed {
        session_id: Uuid,
        behavior_type: String,
        strategy_id: String,
        reason: String,
        timestamp: Timestamp,
    },

    /// No strategy and no fallback matched.
    NothingMatched {
        session_id: Uuid,
        state: PetState,
        emotion: EmotionType,
        timestamp: Timestamp,
    },

    /// Pending delays and durations were cancelled.
    ScheduledBehaviorsCleared {
        session_id: Uuid,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Catalog Events
    // =========================================================================
    StrategyRegistered {
        strategy_id: String,
        timestamp: Timestamp,
    },

    StrategyRemoved {
        strategy_id: String,
        timestamp: Timestamp,
    },

    StrategyToggled {
        strategy_id: String,
        enabled: bool,
        timestamp: Timestamp,
    },

    /// The persisted record set was swapped.
    CatalogReloaded {
        strategy_count: usize,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Rhythm Events
    // =========================================================================
    RhythmModeChanged {
        from: RhythmMode,
        to: RhythmMode,
        tempo_ms: u64,
        timestamp: Timestamp,
    },
}

impl DomainEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DomainEvent::BehaviorsScheduled { timestamp, .. }
            | DomainEvent::BehaviorExecuted { timestamp, .. }
            | DomainEvent::BehaviorFailed { timestamp, .. }
            | DomainEvent::NothingMatched { timestamp, .. }
            | DomainEvent::ScheduledBehaviorsCleared { timestamp, .. }
            | DomainEvent::StrategyRegistered { timestamp, .. }
            | DomainEvent::StrategyRemoved { timestamp, .. }
            | DomainEvent::StrategyToggled { timestamp, .. }
            | DomainEvent::CatalogReloaded { timestamp, .. }
            | DomainEvent::RhythmModeChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a short snake_case name for the event, suitable for log fields.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::BehaviorsScheduled { .. } => "behaviors_scheduled",
            DomainEvent::BehaviorExecuted { .. } => "behavior_executed",
            DomainEvent::BehaviorFailed { .. } => "behavior_failed",
            DomainEvent::NothingMatched { .. } => "nothing_matched",
            DomainEvent::ScheduledBehaviorsCleared { .. } => "scheduled_behaviors_cleared",
            DomainEvent::StrategyRegistered { .. } => "strategy_registered",
            DomainEvent::StrategyRemoved { .. } => "strategy_removed",
            DomainEvent::StrategyToggled { .. } => "strategy_toggled",
            DomainEvent::CatalogReloaded { .. } => "catalog_reloaded",
            DomainEvent::RhythmModeChanged { .. } => "rhythm_mode_changed",
        }
    }
}

/// Fan-out channel for [`DomainEvent`]s.
///
/// Publishers never wait on subscribers. Publishing with no subscribers is a
/// no-op, and a subscriber that falls more than `capacity` events behind sees
/// `RecvError::Lagged`.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: DomainEvent) {
        tracing::trace!(event = event.event_name(), "Publishing domain event");
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_timestamp() {
        let ts = Timestamp(1_700_000_000_000);
        let event = DomainEvent::StrategyRegistered {
            strategy_id: "happy_hover_interaction".into(),
            timestamp: ts,
        };
        assert_eq!(event.timestamp(), ts);
    }

    #[test]
    fn test_event_name() {
        let event = DomainEvent::RhythmModeChanged {
            from: RhythmMode::Steady,
            to: RhythmMode::Pulse,
            tempo_ms: 400,
            timestamp: Timestamp(0),
        };
        assert_eq!(event.event_name(), "rhythm_mode_changed");
    }

    #[test]
    fn test_event_serialization() {
        let event = DomainEvent::NothingMatched {
            session_id: Uuid::new_v4(),
            state: PetState::Hover,
            emotion: EmotionType::Sleepy,
            timestamp: Timestamp(42),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["NothingMatched"]["state"], "hover");
        assert_eq!(json["NothingMatched"]["emotion"], "sleepy");
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(DomainEvent::CatalogReloaded {
            strategy_count: 3,
            timestamp: Timestamp(1),
        });
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(DomainEvent::StrategyToggled {
            strategy_id: "calm_universal_basic".into(),
            enabled: false,
            timestamp: Timestamp(7),
        });

        for rx in [&mut first, &mut second] {
            match rx.recv().await.unwrap() {
                DomainEvent::StrategyToggled {
                    strategy_id,
                    enabled,
                    ..
                } => {
                    assert_eq!(strategy_id, "calm_universal_basic");
                    assert!(!enabled);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(DomainEvent::CatalogReloaded {
                strategy_count: i,
                timestamp: Timestamp(i as i64),
            });
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
