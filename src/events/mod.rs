//! Level-up and achievement notifications.
//!
//! Operations return their events as plain values; the engine hands them to
//! an [`EventDispatcher`] only after the store commit. Dispatch is
//! fire-and-forget: a failure is logged and never reaches the caller.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::progression::LevelUp;
use crate::types::{Achievement, UserId};

/// Something a user should be told about
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Lifetime points crossed one or more level thresholds
    LevelUp {
        /// Recipient
        user_id: UserId,
        /// Level before the award
        from: u32,
        /// Level after the award
        to: u32,
        /// Name of the new level
        level_name: &'static str,
    },
    /// An achievement was unlocked and its reward credited
    AchievementUnlocked {
        /// Recipient
        user_id: UserId,
        /// Catalog id
        achievement_id: String,
        /// Display name
        name: String,
        /// Points credited
        reward: u64,
    },
}

impl EngineEvent {
    /// Event for a level change
    #[must_use]
    pub fn level_up(user_id: UserId, change: LevelUp) -> Self {
        Self::LevelUp {
            user_id,
            from: change.from,
            to: change.to,
            level_name: change.level_name,
        }
    }

    /// Event for an unlocked achievement
    #[must_use]
    pub fn achievement(user_id: UserId, achievement: &Achievement) -> Self {
        Self::AchievementUnlocked {
            user_id,
            achievement_id: achievement.id.clone(),
            name: achievement.name.clone(),
            reward: achievement.reward,
        }
    }

    /// Recipient of the event
    #[must_use]
    pub fn user_id(&self) -> UserId {
        match self {
            Self::LevelUp { user_id, .. } | Self::AchievementUnlocked { user_id, .. } => *user_id,
        }
    }
}

/// Dispatch failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Consumer has gone away
    #[error("event consumer closed")]
    Closed,
    /// Consumer is not keeping up
    #[error("event queue full")]
    Full,
    /// Delivery rejected by the sink
    #[error("event rejected: {0}")]
    Rejected(String),
}

/// Sink for engine events
pub trait EventDispatcher: Send + Sync {
    /// Hand one event to the sink
    fn dispatch(&self, event: &EngineEvent) -> Result<(), DispatchError>;
}

/// Send every event, logging and swallowing failures.
///
/// Returns how many events were delivered.
pub fn dispatch_all(dispatcher: &dyn EventDispatcher, events: &[EngineEvent]) -> usize {
    let mut delivered = 0;
    for event in events {
        match dispatcher.dispatch(event) {
            Ok(()) => delivered += 1,
            Err(e) => warn!(user = %event.user_id(), error = %e, "failed to dispatch event"),
        }
    }
    delivered
}

/// Writes events to the log
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDispatcher;

impl EventDispatcher for TracingDispatcher {
    fn dispatch(&self, event: &EngineEvent) -> Result<(), DispatchError> {
        match event {
            EngineEvent::LevelUp {
                user_id,
                from,
                to,
                level_name,
            } => info!(user = %user_id, from, to, level_name, "level up"),
            EngineEvent::AchievementUnlocked {
                user_id,
                achievement_id,
                reward,
                ..
            } => info!(user = %user_id, achievement = %achievement_id, reward, "achievement unlocked"),
        }
        Ok(())
    }
}

/// Queues events for a background consumer
#[derive(Clone, Debug)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelDispatcher {
    /// Bounded queue; dispatch fails with [`DispatchError::Full`] when it fills
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventDispatcher for ChannelDispatcher {
    fn dispatch(&self, event: &EngineEvent) -> Result<(), DispatchError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::Full,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

/// Drain `rx` into `sink` until every sender is dropped.
///
/// Must be called from within a tokio runtime.
pub fn forward<D>(mut rx: mpsc::Receiver<EngineEvent>, sink: D) -> JoinHandle<usize>
where
    D: EventDispatcher + 'static,
{
    tokio::spawn(async move {
        let mut delivered = 0;
        while let Some(event) = rx.recv().await {
            delivered += dispatch_all(&sink, std::slice::from_ref(&event));
        }
        delivered
    })
}


#[cfg(test)]
mod tests {
    use super::testing::{FailingDispatcher, RecordingDispatcher};
    use super::*;
    use crate::progression::LevelCalculator;

    fn sample() -> Vec<EngineEvent> {
        let change = LevelCalculator::level_up(90, 120).unwrap();
        vec![
            EngineEvent::level_up(UserId::new(1), change),
            EngineEvent::AchievementUnlocked {
                user_id: UserId::new(1),
                achievement_id: "first_step".into(),
                name: "First Step".into(),
                reward: 10,
            },
        ]
    }

    #[test]
    fn test_dispatch_all_counts_deliveries() {
        let sink = RecordingDispatcher::default();
        assert_eq!(dispatch_all(&sink, &sample()), 2);
        assert_eq!(sink.taken(), sample());
    }

    #[test]
    fn test_failures_are_swallowed() {
        assert_eq!(dispatch_all(&FailingDispatcher, &sample()), 0);
        assert_eq!(dispatch_all(&TracingDispatcher, &sample()), 2);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(&sample()[0]).unwrap();
        assert_eq!(json["type"], "level_up");
        assert_eq!(json["from"], 1);
        assert_eq!(json["to"], 2);
        assert_eq!(json["level_name"], "Sprout");
    }

    #[test]
    fn test_full_channel_reports_full() {
        let (dispatcher, _rx) = ChannelDispatcher::new(1);
        let events = sample();
        assert!(dispatcher.dispatch(&events[0]).is_ok());
        assert_eq!(dispatcher.dispatch(&events[1]), Err(DispatchError::Full));
    }

    #[tokio::test]
    async fn test_channel_forwards_to_sink() {
        let (dispatcher, rx) = ChannelDispatcher::new(8);
        let consumer = forward(rx, TracingDispatcher);
        assert_eq!(dispatch_all(&dispatcher, &sample()), 2);
        drop(dispatcher);
        assert_eq!(consumer.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (dispatcher, rx) = ChannelDispatcher::new(8);
        drop(rx);
        assert_eq!(dispatcher.dispatch(&sample()[0]), Err(DispatchError::Closed));
    }
}
