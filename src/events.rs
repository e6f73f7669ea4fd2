//! Cross-component change notification.
//!
//! The tray menu and the main window both mutate accounts; each needs to
//! refresh when the other does. Mutating commands publish on this bus and
//! every UI surface subscribes. Publishing is best-effort: no subscribers,
//! or a subscriber that fell behind, never fails the mutation that
//! triggered the event.

use tokio::sync::broadcast;

/// Channel buffer size for state-change events.
const EVENT_CHANNEL_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AppEvent {
    /// The account list changed (add/edit/delete).
    AccountsChanged,
    /// The active profile changed (set-active, or cleared by a delete).
    ActiveProfileChanged { profile: Option<String> },
}

/// Publish-on-mutation / subscribe-from-UI event bus.
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Fan an event out to all subscribers. A send error only means there
    /// are currently no subscribers, which is fine (e.g. headless startup).
    pub fn publish(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("No subscribers for state-change event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(AppEvent::AccountsChanged);
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx_a = bus.subscribe();
        let mut rx_b = bus.subscribe();

        bus.publish(AppEvent::ActiveProfileChanged {
            profile: Some("dev".to_string()),
        });

        let expected = AppEvent::ActiveProfileChanged {
            profile: Some("dev".to_string()),
        };
        assert_eq!(rx_a.recv().await.unwrap(), expected);
        assert_eq!(rx_b.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.publish(AppEvent::AccountsChanged);

        let mut rx = bus.subscribe();
        bus.publish(AppEvent::AccountsChanged);

        assert_eq!(rx.recv().await.unwrap(), AppEvent::AccountsChanged);
        assert!(rx.try_recv().is_err());
    }
}
