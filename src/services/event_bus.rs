//! Bus de eventos de cambio de estado
//!
//! Difusión en proceso con `tokio::sync::broadcast`. Un suscriptor lento
//! pierde eventos antiguos en lugar de frenar a los demás.

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::dispatch_event::StatusChange;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct DispatchEventBus {
    sender: broadcast::Sender<StatusChange>,
}

impl DispatchEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emitir un cambio; devuelve cuántos suscriptores lo recibieron
    pub fn publish(&self, change: StatusChange) -> usize {
        match self.sender.send(change) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("📭 Cambio de estado sin suscriptores");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for DispatchEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dispatch_status::DispatchStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn change() -> StatusChange {
        StatusChange {
            dispatch_id: Uuid::new_v4(),
            from_status: DispatchStatus::Entered,
            to_status: DispatchStatus::PassengersDropped,
            at: Utc::now(),
            by: None,
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_changes() {
        let bus = DispatchEventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let sent = change();
        assert_eq!(bus.publish(sent.clone()), 2);
        assert_eq!(first.recv().await.unwrap(), sent);
        assert_eq!(second.recv().await.unwrap(), sent);
    }

    #[test]
    fn test_publish_without_subscribers_is_not_an_error() {
        let bus = DispatchEventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(change()), 0);
    }
}
