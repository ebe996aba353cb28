use crate::gateway::protocol::GatewayEvent;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Events buffered per dashboard client before it counts as too slow
const CLIENT_BUFFER: usize = 100;

/// Fans dashboard events out to every connected WebSocket client
pub struct EventBroadcaster {
    clients: DashMap<String, mpsc::Sender<GatewayEvent>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register a client; returns its id and the receiving end of its queue
    pub fn subscribe(&self) -> (String, mpsc::Receiver<GatewayEvent>) {
        let client_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.insert(client_id.clone(), tx);
        log::debug!("Dashboard client {} subscribed", client_id);
        (client_id, rx)
    }

    pub fn unsubscribe(&self, client_id: &str) {
        if self.clients.remove(client_id).is_some() {
            log::debug!("Dashboard client {} unsubscribed", client_id);
        }
    }

    /// Queue `event` for every client. Clients whose queue is full or closed
    /// are dropped. Returns how many clients received it.
    pub fn broadcast(&self, event: GatewayEvent) -> usize {
        let mut dropped = Vec::new();
        let mut delivered = 0;

        for entry in self.clients.iter() {
            if entry.value().try_send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                dropped.push(entry.key().clone());
            }
        }

        for client_id in dropped {
            self.clients.remove(&client_id);
            log::debug!("Dropped slow or disconnected dashboard client {}", client_id);
        }

        log::debug!("Broadcast '{}' to {} clients", event.event, delivered);
        delivered
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let (_a, mut rx_a) = broadcaster.subscribe();
        let (_b, mut rx_b) = broadcaster.subscribe();

        let delivered = broadcaster.broadcast(GatewayEvent::handle_update("bot.example.com"));
        assert_eq!(delivered, 2);
        assert_eq!(rx_a.recv().await.unwrap().event, "handle_update");
        assert_eq!(rx_b.recv().await.unwrap().data["handle"], "bot.example.com");
    }

    #[tokio::test]
    async fn test_closed_and_full_clients_are_dropped() {
        let broadcaster = EventBroadcaster::new();
        let (_closed, rx_closed) = broadcaster.subscribe();
        drop(rx_closed);
        let (_slow, _rx_slow) = broadcaster.subscribe();
        let (_fast, mut rx_fast) = broadcaster.subscribe();

        for _ in 0..CLIENT_BUFFER {
            broadcaster.broadcast(GatewayEvent::handle_update("x"));
            rx_fast.recv().await.unwrap();
        }
        // closed client went on the first broadcast, slow one still fits
        assert_eq!(broadcaster.client_count(), 2);

        broadcaster.broadcast(GatewayEvent::handle_update("x"));
        assert_eq!(broadcaster.client_count(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let broadcaster = EventBroadcaster::new();
        let (id, _rx) = broadcaster.subscribe();
        broadcaster.unsubscribe(&id);
        assert_eq!(broadcaster.client_count(), 0);
        assert_eq!(broadcaster.broadcast(GatewayEvent::handle_update("x")), 0);
    }
}
