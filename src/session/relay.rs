use std::sync::Weak;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;

use super::SessionRegistry;
use crate::room_sync::{DrawEvent, RoomEvent, ServerMessage};

/// Fan-out channel for one room. Holds no history: a subscriber sees only
/// events published after it subscribed.
#[derive(Clone, Debug)]
pub struct RoomChannel {
    code: String,
    tx: broadcast::Sender<RoomEvent>,
}

impl RoomChannel {
    pub fn new(code: String, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { code, tx }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish(&self, event: RoomEvent) {
        // nobody listening is not an error
        let _ = self.tx.send(event);
    }

    /// Passes a live stroke event to every other connection in the room,
    /// tagged with the sender's user id. Room state is never read or written.
    pub fn relay_draw(&self, connection_id: &str, user_id: &str, event: DrawEvent) {
        self.publish(RoomEvent::to_others(
            connection_id,
            ServerMessage::from_draw(user_id, event),
        ));
    }
}

/// Pumps one connection's room subscription into its outbound queue, skipping
/// events the connection itself originated. Ends when either side closes.
///
/// A connection that falls behind loses whatever the channel overwrote. Since
/// that can include phase changes, it is resynced with a fresh `roomState`
/// and a new subscription from `registry`.
pub async fn forward_events(
    registry: Weak<SessionRegistry>,
    code: String,
    mut events: broadcast::Receiver<RoomEvent>,
    connection_id: String,
    out: mpsc::Sender<ServerMessage>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if !event.is_visible_to(&connection_id) {
                    continue;
                }
                if out.send(event.message).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                log::warn!(
                    "Connection {} lagged behind room {}, skipped {} events",
                    connection_id,
                    code,
                    skipped
                );
                let Some(registry) = registry.upgrade() else {
                    continue;
                };
                match registry.resubscribe(&code).await {
                    Ok((state, fresh)) => {
                        events = fresh;
                        if out.send(state).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Could not resync {} with room {}: {}", connection_id, code, e);
                    }
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RoomSettings, RoomStatus};
    use crate::session::test_support::{registry_with_config, seeded_room};
    use crate::session::SessionConfig;
    use std::sync::Arc;

    fn stroke(x: f64) -> DrawEvent {
        DrawEvent::Move { x, y: 0.0 }
    }

    /// Forwarder for a channel with no registry behind it.
    fn unlinked(
        channel: &RoomChannel,
        connection_id: &str,
        out: mpsc::Sender<ServerMessage>,
    ) -> impl std::future::Future<Output = ()> {
        forward_events(
            Weak::new(),
            channel.code().to_string(),
            channel.subscribe(),
            connection_id.to_string(),
            out,
        )
    }

    #[tokio::test]
    async fn sender_does_not_hear_itself() {
        let channel = RoomChannel::new("ABC123".to_string(), 16);
        let (own_tx, mut own_rx) = mpsc::channel(16);
        let (peer_tx, mut peer_rx) = mpsc::channel(16);
        tokio::spawn(unlinked(&channel, "conn-a", own_tx));
        tokio::spawn(unlinked(&channel, "conn-b", peer_tx));

        channel.relay_draw("conn-a", "alice", stroke(1.0));
        channel.publish(RoomEvent::to_all(ServerMessage::Pong));

        assert_eq!(
            peer_rx.recv().await.unwrap(),
            ServerMessage::OtherDrawMove {
                user_id: "alice".to_string(),
                x: 1.0,
                y: 0.0
            }
        );
        assert_eq!(peer_rx.recv().await.unwrap(), ServerMessage::Pong);
        // the broadcast to everyone is the first thing the sender sees
        assert_eq!(own_rx.recv().await.unwrap(), ServerMessage::Pong);
    }

    #[tokio::test]
    async fn per_sender_order_is_preserved() {
        let channel = RoomChannel::new("ABC123".to_string(), 64);
        let (tx, mut rx) = mpsc::channel(64);
        tokio::spawn(unlinked(&channel, "viewer", tx));

        for n in 0..20 {
            channel.relay_draw("conn-a", "alice", stroke(n as f64));
        }
        for n in 0..20 {
            match rx.recv().await.unwrap() {
                ServerMessage::OtherDrawMove { x, .. } => assert_eq!(x, n as f64),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_replay() {
        let channel = RoomChannel::new("ABC123".to_string(), 16);
        channel.relay_draw("conn-a", "alice", stroke(1.0));

        let (tx, mut rx) = mpsc::channel(16);
        tokio::spawn(unlinked(&channel, "late", tx));
        channel.relay_draw("conn-a", "alice", stroke(2.0));

        match rx.recv().await.unwrap() {
            ServerMessage::OtherDrawMove { x, .. } => assert_eq!(x, 2.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn forwarder_stops_when_connection_goes_away() {
        let channel = RoomChannel::new("ABC123".to_string(), 16);
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(unlinked(&channel, "gone", tx));
        drop(rx);
        channel.publish(RoomEvent::to_all(ServerMessage::Pong));
        task.await.unwrap();
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn lagging_connection_is_resynced_with_room_state() {
        let (registry, _store) = registry_with_config(SessionConfig {
            channel_capacity: 8,
            ..Default::default()
        });
        let code = seeded_room(&registry, RoomSettings::default(), &["bob"]).await;
        let bob = registry.admit(&code, "bob", "conn-b").await.unwrap();

        // the phase change is buried under more strokes than the channel holds
        registry.start_timer(&code, "host").await.unwrap();
        for n in 0..50 {
            bob.channel.relay_draw("conn-h", "host", stroke(n as f64));
        }

        let (tx, mut rx) = mpsc::channel(64);
        tokio::spawn(forward_events(
            Arc::downgrade(&registry),
            code.clone(),
            bob.events,
            "conn-b".to_string(),
            tx,
        ));

        match rx.recv().await.unwrap() {
            ServerMessage::RoomState { status, .. } => assert_eq!(status, RoomStatus::Active),
            other => panic!("expected a resync, got {:?}", other),
        }

        // the fresh subscription keeps delivering
        bob.channel.relay_draw("conn-h", "host", stroke(99.0));
        match rx.recv().await.unwrap() {
            ServerMessage::OtherDrawMove { x, .. } => assert_eq!(x, 99.0),
            other => panic!("unexpected {:?}", other),
        }
    }
}
