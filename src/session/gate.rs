use tokio::sync::broadcast;

use super::{RoomChannel, SessionRegistry};
use crate::error::RoomError;
use crate::models::Room;
use crate::room_sync::{RoomEvent, ServerMessage};

/// What a connection gets once it is let into a room.
#[derive(Debug)]
pub struct Admission {
    pub code: String,
    /// Initial `roomState` for the joining connection only.
    pub state: ServerMessage,
    pub channel: RoomChannel,
    pub events: broadcast::Receiver<RoomEvent>,
}

impl SessionRegistry {
    /// Admits a participant's connection to the room's live channel.
    ///
    /// The subscription is taken under the room lock, so nothing published
    /// after the returned `roomState` can be missed.
    pub async fn admit(
        &self,
        code: &str,
        user_id: &str,
        connection_id: &str,
    ) -> Result<Admission, RoomError> {
        let handle = self.handle(code)?;
        self.load_user(user_id).await;

        let room = handle.room.lock().await;
        if !room.is_participant(user_id) {
            log::warn!("User {} tried to join room {} without being on the roster", user_id, room.code);
            return Err(RoomError::Unauthorized);
        }

        let events = handle.channel.subscribe();
        let state = room_state(&room);

        handle.channel.publish(RoomEvent::to_others(
            connection_id,
            ServerMessage::UserJoined {
                user_id: user_id.to_string(),
                user_name: self.display_name(user_id),
                participants: room.participants.clone(),
            },
        ));

        log::info!("Connection {} ({}) subscribed to room {}", connection_id, user_id, room.code);
        Ok(Admission {
            code: room.code.clone(),
            state,
            channel: handle.channel.clone(),
            events,
        })
    }

    /// Fresh `roomState` plus a new subscription, both taken under the room
    /// lock. Used when a connection fell behind the room channel and lost
    /// events it cannot do without.
    pub(crate) async fn resubscribe(
        &self,
        code: &str,
    ) -> Result<(ServerMessage, broadcast::Receiver<RoomEvent>), RoomError> {
        let handle = self.handle(code)?;
        let room = handle.room.lock().await;
        Ok((room_state(&room), handle.channel.subscribe()))
    }

    /// Announces a dropped connection. The user stays on the roster.
    pub async fn leave(&self, code: &str, user_id: &str, connection_id: &str) {
        let Ok(handle) = self.handle(code) else {
            return;
        };
        let room = handle.room.lock().await;
        handle.channel.publish(RoomEvent::to_others(
            connection_id,
            ServerMessage::UserLeft {
                user_id: user_id.to_string(),
                participants: room.participants.clone(),
            },
        ));
        log::info!("Connection {} ({}) left room {}", connection_id, user_id, room.code);
    }
}

fn room_state(room: &Room) -> ServerMessage {
    ServerMessage::RoomState {
        settings: room.settings.clone(),
        participants: room.participants.clone(),
        status: room.status,
        drawings: room.visible_drawings(),
    }
}
