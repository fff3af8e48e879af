use chrono::Utc;

use super::SessionRegistry;
use crate::error::RoomError;
use crate::models::{Drawing, DrawingRecord, RoomStatus};
use crate::room_sync::{RoomEvent, ServerMessage};

impl SessionRegistry {
    /// Replaces the caller's snapshot in the room and appends it to their
    /// drawing history. The only write path for `Room::drawings`.
    pub async fn save_drawing(
        &self,
        code: &str,
        user_id: &str,
        connection_id: &str,
        image_data: String,
    ) -> Result<(), RoomError> {
        if image_data.len() > self.config.max_image_bytes {
            return Err(RoomError::PayloadTooLarge(self.config.max_image_bytes));
        }

        let handle = self.handle(code)?;
        self.load_user(user_id).await;

        let mut room = handle.room.lock().await;
        if !room.is_participant(user_id) {
            return Err(RoomError::Unauthorized);
        }
        if room.status == RoomStatus::Completed {
            return Err(RoomError::InvalidState(
                "the round is over; drawings are final".to_string(),
            ));
        }

        let now = Utc::now();
        room.drawings.insert(
            user_id.to_string(),
            Drawing {
                image_data: image_data.clone(),
                timestamp: now,
                owner_id: user_id.to_string(),
            },
        );
        self.persist_room(&room);

        let record = DrawingRecord {
            image_data: image_data.clone(),
            room_code: room.code.clone(),
            timestamp: now,
        };
        if !self.update_user(user_id, |user| user.push_drawing(record)) {
            log::debug!("No profile for {}, skipping drawing history", user_id);
        }

        if room.drawings_visible() {
            handle.channel.publish(RoomEvent::to_others(
                connection_id,
                ServerMessage::DrawingUpdated {
                    user_id: user_id.to_string(),
                    image_data,
                    user_name: self.display_name(user_id),
                },
            ));
        }
        log::debug!("Saved drawing for {} in room {}", user_id, room.code);
        Ok(())
    }

    /// Hands the caller a copy of another participant's saved drawing. The
    /// source snapshot is left untouched.
    pub async fn copy_drawing(
        &self,
        code: &str,
        user_id: &str,
        source_user_id: &str,
    ) -> Result<ServerMessage, RoomError> {
        let handle = self.handle(code)?;
        let room = handle.room.lock().await;
        if !room.is_participant(user_id) {
            return Err(RoomError::Unauthorized);
        }
        if source_user_id != user_id && !room.drawings_visible() {
            return Err(RoomError::InvalidState(
                "drawings are hidden until the round ends".to_string(),
            ));
        }

        let drawing = room
            .drawings
            .get(source_user_id)
            .ok_or(RoomError::DrawingNotFound)?;
        Ok(ServerMessage::DrawingCopied {
            image_data: drawing.image_data.clone(),
            source_user_id: source_user_id.to_string(),
        })
    }
}
