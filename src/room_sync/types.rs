use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Drawing, RankingEntry, RoomSettings, RoomStatus};

/// Transient stroke progress. Relayed to the room as-is, never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawEvent {
    Start {
        x: f64,
        y: f64,
        color: String,
        brush_size: f64,
    },
    Move {
        x: f64,
        y: f64,
    },
    End,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinRoom {
        room_code: String,
        user_id: String,
    },
    DrawStart {
        x: f64,
        y: f64,
        color: String,
        brush_size: f64,
    },
    DrawMove {
        x: f64,
        y: f64,
    },
    DrawEnd,
    SaveDrawing {
        image_data: String,
    },
    StartTimer,
    FinishRoom,
    SubmitRating {
        target_user_id: String,
        rating: i64,
    },
    CopyDrawing {
        source_user_id: String,
    },
    Ping,
}

impl ClientMessage {
    /// Splits live stroke events off from the commands that touch room state.
    pub fn into_draw_event(self) -> Result<DrawEvent, ClientMessage> {
        match self {
            ClientMessage::DrawStart {
                x,
                y,
                color,
                brush_size,
            } => Ok(DrawEvent::Start {
                x,
                y,
                color,
                brush_size,
            }),
            ClientMessage::DrawMove { x, y } => Ok(DrawEvent::Move { x, y }),
            ClientMessage::DrawEnd => Ok(DrawEvent::End),
            other => Err(other),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    RoomState {
        settings: RoomSettings,
        participants: Vec<String>,
        status: RoomStatus,
        drawings: HashMap<String, Drawing>,
    },
    UserJoined {
        user_id: String,
        user_name: String,
        participants: Vec<String>,
    },
    UserLeft {
        user_id: String,
        participants: Vec<String>,
    },
    OtherDrawStart {
        user_id: String,
        x: f64,
        y: f64,
        color: String,
        brush_size: f64,
    },
    OtherDrawMove {
        user_id: String,
        x: f64,
        y: f64,
    },
    OtherDrawEnd {
        user_id: String,
    },
    DrawingUpdated {
        user_id: String,
        image_data: String,
        user_name: String,
    },
    DrawingCopied {
        image_data: String,
        source_user_id: String,
    },
    SettingsUpdated {
        settings: RoomSettings,
    },
    TimerStarted {
        duration: Option<u64>,
    },
    TimerEnded {
        drawings: HashMap<String, Drawing>,
    },
    RankingsUpdated {
        rankings: Vec<RankingEntry>,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl ToString) -> Self {
        ServerMessage::Error {
            message: message.to_string(),
        }
    }

    /// Tags a sender's draw event for the other subscribers.
    pub fn from_draw(user_id: &str, event: DrawEvent) -> Self {
        let user_id = user_id.to_string();
        match event {
            DrawEvent::Start {
                x,
                y,
                color,
                brush_size,
            } => ServerMessage::OtherDrawStart {
                user_id,
                x,
                y,
                color,
                brush_size,
            },
            DrawEvent::Move { x, y } => ServerMessage::OtherDrawMove { user_id, x, y },
            DrawEvent::End => ServerMessage::OtherDrawEnd { user_id },
        }
    }
}

/// A fan-out message plus the connection it came from, so the sender's own
/// forwarder can skip it.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub origin: Option<String>,
    pub message: ServerMessage,
}

impl RoomEvent {
    pub fn to_all(message: ServerMessage) -> Self {
        Self {
            origin: None,
            message,
        }
    }

    pub fn to_others(origin: &str, message: ServerMessage) -> Self {
        Self {
            origin: Some(origin.to_string()),
            message,
        }
    }

    pub fn is_visible_to(&self, connection_id: &str) -> bool {
        self.origin.as_deref() != Some(connection_id)
    }
}
