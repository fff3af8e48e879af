use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::RoomError;

pub const ROOM_CODE_LEN: usize = 6;
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const DEFAULT_TIMER_DURATION_SECONDS: u64 = 300;
pub const MAX_TIMER_DURATION_SECONDS: u64 = 24 * 60 * 60;
pub const DEFAULT_MAX_PARTICIPANTS: usize = 10;

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

pub fn is_valid_room_code(value: &str) -> bool {
    value.len() == ROOM_CODE_LEN && value.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}

/// Codes are typed by humans, so lookups ignore case and surrounding whitespace.
pub fn normalize_room_code(value: &str) -> String {
    value.trim().to_ascii_uppercase()
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Active,
    Completed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Active => "active",
            RoomStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub timer_enabled: bool,
    #[serde(alias = "timerDuration")]
    pub timer_duration_seconds: u64,
    pub voting_enabled: bool,
    pub show_drawings_during_timer: bool,
    pub max_participants: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            timer_enabled: false,
            timer_duration_seconds: DEFAULT_TIMER_DURATION_SECONDS,
            voting_enabled: true,
            show_drawings_during_timer: false,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
        }
    }
}

/// Partial settings update; `None` fields keep their current value.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub timer_enabled: Option<bool>,
    #[serde(alias = "timerDuration")]
    pub timer_duration_seconds: Option<u64>,
    pub voting_enabled: Option<bool>,
    pub show_drawings_during_timer: Option<bool>,
    pub max_participants: Option<usize>,
}

impl RoomSettings {
    pub fn merged(&self, patch: &SettingsPatch) -> RoomSettings {
        RoomSettings {
            timer_enabled: patch.timer_enabled.unwrap_or(self.timer_enabled),
            timer_duration_seconds: patch
                .timer_duration_seconds
                .unwrap_or(self.timer_duration_seconds),
            voting_enabled: patch.voting_enabled.unwrap_or(self.voting_enabled),
            show_drawings_during_timer: patch
                .show_drawings_during_timer
                .unwrap_or(self.show_drawings_during_timer),
            max_participants: patch.max_participants.unwrap_or(self.max_participants),
        }
    }

    pub fn validate(&self, current_participants: usize) -> Result<(), RoomError> {
        if self.timer_duration_seconds == 0 {
            return Err(RoomError::InvalidSettings(
                "timer duration must be at least one second".to_string(),
            ));
        }
        if self.timer_duration_seconds > MAX_TIMER_DURATION_SECONDS {
            return Err(RoomError::InvalidSettings(format!(
                "timer duration cannot exceed {} seconds",
                MAX_TIMER_DURATION_SECONDS
            )));
        }
        if self.max_participants == 0 {
            return Err(RoomError::InvalidSettings(
                "room must allow at least one participant".to_string(),
            ));
        }
        if self.max_participants < current_participants {
            return Err(RoomError::InvalidSettings(format!(
                "room already has {} participants",
                current_participants
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Drawing {
    pub image_data: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "userId", alias = "ownerId")]
    pub owner_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    #[serde(alias = "userId")]
    pub rater_id: String,
    pub rating: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    pub code: String,
    pub host_id: String,
    pub participants: Vec<String>,
    pub settings: RoomSettings,
    pub status: RoomStatus,
    #[serde(default)]
    pub drawings: HashMap<String, Drawing>,
    #[serde(default)]
    pub ratings: HashMap<String, Vec<Rating>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn new(code: String, host_id: String, settings: RoomSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            participants: vec![host_id.clone()],
            host_id,
            settings,
            status: RoomStatus::Waiting,
            drawings: HashMap::new(),
            ratings: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.settings.max_participants
    }

    /// Saved drawings are shared with the room only when the host allows it or
    /// the round is over.
    pub fn drawings_visible(&self) -> bool {
        self.settings.show_drawings_during_timer || self.status == RoomStatus::Completed
    }

    pub fn visible_drawings(&self) -> HashMap<String, Drawing> {
        if self.drawings_visible() {
            self.drawings.clone()
        } else {
            HashMap::new()
        }
    }

    /// Idempotent roster insert. Returns whether the roster changed.
    pub fn add_participant(&mut self, user_id: &str) -> Result<bool, RoomError> {
        if self.status == RoomStatus::Completed {
            return Err(RoomError::RoomNotFound);
        }
        if self.is_participant(user_id) {
            return Ok(false);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }
        self.participants.push(user_id.to_string());
        Ok(true)
    }

    pub fn update_settings(
        &mut self,
        user_id: &str,
        patch: &SettingsPatch,
    ) -> Result<&RoomSettings, RoomError> {
        if !self.is_host(user_id) {
            return Err(RoomError::Forbidden);
        }
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState(
                "settings cannot change after the round has started".to_string(),
            ));
        }
        let merged = self.settings.merged(patch);
        merged.validate(self.participants.len())?;
        self.settings = merged;
        Ok(&self.settings)
    }

    /// waiting -> active. Stamps `started_at`.
    pub fn start(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<(), RoomError> {
        if !self.is_host(user_id) {
            return Err(RoomError::Forbidden);
        }
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState(format!(
                "room is already {}",
                self.status.as_str()
            )));
        }
        self.status = RoomStatus::Active;
        self.started_at = Some(now);
        Ok(())
    }

    /// active -> completed. Returns false when the room is not active, so
    /// repeated or stale triggers leave the room untouched.
    pub fn complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != RoomStatus::Active {
            return false;
        }
        self.status = RoomStatus::Completed;
        self.completed_at = Some(now);
        true
    }

    /// When the countdown runs out, if this room has one. `None` as well when
    /// a stored duration does not fit in a timestamp.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        if !self.settings.timer_enabled {
            return None;
        }
        let seconds = i64::try_from(self.settings.timer_duration_seconds).ok()?;
        let duration = TimeDelta::try_seconds(seconds)?;
        self.started_at?.checked_add_signed(duration)
    }

    pub fn has_rated(&self, rater_id: &str, target_id: &str) -> bool {
        self.ratings
            .get(target_id)
            .is_some_and(|ratings| ratings.iter().any(|r| r.rater_id == rater_id))
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            code: self.code.clone(),
            host_id: self.host_id.clone(),
            settings: self.settings.clone(),
            participants: self.participants.clone(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: Uuid,
    pub code: String,
    pub host_id: String,
    pub settings: RoomSettings,
    pub participants: Vec<String>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CreateRoomView {
    #[serde(default)]
    pub settings: Option<SettingsPatch>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JoinRoomView {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpdateSettingsView {
    pub settings: SettingsPatch,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoomEnvelope {
    pub room: RoomSummary,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SettingsEnvelope {
    pub settings: RoomSettings,
}
