//! The room session engine: the authoritative registry of open rooms and the
//! operations that move them through `waiting -> active -> completed`.
//!
//! Each operation lives next to the concern it implements:
//! - `registry`: room creation, lookup, roster and settings
//! - `gate`: admitting a connection to a room's live channel
//! - `relay`: per-room fan-out of live events
//! - `snapshot`: saving and copying finished drawings
//! - `timer`: starting the round and completing it exactly once
//! - `rating`: peer ratings and rankings
//! - `sweep`: retention of completed rooms

mod gate;
mod rating;
mod registry;
mod relay;
mod snapshot;
mod sweep;
mod timer;

pub use gate::Admission;
pub use rating::compute_rankings;
pub use registry::{RoomHandle, SessionRegistry};
pub use relay::{forward_events, RoomChannel};
pub use sweep::{spawn_sweeper, SweepReport};
pub use timer::RearmReport;

use std::time::Duration;

pub const DEFAULT_RETENTION_DAYS: i64 = 7;
pub const DEFAULT_STALE_ROOM_HOURS: i64 = 24;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a completed room is kept before the sweep drops it.
    pub retention: chrono::Duration,
    /// Open rooms older than this are reported by the sweep.
    pub stale_after: chrono::Duration,
    pub max_image_bytes: usize,
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retention: chrono::Duration::days(DEFAULT_RETENTION_DAYS),
            stale_after: chrono::Duration::hours(DEFAULT_STALE_ROOM_HOURS),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::database::{MemoryStore, Persister};
    use crate::models::{RoomSettings, SettingsPatch, User};
    use std::sync::Arc;

    pub fn registry_with_store() -> (Arc<SessionRegistry>, Arc<MemoryStore>) {
        registry_with_config(SessionConfig::default())
    }

    pub fn registry_with_config(config: SessionConfig) -> (Arc<SessionRegistry>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let (persister, _handle) = Persister::spawn(store.clone());
        let registry = SessionRegistry::new(store.clone(), persister, config);
        (Arc::new(registry), store)
    }

    /// A room with `host` and the given guests, all with user records.
    pub async fn seeded_room(
        registry: &SessionRegistry,
        settings: RoomSettings,
        guests: &[&str],
    ) -> String {
        registry.upsert_user(User::new("host", "Hana"));
        let patch = SettingsPatch {
            timer_enabled: Some(settings.timer_enabled),
            timer_duration_seconds: Some(settings.timer_duration_seconds),
            voting_enabled: Some(settings.voting_enabled),
            show_drawings_during_timer: Some(settings.show_drawings_during_timer),
            max_participants: Some(settings.max_participants),
        };
        let room = registry.create("host", Some(patch)).await.unwrap();
        for guest in guests {
            registry.upsert_user(User::new(*guest, guest.to_uppercase()));
            registry.add_participant(&room.code, guest).await.unwrap();
        }
        room.code
    }
}
