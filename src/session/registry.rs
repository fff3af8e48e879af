use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::relay::RoomChannel;
use super::SessionConfig;
use crate::database::{EntityStore, Persister};
use crate::error::RoomError;
use crate::models::rooms::{generate_room_code, normalize_room_code};
use crate::models::users::UNKNOWN_USER_NAME;
use crate::models::{Room, RoomSettings, SettingsPatch, User};
use crate::room_sync::{RoomEvent, ServerMessage};

/// One live room: its authoritative state behind a per-room lock, and the
/// fan-out channel its connections subscribe to.
#[derive(Debug)]
pub struct RoomHandle {
    pub(crate) room: Mutex<Room>,
    pub(crate) channel: RoomChannel,
}

impl RoomHandle {
    fn new(room: Room, capacity: usize) -> Self {
        let channel = RoomChannel::new(room.code.clone(), capacity);
        Self {
            room: Mutex::new(room),
            channel,
        }
    }
}

/// Every open room, keyed by code. Operations on one room serialize on that
/// room's lock; different rooms never contend.
pub struct SessionRegistry {
    pub(crate) rooms: DashMap<String, Arc<RoomHandle>>,
    pub(crate) users: DashMap<String, User>,
    pub(crate) store: Arc<dyn EntityStore>,
    pub(crate) persister: Persister,
    pub(crate) config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn EntityStore>, persister: Persister, config: SessionConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            users: DashMap::new(),
            store,
            persister,
            config,
        }
    }

    /// Rebuilds the registry from whatever the store holds. Timers are not
    /// re-armed here; see `rearm_timers`.
    pub fn restore(
        store: Arc<dyn EntityStore>,
        persister: Persister,
        config: SessionConfig,
    ) -> Result<Self, crate::database::StoreError> {
        let rooms = store.list_rooms()?;
        let users = store.list_users()?;
        let registry = Self::new(store, persister, config);

        for room in rooms {
            let handle = RoomHandle::new(room, registry.config.channel_capacity);
            let code = handle.channel.code().to_string();
            registry.rooms.insert(code, Arc::new(handle));
        }
        for user in users {
            registry.users.insert(user.id.clone(), user);
        }

        log::info!(
            "Restored {} rooms and {} users from store",
            registry.rooms.len(),
            registry.users.len()
        );
        Ok(registry)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub(crate) fn codes(&self) -> Vec<String> {
        self.rooms.iter().map(|r| r.key().clone()).collect()
    }

    pub(crate) fn handle(&self, code: &str) -> Result<Arc<RoomHandle>, RoomError> {
        let code = normalize_room_code(code);
        // clone out so the shard guard is released before any await
        self.rooms
            .get(&code)
            .map(|h| h.value().clone())
            .ok_or(RoomError::RoomNotFound)
    }

    /// Queues a write for a room the caller holds locked. A room the sweep
    /// dropped while the caller waited for its lock is not written back.
    pub(crate) fn persist_room(&self, room: &Room) {
        if !self.rooms.contains_key(&room.code) {
            log::debug!("Room {} was swept, skipping write", room.code);
            return;
        }
        self.persister.put_room(room);
    }

    pub async fn create(
        &self,
        host_id: &str,
        settings: Option<SettingsPatch>,
    ) -> Result<Room, RoomError> {
        let settings = RoomSettings::default().merged(&settings.unwrap_or_default());
        settings.validate(1)?;

        loop {
            let code = generate_room_code();
            match self.rooms.entry(code.clone()) {
                Entry::Occupied(_) => {
                    log::debug!("Room code {} collided, drawing another", code);
                    continue;
                }
                Entry::Vacant(slot) => {
                    let room = Room::new(code.clone(), host_id.to_string(), settings);
                    slot.insert(Arc::new(RoomHandle::new(
                        room.clone(),
                        self.config.channel_capacity,
                    )));
                    self.persister.put_room(&room);
                    log::info!("Room {} created by {}", code, host_id);
                    return Ok(room);
                }
            }
        }
    }

    pub async fn get(&self, code: &str) -> Result<Room, RoomError> {
        let handle = self.handle(code)?;
        let room = handle.room.lock().await;
        Ok(room.clone())
    }

    /// Same as `get`, but only participants may look.
    pub async fn get_for_participant(&self, code: &str, user_id: &str) -> Result<Room, RoomError> {
        let handle = self.handle(code)?;
        let room = handle.room.lock().await;
        if !room.is_participant(user_id) {
            return Err(RoomError::Unauthorized);
        }
        Ok(room.clone())
    }

    pub async fn add_participant(&self, code: &str, user_id: &str) -> Result<Room, RoomError> {
        let handle = self.handle(code)?;
        let mut room = handle.room.lock().await;
        if room.add_participant(user_id)? {
            self.persist_room(&room);
            log::info!("User {} joined room {}", user_id, room.code);
        }
        Ok(room.clone())
    }

    pub async fn update_settings(
        &self,
        code: &str,
        user_id: &str,
        patch: &SettingsPatch,
    ) -> Result<RoomSettings, RoomError> {
        let handle = self.handle(code)?;
        let mut room = handle.room.lock().await;
        let settings = room.update_settings(user_id, patch)?.clone();
        self.persist_room(&room);

        handle.channel.publish(RoomEvent::to_all(ServerMessage::SettingsUpdated {
            settings: settings.clone(),
        }));
        Ok(settings)
    }

    /// Makes sure the user record is cached, reading the store on a miss.
    /// Call before taking a room lock; the read may hit disk.
    pub async fn load_user(&self, user_id: &str) -> Option<User> {
        if let Some(user) = self.users.get(user_id) {
            return Some(user.value().clone());
        }

        let store = self.store.clone();
        let id = user_id.to_string();
        let loaded = match tokio::task::spawn_blocking(move || store.get_user(&id)).await {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => {
                log::error!("Error loading user {}: {}", user_id, e);
                None
            }
            Err(e) => {
                log::error!("User lookup task failed: {}", e);
                None
            }
        }?;

        // a concurrent writer may have cached a newer copy meanwhile
        let cached = self
            .users
            .entry(user_id.to_string())
            .or_insert(loaded)
            .value()
            .clone();
        Some(cached)
    }

    /// Inserts or replaces a cached user record and persists it.
    pub fn upsert_user(&self, user: User) {
        self.persister.put_user(&user);
        self.users.insert(user.id.clone(), user);
    }

    pub(crate) fn update_user(&self, user_id: &str, apply: impl FnOnce(&mut User)) -> bool {
        match self.users.get_mut(user_id) {
            Some(mut user) => {
                apply(user.value_mut());
                self.persister.put_user(user.value());
                true
            }
            None => false,
        }
    }

    pub fn display_name(&self, user_id: &str) -> String {
        self.users
            .get(user_id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| UNKNOWN_USER_NAME.to_string())
    }

    pub(crate) fn profile(&self, user_id: &str) -> (String, Option<String>) {
        match self.users.get(user_id) {
            Some(user) => (user.name.clone(), user.avatar.clone()),
            None => (UNKNOWN_USER_NAME.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::models::rooms::is_valid_room_code;
    use crate::models::RoomStatus;
    use crate::session::test_support::registry_with_store;
    use std::collections::HashSet;

    #[tokio::test]
    async fn create_generates_unique_well_formed_codes() {
        let (registry, _store) = registry_with_store();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let room = registry.create("host", None).await.unwrap();
            assert!(is_valid_room_code(&room.code));
            assert!(seen.insert(room.code.clone()), "duplicate code {}", room.code);
            assert_eq!(room.status, RoomStatus::Waiting);
            assert_eq!(room.participants, vec!["host".to_string()]);
        }
        assert_eq!(registry.room_count(), 100);
    }

    #[tokio::test]
    async fn create_applies_partial_settings_over_defaults() {
        let (registry, _store) = registry_with_store();
        let patch = SettingsPatch {
            timer_enabled: Some(true),
            timer_duration_seconds: Some(60),
            ..Default::default()
        };
        let room = registry.create("host", Some(patch)).await.unwrap();
        assert!(room.settings.timer_enabled);
        assert_eq!(room.settings.timer_duration_seconds, 60);
        assert_eq!(room.settings.max_participants, 10);
        assert!(room.settings.voting_enabled);
    }

    #[tokio::test]
    async fn created_room_is_persisted() {
        let (registry, store) = registry_with_store();
        let room = registry.create("host", None).await.unwrap();
        registry.persister.flush().await;
        assert!(store.get_room(&room.code).unwrap().is_some());
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let (registry, _store) = registry_with_store();
        let room = registry.create("host", None).await.unwrap();
        let found = registry.get(&room.code.to_lowercase()).await.unwrap();
        assert_eq!(found.id, room.id);
        assert!(matches!(registry.get("NOPE00").await, Err(RoomError::RoomNotFound)));
    }

    #[tokio::test]
    async fn join_twice_leaves_single_entry() {
        let (registry, _store) = registry_with_store();
        let room = registry.create("host", None).await.unwrap();
        registry.add_participant(&room.code, "bob").await.unwrap();
        let room = registry.add_participant(&room.code, "bob").await.unwrap();
        assert_eq!(room.participants, vec!["host".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn third_join_into_pair_room_is_rejected() {
        let (registry, _store) = registry_with_store();
        let patch = SettingsPatch {
            max_participants: Some(2),
            ..Default::default()
        };
        let room = registry.create("host", Some(patch)).await.unwrap();
        registry.add_participant(&room.code, "bob").await.unwrap();
        let result = registry.add_participant(&room.code, "carol").await;
        assert!(matches!(result, Err(RoomError::RoomFull)));
        assert_eq!(registry.get(&room.code).await.unwrap().participants.len(), 2);
    }

    #[tokio::test]
    async fn settings_guarded_by_host_and_phase() {
        let (registry, _store) = registry_with_store();
        let room = registry.create("host", None).await.unwrap();
        registry.add_participant(&room.code, "bob").await.unwrap();

        let patch = SettingsPatch {
            voting_enabled: Some(false),
            ..Default::default()
        };
        let result = registry.update_settings(&room.code, "bob", &patch).await;
        assert!(matches!(result, Err(RoomError::Forbidden)));

        let settings = registry.update_settings(&room.code, "host", &patch).await.unwrap();
        assert!(!settings.voting_enabled);

        {
            let handle = registry.handle(&room.code).unwrap();
            handle.room.lock().await.start("host", chrono::Utc::now()).unwrap();
        }
        let result = registry.update_settings(&room.code, "host", &patch).await;
        assert!(matches!(result, Err(RoomError::InvalidState(_))));
    }

    #[tokio::test]
    async fn concurrent_joins_respect_capacity() {
        let (registry, _store) = registry_with_store();
        let patch = SettingsPatch {
            max_participants: Some(5),
            ..Default::default()
        };
        let room = registry.create("host", Some(patch)).await.unwrap();

        let mut tasks = Vec::new();
        for n in 0..20 {
            let registry = registry.clone();
            let code = room.code.clone();
            tasks.push(tokio::spawn(async move {
                registry.add_participant(&code, &format!("user-{n}")).await
            }));
        }
        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 4);
        assert_eq!(registry.get(&room.code).await.unwrap().participants.len(), 5);
    }

    #[tokio::test]
    async fn restore_rebuilds_rooms_and_users() {
        let store = Arc::new(MemoryStore::new());
        let room = Room::new("RST001".to_string(), "host".to_string(), RoomSettings::default());
        store.put_room(&room).unwrap();
        store.put_user(&User::new("host", "Hana")).unwrap();

        let (persister, _handle) = Persister::spawn(store.clone());
        let registry =
            SessionRegistry::restore(store.clone(), persister, SessionConfig::default()).unwrap();
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.get("RST001").await.unwrap().id, room.id);
        assert_eq!(registry.display_name("host"), "Hana");
        assert_eq!(registry.display_name("ghost"), UNKNOWN_USER_NAME);
    }

    #[tokio::test]
    async fn load_user_falls_back_to_store() {
        let (registry, store) = registry_with_store();
        store.put_user(&User::new("late", "Latecomer")).unwrap();
        assert_eq!(registry.display_name("late"), UNKNOWN_USER_NAME);

        let user = registry.load_user("late").await.unwrap();
        assert_eq!(user.name, "Latecomer");
        assert_eq!(registry.display_name("late"), "Latecomer");
        assert!(registry.load_user("nobody").await.is_none());
    }
}
