use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::registry::RoomHandle;
use super::SessionRegistry;
use crate::error::RoomError;
use crate::models::{Room, RoomStatus};
use crate::room_sync::{RoomEvent, ServerMessage};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RearmReport {
    pub rearmed: usize,
    pub completed: usize,
}

impl SessionRegistry {
    /// Host-only `waiting -> active`. Returns the countdown length, or `None`
    /// when the room has no timer and must be finished by the host.
    pub async fn start_timer(self: &Arc<Self>, code: &str, caller_id: &str) -> Result<Option<u64>, RoomError> {
        let handle = self.handle(code)?;
        let mut room = handle.room.lock().await;
        room.start(caller_id, Utc::now())?;
        self.persist_room(&room);

        let duration = room
            .settings
            .timer_enabled
            .then_some(room.settings.timer_duration_seconds);
        if let Some(seconds) = duration {
            self.schedule_expiry(room.code.clone(), Duration::from_secs(seconds));
        }

        handle
            .channel
            .publish(RoomEvent::to_all(ServerMessage::TimerStarted { duration }));
        log::info!("Room {} started by {} (timer: {:?}s)", room.code, caller_id, duration);
        Ok(duration)
    }

    /// Expiry path: `active -> completed`. Safe to call any number of times;
    /// only the first call on an active room has an effect.
    pub async fn complete_room(&self, code: &str) -> bool {
        let Ok(handle) = self.handle(code) else {
            return false;
        };
        let mut room = handle.room.lock().await;
        self.complete_locked(&handle, &mut room)
    }

    /// Host-only early finish; the only way to end a room without a timer.
    pub async fn finish_room(&self, code: &str, caller_id: &str) -> Result<(), RoomError> {
        let handle = self.handle(code)?;
        let mut room = handle.room.lock().await;
        if !room.is_host(caller_id) {
            return Err(RoomError::Forbidden);
        }
        if room.status != RoomStatus::Active {
            return Err(RoomError::InvalidState(format!(
                "room is {}, not active",
                room.status.as_str()
            )));
        }
        self.complete_locked(&handle, &mut room);
        Ok(())
    }

    fn complete_locked(&self, handle: &RoomHandle, room: &mut Room) -> bool {
        if !room.complete(Utc::now()) {
            log::debug!("Room {} already {}, ignoring completion", room.code, room.status.as_str());
            return false;
        }
        self.persist_room(room);

        handle.channel.publish(RoomEvent::to_all(ServerMessage::TimerEnded {
            drawings: room.drawings.clone(),
        }));
        log::info!("Room {} completed with {} drawings", room.code, room.drawings.len());
        true
    }

    fn schedule_expiry(self: &Arc<Self>, code: String, after: Duration) {
        // a dropped registry means the server is shutting down
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(registry) = registry.upgrade() {
                registry.complete_room(&code).await;
            }
        });
    }

    /// Re-arms countdowns lost across a restart. Rooms whose deadline passed
    /// while the process was down are completed on the spot.
    pub async fn rearm_timers(self: &Arc<Self>, now: DateTime<Utc>) -> RearmReport {
        let mut report = RearmReport::default();

        for code in self.codes() {
            let Ok(handle) = self.handle(&code) else {
                continue;
            };
            let mut room = handle.room.lock().await;
            if room.status != RoomStatus::Active || !room.settings.timer_enabled {
                continue;
            }

            // a timed room with no computable deadline is treated as overdue
            let remaining = room
                .deadline()
                .and_then(|deadline| (deadline - now).to_std().ok())
                .filter(|remaining| !remaining.is_zero());
            match remaining {
                Some(remaining) => {
                    self.schedule_expiry(code.clone(), remaining);
                    report.rearmed += 1;
                    log::info!("Re-armed timer for room {} ({}s left)", code, remaining.as_secs());
                }
                None => {
                    if room.deadline().is_none() {
                        log::warn!("Room {} has an unusable timer duration, completing it", code);
                    }
                    if self.complete_locked(&handle, &mut room) {
                        report.completed += 1;
                    }
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{EntityStore, MemoryStore, Persister};
    use crate::models::{RoomSettings, SettingsPatch};
    use crate::session::test_support::{registry_with_store, seeded_room};
    use crate::session::SessionConfig;

    fn timed(seconds: u64) -> RoomSettings {
        RoomSettings {
            timer_enabled: true,
            timer_duration_seconds: seconds,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_completes_room_with_both_drawings() {
        let (registry, _store) = registry_with_store();
        let code = seeded_room(&registry, timed(60), &["bob"]).await;
        let mut host = registry.admit(&code, "host", "conn-h").await.unwrap();

        assert_eq!(registry.start_timer(&code, "host").await.unwrap(), Some(60));
        registry.save_drawing(&code, "host", "conn-h", "host-art".to_string()).await.unwrap();
        registry.save_drawing(&code, "bob", "conn-b", "bob-art".to_string()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(registry.get(&code).await.unwrap().status, RoomStatus::Active);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let room = registry.get(&code).await.unwrap();
        assert_eq!(room.status, RoomStatus::Completed);
        assert_eq!(room.drawings.len(), 2);
        assert!(room.completed_at.is_some());
        assert!(room.started_at.unwrap() <= room.completed_at.unwrap());

        let mut saw_start = false;
        let mut saw_end = false;
        while let Ok(event) = host.events.try_recv() {
            match event.message {
                ServerMessage::TimerStarted { duration } => {
                    assert_eq!(duration, Some(60));
                    saw_start = true;
                }
                ServerMessage::TimerEnded { drawings } => {
                    assert_eq!(drawings.len(), 2);
                    saw_end = true;
                }
                _ => {}
            }
        }
        assert!(saw_start && saw_end);
    }

    #[tokio::test]
    async fn completion_fires_exactly_once() {
        let (registry, _store) = registry_with_store();
        let code = seeded_room(&registry, RoomSettings::default(), &[]).await;
        registry.start_timer(&code, "host").await.unwrap();
        let mut admission = registry.admit(&code, "host", "conn-h").await.unwrap();

        let mut fired = Vec::new();
        for _ in 0..5 {
            let registry = registry.clone();
            let code = code.clone();
            fired.push(tokio::spawn(async move { registry.complete_room(&code).await }));
        }
        let mut wins = 0;
        for task in fired {
            if task.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let mut ended = 0;
        while let Ok(event) = admission.events.try_recv() {
            if matches!(event.message, ServerMessage::TimerEnded { .. }) {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
    }

    #[tokio::test]
    async fn only_host_starts_and_only_once() {
        let (registry, _store) = registry_with_store();
        let code = seeded_room(&registry, timed(30), &["bob"]).await;

        assert!(matches!(registry.start_timer(&code, "bob").await, Err(RoomError::Forbidden)));
        registry.start_timer(&code, "host").await.unwrap();
        assert!(matches!(
            registry.start_timer(&code, "host").await,
            Err(RoomError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn untimed_room_needs_host_finish() {
        let (registry, _store) = registry_with_store();
        let code = seeded_room(&registry, RoomSettings::default(), &["bob"]).await;

        assert!(matches!(
            registry.finish_room(&code, "host").await,
            Err(RoomError::InvalidState(_))
        ));
        assert_eq!(registry.start_timer(&code, "host").await.unwrap(), None);
        assert!(matches!(registry.finish_room(&code, "bob").await, Err(RoomError::Forbidden)));

        registry.finish_room(&code, "host").await.unwrap();
        assert_eq!(registry.get(&code).await.unwrap().status, RoomStatus::Completed);
        assert!(matches!(
            registry.finish_room(&code, "host").await,
            Err(RoomError::InvalidState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_does_not_touch_finished_room() {
        let (registry, _store) = registry_with_store();
        let code = seeded_room(&registry, timed(10), &[]).await;
        registry.start_timer(&code, "host").await.unwrap();
        registry.finish_room(&code, "host").await.unwrap();
        let completed_at = registry.get(&code).await.unwrap().completed_at;

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(registry.get(&code).await.unwrap().completed_at, completed_at);
    }

    #[tokio::test]
    async fn completed_room_rejects_host_actions() {
        let (registry, _store) = registry_with_store();
        let code = seeded_room(&registry, RoomSettings::default(), &["bob"]).await;
        registry.start_timer(&code, "host").await.unwrap();
        registry.finish_room(&code, "host").await.unwrap();

        let patch = SettingsPatch::default();
        assert!(matches!(
            registry.update_settings(&code, "host", &patch).await,
            Err(RoomError::InvalidState(_))
        ));
        assert!(matches!(
            registry.start_timer(&code, "host").await,
            Err(RoomError::InvalidState(_))
        ));
        assert!(matches!(
            registry.add_participant(&code, "carol").await,
            Err(RoomError::RoomNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_reconciles_active_rooms() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        let mut overdue = Room::new("OVR001".to_string(), "host".to_string(), timed(60));
        overdue.start("host", now - chrono::Duration::seconds(120)).unwrap();
        store.put_room(&overdue).unwrap();

        let mut pending = Room::new("PND001".to_string(), "host".to_string(), timed(60));
        pending.start("host", now - chrono::Duration::seconds(20)).unwrap();
        store.put_room(&pending).unwrap();

        let mut untimed = Room::new("UNT001".to_string(), "host".to_string(), RoomSettings::default());
        untimed.start("host", now - chrono::Duration::days(1)).unwrap();
        store.put_room(&untimed).unwrap();

        let (persister, _handle) = Persister::spawn(store.clone());
        let registry = Arc::new(
            SessionRegistry::restore(store.clone(), persister, SessionConfig::default()).unwrap(),
        );

        let report = registry.rearm_timers(now).await;
        assert_eq!(report, RearmReport { rearmed: 1, completed: 1 });
        assert_eq!(registry.get("OVR001").await.unwrap().status, RoomStatus::Completed);
        assert_eq!(registry.get("PND001").await.unwrap().status, RoomStatus::Active);
        assert_eq!(registry.get("UNT001").await.unwrap().status, RoomStatus::Active);

        tokio::time::sleep(Duration::from_secs(41)).await;
        assert_eq!(registry.get("PND001").await.unwrap().status, RoomStatus::Completed);

        registry.persister.flush().await;
        assert_eq!(store.get_room("OVR001").unwrap().unwrap().status, RoomStatus::Completed);
    }

    #[tokio::test]
    async fn restart_completes_room_with_unusable_duration() {
        let store = Arc::new(MemoryStore::new());
        let mut room = Room::new("HUGE01".to_string(), "host".to_string(), timed(60));
        room.settings.timer_duration_seconds = 10_000_000_000_000;
        room.start("host", Utc::now()).unwrap();
        store.put_room(&room).unwrap();

        let (persister, _handle) = Persister::spawn(store.clone());
        let registry = Arc::new(
            SessionRegistry::restore(store.clone(), persister, SessionConfig::default()).unwrap(),
        );

        let report = registry.rearm_timers(Utc::now()).await;
        assert_eq!(report, RearmReport { rearmed: 0, completed: 1 });
        assert_eq!(registry.get("HUGE01").await.unwrap().status, RoomStatus::Completed);
    }

    #[tokio::test]
    async fn host_cannot_set_an_unbounded_timer() {
        let (registry, _store) = registry_with_store();
        let patch = SettingsPatch {
            timer_enabled: Some(true),
            timer_duration_seconds: Some(10_000_000_000_000),
            ..Default::default()
        };
        assert!(matches!(
            registry.create("host", Some(patch.clone())).await,
            Err(RoomError::InvalidSettings(_))
        ));

        let code = seeded_room(&registry, RoomSettings::default(), &[]).await;
        assert!(matches!(
            registry.update_settings(&code, "host", &patch).await,
            Err(RoomError::InvalidSettings(_))
        ));
    }
}
