use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{EntityStore, StoreError};
use crate::models::{Room, User};

/// One pretty-printed JSON document per record:
/// `<root>/rooms/<CODE>.json` and `<root>/users/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    rooms_dir: PathBuf,
    users_dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let rooms_dir = root.join("rooms");
        let users_dir = root.join("users");
        fs::create_dir_all(&rooms_dir)?;
        fs::create_dir_all(&users_dir)?;
        log::info!("Entity store opened at {}", root.display());
        Ok(Self { rooms_dir, users_dir })
    }

    fn record_path(dir: &Path, key: &str) -> PathBuf {
        // user ids come from token claims and may contain path separators
        dir.join(format!("{}.json", urlencoding::encode(key)))
    }

    fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // write to a sibling temp file then rename so readers never see half a record
    fn write<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn list<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => log::error!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }
}

impl EntityStore for JsonFileStore {
    fn get_room(&self, code: &str) -> Result<Option<Room>, StoreError> {
        Self::read(&Self::record_path(&self.rooms_dir, code))
    }

    fn put_room(&self, room: &Room) -> Result<(), StoreError> {
        Self::write(&Self::record_path(&self.rooms_dir, &room.code), room)
    }

    fn remove_room(&self, code: &str) -> Result<(), StoreError> {
        match fs::remove_file(Self::record_path(&self.rooms_dir, code)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Self::list(&self.rooms_dir)
    }

    fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Self::read(&Self::record_path(&self.users_dir, id))
    }

    fn put_user(&self, user: &User) -> Result<(), StoreError> {
        Self::write(&Self::record_path(&self.users_dir, &user.id), user)
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Self::list(&self.users_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoomSettings;

    #[test]
    fn room_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let room = Room::new("QWE456".to_string(), "host".to_string(), RoomSettings::default());

        store.put_room(&room).unwrap();
        let loaded = store.get_room("QWE456").unwrap().expect("room should exist");
        assert_eq!(loaded.id, room.id);
        assert_eq!(loaded.participants, room.participants);
        assert_eq!(store.list_rooms().unwrap().len(), 1);

        store.remove_room("QWE456").unwrap();
        assert!(store.get_room("QWE456").unwrap().is_none());
        // removing twice is fine
        store.remove_room("QWE456").unwrap();
    }

    #[test]
    fn user_ids_with_separators_stay_inside_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let user = User::new("../escape/attempt", "Mallory");

        store.put_user(&user).unwrap();
        assert!(!dir.path().join("escape").exists());
        let loaded = store.get_user("../escape/attempt").unwrap().unwrap();
        assert_eq!(loaded.name, "Mallory");
    }

    #[test]
    fn corrupt_records_are_skipped_when_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        store.put_user(&User::new("u1", "Ada")).unwrap();
        fs::write(dir.path().join("users").join("broken.json"), b"{not json").unwrap();

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "u1");
    }
}
