use dashmap::DashMap;

use super::{EntityStore, StoreError};
use crate::models::{Room, User};

/// Volatile backend for tests and throwaway servers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: DashMap<String, Room>,
    users: DashMap<String, User>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for MemoryStore {
    fn get_room(&self, code: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.get(code).map(|r| r.value().clone()))
    }

    fn put_room(&self, room: &Room) -> Result<(), StoreError> {
        self.rooms.insert(room.code.clone(), room.clone());
        Ok(())
    }

    fn remove_room(&self, code: &str) -> Result<(), StoreError> {
        self.rooms.remove(code);
        Ok(())
    }

    fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.rooms.iter().map(|r| r.value().clone()).collect())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    fn put_user(&self, user: &User) -> Result<(), StoreError> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.iter().map(|u| u.value().clone()).collect())
    }
}
