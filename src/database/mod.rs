mod db;
mod memory;
mod persister;

pub use db::JsonFileStore;
pub use memory::MemoryStore;
pub use persister::{PendingWrite, Persister, RecordKey};

use thiserror::Error;

use crate::models::{Room, User};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable key-value record store for whole `Room` and `User` documents.
///
/// Calls may block on disk; async callers go through [`Persister`] or
/// `spawn_blocking`.
pub trait EntityStore: Send + Sync + 'static {
    fn get_room(&self, code: &str) -> Result<Option<Room>, StoreError>;
    fn put_room(&self, room: &Room) -> Result<(), StoreError>;
    fn remove_room(&self, code: &str) -> Result<(), StoreError>;
    fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;

    fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;
    fn put_user(&self, user: &User) -> Result<(), StoreError>;
    fn list_users(&self) -> Result<Vec<User>, StoreError>;
}
