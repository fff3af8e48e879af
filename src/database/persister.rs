use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

use super::EntityStore;
use crate::models::{Room, User};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Room(String),
    User(String),
}

/// The newest write waiting for one record.
#[derive(Debug)]
pub enum PendingWrite {
    PutRoom(Box<Room>),
    PutUser(Box<User>),
    RemoveRoom,
}

/// Write-behind queue in front of the entity store.
///
/// In-memory state is authoritative. At most one write is held per record:
/// a newer submission replaces whatever was still pending for the same key,
/// so memory stays bounded by the number of live records no matter how fast
/// callers write. A single background task drains the queue; failures are
/// logged and dropped.
#[derive(Clone, Debug)]
pub struct Persister {
    pending: Arc<DashMap<RecordKey, PendingWrite>>,
    wake: Arc<Notify>,
    flush_tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
}

impl Persister {
    /// Starts the writer task. It exits after a last drain once every clone
    /// of the returned `Persister` is dropped.
    pub fn spawn(store: Arc<dyn EntityStore>) -> (Self, JoinHandle<()>) {
        let pending = Arc::new(DashMap::new());
        let wake = Arc::new(Notify::new());
        let (flush_tx, mut flush_rx) = mpsc::unbounded_channel::<oneshot::Sender<()>>();

        let worker_pending = pending.clone();
        let worker_wake = wake.clone();
        let handle = tokio::spawn(async move {
            loop {
                let mut waiters = Vec::new();
                tokio::select! {
                    _ = worker_wake.notified() => {}
                    request = flush_rx.recv() => match request {
                        Some(done) => waiters.push(done),
                        None => {
                            drain(&store, &worker_pending).await;
                            break;
                        }
                    }
                }
                while let Ok(done) = flush_rx.try_recv() {
                    waiters.push(done);
                }

                drain(&store, &worker_pending).await;
                for done in waiters {
                    let _ = done.send(());
                }
            }
            log::debug!("Persister queue closed");
        });

        (
            Self {
                pending,
                wake,
                flush_tx,
            },
            handle,
        )
    }

    pub fn put_room(&self, room: &Room) {
        self.submit(
            RecordKey::Room(room.code.clone()),
            PendingWrite::PutRoom(Box::new(room.clone())),
        );
    }

    pub fn put_user(&self, user: &User) {
        self.submit(
            RecordKey::User(user.id.clone()),
            PendingWrite::PutUser(Box::new(user.clone())),
        );
    }

    pub fn remove_room(&self, code: &str) {
        self.submit(RecordKey::Room(code.to_string()), PendingWrite::RemoveRoom);
    }

    /// Writes not yet picked up by the writer task.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Resolves once every write submitted before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.flush_tx.send(done_tx).is_err() {
            log::error!("Persister is shut down; nothing to flush");
            return;
        }
        let _ = done_rx.await;
    }

    fn submit(&self, key: RecordKey, write: PendingWrite) {
        if let Some(replaced) = self.pending.insert(key.clone(), write) {
            log::trace!("Coalesced pending write for {:?} ({})", key, replaced.label());
        }
        self.wake.notify_one();
    }
}

impl PendingWrite {
    fn label(&self) -> &'static str {
        match self {
            PendingWrite::PutRoom(_) => "put room",
            PendingWrite::PutUser(_) => "put user",
            PendingWrite::RemoveRoom => "remove room",
        }
    }
}

/// Takes everything pending and applies it on the blocking pool.
async fn drain(store: &Arc<dyn EntityStore>, pending: &DashMap<RecordKey, PendingWrite>) {
    let keys: Vec<RecordKey> = pending.iter().map(|entry| entry.key().clone()).collect();
    let batch: Vec<(RecordKey, PendingWrite)> =
        keys.iter().filter_map(|key| pending.remove(key)).collect();
    if batch.is_empty() {
        return;
    }

    let store = store.clone();
    let result = tokio::task::spawn_blocking(move || {
        for (key, write) in batch {
            apply(store.as_ref(), key, write);
        }
    })
    .await;
    if let Err(e) = result {
        log::error!("Persistence task panicked: {}", e);
    }
}

fn apply(store: &dyn EntityStore, key: RecordKey, write: PendingWrite) {
    let result = match (&key, &write) {
        (_, PendingWrite::PutRoom(room)) => store.put_room(room),
        (_, PendingWrite::PutUser(user)) => store.put_user(user),
        (RecordKey::Room(code), PendingWrite::RemoveRoom) => store.remove_room(code),
        (RecordKey::User(id), PendingWrite::RemoveRoom) => {
            log::error!("Room removal queued under user key {}", id);
            Ok(())
        }
    };

    if let Err(e) = result {
        match key {
            RecordKey::Room(code) => log::error!("Error writing room {}: {}", code, e),
            RecordKey::User(id) => log::error!("Error writing user {}: {}", id, e),
        }
    }
}
