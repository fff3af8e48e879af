use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::SessionRegistry;
use crate::models::RoomStatus;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Completed rooms dropped for being past retention.
    pub removed: Vec<String>,
    /// Rooms still waiting or active long after creation. Never removed.
    pub stale: Vec<String>,
}

impl SessionRegistry {
    /// One retention pass. Only completed rooms age out; open rooms that have
    /// lingered are reported so they show up in the logs.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for code in self.codes() {
            let Ok(handle) = self.handle(&code) else {
                continue;
            };
            let room = handle.room.lock().await;
            match (room.status, room.completed_at) {
                (RoomStatus::Completed, Some(completed_at)) => {
                    if now - completed_at < self.config.retention {
                        continue;
                    }
                    // remove under the lock so no operation sees a half-dropped room
                    self.rooms.remove(&code);
                    self.persister.remove_room(&code);
                    report.removed.push(code);
                }
                (RoomStatus::Completed, None) => {}
                _ => {
                    if now - room.created_at >= self.config.stale_after {
                        report.stale.push(code);
                    }
                }
            }
        }

        if !report.removed.is_empty() {
            log::info!("Swept {} expired rooms: {:?}", report.removed.len(), report.removed);
        }
        if !report.stale.is_empty() {
            log::warn!(
                "{} rooms never completed and will not be swept: {:?}",
                report.stale.len(),
                report.stale
            );
        }
        report
    }
}

/// Runs `sweep` every `every` until the token is cancelled.
pub fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    every: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    log::info!("Room sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    registry.sweep(Utc::now()).await;
                }
            }
        }
    })
}
