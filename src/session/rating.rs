use chrono::Utc;

use super::SessionRegistry;
use crate::error::RoomError;
use crate::models::rooms::{MAX_RATING, MIN_RATING};
use crate::models::users::round_to_cents;
use crate::models::{Rating, RatingRecord, RankingEntry, Room, RoomResults, RoomStatus};
use crate::room_sync::{RoomEvent, ServerMessage};

/// Ranks every user with a saved drawing by the mean of the ratings they
/// received, best first. Ties go to the earlier drawing, then the lower user
/// id, so the order never depends on map iteration.
pub fn compute_rankings(
    room: &Room,
    profile: impl Fn(&str) -> (String, Option<String>),
    with_drawings: bool,
) -> Vec<RankingEntry> {
    let mut ranked: Vec<_> = room
        .drawings
        .iter()
        .map(|(user_id, drawing)| {
            let received = room.ratings.get(user_id).map(Vec::as_slice).unwrap_or_default();
            let average_rating = if received.is_empty() {
                0.0
            } else {
                let sum: i64 = received.iter().map(|r| r.rating).sum();
                round_to_cents(sum as f64 / received.len() as f64)
            };
            let (user_name, user_avatar) = profile(user_id);

            let entry = RankingEntry {
                user_id: user_id.clone(),
                user_name,
                user_avatar,
                average_rating,
                total_ratings: received.len(),
                drawing: with_drawings.then(|| drawing.clone()),
            };
            (drawing.timestamp, entry)
        })
        .collect();

    ranked.sort_by(|(a_at, a), (b_at, b)| {
        b.average_rating
            .total_cmp(&a.average_rating)
            .then_with(|| a_at.cmp(b_at))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    ranked.into_iter().map(|(_, entry)| entry).collect()
}

impl SessionRegistry {
    /// Records one participant's rating of another's drawing and returns the
    /// refreshed ranking, which is also pushed to the whole room.
    pub async fn submit_rating(
        &self,
        code: &str,
        rater_id: &str,
        target_id: &str,
        rating: i64,
    ) -> Result<Vec<RankingEntry>, RoomError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(RoomError::InvalidRating(rating));
        }

        let handle = self.handle(code)?;
        self.load_user(target_id).await;

        let mut room = handle.room.lock().await;
        if !room.is_participant(rater_id) {
            return Err(RoomError::Unauthorized);
        }
        if room.status != RoomStatus::Completed {
            return Err(RoomError::InvalidState(
                "ratings open once the round is over".to_string(),
            ));
        }
        if !room.settings.voting_enabled {
            return Err(RoomError::InvalidState(
                "voting is disabled for this room".to_string(),
            ));
        }
        if rater_id == target_id {
            return Err(RoomError::SelfRating);
        }
        if !room.is_participant(target_id) {
            return Err(RoomError::UserNotFound);
        }
        if room.has_rated(rater_id, target_id) {
            return Err(RoomError::DuplicateRating);
        }

        let now = Utc::now();
        room.ratings.entry(target_id.to_string()).or_default().push(Rating {
            rater_id: rater_id.to_string(),
            rating,
            timestamp: now,
        });
        self.persist_room(&room);

        let record = RatingRecord {
            room_code: room.code.clone(),
            rating,
            timestamp: now,
        };
        if !self.update_user(target_id, |user| user.record_rating(record)) {
            log::debug!("No profile for {}, skipping lifetime rating totals", target_id);
        }

        let rankings = compute_rankings(&room, |id| self.profile(id), false);
        handle.channel.publish(RoomEvent::to_all(ServerMessage::RankingsUpdated {
            rankings: rankings.clone(),
        }));
        log::info!("{} rated {} in room {}: {}", rater_id, target_id, room.code, rating);
        Ok(rankings)
    }

    /// Final standings of a completed room, drawings attached.
    pub async fn results(&self, code: &str, user_id: &str) -> Result<RoomResults, RoomError> {
        let handle = self.handle(code)?;
        let room = handle.room.lock().await;
        if !room.is_participant(user_id) {
            return Err(RoomError::Unauthorized);
        }
        if room.status != RoomStatus::Completed {
            return Err(RoomError::InvalidState("the round is not over yet".to_string()));
        }

        let rankings = compute_rankings(&room, |id| self.profile(id), true);
        Ok(RoomResults::from_rankings(rankings))
    }
}
