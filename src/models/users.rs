use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DRAWING_HISTORY_LIMIT: usize = 50;
pub const UNKNOWN_USER_NAME: &str = "Unknown";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrawingRecord {
    pub image_data: String,
    pub room_code: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingRecord {
    pub room_code: String,
    pub rating: i64,
    pub timestamp: DateTime<Utc>,
}

/// Account record owned by the auth service; this crate only appends history
/// and rating totals to it.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub drawings: Vec<DrawingRecord>,
    #[serde(default)]
    pub ratings: Vec<RatingRecord>,
    #[serde(default)]
    pub total_rating: i64,
    #[serde(default)]
    pub rating_count: u64,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            avatar: None,
            drawings: Vec::new(),
            ratings: Vec::new(),
            total_rating: 0,
            rating_count: 0,
            created_at: Some(Utc::now()),
        }
    }

    pub fn push_drawing(&mut self, record: DrawingRecord) {
        self.drawings.push(record);
        if self.drawings.len() > DRAWING_HISTORY_LIMIT {
            let overflow = self.drawings.len() - DRAWING_HISTORY_LIMIT;
            self.drawings.drain(0..overflow);
        }
    }

    pub fn record_rating(&mut self, record: RatingRecord) {
        self.total_rating += record.rating;
        self.rating_count += 1;
        self.ratings.push(record);
    }

    pub fn average_rating(&self) -> f64 {
        if self.rating_count == 0 {
            0.0
        } else {
            round_to_cents(self.total_rating as f64 / self.rating_count as f64)
        }
    }
}

pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub average_rating: f64,
    pub rating_count: u64,
    pub drawings: Vec<DrawingRecord>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        UserView {
            average_rating: user.average_rating(),
            id: user.id,
            name: user.name,
            avatar: user.avatar,
            rating_count: user.rating_count,
            drawings: user.drawings,
        }
    }
}
