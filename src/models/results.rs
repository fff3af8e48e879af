use serde::{Deserialize, Serialize};

use super::rooms::Drawing;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub user_id: String,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub average_rating: f64,
    pub total_ratings: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub drawing: Option<Drawing>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoomResults {
    pub rankings: Vec<RankingEntry>,
    pub top_three: Vec<RankingEntry>,
    pub winner: Option<RankingEntry>,
}

impl RoomResults {
    pub fn from_rankings(rankings: Vec<RankingEntry>) -> Self {
        let top_three = rankings.iter().take(3).cloned().collect();
        let winner = rankings.first().cloned();
        Self {
            rankings,
            top_three,
            winner,
        }
    }
}
