pub mod results;
pub mod rooms;
pub mod users;

pub use results::{RankingEntry, RoomResults};
pub use rooms::{
    CreateRoomView, Drawing, JoinRoomView, Rating, Room, RoomEnvelope, RoomSettings,
    RoomStatus, RoomSummary, SettingsEnvelope, SettingsPatch, UpdateSettingsView,
};
pub use users::{DrawingRecord, RatingRecord, User, UserView};
