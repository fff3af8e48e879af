mod room_ws;
mod rooms;
mod users;

pub use room_ws::*;
pub use rooms::*;
pub use users::*;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/join", post(join_room))
        .route("/api/rooms/:code", get(get_room))
        .route("/api/rooms/:code/settings", put(update_settings))
        .route("/api/rooms/:code/results", get(room_results))
        .route("/api/rooms/:code/finish", post(finish_room))
        .route("/api/users/me", get(current_user))
        .route("/api/ws", get(room_ws_handler))
        .with_state(state)
}
