use axum::{extract::State, Json};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::RoomError;
use crate::models::UserView;
use crate::session::SessionRegistry;

pub async fn current_user(
    State(registry): State<Arc<SessionRegistry>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserView>, RoomError> {
    let user = registry
        .load_user(&user_id)
        .await
        .ok_or(RoomError::UserNotFound)?;
    Ok(Json(UserView::from(user)))
}
