use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::RoomError;
use crate::models::{
    CreateRoomView, JoinRoomView, RoomEnvelope, RoomResults, SettingsEnvelope, UpdateSettingsView,
};
use crate::session::SessionRegistry;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

pub async fn create_room(
    State(registry): State<Arc<SessionRegistry>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateRoomView>,
) -> Result<(StatusCode, Json<RoomEnvelope>), RoomError> {
    let room = registry.create(&user_id, body.settings).await?;
    Ok((StatusCode::CREATED, Json(RoomEnvelope { room: room.summary() })))
}

pub async fn join_room(
    State(registry): State<Arc<SessionRegistry>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<JoinRoomView>,
) -> Result<Json<RoomEnvelope>, RoomError> {
    let room = registry.add_participant(&body.code, &user_id).await?;
    Ok(Json(RoomEnvelope { room: room.summary() }))
}

pub async fn get_room(
    State(registry): State<Arc<SessionRegistry>>,
    AuthUser(user_id): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<RoomEnvelope>, RoomError> {
    let room = registry.get_for_participant(&code, &user_id).await?;
    Ok(Json(RoomEnvelope { room: room.summary() }))
}

pub async fn update_settings(
    State(registry): State<Arc<SessionRegistry>>,
    AuthUser(user_id): AuthUser,
    Path(code): Path<String>,
    Json(body): Json<UpdateSettingsView>,
) -> Result<Json<SettingsEnvelope>, RoomError> {
    let settings = registry.update_settings(&code, &user_id, &body.settings).await?;
    Ok(Json(SettingsEnvelope { settings }))
}

pub async fn room_results(
    State(registry): State<Arc<SessionRegistry>>,
    AuthUser(user_id): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<RoomResults>, RoomError> {
    Ok(Json(registry.results(&code, &user_id).await?))
}

pub async fn finish_room(
    State(registry): State<Arc<SessionRegistry>>,
    AuthUser(user_id): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<RoomEnvelope>, RoomError> {
    registry.finish_room(&code, &user_id).await?;
    let room = registry.get(&code).await?;
    Ok(Json(RoomEnvelope { room: room.summary() }))
}
