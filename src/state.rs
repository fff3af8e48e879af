use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::session::SessionRegistry;

#[derive(FromRef, Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub auth: AuthConfig,
}
