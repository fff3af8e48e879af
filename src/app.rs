use axum::Router;
use http::{header, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::router;
use crate::state::AppState;

/// CORS for the browser client. Any origin when `client_url` is unset.
pub fn cors_layer(client_url: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match client_url.map(HeaderValue::from_str) {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(e)) => {
            log::warn!("CLIENT_URL is not a valid origin ({}), allowing any", e);
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    }
}

pub fn build_app(state: AppState, client_url: Option<&str>) -> Router {
    router(state)
        .layer(cors_layer(client_url))
        .layer(TraceLayer::new_for_http())
}
