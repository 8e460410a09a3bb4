pub mod cache;
pub mod config;
pub mod connector;
pub mod endpoints;
pub mod error;
pub mod meter;

use std::{path::Path, sync::Arc};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::endpoints::{get_data, healthcheck, prediction, status, Relay};

/// Build the relay's HTTP router.
///
/// Prediction bodies larger than [`Relay::max_payload`] are refused with
/// `413`. When `static_dir` is given its files are served for every path the relay
/// does not handle itself.
pub fn build_router(relay: Arc<Relay>, static_dir: Option<&Path>) -> Router {
    let body_limit = DefaultBodyLimit::max(relay.max_payload());
    let mut app = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/status", get(status))
        .route("/get-data", get(get_data))
        .route("/prediction", post(prediction).layer(body_limit));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(Extension(relay)).layer(CorsLayer::permissive())
}
