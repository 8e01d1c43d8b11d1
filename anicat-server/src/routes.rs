use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{AppState, handlers};

/// Addon routes. Clients call these from arbitrary origins, so CORS is
/// fully permissive.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/manifest.json", get(handlers::manifest_handler))
        .route("/catalog/{kind}/{catalog}", get(handlers::catalog_handler))
        .route(
            "/catalog/{kind}/{catalog}/{extra}",
            get(handlers::catalog_extra_handler),
        )
        .route("/meta/{kind}/{id}", get(handlers::meta_handler))
        .route("/health", get(handlers::health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
