pub mod rest;
pub mod state;

use axum::{extract::DefaultBodyLimit, routing::post, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub use rest::upload_profile_image;
pub use state::AppState;

/// Room for multipart boundaries and the `userId` part on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Builds the service router: the upload endpoint plus the static `/assets` tree.
pub fn app(app_state: Arc<AppState>) -> Router {
    let body_limit = app_state
        .config
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);
    let assets = ServeDir::new(&app_state.config.assets_dir);

    Router::new()
        .route("/api/upload-profile-image", post(upload_profile_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
        .nest_service("/assets", assets)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
