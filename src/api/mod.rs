pub mod auth;
pub mod checkin;
pub mod dashboard;
pub mod events;
pub mod handlers;
pub mod lineup;
pub mod orders;
pub mod upload;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

pub use auth::{ensure_merchant, hash_password};
pub use handlers::{health, AppState};

/// Multipart framing and form fields on top of the image itself
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the full router: JSON API, upload routes and the public `/uploads` tree
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health))
        // Session
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        // File routes
        .route("/api/upload", post(upload::upload_file).get(upload::download_file))
        .route("/api/delete-file", post(upload::delete_file))
        .route("/uploads/*path", get(upload::public_file))
        // Events and their asset slots
        .route("/api/events", get(events::list_events).post(events::create_event))
        .route("/api/events/:id", get(events::get_event).put(events::update_event))
        .route(
            "/api/events/:id/assets/:slot",
            get(events::get_asset)
                .put(events::put_asset)
                .delete(events::delete_asset),
        )
        .route("/api/events/:id/template", post(events::apply_template))
        .route("/api/templates", get(events::list_templates))
        .route("/api/merchants/me", put(auth::update_merchant))
        .route("/api/merchants/me/logo", put(events::put_logo))
        // Orders
        .route("/api/events/:id/orders", get(orders::list_orders))
        .route("/api/orders/:id", get(orders::get_order))
        // Lineup
        .route(
            "/api/events/:id/lineup",
            get(lineup::get_lineup).post(lineup::create_schedule),
        )
        .route(
            "/api/lineup/:schedule_id",
            put(lineup::update_schedule).delete(lineup::delete_schedule),
        )
        // Check-in and dashboard
        .route("/api/checkin", post(checkin::checkin))
        .route("/api/events/:id/checkins", get(checkin::list_checkins))
        .route("/api/events/:id/dashboard", get(dashboard::get_dashboard))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}
