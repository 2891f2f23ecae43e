//! HTTP API
//!
//! `/health` and `/events` at the root; catalog, search and session endpoints under
//! `/api/v1`.

pub mod handlers;
pub mod sse;

use crate::catalog::TieredCatalog;
use crate::deck::DeckStore;
use crate::search::SearchIndex;
use crate::session::SwipeSession;
use axum::{
    routing::{get, post, put},
    Router,
};
use namedeck_common::events::EventBus;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub catalog: Arc<TieredCatalog>,
    pub search: Arc<SearchIndex>,
    pub decks: Arc<DeckStore>,
    pub session: Arc<SwipeSession>,
    pub events: Arc<EventBus>,
}

/// Build the application router
pub fn create_router(ctx: AppContext) -> Router {
    let api = Router::new()
        // Catalog
        .route("/catalog/status", get(handlers::catalog_status))
        .route("/catalog/entries/:id", get(handlers::get_entry))
        .route("/catalog/entries", post(handlers::resolve_entries))
        .route("/catalog/preload", post(handlers::preload_chunks))
        .route("/catalog/instant", get(handlers::instant_entries))
        .route("/catalog/trim", post(handlers::trim_catalog))
        .route("/catalog/entries/:id/annotations", put(handlers::annotate_entry))
        // Search
        .route("/search", get(handlers::search))
        .route("/search/:kind/:key", get(handlers::search_bucket))
        // Decks
        .route("/decks", get(handlers::list_decks))
        // Swipe session
        .route("/session/initialize", post(handlers::initialize_session))
        .route("/session/resume", post(handlers::resume_session))
        .route("/session/card", get(handlers::current_card))
        .route("/session/upcoming", get(handlers::upcoming_cards))
        .route("/session/decide", post(handlers::decide))
        .route("/session/undo", post(handlers::undo))
        .route("/session/skip", post(handlers::skip))
        .route("/session/reset", post(handlers::reset_session))
        .route("/session/stats", get(handlers::session_stats))
        .route("/session/liked", get(handlers::liked_entries))
        .route("/session/export", get(handlers::export_liked))
        .route("/session/import", post(handlers::import_liked));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/events", get(sse::event_stream))
        .nest("/api/v1", api)
        .with_state(ctx)
        // Enable CORS for browser clients
        .layer(CorsLayer::permissive())
}
