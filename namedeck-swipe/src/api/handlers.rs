//! HTTP request handlers
//!
//! Entries are returned with their annotations merged in. Session endpoints answer with
//! the session's stats alongside the result so clients can redraw progress without a
//! second request.

use crate::api::AppContext;
use crate::catalog::annotations::Annotation;
use crate::catalog::chunk_store::ChunkOutcome;
use crate::catalog::{CatalogStatus, Resolution};
use crate::error::Error;
use crate::search::BucketKind;
use crate::session::{Decision, LikedExport, SessionState, SessionStats};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use namedeck_common::{CatalogEntry, DeckType, SwipeDirection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<StatusResponse>)>;

const DEFAULT_SEARCH_LIMIT: usize = 20;
const MAX_SEARCH_LIMIT: usize = 200;
const MAX_BATCH_IDS: usize = 1000;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    ids: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PreloadRequest {
    /// Chunk names; every chunk when absent
    #[serde(default)]
    chunks: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ChunkLoadResult {
    chunk: String,
    loaded: bool,
    fetched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreloadResponse {
    chunks: Vec<ChunkLoadResult>,
    status: CatalogStatus,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TrimResponse {
    removed: usize,
    status: CatalogStatus,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    query: String,
    degraded: bool,
    results: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize)]
pub struct BucketResponse {
    kind: String,
    key: String,
    degraded: bool,
    /// Every id in the bucket
    ids: Vec<u32>,
    /// The first `limit` ids, resolved
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize)]
pub struct DeckInfo {
    deck_type: DeckType,
    len: usize,
}

#[derive(Debug, Deserialize)]
pub struct InitializeRequest {
    #[serde(default)]
    deck_type: DeckType,
}

#[derive(Debug, Serialize)]
pub struct CardResponse {
    state: SessionState,
    card: Option<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    n: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct UpcomingResponse {
    cards: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    direction: SwipeDirection,
    /// Card to decide; the current card when absent
    #[serde(default)]
    id: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DecideResponse {
    /// `None` when nothing was decided
    decision: Option<Decision>,
    next: Option<CatalogEntry>,
    stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct UndoResponse {
    restored: Option<CatalogEntry>,
    stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct SkipResponse {
    /// New current card; `None` when nothing was skipped
    card: Option<CatalogEntry>,
    stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct LikedResponse {
    liked: Vec<CatalogEntry>,
    super_liked: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    imported: usize,
    stats: SessionStats,
}

fn error_response(e: Error) -> (StatusCode, Json<StatusResponse>) {
    let status = match &e {
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::Common(namedeck_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidState(_) | Error::Session(_) => StatusCode::CONFLICT,
        Error::Deck(_) | Error::Fetch(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn annotated(ctx: &AppContext, entries: &[Arc<CatalogEntry>]) -> Vec<CatalogEntry> {
    entries.iter().map(|entry| ctx.catalog.annotated(entry)).collect()
}

fn annotated_one(ctx: &AppContext, entry: Option<Arc<CatalogEntry>>) -> Option<CatalogEntry> {
    entry.map(|entry| ctx.catalog.annotated(&entry))
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "namedeck_swipe".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Catalog Endpoints
// ============================================================================

/// GET /api/v1/catalog/status
pub async fn catalog_status(State(ctx): State<AppContext>) -> Json<CatalogStatus> {
    Json(ctx.catalog.status())
}

/// GET /api/v1/catalog/entries/:id
pub async fn get_entry(State(ctx): State<AppContext>, Path(id): Path<u32>) -> ApiResult<CatalogEntry> {
    match ctx.catalog.resolve_outcome(id).await {
        Resolution::Loaded(entry) => Ok(Json(ctx.catalog.annotated(&entry))),
        Resolution::NotFound => Err(error_response(Error::NotFound(format!("No entry with id {}", id)))),
        Resolution::LoadFailed(e) => Err(error_response(Error::Fetch(e.to_string()))),
    }
}

/// POST /api/v1/catalog/entries - resolve a batch of ids, keeping their order
pub async fn resolve_entries(
    State(ctx): State<AppContext>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<EntriesResponse> {
    if request.ids.len() > MAX_BATCH_IDS {
        return Err(error_response(Error::BadRequest(format!(
            "At most {} ids per request",
            MAX_BATCH_IDS
        ))));
    }
    let entries = ctx.catalog.resolve_many(&request.ids).await;
    Ok(Json(EntriesResponse {
        entries: annotated(&ctx, &entries),
    }))
}

/// POST /api/v1/catalog/preload - load named chunks, or all of them
pub async fn preload_chunks(
    State(ctx): State<AppContext>,
    Json(request): Json<PreloadRequest>,
) -> ApiResult<PreloadResponse> {
    let results = match request.chunks {
        Some(chunks) => {
            if let Some(unknown) = chunks.iter().find(|c| !ctx.catalog.partitions().contains_chunk(c)) {
                return Err(error_response(Error::BadRequest(format!("Unknown chunk '{}'", unknown))));
            }
            ctx.catalog.load_chunks(&chunks).await
        }
        None => ctx.catalog.preload_all().await,
    };

    let chunks = results
        .into_iter()
        .map(|(chunk, result)| match result {
            Ok(load) => ChunkLoadResult {
                chunk,
                loaded: true,
                fetched: load.outcome == ChunkOutcome::Fetched,
                error: None,
            },
            Err(e) => ChunkLoadResult {
                chunk,
                loaded: false,
                fetched: false,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(Json(PreloadResponse {
        chunks,
        status: ctx.catalog.status(),
    }))
}

/// GET /api/v1/catalog/instant?limit= - entries available without waiting on a load
pub async fn instant_entries(
    State(ctx): State<AppContext>,
    Query(query): Query<LimitQuery>,
) -> Json<EntriesResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_SEARCH_LIMIT);
    let entries = ctx.catalog.instant_entries(limit);
    Json(EntriesResponse {
        entries: annotated(&ctx, &entries),
    })
}

/// POST /api/v1/catalog/trim - shrink the resident cache back to the core chunk
pub async fn trim_catalog(State(ctx): State<AppContext>) -> Json<TrimResponse> {
    let removed = ctx.catalog.trim_to_core();
    info!(removed, "Trimmed catalog to core");
    Json(TrimResponse {
        removed,
        status: ctx.catalog.status(),
    })
}

/// PUT /api/v1/catalog/entries/:id/annotations - merge annotations for an entry
pub async fn annotate_entry(
    State(ctx): State<AppContext>,
    Path(id): Path<u32>,
    Json(annotation): Json<Annotation>,
) -> ApiResult<CatalogEntry> {
    let entry = match ctx.catalog.resolve_outcome(id).await {
        Resolution::Loaded(entry) => entry,
        Resolution::NotFound => return Err(error_response(Error::NotFound(format!("No entry with id {}", id)))),
        Resolution::LoadFailed(e) => return Err(error_response(Error::Fetch(e.to_string()))),
    };
    if ctx.catalog.annotate(id, &annotation) {
        info!(id, "Entry annotated");
    }
    Ok(Json(ctx.catalog.annotated(&entry)))
}

// ============================================================================
// Search Endpoints
// ============================================================================

/// GET /api/v1/search?q=&limit=
pub async fn search(State(ctx): State<AppContext>, Query(query): Query<SearchQuery>) -> Json<SearchResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_SEARCH_LIMIT);
    let results = ctx.search.search(&query.q, limit).await;

    Json(SearchResponse {
        degraded: ctx.search.is_degraded(),
        results: annotated(&ctx, &results),
        query: query.q,
    })
}

/// GET /api/v1/search/:kind/:key
pub async fn search_bucket(
    State(ctx): State<AppContext>,
    Path((kind, key)): Path<(String, String)>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<BucketResponse> {
    let bucket: BucketKind = kind.parse().map_err(error_response)?;
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_SEARCH_LIMIT);

    let ids = ctx.search.lookup_bucket(bucket, &key).await;
    let head: Vec<u32> = ids.iter().copied().take(limit).collect();
    let entries = ctx.catalog.resolve_many(&head).await;

    Ok(Json(BucketResponse {
        kind,
        key,
        degraded: ctx.search.is_degraded(),
        ids,
        entries: annotated(&ctx, &entries),
    }))
}

// ============================================================================
// Deck Endpoints
// ============================================================================

/// GET /api/v1/decks
pub async fn list_decks(State(ctx): State<AppContext>) -> ApiResult<Vec<DeckInfo>> {
    let decks = ctx.decks.available().await.map_err(error_response)?;
    Ok(Json(
        decks
            .into_iter()
            .map(|(deck_type, len)| DeckInfo { deck_type, len })
            .collect(),
    ))
}

// ============================================================================
// Session Endpoints
// ============================================================================

/// POST /api/v1/session/initialize
pub async fn initialize_session(
    State(ctx): State<AppContext>,
    Json(request): Json<InitializeRequest>,
) -> ApiResult<SessionStats> {
    info!(deck_type = %request.deck_type, "Initializing swipe session");
    let stats = ctx.session.initialize(request.deck_type).await.map_err(error_response)?;
    Ok(Json(stats))
}

/// POST /api/v1/session/resume
pub async fn resume_session(State(ctx): State<AppContext>) -> ApiResult<SessionStats> {
    let stats = ctx.session.resume().await.map_err(error_response)?;
    Ok(Json(stats))
}

/// GET /api/v1/session/card
pub async fn current_card(State(ctx): State<AppContext>) -> Json<CardResponse> {
    let card = annotated_one(&ctx, ctx.session.current_card());
    Json(CardResponse {
        state: ctx.session.state(),
        card,
    })
}

/// GET /api/v1/session/upcoming?n=
pub async fn upcoming_cards(
    State(ctx): State<AppContext>,
    Query(query): Query<UpcomingQuery>,
) -> Json<UpcomingResponse> {
    let n = query.n.unwrap_or(ctx.session.settings().window_size);
    let cards = ctx.session.upcoming(n);
    Json(UpcomingResponse {
        cards: annotated(&ctx, &cards),
    })
}

/// POST /api/v1/session/decide
pub async fn decide(State(ctx): State<AppContext>, Json(request): Json<DecideRequest>) -> Json<DecideResponse> {
    let decision = ctx.session.decide(request.direction, request.id);
    Json(DecideResponse {
        decision,
        next: annotated_one(&ctx, ctx.session.current_card()),
        stats: ctx.session.stats(),
    })
}

/// POST /api/v1/session/undo
pub async fn undo(State(ctx): State<AppContext>) -> Json<UndoResponse> {
    let restored = annotated_one(&ctx, ctx.session.undo());
    Json(UndoResponse {
        restored,
        stats: ctx.session.stats(),
    })
}

/// POST /api/v1/session/skip
pub async fn skip(State(ctx): State<AppContext>) -> Json<SkipResponse> {
    let card = annotated_one(&ctx, ctx.session.skip());
    Json(SkipResponse {
        card,
        stats: ctx.session.stats(),
    })
}

/// POST /api/v1/session/reset
pub async fn reset_session(State(ctx): State<AppContext>) -> ApiResult<SessionStats> {
    let stats = ctx.session.reset().await.map_err(error_response)?;
    Ok(Json(stats))
}

/// GET /api/v1/session/stats
pub async fn session_stats(State(ctx): State<AppContext>) -> Json<SessionStats> {
    Json(ctx.session.stats())
}

/// GET /api/v1/session/liked
pub async fn liked_entries(State(ctx): State<AppContext>) -> Json<LikedResponse> {
    let liked = ctx.session.liked_entries().await;
    let super_liked = ctx.session.super_liked_entries().await;
    Json(LikedResponse {
        liked: annotated(&ctx, &liked),
        super_liked: annotated(&ctx, &super_liked),
    })
}

/// GET /api/v1/session/export
pub async fn export_liked(State(ctx): State<AppContext>) -> Json<LikedExport> {
    Json(ctx.session.export_liked())
}

/// POST /api/v1/session/import - body is a previous export document
pub async fn import_liked(State(ctx): State<AppContext>, body: String) -> ApiResult<ImportResponse> {
    let imported = ctx.session.import_liked(&body).map_err(error_response)?;
    Ok(Json(ImportResponse {
        imported,
        stats: ctx.session.stats(),
    }))
}
