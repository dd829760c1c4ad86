//! HTTP surface for Rusty Cache.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /search` – Run a keyword, vector, or hybrid search through the shared cache. Requests
//!   are rate limited per `x-client-id` header before they reach the dispatcher.
//! - `GET /sync/status` – Current or most recent synchronization run.
//! - `POST /sync` – Start a run in the background (`202`), or `409` when one is active.
//! - `POST /sync/pause`, `POST /sync/resume`, `POST /sync/stop`, `POST /sync/reset` – Run control.
//! - `GET /cache/stats` – Cache hit, miss, and eviction counters.
//! - `GET /metrics` – Search counters per mode.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Every failure renders as `{ "code": ..., "message": ... }`; search failures carry their
//! `SEARCH_xxx` code verbatim.

use crate::cache::{CacheStats, CacheStore, RateLimiter};
use crate::error::{ErrorCode, SearchError};
use crate::metrics::MetricsSnapshot;
use crate::search::{SearchDispatcher, SearchHit, SearchMode, SearchQuery};
use crate::sync::{SyncCoordinator, SyncError, SyncStatus};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Header identifying the caller for rate limiting.
pub const CLIENT_ID_HEADER: &str = "x-client-id";
const ANONYMOUS_CLIENT: &str = "anonymous";

/// Shared handles used by the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cache-first search entry point.
    pub dispatcher: Arc<SearchDispatcher>,
    /// Synchronization run driver.
    pub coordinator: Arc<SyncCoordinator>,
    /// Cache shared by the dispatcher and the coordinator.
    pub cache: Arc<dyn CacheStore>,
    /// Admission control for search requests.
    pub limiter: Arc<dyn RateLimiter>,
    /// Limit applied when a search request does not specify one.
    pub default_limit: usize,
}

/// Build the HTTP router exposing search and sync control.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/sync", post(start_sync))
        .route("/sync/status", get(sync_status))
        .route("/sync/pause", post(pause_sync))
        .route("/sync/resume", post(resume_sync))
        .route("/sync/stop", post(stop_sync))
        .route("/sync/reset", post(reset_sync))
        .route("/cache/stats", get(cache_stats))
        .route("/metrics", get(get_metrics))
        .route("/commands", get(get_commands))
        .with_state(state)
}

/// Request body for `POST /search`.
#[derive(Deserialize)]
struct SearchRequest {
    /// Query text.
    query: String,
    /// `keyword` (default), `vector`, or `hybrid`.
    #[serde(default)]
    mode: Option<String>,
    /// Optional result limit (defaults to `SEARCH_DEFAULT_LIMIT`).
    #[serde(default)]
    limit: Option<usize>,
    /// Optional minimum score.
    #[serde(default)]
    min_score: Option<f32>,
}

/// Success response for `POST /search`.
#[derive(Serialize)]
struct SearchResponse {
    mode: SearchMode,
    total: usize,
    hits: Vec<SearchHit>,
}

async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let client = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(ANONYMOUS_CLIENT);
    if !state.limiter.try_acquire(client) {
        tracing::warn!(client, "Search request rate limited");
        return Err(AppError::RateLimited);
    }

    let mode = match request.mode.as_deref() {
        None => SearchMode::Keyword,
        Some(raw) => raw.parse().map_err(|_| {
            SearchError::invalid_request(format!(
                "unknown search mode `{raw}`; expected keyword, vector, or hybrid"
            ))
        })?,
    };
    let mut query = SearchQuery::new(request.query)
        .with_limit(request.limit.unwrap_or(state.default_limit));
    if let Some(min_score) = request.min_score {
        query = query.with_min_score(min_score);
    }

    let results = state.dispatcher.search(&query, mode).await?;
    tracing::info!(
        client,
        mode = %results.mode,
        hits = results.total(),
        "Search request completed"
    );
    Ok(Json(SearchResponse {
        mode: results.mode,
        total: results.total(),
        hits: results.hits,
    }))
}

async fn start_sync(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    // The handle is dropped; the run reports through the status tracker.
    let _ = state.coordinator.spawn_run()?;
    tracing::info!("Sync run accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "synchronization run started" })),
    ))
}

async fn sync_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.coordinator.status())
}

async fn pause_sync(State(state): State<AppState>) -> Json<SyncStatus> {
    state.coordinator.pause();
    Json(state.coordinator.status())
}

async fn resume_sync(State(state): State<AppState>) -> Json<SyncStatus> {
    state.coordinator.resume();
    Json(state.coordinator.status())
}

async fn stop_sync(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stopped = state.coordinator.stop();
    Json(json!({ "stopped": stopped }))
}

async fn reset_sync(State(state): State<AppState>) -> Result<Json<SyncStatus>, AppError> {
    state.coordinator.reset()?;
    Ok(Json(state.coordinator.status()))
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.dispatcher.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    let control = |name, path, description| CommandDescriptor {
        name,
        method: "POST",
        path,
        description,
        request_example: None,
    };
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "search",
                method: "POST",
                path: "/search",
                description: "Search synced documents; identical queries are answered from the cache. Errors carry SEARCH_001..SEARCH_004 or SEARCH_999 codes.",
                request_example: Some(json!({
                    "query": "rotate api keys",
                    "mode": "hybrid",
                    "limit": 5,
                    "min_score": 0.2
                })),
            },
            CommandDescriptor {
                name: "sync_status",
                method: "GET",
                path: "/sync/status",
                description: "Return the state, progress, and counters of the current or last synchronization run.",
                request_example: None,
            },
            control("sync", "/sync", "Start a synchronization run in the background."),
            control("sync_pause", "/sync/pause", "Pause dispatch of new items; in-flight items complete."),
            control("sync_resume", "/sync/resume", "Resume dispatch of items."),
            control("sync_stop", "/sync/stop", "Cancel the active synchronization run."),
            control("sync_reset", "/sync/reset", "Return a finished run's status to IDLE."),
            CommandDescriptor {
                name: "cache_stats",
                method: "GET",
                path: "/cache/stats",
                description: "Return cache hit, miss, and eviction counters.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return search counters per mode.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    Search(SearchError),
    Sync(SyncError),
    RateLimited,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Search(error) => {
                let status = match error.code() {
                    ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
                    ErrorCode::SearchFailed => StatusCode::BAD_GATEWAY,
                    ErrorCode::VectorSearchNotImplemented
                    | ErrorCode::HybridSearchNotImplemented => StatusCode::NOT_IMPLEMENTED,
                    ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.code().code(), error.message().to_string())
            }
            AppError::Sync(error) => {
                let (status, code) = match &error {
                    SyncError::AlreadyRunning => (StatusCode::CONFLICT, "SYNC_ALREADY_RUNNING"),
                    SyncError::InvalidState { .. } => (StatusCode::CONFLICT, "SYNC_INVALID_STATE"),
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "SYNC_FAILED"),
                };
                (status, code, error.to_string())
            }
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many search requests; retry after the current window".to_string(),
            ),
        };
        (status, Json(json!({ "code": code, "message": message }))).into_response()
    }
}

impl From<SearchError> for AppError {
    fn from(inner: SearchError) -> Self {
        Self::Search(inner)
    }
}

impl From<SyncError> for AppError {
    fn from(inner: SyncError) -> Self {
        Self::Sync(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppState, CLIENT_ID_HEADER, create_router, get_commands};
    use crate::cache::{CacheGeneration, CacheStore, MemoryCache, WindowRateLimiter};
    use crate::embedding::HashingVectorizer;
    use crate::search::{
        IndexError, IndexedDocument, QueryCriteria, SearchCapabilities, SearchDispatcher,
        SearchHit, SearchIndex, SearchSettings,
    };
    use crate::sync::{DocumentSource, ItemRef, SourceError, SyncCoordinator, SyncSettings};
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedIndex;

    #[async_trait]
    impl SearchIndex for FixedIndex {
        async fn upsert(&self, _document: IndexedDocument) -> Result<(), IndexError> {
            Ok(())
        }

        async fn query(&self, _criteria: &QueryCriteria) -> Result<Vec<SearchHit>, IndexError> {
            Ok(vec![SearchHit {
                id: "doc-1".into(),
                score: 0.8,
                text: Some("rotate keys quarterly".into()),
                source_uri: None,
            }])
        }
    }

    struct OneDocument;

    #[async_trait]
    impl DocumentSource for OneDocument {
        async fn list_items_needing_sync(&self) -> Result<Vec<ItemRef>, SourceError> {
            Ok(vec![ItemRef {
                id: "doc-1".into(),
                uri: "stub://doc-1".into(),
                fingerprint: "fp".into(),
            }])
        }

        async fn fetch_content(&self, _item: &ItemRef) -> Result<String, SourceError> {
            Ok("rotate keys quarterly".into())
        }
    }

    struct Fixture {
        app: Router,
        state: AppState,
    }

    fn fixture(vector_enabled: bool, rate_limit: u32) -> Fixture {
        let cache = Arc::new(MemoryCache::default());
        let generation = Arc::new(CacheGeneration::new());
        let vectorizer = Arc::new(HashingVectorizer::new(8));
        let index = Arc::new(FixedIndex);
        let dispatcher = SearchDispatcher::new(
            cache.clone(),
            index.clone(),
            vectorizer.clone(),
            generation.clone(),
            SearchSettings {
                capabilities: SearchCapabilities {
                    vector: vector_enabled,
                    hybrid: true,
                },
                ..SearchSettings::default()
            },
        );
        let coordinator = SyncCoordinator::new(
            Arc::new(OneDocument),
            vectorizer,
            index,
            cache.clone(),
            generation,
            SyncSettings::default(),
        );
        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            coordinator: Arc::new(coordinator),
            cache,
            limiter: Arc::new(WindowRateLimiter::new(rate_limit, Duration::from_secs(60))),
            default_limit: 10,
        };
        Fixture {
            app: create_router(state.clone()),
            state,
        }
    }

    fn search_request(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/search")
            .header("content-type", "application/json")
            .header(CLIENT_ID_HEADER, "tester")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn empty_request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    #[tokio::test]
    async fn commands_catalog_exposes_search_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let search = commands
            .iter()
            .find(|cmd| cmd.name == "search")
            .expect("search command present");

        assert_eq!(search.method, "POST");
        assert_eq!(search.path, "/search");
        assert!(commands.iter().any(|cmd| cmd.path == "/sync/status"));
    }

    #[tokio::test]
    async fn search_route_returns_hits() {
        let fixture = fixture(true, 10);
        let response = fixture
            .app
            .oneshot(search_request(json!({ "query": "rotate keys", "limit": 3 })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["mode"], "keyword");
        assert_eq!(json["total"], 1);
        assert_eq!(json["hits"][0]["id"], "doc-1");
    }

    #[tokio::test]
    async fn disabled_vector_mode_returns_search_003() {
        let fixture = fixture(false, 10);
        let response = fixture
            .app
            .oneshot(search_request(json!({ "query": "rotate", "mode": "vector" })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let json = json_body(response).await;
        assert_eq!(json["code"], "SEARCH_003");
        assert_eq!(fixture.state.cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn invalid_requests_return_search_001() {
        let fixture = fixture(true, 10);
        let blank = fixture
            .app
            .clone()
            .oneshot(search_request(json!({ "query": "  " })))
            .await
            .expect("router response");
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(blank).await["code"], "SEARCH_001");

        let bad_mode = fixture
            .app
            .oneshot(search_request(json!({ "query": "rotate", "mode": "fuzzy" })))
            .await
            .expect("router response");
        assert_eq!(bad_mode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(bad_mode).await["code"], "SEARCH_001");
    }

    #[tokio::test]
    async fn search_is_rate_limited_per_client() {
        let fixture = fixture(true, 1);
        let first = fixture
            .app
            .clone()
            .oneshot(search_request(json!({ "query": "rotate" })))
            .await
            .expect("router response");
        assert_eq!(first.status(), StatusCode::OK);

        let second = fixture
            .app
            .oneshot(search_request(json!({ "query": "rotate" })))
            .await
            .expect("router response");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(second).await["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn sync_status_starts_idle() {
        let fixture = fixture(true, 10);
        let response = fixture
            .app
            .oneshot(empty_request(Method::GET, "/sync/status"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["state"], "IDLE");
    }

    #[tokio::test]
    async fn second_sync_request_conflicts_while_running() {
        let fixture = fixture(true, 10);
        fixture.state.coordinator.pause();

        let first = fixture
            .app
            .clone()
            .oneshot(empty_request(Method::POST, "/sync"))
            .await
            .expect("router response");
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let second = fixture
            .app
            .clone()
            .oneshot(empty_request(Method::POST, "/sync"))
            .await
            .expect("router response");
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(second).await["code"], "SYNC_ALREADY_RUNNING");

        let stop = fixture
            .app
            .oneshot(empty_request(Method::POST, "/sync/stop"))
            .await
            .expect("router response");
        assert_eq!(json_body(stop).await["stopped"], true);
    }

    #[tokio::test]
    async fn metrics_reflect_search_traffic() {
        let fixture = fixture(true, 10);
        for _ in 0..2 {
            fixture
                .app
                .clone()
                .oneshot(search_request(json!({ "query": "rotate" })))
                .await
                .expect("router response");
        }

        let response = fixture
            .app
            .oneshot(empty_request(Method::GET, "/metrics"))
            .await
            .expect("router response");
        let json = json_body(response).await;
        assert_eq!(json["keyword"]["searches"], 2);
        assert_eq!(json["cache_hits"], 1);
    }

    #[tokio::test]
    async fn cache_stats_route_reports_hits_misses_and_entries() {
        let fixture = fixture(true, 10);
        for _ in 0..2 {
            let response = fixture
                .app
                .clone()
                .oneshot(search_request(json!({ "query": "rotate" })))
                .await
                .expect("router response");
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = fixture
            .app
            .oneshot(empty_request(Method::GET, "/cache/stats"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["hits"], 1);
        assert_eq!(json["misses"], 1);
        assert_eq!(json["entries"], 1);
        assert_eq!(json["evictions"], 0);
    }
}
