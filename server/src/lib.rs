use anyhow::{Context, Result};
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use spimi_core::tokenizer::EnglishNormalizer;
use spimi_core::{DictionaryEntry, DocId, IndexPaths, QueryConfig, Searcher};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (status, Json(ErrorBody { error: error.to_string() }))
}

pub type AppState = Arc<Searcher<EnglishNormalizer>>;

fn query_config_from_env() -> QueryConfig {
    let mut config = QueryConfig::default();
    if let Ok(raw) = std::env::var("SEARCH_ELIMINATION_THRESHOLD") {
        match raw.trim().parse::<f64>() {
            Ok(t) => config.elimination_threshold = t,
            Err(_) => {
                tracing::warn!(value = %raw, "ignoring unparsable SEARCH_ELIMINATION_THRESHOLD")
            }
        }
    }
    config
}

fn cors_layer() -> CorsLayer {
    // CORS_ALLOW_ORIGIN is comma-separated; unset or empty allows any origin
    let origins: Vec<_> = std::env::var("CORS_ALLOW_ORIGIN")
        .map(|val| val.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Load the index under `index_dir` and build the HTTP router.
pub fn build_app(index_dir: impl AsRef<std::path::Path>) -> Result<Router> {
    let index_dir = index_dir.as_ref();
    let config = query_config_from_env();
    let searcher = Searcher::open(IndexPaths::in_dir(index_dir), config, EnglishNormalizer)
        .with_context(|| format!("open index in {}", index_dir.display()))?;
    tracing::info!(
        terms = searcher.index().dictionary().len(),
        documents = searcher.index().collection_size(),
        "index loaded"
    );
    Ok(router(Arc::new(searcher)))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/term/:term", get(term_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

pub async fn search_handler(
    State(searcher): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let query = params.q.clone();
    // disk reads and the scoring pool must not block the runtime
    let ranked = tokio::task::spawn_blocking(move || searcher.search(&query, &[]))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .map_err(|e| {
            tracing::error!(error = %e, query = %params.q, "search failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
        })?;

    let k = params.k.clamp(1, 100);
    let total_hits = ranked.len();
    let results = ranked
        .into_iter()
        .take(k)
        .map(|r| SearchHit { doc_id: r.doc_id, score: r.score })
        .collect();
    let took_s = start.elapsed().as_secs_f64();
    Ok(Json(SearchResponse { query: params.q, took_s, total_hits, results }))
}

pub async fn term_handler(
    State(searcher): State<AppState>,
    Path(term): Path<String>,
) -> Result<Json<DictionaryEntry>, ApiError> {
    searcher
        .index()
        .dictionary()
        .get(&term)
        .copied()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown term {term}")))
}
