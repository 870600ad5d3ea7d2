//! HTTP surface, grounded in `clarium::server`'s
//! `Router`/`AppState`/`Json` idiom and mapped 1:1 onto
//! `examples/original_source/main.py`'s Flask routes:
//!
//! - `POST /init` — lazily construct the backend (and cache, if
//!   configured) from a `{db_type, db_url, use_rabbitmq, max_workers}` body.
//! - `GET /?query=` — evaluate a query string, returning `{"result": rows}`.
//! - `POST /` — enqueue a `{"job": "..."}` mutation command.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};

use crate::cache::{CacheCoordinator, InMemoryCache, RedisCache};
use crate::concurrency::{LocalQueue, TaskQueue};
use crate::config::Settings;
use crate::error::AppError;
use crate::service::ServiceCore;
use crate::storage::file::FileBackend;
use crate::storage::relational::RelationalBackend;
use crate::storage::Backend;

const DEFAULT_COLUMNS: &[&str] = &["C1", "C2", "C3"];

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    service: Arc<RwLock<Option<Arc<ServiceCore>>>>,
    /// Bounds concurrent query execution to `settings.max_workers` (or the
    /// `max_workers` supplied to `POST /init`), the Rust analogue of
    /// `original_source/main.py`'s `ThreadPoolExecutor(max_workers=...)`
    /// that `query_data` is submitted to. Mutations are unaffected — they
    /// only ever enqueue onto the task queue and return immediately.
    /// Held behind a `RwLock` so `/init` can resize the pool by swapping in
    /// a freshly sized `Semaphore`; outstanding permits from the old one
    /// remain valid until released.
    query_permits: Arc<RwLock<Arc<Semaphore>>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let query_permits = Arc::new(RwLock::new(Arc::new(Semaphore::new(settings.max_workers.max(1)))));
        Self { settings: Arc::new(settings), service: Arc::new(RwLock::new(None)), query_permits }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_query).post(handle_modify))
        .route("/init", post(handle_init))
        .with_state(state)
}

#[derive(Deserialize)]
struct InitRequest {
    db_type: String,
    db_url: String,
    #[serde(default)]
    use_rabbitmq: bool,
    #[serde(default)]
    redis_url: Option<String>,
    #[serde(default)]
    max_workers: Option<usize>,
}

async fn handle_init(
    State(state): State<AppState>,
    Json(req): Json<InitRequest>,
) -> (StatusCode, Json<Value>) {
    if req.db_type.is_empty() || req.db_url.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"msg": "db_type and db_url are required"})));
    }

    let columns: Vec<String> = DEFAULT_COLUMNS.iter().map(|s| s.to_string()).collect();
    let backend: Arc<dyn Backend> = match req.db_type.as_str() {
        "csv" => Arc::new(FileBackend::new(&req.db_url, columns)),
        "mysql" => match RelationalBackend::connect(&req.db_url, "record", columns).await {
            Ok(b) => Arc::new(b),
            Err(err) => return error_response(err),
        },
        _ => {
            return (StatusCode::BAD_REQUEST, Json(json!({"msg": "Unsupported database type"})));
        }
    };
    if let Err(err) = backend.read().await {
        return error_response(err);
    }

    let cache = match &req.redis_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(cache) => Some(Arc::new(CacheCoordinator::new(Arc::new(cache), &state.settings))),
            Err(err) => return error_response(err),
        },
        None if req.db_type == "mysql" => {
            Some(Arc::new(CacheCoordinator::new(Arc::new(InMemoryCache::new()), &state.settings)))
        }
        None => None,
    };

    let queue: Arc<dyn TaskQueue> = if req.use_rabbitmq {
        match crate::concurrency::BrokerQueue::connect(&req.db_url, "task_queue").await {
            Ok(q) => Arc::new(q),
            Err(err) => return error_response(err),
        }
    } else {
        Arc::new(LocalQueue::new())
    };

    let core = ServiceCore::new(queue, backend, cache, &state.settings);
    *state.service.write().await = Some(Arc::new(core));

    if let Some(max_workers) = req.max_workers {
        *state.query_permits.write().await = Arc::new(Semaphore::new(max_workers.max(1)));
    }

    (StatusCode::OK, Json(json!({"result": "Database initialized successfully"})))
}

#[derive(Deserialize)]
struct QueryParams {
    query: Option<String>,
}

async fn handle_query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> (StatusCode, Json<Value>) {
    let Some(query) = params.query.filter(|q| !q.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"msg": "No valid parameters provided"})));
    };

    let service = state.service.read().await.clone();
    let Some(service) = service else {
        return (StatusCode::BAD_REQUEST, Json(json!({"msg": "Database not initialized"})));
    };

    // Acquire a permit from the bounded query pool before evaluating —
    // the semaphore itself never fails to close (it is never `close()`d
    // while the server runs), so the acquire can only be starved, never err.
    let permits = state.query_permits.read().await.clone();
    let _permit = permits.acquire_owned().await.expect("query semaphore never closes");
    match service.query_data(&query).await {
        Ok(rows) => (StatusCode::OK, Json(json!({"result": rows}))),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
struct ModifyRequest {
    job: Option<String>,
}

async fn handle_modify(
    State(state): State<AppState>,
    Json(req): Json<ModifyRequest>,
) -> (StatusCode, Json<Value>) {
    let Some(job) = req.job.filter(|j| !j.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"msg": "No valid job parameter provided"})));
    };

    let service = state.service.read().await.clone();
    let Some(service) = service else {
        return (StatusCode::BAD_REQUEST, Json(json!({"msg": "Database not initialized"})));
    };

    match service.modify_data(job).await {
        Ok(()) => (StatusCode::OK, Json(json!({"result": "Success"}))),
        Err(err) => error_response(err),
    }
}

fn error_response(err: AppError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"msg": err.message(), "code": err.code_str()})))
}
