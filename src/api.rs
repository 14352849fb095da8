use axum::{
    extract::{ConnectInfo, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};

use crate::error::ServiceError;
use crate::rate_limit::RateLimiter;
use crate::service::TrafficService;
use crate::types::{ListQuery, PredictionInput, PredictionResult, StoredPrediction};

// ---------- Request/Response types ----------

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    pub ok: bool,
    pub name: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct RetrainParams {
    pub seed: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RetrainOut {
    pub ok: bool,
    pub seed: u64,
}

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub service: TrafficService,
    pub limiter: Arc<RateLimiter>,
    pub app_name: Arc<str>,
}

impl AppState {
    fn admit(&self, peer: &SocketAddr) -> Result<(), ServiceError> {
        self.limiter.check(&peer.ip().to_string())
    }
}

/// Runs model and SQLite work on the blocking pool. Both sit behind mutexes
/// that a retrain can hold for the whole fit.
async fn blocking<T, F>(f: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
}

// ---------- Handlers ----------

pub async fn health(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Result<Json<Health>, ServiceError> {
    state.admit(&peer)?;
    Ok(Json(Health {
        ok: true,
        name: state.app_name.to_string(),
    }))
}

pub async fn predict(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(input): Json<PredictionInput>,
) -> Result<Json<PredictionResult>, ServiceError> {
    state.admit(&peer)?;
    let svc = state.service.clone();
    let outcome = blocking(move || svc.predict(&input)).await?;
    Ok(Json(outcome.result))
}

pub async fn retrain(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<RetrainParams>,
) -> Result<Json<RetrainOut>, ServiceError> {
    state.admit(&peer)?;
    let svc = state.service.clone();
    let report = blocking(move || svc.retrain(params.seed)).await?;
    Ok(Json(RetrainOut {
        ok: true,
        seed: report.seed,
    }))
}

pub async fn list_predictions(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<StoredPrediction>>, ServiceError> {
    state.admit(&peer)?;
    let svc = state.service.clone();
    Ok(Json(blocking(move || svc.list(&query)).await?))
}

pub async fn get_prediction(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(id): Path<i64>,
) -> Result<Json<StoredPrediction>, ServiceError> {
    state.admit(&peer)?;
    let svc = state.service.clone();
    Ok(Json(blocking(move || svc.get(id)).await?))
}

pub fn router(state: AppState, prefix: &str) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/retrain", post(retrain))
        .route("/predictions", get(list_predictions))
        .route("/predictions/:id", get(get_prediction))
        .with_state(state);

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        api
    } else {
        Router::new().nest(&format!("/{}", prefix), api)
    }
}
