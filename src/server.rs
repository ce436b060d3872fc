//! HTTP routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | / | Landing page |
//! | GET | /health | Liveness and model status |
//! | POST | /predict/ | Score and store one request |
//! | GET | /predictions | All stored predictions |
//! | GET | /predictions/:id | One stored prediction |
//! | GET | /visualizations/:case | One summary view |
//!
//! Handlers only compose the other modules; errors become [`ApiError`]
//! responses.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::aggregate::{View, ViewRows};
use crate::error::ApiError;
use crate::features::FeatureVector;
use crate::model::Predictor;
use crate::store::PredictionStore;
use crate::types::{PredictionRecord, PredictionRequest};

const INDEX_HTML: &str = include_str!("../assets/index.html");

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
    pub store: Arc<PredictionStore>,
}

impl AppState {
    pub fn new(predictor: Predictor, store: PredictionStore) -> Self {
        Self {
            predictor: Arc::new(predictor),
            store: Arc::new(store),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub predictions: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/predict", post(create_prediction))
        .route("/predict/", post(create_prediction))
        .route("/predictions", get(list_predictions))
        .route("/predictions/:id", get(get_prediction))
        .route("/visualizations/:case", get(visualization))
        .with_state(state)
}

// ---------- Handlers ----------

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.predictor.is_available(),
        predictions: state.store.count()?,
    }))
}

async fn create_prediction(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PredictionRecord>), ApiError> {
    let Json(req) = payload?;

    let features = FeatureVector::from_request(&req);
    if features.active_categories() == 0 {
        tracing::debug!(
            "unrecognized ocean_proximity {:?}; all indicator columns are 0",
            req.ocean_proximity
        );
    }

    // Nothing is written unless the model produced a value
    let value = state.predictor.predict(&features)?;
    let record = state.store.insert(&req, Some(value))?;

    tracing::info!(
        "created prediction id={} ocean_proximity={:?} predicted_house_value={:.2}",
        record.id,
        record.inputs.ocean_proximity,
        value
    );
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_predictions(
    State(state): State<AppState>,
) -> Result<Json<Vec<PredictionRecord>>, ApiError> {
    Ok(Json(state.store.get_all()?))
}

async fn get_prediction(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<PredictionRecord>, ApiError> {
    let Path(id) = id?;
    state
        .store
        .get_by_id(id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn visualization(
    State(state): State<AppState>,
    case: Result<Path<String>, PathRejection>,
) -> Result<Json<ViewRows>, ApiError> {
    let Path(case) = case?;
    let view: View = case.parse()?;
    let records = state.store.get_all()?;
    Ok(Json(view.compute(&records)))
}
