use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use ecoyard_core::{ListResult, ServiceError};

use super::ApiState;
use crate::model::{MaterialBatch, NewBatch, ProcessState, StageStatus};
use crate::process::step_index_for;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/batches", get(list_batches).post(create_batch))
        .route("/batches/{id}", get(get_batch))
        .route("/batches/{id}/process", get(get_process))
        .route("/batches/{id}/@complete", post(complete_step))
        .with_state(state)
}

/// Query parameters for `GET /batches`.
#[derive(Debug, Default, Deserialize)]
pub struct BatchListQuery {
    #[serde(rename = "type", default)]
    pub material_type: Option<String>,

    /// Overall status as stored: 0, 1 or 2.
    #[serde(default)]
    pub status: Option<u8>,
}

/// A step given either by 1-based index or by key.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StepRef {
    Index(usize),
    Key(String),
}

/// Body for `POST /batches/{id}/@complete`.
#[derive(Debug, Deserialize)]
pub struct CompleteStepRequest {
    pub step: StepRef,
}

#[derive(Debug, Serialize)]
pub struct CompleteStepResponse {
    pub batch: MaterialBatch,
    pub process: ProcessState,
    pub changed: bool,
}

// ---------------------------------------------------------------------------
// GET /batches
// ---------------------------------------------------------------------------

async fn list_batches(
    State(state): State<ApiState>,
    query: Result<Query<BatchListQuery>, QueryRejection>,
) -> Result<Json<ListResult<MaterialBatch>>, ServiceError> {
    let Query(query) = query?;
    let status = query
        .status
        .map(StageStatus::try_from)
        .transpose()
        .map_err(ServiceError::Validation)?;

    // Always refresh so any id returned here can be completed right away.
    let all = state.tracker.refresh().await?;
    let mut batches = match (query.material_type, status) {
        (Some(t), _) => {
            state
                .tracker
                .query("type", &serde_json::Value::from(t))
                .await?
        }
        (None, Some(s)) => {
            state
                .tracker
                .query("overallStatus", &serde_json::Value::from(u8::from(s)))
                .await?
        }
        (None, None) => all,
    };
    if let Some(s) = status {
        batches.retain(|b| b.overall_status == s);
    }
    Ok(Json(ListResult::new(batches)))
}

// ---------------------------------------------------------------------------
// POST /batches
// ---------------------------------------------------------------------------

async fn create_batch(
    State(state): State<ApiState>,
    req: Result<Json<NewBatch>, JsonRejection>,
) -> Result<Json<MaterialBatch>, ServiceError> {
    let Json(req) = req?;
    let batch = state.tracker.create_batch(req).await?;
    Ok(Json(batch))
}

// ---------------------------------------------------------------------------
// GET /batches/{id}
// ---------------------------------------------------------------------------

async fn get_batch(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<MaterialBatch>, ServiceError> {
    Ok(Json(state.tracker.get(&id).await?))
}

// ---------------------------------------------------------------------------
// GET /batches/{id}/process
// ---------------------------------------------------------------------------

async fn get_process(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ProcessState>, ServiceError> {
    Ok(Json(state.tracker.select(&id).await?))
}

// ---------------------------------------------------------------------------
// POST /batches/{id}/@complete
// ---------------------------------------------------------------------------

async fn complete_step(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    req: Result<Json<CompleteStepRequest>, JsonRejection>,
) -> Result<Json<CompleteStepResponse>, ServiceError> {
    let Json(req) = req?;
    let step = match req.step {
        StepRef::Index(i) => i,
        StepRef::Key(key) => step_index_for(&key)?,
    };
    let done = state.tracker.complete_step(&id, step).await?;
    Ok(Json(CompleteStepResponse {
        batch: done.batch,
        process: done.state,
        changed: done.changed,
    }))
}
