use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use ecoyard_core::ServiceError;

use super::ApiState;
use crate::report::{self, ReportSummary};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/report", get(get_report))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /report
// ---------------------------------------------------------------------------

async fn get_report(State(state): State<ApiState>) -> Result<Json<ReportSummary>, ServiceError> {
    let batches = state.tracker.refresh().await?;
    let items = state.items.list().await?;
    Ok(Json(report::summary(&batches, &items)))
}
