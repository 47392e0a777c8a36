use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use ecoyard_core::{ListResult, ServiceError, now_rfc3339};

use super::ApiState;
use crate::model::{ItemStatus, RecyclingItem};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .with_state(state)
}

/// Body for `POST /items`. `date` defaults to now.
#[derive(Debug, Deserialize)]
pub struct NewItem {
    #[serde(rename = "type", default)]
    pub material_type: String,

    #[serde(default)]
    pub quantity: serde_json::Value,

    #[serde(default)]
    pub status: ItemStatus,

    #[serde(default)]
    pub date: Option<String>,

    #[serde(default)]
    pub note: Option<String>,
}

impl NewItem {
    fn into_item(self) -> Result<RecyclingItem, ServiceError> {
        let quantity = match self.quantity {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => format!("{n} kg"),
            other => {
                return Err(ServiceError::Validation(format!(
                    "quantity must be text or a number, got {other}"
                )));
            }
        };
        RecyclingItem {
            id: String::new(),
            material_type: self.material_type.trim().to_string(),
            quantity,
            status: self.status,
            date: Some(self.date.unwrap_or_else(now_rfc3339)),
            note: self.note,
        }
        .validate()
    }
}

// ---------------------------------------------------------------------------
// GET /items
// ---------------------------------------------------------------------------

async fn list_items(
    State(state): State<ApiState>,
) -> Result<Json<ListResult<RecyclingItem>>, ServiceError> {
    let items = state.items.list().await?;
    Ok(Json(ListResult::new(items)))
}

// ---------------------------------------------------------------------------
// POST /items
// ---------------------------------------------------------------------------

async fn create_item(
    State(state): State<ApiState>,
    req: Result<Json<NewItem>, JsonRejection>,
) -> Result<Json<RecyclingItem>, ServiceError> {
    let Json(req) = req?;
    let item = state.items.create(req.into_item()?).await?;
    Ok(Json(item))
}
