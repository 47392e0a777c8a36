mod batches;
mod items;
mod report;

use std::sync::Arc;

use axum::Router;

use crate::model::RecyclingItem;
use crate::store::Records;
use crate::tracker::ProcessTracker;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub tracker: Arc<ProcessTracker>,
    pub items: Arc<Records<RecyclingItem>>,
}

/// Build the complete recycling module router.
///
/// Routes:
/// - `GET    /batches`                 list batches (`?type=`, `?status=`)
/// - `POST   /batches`                 create batch
/// - `GET    /batches/{id}`            get batch
/// - `GET    /batches/{id}/process`    derived process state
/// - `POST   /batches/{id}/@complete`  complete the current step
/// - `GET    /items`                   list recycling log
/// - `POST   /items`                   add recycling log entry
/// - `GET    /report`                  dashboard summary
pub fn router(state: ApiState) -> Router {
    Router::new()
        .merge(batches::router(state.clone()))
        .merge(items::router(state.clone()))
        .merge(report::router(state))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ecoyard_store::{DocumentStore, KvDocumentStore};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    fn make_router() -> Router {
        let docs: Arc<dyn DocumentStore> =
            Arc::new(KvDocumentStore::new(Arc::new(ecoyard_kv::MemoryKV::new())));
        router(ApiState {
            tracker: Arc::new(ProcessTracker::new(Arc::clone(&docs))),
            items: Arc::new(Records::new(docs)),
        })
    }

    async fn api_call(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let body = match body {
            Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
            None => Body::empty(),
        };
        let req = builder.body(body).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let json = if bytes.is_empty() {
            json!(null)
        } else {
            serde_json::from_slice(&bytes).unwrap_or(json!(null))
        };
        (status, json)
    }

    #[tokio::test]
    async fn batch_lifecycle_over_http() {
        let r = make_router();

        let (s, created) = api_call(
            &r,
            "POST",
            "/batches",
            Some(json!({"name": "PET lot", "type": "Plastic", "quantity": 120})),
        )
        .await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(created["quantity"], "120 kg");
        assert_eq!(created["overallStatus"], 1);
        let id = created["id"].as_str().unwrap().to_string();

        let (s, process) = api_call(&r, "GET", &format!("/batches/{id}/process"), None).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(process["currentStep"], 2);
        assert_eq!(process["steps"][1]["status"], "in-progress");

        let (s, done) = api_call(
            &r,
            "POST",
            &format!("/batches/{id}/@complete"),
            Some(json!({"step": "sorting"})),
        )
        .await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(done["changed"], true);
        assert_eq!(done["process"]["currentStep"], 3);
        assert_eq!(done["batch"]["stepStatus"]["sorting"], 2);

        let (s, done) = api_call(
            &r,
            "POST",
            &format!("/batches/{id}/@complete"),
            Some(json!({"step": 3})),
        )
        .await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(done["process"]["currentStep"], 4);

        let (s, list) = api_call(&r, "GET", "/batches", None).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(list["total"], 1);
        assert_eq!(list["items"][0]["stepStatus"]["cleaning"], 2);
    }

    #[tokio::test]
    async fn error_codes_over_http() {
        let r = make_router();

        let (s, body) = api_call(&r, "GET", "/batches/nope/process", None).await;
        assert_eq!(s, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (s, body) = api_call(&r, "POST", "/batches", Some(json!({"name": "no type"}))).await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let (_, created) = api_call(
            &r,
            "POST",
            "/batches",
            Some(json!({"name": "Cans", "type": "Metal"})),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        let (s, body) = api_call(
            &r,
            "POST",
            &format!("/batches/{id}/@complete"),
            Some(json!({"step": "melting"})),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let (s, _) = api_call(
            &r,
            "POST",
            &format!("/batches/{id}/@complete"),
            Some(json!({"step": 6})),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_requests_get_json_errors() {
        let r = make_router();
        let (_, created) = api_call(
            &r,
            "POST",
            "/batches",
            Some(json!({"name": "Jars", "type": "Glass"})),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        let (s, body) = api_call(
            &r,
            "POST",
            &format!("/batches/{id}/@complete"),
            Some(json!({"step": -1})),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert!(body["message"].is_string());

        let (s, body) = api_call(&r, "GET", "/batches?status=abc", None).await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let (s, body) = api_call(&r, "POST", "/batches", Some(json!("PET lot"))).await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let (s, body) = api_call(
            &r,
            "POST",
            "/items",
            Some(json!({"type": "Glass", "status": "Lost"})),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        // Nothing was completed by the rejected request.
        let (_, process) = api_call(&r, "GET", &format!("/batches/{id}/process"), None).await;
        assert_eq!(process["currentStep"], 2);
    }

    #[tokio::test]
    async fn filter_batches_by_type_and_status() {
        let r = make_router();
        for (name, t) in [("a", "Glass"), ("b", "Paper"), ("c", "Glass")] {
            api_call(&r, "POST", "/batches", Some(json!({"name": name, "type": t}))).await;
        }

        let (s, list) = api_call(&r, "GET", "/batches?type=Glass", None).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(list["total"], 2);

        let (_, list) = api_call(&r, "GET", "/batches?status=1", None).await;
        assert_eq!(list["total"], 3);

        let (_, list) = api_call(&r, "GET", "/batches?status=2", None).await;
        assert_eq!(list["total"], 0);

        let (s, _) = api_call(&r, "GET", "/batches?status=7", None).await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn report_over_http() {
        let r = make_router();

        let (s, report) = api_call(&r, "GET", "/report", None).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(report["recyclingRate"], 0);
        assert_eq!(report["itemsByStatus"]["Recycled"], 0);

        for (t, q, status) in [
            ("Plastic", "10 kg", "Recycled"),
            ("Glass", "bad", "Pending"),
            ("Plastic", "5 kg", "Recycled"),
        ] {
            let (s, _) = api_call(
                &r,
                "POST",
                "/items",
                Some(json!({"type": t, "quantity": q, "status": status,
                            "date": "2024-04-01T12:00:00Z"})),
            )
            .await;
            assert_eq!(s, StatusCode::OK);
        }

        let (_, report) = api_call(&r, "GET", "/report", None).await;
        assert_eq!(report["itemCount"], 3);
        assert_eq!(report["itemWeightKg"], 15.0);
        assert_eq!(report["recyclingRate"], 67);
        assert_eq!(report["materialDistribution"][0]["type"], "Plastic");
        assert_eq!(report["materialDistribution"][0]["percentage"], 67);

        let (_, items) = api_call(&r, "GET", "/items", None).await;
        assert_eq!(items["total"], 3);
    }
}
