pub mod api;
pub mod model;
pub mod process;
pub mod report;
pub mod store;
pub mod tracker;

use std::sync::Arc;

use axum::Router;
use ecoyard_core::{Module, ServiceError};
use ecoyard_kv::KVStore;
use ecoyard_store::{DocumentStore, KvDocumentStore};

use model::RecyclingItem;
use store::Records;
use tracker::ProcessTracker;

/// The recycling module: material batches moving through the processing
/// pipeline, the recycling log, and dashboard reporting.
pub struct RecyclingModule {
    tracker: Arc<ProcessTracker>,
    items: Arc<Records<RecyclingItem>>,
}

impl RecyclingModule {
    /// Create the module over a document store and load the batch list.
    pub async fn new(docs: Arc<dyn DocumentStore>) -> Result<Self, ServiceError> {
        let tracker = Arc::new(ProcessTracker::new(Arc::clone(&docs)));
        tracker.refresh().await?;
        Ok(Self {
            tracker,
            items: Arc::new(Records::new(docs)),
        })
    }

    /// Create the module with documents kept in a KV store.
    pub async fn with_kv(kv: Arc<dyn KVStore>) -> Result<Self, ServiceError> {
        Self::new(Arc::new(KvDocumentStore::new(kv))).await
    }

    /// The process tracker, for programmatic access.
    pub fn tracker(&self) -> &Arc<ProcessTracker> {
        &self.tracker
    }
}

impl Module for RecyclingModule {
    fn name(&self) -> &str {
        "recycling"
    }

    fn routes(&self) -> Router {
        api::router(api::ApiState {
            tracker: Arc::clone(&self.tracker),
            items: Arc::clone(&self.items),
        })
    }
}
