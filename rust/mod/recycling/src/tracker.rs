use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, info, warn};

use ecoyard_core::{ServiceError, now_rfc3339};
use ecoyard_store::DocumentStore;

use crate::model::{MaterialBatch, NewBatch, ProcessState};
use crate::process::{self, StepOutcome};
use crate::store::Records;

// ---------------------------------------------------------------------------
// In-flight guard
// ---------------------------------------------------------------------------

/// Marks a batch as having a completion write outstanding. Released on drop,
/// whether the write succeeded, failed, or the future was dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<String>>, id: &str) -> Result<Self, ServiceError> {
        let mut ids = set.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(id.to_string()) {
            return Err(ServiceError::Busy(format!(
                "batch '{id}' already has a step completion in progress"
            )));
        }
        Ok(Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut ids = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        ids.remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// ProcessTracker
// ---------------------------------------------------------------------------

/// Result of a completion request.
#[derive(Debug, Clone)]
pub struct StepCompletion {
    pub batch: MaterialBatch,
    pub state: ProcessState,
    /// False when the step was already completed and nothing was written.
    pub changed: bool,
}

/// Owns the last-known batch list and applies step completions.
///
/// Writes go to the store first; the last-known list is only updated after
/// the store confirms. A failed write leaves it untouched.
///
/// `reload` is held by `refresh` from the store read to the list swap, and
/// by every write that reflects into the list, so a reload never replaces
/// the list with a snapshot older than a confirmed write.
pub struct ProcessTracker {
    batches: Records<MaterialBatch>,
    known: RwLock<Vec<MaterialBatch>>,
    in_flight: Mutex<HashSet<String>>,
    reload: AsyncMutex<()>,
}

impl ProcessTracker {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self {
            batches: Records::new(docs),
            known: RwLock::new(Vec::new()),
            in_flight: Mutex::new(HashSet::new()),
            reload: AsyncMutex::new(()),
        }
    }

    /// Reload every batch from the store and replace the last-known list.
    pub async fn refresh(&self) -> Result<Vec<MaterialBatch>, ServiceError> {
        let _reload = self.reload.lock().await;
        let loaded = self.batches.list().await?;
        debug!("loaded {} batches", loaded.len());
        *self.known.write().await = loaded.clone();
        Ok(loaded)
    }

    /// Snapshot of the last-known list, without touching the store.
    pub async fn batches(&self) -> Vec<MaterialBatch> {
        self.known.read().await.clone()
    }

    /// A batch from the last-known list.
    pub async fn get(&self, id: &str) -> Result<MaterialBatch, ServiceError> {
        self.known
            .read()
            .await
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("batch '{id}' not found")))
    }

    /// Derived process state of a known batch.
    pub async fn select(&self, id: &str) -> Result<ProcessState, ServiceError> {
        let batch = self.get(id).await?;
        Ok(process::derive_process_state(&batch))
    }

    /// Filter batches through the store's field query.
    pub async fn query(
        &self,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<MaterialBatch>, ServiceError> {
        self.batches.query(field, value).await
    }

    /// Validate and store a new batch, then add it to the last-known list.
    pub async fn create_batch(&self, req: NewBatch) -> Result<MaterialBatch, ServiceError> {
        let batch = req.into_batch(&now_rfc3339())?;
        let created = self.batches.create(batch).await?;
        info!(batch = %created.id, material = %created.material_type, "batch created");
        let _reload = self.reload.lock().await;
        self.known.write().await.push(created.clone());
        Ok(created)
    }

    /// Complete step `step_index` (1-based) of a known batch.
    ///
    /// Errors:
    /// - `Busy` if another completion for this batch is still outstanding.
    /// - `NotFound` if the batch is not in the last-known list.
    /// - `Validation` if the step is out of range or not the current step.
    /// - `Storage` if the store rejected the write; local state is kept.
    pub async fn complete_step(
        &self,
        id: &str,
        step_index: usize,
    ) -> Result<StepCompletion, ServiceError> {
        let _guard = InFlight::claim(&self.in_flight, id)?;
        let batch = self.get(id).await?;

        let updated = match process::complete_step(&batch, step_index, &now_rfc3339())? {
            StepOutcome::AlreadyCompleted => {
                debug!(batch = %id, step = step_index, "step already completed");
                let state = process::derive_process_state(&batch);
                return Ok(StepCompletion {
                    batch,
                    state,
                    changed: false,
                });
            }
            StepOutcome::Advanced(next) => next,
        };

        if let Err(e) = self.batches.update(id, updated.progress_patch()).await {
            warn!(batch = %id, step = step_index, "step completion not persisted: {}", e);
            return Err(e);
        }

        {
            let _reload = self.reload.lock().await;
            let mut known = self.known.write().await;
            if let Some(slot) = known.iter_mut().find(|b| b.id == id) {
                *slot = updated.clone();
            }
        }

        let state = process::derive_process_state(&updated);
        info!(
            batch = %id,
            step = step_index,
            current = state.current_step,
            "step completed"
        );
        Ok(StepCompletion {
            batch: updated,
            state,
            changed: true,
        })
    }
}
