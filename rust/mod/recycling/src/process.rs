//! Process derivation and step completion.
//!
//! The current step is never stored. It is recomputed from the per-step
//! map on every read, so the pointer and the step statuses cannot drift
//! apart.

use ecoyard_core::ServiceError;

use crate::model::{MaterialBatch, ProcessState, ProcessStep, StageStatus, StepKey, StepState};

/// 1-based index of the step after the last completed one, or 1 when
/// nothing is completed. Returns 7 once packaging is completed.
pub fn current_step(batch: &MaterialBatch) -> usize {
    StepKey::ALL
        .iter()
        .rposition(|k| batch.step(*k) == StageStatus::Completed)
        .map(|i| i + 2)
        .unwrap_or(1)
}

/// Build the ordered step view for a batch.
///
/// A step is completed if stored as 2, in progress if it sits at the
/// current index and is not completed, pending otherwise. At most one step
/// is in progress.
pub fn derive_process_state(batch: &MaterialBatch) -> ProcessState {
    let current = current_step(batch);

    let steps = StepKey::ALL
        .iter()
        .map(|&key| {
            let stored = batch.step(key);
            let status = if stored == StageStatus::Completed {
                StepState::Completed
            } else if key.index() == current {
                StepState::InProgress
            } else {
                StepState::Pending
            };
            ProcessStep {
                index: key.index(),
                key,
                display_name: key.display_name(),
                status,
                completed_at: match status {
                    StepState::Completed => batch.step_completed_at.get(&key).cloned(),
                    _ => None,
                },
            }
        })
        .collect();

    ProcessState {
        batch_id: batch.id.clone(),
        current_step: current,
        overall_status: batch.overall_status,
        steps,
    }
}

/// Result of applying a completion to a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The step was completed; the new batch must be persisted.
    Advanced(MaterialBatch),
    /// The step was already completed; nothing to write.
    AlreadyCompleted,
}

/// Resolve a step reference given as a key (`"sorting"`) to its index.
pub fn step_index_for(key: &str) -> Result<usize, ServiceError> {
    StepKey::from_str(key)
        .map(StepKey::index)
        .ok_or_else(|| ServiceError::Validation(format!("unknown step '{key}'")))
}

/// Complete step `step_index` (1-based) at time `now`.
///
/// Only the current step may be completed. Re-completing a completed step
/// is a no-op. Completion is forward-only: there is no way to reopen a step.
pub fn complete_step(
    batch: &MaterialBatch,
    step_index: usize,
    now: &str,
) -> Result<StepOutcome, ServiceError> {
    let key = StepKey::from_index(step_index).ok_or_else(|| {
        ServiceError::Validation(format!("step index {step_index} is outside 1..=6"))
    })?;

    if batch.step(key) == StageStatus::Completed {
        return Ok(StepOutcome::AlreadyCompleted);
    }

    let current = current_step(batch);
    if step_index != current {
        return Err(ServiceError::Validation(format!(
            "batch '{}': step {} ({}) is not the current step {}",
            batch.id, step_index, key, current
        )));
    }

    let mut next = batch.clone();
    next.step_status.insert(key, StageStatus::Completed);
    next.step_completed_at.insert(key, now.to_string());
    next.last_updated = Some(now.to_string());

    if next.all_steps_completed() {
        next.overall_status = StageStatus::Completed;
        next.completed_at = Some(now.to_string());
    } else {
        next.overall_status = StageStatus::InProgress;
    }

    Ok(StepOutcome::Advanced(next))
}
