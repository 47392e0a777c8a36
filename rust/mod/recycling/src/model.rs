use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use ecoyard_core::ServiceError;
use ecoyard_store::{Document, Fields};

// ---------------------------------------------------------------------------
// StepKey: the fixed processing pipeline
// ---------------------------------------------------------------------------

/// One stage of the six-stage processing pipeline.
///
/// Variant order is pipeline order; `Ord` follows it, so a
/// `BTreeMap<StepKey, _>` iterates collection → packaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKey {
    Collection,
    Sorting,
    Cleaning,
    Processing,
    QualityCheck,
    Packaging,
}

impl StepKey {
    pub const ALL: [StepKey; 6] = [
        StepKey::Collection,
        StepKey::Sorting,
        StepKey::Cleaning,
        StepKey::Processing,
        StepKey::QualityCheck,
        StepKey::Packaging,
    ];

    /// 1-based position in the pipeline.
    pub fn index(self) -> usize {
        self as usize + 1
    }

    /// Step at a 1-based position.
    pub fn from_index(index: usize) -> Option<Self> {
        index.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Sorting => "sorting",
            Self::Cleaning => "cleaning",
            Self::Processing => "processing",
            Self::QualityCheck => "qualitycheck",
            Self::Packaging => "packaging",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Collection => "Collection",
            Self::Sorting => "Sorting",
            Self::Cleaning => "Cleaning",
            Self::Processing => "Processing",
            Self::QualityCheck => "Quality Check",
            Self::Packaging => "Packaging",
        }
    }
}

impl std::fmt::Display for StepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StageStatus: persisted 0/1/2 status
// ---------------------------------------------------------------------------

/// Persisted status of a batch or of one of its steps.
///
/// Stored as a bare integer: `0` pending, `1` in progress, `2` completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl StageStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }
}

impl TryFrom<u8> for StageStatus {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Pending),
            1 => Ok(Self::InProgress),
            2 => Ok(Self::Completed),
            other => Err(format!("status must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<StageStatus> for u8 {
    fn from(s: StageStatus) -> u8 {
        match s {
            StageStatus::Pending => 0,
            StageStatus::InProgress => 1,
            StageStatus::Completed => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Quantity
// ---------------------------------------------------------------------------

/// Accept `"10 kg"` as-is and a bare number as `"<n> kg"`.
fn deserialize_quantity<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => format!("{n} kg"),
    })
}

// ---------------------------------------------------------------------------
// MaterialBatch
// ---------------------------------------------------------------------------

/// A batch of recyclable material moving through the processing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaterialBatch {
    /// Assigned by the document store.
    #[serde(default)]
    pub id: String,

    pub name: String,

    /// Material category, e.g. "Plastic".
    #[serde(rename = "type")]
    pub material_type: String,

    /// Free text with a numeric kilogram prefix, e.g. "120 kg".
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub quantity: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub overall_status: StageStatus,

    /// Absent steps are pending.
    #[serde(default)]
    pub step_status: BTreeMap<StepKey, StageStatus>,

    /// RFC 3339 completion time per completed step.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub step_completed_at: BTreeMap<StepKey, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Set when the last step completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl MaterialBatch {
    /// Stored status of a step; missing entries are pending.
    pub fn step(&self, key: StepKey) -> StageStatus {
        self.step_status.get(&key).copied().unwrap_or_default()
    }

    pub fn all_steps_completed(&self) -> bool {
        StepKey::ALL
            .iter()
            .all(|k| self.step(*k) == StageStatus::Completed)
    }

    /// Check required fields and the overall-status invariant.
    ///
    /// A stored Pending/InProgress batch whose steps are all completed is
    /// promoted to Completed; a stored Completed batch with an unfinished
    /// step is rejected.
    pub fn validate(mut self) -> Result<Self, ServiceError> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::Validation(format!(
                "batch '{}': name is required",
                self.id
            )));
        }
        if self.material_type.trim().is_empty() {
            return Err(ServiceError::Validation(format!(
                "batch '{}': type is required",
                self.id
            )));
        }

        let done = self.all_steps_completed();
        match (self.overall_status, done) {
            (StageStatus::Completed, false) => {
                return Err(ServiceError::Validation(format!(
                    "batch '{}': marked completed but not every step is completed",
                    self.id
                )));
            }
            (StageStatus::Pending | StageStatus::InProgress, true) => {
                self.overall_status = StageStatus::Completed;
            }
            _ => {}
        }
        Ok(self)
    }

    /// Fields written back to the store after a step completes.
    pub fn progress_patch(&self) -> Fields {
        let mut patch = Fields::new();
        patch.insert(
            "overallStatus".into(),
            serde_json::Value::from(u8::from(self.overall_status)),
        );
        patch.insert("stepStatus".into(), to_json(&self.step_status));
        patch.insert("stepCompletedAt".into(), to_json(&self.step_completed_at));
        if let Some(ts) = &self.last_updated {
            patch.insert("lastUpdated".into(), serde_json::Value::from(ts.as_str()));
        }
        if let Some(ts) = &self.completed_at {
            patch.insert("completedAt".into(), serde_json::Value::from(ts.as_str()));
        }
        patch
    }
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    // Maps keyed by StepKey with string/u8 values always serialize.
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Body for `POST /batches`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub material_type: String,

    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub quantity: String,

    #[serde(default)]
    pub description: String,
}

impl NewBatch {
    /// Build the initial batch: collection completed at `now`, every other
    /// step pending, overall in progress.
    pub fn into_batch(self, now: &str) -> Result<MaterialBatch, ServiceError> {
        let mut step_status = BTreeMap::new();
        for key in StepKey::ALL {
            step_status.insert(key, StageStatus::Pending);
        }
        step_status.insert(StepKey::Collection, StageStatus::Completed);

        let mut step_completed_at = BTreeMap::new();
        step_completed_at.insert(StepKey::Collection, now.to_string());

        MaterialBatch {
            id: String::new(),
            name: self.name.trim().to_string(),
            material_type: self.material_type.trim().to_string(),
            quantity: self.quantity,
            description: self.description,
            overall_status: StageStatus::InProgress,
            step_status,
            step_completed_at,
            last_updated: Some(now.to_string()),
            created_at: Some(now.to_string()),
            completed_at: None,
        }
        .validate()
    }
}

// ---------------------------------------------------------------------------
// Derived process view
// ---------------------------------------------------------------------------

/// Display status of a step, derived from the stored map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepState {
    Pending,
    InProgress,
    Completed,
}

/// One row of the process tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStep {
    pub index: usize,
    pub key: StepKey,
    pub display_name: &'static str,
    pub status: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// Derived tracker state for one batch.
///
/// `current_step` is 1-based; it is 7 (one past packaging) once every step
/// is completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessState {
    pub batch_id: String,
    pub current_step: usize,
    pub overall_status: StageStatus,
    pub steps: Vec<ProcessStep>,
}

impl ProcessState {
    pub fn in_progress(&self) -> Option<&ProcessStep> {
        self.steps.iter().find(|s| s.status == StepState::InProgress)
    }
}

// ---------------------------------------------------------------------------
// RecyclingItem: recycling log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ItemStatus {
    #[default]
    Pending,
    Processing,
    Recycled,
    Rejected,
}

impl ItemStatus {
    pub const LABELS: [&'static str; 4] = ["Pending", "Processing", "Recycled", "Rejected"];

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Recycled => "Recycled",
            Self::Rejected => "Rejected",
        }
    }
}

/// One entry of the recycling log (a drop-off or recycled lot).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecyclingItem {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub material_type: String,

    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub quantity: String,

    #[serde(default)]
    pub status: ItemStatus,

    /// RFC 3339 date of the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RecyclingItem {
    pub fn validate(self) -> Result<Self, ServiceError> {
        if self.material_type.trim().is_empty() {
            return Err(ServiceError::Validation(format!(
                "item '{}': type is required",
                self.id
            )));
        }
        if let Some(date) = &self.date {
            if ecoyard_core::parse_rfc3339(date).is_none() {
                return Err(ServiceError::Validation(format!(
                    "item '{}': date '{}' is not RFC 3339",
                    self.id, date
                )));
            }
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Document boundary
// ---------------------------------------------------------------------------

/// A model kept in its own document-store collection.
pub trait Record: Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;

    /// Post-decode checks.
    fn check(self) -> Result<Self, ServiceError>;

    fn set_id(&mut self, id: String);

    /// Decode a stored document, rejecting malformed records.
    fn from_document(doc: Document) -> Result<Self, ServiceError> {
        let id = doc.id.clone();
        let record: Self = serde_json::from_value(doc.into_value()).map_err(|e| {
            ServiceError::Validation(format!("{} '{}': {}", Self::COLLECTION, id, e))
        })?;
        record.check()
    }

    /// Fields to store; the id is kept out since the store owns it.
    fn to_fields(&self) -> Result<Fields, ServiceError> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("id");
                Ok(map)
            }
            Ok(_) => Err(ServiceError::Internal(format!(
                "{} record is not an object",
                Self::COLLECTION
            ))),
            Err(e) => Err(ServiceError::Internal(format!("serialize: {e}"))),
        }
    }
}

impl Record for MaterialBatch {
    const COLLECTION: &'static str = "material_batches";

    fn check(self) -> Result<Self, ServiceError> {
        self.validate()
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for RecyclingItem {
    const COLLECTION: &'static str = "recycling_items";

    fn check(self) -> Result<Self, ServiceError> {
        self.validate()
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, v: serde_json::Value) -> Document {
        match v {
            serde_json::Value::Object(fields) => Document { id: id.into(), fields },
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn step_key_order_and_index() {
        let idx: Vec<usize> = StepKey::ALL.iter().map(|k| k.index()).collect();
        assert_eq!(idx, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(StepKey::from_index(5), Some(StepKey::QualityCheck));
        assert_eq!(StepKey::from_index(0), None);
        assert_eq!(StepKey::from_index(7), None);
        assert_eq!(StepKey::from_str("qualitycheck"), Some(StepKey::QualityCheck));
        assert_eq!(StepKey::from_str("QualityCheck"), None);
    }

    #[test]
    fn decodes_stored_document() {
        let batch = MaterialBatch::from_document(doc(
            "b1",
            json!({
                "name": "PET bottles",
                "type": "Plastic",
                "quantity": "120 kg",
                "overallStatus": 1,
                "stepStatus": {"collection": 2, "sorting": 0, "qualitycheck": 0}
            }),
        ))
        .unwrap();

        assert_eq!(batch.id, "b1");
        assert_eq!(batch.step(StepKey::Collection), StageStatus::Completed);
        assert_eq!(batch.step(StepKey::Packaging), StageStatus::Pending);
        assert_eq!(batch.overall_status, StageStatus::InProgress);
        assert!(batch.last_updated.is_none());
    }

    #[test]
    fn numeric_quantity_gets_unit() {
        let batch = MaterialBatch::from_document(doc(
            "b2",
            json!({"name": "Cans", "type": "Metal", "quantity": 40}),
        ))
        .unwrap();
        assert_eq!(batch.quantity, "40 kg");
    }

    #[test]
    fn unknown_step_key_rejected() {
        let err = MaterialBatch::from_document(doc(
            "b3",
            json!({"name": "x", "type": "Glass", "stepStatus": {"melting": 2}}),
        ))
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn out_of_range_status_rejected() {
        let err = MaterialBatch::from_document(doc(
            "b4",
            json!({"name": "x", "type": "Glass", "stepStatus": {"sorting": 3}}),
        ))
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = MaterialBatch::from_document(doc(
            "b5",
            json!({"name": "x", "type": "Glass", "overallStatus": 9}),
        ))
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn missing_name_rejected() {
        let err = MaterialBatch::from_document(doc("b6", json!({"type": "Glass"}))).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err =
            MaterialBatch::from_document(doc("b7", json!({"name": " ", "type": "Glass"})))
                .unwrap_err();
        assert!(err.to_string().contains("name is required"));
    }

    #[test]
    fn completed_without_all_steps_rejected() {
        let err = MaterialBatch::from_document(doc(
            "b8",
            json!({"name": "x", "type": "Paper", "overallStatus": 2,
                   "stepStatus": {"collection": 2}}),
        ))
        .unwrap_err();
        assert!(err.to_string().contains("marked completed"));
    }

    #[test]
    fn all_steps_done_promotes_to_completed() {
        let steps: serde_json::Map<String, serde_json::Value> = StepKey::ALL
            .iter()
            .map(|k| (k.as_str().to_string(), json!(2)))
            .collect();
        let batch = MaterialBatch::from_document(doc(
            "b9",
            json!({"name": "x", "type": "Paper", "overallStatus": 1, "stepStatus": steps}),
        ))
        .unwrap();
        assert_eq!(batch.overall_status, StageStatus::Completed);
    }

    #[test]
    fn new_batch_starts_after_collection() {
        let batch = NewBatch {
            name: "  Cardboard  ".into(),
            material_type: "Paper".into(),
            quantity: "80 kg".into(),
            description: String::new(),
        }
        .into_batch("2024-05-01T08:00:00+00:00")
        .unwrap();

        assert_eq!(batch.name, "Cardboard");
        assert_eq!(batch.overall_status, StageStatus::InProgress);
        assert_eq!(batch.step(StepKey::Collection), StageStatus::Completed);
        for key in &StepKey::ALL[1..] {
            assert_eq!(batch.step(*key), StageStatus::Pending);
        }
        assert_eq!(
            batch.step_completed_at.get(&StepKey::Collection).map(String::as_str),
            Some("2024-05-01T08:00:00+00:00")
        );
    }

    #[test]
    fn new_batch_requires_type() {
        let err = NewBatch {
            name: "Cardboard".into(),
            material_type: String::new(),
            quantity: String::new(),
            description: String::new(),
        }
        .into_batch("2024-05-01T08:00:00+00:00")
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn stored_fields_use_integer_statuses() {
        let batch = NewBatch {
            name: "Glass jars".into(),
            material_type: "Glass".into(),
            quantity: "15 kg".into(),
            description: String::new(),
        }
        .into_batch("2024-05-01T08:00:00+00:00")
        .unwrap();
        let fields = batch.to_fields().unwrap();
        assert!(!fields.contains_key("id"));
        assert_eq!(fields["overallStatus"], 1);
        assert_eq!(fields["stepStatus"]["collection"], 2);
        assert_eq!(fields["stepStatus"]["qualitycheck"], 0);
    }

    #[test]
    fn item_date_must_parse() {
        let err = RecyclingItem::from_document(doc(
            "i1",
            json!({"type": "Glass", "status": "Recycled", "date": "last tuesday"}),
        ))
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let item = RecyclingItem::from_document(doc(
            "i2",
            json!({"type": "Glass", "status": "Recycled", "date": "2024-05-01T08:00:00Z"}),
        ))
        .unwrap();
        assert_eq!(item.status, ItemStatus::Recycled);
    }

    #[test]
    fn item_unknown_status_rejected() {
        let err = RecyclingItem::from_document(doc(
            "i3",
            json!({"type": "Glass", "status": "Lost"}),
        ))
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
