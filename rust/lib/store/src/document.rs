use async_trait::async_trait;
use ecoyard_core::ServiceError;
use serde::Serialize;

/// Field map of a single document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A stored record: the store-assigned id plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// The document as a single JSON object with `id` folded in.
    pub fn into_value(self) -> serde_json::Value {
        let mut fields = self.fields;
        fields.insert("id".to_string(), serde_json::Value::String(self.id));
        serde_json::Value::Object(fields)
    }
}

/// The four operations the recycling core needs from persistence.
///
/// Every error is reported as a `ServiceError`; storage failures come back
/// as `ServiceError::Storage` and are safe to retry.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents in a collection. An unknown collection is empty.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, ServiceError>;

    /// Insert a new document and return its generated id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, ServiceError>;

    /// Merge `patch` into an existing document (RFC 7386 semantics).
    /// Returns `ServiceError::NotFound` if the id does not exist.
    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        patch: Fields,
    ) -> Result<(), ServiceError>;

    /// Documents whose top-level `field` equals `value`.
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<Document>, ServiceError>;
}
