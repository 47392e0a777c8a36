use std::marker::PhantomData;
use std::sync::Arc;

use ecoyard_core::ServiceError;
use ecoyard_store::{DocumentStore, Fields};
use tracing::warn;

use crate::model::Record;

/// Typed access to one document-store collection.
///
/// Decoding happens here, so nothing past this layer sees an unvalidated
/// record.
pub struct Records<T: Record> {
    docs: Arc<dyn DocumentStore>,
    _phantom: PhantomData<T>,
}

impl<T: Record> Records<T> {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self {
            docs,
            _phantom: PhantomData,
        }
    }

    /// All valid records. Malformed documents are skipped and logged.
    pub async fn list(&self) -> Result<Vec<T>, ServiceError> {
        let docs = self.docs.list(T::COLLECTION).await?;
        Ok(Self::decode_all(docs))
    }

    /// Store a new record and return it with its assigned id.
    pub async fn create(&self, mut record: T) -> Result<T, ServiceError> {
        let fields = record.to_fields()?;
        let id = self.docs.create(T::COLLECTION, fields).await?;
        record.set_id(id);
        Ok(record)
    }

    /// Push a partial update for one record.
    pub async fn update(&self, id: &str, patch: Fields) -> Result<(), ServiceError> {
        self.docs.update_fields(T::COLLECTION, id, patch).await
    }

    /// Valid records whose `field` equals `value`.
    pub async fn query(
        &self,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<T>, ServiceError> {
        let docs = self.docs.query_by_field(T::COLLECTION, field, value).await?;
        Ok(Self::decode_all(docs))
    }

    fn decode_all(docs: Vec<ecoyard_store::Document>) -> Vec<T> {
        docs.into_iter()
            .filter_map(|doc| {
                let id = doc.id.clone();
                match T::from_document(doc) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(collection = T::COLLECTION, id = %id, "skipping malformed record: {}", e);
                        None
                    }
                }
            })
            .collect()
    }
}
