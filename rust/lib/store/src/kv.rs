//! `DocumentStore` backed by a byte-level `KVStore`.
//!
//! Each document is one KV entry: key `{collection}:{id}`, value the JSON
//! object of its fields. The id lives only in the key.

use std::sync::Arc;

use async_trait::async_trait;
use ecoyard_core::{ServiceError, merge_patch, new_id};
use ecoyard_kv::{KVError, KVStore};
use tracing::debug;

use crate::document::{Document, DocumentStore, Fields};

pub struct KvDocumentStore {
    kv: Arc<dyn KVStore>,
}

impl KvDocumentStore {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    fn prefix(collection: &str) -> String {
        format!("{}:", collection)
    }

    fn make_key(collection: &str, id: &str) -> String {
        format!("{}:{}", collection, id)
    }

    fn kv_err(e: KVError) -> ServiceError {
        ServiceError::Storage(e.to_string())
    }

    fn decode(key: &str, prefix: &str, bytes: &[u8]) -> Result<Document, ServiceError> {
        let fields: Fields = serde_json::from_slice(bytes)
            .map_err(|e| ServiceError::Internal(format!("deserialize {}: {}", key, e)))?;
        Ok(Document {
            id: key[prefix.len()..].to_string(),
            fields,
        })
    }

    fn scan(&self, collection: &str) -> Result<Vec<Document>, ServiceError> {
        let prefix = Self::prefix(collection);
        let entries = self.kv.scan(&prefix).map_err(Self::kv_err)?;
        entries
            .iter()
            .map(|(key, bytes)| Self::decode(key, &prefix, bytes))
            .collect()
    }

    fn write(&self, key: &str, fields: &Fields) -> Result<(), ServiceError> {
        let bytes = serde_json::to_vec(fields)
            .map_err(|e| ServiceError::Internal(format!("serialize: {}", e)))?;
        self.kv.set(key, &bytes).map_err(Self::kv_err)
    }
}

#[async_trait]
impl DocumentStore for KvDocumentStore {
    async fn list(&self, collection: &str) -> Result<Vec<Document>, ServiceError> {
        self.scan(collection)
    }

    async fn create(&self, collection: &str, mut fields: Fields) -> Result<String, ServiceError> {
        fields.remove("id");
        let id = new_id();
        self.write(&Self::make_key(collection, &id), &fields)?;
        debug!("created {}/{}", collection, id);
        Ok(id)
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        mut patch: Fields,
    ) -> Result<(), ServiceError> {
        let key = Self::make_key(collection, id);
        let bytes = self
            .kv
            .get(&key)
            .map_err(Self::kv_err)?
            .ok_or_else(|| ServiceError::NotFound(format!("{} '{}' not found", collection, id)))?;

        let mut current: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| ServiceError::Internal(format!("deserialize {}: {}", key, e)))?;
        patch.remove("id");
        merge_patch(&mut current, &serde_json::Value::Object(patch));

        let fields = match current {
            serde_json::Value::Object(map) => map,
            _ => return Err(ServiceError::Internal(format!("{} is not an object", key))),
        };
        self.write(&key, &fields)?;
        debug!("updated {}/{}", collection, id);
        Ok(())
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<Document>, ServiceError> {
        let docs = self.scan(collection)?;
        Ok(docs
            .into_iter()
            .filter(|doc| doc.fields.get(field) == Some(value))
            .collect())
    }
}
