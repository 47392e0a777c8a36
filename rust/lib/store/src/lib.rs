//! Document store: schemaless JSON records grouped into named collections.
//!
//! The recycling core talks to persistence only through [`DocumentStore`].
//! [`KvDocumentStore`] implements it on top of any `ecoyard_kv::KVStore`.

pub mod document;
pub mod kv;

pub use document::{Document, DocumentStore, Fields};
pub use kv::KvDocumentStore;
