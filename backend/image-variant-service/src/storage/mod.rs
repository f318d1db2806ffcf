//! Object store contract
//!
//! The service only needs three calls: head, full get, and atomic put. Adapters live in
//! submodules: S3 for deployments, in-memory for local runs and tests.

pub mod memory;
pub mod s3;

pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

use crate::error::StorageError;
use crate::models::StorageLocation;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// Result of a head request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
    pub content_type: Option<String>,
}

/// Options attached to every uploaded object
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PutOptions {
    pub content_type: String,
    pub cache_control: String,
    pub metadata: HashMap<String, String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head_object(&self, location: &StorageLocation) -> Result<ObjectHead, StorageError>;

    /// Full object body; no ranged reads
    async fn get_object(&self, location: &StorageLocation) -> Result<Bytes, StorageError>;

    /// Store an object atomically: either the whole body is visible or nothing is
    async fn put_object(
        &self,
        location: &StorageLocation,
        body: Bytes,
        options: PutOptions,
    ) -> Result<(), StorageError>;
}
