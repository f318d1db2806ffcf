//! In-memory object store for local runs and tests

use super::{ObjectHead, ObjectStore, PutOptions};
use crate::error::StorageError;
use crate::models::StorageLocation;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// An object held by the in-memory store
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub options: PutOptions,
}

/// Thread-safe map-backed store with failure injection
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<StorageLocation, StoredObject>>,
    failing_puts: RwLock<HashSet<String>>,
    unavailable: RwLock<bool>,
    get_count: AtomicUsize,
    put_count: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, e.g. the source image of a job
    pub fn insert(&self, location: StorageLocation, body: impl Into<Bytes>, content_type: &str) {
        self.objects.write().insert(
            location,
            StoredObject {
                body: body.into(),
                options: PutOptions {
                    content_type: content_type.to_string(),
                    ..PutOptions::default()
                },
            },
        );
    }

    pub fn object(&self, location: &StorageLocation) -> Option<StoredObject> {
        self.objects.read().get(location).cloned()
    }

    /// Keys currently stored in a bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|location| location.bucket == bucket)
            .map(|location| location.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Make every put to `key` fail
    pub fn fail_puts_for(&self, key: impl Into<String>) {
        self.failing_puts.write().insert(key.into());
    }

    /// Simulate an unreachable store for reads
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if *self.unavailable.read() {
            return Err(StorageError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn head_object(&self, location: &StorageLocation) -> Result<ObjectHead, StorageError> {
        self.check_available()?;
        self.objects
            .read()
            .get(location)
            .map(|object| ObjectHead {
                content_length: object.body.len() as u64,
                content_type: Some(object.options.content_type.clone()),
            })
            .ok_or_else(|| StorageError::NotFound(location.to_string()))
    }

    async fn get_object(&self, location: &StorageLocation) -> Result<Bytes, StorageError> {
        self.check_available()?;
        self.get_count.fetch_add(1, Ordering::SeqCst);
        self.objects
            .read()
            .get(location)
            .map(|object| object.body.clone())
            .ok_or_else(|| StorageError::NotFound(location.to_string()))
    }

    async fn put_object(
        &self,
        location: &StorageLocation,
        body: Bytes,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        if self.failing_puts.read().contains(&location.key) {
            return Err(StorageError::Rejected(format!(
                "injected put failure for {location}"
            )));
        }
        self.put_count.fetch_add(1, Ordering::SeqCst);
        self.objects
            .write()
            .insert(location.clone(), StoredObject { body, options });
        Ok(())
    }
}
