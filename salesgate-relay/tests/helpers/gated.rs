//! Object store that holds inbound fetches until released

use async_trait::async_trait;
use bytes::Bytes;
use salesgate_common::object_store::{InMemoryObjectStore, ObjectStore};
use salesgate_common::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

/// Every `get` on `gated_bucket` waits for a gate permit before reading
#[derive(Debug)]
pub struct GatedStore {
    inner: InMemoryObjectStore,
    gated_bucket: String,
    gate: Semaphore,
    active: AtomicUsize,
    peak: AtomicUsize,
    fetches: Mutex<HashMap<String, usize>>,
}

impl GatedStore {
    pub fn new(gated_bucket: &str) -> Self {
        Self {
            inner: InMemoryObjectStore::new(),
            gated_bucket: gated_bucket.to_string(),
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    /// Let every held and future fetch through
    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Fetches currently held at the gate or reading
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Most fetches ever held at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Fetches started for `object` in the gated bucket
    pub fn fetches(&self, object: &str) -> usize {
        self.fetches.lock().unwrap().get(object).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStore for GatedStore {
    async fn put(&self, bucket: &str, object: &str, data: Bytes) -> Result<()> {
        self.inner.put(bucket, object, data).await
    }

    async fn get(&self, bucket: &str, object: &str) -> Result<Bytes> {
        if bucket != self.gated_bucket {
            return self.inner.get(bucket, object).await;
        }

        *self
            .fetches
            .lock()
            .unwrap()
            .entry(object.to_string())
            .or_default() += 1;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let permit = self.gate.acquire().await.unwrap();
        drop(permit);
        let result = self.inner.get(bucket, object).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete(&self, bucket: &str, object: &str) -> Result<()> {
        self.inner.delete(bucket, object).await
    }

    async fn list(&self, bucket: &str, limit: usize) -> Result<Vec<String>> {
        self.inner.list(bucket, limit).await
    }

    async fn copy(
        &self,
        dst_bucket: &str,
        dst_object: &str,
        src_bucket: &str,
        src_object: &str,
    ) -> Result<()> {
        self.inner
            .copy(dst_bucket, dst_object, src_bucket, src_object)
            .await
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.inner.bucket_exists(bucket).await
    }

    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        self.inner.make_bucket(bucket).await
    }
}
