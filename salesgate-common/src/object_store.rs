//! Object store collaborator
//!
//! Objects live in flat, named buckets. Two implementations are provided:
//! [`InMemoryObjectStore`] for tests and single-process deployments, and
//! [`FileObjectStore`] which maps each bucket to a directory under a root.

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

/// Object store collaborator
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Save `data` as `bucket/object`, replacing any previous content
    async fn put(&self, bucket: &str, object: &str, data: Bytes) -> Result<()>;

    /// Return the content of `bucket/object`
    async fn get(&self, bucket: &str, object: &str) -> Result<Bytes>;

    /// Delete `bucket/object`; deleting a missing object is not an error
    async fn delete(&self, bucket: &str, object: &str) -> Result<()>;

    /// List up to `limit` object names in `bucket`, in name order
    async fn list(&self, bucket: &str, limit: usize) -> Result<Vec<String>>;

    /// Copy `src_bucket/src_object` to `dst_bucket/dst_object`
    async fn copy(
        &self,
        dst_bucket: &str,
        dst_object: &str,
        src_bucket: &str,
        src_object: &str,
    ) -> Result<()>;

    /// True when `bucket` exists
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Create `bucket`; creating an existing bucket is not an error
    async fn make_bucket(&self, bucket: &str) -> Result<()>;
}

/// Bucket names: 1-63 chars of lowercase ASCII letters, digits, `-` and `.`
pub fn validate_bucket_name(bucket: &str) -> Result<()> {
    let valid = !bucket.is_empty()
        && bucket.len() <= 63
        && bucket
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
        && !bucket.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid bucket name '{}'", bucket)))
    }
}

/// Longest object name in bytes; one path component on common filesystems
pub const MAX_OBJECT_NAME_LEN: usize = 255;

/// Object names are flat: no path separators, no leading dot, no NUL
pub fn validate_object_name(object: &str) -> Result<()> {
    let valid = !object.is_empty()
        && object.len() <= MAX_OBJECT_NAME_LEN
        && !object.starts_with('.')
        && !object.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid object name '{}'", object)))
    }
}

/// In-memory storage suitable for testing or for running without a
/// storage service.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, Bytes>>>,
}

impl InMemoryObjectStore {
    /// Create an empty store with no buckets
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, bucket: &str, object: &str, data: Bytes) -> Result<()> {
        validate_object_name(object)?;
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::NotFound(format!("bucket '{}'", bucket)))?;
        objects.insert(object.to_string(), data);
        Ok(())
    }

    async fn get(&self, bucket: &str, object: &str) -> Result<Bytes> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(object))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object '{}/{}'", bucket, object)))
    }

    async fn delete(&self, bucket: &str, object: &str) -> Result<()> {
        if let Some(objects) = self.buckets.write().await.get_mut(bucket) {
            objects.remove(object);
        }
        Ok(())
    }

    async fn list(&self, bucket: &str, limit: usize) -> Result<Vec<String>> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| Error::NotFound(format!("bucket '{}'", bucket)))?;
        Ok(objects.keys().take(limit).cloned().collect())
    }

    async fn copy(
        &self,
        dst_bucket: &str,
        dst_object: &str,
        src_bucket: &str,
        src_object: &str,
    ) -> Result<()> {
        let data = self.get(src_bucket, src_object).await?;
        self.put(dst_bucket, dst_object, data).await
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        validate_bucket_name(bucket)?;
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }
}

/// Local filesystem storage: one directory per bucket under `root`
#[derive(Debug)]
pub struct FileObjectStore {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

impl FileObjectStore {
    /// Create filesystem storage rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_seq: AtomicU64::new(0),
        }
    }

    /// Hidden temp file name, short whatever the object name length
    fn tmp_name(&self) -> String {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        format!(".{}-{}.tmp", std::process::id(), seq)
    }

    /// Root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        validate_bucket_name(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, object: &str) -> Result<PathBuf> {
        validate_object_name(object)?;
        Ok(self.bucket_path(bucket)?.join(object))
    }
}

fn not_found_or(err: io::Error, what: impl FnOnce() -> String) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::NotFound(what())
    } else {
        Error::Io(err)
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn put(&self, bucket: &str, object: &str, data: Bytes) -> Result<()> {
        let path = self.object_path(bucket, object)?;
        if !fs::try_exists(self.bucket_path(bucket)?).await? {
            return Err(Error::NotFound(format!("bucket '{}'", bucket)));
        }

        // Write to a hidden temp file first so `list` never sees a partial object
        let tmp = self.bucket_path(bucket)?.join(self.tmp_name());
        fs::write(&tmp, &data).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Error::Io(e));
        }

        debug!(bucket, object, bytes = data.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, bucket: &str, object: &str) -> Result<Bytes> {
        let path = self.object_path(bucket, object)?;
        let data = fs::read(&path)
            .await
            .map_err(|e| not_found_or(e, || format!("object '{}/{}'", bucket, object)))?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, bucket: &str, object: &str) -> Result<()> {
        let path = self.object_path(bucket, object)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn list(&self, bucket: &str, limit: usize) -> Result<Vec<String>> {
        let dir = self.bucket_path(bucket)?;
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| not_found_or(e, || format!("bucket '{}'", bucket)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }

        names.sort();
        names.truncate(limit);
        Ok(names)
    }

    async fn copy(
        &self,
        dst_bucket: &str,
        dst_object: &str,
        src_bucket: &str,
        src_object: &str,
    ) -> Result<()> {
        let data = self.get(src_bucket, src_object).await?;
        self.put(dst_bucket, dst_object, data).await
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let path = self.bucket_path(bucket)?;
        Ok(fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false))
    }

    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        let path = self.bucket_path(bucket)?;
        fs::create_dir_all(&path).await?;
        Ok(())
    }
}
