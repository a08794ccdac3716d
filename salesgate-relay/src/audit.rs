//! Audit log
//!
//! One gzip-compressed JSON snapshot of the metadata record per submission,
//! stored under `audit:<uuid>` with a retention TTL, and a sorted-set index
//! `audit:index` scored by the submission's epoch seconds, or by the time of
//! recording when the submission carries no usable timestamp.

use crate::codec;
use crate::model::MetaRecord;
use bytes::Bytes;
use chrono::Utc;
use salesgate_common::kv::{KeyValueStore, Pipeline};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Sorted set of audited UUIDs
pub const INDEX_KEY: &str = "audit:index";

/// Default retention of audit snapshots
pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum Error {
    #[error("audit entry has no uuid")]
    MissingUuid,

    #[error("audit snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("audit snapshot gzip error: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("audit store unavailable: {0}")]
    Store(#[from] salesgate_common::Error),
}

/// Key of one audit snapshot
pub fn entry_key(uuid: &str) -> String {
    format!("audit:{}", uuid)
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl AuditLog {
    pub fn new(kv: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Store a snapshot of `meta` and index it by `meta.unix`
    ///
    /// A zero `unix` is indexed at the current time instead.
    pub async fn record(&self, meta: &MetaRecord) -> Result<(), Error> {
        if meta.uuid.is_empty() {
            return Err(Error::MissingUuid);
        }
        let blob = codec::gzip(&serde_json::to_vec(meta)?)?;
        self.kv
            .set(&entry_key(&meta.uuid), Bytes::from(blob), Some(self.ttl))
            .await?;
        let score = if meta.unix > 0 {
            meta.unix
        } else {
            Utc::now().timestamp()
        };
        self.kv.zadd(INDEX_KEY, score as f64, &meta.uuid).await?;
        Ok(())
    }

    /// Snapshot for one submission, `None` once expired or never recorded
    pub async fn get(&self, uuid: &str) -> Result<Option<MetaRecord>, Error> {
        match self.kv.get(&entry_key(uuid)).await? {
            Some(blob) => Ok(Some(decode(&blob)?)),
            None => Ok(None),
        }
    }

    /// Snapshots indexed within `low..=high`, oldest first
    ///
    /// Expired entries still in the index are skipped, as are snapshots that
    /// no longer decode.
    pub async fn list(&self, low: i64, high: i64) -> Result<Vec<MetaRecord>, Error> {
        let uuids = self
            .kv
            .zrange_by_score(INDEX_KEY, low as f64, high as f64)
            .await?;
        if uuids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipeline = Pipeline::new();
        for uuid in &uuids {
            pipeline.get(entry_key(uuid));
        }
        let replies = self.kv.execute(pipeline).await?;

        let mut out = Vec::with_capacity(uuids.len());
        for (uuid, reply) in uuids.iter().zip(replies) {
            let Some(blob) = reply.into_bytes()? else {
                continue;
            };
            match decode(&blob) {
                Ok(meta) => out.push(meta),
                Err(e) => warn!(uuid = %uuid, error = %e, "Skipping unreadable audit entry"),
            }
        }
        Ok(out)
    }

    /// Drop entries indexed before `before` from the index and the store
    ///
    /// Returns the number of index entries removed.
    pub async fn prune(&self, before: i64) -> Result<usize, Error> {
        let max = before as f64 - 1.0;
        let stale = self
            .kv
            .zrange_by_score(INDEX_KEY, f64::NEG_INFINITY, max)
            .await?;
        if !stale.is_empty() {
            let mut pipeline = Pipeline::new();
            for uuid in &stale {
                pipeline.del(entry_key(uuid));
            }
            self.kv.execute(pipeline).await?;
        }
        Ok(self
            .kv
            .zrem_range_by_score(INDEX_KEY, f64::NEG_INFINITY, max)
            .await?)
    }
}

fn decode(blob: &[u8]) -> Result<MetaRecord, Error> {
    Ok(serde_json::from_slice(&codec::gunzip(blob)?)?)
}
