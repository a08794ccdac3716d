//! One pipeline pass over one envelope
//!
//! `fetch → decode → normalize → resolve → repack → deliver`. A failure after
//! the fetch moves the envelope to the error bucket: the original container is
//! copied there with a `<object>.error.json` companion and the inbound source
//! is removed.

use super::{EnvelopeRef, RelayContext};
use crate::error::{ErrorKind, Stage, StageError};
use crate::model::{MetaRecord, Records};
use crate::{codec, normalizer, resolver};
use bytes::Bytes;
use salesgate_common::object_store::MAX_OBJECT_NAME_LEN;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Suffix of the diagnostic companion written next to a quarantined object
pub const ERROR_SUFFIX: &str = ".error.json";

/// Name of the diagnostic companion for `object`
///
/// Names too long to take the suffix are cut at a character boundary; the
/// companion body still carries the full object name.
pub fn companion_name(object: &str) -> String {
    let mut end = object.len().min(MAX_OBJECT_NAME_LEN - ERROR_SUFFIX.len());
    while !object.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &object[..end], ERROR_SUFFIX)
}

/// Terminal state of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Normalized container written to the outbound bucket
    Delivered { uuid: String },
    /// Original moved to the error bucket
    Errored { stage: Stage, kind: ErrorKind },
    /// Nothing done: the object was gone or could not be read
    Skipped,
}

/// Content of the `<object>.error.json` companion
#[derive(Debug, Serialize)]
struct Diagnostic<'a> {
    bucket: &'a str,
    object: &'a str,
    stage: Stage,
    kind: ErrorKind,
    error: &'a str,
    meta: Option<&'a MetaRecord>,
}

struct Decoded {
    meta: MetaRecord,
    data: Vec<u8>,
}

/// Metadata captured so far, for the error companion and the audit entry
#[derive(Default)]
struct Captured {
    /// As read from the container
    original: Option<MetaRecord>,
    /// As processed up to the failing stage
    current: Option<MetaRecord>,
}

/// Run the full pipeline for `envelope`
pub async fn process(ctx: &RelayContext, envelope: &EnvelopeRef) -> Outcome {
    let raw = match ctx.store.get(&envelope.bucket, &envelope.object).await {
        Ok(raw) => raw,
        Err(e) if e.is_not_found() => {
            debug!(envelope = %envelope, "Envelope already gone");
            return Outcome::Skipped;
        }
        Err(e) => {
            warn!(envelope = %envelope, error = %e, "Fetch failed, leaving envelope for the next republish");
            return Outcome::Skipped;
        }
    };
    debug!(envelope = %envelope, size = raw.len(), "Fetched envelope");

    let mut captured = Captured::default();
    match run_stages(ctx, envelope, &raw, &mut captured).await {
        Ok(uuid) => Outcome::Delivered { uuid },
        Err(err) => {
            let outcome = Outcome::Errored {
                stage: err.stage,
                kind: err.kind,
            };
            quarantine(ctx, envelope, raw, captured, &err).await;
            outcome
        }
    }
}

async fn run_stages(
    ctx: &RelayContext,
    envelope: &EnvelopeRef,
    raw: &Bytes,
    captured: &mut Captured,
) -> Result<String, StageError> {
    let Decoded { meta, data } = decode(envelope, raw, &mut captured.original)?;
    let meta = captured.current.insert(meta);

    let mut records = normalize(envelope, &data, meta)?;
    resolve(ctx, envelope, &mut records, meta).await?;
    let container = repack(envelope, &records, meta)?;
    deliver(ctx, envelope, container, meta).await?;

    Ok(meta.uuid.clone())
}

fn decode(
    envelope: &EnvelopeRef,
    raw: &Bytes,
    original: &mut Option<MetaRecord>,
) -> Result<Decoded, StageError> {
    let (meta, data) = codec::unpack(&raw[..], false, false)
        .map_err(|e| StageError::new(envelope, Stage::Decode, e))?;
    let mut meta: MetaRecord = serde_json::from_slice(&meta)
        .map_err(|e| StageError::new(envelope, Stage::Decode, e))?;
    *original = Some(meta.clone());

    if meta.uuid.trim().is_empty() {
        meta.uuid = Uuid::new_v4().to_string();
    }
    meta.backfill_epoch();
    Ok(Decoded { meta, data })
}

fn normalize(envelope: &EnvelopeRef, data: &[u8], meta: &mut MetaRecord) -> Result<Records, StageError> {
    let source_tag = meta.htag.clone();
    normalizer::normalize(&source_tag, data, meta)
        .map_err(|e| StageError::new(envelope, Stage::Normalize, e))
}

async fn resolve(
    ctx: &RelayContext,
    envelope: &EnvelopeRef,
    records: &mut Records,
    meta: &mut MetaRecord,
) -> Result<(), StageError> {
    resolver::resolve_links(&ctx.registry, records, meta)
        .await
        .map(|_| ())
        .map_err(|e| StageError::new(envelope, Stage::Resolve, e))
}

fn repack(envelope: &EnvelopeRef, records: &Records, meta: &MetaRecord) -> Result<Bytes, StageError> {
    let data = records
        .to_json()
        .map_err(|e| StageError::new(envelope, Stage::Repack, e))?;
    let meta = serde_json::to_vec(meta).map_err(|e| StageError::new(envelope, Stage::Repack, e))?;
    codec::pack(&meta, &data).map_err(|e| StageError::new(envelope, Stage::Repack, e))
}

async fn deliver(
    ctx: &RelayContext,
    envelope: &EnvelopeRef,
    container: Bytes,
    meta: &MetaRecord,
) -> Result<(), StageError> {
    let settings = &ctx.settings;
    ctx.store
        .put(&settings.outbound_bucket, &envelope.object, container)
        .await
        .map_err(|e| StageError::new(envelope, Stage::Deliver, e))?;

    // A crash or failure here leaves the source for redelivery
    if let Err(e) = ctx.store.delete(&envelope.bucket, &envelope.object).await {
        warn!(envelope = %envelope, error = %e, "Delivered but could not remove source");
    }

    info!(
        envelope = %envelope,
        uuid = %meta.uuid,
        htag = %meta.htag,
        summary = %meta.summary,
        "Delivered envelope"
    );

    if let Err(e) = ctx.audit.record(meta).await {
        warn!(uuid = %meta.uuid, error = %e, "Audit write failed");
    }
    Ok(())
}

async fn quarantine(
    ctx: &RelayContext,
    envelope: &EnvelopeRef,
    raw: Bytes,
    captured: Captured,
    err: &StageError,
) {
    let Captured {
        original,
        current: mut meta,
    } = captured;

    error!(
        envelope = %envelope,
        stage = %err.stage,
        kind = ?err.kind,
        error = %err.message,
        "Pipeline failed, moving envelope to the error bucket"
    );

    if let Some(meta) = meta.as_mut() {
        meta.fail = Some(err.message.clone());
    }

    let error_bucket = &ctx.settings.error_bucket;
    let preserved = match ctx
        .store
        .copy(error_bucket, &envelope.object, &envelope.bucket, &envelope.object)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!(envelope = %envelope, error = %e, "Copy to error bucket failed, writing fetched bytes");
            match ctx.store.put(error_bucket, &envelope.object, raw).await {
                Ok(()) => true,
                Err(e) => {
                    error!(envelope = %envelope, error = %e, "Could not preserve failed envelope");
                    false
                }
            }
        }
    };

    let diagnostic = Diagnostic {
        bucket: &envelope.bucket,
        object: &envelope.object,
        stage: err.stage,
        kind: err.kind,
        error: &err.message,
        meta: original.as_ref(),
    };
    match serde_json::to_vec_pretty(&diagnostic) {
        Ok(body) => {
            let companion = companion_name(&envelope.object);
            if let Err(e) = ctx.store.put(error_bucket, &companion, Bytes::from(body)).await {
                warn!(envelope = %envelope, error = %e, "Could not write error companion");
            }
        }
        Err(e) => warn!(envelope = %envelope, error = %e, "Could not encode error companion"),
    }

    // The source is only removed once the error bucket holds a copy
    if preserved {
        if let Err(e) = ctx.store.delete(&envelope.bucket, &envelope.object).await {
            warn!(envelope = %envelope, error = %e, "Could not remove failed source");
        }
    }

    if let Some(meta) = meta.as_ref() {
        if let Err(e) = ctx.audit.record(meta).await {
            warn!(uuid = %meta.uuid, error = %e, "Audit write failed");
        }
    }
}
