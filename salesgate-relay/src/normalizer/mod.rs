//! Schema normalizer
//!
//! Turns a dataset payload of any supported schema generation into a
//! canonical record list, filling the content fields of the metadata record
//! on the way.

mod legacy;
mod span;
pub mod tags;

pub use span::normalize_span;
pub use tags::Country;

use crate::model::{MetaRecord, RecordKind, Records};
use md5::{Digest, Md5};
use thiserror::Error;
use tracing::debug;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Normalization errors; all are validation failures of the submission
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown legacy source tag '{0}'")]
    UnknownLegacyTag(String),

    #[error("unknown source tag '{0}'")]
    UnknownTag(String),

    #[error("date span is missing")]
    SpanMissing,

    #[error("date span must have 2 elements, got {0}")]
    SpanLength(usize),

    #[error("date span bound '{0}' matches neither DD.MM.YYYY HH:MM:SS nor DD.MM.YYYY")]
    SpanFormat(String),

    #[error("date span starts at '{from}' after it ends at '{to}'")]
    SpanOrder { from: String, to: String },

    #[error("malformed {kind:?} payload: {source}")]
    Json {
        kind: RecordKind,
        source: serde_json::Error,
    },
}

/// Strip a leading UTF-8 byte-order marker from UTF-8 text
pub fn strip_bom(data: &[u8]) -> &[u8] {
    match data.strip_prefix(UTF8_BOM) {
        Some(rest) if std::str::from_utf8(rest).is_ok() => rest,
        _ => data,
    }
}

/// Hex MD5 of `data`
pub fn content_tag(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// Normalize one dataset payload
///
/// Sets `etag`, `size` and `nick` on `meta`. Legacy tags (prefix `data.`) are
/// migrated: `htag` becomes the current tag, `ctag` records the old one and
/// `span` receives the canonical date span.
pub fn normalize(source_tag: &str, data: &[u8], meta: &mut MetaRecord) -> Result<Records, Error> {
    let data = strip_bom(data);
    meta.etag = content_tag(data);
    meta.size = data.len() as u64;

    let records = if tags::is_legacy(source_tag) {
        let current = tags::migrate(source_tag)
            .ok_or_else(|| Error::UnknownLegacyTag(source_tag.to_string()))?;
        if !tags::is_known(current) {
            return Err(Error::UnknownTag(current.to_string()));
        }

        let kind = RecordKind::classify(current);
        let (records, span) = legacy::convert(kind, data)?;
        debug!(from = source_tag, to = current, ?kind, "Migrated legacy dataset");

        meta.htag = current.to_string();
        meta.ctag = format!("v1:{}", source_tag);
        meta.span = span;
        records
    } else {
        if !tags::is_known(source_tag) {
            return Err(Error::UnknownTag(source_tag.to_string()));
        }
        let kind = RecordKind::classify(source_tag);
        meta.htag = source_tag.to_string();
        Records::from_json(kind, data).map_err(|source| Error::Json { kind, source })?
    };

    meta.derive_nick();
    Ok(records)
}
