//! Pipeline error taxonomy
//!
//! Every stage failure is wrapped in a [`StageError`] carrying the envelope,
//! the stage that failed and the error class. The message is kept verbatim;
//! it ends up in the diagnostic companion next to the quarantined object.

use crate::relay::EnvelopeRef;
use crate::{codec, normalizer, resolver};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error class of a stage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Corrupt container, missing entry, unreadable metadata
    Structural,
    /// Unknown source tag, malformed date span, no line items
    Validation,
    /// Unknown submitter or registry failure
    Identity,
    /// Object store, bus or key-value store failure
    Infrastructure,
}

/// Pipeline stage of one envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Decode,
    Normalize,
    Resolve,
    Repack,
    Deliver,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Decode => "decode",
            Stage::Normalize => "normalize",
            Stage::Resolve => "resolve",
            Stage::Repack => "repack",
            Stage::Deliver => "deliver",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that know their class
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for codec::Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Structural
    }
}

impl Classify for serde_json::Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Structural
    }
}

impl Classify for normalizer::Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl Classify for resolver::Error {
    fn kind(&self) -> ErrorKind {
        match self {
            resolver::Error::NoData => ErrorKind::Validation,
            resolver::Error::ShortReply { .. } => ErrorKind::Infrastructure,
            resolver::Error::UnknownSubmitter(_)
            | resolver::Error::BadLink { .. }
            | resolver::Error::Registry(_) => ErrorKind::Identity,
        }
    }
}

impl Classify for salesgate_common::Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Infrastructure
    }
}

/// A stage failure for one envelope
#[derive(Debug, Clone, Error)]
#[error("{stage} failed for {envelope}: {message}")]
pub struct StageError {
    pub envelope: EnvelopeRef,
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new<E>(envelope: &EnvelopeRef, stage: Stage, error: E) -> Self
    where
        E: Classify + fmt::Display,
    {
        Self {
            envelope: envelope.clone(),
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
