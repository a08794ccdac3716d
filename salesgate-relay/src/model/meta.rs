//! Submission metadata

use super::AddrLink;
use serde::{Deserialize, Serialize};

/// Canonical metadata for one submission
///
/// Built from the container's `meta` entry at the start of a pipeline pass and
/// filled in stage by stage. Only the audit log keeps a copy afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaRecord {
    /// Submission UUID
    pub uuid: String,
    /// Submitter identity id
    pub auth: String,
    /// Source host
    pub host: String,
    /// Source user agent
    pub user_agent: String,
    /// Submission timestamp as received
    pub time: String,
    /// Submission timestamp, epoch seconds
    pub unix: i64,
    /// Source tag (schema generation + dataset family/periodicity/country)
    pub htag: String,
    /// Normalized `[from, to]` span for time-series datasets
    pub span: Vec<String>,
    /// Display nickname
    pub nick: String,
    /// Point-of-sale name
    pub name: String,
    /// Point-of-sale head office
    pub head: String,
    /// Point-of-sale address
    pub addr: String,
    /// Registry code of the point of sale
    pub code: String,
    /// Resolved point-of-sale address link
    pub link: AddrLink,
    /// Conversion provenance (set when a legacy tag was migrated)
    pub ctag: String,
    /// Content MD5 (hex) of the cleaned data bytes
    pub etag: String,
    /// Size of the cleaned data bytes
    pub size: u64,
    /// Processing summary written by the resolver
    #[serde(rename = "proc")]
    pub summary: String,
    /// Failure message when the pass ended in the error bucket
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
}

impl MetaRecord {
    /// Derive the display nickname from the source fields
    ///
    /// `head: name` when both are present, otherwise whichever one is, falling
    /// back to the submitter id.
    pub fn derive_nick(&mut self) {
        let name = self.name.trim();
        let head = self.head.trim();
        self.nick = match (head.is_empty(), name.is_empty()) {
            (false, false) if head != name => format!("{}: {}", head, name),
            (false, _) => head.to_string(),
            (true, false) => name.to_string(),
            (true, true) => self.auth.trim().to_string(),
        };
    }

    /// Fill `unix` from the RFC 3339 `time` when the producer left it zero
    pub fn backfill_epoch(&mut self) {
        if self.unix == 0 {
            if let Some(epoch) = salesgate_common::time::parse_epoch(&self.time) {
                self.unix = epoch;
            }
        }
    }

    /// True when the record names a point of sale of its own
    pub fn has_point_of_sale(&self) -> bool {
        !(self.name.trim().is_empty() && self.head.trim().is_empty() && self.addr.trim().is_empty())
    }
}
