//! Registry link records
//!
//! Links are stored in the registry as hash field-maps under a content-hash
//! key, using single-letter field codes. A link whose ids are all zero means
//! "unresolved"; that is a normal outcome, not an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A registry field held a value that is not an integer
#[derive(Debug, Error, PartialEq, Eq)]
#[error("registry field '{field}' holds non-integer value '{value}'")]
pub struct LinkParseError {
    pub field: &'static str,
    pub value: String,
}

fn int_field(fields: &HashMap<String, String>, field: &'static str) -> Result<i64, LinkParseError> {
    match fields.get(field).map(|v| v.trim()) {
        None | Some("") => Ok(0),
        Some(value) => value.parse().map_err(|_| LinkParseError {
            field,
            value: value.to_string(),
        }),
    }
}

/// Drug identity (field codes `l`, `d`, `b`, `c`, `s`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrugLink {
    /// Link id
    pub link: i64,
    /// Drug id
    pub drug: i64,
    /// Brand id
    pub brand: i64,
    /// Category id
    pub catg: i64,
    /// Status id
    pub stat: i64,
}

impl DrugLink {
    /// True when the link is unresolved
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Decode a registry field-map; an empty map yields the zero link
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, LinkParseError> {
        Ok(Self {
            link: int_field(fields, "l")?,
            drug: int_field(fields, "d")?,
            brand: int_field(fields, "b")?,
            catg: int_field(fields, "c")?,
            stat: int_field(fields, "s")?,
        })
    }

    /// Encode as registry fields
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("l".to_string(), self.link.to_string()),
            ("d".to_string(), self.drug.to_string()),
            ("b".to_string(), self.brand.to_string()),
            ("c".to_string(), self.catg.to_string()),
            ("s".to_string(), self.stat.to_string()),
        ]
    }
}

/// Point-of-sale / address identity (field codes `l`, `a`, `s`, `e`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddrLink {
    /// Link id
    pub link: i64,
    /// Address id
    pub addr: i64,
    /// Status id
    pub stat: i64,
    /// External registry code
    pub code: String,
}

impl AddrLink {
    /// True when the link is unresolved
    pub fn is_zero(&self) -> bool {
        self.link == 0 && self.addr == 0 && self.stat == 0 && self.code.is_empty()
    }

    /// Decode a registry field-map; an empty map yields the zero link
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, LinkParseError> {
        Ok(Self {
            link: int_field(fields, "l")?,
            addr: int_field(fields, "a")?,
            stat: int_field(fields, "s")?,
            code: fields.get("e").map(|v| v.trim().to_string()).unwrap_or_default(),
        })
    }

    /// Encode as registry fields
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("l".to_string(), self.link.to_string()),
            ("a".to_string(), self.addr.to_string()),
            ("s".to_string(), self.stat.to_string()),
            ("e".to_string(), self.code.clone()),
        ]
    }
}
