//! First-generation (version 1) dataset converters
//!
//! Version 1 payloads group line items under a per-group header:
//!
//! ```json
//! {"date": ["01.01.2024", "31.01.2024"],
//!  "data": [{"supp": "Optima", "item": [{"id": "7", "drug": "Aspirin", "qnt": 2, "prc": 1.5}]}]}
//! ```
//!
//! Geography groups name the point of sale (`addr`) and `region` instead of a
//! supplier; Belarus daily items also report remaining stock (`rst`).
//! Conversion is a projection: fields are renamed, never rescaled.

use super::{span, Error};
use crate::model::{Geo, RecordKind, Records, Sale, SaleBy};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Document {
    date: Option<Vec<String>>,
    data: Vec<Group>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Group {
    supp: String,
    addr: String,
    region: String,
    item: Vec<Item>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Item {
    id: String,
    drug: String,
    qnt: f64,
    prc: f64,
    rst: f64,
}

/// Convert a version 1 payload, returning the records and the canonical span
pub fn convert(kind: RecordKind, bytes: &[u8]) -> Result<(Records, Vec<String>), Error> {
    let doc: Document = serde_json::from_slice(bytes).map_err(|source| Error::Json { kind, source })?;
    let span = span::normalize_span(doc.date.as_deref())?;

    let items = doc
        .data
        .iter()
        .flat_map(|group| group.item.iter().map(move |item| (group, item)));

    let records = match kind {
        RecordKind::Sale => Records::Sale(
            items
                .map(|(group, item)| Sale {
                    code: item.id.clone(),
                    name: item.drug.clone(),
                    quant: item.qnt,
                    price: item.prc,
                    supp: group.supp.clone(),
                    ..Default::default()
                })
                .collect(),
        ),
        RecordKind::SaleBy => Records::SaleBy(
            items
                .map(|(_, item)| SaleBy {
                    code: item.id.clone(),
                    name: item.drug.clone(),
                    quant: item.qnt,
                    price: item.prc,
                    rest: item.rst,
                    ..Default::default()
                })
                .collect(),
        ),
        RecordKind::Geo => Records::Geo(
            items
                .map(|(group, item)| Geo {
                    code: item.id.clone(),
                    name: item.drug.clone(),
                    quant: item.qnt,
                    pos: group.addr.clone(),
                    region: group.region.clone(),
                    ..Default::default()
                })
                .collect(),
        ),
    };

    Ok((records, span))
}
