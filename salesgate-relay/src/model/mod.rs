//! Canonical data model
//!
//! - [`MetaRecord`]: per-submission metadata carried through one pipeline pass
//! - [`Records`]: the canonical (version 3) line items, one of three shapes
//! - [`DrugLink`] / [`AddrLink`]: registry identities resolved by content hash

pub mod links;
pub mod meta;
pub mod records;

pub use links::{AddrLink, DrugLink, LinkParseError};
pub use meta::MetaRecord;
pub use records::{
    DrugNameable, Geo, LineItem, RecordKind, Records, Sale, SaleBy, SupplierNameable,
};
