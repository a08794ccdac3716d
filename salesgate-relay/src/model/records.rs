//! Canonical (version 3) line items
//!
//! Three shapes exist. Every shape embeds a [`DrugLink`]; only `Sale` names a
//! supplier and carries an [`AddrLink`]. The resolver works on whole lists
//! through the [`DrugNameable`] and [`SupplierNameable`] capabilities, so it
//! never needs to know which shape it holds.

use super::{AddrLink, DrugLink};
use serde::{Deserialize, Serialize};

/// Sale line item (sale-in / sale-out datasets)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sale {
    /// Producer's item identifier
    pub code: String,
    /// Drug display name
    pub name: String,
    /// Quantity
    pub quant: f64,
    /// Unit price
    pub price: f64,
    /// Supplier name
    pub supp: String,
    /// Resolved drug identity
    pub drug_link: DrugLink,
    /// Resolved supplier identity
    pub addr_link: AddrLink,
}

/// Daily Belarus sale line item, reported with remaining stock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleBy {
    /// Producer's item identifier
    pub code: String,
    /// Drug display name
    pub name: String,
    /// Quantity sold
    pub quant: f64,
    /// Unit price
    pub price: f64,
    /// Remaining stock
    pub rest: f64,
    /// Resolved drug identity
    pub drug_link: DrugLink,
}

/// Geography line item: where a drug was sold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geo {
    /// Producer's item identifier
    pub code: String,
    /// Drug display name
    pub name: String,
    /// Quantity
    pub quant: f64,
    /// Point-of-sale address text
    pub pos: String,
    /// Region name
    pub region: String,
    /// Resolved drug identity
    pub drug_link: DrugLink,
}

/// Access to the drug-facing fields of one line item
pub trait LineItem {
    /// Display name used for drug matching
    fn name(&self) -> &str;
    /// Current drug link
    fn drug_link(&self) -> &DrugLink;
    /// Replace the drug link
    fn set_drug_link(&mut self, link: DrugLink);
}

macro_rules! line_item {
    ($ty:ty) => {
        impl LineItem for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn drug_link(&self) -> &DrugLink {
                &self.drug_link
            }

            fn set_drug_link(&mut self, link: DrugLink) {
                self.drug_link = link;
            }
        }
    };
}

line_item!(Sale);
line_item!(SaleBy);
line_item!(Geo);

/// A record list whose items can be matched to drugs by name
pub trait DrugNameable {
    /// Number of records
    fn len(&self) -> usize;

    /// True when the list is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display name of record `index`
    fn drug_name(&self, index: usize) -> &str;

    /// Set the drug link of record `index`
    fn set_drug_link(&mut self, index: usize, link: DrugLink);
}

impl<T: LineItem> DrugNameable for Vec<T> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn drug_name(&self, index: usize) -> &str {
        self[index].name()
    }

    fn set_drug_link(&mut self, index: usize, link: DrugLink) {
        self[index].set_drug_link(link);
    }
}

/// A record list whose items can be matched to suppliers by name
pub trait SupplierNameable {
    /// Number of records
    fn len(&self) -> usize;

    /// True when the list is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Supplier name of record `index`
    fn supplier_name(&self, index: usize) -> &str;

    /// Set the address link of record `index`
    fn set_addr_link(&mut self, index: usize, link: AddrLink);
}

impl SupplierNameable for Vec<Sale> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn supplier_name(&self, index: usize) -> &str {
        &self[index].supp
    }

    fn set_addr_link(&mut self, index: usize, link: AddrLink) {
        self[index].addr_link = link;
    }
}

/// Record shape selected from the source tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Sale,
    SaleBy,
    Geo,
}

impl RecordKind {
    /// Classify a (current, dotted) source tag
    pub fn classify(tag: &str) -> Self {
        if tag.contains("geo") {
            RecordKind::Geo
        } else if tag.contains("daily.by") {
            RecordKind::SaleBy
        } else {
            RecordKind::Sale
        }
    }
}

/// Canonical record list, one variant per shape
///
/// Serializes as a plain JSON array of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Records {
    Sale(Vec<Sale>),
    SaleBy(Vec<SaleBy>),
    Geo(Vec<Geo>),
}

impl Records {
    /// Empty list of the given shape
    pub fn empty(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Sale => Records::Sale(Vec::new()),
            RecordKind::SaleBy => Records::SaleBy(Vec::new()),
            RecordKind::Geo => Records::Geo(Vec::new()),
        }
    }

    /// Decode a canonical JSON array of the given shape
    pub fn from_json(kind: RecordKind, bytes: &[u8]) -> serde_json::Result<Self> {
        Ok(match kind {
            RecordKind::Sale => Records::Sale(serde_json::from_slice(bytes)?),
            RecordKind::SaleBy => Records::SaleBy(serde_json::from_slice(bytes)?),
            RecordKind::Geo => Records::Geo(serde_json::from_slice(bytes)?),
        })
    }

    /// Encode as a canonical JSON array
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Shape of this list
    pub fn kind(&self) -> RecordKind {
        match self {
            Records::Sale(_) => RecordKind::Sale,
            Records::SaleBy(_) => RecordKind::SaleBy,
            Records::Geo(_) => RecordKind::Geo,
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.drugs().len()
    }

    /// True when there are no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drug-matching view of the list
    pub fn drugs(&self) -> &dyn DrugNameable {
        match self {
            Records::Sale(v) => v,
            Records::SaleBy(v) => v,
            Records::Geo(v) => v,
        }
    }

    /// Mutable drug-matching view of the list
    pub fn drugs_mut(&mut self) -> &mut dyn DrugNameable {
        match self {
            Records::Sale(v) => v,
            Records::SaleBy(v) => v,
            Records::Geo(v) => v,
        }
    }

    /// Mutable supplier-matching view, only for shapes that name suppliers
    pub fn suppliers_mut(&mut self) -> Option<&mut dyn SupplierNameable> {
        match self {
            Records::Sale(v) => Some(v as &mut dyn SupplierNameable),
            Records::SaleBy(_) | Records::Geo(_) => None,
        }
    }

    /// Drug links in record order
    pub fn drug_links(&self) -> Vec<DrugLink> {
        match self {
            Records::Sale(v) => v.iter().map(|r| *r.drug_link()).collect(),
            Records::SaleBy(v) => v.iter().map(|r| *r.drug_link()).collect(),
            Records::Geo(v) => v.iter().map(|r| *r.drug_link()).collect(),
        }
    }
}
