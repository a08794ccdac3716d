//! Identity resolver
//!
//! Fills the drug links (and for sale-in datasets the supplier address links)
//! of a canonical record list from the shared registry. Each kind of link is
//! fetched in one pipelined batch for the whole list.

pub mod keys;
mod registry;
pub mod seed;

pub use registry::{Registry, AUTH_KEY, STAT_KEY};
pub use seed::{seed_registry, RegistrySeed, SeedCounts, SeedError};

use crate::model::{LinkParseError, MetaRecord, Records};
use crate::normalizer::{tags, Country};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Resolver errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown submitter '{0}'")]
    UnknownSubmitter(String),

    #[error("no data")]
    NoData,

    #[error("registry key {key} holds a malformed link: {source}")]
    BadLink {
        key: String,
        source: LinkParseError,
    },

    #[error("registry returned {actual} replies for {expected} commands")]
    ShortReply { expected: usize, actual: usize },

    #[error("registry unavailable: {0}")]
    Registry(#[from] salesgate_common::Error),
}

/// Outcome of one resolver pass
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Records in the list
    pub total: usize,
    /// Records with a non-zero drug link
    pub drugs: usize,
    /// Records with a non-zero address link, when address resolution ran
    pub addrs: Option<usize>,
    /// Wall time of the pass
    pub elapsed: Duration,
}

impl Resolution {
    /// Human-readable summary: `drug: x/n; addr: y/n; time: Nms`
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("drug: {}/{}", self.drugs, self.total)];
        if let Some(addrs) = self.addrs {
            parts.push(format!("addr: {}/{}", addrs, self.total));
        }
        parts.push(format!("time: {}ms", self.elapsed.as_millis()));
        parts.join("; ")
    }
}

/// Resolve every link of `records` in place
///
/// The submitter (`meta.auth`) must be registered. Unknown names are not an
/// error: they keep a zero link. A list with no records fails with
/// [`Error::NoData`]. On success `meta.summary` holds [`Resolution::summary`].
pub async fn resolve_links(
    registry: &Registry,
    records: &mut Records,
    meta: &mut MetaRecord,
) -> Result<Resolution, Error> {
    let started = Instant::now();

    if registry.auth_name(&meta.auth).await?.is_none() {
        return Err(Error::UnknownSubmitter(meta.auth.clone()));
    }

    let country = Country::from_tag(&meta.htag).unwrap_or(Country::Ua);
    let drugs = resolve_drugs(registry, records, country).await?;

    let total = records.len();
    if total == 0 {
        return Err(Error::NoData);
    }

    let addrs = if tags::is_sale_in(&meta.htag) {
        resolve_addrs(registry, records).await?
    } else {
        None
    };

    if meta.has_point_of_sale() {
        let key = keys::hash_key(&keys::point_of_sale_key_source(meta));
        if let Some(link) = registry.addr_links(&[key]).await?.pop() {
            meta.link = link;
        }
    }

    let resolution = Resolution {
        total,
        drugs,
        addrs,
        elapsed: started.elapsed(),
    };
    meta.summary = resolution.summary();
    debug!(uuid = %meta.uuid, summary = %meta.summary, "Resolved links");
    Ok(resolution)
}

async fn resolve_drugs(registry: &Registry, records: &mut Records, country: Country) -> Result<usize, Error> {
    let lookup: Vec<String> = {
        let view = records.drugs();
        (0..view.len())
            .map(|i| keys::drug_key(view.drug_name(i), country))
            .collect()
    };

    let links = registry.drug_links(&lookup).await?;

    let view = records.drugs_mut();
    let mut resolved = 0;
    for (i, link) in links.into_iter().enumerate() {
        if !link.is_zero() {
            resolved += 1;
        }
        view.set_drug_link(i, link);
    }
    Ok(resolved)
}

async fn resolve_addrs(registry: &Registry, records: &mut Records) -> Result<Option<usize>, Error> {
    let lookup: Vec<String> = match records.suppliers_mut() {
        Some(view) => (0..view.len())
            .map(|i| keys::addr_key(view.supplier_name(i)))
            .collect(),
        None => return Ok(None),
    };

    let links = registry.addr_links(&lookup).await?;

    let Some(view) = records.suppliers_mut() else {
        return Ok(None);
    };
    let mut resolved = 0;
    for (i, link) in links.into_iter().enumerate() {
        if !link.is_zero() {
            resolved += 1;
        }
        view.set_addr_link(i, link);
    }
    Ok(Some(resolved))
}
