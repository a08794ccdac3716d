//! Registry seed file
//!
//! A TOML file of registry entries applied at startup, so a relay running on
//! an in-process key-value store knows its submitters and identities:
//!
//! ```toml
//! [[auth]]
//! id = "key-1"
//! name = "Apteka LLC"
//!
//! [[stat]]
//! id = 1
//! name = "active"
//!
//! [[drug]]
//! name = "Aspirin 500mg"
//! country = "ua"
//! link = 11
//! drug = 101
//!
//! [[addr]]
//! name = "Optima-Pharm"
//! link = 5
//! code = "40012345"
//!
//! [[point_of_sale]]
//! name = "Pharmacy #12"
//! head = "Apteka LLC"
//! address = "Lviv, Rynok 1"
//! link = 9
//! ```

use super::{keys, Error, Registry};
use crate::model::{AddrLink, DrugLink, MetaRecord};
use crate::normalizer::Country;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("cannot read registry seed {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot parse registry seed {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("cannot apply registry seed: {0}")]
    Registry(#[from] Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatEntry {
    pub id: i64,
    pub name: String,
}

/// Drug link keyed by display name and country
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DrugEntry {
    pub name: String,
    #[serde(default)]
    pub country: Country,
    #[serde(flatten)]
    pub link: DrugLink,
}

/// Address link keyed by supplier name
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddrEntry {
    pub name: String,
    #[serde(flatten)]
    pub link: AddrLink,
}

/// Address link keyed by a submitter's own point of sale
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointOfSaleEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub head: String,
    #[serde(default)]
    pub address: String,
    #[serde(flatten)]
    pub link: AddrLink,
}

/// Parsed seed file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistrySeed {
    pub auth: Vec<AuthEntry>,
    pub stat: Vec<StatEntry>,
    pub drug: Vec<DrugEntry>,
    pub addr: Vec<AddrEntry>,
    pub point_of_sale: Vec<PointOfSaleEntry>,
}

/// Entries written by [`RegistrySeed::apply`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedCounts {
    pub auth: usize,
    pub stat: usize,
    pub drugs: usize,
    pub addrs: usize,
    pub points_of_sale: usize,
}

impl fmt::Display for SeedCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "auth: {}; stat: {}; drug: {}; addr: {}; pos: {}",
            self.auth, self.stat, self.drugs, self.addrs, self.points_of_sale
        )
    }
}

impl RegistrySeed {
    /// Parse seed TOML; `path` only labels errors
    pub fn parse(content: &str, path: &Path) -> Result<Self, SeedError> {
        toml::from_str(content).map_err(|source| SeedError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write every entry through the registry admin operations
    pub async fn apply(&self, registry: &Registry) -> Result<SeedCounts, Error> {
        let auth: Vec<_> = self
            .auth
            .iter()
            .map(|e| (e.id.clone(), e.name.clone()))
            .collect();
        registry.register_auth(&auth).await?;

        let stat: Vec<_> = self.stat.iter().map(|e| (e.id, e.name.clone())).collect();
        registry.register_stat(&stat).await?;

        let mut by_country: BTreeMap<Country, Vec<(String, DrugLink)>> = BTreeMap::new();
        for entry in &self.drug {
            by_country
                .entry(entry.country)
                .or_default()
                .push((entry.name.clone(), entry.link));
        }
        for (country, links) in &by_country {
            registry.store_drug_links(*country, links).await?;
        }

        let addrs: Vec<_> = self
            .addr
            .iter()
            .map(|e| (e.name.clone(), e.link.clone()))
            .collect();
        registry.store_addr_links(&addrs).await?;

        for entry in &self.point_of_sale {
            let meta = MetaRecord {
                name: entry.name.clone(),
                head: entry.head.clone(),
                addr: entry.address.clone(),
                ..Default::default()
            };
            registry
                .store_addr_link_for_source(&keys::point_of_sale_key_source(&meta), &entry.link)
                .await?;
        }

        Ok(SeedCounts {
            auth: auth.len(),
            stat: stat.len(),
            drugs: self.drug.len(),
            addrs: addrs.len(),
            points_of_sale: self.point_of_sale.len(),
        })
    }
}

/// Read the seed file at `path` and apply it to `registry`
pub async fn seed_registry(registry: &Registry, path: &Path) -> Result<SeedCounts, SeedError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let counts = RegistrySeed::parse(&content, path)?.apply(registry).await?;
    info!(path = %path.display(), %counts, "Seeded registry");
    Ok(counts)
}
