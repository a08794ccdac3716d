//! Shared identity registry
//!
//! Layout in the key-value store:
//! - drug and address links: hash field-maps under their content-hash key
//! - submitter names: hash `auth`, field = submitter id
//! - status names: hash `stat`, field = status id

use super::keys;
use super::Error;
use crate::model::{AddrLink, DrugLink};
use crate::normalizer::Country;
use salesgate_common::kv::{KeyValueStore, Pipeline};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Hash of submitter names
pub const AUTH_KEY: &str = "auth";

/// Hash of status names
pub const STAT_KEY: &str = "stat";

/// Registry handle over a shared key-value store
#[derive(Debug, Clone)]
pub struct Registry {
    kv: Arc<dyn KeyValueStore>,
}

impl Registry {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Name registered for a submitter id
    pub async fn auth_name(&self, id: &str) -> Result<Option<String>, Error> {
        self.hash_field(AUTH_KEY, id).await
    }

    /// Advisory submitter check; never fails
    pub async fn is_authorized(&self, id: &str) -> bool {
        if id.trim().is_empty() {
            return false;
        }
        match self.auth_name(id).await {
            Ok(name) => name.is_some(),
            Err(e) => {
                warn!(id, error = %e, "Submitter lookup failed");
                false
            }
        }
    }

    /// Name registered for a status id
    pub async fn stat_name(&self, id: i64) -> Result<Option<String>, Error> {
        self.hash_field(STAT_KEY, &id.to_string()).await
    }

    async fn hash_field(&self, key: &str, field: &str) -> Result<Option<String>, Error> {
        let mut pipeline = Pipeline::new();
        pipeline.hget(key, field);
        let reply = self.single(pipeline).await?;
        Ok(reply.into_string()?)
    }

    async fn single(&self, pipeline: Pipeline) -> Result<salesgate_common::kv::Reply, Error> {
        self.kv
            .execute(pipeline)
            .await?
            .into_iter()
            .next()
            .ok_or(Error::ShortReply {
                expected: 1,
                actual: 0,
            })
    }

    async fn field_maps(&self, keys: &[String]) -> Result<Vec<HashMap<String, String>>, Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipeline = Pipeline::new();
        for key in keys {
            pipeline.hgetall(key.as_str());
        }

        let replies = self.kv.execute(pipeline).await?;
        if replies.len() != keys.len() {
            return Err(Error::ShortReply {
                expected: keys.len(),
                actual: replies.len(),
            });
        }
        debug!(keys = keys.len(), "Registry batch lookup");

        replies
            .into_iter()
            .map(|reply| reply.into_map().map_err(Error::from))
            .collect()
    }

    /// Drug links for `keys`, in key order; unknown keys give zero links
    pub async fn drug_links(&self, keys: &[String]) -> Result<Vec<DrugLink>, Error> {
        self.field_maps(keys)
            .await?
            .iter()
            .zip(keys)
            .map(|(fields, key)| {
                DrugLink::from_fields(fields).map_err(|source| Error::BadLink {
                    key: key.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Address links for `keys`, in key order; unknown keys give zero links
    pub async fn addr_links(&self, keys: &[String]) -> Result<Vec<AddrLink>, Error> {
        self.field_maps(keys)
            .await?
            .iter()
            .zip(keys)
            .map(|(fields, key)| {
                AddrLink::from_fields(fields).map_err(|source| Error::BadLink {
                    key: key.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Store drug links by display name in one batch
    pub async fn store_drug_links(
        &self,
        country: Country,
        links: &[(String, DrugLink)],
    ) -> Result<(), Error> {
        let mut pipeline = Pipeline::new();
        for (name, link) in links {
            pipeline.hset(keys::drug_key(name, country), link.to_fields());
        }
        self.write(pipeline).await
    }

    /// Store address links by supplier name in one batch
    pub async fn store_addr_links(&self, links: &[(String, AddrLink)]) -> Result<(), Error> {
        let mut pipeline = Pipeline::new();
        for (supplier, link) in links {
            pipeline.hset(keys::addr_key(supplier), link.to_fields());
        }
        self.write(pipeline).await
    }

    /// Store a link for a raw key source (used for composed point-of-sale names)
    pub async fn store_addr_link_for_source(&self, source: &str, link: &AddrLink) -> Result<(), Error> {
        let mut pipeline = Pipeline::new();
        pipeline.hset(keys::hash_key(source), link.to_fields());
        self.write(pipeline).await
    }

    /// Register submitter names in one batch
    pub async fn register_auth(&self, entries: &[(String, String)]) -> Result<(), Error> {
        self.write_names(AUTH_KEY, entries).await
    }

    /// Register status names in one batch
    pub async fn register_stat(&self, entries: &[(i64, String)]) -> Result<(), Error> {
        let entries: Vec<_> = entries
            .iter()
            .map(|(id, name)| (id.to_string(), name.clone()))
            .collect();
        self.write_names(STAT_KEY, &entries).await
    }

    async fn write_names(&self, key: &str, entries: &[(String, String)]) -> Result<(), Error> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipeline = Pipeline::new();
        pipeline.hset(key, entries.to_vec());
        self.write(pipeline).await
    }

    async fn write(&self, pipeline: Pipeline) -> Result<(), Error> {
        if pipeline.is_empty() {
            return Ok(());
        }
        self.kv.execute(pipeline).await?;
        Ok(())
    }
}
