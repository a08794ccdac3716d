//! Collaborators, registry seed data and containers for pipeline tests

use bytes::Bytes;
use salesgate_common::bus::LocalBus;
use salesgate_common::config::RelaySettings;
use salesgate_common::kv::InMemoryKeyValueStore;
use salesgate_common::object_store::{InMemoryObjectStore, ObjectStore};
use salesgate_relay::codec;
use salesgate_relay::model::MetaRecord;
use salesgate_relay::{relay, EnvelopeRef, RelayContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Submitter registered in every test registry
pub const SUBMITTER: &str = "key-1";

/// In-memory collaborators wired into a relay context
pub struct TestRelay {
    pub store: Arc<InMemoryObjectStore>,
    pub bus: Arc<LocalBus>,
    pub kv: Arc<InMemoryKeyValueStore>,
    pub ctx: RelayContext,
}

impl TestRelay {
    /// Buckets created, submitter registered
    pub async fn new() -> Self {
        Self::with_settings(RelaySettings::default()).await
    }

    pub async fn with_settings(settings: RelaySettings) -> Self {
        let store = Arc::new(InMemoryObjectStore::new());
        let bus = Arc::new(LocalBus::default());
        let kv = Arc::new(InMemoryKeyValueStore::new());

        for bucket in [
            &settings.inbound_bucket,
            &settings.outbound_bucket,
            &settings.error_bucket,
        ] {
            store.make_bucket(bucket).await.unwrap();
        }

        let ctx = RelayContext::new(store.clone(), bus.clone(), kv.clone(), settings)
            .with_republish_interval(Duration::from_millis(100));
        ctx.registry
            .register_auth(&[(SUBMITTER.to_string(), "Apteka LLC".to_string())])
            .await
            .unwrap();

        Self { store, bus, kv, ctx }
    }

    /// Put a container into the inbound bucket, returning its reference
    pub async fn submit(&self, object: &str, container: Bytes) -> EnvelopeRef {
        let bucket = self.ctx.settings.inbound_bucket.clone();
        self.store.put(&bucket, object, container).await.unwrap();
        EnvelopeRef::new(bucket, object)
    }

    pub async fn objects(&self, bucket: &str) -> Vec<String> {
        self.store.list(bucket, 1000).await.unwrap()
    }

    /// Unpack an outbound object into its metadata and records JSON
    pub async fn outbound(&self, object: &str) -> (MetaRecord, serde_json::Value) {
        let raw = self
            .store
            .get(&self.ctx.settings.outbound_bucket, object)
            .await
            .unwrap();
        let (meta, data) = codec::unpack(&raw[..], false, false).unwrap();
        (
            serde_json::from_slice(&meta).unwrap(),
            serde_json::from_slice(&data).unwrap(),
        )
    }

    /// Companion diagnostic written next to a quarantined object
    pub async fn diagnostic(&self, object: &str) -> serde_json::Value {
        let raw = self
            .store
            .get(&self.ctx.settings.error_bucket, &relay::companion_name(object))
            .await
            .unwrap();
        serde_json::from_slice(&raw).unwrap()
    }
}

/// Metadata entry for a submission from the registered submitter
pub fn native_meta(uuid: &str, htag: &str) -> serde_json::Value {
    json!({
        "uuid": uuid,
        "auth": SUBMITTER,
        "host": "10.0.0.7",
        "user_agent": "report-exporter/2.1",
        "time": "2024-02-01T08:30:00Z",
        "htag": htag,
    })
}

/// Version 1 sale-in payload with one line item per name
pub fn legacy_sale_payload(names: &[&str]) -> Vec<u8> {
    let items: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| json!({"id": (i + 1).to_string(), "drug": name, "qnt": 1, "prc": 2.5}))
        .collect();
    serde_json::to_vec(&json!({
        "date": ["01.01.2024 00:00:00", "31.01.2024 23:59:59"],
        "data": [{"supp": "Optima-Pharm", "item": items}],
    }))
    .unwrap()
}

/// Container from a metadata value and raw data bytes
pub fn container(meta: &serde_json::Value, data: &[u8]) -> Bytes {
    codec::pack(&serde_json::to_vec(meta).unwrap(), data).unwrap()
}
