//! Pipeline passes over single envelopes: delivery, quarantine, audit

mod helpers;

use helpers::{container, legacy_sale_payload, native_meta, TestRelay, SUBMITTER};
use salesgate_common::bus::LocalBus;
use salesgate_common::config::RelaySettings;
use salesgate_common::kv::InMemoryKeyValueStore;
use salesgate_common::object_store::{
    FileObjectStore, InMemoryObjectStore, ObjectStore, MAX_OBJECT_NAME_LEN,
};
use salesgate_relay::codec;
use salesgate_relay::model::{DrugLink, MetaRecord};
use salesgate_relay::normalizer::Country;
use salesgate_relay::relay::{companion_name, process};
use salesgate_relay::resolver::seed_registry;
use salesgate_relay::{EnvelopeRef, ErrorKind, Outcome, RelayContext, Stage};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_legacy_sale_in_end_to_end() {
    let relay = TestRelay::new().await;
    let meta = native_meta("3f1c0b9e-0000-4000-8000-000000000001", "data.sale-inp.daily");
    let envelope = relay
        .submit("upload-1.sgc", container(&meta, &legacy_sale_payload(&["Aspirin 500mg"])))
        .await;

    let outcome = process(&relay.ctx, &envelope).await;
    assert_eq!(
        outcome,
        Outcome::Delivered {
            uuid: "3f1c0b9e-0000-4000-8000-000000000001".to_string()
        }
    );

    // Source removed, result delivered under the same name
    assert!(relay.objects("inbound").await.is_empty());
    assert_eq!(relay.objects("outbound").await, vec!["upload-1.sgc"]);
    assert!(relay.objects("errors").await.is_empty());

    let (meta, records) = relay.outbound("upload-1.sgc").await;
    assert_eq!(meta.htag, "sale-in.daily.ua");
    assert_eq!(meta.ctag, "v1:data.sale-inp.daily");
    assert_eq!(meta.span, vec!["2024-01-01T00:00:00", "2024-01-31T23:59:59"]);
    assert_eq!(meta.unix, 1_706_776_200);
    assert!(
        meta.summary.starts_with("drug: 0/1; addr: 0/1; time: "),
        "summary was {}",
        meta.summary
    );

    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], "Aspirin 500mg");
    assert_eq!(records[0]["supp"], "Optima-Pharm");
    assert_eq!(records[0]["drug_link"]["link"], 0);
    assert_eq!(records[0]["addr_link"]["link"], 0);

    let audited = relay
        .ctx
        .audit
        .get("3f1c0b9e-0000-4000-8000-000000000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(audited, meta);
}

#[tokio::test]
async fn test_partial_match_preserves_order() {
    let relay = TestRelay::new().await;
    let aspirin = DrugLink {
        link: 11,
        drug: 101,
        brand: 7,
        catg: 3,
        stat: 1,
    };
    relay
        .ctx
        .registry
        .store_drug_links(Country::Ua, &[("Aspirin 500mg".to_string(), aspirin)])
        .await
        .unwrap();

    let meta = native_meta("u-partial", "data.sale-inp.daily");
    let payload = legacy_sale_payload(&["Analgin", "Aspirin 500mg", "Citramon"]);
    let envelope = relay.submit("partial.sgc", container(&meta, &payload)).await;

    assert!(matches!(
        process(&relay.ctx, &envelope).await,
        Outcome::Delivered { .. }
    ));

    let (meta, records) = relay.outbound("partial.sgc").await;
    assert!(meta.summary.starts_with("drug: 1/3;"));

    let records = records.as_array().unwrap();
    let names: Vec<_> = records.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Analgin", "Aspirin 500mg", "Citramon"]);
    let links: Vec<_> = records.iter().map(|r| r["drug_link"]["link"].as_i64().unwrap()).collect();
    assert_eq!(links, vec![0, 11, 0]);
    assert_eq!(records[1]["drug_link"]["brand"], 7);
}

#[tokio::test]
async fn test_native_payload_delivered() {
    let relay = TestRelay::new().await;
    let meta = native_meta("u-native", "geo.monthly.ua");
    let payload = serde_json::to_vec(&json!([
        {"code": "1", "name": "Aspirin", "quant": 4, "pos": "Lviv, Rynok 1", "region": "Lviv"}
    ]))
    .unwrap();
    let envelope = relay.submit("geo.sgc", container(&meta, &payload)).await;

    assert!(matches!(
        process(&relay.ctx, &envelope).await,
        Outcome::Delivered { .. }
    ));
    let (meta, records) = relay.outbound("geo.sgc").await;
    assert!(!meta.summary.contains("addr"));
    assert_eq!(records[0]["pos"], "Lviv, Rynok 1");
    assert_eq!(meta.etag.len(), 32);
}

#[tokio::test]
async fn test_unknown_tag_quarantined_with_diagnostic() {
    let relay = TestRelay::new().await;
    let meta = native_meta("u-bad-tag", "stock.daily.ua");
    let envelope = relay.submit("bad-tag.sgc", container(&meta, b"[]")).await;

    assert_eq!(
        process(&relay.ctx, &envelope).await,
        Outcome::Errored {
            stage: Stage::Normalize,
            kind: ErrorKind::Validation
        }
    );

    assert!(relay.objects("inbound").await.is_empty());
    assert!(relay.objects("outbound").await.is_empty());
    assert_eq!(
        relay.objects("errors").await,
        vec!["bad-tag.sgc", "bad-tag.sgc.error.json"]
    );

    let diagnostic = relay.diagnostic("bad-tag.sgc").await;
    assert_eq!(diagnostic["stage"], "normalize");
    assert_eq!(diagnostic["kind"], "validation");
    assert_eq!(diagnostic["error"], "unknown source tag 'stock.daily.ua'");
    assert_eq!(diagnostic["bucket"], "inbound");
    assert_eq!(diagnostic["meta"]["uuid"], "u-bad-tag");

    // Original bytes preserved
    let original = relay.store.get("errors", "bad-tag.sgc").await.unwrap();
    assert_eq!(original, container(&meta, b"[]"));

    let audited = relay.ctx.audit.get("u-bad-tag").await.unwrap().unwrap();
    assert_eq!(
        audited.fail.as_deref(),
        Some("unknown source tag 'stock.daily.ua'")
    );
}

#[tokio::test]
async fn test_corrupt_container_is_structural() {
    let relay = TestRelay::new().await;
    let envelope = relay
        .submit("garbage.sgc", bytes::Bytes::from_static(b"definitely not a container"))
        .await;

    assert_eq!(
        process(&relay.ctx, &envelope).await,
        Outcome::Errored {
            stage: Stage::Decode,
            kind: ErrorKind::Structural
        }
    );
    let diagnostic = relay.diagnostic("garbage.sgc").await;
    assert!(diagnostic["meta"].is_null());
    assert!(relay.objects("inbound").await.is_empty());
}

#[tokio::test]
async fn test_empty_dataset_rejected_as_no_data() {
    let relay = TestRelay::new().await;
    let meta = native_meta("u-empty", "sale-out.daily.ua");
    let envelope = relay.submit("empty.sgc", container(&meta, b"[]")).await;

    assert_eq!(
        process(&relay.ctx, &envelope).await,
        Outcome::Errored {
            stage: Stage::Resolve,
            kind: ErrorKind::Validation
        }
    );
    assert_eq!(relay.diagnostic("empty.sgc").await["error"], "no data");
}

#[tokio::test]
async fn test_unknown_submitter_is_identity_error() {
    let relay = TestRelay::new().await;
    let mut meta = native_meta("u-stranger", "data.sale-inp.daily");
    meta["auth"] = json!("not-registered");
    let envelope = relay
        .submit("stranger.sgc", container(&meta, &legacy_sale_payload(&["Aspirin"])))
        .await;

    assert_eq!(
        process(&relay.ctx, &envelope).await,
        Outcome::Errored {
            stage: Stage::Resolve,
            kind: ErrorKind::Identity
        }
    );

    // The companion keeps the metadata as submitted
    let diagnostic = relay.diagnostic("stranger.sgc").await;
    assert_eq!(diagnostic["error"], "unknown submitter 'not-registered'");
    assert_eq!(diagnostic["meta"]["htag"], "data.sale-inp.daily");
    assert_eq!(diagnostic["meta"]["etag"], "");
    assert_eq!(diagnostic["meta"]["ctag"], "");
    assert!(diagnostic["meta"].get("fail").is_none());

    // The audit entry keeps the metadata as processed
    let audited = relay.ctx.audit.get("u-stranger").await.unwrap().unwrap();
    assert_eq!(audited.htag, "sale-in.daily.ua");
    assert_eq!(audited.ctag, "v1:data.sale-inp.daily");
    assert_eq!(audited.etag.len(), 32);
    assert_eq!(audited.fail.as_deref(), Some("unknown submitter 'not-registered'"));
}

#[tokio::test]
async fn test_long_object_name_quarantined_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileObjectStore::new(dir.path()));
    let ctx = RelayContext::new(
        store.clone(),
        Arc::new(LocalBus::default()),
        Arc::new(InMemoryKeyValueStore::new()),
        RelaySettings::default(),
    );
    for bucket in ["inbound", "outbound", "errors"] {
        store.make_bucket(bucket).await.unwrap();
    }

    let object = format!("{}.sgc", "r".repeat(MAX_OBJECT_NAME_LEN - 4));
    store
        .put("inbound", &object, bytes::Bytes::from_static(b"not a container"))
        .await
        .unwrap();

    let envelope = EnvelopeRef::new("inbound", object.clone());
    assert_eq!(
        process(&ctx, &envelope).await,
        Outcome::Errored {
            stage: Stage::Decode,
            kind: ErrorKind::Structural
        }
    );

    let companion = companion_name(&object);
    assert_eq!(companion.len(), MAX_OBJECT_NAME_LEN);
    let mut stored = store.list("errors", 10).await.unwrap();
    stored.sort();
    let mut expected = vec![object.clone(), companion.clone()];
    expected.sort();
    assert_eq!(stored, expected);

    let diagnostic: serde_json::Value =
        serde_json::from_slice(&store.get("errors", &companion).await.unwrap()).unwrap();
    assert_eq!(diagnostic["object"], object.as_str());
    assert!(store.list("inbound", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_date_span_rejected() {
    let relay = TestRelay::new().await;
    let meta = native_meta("u-span", "data.sale-inp.daily");
    let payload = serde_json::to_vec(&json!({
        "date": ["2024-01-01", "2024-01-31"],
        "data": [{"supp": "Optima", "item": [{"id": "1", "drug": "Aspirin"}]}],
    }))
    .unwrap();
    let envelope = relay.submit("span.sgc", container(&meta, &payload)).await;

    assert_eq!(
        process(&relay.ctx, &envelope).await,
        Outcome::Errored {
            stage: Stage::Normalize,
            kind: ErrorKind::Validation
        }
    );
}

#[tokio::test]
async fn test_missing_uuid_is_generated() {
    let relay = TestRelay::new().await;
    let mut meta = native_meta("", "data.sale-inp.daily");
    meta.as_object_mut().unwrap().remove("uuid");
    let envelope = relay
        .submit("anon.sgc", container(&meta, &legacy_sale_payload(&["Aspirin"])))
        .await;

    let Outcome::Delivered { uuid } = process(&relay.ctx, &envelope).await else {
        panic!("expected delivery");
    };
    assert!(uuid::Uuid::parse_str(&uuid).is_ok());
    let (meta, _) = relay.outbound("anon.sgc").await;
    assert_eq!(meta.uuid, uuid);
    assert_eq!(meta.nick, SUBMITTER);
}

#[tokio::test]
async fn test_vanished_object_is_skipped() {
    let relay = TestRelay::new().await;
    let envelope = EnvelopeRef::new("inbound", "never-there.sgc");

    assert_eq!(process(&relay.ctx, &envelope).await, Outcome::Skipped);
    assert!(relay.objects("errors").await.is_empty());
}

#[tokio::test]
async fn test_reprocessing_is_idempotent_for_consumers() {
    let relay = TestRelay::new().await;
    let meta = native_meta("u-twice", "data.sale-inp.daily");
    let payload = legacy_sale_payload(&["Aspirin 500mg"]);

    let envelope = relay.submit("twice.sgc", container(&meta, &payload)).await;
    process(&relay.ctx, &envelope).await;
    let (first, first_records) = relay.outbound("twice.sgc").await;

    // Redelivery of the same submission overwrites with the same content
    let envelope = relay.submit("twice.sgc", container(&meta, &payload)).await;
    process(&relay.ctx, &envelope).await;
    let (second, second_records) = relay.outbound("twice.sgc").await;

    assert_eq!(first.uuid, second.uuid);
    assert_eq!(first.etag, second.etag);
    assert_eq!(first_records, second_records);
}

#[tokio::test]
async fn test_seeded_registry_accepts_submission() {
    let dir = TempDir::new().unwrap();
    let seed_path = dir.path().join("registry.toml");
    std::fs::write(
        &seed_path,
        r#"
        [[auth]]
        id = "key-1"
        name = "Apteka LLC"

        [[drug]]
        name = "Aspirin 500mg"
        link = 11
        drug = 101

        [[addr]]
        name = "Optima-Pharm"
        link = 5
        "#,
    )
    .unwrap();

    // Same collaborators the binary starts with: nothing registered up front
    let store = Arc::new(InMemoryObjectStore::new());
    let ctx = RelayContext::new(
        store.clone(),
        Arc::new(LocalBus::default()),
        Arc::new(InMemoryKeyValueStore::new()),
        RelaySettings {
            registry_seed: Some(seed_path.clone()),
            ..Default::default()
        },
    );
    for bucket in ["inbound", "outbound", "errors"] {
        store.make_bucket(bucket).await.unwrap();
    }

    let counts = seed_registry(&ctx.registry, &seed_path).await.unwrap();
    assert_eq!(counts.auth, 1);
    assert_eq!(counts.drugs, 1);

    let meta = native_meta("u-seeded", "data.sale-inp.daily");
    store
        .put("inbound", "seeded.sgc", container(&meta, &legacy_sale_payload(&["Aspirin 500mg"])))
        .await
        .unwrap();

    let outcome = process(&ctx, &EnvelopeRef::new("inbound", "seeded.sgc")).await;
    assert_eq!(
        outcome,
        Outcome::Delivered {
            uuid: "u-seeded".to_string()
        }
    );

    let raw = store.get("outbound", "seeded.sgc").await.unwrap();
    let (meta, data) = codec::unpack(&raw[..], false, false).unwrap();
    let meta: MetaRecord = serde_json::from_slice(&meta).unwrap();
    let records: serde_json::Value = serde_json::from_slice(&data).unwrap();
    assert!(meta.summary.starts_with("drug: 1/1; addr: 1/1;"));
    assert_eq!(records[0]["drug_link"]["link"], 11);
    assert_eq!(records[0]["addr_link"]["link"], 5);
}
