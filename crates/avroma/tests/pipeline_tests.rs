//! End-to-end decode pipeline tests
//!
//! Frames are built with the codec's own binary encoder so every test reads
//! like a producer/consumer pair sharing one registry.

use avroma::{
    wire, AvroCodec, DecodeError, DecodePipeline, ErrorKind, RawMessage, RegistryError,
    SchemaCache, SchemaDefinition, SchemaFetcher, SchemaId, StaticRegistry,
};
use serde_json::json;
use std::sync::Arc;

const USER_SCHEMA: &str = r#"{
    "type": "record",
    "name": "User",
    "namespace": "com.example",
    "fields": [
        {"name": "id", "type": "long"},
        {"name": "name", "type": "string"},
        {"name": "email", "type": ["null", "string"], "default": null}
    ]
}"#;

fn user_frame(id: u32, user: serde_json::Value) -> Vec<u8> {
    let codec = AvroCodec::new(&SchemaDefinition::from(USER_SCHEMA)).unwrap();
    let body = codec.encode_binary(&user).unwrap();
    wire::frame(SchemaId::new(id), &body)
}

fn setup() -> (Arc<SchemaCache>, Arc<StaticRegistry>, DecodePipeline) {
    let cache = Arc::new(SchemaCache::new());
    let registry = Arc::new(StaticRegistry::new().with_schema(SchemaId::new(1), USER_SCHEMA));
    let pipeline = DecodePipeline::new(cache.clone(), registry.clone());
    (cache, registry, pipeline)
}

#[tokio::test]
async fn test_decode_record_end_to_end() {
    let (_, _, pipeline) = setup();

    let frame = user_frame(1, json!({"id": 42, "name": "Ada", "email": {"string": "ada@example.com"}}));
    let msg = RawMessage::new("users", 2, 1001, frame).with_key("user-42");
    let decoded = pipeline.decode(&msg).await.unwrap();

    assert_eq!(decoded.schema_id, SchemaId::new(1));
    assert_eq!(decoded.topic, "users");
    assert_eq!(decoded.partition, 2);
    assert_eq!(decoded.offset, 1001);
    assert_eq!(decoded.key, "user-42");
    assert_eq!(
        decoded.value,
        r#"{"id":42,"name":"Ada","email":{"string":"ada@example.com"}}"#
    );
}

#[tokio::test]
async fn test_null_union_renders_as_null() {
    let (_, _, pipeline) = setup();

    let frame = user_frame(1, json!({"id": 1, "name": "Bob", "email": null}));
    let decoded = pipeline
        .decode(&RawMessage::new("users", 0, 0, frame))
        .await
        .unwrap();

    assert_eq!(decoded.value_json().unwrap()["email"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_short_frames_fail_before_lookup() {
    let (cache, registry, pipeline) = setup();

    for len in 0..wire::HEADER_LEN {
        let err = pipeline
            .decode(&RawMessage::new("users", 0, 0, vec![0u8; len]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputFormat);
    }
    assert_eq!(registry.fetch_count(), 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_miss_fetches_once_then_hits() {
    let (cache, registry, pipeline) = setup();
    let frame = user_frame(1, json!({"id": 1, "name": "a", "email": null}));

    pipeline
        .decode(&RawMessage::new("users", 0, 0, frame.clone()))
        .await
        .unwrap();
    assert_eq!(registry.fetch_count(), 1);
    assert_eq!(cache.refcount(SchemaId::new(1)), 1);

    for offset in 1..10 {
        pipeline
            .decode(&RawMessage::new("users", 0, offset, frame.clone()))
            .await
            .unwrap();
    }
    assert_eq!(registry.fetch_count(), 1);
    assert_eq!(cache.refcount(SchemaId::new(1)), 1);

    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.decoded, 10);
    assert_eq!(snapshot.cache_hits, 9);
    assert_eq!(snapshot.cache_misses, 1);
}

#[tokio::test]
async fn test_prewarmed_cache_skips_registry() {
    let cache = Arc::new(SchemaCache::new());
    cache.add(SchemaId::new(1), SchemaDefinition::from(USER_SCHEMA));
    let registry = Arc::new(StaticRegistry::new());
    let pipeline = DecodePipeline::new(cache, registry.clone());

    let frame = user_frame(1, json!({"id": 5, "name": "c", "email": null}));
    assert!(pipeline
        .decode(&RawMessage::new("users", 0, 0, frame))
        .await
        .is_ok());
    assert_eq!(registry.fetch_count(), 0);
}

#[tokio::test]
async fn test_malformed_schema_keeps_cache_entry() {
    let cache = Arc::new(SchemaCache::new());
    let registry = Arc::new(StaticRegistry::new().with_schema(SchemaId::new(3), r#"{"type": "recor"#));
    let pipeline = DecodePipeline::new(cache.clone(), registry.clone());

    let frame = wire::frame(SchemaId::new(3), &[0x02]);
    let err = pipeline
        .decode(&RawMessage::new("users", 0, 0, frame.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, DecodeError::CodecConstruction { schema_id, .. } if schema_id == SchemaId::new(3)));
    assert!(!err.is_fatal());

    // The definition stays cached; the next message fails the same way without a fetch
    assert!(cache.contains(SchemaId::new(3)));
    let err = pipeline
        .decode(&RawMessage::new("users", 0, 1, frame))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CodecConstruction);
    assert_eq!(registry.fetch_count(), 1);
}

#[tokio::test]
async fn test_truncated_body_is_decode_error() {
    let (_, _, pipeline) = setup();
    let mut frame = user_frame(1, json!({"id": 7, "name": "truncated", "email": null}));
    frame.truncate(frame.len() - 4);

    let err = pipeline
        .decode(&RawMessage::new("users", 0, 0, frame))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert_eq!(err.schema_id(), Some(SchemaId::new(1)));
}

#[tokio::test]
async fn test_registry_failure_then_recovery() {
    let cache = Arc::new(SchemaCache::new());
    let registry = Arc::new(StaticRegistry::new());
    let pipeline = DecodePipeline::new(cache.clone(), registry.clone());
    let frame = user_frame(8, json!({"id": 1, "name": "late", "email": null}));

    let err = pipeline
        .decode(&RawMessage::new("users", 0, 0, frame.clone()))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        DecodeError::RegistryFetch {
            source: RegistryError::SchemaNotFound(_),
            ..
        }
    ));
    assert!(cache.is_empty());

    registry.insert(SchemaId::new(8), USER_SCHEMA);
    assert!(pipeline
        .decode(&RawMessage::new("users", 0, 1, frame))
        .await
        .is_ok());
    assert_eq!(cache.refcount(SchemaId::new(8)), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_are_tolerated() {
    let (cache, registry, pipeline) = setup();
    let frame = user_frame(1, json!({"id": 9, "name": "race", "email": null}));

    let mut handles = Vec::new();
    for offset in 0..16 {
        let pipeline = pipeline.clone();
        let frame = frame.clone();
        handles.push(tokio::spawn(async move {
            pipeline
                .decode(&RawMessage::new("users", offset as i32 % 4, offset, frame))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    // Duplicate fetches are allowed; every fetch registered exactly once
    let fetches = registry.fetch_count();
    assert!((1..=16).contains(&fetches));
    assert_eq!(cache.refcount(SchemaId::new(1)) as u64, fetches);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_dyn_fetcher_through_arc() {
    let registry: Arc<dyn SchemaFetcher> =
        Arc::new(StaticRegistry::new().with_schema(SchemaId::new(1), USER_SCHEMA));
    let wrapped = Arc::new(registry.clone());

    assert!(wrapped.fetch_schema(SchemaId::new(1)).await.is_ok());
}
