//! End-to-end tests against a real PostgreSQL server with pgvector.
//!
//! Connection comes from the environment:
//! `PGVAULT_TEST_HOST` (default localhost), `PGVAULT_TEST_PORT` (5432),
//! `PGVAULT_TEST_DB` (postgres), `PGVAULT_TEST_USER` (postgres),
//! `PGVAULT_TEST_PASSWORD` (empty).

use std::sync::Arc;

use pgvault::{
    ConnectionConfig, DatabaseSession, EncryptionKey, FindOptions, Row, SessionConfig,
    StorageRegistry, Value,
};

const SCHEMA: &str = "
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS secrets (
  id BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
  label VARCHAR(120) NOT NULL,
  content TEXT
);

CREATE TABLE IF NOT EXISTS memories (
  id BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
  body TEXT,
  embedding VECTOR(3)
);
";

fn env(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn connection() -> ConnectionConfig {
    ConnectionConfig {
        host: env("PGVAULT_TEST_HOST", "localhost"),
        port: env("PGVAULT_TEST_PORT", "5432").parse().unwrap(),
        database: env("PGVAULT_TEST_DB", "postgres"),
        user: env("PGVAULT_TEST_USER", "postgres"),
        password: env("PGVAULT_TEST_PASSWORD", ""),
        pool_size: 2,
    }
}

async fn ready_session(storage: &str, key: Option<EncryptionKey>) -> (Arc<StorageRegistry>, DatabaseSession) {
    let registry = Arc::new(StorageRegistry::new(connection()));
    let session = DatabaseSession::new(registry.clone());
    session
        .configure(SessionConfig {
            storage: storage.to_string(),
            schema_text: SCHEMA.to_string(),
            key,
        })
        .await
        .unwrap();
    (registry, session)
}

#[tokio::test]
#[ignore] // Run with --ignored flag
async fn test_encrypted_crud_round_trip_against_live_storage() {
    let key = EncryptionKey::from_passphrase("live test key");
    let (registry, session) = ready_session("pgvault_live_crud", Some(key.clone())).await;

    let secrets = session.table("secrets").await.unwrap();
    secrets.delete_many(None).await.unwrap();

    let created = secrets
        .create(Row::new().with("label", "email").with("content", "hunter2"))
        .await
        .unwrap();
    let id = created.get("id").unwrap().as_int().unwrap();
    assert_eq!(created.get("content"), Some(&Value::Text("hunter2".into())));

    // Reading back through the layer yields plaintext
    let fetched = secrets
        .find_unique(Row::new().with("id", id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.get("content"), Some(&Value::Text("hunter2".into())));

    // Reading the raw row shows ciphertext, never the plaintext
    let engine = registry.open("pgvault_live_crud").await.unwrap();
    let raw = engine
        .query(
            "SELECT \"content\" FROM \"secrets\" WHERE \"id\" = $1",
            &[Value::Int(id)],
        )
        .await
        .unwrap();
    let stored = raw[0].get("content").unwrap().as_str().unwrap().to_string();
    assert_ne!(stored, "hunter2");
    assert!(!stored.contains("hunter2"));
    assert_eq!(pgvault::decrypt_value(&stored, &key).unwrap(), "hunter2");

    // Update and delete keep the same discipline
    let updated = secrets
        .update(
            Row::new().with("id", id),
            Row::new().with("content", "hunter3"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.get("content"), Some(&Value::Text("hunter3".into())));

    let deleted = secrets
        .delete(Row::new().with("id", id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deleted.get("content"), Some(&Value::Text("hunter3".into())));

    assert!(secrets
        .find_unique(Row::new().with("id", id))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore] // Run with --ignored flag
async fn test_schema_initialization_is_idempotent() {
    let (_registry, session) = ready_session("pgvault_live_idempotent", None).await;

    let secrets = session.table("secrets").await.unwrap();
    secrets.delete_many(None).await.unwrap();
    secrets
        .create(Row::new().with("label", "kept"))
        .await
        .unwrap();

    // Re-running the same configuration must not error or disturb contents
    session
        .configure(SessionConfig {
            storage: "pgvault_live_idempotent".to_string(),
            schema_text: SCHEMA.to_string(),
            key: None,
        })
        .await
        .unwrap();

    let secrets = session.table("secrets").await.unwrap();
    let rows = secrets.find_many(FindOptions::default()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("label"), Some(&Value::Text("kept".into())));
}

#[tokio::test]
#[ignore] // Run with --ignored flag
async fn test_vector_search_orders_by_ascending_distance() {
    let (_registry, session) = ready_session("pgvault_live_search", None).await;

    let memories = session.table("memories").await.unwrap();
    memories.delete_many(None).await.unwrap();

    for (body, embedding) in [
        ("nearest", vec![1.0f32, 0.0, 0.0]),
        ("near", vec![0.9, 0.1, 0.0]),
        ("far", vec![0.1, 0.9, 0.0]),
    ] {
        memories
            .create(Row::new().with("body", body).with("embedding", embedding))
            .await
            .unwrap();
    }

    let results = memories
        .search(&[1.0, 0.0, 0.0], Some(0.5), Some(2))
        .await
        .unwrap();

    // Two nearest rows, most similar first; "far" misses the threshold
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].get("body"), Some(&Value::Text("nearest".into())));
    assert_eq!(results[1].get("body"), Some(&Value::Text("near".into())));

    let d0 = match results[0].get("distance").unwrap() {
        Value::Float(d) => *d,
        other => panic!("distance should be a float, got {:?}", other),
    };
    let d1 = match results[1].get("distance").unwrap() {
        Value::Float(d) => *d,
        other => panic!("distance should be a float, got {:?}", other),
    };
    assert!(d0 < d1, "ascending distance order: {} < {}", d0, d1);
}
