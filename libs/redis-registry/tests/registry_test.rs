//! Integration tests for the connection registry
//!
//! These tests run against a real Redis via testcontainers and cover:
//! - probing and registering reachable targets
//! - aggregated failures for unreachable targets
//! - replacing a handle on reconnect

use std::collections::HashMap;

use redis::AsyncCommands;
use redis_registry::{ConnectionConfig, ConnectionRegistry, RegistryError, open};
use test_utils::{TestRedis, unreachable_address};

fn init_tracing() {
    core_config::tracing::init_tracing(&core_config::Environment::Development);
}

fn config(server: String) -> ConnectionConfig {
    ConnectionConfig {
        dial_timeout: 2,
        read_timeout: 2,
        write_timeout: 2,
        ..ConnectionConfig::new(server)
    }
}

#[tokio::test]
async fn test_connect_and_use_default_client() {
    init_tracing();
    let redis = TestRedis::new().await;
    let registry = ConnectionRegistry::new();

    registry
        .connect(HashMap::from([("default".to_string(), config(redis.address()))]))
        .await
        .unwrap();

    let client = registry.default_client().await.unwrap();
    let mut conn = client.connection_manager().await.unwrap();
    conn.set::<_, _, ()>("registry:key", "value").await.unwrap();

    let mut check = redis.connection().await;
    let value: String = check.get("registry:key").await.unwrap();
    assert_eq!(value, "value");
}

#[tokio::test]
async fn test_connect_selects_database() {
    let redis = TestRedis::new().await;
    let registry = ConnectionRegistry::new();

    let mut db2 = config(redis.address());
    db2.db = 2;
    registry
        .connect(HashMap::from([("db2".to_string(), db2)]))
        .await
        .unwrap();

    let mut conn = registry
        .client("db2")
        .await
        .unwrap()
        .connection_manager()
        .await
        .unwrap();
    conn.set::<_, _, ()>("only-in-db2", 1).await.unwrap();

    let mut db0 = redis.connection().await;
    let exists: bool = db0.exists("only-in-db2").await.unwrap();
    assert!(!exists);
}

#[tokio::test]
async fn test_connect_mixed_batch() {
    init_tracing();
    let redis = TestRedis::new().await;
    let registry = ConnectionRegistry::new();

    let err = registry
        .connect(HashMap::from([
            ("good".to_string(), config(redis.address())),
            ("bad".to_string(), config(unreachable_address())),
        ]))
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::ProbeFailed { .. }));
    assert!(err.is_fatal());
    assert!(err.to_string().contains("bad: "));
    assert!(!err.to_string().contains("good: "));

    assert!(registry.client("good").await.unwrap().ping().await.is_ok());
    let missing = registry.client("bad").await.unwrap_err();
    assert!(missing.to_string().contains("`bad`"));
}

#[tokio::test]
async fn test_reconnect_replaces_and_closes_previous() {
    let first = TestRedis::new().await;
    let second = TestRedis::new().await;
    let registry = ConnectionRegistry::new();

    registry
        .connect(HashMap::from([("default".to_string(), config(first.address()))]))
        .await
        .unwrap();
    let old = registry.default_client().await.unwrap();

    registry
        .connect(HashMap::from([("default".to_string(), config(second.address()))]))
        .await
        .unwrap();
    let current = registry.default_client().await.unwrap();

    assert!(old.is_closed());
    assert!(old.ping().await.is_err());
    assert!(!current.is_closed());
    assert_eq!(current.target(), second.address());

    let mut conn = current.connection_manager().await.unwrap();
    conn.set::<_, _, ()>("marker", "second").await.unwrap();
    let mut on_second = second.connection().await;
    let marker: String = on_second.get("marker").await.unwrap();
    assert_eq!(marker, "second");
}

#[tokio::test]
async fn test_open_outside_registry() {
    let redis = TestRedis::new().await;

    let client = open(&redis.address(), |options| options.db = 1).unwrap();
    client.ping().await.unwrap();

    let registry = ConnectionRegistry::new();
    assert!(registry.is_empty().await);
}
