//! Tests for the moka-backed driver.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cairn_core::{CacheDriver, CacheKey, NamespacedDriver};
use cairn_moka::MokaDriver;

fn key(name: &str) -> CacheKey {
    CacheKey::new(name)
}

fn payload(data: &'static str) -> Bytes {
    Bytes::from_static(data.as_bytes())
}

#[tokio::test]
async fn set_get_round_trip() {
    let driver = MokaDriver::builder().build();
    driver.set(&key("a"), payload("hello"), None).await.unwrap();
    assert_eq!(driver.get(&key("a")).await.unwrap(), Some(payload("hello")));
    assert_eq!(driver.get(&key("b")).await.unwrap(), None);
}

#[tokio::test]
async fn entries_expire_at_their_ttl() {
    let driver = MokaDriver::builder().build();
    driver
        .set(&key("a"), payload("v"), Some(Duration::from_millis(40)))
        .await
        .unwrap();
    assert!(driver.get(&key("a")).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(driver.get(&key("a")).await.unwrap(), None);
    assert!(!driver.has(&key("a")).await.unwrap());
}

#[tokio::test]
async fn rewriting_extends_the_deadline() {
    let driver = MokaDriver::builder().build();
    driver
        .set(&key("a"), payload("v1"), Some(Duration::from_millis(40)))
        .await
        .unwrap();
    // Rewrite with a longer TTL; the new deadline must win.
    driver
        .set(&key("a"), payload("v2"), Some(Duration::from_secs(60)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(driver.get(&key("a")).await.unwrap(), Some(payload("v2")));
}

#[tokio::test]
async fn pull_reads_and_deletes() {
    let driver = MokaDriver::builder().build();
    driver.set(&key("a"), payload("v"), None).await.unwrap();

    assert_eq!(driver.pull(&key("a")).await.unwrap(), Some(payload("v")));
    assert_eq!(driver.get(&key("a")).await.unwrap(), None);
    assert_eq!(driver.pull(&key("a")).await.unwrap(), None);
}

#[tokio::test]
async fn delete_reports_presence() {
    let driver = MokaDriver::builder().build();
    driver.set(&key("a"), payload("v"), None).await.unwrap();

    assert!(driver.delete(&key("a")).await.unwrap());
    assert!(!driver.delete(&key("a")).await.unwrap());
}

#[tokio::test]
async fn delete_many_reports_all_found() {
    let driver = MokaDriver::builder().build();
    driver.set(&key("a"), payload("v"), None).await.unwrap();
    driver.set(&key("b"), payload("v"), None).await.unwrap();

    assert!(driver.delete_many(&[key("a"), key("b")]).await.unwrap());
    assert!(!driver.delete_many(&[key("a")]).await.unwrap());
}

#[tokio::test]
async fn clear_removes_everything() {
    let driver = MokaDriver::builder().build();
    for i in 0..10 {
        driver
            .set(&key(&format!("k{i}")), payload("v"), None)
            .await
            .unwrap();
    }
    driver.clear().await.unwrap();
    driver.cache().run_pending_tasks().await;
    assert_eq!(driver.get(&key("k0")).await.unwrap(), None);
}

#[tokio::test]
async fn eviction_respects_max_entries() {
    let driver = MokaDriver::builder().max_entries(3).build();
    for i in 0..4 {
        driver
            .set(&key(&format!("k{i}")), payload("v"), None)
            .await
            .unwrap();
    }
    driver.cache().run_pending_tasks().await;

    let mut count = 0;
    for i in 0..4 {
        if driver.get(&key(&format!("k{i}"))).await.unwrap().is_some() {
            count += 1;
        }
    }
    assert!(count <= 3, "expected at most 3 entries, found {count}");
}

#[tokio::test]
async fn namespaced_view_prefixes_keys() {
    let driver = Arc::new(MokaDriver::builder().build());
    let view = NamespacedDriver::new(driver.clone() as Arc<dyn CacheDriver>, "tenant");

    view.set(&key("a"), payload("v"), None).await.unwrap();

    // The view resolves the key; the underlying driver sees the prefix.
    assert_eq!(view.get(&key("a")).await.unwrap(), Some(payload("v")));
    assert_eq!(
        driver.get(&key("tenant:a")).await.unwrap(),
        Some(payload("v"))
    );
    assert_eq!(driver.get(&key("a")).await.unwrap(), None);
}
