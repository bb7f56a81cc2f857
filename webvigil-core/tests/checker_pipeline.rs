//! Checker-level behaviour: per-URL serialization and fetch edge cases.

mod support;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use webvigil_contracts::HistoryStore;
use webvigil_core::{
    BufferPool, Fetcher, MemoryHistoryStore, MonitorConfig, UrlChecker, UrlLockTable,
};

use support::{CannedResponse, TestServer, init_tracing};

fn checker_with(
    config: &MonitorConfig,
    store: &Arc<MemoryHistoryStore>,
) -> Arc<UrlChecker> {
    let pool = Arc::new(BufferPool::default());
    let fetcher = Fetcher::new(config, pool).expect("fetcher");
    Arc::new(UrlChecker::new(
        config,
        fetcher,
        Arc::clone(store) as Arc<dyn HistoryStore>,
        None,
        None,
    ))
}

#[tokio::test]
async fn concurrent_duplicate_checks_serialize_and_append_once() {
    init_tracing();
    let server = TestServer::start().await;
    server.set_response("/x.js", CannedResponse::ok("text/javascript", b"stable"));
    let url = server.url("/x.js");

    let store = Arc::new(MemoryHistoryStore::new());
    let checker = checker_with(&MonitorConfig::default(), &store);
    let table = Arc::new(UrlLockTable::new());

    {
        let _guard = table.acquire(&url).await;
        let first = checker
            .check(&url, &CancellationToken::new(), "monitor-seed", None)
            .await;
        assert!(first.first_observation());
    }
    assert_eq!(store.record_count().await, 1);

    let mut handles = Vec::new();
    for _ in 0..2 {
        let checker = Arc::clone(&checker);
        let table = Arc::clone(&table);
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            let _guard = table.acquire(&url).await;
            checker
                .check(&url, &CancellationToken::new(), "monitor-race", None)
                .await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap();
        assert!(!result.changed);
        assert!(result.error.is_none());
    }

    // Content never changed between the racing checks.
    assert_eq!(store.record_count().await, 1);
}

#[tokio::test]
async fn batch_provenance_is_attached_to_results() {
    init_tracing();
    let server = TestServer::start().await;
    server.set_response("/y.js", CannedResponse::ok("text/javascript", b"Y"));
    let url = server.url("/y.js");

    let store = Arc::new(MemoryHistoryStore::new());
    let checker = checker_with(&MonitorConfig::default(), &store);
    let batch_info = webvigil_model::BatchInfo {
        batch_index: 2,
        total_batches: 3,
        batch_size: 25,
        position_in_batch: 7,
    };
    let result = checker
        .check(&url, &CancellationToken::new(), "monitor-test", Some(batch_info))
        .await;
    assert_eq!(result.batch, Some(batch_info));
    assert!(result.changed);
}

#[tokio::test]
async fn http_error_statuses_carry_excerpts() {
    init_tracing();
    let server = TestServer::start().await;
    server.set_response(
        "/broken.js",
        CannedResponse::ok("text/plain", b"upstream exploded").with_status(500),
    );
    let url = server.url("/broken.js");

    let store = Arc::new(MemoryHistoryStore::new());
    let checker = checker_with(&MonitorConfig::default(), &store);
    let result = checker
        .check(&url, &CancellationToken::new(), "monitor-test", None)
        .await;

    let error = result.error.expect("non-2xx is a fetch error");
    assert_eq!(error.source, webvigil_model::ErrorSource::Fetch);
    assert!(error.message.contains("500"));
    assert!(error.message.contains("upstream exploded"));
    assert_eq!(store.record_count().await, 0);
}

#[tokio::test]
async fn oversized_bodies_are_rejected_with_reason_code() {
    init_tracing();
    let server = TestServer::start().await;
    server.set_response(
        "/fat.js",
        CannedResponse::ok("text/javascript", b"far too large for the cap"),
    );
    let url = server.url("/fat.js");

    let config = MonitorConfig {
        max_content_size: 4,
        ..Default::default()
    };
    let store = Arc::new(MemoryHistoryStore::new());
    let checker = checker_with(&config, &store);
    let result = checker
        .check(&url, &CancellationToken::new(), "monitor-test", None)
        .await;

    let error = result.error.expect("oversized body is an error");
    assert!(error.message.contains("content_too_large"));
    assert_eq!(store.record_count().await, 0);
}

#[tokio::test]
async fn cancelled_token_aborts_the_fetch() {
    init_tracing();
    let server = TestServer::start().await;
    server.set_response(
        "/slow.js",
        CannedResponse::ok("text/javascript", b"X")
            .with_delay(std::time::Duration::from_secs(5)),
    );
    let url = server.url("/slow.js");

    let store = Arc::new(MemoryHistoryStore::new());
    let checker = checker_with(&MonitorConfig::default(), &store);

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let result = checker.check(&url, &token, "monitor-test", None).await;
    let error = result.error.expect("cancellation surfaces as a fetch error");
    assert_eq!(error.source, webvigil_model::ErrorSource::Fetch);
    assert_eq!(store.record_count().await, 0);
}
