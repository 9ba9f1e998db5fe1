//! Integration tests for claims and segment dispatch
//!
//! Several datastore handles share one database file, the way separate
//! crawler processes would.

use chrono::Utc;
use rill::config::{DatastoreConfig, DispatcherConfig};
use rill::fetcher::FetchResult;
use rill::storage::{Datastore, DispatchStore, SqliteDatastore};
use rill::url::CrawlUrl;
use rill::Dispatcher;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

fn open(db_path: &Path, claim_batch_size: usize) -> Arc<SqliteDatastore> {
    let config = DatastoreConfig {
        database_path: db_path.to_string_lossy().into_owned(),
        claim_batch_size,
        ..DatastoreConfig::default()
    };
    Arc::new(SqliteDatastore::open(&config).expect("open datastore"))
}

fn url(s: &str) -> CrawlUrl {
    CrawlUrl::parse(s).expect("valid url")
}

fn dispatcher(store: &Arc<SqliteDatastore>) -> Dispatcher {
    Dispatcher::new(DispatcherConfig::default(), store.clone())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claims_are_exclusive_across_stores() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("shared.db");
    let stores: Vec<_> = (0..6).map(|_| open(&db, 1)).collect();

    let tokens: HashSet<_> = stores.iter().map(|s| s.token()).collect();
    assert_eq!(tokens.len(), stores.len());

    let domains: Vec<String> = (0..200).map(|i| format!("site{:03}.com", i)).collect();
    for domain in &domains {
        stores[0].seed(&url(&format!("http://{}/", domain))).unwrap();
    }
    assert_eq!(dispatcher(&stores[0]).dispatch_once().await.unwrap(), 200);

    let tasks: Vec<_> = stores
        .iter()
        .map(|store| {
            let store = Arc::clone(store);
            tokio::spawn(async move {
                let mut won = Vec::new();
                while let Some(domain) = store.claim_new_host().await.unwrap() {
                    won.push(domain);
                }
                won
            })
        })
        .collect();

    let mut wins = Vec::with_capacity(tasks.len());
    for task in tasks {
        wins.push(task.await.unwrap());
    }

    let total: usize = wins.iter().map(Vec::len).sum();
    let unique: HashSet<&String> = wins.iter().flatten().collect();
    assert_eq!(total, domains.len());
    assert_eq!(unique.len(), domains.len());

    for (store, won) in stores.iter().zip(&wins) {
        for domain in won {
            assert_eq!(
                store.domain_record(domain).unwrap().unwrap().claim_token,
                store.token()
            );
        }
    }
}

#[tokio::test]
async fn test_foreign_claim_is_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("shared.db");
    let owner = open(&db, 1);
    let other = open(&db, 1);

    owner.seed(&url("http://held.com/page")).unwrap();
    dispatcher(&owner).dispatch_once().await.unwrap();
    assert_eq!(owner.claim_new_host().await.unwrap().as_deref(), Some("held.com"));

    // Another process can neither read the segment nor release the claim
    assert_eq!(other.links_for_host("held.com").await.unwrap().len(), 0);
    other.unclaim_host("held.com").await.unwrap();
    other.unclaim_all().await.unwrap();
    assert!(owner.domain_record("held.com").unwrap().unwrap().is_claimed());

    let segment = owner.links_for_host("held.com").await.unwrap();
    assert_eq!(segment.len(), 1);
}

#[tokio::test]
async fn test_seeding_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("crawl.db"), 10);

    for _ in 0..3 {
        store.seed(&url("http://repeat.com/page")).unwrap();
    }
    let origin = FetchResult::failed(url("http://origin.com/"), Utc::now(), "unused");
    store
        .store_parsed_url(&url("http://repeat.com/page"), &origin)
        .await
        .unwrap();

    assert_eq!(store.link_history("repeat.com").await.unwrap().len(), 1);
    assert!(!store.add_domain("repeat.com", 5).unwrap());
}

#[tokio::test]
async fn test_crawled_link_left_out_of_segment() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("crawl.db"), 10);

    store.seed(&url("http://mixed.com/done")).unwrap();
    store.seed(&url("http://mixed.com/todo")).unwrap();
    store
        .store_url_fetch_results(&FetchResult::failed(
            url("http://mixed.com/done"),
            Utc::now(),
            "connection refused",
        ))
        .await
        .unwrap();

    dispatcher(&store).dispatch_once().await.unwrap();
    assert_eq!(store.claim_new_host().await.unwrap().as_deref(), Some("mixed.com"));

    let paths: Vec<String> = store
        .links_for_host("mixed.com")
        .await
        .unwrap()
        .map(|link| link.path())
        .collect();
    assert_eq!(paths, vec!["/todo".to_string()]);
}

#[tokio::test]
async fn test_segment_capped() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("crawl.db"), 10);

    for i in 0..600 {
        store
            .seed(&url(&format!("http://large.com/page/{}", i)))
            .unwrap();
    }

    dispatcher(&store).dispatch_once().await.unwrap();
    assert_eq!(store.segment_len("large.com").unwrap(), 500);

    store.claim_new_host().await.unwrap();
    let segment = store.links_for_host("large.com").await.unwrap();
    let unique: HashSet<String> = segment.map(|link| link.path()).collect();
    assert_eq!(unique.len(), 500);
}

#[tokio::test]
async fn test_domain_without_links_still_dispatched() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("crawl.db"), 10);

    assert!(store.add_domain("bare.com", 0).unwrap());
    assert_eq!(dispatcher(&store).dispatch_once().await.unwrap(), 1);

    let record = store.domain_record("bare.com").unwrap().unwrap();
    assert!(record.dispatched);
    assert_eq!(store.segment_len("bare.com").unwrap(), 0);

    assert_eq!(store.claim_new_host().await.unwrap().as_deref(), Some("bare.com"));
    assert_eq!(store.links_for_host("bare.com").await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_released_domain_redispatched() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("crawl.db"), 10);
    let dispatcher = dispatcher(&store);

    store.seed(&url("http://cycle.com/")).unwrap();
    assert_eq!(dispatcher.dispatch_once().await.unwrap(), 1);
    assert_eq!(dispatcher.dispatch_once().await.unwrap(), 0);

    store.claim_new_host().await.unwrap();
    assert_eq!(dispatcher.dispatch_once().await.unwrap(), 0);

    store.unclaim_host("cycle.com").await.unwrap();
    let record = store.domain_record("cycle.com").unwrap().unwrap();
    assert!(!record.is_claimed());
    assert!(!record.dispatched);

    assert_eq!(dispatcher.dispatch_once().await.unwrap(), 1);
}

#[tokio::test]
async fn test_excluded_domain_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("crawl.db"), 10);

    store.seed(&url("http://banned.com/")).unwrap();
    store.exclude_domain("banned.com", "operator request").unwrap();

    assert_eq!(dispatcher(&store).dispatch_once().await.unwrap(), 0);
    assert!(store.claim_new_host().await.unwrap().is_none());

    let record = store.domain_record("banned.com").unwrap().unwrap();
    assert!(record.excluded);
    assert_eq!(record.exclude_reason.as_deref(), Some("operator request"));
}
