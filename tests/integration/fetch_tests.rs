//! Integration tests for the fetch pipeline
//!
//! Every host is routed to a single wiremock server by a test transport, so
//! seeded links keep their real domain names while the requests land on the
//! mock. Each test seeds a temporary database, dispatches once, and runs a
//! fetch manager until the seeded links are recorded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{redirect::Policy, Client, Response};
use rill::config::Config;
use rill::fetcher::{FetchManager, FetchResult, Handler, Transport};
use rill::lifecycle::RunState;
use rill::storage::{LinkRecord, SqliteDatastore};
use rill::url::CrawlUrl;
use rill::{Dispatcher, RillError};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Sends every request to the mock server, keeping path and query
///
/// Requests for a path listed in `broken` fail inside reqwest before any
/// connection is made.
struct MockTransport {
    base: Url,
    client: Client,
    broken: Vec<String>,
}

impl MockTransport {
    fn new(server: &MockServer) -> Self {
        Self {
            base: Url::parse(&server.uri()).expect("mock server uri"),
            client: Client::builder()
                .redirect(Policy::none())
                .build()
                .expect("client"),
            broken: Vec::new(),
        }
    }

    fn failing(mut self, path: &str) -> Self {
        self.broken.push(path.to_string());
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &Url) -> rill::Result<Response> {
        let target = if self.broken.iter().any(|p| p == url.path()) {
            Url::parse("ftp://unreachable.invalid/").expect("static url")
        } else {
            let mut target = self.base.clone();
            target.set_path(url.path());
            target.set_query(url.query());
            target
        };
        self.client
            .get(target)
            .send()
            .await
            .map_err(|source| RillError::Http {
                url: url.to_string(),
                source,
            })
    }
}

/// What a handler saw of one fetch
#[derive(Debug, Clone)]
struct Seen {
    url: String,
    fetch_time: DateTime<Utc>,
    bytes: usize,
    truncated: bool,
}

/// Remembers every result it is handed
#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<Seen>>,
}

impl RecordingHandler {
    fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn all(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn fetch_times(&self) -> Vec<DateTime<Utc>> {
        self.all().into_iter().map(|s| s.fetch_time).collect()
    }

    fn urls(&self) -> Vec<String> {
        self.all().into_iter().map(|s| s.url).collect()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle(&self, result: &FetchResult) {
        self.seen.lock().unwrap().push(Seen {
            url: result.url.to_string(),
            fetch_time: result.fetch_time,
            bytes: result.content.len(),
            truncated: result.content_truncated,
        });
    }
}

fn create_test_config(db_path: &Path, crawl_delay_ms: u64) -> Config {
    let mut config = Config::default();
    config.user_agent.crawler_name = "TestBot".to_string();
    config.fetcher.num_fetchers = 1;
    config.fetcher.default_crawl_delay_ms = crawl_delay_ms;
    config.fetcher.idle_backoff_ms = 20;
    config.fetcher.http_timeout_secs = 5;
    config.datastore.database_path = db_path.to_string_lossy().into_owned();
    config.datastore.claim_batch_size = 1;
    config
}

/// Seeds the URLs and dispatches every domain once
async fn seed_and_dispatch(config: &Config, store: &Arc<SqliteDatastore>, urls: &[&str]) {
    for raw in urls {
        store
            .seed(&CrawlUrl::parse(raw).expect("seed url"))
            .expect("seed");
    }
    let dispatcher = Dispatcher::new(config.dispatcher.clone(), store.clone());
    dispatcher.dispatch_once().await.expect("dispatch");
}

/// Runs a manager until `done` holds or the deadline passes, then stops it
async fn run_until<F>(
    config: &Config,
    store: &Arc<SqliteDatastore>,
    transport: MockTransport,
    handler: Arc<RecordingHandler>,
    deadline: Duration,
    done: F,
) where
    F: Fn() -> bool,
{
    let manager = Arc::new(FetchManager::new(config.clone()));
    manager.set_datastore(store.clone()).unwrap();
    manager.set_transport(Arc::new(transport)).unwrap();
    manager.add_handler(handler).unwrap();

    let running = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.start().await }
    });

    let started = std::time::Instant::now();
    while !done() && started.elapsed() < deadline {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    manager.stop().await.unwrap();
    running.await.unwrap().unwrap();
    assert_eq!(manager.state(), RunState::Stopped);
}

fn record<'a>(records: &'a [LinkRecord], path: &str) -> &'a LinkRecord {
    records
        .iter()
        .find(|r| r.key.path == path)
        .unwrap_or_else(|| panic!("no link record for {}", path))
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

#[tokio::test]
async fn test_crawl_without_robots() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><body>
            <a href="/page1">One</a>
            <a href="/page3">Three</a>
            <a href="http://other.com/welcome">Elsewhere</a>
            </body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html("<html><body>One</body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html("<html><body>Two</body></html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&dir.path().join("crawl.db"), 10);
    let store = Arc::new(SqliteDatastore::open(&config.datastore).unwrap());

    seed_and_dispatch(
        &config,
        &store,
        &[
            "http://norobots.com/",
            "http://norobots.com/page1",
            "http://norobots.com/page2",
        ],
    )
    .await;
    assert_eq!(store.segment_len("norobots.com").unwrap(), 3);

    let handler = Arc::new(RecordingHandler::default());
    let watched = handler.clone();
    run_until(
        &config,
        &store,
        MockTransport::new(&server),
        handler.clone(),
        Duration::from_secs(10),
        move || {
            watched.count() >= 3
        },
    )
    .await;

    assert_eq!(handler.count(), 3);

    let records = store.link_records("norobots.com").unwrap();
    for seeded in ["/", "/page1", "/page2"] {
        let link = record(&records, seeded);
        assert!(link.is_crawled(), "{} not crawled", seeded);
        assert_eq!(link.status, Some(200));
        assert_eq!(link.mime.as_deref(), Some("text/html"));
        assert!(!link.robots_excluded);
    }

    // Discovered but never dispatched
    assert!(!record(&records, "/page3").is_crawled());

    let other = store.domain_record("other.com").unwrap().expect("new domain");
    assert!(!other.is_claimed());
    assert!(!other.dispatched);
    assert!(!store.link_records("other.com").unwrap()[0].is_crawled());

    let crawled = store.domain_record("norobots.com").unwrap().unwrap();
    assert!(!crawled.is_claimed());
}

#[tokio::test]
async fn test_robots_crawl_delay_respected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("User-agent: *\nCrawl-delay: 2\n", "text/plain"),
        )
        .mount(&server)
        .await;
    for page in ["/a", "/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(html("<html><body>slow down</body></html>"))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&dir.path().join("crawl.db"), 1000);
    let store = Arc::new(SqliteDatastore::open(&config.datastore).unwrap());

    seed_and_dispatch(
        &config,
        &store,
        &[
            "http://robotsdelay2.com/a",
            "http://robotsdelay2.com/b",
            "http://robotsdelay2.com/c",
        ],
    )
    .await;

    let handler = Arc::new(RecordingHandler::default());
    let watched = handler.clone();
    run_until(
        &config,
        &store,
        MockTransport::new(&server),
        handler.clone(),
        Duration::from_secs(20),
        move || {
            watched.count() >= 3
        },
    )
    .await;

    let times = handler.fetch_times();
    assert_eq!(times.len(), 3);
    let first = times.iter().min().unwrap();
    let last = times.iter().max().unwrap();
    assert!(
        *last - *first >= chrono::Duration::seconds(4),
        "fetches only {:?} apart",
        *last - *first
    );
}

#[tokio::test]
async fn test_robots_disallowed_link_never_requested() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("User-agent: *\nDisallow: /private\n", "text/plain"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/data"))
        .respond_with(html("<html><body>secret</body></html>"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html("<html><body>hello</body></html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&dir.path().join("crawl.db"), 10);
    let store = Arc::new(SqliteDatastore::open(&config.datastore).unwrap());

    seed_and_dispatch(
        &config,
        &store,
        &["http://guarded.com/private/data", "http://guarded.com/public"],
    )
    .await;

    let handler = Arc::new(RecordingHandler::default());
    let polled = store.clone();
    run_until(
        &config,
        &store,
        MockTransport::new(&server),
        handler.clone(),
        Duration::from_secs(10),
        move || {
            polled
                .link_records("guarded.com")
                .map(|records| records.iter().all(|r| r.is_crawled()))
                .unwrap_or(false)
        },
    )
    .await;

    let records = store.link_records("guarded.com").unwrap();
    let private = record(&records, "/private/data");
    assert!(private.robots_excluded);
    assert!(private.is_crawled());
    assert_eq!(private.status, None);

    let public = record(&records, "/public");
    assert!(!public.robots_excluded);
    assert_eq!(public.status, Some(200));

    // Robots-excluded links never reach handlers
    assert_eq!(handler.urls(), vec!["http://guarded.com/public".to_string()]);
}

#[tokio::test]
async fn test_redirect_location_becomes_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&dir.path().join("crawl.db"), 10);
    let store = Arc::new(SqliteDatastore::open(&config.datastore).unwrap());

    seed_and_dispatch(&config, &store, &["http://moved.com/old"]).await;

    let handler = Arc::new(RecordingHandler::default());
    let watched = handler.clone();
    run_until(
        &config,
        &store,
        MockTransport::new(&server),
        handler.clone(),
        Duration::from_secs(10),
        move || {
            watched.count() >= 1
        },
    )
    .await;

    let records = store.link_records("moved.com").unwrap();
    assert_eq!(record(&records, "/old").status, Some(301));
    assert!(!record(&records, "/new").is_crawled());
}

#[tokio::test]
async fn test_configuration_rejected_while_running() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&dir.path().join("crawl.db"), 10);
    let store = Arc::new(SqliteDatastore::open(&config.datastore).unwrap());

    let manager = Arc::new(FetchManager::new(config));
    manager.set_datastore(store.clone()).unwrap();
    manager.set_transport(Arc::new(MockTransport::new(&server))).unwrap();

    let running = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.start().await }
    });

    for _ in 0..100 {
        if manager.state() == RunState::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(manager.state(), RunState::Running);

    assert!(manager.add_handler(Arc::new(RecordingHandler::default())).is_err());
    assert!(manager.set_datastore(store).is_err());
    assert!(manager.start().await.is_err());

    manager.stop().await.unwrap();
    running.await.unwrap().unwrap();

    // A stopped manager cannot be restarted or stopped again
    assert!(manager.start().await.is_err());
    assert!(manager.stop().await.is_err());
}

#[tokio::test]
async fn test_transport_error_recorded_and_crawl_continues() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fine"))
        .respond_with(html("<html><body>fine</body></html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&dir.path().join("crawl.db"), 10);
    let store = Arc::new(SqliteDatastore::open(&config.datastore).unwrap());

    // Segments drain in path order, so /broken is fetched first
    seed_and_dispatch(
        &config,
        &store,
        &["http://flaky.com/broken", "http://flaky.com/fine"],
    )
    .await;

    let handler = Arc::new(RecordingHandler::default());
    let polled = store.clone();
    run_until(
        &config,
        &store,
        MockTransport::new(&server).failing("/broken"),
        handler.clone(),
        Duration::from_secs(10),
        move || {
            polled
                .link_records("flaky.com")
                .map(|records| records.iter().all(|r| r.is_crawled()))
                .unwrap_or(false)
        },
    )
    .await;

    let records = store.link_records("flaky.com").unwrap();
    let broken = record(&records, "/broken");
    assert!(broken.is_crawled());
    assert_eq!(broken.status, None);
    assert!(broken.error.is_some());
    assert!(!broken.robots_excluded);

    let fine = record(&records, "/fine");
    assert_eq!(fine.status, Some(200));
    assert!(fine.error.is_none());

    // Only fetches that got a response reach handlers
    assert_eq!(handler.urls(), vec!["http://flaky.com/fine".to_string()]);
}

#[tokio::test]
async fn test_body_truncated_at_max_content_size() {
    let server = MockServer::start().await;

    let page = format!("<html><body>{}</body></html>", "x".repeat(4096));
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(html(&page))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/small"))
        .respond_with(html("<p>tiny</p>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&dir.path().join("crawl.db"), 10);
    config.fetcher.max_content_size = 100;
    let store = Arc::new(SqliteDatastore::open(&config.datastore).unwrap());

    seed_and_dispatch(
        &config,
        &store,
        &["http://bulky.com/big", "http://bulky.com/small"],
    )
    .await;

    let handler = Arc::new(RecordingHandler::default());
    let watched = handler.clone();
    run_until(
        &config,
        &store,
        MockTransport::new(&server),
        handler.clone(),
        Duration::from_secs(10),
        move || watched.count() >= 2,
    )
    .await;

    let seen = handler.all();
    let big = seen.iter().find(|s| s.url.ends_with("/big")).unwrap();
    assert!(big.truncated);
    assert_eq!(big.bytes, 100);

    let small = seen.iter().find(|s| s.url.ends_with("/small")).unwrap();
    assert!(!small.truncated);
    assert_eq!(small.bytes, "<p>tiny</p>".len());

    let records = store.link_records("bulky.com").unwrap();
    assert_eq!(record(&records, "/big").status, Some(200));
}
