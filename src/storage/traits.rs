//! Storage traits and error types
//!
//! [`Datastore`] is the fetch-side contract, [`DispatchStore`] the
//! dispatcher-side one. Every operation may fail transiently; callers log
//! and treat a failure as "no progress this cycle".

use crate::fetcher::FetchResult;
use crate::url::{CrawlUrl, LinkKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection lock poisoned")]
    LockPoisoned,

    #[error("Invalid timestamp in store: {0}")]
    Timestamp(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// One history row as seen by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHistory {
    pub key: LinkKey,
    pub time: DateTime<Utc>,
}

/// The links queued for one domain, already removed from the store
///
/// A one-shot iterator: the rows were deleted when it was created.
#[derive(Debug)]
pub struct Segment {
    domain: String,
    links: std::vec::IntoIter<CrawlUrl>,
}

impl Segment {
    pub fn new(domain: impl Into<String>, links: Vec<CrawlUrl>) -> Self {
        Self {
            domain: domain.into(),
            links: links.into_iter(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Iterator for Segment {
    type Item = CrawlUrl;

    fn next(&mut self) -> Option<CrawlUrl> {
        self.links.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.links.size_hint()
    }
}

impl ExactSizeIterator for Segment {}

/// Fetch-side view of the shared crawl state
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Claims a dispatched, unclaimed, non-excluded domain
    ///
    /// Returns `None` when nothing is available, including when another
    /// process won the race for every candidate.
    async fn claim_new_host(&self) -> StoreResult<Option<String>>;

    /// Releases a claim and drops the domain's segment. Idempotent.
    async fn unclaim_host(&self, domain: &str) -> StoreResult<()>;

    /// Drains and deletes the segment of a claimed domain
    async fn links_for_host(&self, domain: &str) -> StoreResult<Segment>;

    /// Appends the outcome of a fetch to the link history
    async fn store_url_fetch_results(&self, result: &FetchResult) -> StoreResult<()>;

    /// Records a discovered link as not yet crawled
    ///
    /// Repeated calls for one link leave a single uncrawled row.
    async fn store_parsed_url(&self, url: &CrawlUrl, origin: &FetchResult) -> StoreResult<()>;

    /// Releases every claim held by this store, including batch-cached ones
    async fn unclaim_all(&self) -> StoreResult<()>;
}

/// Dispatcher-side view of the shared crawl state
#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Unclaimed, undispatched, non-excluded domains, highest priority first
    async fn undispatched_domains(&self) -> StoreResult<Vec<String>>;

    /// Every history row of a domain ordered by (subdomain, path, protocol, time)
    async fn link_history(&self, domain: &str) -> StoreResult<Vec<LinkHistory>>;

    /// Writes a segment and marks the domain dispatched
    ///
    /// Returns `false` without writing if the domain was claimed or
    /// dispatched in the meantime.
    async fn write_segment(&self, domain: &str, links: &[LinkKey]) -> StoreResult<bool>;
}
