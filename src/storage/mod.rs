//! Storage module for the shared crawl state
//!
//! This module handles every read and write of crawl coordination data:
//! - Per-domain claim, dispatch and exclusion state
//! - The append-only link history
//! - Per-domain segments and the dispatch queue
//!
//! All crawler processes share one database; see [`SqliteDatastore`].

mod schema;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use sqlite::{DomainRecord, LinkRecord, SqliteDatastore};
pub use traits::{Datastore, DispatchStore, LinkHistory, Segment, StoreError, StoreResult};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Claim token of a domain no crawler holds
pub const UNCLAIMED_TOKEN: Uuid = Uuid::nil();

/// Crawl time recorded for links that have never been fetched
pub fn never_crawled() -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
}
