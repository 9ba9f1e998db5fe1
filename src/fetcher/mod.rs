//! Fetch pipeline: the manager, its per-host workers and their collaborators
//!
//! This module contains:
//! - The [`FetchManager`] and the per-host fetch loop it runs
//! - The [`Transport`] seam and its reqwest implementation
//! - Content-type gating and HTML link extraction
//! - The [`FetchResult`] handed to [`Handler`]s and the datastore

mod handler;
mod links;
mod manager;
mod mime;
mod result;
mod transport;
mod worker;

pub use handler::{Handler, LoggingHandler};
pub use links::{LinkExtractor, LINK_TAGS};
pub use manager::FetchManager;
pub use mime::{is_html, MimeMatcher};
pub use result::{FetchResponse, FetchResult};
pub use transport::{build_http_client, read_body, HttpTransport, Transport};
