//! Rill: a distributed, segment-based web crawler
//!
//! Crawler processes cooperate through a shared datastore. A dispatcher turns
//! each domain's link history into a bounded segment of uncrawled links, and
//! fetch workers claim domains, drain their segments politely, and feed newly
//! discovered links back into the store.

pub mod config;
pub mod dispatcher;
pub mod fetcher;
pub mod lifecycle;
pub mod net;
pub mod robots;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Rill operations
#[derive(Debug, Error)]
pub enum RillError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StoreError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid MIME pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Rill operations
pub type Result<T> = std::result::Result<T, RillError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use fetcher::{FetchManager, FetchResult, Handler};
pub use storage::{Datastore, DispatchStore, SqliteDatastore};
pub use url::CrawlUrl;
