use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Rill
///
/// Every section and key has a default, so an empty file is a valid
/// configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub fetcher: FetcherConfig,
    pub dispatcher: DispatcherConfig,
    pub datastore: DatastoreConfig,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler, also used to select the robots.txt group
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "Rill".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/crawler".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Full User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }

    /// The product token matched against robots.txt `User-agent` lines
    pub fn robots_name(&self) -> &str {
        &self.crawler_name
    }
}

/// Fetch worker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Number of concurrent fetch workers in this process
    #[serde(rename = "num-fetchers")]
    pub num_fetchers: usize,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "default-crawl-delay-ms")]
    pub default_crawl_delay_ms: u64,

    /// Upper bound on a robots.txt Crawl-delay (seconds)
    #[serde(rename = "max-crawl-delay-secs")]
    pub max_crawl_delay_secs: u64,

    /// Maximum number of body bytes kept per fetch
    #[serde(rename = "max-content-size")]
    pub max_content_size: usize,

    /// Whole-request timeout (seconds)
    #[serde(rename = "http-timeout-secs")]
    pub http_timeout_secs: u64,

    /// Back-off when no host can be claimed (milliseconds)
    #[serde(rename = "idle-backoff-ms")]
    pub idle_backoff_ms: u64,

    /// Content types whose bodies are read
    #[serde(rename = "accept-formats")]
    pub accept_formats: Vec<String>,

    /// HTML tags excluded from link extraction
    #[serde(rename = "ignore-tags")]
    pub ignore_tags: Vec<String>,

    /// Session-id query parameters stripped from discovered links
    #[serde(rename = "purge-sid-list")]
    pub purge_sid_list: Vec<String>,

    /// Skip link extraction on pages carrying `<meta name="robots" content="nofollow">`
    #[serde(rename = "honor-meta-nofollow")]
    pub honor_meta_nofollow: bool,

    /// Capacity of the DNS cache
    #[serde(rename = "max-dns-cache-entries")]
    pub max_dns_cache_entries: usize,

    /// Age after which a DNS cache entry is refreshed (seconds)
    #[serde(rename = "dns-staleness-secs")]
    pub dns_staleness_secs: u64,

    /// Refuse to connect to private, loopback and link-local addresses
    #[serde(rename = "blacklist-private-ips")]
    pub blacklist_private_ips: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            num_fetchers: 4,
            default_crawl_delay_ms: 1000,
            max_crawl_delay_secs: 120,
            max_content_size: 20 * 1024 * 1024,
            http_timeout_secs: 30,
            idle_backoff_ms: 1000,
            accept_formats: vec!["text/html".to_string(), "text/*".to_string()],
            ignore_tags: Vec::new(),
            purge_sid_list: vec![
                "jsessionid".to_string(),
                "phpsessid".to_string(),
                "aspsessionid".to_string(),
            ],
            honor_meta_nofollow: false,
            max_dns_cache_entries: 20_000,
            dns_staleness_secs: 300,
            blacklist_private_ips: true,
        }
    }
}

impl FetcherConfig {
    pub fn default_crawl_delay(&self) -> Duration {
        Duration::from_millis(self.default_crawl_delay_ms)
    }

    pub fn max_crawl_delay(&self) -> Duration {
        Duration::from_secs(self.max_crawl_delay_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn dns_staleness(&self) -> Duration {
        Duration::from_secs(self.dns_staleness_secs)
    }
}

/// Segment dispatcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of domains whose segments are generated concurrently
    #[serde(rename = "num-concurrent-domains")]
    pub num_concurrent_domains: usize,

    /// Cap on the number of links in one generated segment
    #[serde(rename = "max-links-per-segment")]
    pub max_links_per_segment: usize,

    /// Pause between domain scans (seconds)
    #[serde(rename = "dispatch-interval-secs")]
    pub dispatch_interval_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            num_concurrent_domains: 2,
            max_links_per_segment: 500,
            dispatch_interval_secs: 10,
        }
    }
}

impl DispatcherConfig {
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_secs)
    }
}

/// Datastore configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Path to the shared SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Create domains for links discovered on unknown domains
    #[serde(rename = "add-new-domains")]
    pub add_new_domains: bool,

    /// Number of domains claimed per query and cached locally
    #[serde(rename = "claim-batch-size")]
    pub claim_batch_size: usize,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            database_path: "./rill.db".to_string(),
            add_new_domains: true,
            claim_batch_size: 10,
        }
    }
}
