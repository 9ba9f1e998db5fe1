use super::mime;
use crate::url::CrawlUrl;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use url::Url;

/// Response metadata for one fetch
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// URL the response was served from
    pub url: Url,
}

impl FetchResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_html(&self) -> bool {
        self.content_type().is_some_and(mime::is_html)
    }
}

/// The outcome of fetching one link
///
/// Exactly one of these is produced per segment entry. Robots-excluded links
/// carry no response and no error.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: CrawlUrl,
    pub response: Option<FetchResponse>,
    pub content: Vec<u8>,
    pub fetch_error: Option<String>,
    /// When the request started
    pub fetch_time: DateTime<Utc>,
    pub excluded_by_robots: bool,
    /// The body exceeded `max-content-size` and was cut short
    pub content_truncated: bool,
}

impl FetchResult {
    pub fn robots_excluded(url: CrawlUrl) -> Self {
        Self {
            url,
            response: None,
            content: Vec::new(),
            fetch_error: None,
            fetch_time: Utc::now(),
            excluded_by_robots: true,
            content_truncated: false,
        }
    }

    pub fn failed(url: CrawlUrl, fetch_time: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            url,
            response: None,
            content: Vec::new(),
            fetch_error: Some(error.into()),
            fetch_time,
            excluded_by_robots: false,
            content_truncated: false,
        }
    }

    pub fn fetched(
        url: CrawlUrl,
        fetch_time: DateTime<Utc>,
        response: FetchResponse,
        content: Vec<u8>,
        content_truncated: bool,
    ) -> Self {
        Self {
            url,
            response: Some(response),
            content,
            fetch_error: None,
            fetch_time,
            excluded_by_robots: false,
            content_truncated,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    /// Content-Type without parameters, if a response was received
    pub fn mime_type(&self) -> Option<String> {
        self.response
            .as_ref()
            .and_then(|r| r.content_type())
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
    }
}
