//! URL handling module for Rill
//!
//! Every link the crawler touches is a [`CrawlUrl`]: an absolute http(s)
//! URL whose host has been split into a registrable domain (TLD+1) and a
//! subdomain. The (domain, subdomain, path, protocol) tuple is the link's
//! identity in the datastore.

mod domain;
mod normalize;

use crate::{UrlError, UrlResult};
use std::fmt;
use url::Url;

pub use domain::split_host;
pub use normalize::normalize_url;

/// The datastore identity of a link
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    pub subdomain: String,
    pub path: String,
    pub protocol: String,
}

/// An absolute http(s) URL with its host split for storage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrawlUrl {
    url: Url,
    domain: String,
    subdomain: String,
}

impl CrawlUrl {
    /// Parses and validates an absolute URL string
    ///
    /// # Examples
    ///
    /// ```
    /// use rill::CrawlUrl;
    ///
    /// let url = CrawlUrl::parse("https://www.example.com/a?b=1#frag").unwrap();
    /// assert_eq!(url.domain(), "example.com");
    /// assert_eq!(url.subdomain(), "www");
    /// assert_eq!(url.path(), "/a?b=1");
    /// assert_eq!(url.protocol(), "https");
    /// ```
    pub fn parse(input: &str) -> UrlResult<Self> {
        let url = Url::parse(input.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
        Self::from_url(url)
    }

    /// Wraps an already parsed URL
    ///
    /// Fails for non-http(s) schemes, missing hosts and explicit
    /// non-default ports, which the link tuple cannot represent. The
    /// fragment is dropped.
    pub fn from_url(mut url: Url) -> UrlResult<Self> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(UrlError::InvalidScheme(other.to_string())),
        }

        if url.port().is_some() {
            return Err(UrlError::Malformed(format!(
                "explicit port in {}",
                url.as_str()
            )));
        }

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(UrlError::MissingDomain),
        };

        url.set_fragment(None);
        let (domain, subdomain) = split_host(&host);

        Ok(Self {
            url,
            domain,
            subdomain,
        })
    }

    /// Rebuilds a URL from its stored tuple
    pub fn from_parts(domain: &str, subdomain: &str, path: &str, protocol: &str) -> UrlResult<Self> {
        let host = if subdomain.is_empty() {
            domain.to_string()
        } else {
            format!("{}.{}", subdomain, domain)
        };
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Self::parse(&format!("{}://{}{}", protocol, host, path))
    }

    /// The registrable domain (TLD+1)
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Host labels left of the registrable domain, possibly empty
    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    /// `http` or `https`
    pub fn protocol(&self) -> &str {
        self.url.scheme()
    }

    /// Path including the query string
    pub fn path(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    pub fn key(&self) -> LinkKey {
        LinkKey {
            subdomain: self.subdomain.clone(),
            path: self.path(),
            protocol: self.protocol().to_string(),
        }
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Resolves `href` against this URL
    pub fn join(&self, href: &str) -> UrlResult<Self> {
        let joined = self
            .url
            .join(href)
            .map_err(|e| UrlError::Parse(e.to_string()))?;
        Self::from_url(joined)
    }
}

impl fmt::Display for CrawlUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}
