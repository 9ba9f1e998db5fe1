//! HTTP transport used for page and robots.txt requests

use crate::config::{FetcherConfig, UserAgentConfig};
use crate::net::{DnsCache, LookupDialer};
use crate::RillError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Response};
use std::sync::Arc;
use url::Url;

/// Issues a single GET without following redirects
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> crate::Result<Response>;
}

/// Builds an HTTP client with proper configuration
///
/// The User-Agent is `CrawlerName/Version (+ContactURL; ContactEmail)`.
/// Redirects are never followed: 3xx responses are recorded and their
/// `Location` fed back as a discovered link. Host names resolve through
/// `resolver`.
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetcher: &FetcherConfig,
    resolver: DnsCache<LookupDialer>,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(fetcher.http_timeout())
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .dns_resolver(Arc::new(resolver))
        .build()
}

/// The default transport: a reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &UserAgentConfig, fetcher: &FetcherConfig) -> crate::Result<Self> {
        let resolver = DnsCache::from_config(LookupDialer, fetcher);
        let client = build_http_client(user_agent, fetcher, resolver)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> crate::Result<Response> {
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| RillError::Http {
                url: url.to_string(),
                source,
            })
    }
}

/// Reads at most `limit` bytes of a body
///
/// Returns the bytes and whether the body was cut short.
pub async fn read_body(mut response: Response, limit: usize) -> reqwest::Result<(Vec<u8>, bool)> {
    let mut body = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        let remaining = limit - body.len();
        if chunk.len() > remaining {
            body.extend_from_slice(&chunk[..remaining]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }

    Ok((body, false))
}
