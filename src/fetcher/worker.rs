//! Single-host fetch loop
//!
//! A worker claims one domain at a time, loads its robots.txt, drains the
//! domain's segment with the crawl delay between requests, and reports every
//! result to the store and the registered handlers. Stop is observed before
//! each claim, before each link and during the crawl-delay sleep; an
//! in-flight request is allowed to finish.

use super::{read_body, FetchResponse, FetchResult, Handler, LinkExtractor, MimeMatcher, Transport};
use crate::config::FetcherConfig;
use crate::lifecycle::StopSignal;
use crate::robots::{effective_crawl_delay, fetch_robots};
use crate::storage::Datastore;
use crate::url::{normalize_url, CrawlUrl};
use chrono::Utc;
use std::sync::Arc;

/// Everything the workers of one manager share
pub(crate) struct WorkerContext {
    pub store: Arc<dyn Datastore>,
    pub transport: Arc<dyn Transport>,
    pub handlers: Vec<Arc<dyn Handler>>,
    pub config: FetcherConfig,
    /// Product token used for robots.txt group matching
    pub agent: String,
    pub mime: MimeMatcher,
    pub links: LinkExtractor,
}

pub(crate) struct FetchWorker {
    id: usize,
    ctx: Arc<WorkerContext>,
    stop: StopSignal,
    held: Option<String>,
}

impl FetchWorker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>, stop: StopSignal) -> Self {
        Self {
            id,
            ctx,
            stop,
            held: None,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(worker = self.id, "Fetch worker started");

        loop {
            self.release_held().await;

            if self.stop.is_stopping() {
                break;
            }

            let domain = match self.ctx.store.claim_new_host().await {
                Ok(Some(domain)) => domain,
                Ok(None) => {
                    if !self.stop.sleep(self.ctx.config.idle_backoff()).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!(worker = self.id, error = %e, "Failed to claim a domain");
                    if !self.stop.sleep(self.ctx.config.idle_backoff()).await {
                        break;
                    }
                    continue;
                }
            };

            self.held = Some(domain.clone());
            self.crawl_domain(&domain).await;
        }

        self.release_held().await;
        tracing::debug!(worker = self.id, "Fetch worker stopped");
    }

    async fn release_held(&mut self) {
        if let Some(domain) = self.held.take() {
            if let Err(e) = self.ctx.store.unclaim_host(&domain).await {
                tracing::warn!(worker = self.id, domain = %domain, error = %e, "Failed to release domain");
            }
        }
    }

    async fn crawl_domain(&mut self, domain: &str) {
        let robots = fetch_robots(self.ctx.transport.as_ref(), domain).await;
        let delay = effective_crawl_delay(
            self.ctx.config.default_crawl_delay(),
            self.ctx.config.max_crawl_delay(),
            &robots,
            &self.ctx.agent,
        );

        let segment = match self.ctx.store.links_for_host(domain).await {
            Ok(segment) => segment,
            Err(e) => {
                tracing::warn!(worker = self.id, domain, error = %e, "Failed to load segment");
                return;
            }
        };

        tracing::info!(
            worker = self.id,
            domain,
            links = segment.len(),
            delay_ms = delay.as_millis() as u64,
            "Crawling domain"
        );

        for url in segment {
            if self.stop.is_stopping() {
                break;
            }

            if !robots.is_allowed(url.as_str(), &self.ctx.agent) {
                tracing::debug!(worker = self.id, url = %url, "Excluded by robots.txt");
                self.store_result(&FetchResult::robots_excluded(url)).await;
                continue;
            }

            if !self.stop.sleep(delay).await {
                break;
            }

            let result = self.fetch(url).await;
            self.store_result(&result).await;

            if result.response.is_some() {
                for handler in &self.ctx.handlers {
                    handler.handle(&result).await;
                }
                self.discover_links(&result).await;
            }
        }
    }

    async fn fetch(&self, url: CrawlUrl) -> FetchResult {
        let fetch_time = Utc::now();

        let response = match self.ctx.transport.get(url.as_url()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(worker = self.id, url = %url, error = %e, "Fetch failed");
                return FetchResult::failed(url, fetch_time, e.to_string());
            }
        };

        let meta = FetchResponse {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
            url: response.url().clone(),
        };

        let accepted = meta
            .content_type()
            .is_some_and(|ct| self.ctx.mime.matches(ct));
        if !accepted {
            tracing::debug!(worker = self.id, url = %url, status = meta.status, "Body not read, content type not accepted");
            return FetchResult::fetched(url, fetch_time, meta, Vec::new(), false);
        }

        match read_body(response, self.ctx.config.max_content_size).await {
            Ok((content, truncated)) => {
                if truncated {
                    tracing::debug!(worker = self.id, url = %url, "Body truncated");
                }
                FetchResult::fetched(url, fetch_time, meta, content, truncated)
            }
            Err(e) => {
                let mut result = FetchResult::fetched(url, fetch_time, meta, Vec::new(), false);
                result.fetch_error = Some(e.to_string());
                result
            }
        }
    }

    async fn store_result(&self, result: &FetchResult) {
        if let Err(e) = self.ctx.store.store_url_fetch_results(result).await {
            tracing::error!(worker = self.id, url = %result.url, error = %e, "Failed to store fetch result");
        }
    }

    /// Feeds redirect targets and HTML outlinks back into the store
    async fn discover_links(&self, result: &FetchResult) {
        let Some(response) = &result.response else {
            return;
        };

        let mut discovered = Vec::new();

        if response.is_redirect() {
            if let Some(location) = response.location() {
                match result.url.as_url().join(location) {
                    Ok(target) => {
                        let target = normalize_url(target, &self.ctx.config.purge_sid_list);
                        match CrawlUrl::from_url(target) {
                            Ok(target) => discovered.push(target),
                            Err(e) => tracing::debug!(url = %result.url, location, error = %e, "Ignoring redirect target"),
                        }
                    }
                    Err(e) => tracing::debug!(url = %result.url, location, error = %e, "Ignoring redirect target"),
                }
            }
        }

        if response.is_html() && !result.content.is_empty() {
            discovered.extend(self.ctx.links.extract(
                &result.url,
                &result.content,
                response.content_type(),
            ));
        }

        if discovered.is_empty() {
            return;
        }

        tracing::debug!(worker = self.id, url = %result.url, links = discovered.len(), "Discovered links");
        for link in &discovered {
            if let Err(e) = self.ctx.store.store_parsed_url(link, result).await {
                tracing::warn!(worker = self.id, link = %link, error = %e, "Failed to store discovered link");
            }
        }
    }
}
