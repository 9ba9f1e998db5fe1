//! Outlink extraction from fetched HTML

use crate::config::FetcherConfig;
use crate::url::{normalize_url, CrawlUrl};
use encoding_rs::{Encoding, UTF_8};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// Tags whose targets are followed unless listed in `ignore-tags`
pub const LINK_TAGS: &[&str] = &["a", "area", "form", "frame", "iframe", "script", "link", "img"];

/// Attributes consulted for a tag's target, in order
const TARGET_ATTRS: &[&str] = &["href", "src", "action"];

/// Extracts outlinks from HTML bodies
///
/// # Link Extraction Rules
///
/// - Tags from [`LINK_TAGS`] minus the configured `ignore-tags`
/// - The first of `href`, `src`, `action` present on the element
/// - Resolved against `<base href>` when present, else the page URL
/// - Fragments dropped, session-id parameters purged
/// - Non-http(s) and malformed targets skipped
/// - Each URL reported once per page
pub struct LinkExtractor {
    selector: Option<Selector>,
    honor_meta_nofollow: bool,
    purge_sid_list: Vec<String>,
}

impl LinkExtractor {
    pub fn new(config: &FetcherConfig) -> Self {
        let tags: Vec<&str> = LINK_TAGS
            .iter()
            .copied()
            .filter(|tag| {
                !config
                    .ignore_tags
                    .iter()
                    .any(|ignored| ignored.eq_ignore_ascii_case(tag))
            })
            .collect();

        let selector = if tags.is_empty() {
            None
        } else {
            Selector::parse(&tags.join(", ")).ok()
        };

        Self {
            selector,
            honor_meta_nofollow: config.honor_meta_nofollow,
            purge_sid_list: config.purge_sid_list.clone(),
        }
    }

    /// Extracts links from a page body
    ///
    /// `content_type` supplies the charset used to decode `content`; a byte
    /// order mark takes precedence and UTF-8 is the fallback.
    pub fn extract(&self, page: &CrawlUrl, content: &[u8], content_type: Option<&str>) -> Vec<CrawlUrl> {
        let Some(selector) = &self.selector else {
            return Vec::new();
        };

        let html = decode(content, content_type);
        let document = Html::parse_document(&html);

        if self.honor_meta_nofollow && has_meta_nofollow(&document) {
            tracing::debug!(url = %page, "Page is marked nofollow, skipping link extraction");
            return Vec::new();
        }

        let base = base_href(&document)
            .and_then(|href| page.join(&href).ok())
            .unwrap_or_else(|| page.clone());

        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for element in document.select(selector) {
            let Some(target) = target_of(&element) else {
                continue;
            };

            let Some(link) = self.resolve(&base, target) else {
                continue;
            };

            if seen.insert(link.as_str().to_string()) {
                links.push(link);
            }
        }

        links
    }

    fn resolve(&self, base: &CrawlUrl, href: &str) -> Option<CrawlUrl> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }

        let joined = base.as_url().join(href).ok()?;
        if joined.scheme() != "http" && joined.scheme() != "https" {
            return None;
        }

        CrawlUrl::from_url(normalize_url(joined, &self.purge_sid_list)).ok()
    }
}

fn target_of<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    TARGET_ATTRS
        .iter()
        .find_map(|attr| element.value().attr(attr))
}

fn base_href(document: &Html) -> Option<String> {
    let selector = Selector::parse("base[href]").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr("href"))
        .map(|href| href.trim().to_string())
}

fn has_meta_nofollow(document: &Html) -> bool {
    let Ok(selector) = Selector::parse("meta[name][content]") else {
        return false;
    };

    document.select(&selector).any(|meta| {
        let name = meta.value().attr("name").unwrap_or("");
        let content = meta.value().attr("content").unwrap_or("");
        name.eq_ignore_ascii_case("robots")
            && content
                .split(',')
                .map(|d| d.trim().to_ascii_lowercase())
                .any(|d| d == "nofollow" || d == "none")
    })
}

/// Decodes a body using the Content-Type charset
fn decode(content: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_of)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(content);
    text.into_owned()
}

fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}
