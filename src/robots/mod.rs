//! Robots.txt handling module
//!
//! Workers load one robots.txt per claimed domain and keep it for the
//! duration of that claim. Any failure to obtain the file means the domain
//! is crawled without restrictions.

mod parser;

pub use parser::ParsedRobots;

use crate::fetcher::{read_body, Transport};
use std::time::Duration;
use url::Url;

/// Bytes of robots.txt considered; the rest of a longer file is ignored
pub const MAX_ROBOTS_BYTES: usize = 512 * 1024;

/// Fetches and parses `http://<domain>/robots.txt`
///
/// Transport errors, non-2xx statuses and undecodable bodies all yield
/// [`ParsedRobots::allow_all`]. Redirects are not followed.
pub async fn fetch_robots(transport: &dyn Transport, domain: &str) -> ParsedRobots {
    let robots_url = match Url::parse(&format!("http://{}/robots.txt", domain)) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(domain, error = %e, "Cannot build robots.txt URL");
            return ParsedRobots::allow_all();
        }
    };

    let response = match transport.get(&robots_url).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(domain, error = %e, "robots.txt unavailable, allowing all");
            return ParsedRobots::allow_all();
        }
    };

    if !response.status().is_success() {
        tracing::debug!(
            domain,
            status = response.status().as_u16(),
            "robots.txt not found, allowing all"
        );
        return ParsedRobots::allow_all();
    }

    match read_body(response, MAX_ROBOTS_BYTES).await {
        Ok((body, truncated)) => {
            if truncated {
                tracing::debug!(domain, limit = MAX_ROBOTS_BYTES, "robots.txt truncated");
            }
            ParsedRobots::from_content(&String::from_utf8_lossy(&body))
        }
        Err(e) => {
            tracing::debug!(domain, error = %e, "robots.txt body unreadable, allowing all");
            ParsedRobots::allow_all()
        }
    }
}

/// Combines the configured default delay with a robots Crawl-delay
///
/// The larger of the two wins. The robots value is capped at `max`, and a
/// value too large to represent counts as `max`.
pub fn effective_crawl_delay(
    default: Duration,
    max: Duration,
    robots: &ParsedRobots,
    agent: &str,
) -> Duration {
    let Some(secs) = robots.crawl_delay(agent) else {
        return default;
    };

    let requested = Duration::try_from_secs_f64(secs).unwrap_or(max).min(max);
    requested.max(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fetcher::HttpTransport;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MAX: Duration = Duration::from_secs(120);

    #[test]
    fn test_effective_delay_robots_larger() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 2");
        assert_eq!(
            effective_crawl_delay(Duration::from_secs(1), MAX, &robots, "Rill"),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_effective_delay_default_larger() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 0.5");
        assert_eq!(
            effective_crawl_delay(Duration::from_secs(1), MAX, &robots, "Rill"),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_effective_delay_capped() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 600");
        assert_eq!(
            effective_crawl_delay(Duration::from_secs(1), MAX, &robots, "Rill"),
            MAX
        );
    }

    #[test]
    fn test_effective_delay_unrepresentable() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 1e30");
        assert_eq!(
            effective_crawl_delay(Duration::from_secs(1), MAX, &robots, "Rill"),
            MAX
        );
    }

    #[test]
    fn test_effective_delay_no_robots() {
        assert_eq!(
            effective_crawl_delay(Duration::from_millis(750), MAX, &ParsedRobots::allow_all(), "Rill"),
            Duration::from_millis(750)
        );
    }

    async fn robots_from(body: String) -> ParsedRobots {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/plain"))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.fetcher.blacklist_private_ips = false;
        let transport = HttpTransport::new(&config.user_agent, &config.fetcher).unwrap();
        fetch_robots(&transport, &server.address().to_string()).await
    }

    #[tokio::test]
    async fn test_oversized_robots_truncated() {
        let mut body = String::from("User-agent: *\nDisallow: /early\n");
        while body.len() <= MAX_ROBOTS_BYTES {
            body.push_str("# filler line to push the file past the size cap\n");
        }
        body.push_str("Disallow: /late\n");

        let robots = robots_from(body).await;
        assert!(!robots.is_allowed("http://example.com/early", "Rill"));
        assert!(robots.is_allowed("http://example.com/late", "Rill"));
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let server = MockServer::start().await;
        let mut config = Config::default();
        config.fetcher.blacklist_private_ips = false;
        let transport = HttpTransport::new(&config.user_agent, &config.fetcher).unwrap();

        let robots = fetch_robots(&transport, &server.address().to_string()).await;
        assert!(robots.is_allowed("http://example.com/anything", "Rill"));
    }
}
