use crate::config::types::{
    Config, DatastoreConfig, DispatcherConfig, FetcherConfig, UserAgentConfig,
};
use crate::fetcher::MimeMatcher;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_user_agent(&config.user_agent)?;
    validate_fetcher(&config.fetcher)?;
    validate_dispatcher(&config.dispatcher)?;
    validate_datastore(&config.datastore)?;
    Ok(())
}

fn at_least(key: &str, value: usize, min: usize) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::Validation(format!(
            "{} must be >= {}, got {}",
            key, min, value
        )));
    }
    Ok(())
}

fn validate_fetcher(config: &FetcherConfig) -> Result<(), ConfigError> {
    at_least("fetcher.num-fetchers", config.num_fetchers, 1)?;
    if config.num_fetchers > 1000 {
        return Err(ConfigError::Validation(format!(
            "fetcher.num-fetchers must be <= 1000, got {}",
            config.num_fetchers
        )));
    }
    at_least("fetcher.max-content-size", config.max_content_size, 1)?;
    at_least("fetcher.http-timeout-secs", config.http_timeout_secs as usize, 1)?;
    at_least("fetcher.max-dns-cache-entries", config.max_dns_cache_entries, 1)?;
    at_least("fetcher.max-crawl-delay-secs", config.max_crawl_delay_secs as usize, 1)?;

    MimeMatcher::new(&config.accept_formats)?;

    if let Some(tag) = config
        .ignore_tags
        .iter()
        .find(|tag| tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        return Err(ConfigError::Validation(format!(
            "fetcher.ignore-tags entries must be plain tag names, got '{}'",
            tag
        )));
    }

    Ok(())
}

fn validate_dispatcher(config: &DispatcherConfig) -> Result<(), ConfigError> {
    at_least("dispatcher.num-concurrent-domains", config.num_concurrent_domains, 1)?;
    at_least("dispatcher.max-links-per-segment", config.max_links_per_segment, 1)
}

fn validate_datastore(config: &DatastoreConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "datastore.database-path cannot be empty".to_string(),
        ));
    }
    at_least("datastore.claim-batch-size", config.claim_batch_size, 1)
}

/// The crawler name doubles as the robots.txt product token, so it is
/// restricted to the characters a `User-agent` line can match.
fn validate_user_agent(config: &UserAgentConfig) -> Result<(), ConfigError> {
    let name = &config.crawler_name;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ConfigError::Validation(format!(
            "user-agent.crawler-name must be a non-empty token of letters, digits, '-' or '_', got '{}'",
            name
        )));
    }

    let contact = Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("user-agent.contact-url: {}", e)))?;
    if !matches!(contact.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "user-agent.contact-url must be http(s), got '{}'",
            config.contact_url
        )));
    }

    validate_email(&config.contact_email)
}

fn validate_email(email: &str) -> Result<(), ConfigError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|label| !label.is_empty())
        }
        None => false,
    };

    if !valid {
        return Err(ConfigError::Validation(format!(
            "user-agent.contact-email is not an address: '{}'",
            email
        )));
    }
    Ok(())
}
