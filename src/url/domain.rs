use std::net::IpAddr;

/// Splits a host into its registrable domain (TLD+1) and subdomain
///
/// The registrable domain is looked up in the public suffix list. IP
/// literals and hosts without a registrable part are returned whole with an
/// empty subdomain.
///
/// # Examples
///
/// ```
/// use rill::url::split_host;
///
/// assert_eq!(
///     split_host("www.example.com"),
///     ("example.com".to_string(), "www".to_string())
/// );
/// assert_eq!(
///     split_host("example.co.uk"),
///     ("example.co.uk".to_string(), String::new())
/// );
/// ```
pub fn split_host(host: &str) -> (String, String) {
    let host = host.trim_end_matches('.').to_lowercase();

    if host.starts_with('[') || host.parse::<IpAddr>().is_ok() {
        return (host, String::new());
    }

    match psl::domain_str(&host) {
        Some(domain) if domain.len() < host.len() => {
            let subdomain = &host[..host.len() - domain.len() - 1];
            (domain.to_string(), subdomain.to_string())
        }
        Some(domain) => (domain.to_string(), String::new()),
        None => (host.clone(), String::new()),
    }
}
