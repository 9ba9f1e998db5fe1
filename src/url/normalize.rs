use url::Url;

/// Normalizes a discovered URL before it is stored
///
/// # Normalization Steps
///
/// 1. Remove the fragment (everything after #)
/// 2. Remove session-id query parameters named in `purge_sid_list`
///    (case-insensitive); drop the query entirely if nothing is left
/// 3. Remove `;name=value` session-id path parameters
///
/// Queries without session ids are left byte-for-byte untouched.
///
/// # Examples
///
/// ```
/// use rill::url::normalize_url;
/// use url::Url;
///
/// let sids = vec!["jsessionid".to_string()];
/// let url = Url::parse("http://example.com/a?JSESSIONID=42&x=1#top").unwrap();
/// assert_eq!(normalize_url(url, &sids).as_str(), "http://example.com/a?x=1");
/// ```
pub fn normalize_url(mut url: Url, purge_sid_list: &[String]) -> Url {
    url.set_fragment(None);

    if url.query().is_some() {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let kept: Vec<&(String, String)> = pairs
            .iter()
            .filter(|(key, _)| !is_session_param(key, purge_sid_list))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else if kept.len() != pairs.len() {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
    }

    let mut path = url.path().to_string();
    let mut changed = false;
    while let Some(stripped) = strip_path_session(&path, purge_sid_list) {
        path = stripped;
        changed = true;
    }
    if changed {
        url.set_path(&path);
    }

    url
}

/// Checks if a query parameter is a session id
fn is_session_param(key: &str, purge_sid_list: &[String]) -> bool {
    purge_sid_list
        .iter()
        .any(|sid| sid.eq_ignore_ascii_case(key))
}

/// Removes the first `;sid=value` path parameter, if any
fn strip_path_session(path: &str, purge_sid_list: &[String]) -> Option<String> {
    let lower = path.to_ascii_lowercase();

    for sid in purge_sid_list {
        let needle = format!(";{}=", sid.to_ascii_lowercase());
        if let Some(start) = lower.find(&needle) {
            let end = path[start + 1..]
                .find(|c| c == '/' || c == ';')
                .map(|offset| start + 1 + offset)
                .unwrap_or(path.len());
            return Some(format!("{}{}", &path[..start], &path[end..]));
        }
    }

    None
}
