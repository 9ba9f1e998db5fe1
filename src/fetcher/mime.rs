use crate::{ConfigError, ConfigResult};

/// One accept-list entry, split into type and subtype
///
/// `*` in either position is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MimePattern {
    kind: String,
    subtype: String,
}

impl MimePattern {
    fn parse(pattern: &str) -> ConfigResult<Self> {
        let essence = essence(pattern);
        let (kind, subtype) = essence
            .split_once('/')
            .filter(|(k, s)| !k.is_empty() && !s.is_empty() && !s.contains('/'))
            .ok_or_else(|| ConfigError::InvalidPattern(pattern.to_string()))?;

        Ok(Self {
            kind: kind.to_string(),
            subtype: subtype.to_string(),
        })
    }

    fn matches(&self, kind: &str, subtype: &str) -> bool {
        (self.kind == "*" || self.kind == kind) && (self.subtype == "*" || self.subtype == subtype)
    }
}

/// Lowercased `type/subtype` with parameters stripped
fn essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Matches Content-Type values against the configured accept list
///
/// Supports exact matches (`text/html`), `type/*`, `*/subtype` and `*/*`.
/// Parameters such as `charset` are ignored and comparison is
/// case-insensitive.
///
/// # Examples
///
/// ```
/// use rill::fetcher::MimeMatcher;
///
/// let matcher = MimeMatcher::new(&["text/html".to_string(), "image/*".to_string()]).unwrap();
/// assert!(matcher.matches("Text/HTML; charset=utf-8"));
/// assert!(matcher.matches("image/png"));
/// assert!(!matcher.matches("application/pdf"));
/// ```
#[derive(Debug, Clone)]
pub struct MimeMatcher {
    patterns: Vec<MimePattern>,
}

impl MimeMatcher {
    pub fn new(patterns: &[String]) -> ConfigResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| MimePattern::parse(p))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, content_type: &str) -> bool {
        let essence = essence(content_type);
        let Some((kind, subtype)) = essence.split_once('/') else {
            return false;
        };
        self.patterns.iter().any(|p| p.matches(kind, subtype))
    }
}

/// Checks whether a Content-Type denotes an HTML document
pub fn is_html(content_type: &str) -> bool {
    matches!(
        essence(content_type).as_str(),
        "text/html" | "application/xhtml+xml"
    )
}
