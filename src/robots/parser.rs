//! Robots exclusion rules for one domain
//!
//! Allow/disallow decisions are delegated to the robotstxt crate. The
//! Crawl-delay extension is not covered by that crate, so groups are scanned
//! here once at construction.

use robotstxt::DefaultMatcher;

/// One `User-agent` group and the Crawl-delay it declares
#[derive(Debug, Clone, Default)]
struct AgentGroup {
    agents: Vec<String>,
    crawl_delay: Option<f64>,
}

/// The robots.txt of one domain, as held by a worker for one claim
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw file, re-matched per URL; empty allows everything
    content: String,
    allow_all: bool,
    groups: Vec<AgentGroup>,
}

impl ParsedRobots {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
            groups: parse_groups(content),
        }
    }

    /// No restrictions, used whenever robots.txt cannot be fetched
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
            groups: Vec::new(),
        }
    }

    /// Whether `agent` (the crawler's product token) may fetch the absolute `url`
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url)
    }

    /// Crawl-delay in seconds declared for `agent`
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, agent: &str) -> Option<f64> {
        let agent = agent.to_lowercase();
        let mut wildcard = None;

        for group in &self.groups {
            let Some(delay) = group.crawl_delay else {
                continue;
            };
            if group.agents.iter().any(|a| *a == agent) {
                return Some(delay);
            }
            if wildcard.is_none() && group.agents.iter().any(|a| a == "*") {
                wildcard = Some(delay);
            }
        }

        wildcard
    }
}

/// Splits robots.txt into user-agent groups
///
/// Consecutive `User-agent` lines share a group; the first `User-agent`
/// after any other directive opens a new one.
fn parse_groups(content: &str) -> Vec<AgentGroup> {
    let mut groups: Vec<AgentGroup> = Vec::new();
    let mut in_agent_lines = false;

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if !in_agent_lines || groups.is_empty() {
                    groups.push(AgentGroup::default());
                }
                if let Some(group) = groups.last_mut() {
                    group.agents.push(value.to_lowercase());
                }
                in_agent_lines = true;
            }
            "crawl-delay" => {
                in_agent_lines = false;
                if let (Some(group), Ok(delay)) = (groups.last_mut(), value.parse::<f64>()) {
                    if delay.is_finite() && delay >= 0.0 {
                        group.crawl_delay = Some(delay);
                    }
                }
            }
            _ => in_agent_lines = false,
        }
    }

    groups
}
