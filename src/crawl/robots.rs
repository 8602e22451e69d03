//! robots.txt parsing and handling

use robotstxt::DefaultMatcher;
use std::time::Duration;
use tracing::debug;

/// Parsed robots.txt rules
#[derive(Debug, Clone)]
pub struct RobotsRules {
    content: String,
}

impl RobotsRules {
    /// Parse robots.txt content
    pub fn parse(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Create rules that allow everything. Used when a host has no
    /// robots.txt or it cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
        }
    }

    /// Check if a path is allowed for a user agent
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        if self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        let allowed = matcher.one_agent_allowed_by_robots(&self.content, user_agent, path);

        if !allowed {
            debug!("robots.txt disallows {} for {}", path, user_agent);
        }

        allowed
    }

    /// Crawl-delay for a user agent, if the file declares one. The matcher
    /// library ignores this directive, so it is scanned here: a group naming
    /// the agent wins over the wildcard group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let agent = user_agent.to_lowercase();
        let mut group_agents: Vec<String> = Vec::new();
        let mut group_closed = false;
        let mut specific: Option<f64> = None;
        let mut wildcard: Option<f64> = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "user-agent" => {
                    if group_closed {
                        group_agents.clear();
                        group_closed = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    group_closed = true;
                    let Ok(secs) = value.parse::<f64>() else {
                        continue;
                    };
                    if group_agents.iter().any(|a| a != "*" && agent.contains(a.as_str())) {
                        specific.get_or_insert(secs);
                    } else if group_agents.iter().any(|a| a == "*") {
                        wildcard.get_or_insert(secs);
                    }
                }
                _ => group_closed = true,
            }
        }

        specific
            .or(wildcard)
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}
