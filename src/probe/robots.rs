// src/probe/robots.rs
// =============================================================================
// Extracts the crawl policy a host declares in its robots.txt.
//
// We only care about politeness directives:
//   Crawl-delay: 5         -> wait 5 seconds between requests
//   Request-rate: 1/10     -> at most 1 request every 10 seconds
//
// How groups work:
// - A group starts with one or more consecutive "User-agent:" lines
// - Every directive after that belongs to the group until the next
//   "User-agent:" line that follows a directive
// - The prober reads the first "*" group; a named agent is matched on its
//   whole product token and falls back to "*"
// - An empty "User-agent:" value names nobody and is skipped
//
// Allow/Disallow rules are not needed for a liveness snapshot, so they only
// close the user-agent list like any other directive.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Agent name of the group that applies to every crawler.
pub const WILDCARD_AGENT: &str = "*";

/// Crawl policy declared for one user agent.
///
/// Every field is optional: a robots.txt without politeness directives (or no
/// robots.txt at all) gives the empty policy, which serializes to `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_delay: Option<u32>,
}

impl RobotsPolicy {
    pub fn is_empty(&self) -> bool {
        self.requests.is_none() && self.seconds.is_none() && self.crawl_delay.is_none()
    }
}

// One user-agent group while parsing
#[derive(Debug, Default)]
struct Group {
    agents: Vec<String>,
    policy: RobotsPolicy,
}

/// Parses robots.txt content and returns the policy that applies to `agent`.
///
/// `agent` is matched case-insensitively against the group's user agents by
/// its whole product token (`netcensus/0.1.0` matches `User-agent: netcensus`
/// but not `User-agent: net`). Pass [`WILDCARD_AGENT`] to get the wildcard
/// group directly.
pub fn parse_policy(content: &str, agent: &str) -> RobotsPolicy {
    let groups = parse_groups(content);
    let token = agent
        .split('/')
        .next()
        .unwrap_or(agent)
        .trim()
        .to_lowercase();

    if !token.is_empty() && token != WILDCARD_AGENT {
        let named = groups
            .iter()
            .find(|g| g.agents.iter().any(|a| *a == token));
        if let Some(group) = named {
            return group.policy.clone();
        }
    }

    groups
        .iter()
        .find(|g| g.agents.iter().any(|a| a == WILDCARD_AGENT))
        .map(|g| g.policy.clone())
        .unwrap_or_default()
}

fn parse_groups(content: &str) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut current: Option<Group> = None;
    // True once the current group has seen a directive, so the next
    // User-agent line starts a new group instead of extending this one
    let mut seen_directive = false;

    for line in content.lines() {
        // Strip comments, then whitespace
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if value.is_empty() {
                    continue;
                }
                if seen_directive {
                    if let Some(done) = current.take() {
                        groups.push(done);
                    }
                    seen_directive = false;
                }
                current
                    .get_or_insert_with(Group::default)
                    .agents
                    .push(value.to_lowercase());
            }
            "crawl-delay" => {
                // Directives before any User-agent line belong to nobody
                let Some(group) = current.as_mut() else { continue };
                seen_directive = true;
                if group.policy.crawl_delay.is_none() {
                    group.policy.crawl_delay = value.parse().ok();
                }
            }
            "request-rate" => {
                let Some(group) = current.as_mut() else { continue };
                seen_directive = true;
                if group.policy.requests.is_none() {
                    if let Some((requests, seconds)) = parse_rate(value) {
                        group.policy.requests = Some(requests);
                        group.policy.seconds = Some(seconds);
                    }
                }
            }
            _ => {
                if current.is_some() {
                    seen_directive = true;
                }
            }
        }
    }

    if let Some(done) = current {
        groups.push(done);
    }

    groups
}

// Parses "N/S" into (requests, seconds); both sides must be whole numbers
fn parse_rate(value: &str) -> Option<(u32, u32)> {
    let (requests, seconds) = value.split_once('/')?;
    Some((requests.trim().parse().ok()?, seconds.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_delay_only() {
        let content = "User-agent: *\nCrawl-delay: 5\n";
        let policy = parse_policy(content, "*");
        assert_eq!(policy.crawl_delay, Some(5));
        assert_eq!(policy.requests, None);
        assert_eq!(policy.seconds, None);
    }

    #[test]
    fn test_request_rate_and_delay() {
        let content = r#"
# politeness
User-agent: *
Disallow: /private/
Request-rate: 1/10   # one every ten seconds
Crawl-delay: 3
"#;
        let policy = parse_policy(content, "*");
        assert_eq!(
            policy,
            RobotsPolicy {
                requests: Some(1),
                seconds: Some(10),
                crawl_delay: Some(3),
            }
        );
    }

    #[test]
    fn test_other_agents_are_ignored_for_wildcard() {
        let content = r#"
User-agent: Googlebot
Crawl-delay: 1

User-agent: *
Crawl-delay: 7
"#;
        assert_eq!(parse_policy(content, "*").crawl_delay, Some(7));
        assert_eq!(parse_policy(content, "Googlebot/2.1").crawl_delay, Some(1));
        assert_eq!(parse_policy(content, "netcensus/0.1.0").crawl_delay, Some(7));
    }

    #[test]
    fn test_partial_agent_names_do_not_match() {
        let content = "User-agent: net\nCrawl-delay: 60\n\nUser-agent: *\nCrawl-delay: 5\n";
        assert_eq!(parse_policy(content, "netcensus/0.1.0").crawl_delay, Some(5));
        assert_eq!(parse_policy(content, WILDCARD_AGENT).crawl_delay, Some(5));
        assert_eq!(parse_policy(content, "net/1.0").crawl_delay, Some(60));
    }

    #[test]
    fn test_empty_agent_line_names_nobody() {
        let content = "User-agent:\nCrawl-delay: 99\n\nUser-agent: *\nCrawl-delay: 5\n";
        assert_eq!(parse_policy(content, "netcensus/0.1.0").crawl_delay, Some(5));
        assert_eq!(parse_policy(content, WILDCARD_AGENT).crawl_delay, Some(5));
        assert_eq!(parse_policy(content, "").crawl_delay, Some(5));
    }

    #[test]
    fn test_consecutive_agents_share_a_group() {
        let content = "User-agent: a\nUser-agent: *\nCrawl-delay: 2\n";
        assert_eq!(parse_policy(content, "*").crawl_delay, Some(2));
    }

    #[test]
    fn test_unparsable_values_are_ignored() {
        let content = "User-agent: *\nCrawl-delay: soon\nRequest-rate: fast\n";
        assert!(parse_policy(content, "*").is_empty());
    }

    #[test]
    fn test_no_matching_group_gives_empty_policy() {
        let content = "User-agent: Googlebot\nCrawl-delay: 1\n";
        assert!(parse_policy(content, "*").is_empty());
        assert!(parse_policy("<html>not robots</html>", "*").is_empty());
    }

    #[test]
    fn test_empty_policy_serializes_to_empty_map() {
        let json = serde_json::to_string(&RobotsPolicy::default()).unwrap();
        assert_eq!(json, "{}");

        let delayed = RobotsPolicy {
            crawl_delay: Some(5),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&delayed).unwrap(), r#"{"crawl_delay":5}"#);
    }
}
