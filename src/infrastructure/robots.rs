//! robots.txt fetching, caching and evaluation
//!
//! Rules are cached per host with a TTL. A missing or unreachable
//! robots.txt means "no rules, allow"; only a 2xx body produces rules.

use anyhow::Result;
use async_trait::async_trait;
use robotstxt::DefaultMatcher;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Source of robots.txt rules for a host; the production implementation
/// fetches and caches, tests hand back fixed rules.
#[async_trait]
pub trait RobotsProvider: Send + Sync {
    /// Empty string means "no rules, allow".
    async fn rules_for(&self, host: &str, user_agent: &str) -> String;
}

#[derive(Clone)]
struct CachedRobots {
    content: String,
    fetched_at: Instant,
}

/// Per-host robots.txt cache. Stale entries are refreshed on access.
pub struct RobotsCache {
    client: reqwest::Client,
    cache: Mutex<HashMap<String, CachedRobots>>,
    ttl: Duration,
}

impl RobotsCache {
    pub fn new(fetch_timeout: Duration, ttl: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()?;
        Ok(Self { client, cache: Mutex::new(HashMap::new()), ttl })
    }

    async fn fetch_rules(&self, host: &str, user_agent: &str) -> String {
        {
            let cache = self.cache.lock().unwrap();
            if let Some(cached) = cache.get(host) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return cached.content.clone();
                }
            }
        }

        let robots_url = format!("https://{host}/robots.txt");
        let content = match self
            .client
            .get(&robots_url)
            .header("User-Agent", user_agent)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            Ok(resp) => {
                // 4xx/5xx: treat as "no rules, allow"
                debug!("robots.txt for {} returned {}, allowing", host, resp.status());
                String::new()
            }
            Err(e) => {
                warn!("Could not fetch robots.txt for {}, assuming allowed: {}", host, e);
                String::new()
            }
        };

        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            host.to_string(),
            CachedRobots { content: content.clone(), fetched_at: Instant::now() },
        );
        content
    }
}

#[async_trait]
impl RobotsProvider for RobotsCache {
    async fn rules_for(&self, host: &str, user_agent: &str) -> String {
        self.fetch_rules(host, user_agent).await
    }
}

/// Evaluate whether `user_agent` may fetch `path` under the given rules.
pub fn is_allowed(rules: &str, user_agent: &str, path: &str) -> bool {
    if rules.trim().is_empty() {
        return true;
    }
    let mut matcher = DefaultMatcher::default();
    matcher.one_agent_allowed_by_robots(rules, user_agent, path)
}

/// The Disallow directive that blocks `path` for `user_agent`, for the
/// `robots_reason` field. Scans the matching agent group (specific agent
/// wins over `*`).
pub fn disallow_reason(rules: &str, user_agent: &str, path: &str) -> Option<String> {
    let ua_lower = user_agent.to_lowercase();
    let mut group_applies = false;
    let mut specific_group_seen = false;
    let mut reason: Option<String> = None;

    for line in rules.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let lower = line.to_lowercase();
        if let Some(agent) = lower.strip_prefix("user-agent:") {
            let agent = agent.trim();
            if agent == "*" {
                group_applies = !specific_group_seen;
            } else if ua_lower.contains(agent) {
                group_applies = true;
                specific_group_seen = true;
                reason = None; // specific group overrides wildcard findings
            } else {
                group_applies = false;
            }
        } else if group_applies && lower.starts_with("disallow:") {
            let rule_path = line["disallow:".len()..].trim();
            if !rule_path.is_empty() && path.starts_with(rule_path) && reason.is_none() {
                reason = Some(format!("Disallow: {rule_path}"));
            }
        }
    }
    reason
}
