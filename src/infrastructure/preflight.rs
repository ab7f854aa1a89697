//! Pre-flight gate: blacklist, DNS and robots.txt
//!
//! Runs before any page is fetched. Decision order: blacklist match, DNS
//! resolution (with one retry and a `www.` fallback), robots.txt fetch and
//! evaluation of the configured user agent against `/`.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::entities::HostPolicy;
use crate::domain::errors::CrawlError;
use crate::infrastructure::config::{CrawlConfig, RobotsMode};
use crate::infrastructure::robots::{self, RobotsProvider};
use crate::infrastructure::user_agents::UserAgentPool;

/// DNS resolution outcome kinds the checker distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsError {
    /// NXDOMAIN / SERVFAIL: the name does not resolve
    NotFound,
    /// Resolver did not answer in time
    Timeout,
}

/// Seam over the system resolver so tests run without the network.
#[async_trait]
pub trait DomainResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<(), DnsError>;
}

/// Default resolver using tokio's host lookup (A/AAAA).
pub struct TokioResolver {
    timeout: Duration,
}

impl TokioResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DomainResolver for TokioResolver {
    async fn resolve(&self, host: &str) -> Result<(), DnsError> {
        let lookup = tokio::net::lookup_host((host, 443));
        match tokio::time::timeout(self.timeout, lookup).await {
            Err(_) => Err(DnsError::Timeout),
            Ok(Err(_)) => Err(DnsError::NotFound),
            Ok(Ok(mut addrs)) => {
                if addrs.next().is_some() {
                    Ok(())
                } else {
                    Err(DnsError::NotFound)
                }
            }
        }
    }
}

/// A blacklist pattern: exact host, `.suffix`, or keyword substring.
#[derive(Debug, Clone)]
enum BlacklistPattern {
    Exact(String),
    Suffix(String),
    Keyword(String),
}

#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    patterns: Vec<(BlacklistPattern, String)>, // parsed pattern + original text
}

impl Blacklist {
    pub fn new(raw: &[String]) -> Self {
        let patterns = raw
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                let trimmed = p.trim().to_lowercase();
                let parsed = if let Some(suffix) = trimmed.strip_prefix("*.") {
                    BlacklistPattern::Suffix(format!(".{suffix}"))
                } else if trimmed.starts_with('.') {
                    BlacklistPattern::Suffix(trimmed.clone())
                } else if trimmed.contains('.') {
                    BlacklistPattern::Exact(trimmed.clone())
                } else {
                    BlacklistPattern::Keyword(trimmed.clone())
                };
                (parsed, p.trim().to_string())
            })
            .collect();
        Self { patterns }
    }

    /// The first matching pattern, if any.
    pub fn matches(&self, domain: &str) -> Option<&str> {
        let host = domain.to_lowercase();
        for (pattern, original) in &self.patterns {
            let hit = match pattern {
                BlacklistPattern::Exact(exact) => host == *exact,
                BlacklistPattern::Suffix(suffix) => host.ends_with(suffix.as_str()),
                BlacklistPattern::Keyword(keyword) => host.contains(keyword.as_str()),
            };
            if hit {
                return Some(original);
            }
        }
        None
    }
}

/// Result of a successful pre-flight check.
#[derive(Debug, Clone)]
pub struct PreflightOutcome {
    /// Host to crawl; may carry a `www.` prefix when only that resolves
    pub host: String,
    pub robots_allowed: bool,
    pub robots_reason: Option<String>,
    pub host_policy: HostPolicy,
}

pub struct PreflightChecker {
    resolver: std::sync::Arc<dyn DomainResolver>,
    robots: std::sync::Arc<dyn RobotsProvider>,
    blacklist: Blacklist,
    user_agents: std::sync::Arc<UserAgentPool>,
    robots_mode: RobotsMode,
    min_delay: Duration,
}

impl PreflightChecker {
    pub fn new(
        config: &CrawlConfig,
        min_delay: Duration,
        resolver: std::sync::Arc<dyn DomainResolver>,
        robots: std::sync::Arc<dyn RobotsProvider>,
        user_agents: std::sync::Arc<UserAgentPool>,
    ) -> Self {
        Self {
            resolver,
            robots,
            blacklist: Blacklist::new(&config.blacklist),
            user_agents,
            robots_mode: config.respect_robots,
            min_delay,
        }
    }

    /// Run the full gate for a domain.
    pub async fn check(&self, domain: &str) -> Result<PreflightOutcome, CrawlError> {
        // 1. Blacklist
        if let Some(pattern) = self.blacklist.matches(domain) {
            info!("⛔ {} matches blacklist pattern '{}'", domain, pattern);
            return Err(CrawlError::BlockedByBlacklist { pattern: pattern.to_string() });
        }

        // 2. DNS with one retry, then www. fallback. Many older sites only
        //    publish records for the www label (original behavior kept).
        let host = self.resolve_with_fallback(domain).await?;

        // 3 + 4. robots.txt fetch and decision for the configured agent
        let user_agent = self.user_agents.pick().to_string();
        let rules = self.robots.rules_for(&host, &user_agent).await;
        let allowed = robots::is_allowed(&rules, &user_agent, "/");
        let reason = if allowed {
            None
        } else {
            Some(
                robots::disallow_reason(&rules, &user_agent, "/")
                    .unwrap_or_else(|| "Disallow: /".to_string()),
            )
        };

        if !allowed && self.robots_mode == RobotsMode::Respect {
            info!("🤖 {} blocked by robots.txt ({})", host, reason.as_deref().unwrap_or("?"));
            return Err(CrawlError::BlockedByRobots {
                reason: reason.unwrap_or_else(|| "Disallow: /".to_string()),
            });
        }

        let mut policy = HostPolicy::new(&host, self.min_delay, &user_agent);
        policy.robots_rules = if rules.is_empty() { None } else { Some(rules) };

        Ok(PreflightOutcome {
            host,
            robots_allowed: allowed,
            robots_reason: reason,
            host_policy: policy,
        })
    }

    async fn resolve_with_fallback(&self, domain: &str) -> Result<String, CrawlError> {
        match self.try_resolve(domain).await {
            Ok(()) => return Ok(domain.to_string()),
            Err(DnsError::Timeout) => {
                return Err(CrawlError::ConnectionFailure(format!("DNS timeout for {domain}")))
            }
            Err(DnsError::NotFound) => {}
        }

        // Apex failed: retry once with the www. label before classifying
        if !domain.starts_with("www.") {
            let www = format!("www.{domain}");
            debug!("Apex DNS failed for {}, trying {}", domain, www);
            match self.try_resolve(&www).await {
                Ok(()) => return Ok(www),
                Err(DnsError::Timeout) => {
                    return Err(CrawlError::ConnectionFailure(format!("DNS timeout for {www}")))
                }
                Err(DnsError::NotFound) => {}
            }
        }

        Err(CrawlError::DnsFailure(domain.to_string()))
    }

    /// One retry on NotFound; timeouts are reported as-is.
    async fn try_resolve(&self, host: &str) -> Result<(), DnsError> {
        match self.resolver.resolve(host).await {
            Ok(()) => Ok(()),
            Err(DnsError::Timeout) => Err(DnsError::Timeout),
            Err(DnsError::NotFound) => self.resolver.resolve(host).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklist_exact_suffix_and_keyword() {
        let blacklist = Blacklist::new(&[
            "spam.de".to_string(),
            ".casino.at".to_string(),
            "*.ads.ch".to_string(),
            "porn".to_string(),
        ]);

        assert_eq!(blacklist.matches("spam.de"), Some("spam.de"));
        assert_eq!(blacklist.matches("sub.spam.de"), None); // exact, not suffix
        assert_eq!(blacklist.matches("win.casino.at"), Some(".casino.at"));
        assert_eq!(blacklist.matches("x.ads.ch"), Some("*.ads.ch"));
        assert_eq!(blacklist.matches("bestporn4u.de"), Some("porn"));
        assert_eq!(blacklist.matches("PORNSITE.DE"), Some("porn")); // case-insensitive
        assert_eq!(blacklist.matches("harmless.de"), None);
    }

    #[test]
    fn empty_blacklist_matches_nothing() {
        let blacklist = Blacklist::new(&[]);
        assert_eq!(blacklist.matches("anything.de"), None);
    }
}
