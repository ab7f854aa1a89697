//! Shared proxy pool with round-robin rotation and health scoring
//!
//! Endpoints that keep failing are quarantined for a cooldown instead of
//! being retried immediately. An empty pool disables the proxy tier.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug)]
struct ProxyHealth {
    consecutive_failures: u32,
    quarantined_until: Option<Instant>,
    successes: u64,
    failures: u64,
}

struct ProxyEndpoint {
    url: String,
    health: Mutex<ProxyHealth>,
}

pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    cursor: AtomicUsize,
    quarantine_after: u32,
    cooldown: Duration,
}

impl ProxyPool {
    pub fn new(endpoints: &[String], quarantine_after: u32, cooldown: Duration) -> Self {
        let endpoints = endpoints
            .iter()
            .filter(|e| !e.trim().is_empty())
            .map(|e| ProxyEndpoint {
                url: e.trim().to_string(),
                health: Mutex::new(ProxyHealth {
                    consecutive_failures: 0,
                    quarantined_until: None,
                    successes: 0,
                    failures: 0,
                }),
            })
            .collect();
        Self {
            endpoints,
            cursor: AtomicUsize::new(0),
            quarantine_after: quarantine_after.max(1),
            cooldown,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Next healthy endpoint in round-robin order, skipping quarantined
    /// ones. Returns None when every endpoint is cooling down.
    pub fn next(&self) -> Option<String> {
        if self.endpoints.is_empty() {
            return None;
        }
        let now = Instant::now();
        for _ in 0..self.endpoints.len() {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
            let endpoint = &self.endpoints[idx];
            let mut health = endpoint.health.lock().unwrap();
            match health.quarantined_until {
                Some(until) if until > now => continue,
                Some(_) => {
                    // Cooldown elapsed; give it another chance
                    health.quarantined_until = None;
                    health.consecutive_failures = 0;
                }
                None => {}
            }
            return Some(endpoint.url.clone());
        }
        None
    }

    pub fn report_success(&self, url: &str) {
        if let Some(endpoint) = self.endpoints.iter().find(|e| e.url == url) {
            let mut health = endpoint.health.lock().unwrap();
            health.consecutive_failures = 0;
            health.successes += 1;
        }
    }

    pub fn report_failure(&self, url: &str) {
        if let Some(endpoint) = self.endpoints.iter().find(|e| e.url == url) {
            let mut health = endpoint.health.lock().unwrap();
            health.consecutive_failures += 1;
            health.failures += 1;
            if health.consecutive_failures >= self.quarantine_after {
                health.quarantined_until = Some(Instant::now() + self.cooldown);
                warn!("🚧 Proxy {} quarantined for {:?}", url, self.cooldown);
            } else {
                debug!(
                    "Proxy {} failed ({}/{})",
                    url, health.consecutive_failures, self.quarantine_after
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(urls: &[&str]) -> ProxyPool {
        let urls: Vec<String> = urls.iter().map(|s| s.to_string()).collect();
        ProxyPool::new(&urls, 2, Duration::from_millis(50))
    }

    #[test]
    fn round_robin_rotation() {
        let pool = pool(&["http://p1:8080", "http://p2:8080"]);
        let a = pool.next().unwrap();
        let b = pool.next().unwrap();
        let c = pool.next().unwrap();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn failing_proxy_is_quarantined_then_recovers() {
        let pool = pool(&["http://p1:8080", "http://p2:8080"]);
        pool.report_failure("http://p1:8080");
        pool.report_failure("http://p1:8080");

        // Only p2 is served while p1 cools down
        for _ in 0..4 {
            assert_eq!(pool.next().unwrap(), "http://p2:8080");
        }

        std::thread::sleep(Duration::from_millis(60));
        let mut seen_p1 = false;
        for _ in 0..4 {
            if pool.next().unwrap() == "http://p1:8080" {
                seen_p1 = true;
            }
        }
        assert!(seen_p1);
    }

    #[test]
    fn empty_pool_disables_tier() {
        let pool = pool(&[]);
        assert!(pool.is_empty());
        assert_eq!(pool.next(), None);
    }

    #[test]
    fn all_quarantined_yields_none() {
        let pool = pool(&["http://p1:8080"]);
        pool.report_failure("http://p1:8080");
        pool.report_failure("http://p1:8080");
        assert_eq!(pool.next(), None);
    }
}
