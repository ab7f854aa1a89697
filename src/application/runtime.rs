//! Explicit runtime wiring
//!
//! All shared services are constructed once and injected; no module-level
//! singletons. Tests swap the fetcher and resolver for scripted fakes.

use std::sync::Arc;

use crate::extraction::validator::Validator;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::http_client::{LadderFetcher, PageFetcher, PageRenderer};
use crate::infrastructure::preflight::{DomainResolver, PreflightChecker, TokioResolver};
use crate::infrastructure::proxy_pool::ProxyPool;
use crate::infrastructure::queue_store::QueueStore;
use crate::infrastructure::robots::RobotsCache;
use crate::infrastructure::user_agents::UserAgentPool;

/// Everything a worker needs to process one queue entry.
pub struct Runtime {
    pub config: Arc<AppConfig>,
    pub store: QueueStore,
    pub fetcher: Arc<dyn PageFetcher>,
    pub preflight: Arc<PreflightChecker>,
    pub validator: Arc<Validator>,
}

impl Runtime {
    /// Production wiring: tokio resolver, ladder fetcher, shared pools.
    pub fn new(
        config: Arc<AppConfig>,
        store: QueueStore,
        renderer: Option<Arc<dyn PageRenderer>>,
    ) -> anyhow::Result<Self> {
        let user_agents = Arc::new(UserAgentPool::new());
        let resolver: Arc<dyn DomainResolver> = Arc::new(TokioResolver::new(
            std::time::Duration::from_secs(config.crawl.dns_timeout_seconds),
        ));

        let proxies = Arc::new(ProxyPool::new(
            &config.fetch.proxy_pool,
            config.fetch.proxy_quarantine_after,
            std::time::Duration::from_secs(config.fetch.proxy_cooldown_seconds),
        ));

        let fetcher: Arc<dyn PageFetcher> = Arc::new(LadderFetcher::new(
            config.fetch.clone(),
            proxies,
            user_agents.clone(),
            renderer,
        )?);

        let robots = Arc::new(RobotsCache::new(
            std::time::Duration::from_secs(config.crawl.dns_timeout_seconds.max(5)),
            std::time::Duration::from_secs(config.crawl.robots_ttl_seconds),
        )?);
        let preflight = Arc::new(PreflightChecker::new(
            &config.crawl,
            config.min_delay(),
            resolver.clone(),
            robots,
            user_agents,
        ));

        let validator = Arc::new(Validator::new(
            config.crawl.mx_check,
            if config.crawl.mx_check { Some(resolver) } else { None },
            config.crawl.country_pattern_set.clone(),
        ));

        Ok(Self { config, store, fetcher, preflight, validator })
    }

    /// Test wiring with injected seams; used by the pipeline tests.
    pub fn with_parts(
        config: Arc<AppConfig>,
        store: QueueStore,
        fetcher: Arc<dyn PageFetcher>,
        preflight: Arc<PreflightChecker>,
        validator: Arc<Validator>,
    ) -> Self {
        Self { config, store, fetcher, preflight, validator }
    }
}
