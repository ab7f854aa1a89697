//! Page acquisition with a layered fallback ladder
//!
//! Direct HTTP first (rotated User-Agent, optional browser render), then the
//! proxy pool with exponential backoff, then the newest archive snapshot.
//! The ladder is driven by explicit outcome values: a `Transient` error
//! moves down a tier, a `Permanent` one stops the ladder for this URL.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::entities::HostPolicy;
use crate::domain::errors::CrawlError;
use crate::infrastructure::config::FetchConfig;
use crate::infrastructure::proxy_pool::ProxyPool;
use crate::infrastructure::user_agents::UserAgentPool;

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const WAYBACK_AVAILABLE: &str = "https://archive.org/wayback/available";

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());

/// How the page was ultimately obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTier {
    Direct,
    Proxy,
    /// Archived snapshot; downstream confidence is reduced
    Archive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Raw,
    Rendered,
}

/// A successfully acquired page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub final_url: String,
    pub body: String,
    pub content_type: Option<String>,
    pub tier: FetchTier,
    pub render_mode: RenderMode,
}

/// Explicit ladder outcome; no exception-driven control flow.
#[derive(Debug)]
pub enum FetchOutcome {
    Ok(FetchedPage),
    Transient(CrawlError),
    Permanent(CrawlError),
}

impl FetchOutcome {
    pub fn into_result(self) -> Result<FetchedPage, CrawlError> {
        match self {
            Self::Ok(page) => Ok(page),
            Self::Transient(e) | Self::Permanent(e) => Err(e),
        }
    }
}

/// Optional first-paint renderer; injected, never constructed here.
pub trait PageRenderer: Send + Sync {
    fn render(&self, url: &str, timeout: Duration) -> anyhow::Result<String>;
}

/// Seam for the orchestrator and pipeline tests.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        policy: &mut HostPolicy,
        cancel: &CancellationToken,
    ) -> FetchOutcome;
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Production fetcher implementing the full ladder.
pub struct LadderFetcher {
    direct: Client,
    proxy_clients: Mutex<HashMap<String, Client>>,
    proxies: Arc<ProxyPool>,
    user_agents: Arc<UserAgentPool>,
    renderer: Option<Arc<dyn PageRenderer>>,
    /// Caps concurrent render calls independently of the worker count;
    /// rendered pages are the memory-heavy path.
    render_slots: tokio::sync::Semaphore,
    rate_limiter: DirectRateLimiter,
    config: FetchConfig,
}

const MAX_CONCURRENT_RENDERS: usize = 2;

impl LadderFetcher {
    pub fn new(
        config: FetchConfig,
        proxies: Arc<ProxyPool>,
        user_agents: Arc<UserAgentPool>,
        renderer: Option<Arc<dyn PageRenderer>>,
    ) -> anyhow::Result<Self> {
        let direct = build_client(&config, None)?;
        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .ok_or_else(|| anyhow::anyhow!("Rate limit must be greater than 0"))?,
        );
        Ok(Self {
            direct,
            proxy_clients: Mutex::new(HashMap::new()),
            proxies,
            user_agents,
            renderer,
            render_slots: tokio::sync::Semaphore::new(MAX_CONCURRENT_RENDERS),
            rate_limiter: RateLimiter::direct(quota),
            config,
        })
    }

    fn proxy_client(&self, proxy_url: &str) -> anyhow::Result<Client> {
        let mut clients = self.proxy_clients.lock().unwrap();
        if let Some(client) = clients.get(proxy_url) {
            return Ok(client.clone());
        }
        let client = build_client(&self.config, Some(proxy_url))?;
        clients.insert(proxy_url.to_string(), client.clone());
        Ok(client)
    }

    /// Block until politeness allows the next request to this host.
    async fn politeness_wait(
        &self,
        policy: &HostPolicy,
        cancel: &CancellationToken,
    ) -> Result<(), CrawlError> {
        if let Some(last) = policy.last_request_at {
            let jitter = Duration::from_millis(
                rand::thread_rng().gen_range(0..=self.config.jitter_ms.max(1)),
            );
            let not_before = last + policy.min_delay + jitter;
            let now = Instant::now();
            if not_before > now {
                tokio::select! {
                    _ = tokio::time::sleep(not_before - now) => {}
                    _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
                }
            }
        }
        tokio::select! {
            _ = self.rate_limiter.until_ready() => Ok(()),
            _ = cancel.cancelled() => Err(CrawlError::Cancelled),
        }
    }

    async fn request(
        &self,
        client: &Client,
        url: &str,
        policy: &HostPolicy,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, CrawlError> {
        let request = client
            .get(url)
            .header(USER_AGENT, policy.user_agent.as_str())
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, self.user_agents.pick_accept_language());

        let response = tokio::select! {
            result = request.send() => result.map_err(classify_reqwest_error)?,
            _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
        };

        let status = response.status().as_u16();
        if status >= 500 {
            return Err(CrawlError::HttpServerError(status));
        }
        if status >= 400 {
            return Err(CrawlError::HttpClientError(status));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if let Some(ct) = &content_type {
            let allowed = self.config.allowed_content_types.iter().any(|a| ct.starts_with(a));
            if !allowed && !path_is_document(&final_url) {
                return Err(CrawlError::HttpClientError(status));
            }
        }

        // Stream the body under the byte cap
        let mut response = response;
        let mut body = Vec::new();
        loop {
            let chunk = tokio::select! {
                result = response.chunk() => result.map_err(classify_reqwest_error)?,
                _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
            };
            match chunk {
                Some(bytes) => {
                    if body.len() + bytes.len() > self.config.max_body_bytes {
                        return Err(CrawlError::ConnectionFailure(format!(
                            "response exceeds byte budget ({} bytes)",
                            self.config.max_body_bytes
                        )));
                    }
                    body.extend_from_slice(&bytes);
                }
                None => break,
            }
        }

        Ok(FetchedPage {
            status,
            final_url,
            body: String::from_utf8_lossy(&body).into_owned(),
            content_type,
            tier: FetchTier::Direct,
            render_mode: RenderMode::Raw,
        })
    }

    /// Direct tier, with optional browser render when the raw body is empty
    /// or dominated by script tags.
    async fn fetch_direct(
        &self,
        url: &str,
        policy: &mut HostPolicy,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, CrawlError> {
        let mut page = self.request(&self.direct, url, policy, cancel).await?;
        policy.last_request_at = Some(Instant::now());

        if body_needs_render(&page.body) {
            if let Some(renderer) = &self.renderer {
                debug!("Body is script-dominated, rendering {}", url);
                let _slot = tokio::select! {
                    permit = self.render_slots.acquire() => permit
                        .map_err(|e| CrawlError::RenderFailure(e.to_string()))?,
                    _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
                };
                let renderer = renderer.clone();
                let render_url = page.final_url.clone();
                let timeout = Duration::from_secs(self.config.request_timeout_seconds);
                let rendered = tokio::task::spawn_blocking(move || {
                    renderer.render(&render_url, timeout)
                })
                .await
                .map_err(|e| CrawlError::RenderFailure(e.to_string()))?;
                match rendered {
                    Ok(html) => {
                        page.body = html;
                        page.render_mode = RenderMode::Rendered;
                    }
                    Err(e) => return Err(CrawlError::RenderFailure(e.to_string())),
                }
            }
        }
        Ok(page)
    }

    async fn fetch_via_proxies(
        &self,
        url: &str,
        policy: &mut HostPolicy,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, CrawlError> {
        let mut last_error = CrawlError::ConnectionFailure("no proxy available".to_string());

        for attempt in 0..self.config.max_retries {
            let backoff = backoff_delay(
                self.config.backoff_base_ms,
                self.config.backoff_factor,
                self.config.backoff_cap_ms,
                attempt,
            );
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
            }

            // Keep the binding for the lease so one host sees one exit IP
            let proxy_url = match policy.proxy_binding.clone().or_else(|| self.proxies.next()) {
                Some(p) => p,
                None => return Err(last_error),
            };
            let client = match self.proxy_client(&proxy_url) {
                Ok(c) => c,
                Err(e) => {
                    self.proxies.report_failure(&proxy_url);
                    last_error = CrawlError::ConnectionFailure(e.to_string());
                    policy.proxy_binding = None;
                    continue;
                }
            };

            match self.request(&client, url, policy, cancel).await {
                Ok(mut page) => {
                    policy.last_request_at = Some(Instant::now());
                    policy.proxy_binding = Some(proxy_url.clone());
                    self.proxies.report_success(&proxy_url);
                    page.tier = FetchTier::Proxy;
                    return Ok(page);
                }
                Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
                Err(e) if e.is_transient() => {
                    policy.last_request_at = Some(Instant::now());
                    self.proxies.report_failure(&proxy_url);
                    policy.proxy_binding = None;
                    debug!("Proxy attempt {} via {} failed: {}", attempt + 1, proxy_url, e);
                    last_error = e;
                }
                Err(e) => {
                    // Permanent for this URL regardless of exit IP
                    policy.last_request_at = Some(Instant::now());
                    return Err(e);
                }
            }
        }
        Err(last_error)
    }

    /// Ask the Wayback availability API for the newest snapshot and fetch it.
    async fn fetch_from_archive(
        &self,
        url: &str,
        policy: &mut HostPolicy,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, CrawlError> {
        let query_url = format!("{WAYBACK_AVAILABLE}?url={}", urlencode(url));
        let response = tokio::select! {
            result = self.direct.get(&query_url).send() => result.map_err(classify_reqwest_error)?,
            _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
        };
        let payload: serde_json::Value = tokio::select! {
            result = response.json() => result.map_err(classify_reqwest_error)?,
            _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
        };

        let snapshot_url = payload
            .pointer("/archived_snapshots/closest")
            .filter(|c| c.get("available").and_then(|a| a.as_bool()).unwrap_or(false))
            .and_then(|c| c.get("url"))
            .and_then(|u| u.as_str())
            .map(|u| u.replace("http://web.archive.org", "https://web.archive.org"));

        let snapshot_url = snapshot_url.ok_or_else(|| {
            CrawlError::ConnectionFailure(format!("no archive snapshot for {url}"))
        })?;

        info!("🗄️ Using archive snapshot for {}", url);
        let mut page = self.request(&self.direct, &snapshot_url, policy, cancel).await?;
        policy.last_request_at = Some(Instant::now());
        page.tier = FetchTier::Archive;
        Ok(page)
    }

    /// Whether an error at the direct tier should continue down the ladder.
    fn escalates(error: &CrawlError) -> bool {
        matches!(
            error,
            CrawlError::ConnectionFailure(_)
                | CrawlError::Timeout
                | CrawlError::HttpServerError(_)
                | CrawlError::HttpClientError(403)
                | CrawlError::HttpClientError(429)
        )
    }
}

#[async_trait]
impl PageFetcher for LadderFetcher {
    async fn fetch(
        &self,
        url: &str,
        policy: &mut HostPolicy,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        if let Err(e) = self.politeness_wait(policy, cancel).await {
            return FetchOutcome::Transient(e);
        }

        // Tier 1: direct
        let direct_error = match self.fetch_direct(url, policy, cancel).await {
            Ok(page) => return FetchOutcome::Ok(page),
            Err(CrawlError::Cancelled) => return FetchOutcome::Transient(CrawlError::Cancelled),
            Err(e) => {
                if matches!(e, CrawlError::HttpClientError(429) | CrawlError::HttpServerError(503)) {
                    // Server is pushing back: grow the politeness floor
                    policy.min_delay = (policy.min_delay * 2).min(Duration::from_secs(60));
                }
                if !Self::escalates(&e) {
                    return FetchOutcome::Permanent(e);
                }
                debug!("Direct fetch of {} failed: {}, escalating", url, e);
                e
            }
        };

        // Tier 2: proxy pool
        let proxy_error = if self.proxies.is_empty() {
            direct_error
        } else {
            match self.fetch_via_proxies(url, policy, cancel).await {
                Ok(page) => return FetchOutcome::Ok(page),
                Err(CrawlError::Cancelled) => {
                    return FetchOutcome::Transient(CrawlError::Cancelled)
                }
                Err(e) if !Self::escalates(&e) => return FetchOutcome::Permanent(e),
                Err(e) => {
                    debug!("Proxy tier failed for {}: {}", url, e);
                    e
                }
            }
        };

        // Tier 3: archive snapshot
        if self.config.archive_fallback {
            match self.fetch_from_archive(url, policy, cancel).await {
                Ok(page) => return FetchOutcome::Ok(page),
                Err(CrawlError::Cancelled) => {
                    return FetchOutcome::Transient(CrawlError::Cancelled)
                }
                Err(e) => {
                    warn!("Archive fallback failed for {}: {}", url, e);
                }
            }
        }

        if proxy_error.is_transient() {
            FetchOutcome::Transient(proxy_error)
        } else {
            FetchOutcome::Permanent(proxy_error)
        }
    }
}

fn build_client(config: &FetchConfig, proxy_url: Option<&str>) -> anyhow::Result<Client> {
    let max_redirects = config.max_redirects;
    let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error("too many redirect hops");
        }
        if attempt.url().scheme() == "http"
            && attempt.previous().first().map(|u| u.scheme()) == Some("https")
        {
            return attempt.error("refusing https to http downgrade");
        }
        if attempt.previous().iter().any(|u| u == attempt.url()) {
            return attempt.error("redirect cycle");
        }
        attempt.follow()
    });

    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .redirect(redirect_policy)
        .gzip(true);

    if let Some(proxy_url) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    Ok(builder.build()?)
}

fn classify_reqwest_error(e: reqwest::Error) -> CrawlError {
    if e.is_timeout() {
        CrawlError::Timeout
    } else if e.is_redirect() {
        CrawlError::ConnectionFailure(format!("redirect refused: {e}"))
    } else {
        CrawlError::ConnectionFailure(e.to_string())
    }
}

/// Exponential backoff: base * factor^attempt, capped.
pub fn backoff_delay(base_ms: u64, factor: u32, cap_ms: u64, attempt: u32) -> Duration {
    let factor = u64::from(factor.max(1));
    let mult = factor.saturating_pow(attempt);
    Duration::from_millis(base_ms.saturating_mul(mult).min(cap_ms))
}

/// Non-HTML content is still acceptable for paths that are known to carry
/// legal text (plain-text disclosures, CMS endpoints with odd MIME types).
fn path_is_document(url: &str) -> bool {
    let path = url::Url::parse(url).map(|u| u.path().to_lowercase()).unwrap_or_default();
    const DOC_SUFFIXES: &[&str] = &[".html", ".htm", ".php", ".asp", ".aspx", ".txt"];
    const LEGAL_TOKENS: &[&str] = &["impressum", "imprint", "legal", "mentions", "aviso"];
    DOC_SUFFIXES.iter().any(|s| path.ends_with(s))
        || LEGAL_TOKENS.iter().any(|t| path.contains(t))
}

/// True when the fetched body carries no usable markup: empty, or nothing
/// but script payload once tags are stripped.
pub fn body_needs_render(body: &str) -> bool {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return true;
    }
    if !trimmed.contains("<script") {
        return false;
    }
    let without_scripts = SCRIPT_RE.replace_all(trimmed, "");
    let text = TAG_RE.replace_all(&without_scripts, "");
    text.split_whitespace().map(str::len).sum::<usize>() < 200
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
