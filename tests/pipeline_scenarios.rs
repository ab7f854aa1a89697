//! End-to-end pipeline scenarios against a scripted fetcher and resolver.
//!
//! No test touches the network: pages, DNS answers and robots rules are all
//! injected through the runtime seams.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use legal_certis::application::{Orchestrator, Runtime};
use legal_certis::domain::entities::{FieldSource, HostPolicy, QueueStatus};
use legal_certis::domain::errors::CrawlError;
use legal_certis::extraction::validator::Validator;
use legal_certis::infrastructure::config::AppConfig;
use legal_certis::infrastructure::database_connection::DatabaseConnection;
use legal_certis::infrastructure::http_client::{
    FetchOutcome, FetchTier, FetchedPage, PageFetcher, RenderMode,
};
use legal_certis::infrastructure::preflight::{DnsError, DomainResolver, PreflightChecker};
use legal_certis::infrastructure::queue_store::QueueStore;
use legal_certis::infrastructure::robots::RobotsProvider;
use legal_certis::infrastructure::user_agents::UserAgentPool;

/// Scripted page source keyed by URL.
#[derive(Default)]
struct ScriptedFetcher {
    pages: HashMap<String, (String, FetchTier)>,
    failures: HashMap<String, CrawlError>,
}

impl ScriptedFetcher {
    fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), (body.to_string(), FetchTier::Direct));
        self
    }

    fn with_page_via(mut self, url: &str, body: &str, tier: FetchTier) -> Self {
        self.pages.insert(url.to_string(), (body.to_string(), tier));
        self
    }

    fn with_failure(mut self, url: &str, error: CrawlError) -> Self {
        self.failures.insert(url.to_string(), error);
        self
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        _policy: &mut HostPolicy,
        _cancel: &CancellationToken,
    ) -> FetchOutcome {
        if let Some(error) = self.failures.get(url) {
            return FetchOutcome::Permanent(error.clone());
        }
        match self.pages.get(url) {
            Some((body, tier)) => FetchOutcome::Ok(FetchedPage {
                status: 200,
                final_url: url.to_string(),
                body: body.clone(),
                content_type: Some("text/html; charset=utf-8".to_string()),
                tier: *tier,
                render_mode: RenderMode::Raw,
            }),
            None => FetchOutcome::Permanent(CrawlError::HttpClientError(404)),
        }
    }
}

struct FakeResolver {
    resolvable: HashSet<String>,
}

#[async_trait]
impl DomainResolver for FakeResolver {
    async fn resolve(&self, host: &str) -> Result<(), DnsError> {
        if self.resolvable.contains(host) {
            Ok(())
        } else {
            Err(DnsError::NotFound)
        }
    }
}

struct StaticRobots {
    rules: HashMap<String, String>,
}

#[async_trait]
impl RobotsProvider for StaticRobots {
    async fn rules_for(&self, host: &str, _user_agent: &str) -> String {
        self.rules.get(host).cloned().unwrap_or_default()
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    store: QueueStore,
    runtime: Arc<Runtime>,
}

async fn harness(
    fetcher: ScriptedFetcher,
    resolvable: &[&str],
    robots: HashMap<String, String>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("test.db").to_string_lossy());
    let db = DatabaseConnection::new(&url).await.unwrap();
    db.migrate().await.unwrap();
    let store = QueueStore::new(db.pool().clone());

    let mut config = AppConfig::default();
    config.crawl.workers = 2;
    config.crawl.queue_poll_ms = 10;
    config.crawl.per_entry_deadline_seconds = 10;
    config.logging.file_enabled = false;
    let config = Arc::new(config);

    let resolver = Arc::new(FakeResolver {
        resolvable: resolvable.iter().map(|s| s.to_string()).collect(),
    });
    let preflight = Arc::new(PreflightChecker::new(
        &config.crawl,
        Duration::from_millis(0),
        resolver.clone(),
        Arc::new(StaticRobots { rules: robots }),
        Arc::new(UserAgentPool::new()),
    ));
    let validator = Arc::new(Validator::new(false, None, Vec::new()));

    let runtime = Arc::new(Runtime::with_parts(
        config,
        store.clone(),
        Arc::new(fetcher),
        preflight,
        validator,
    ));

    Harness { _dir: dir, store, runtime }
}

async fn crawl(harness: &Harness) {
    let orchestrator = Orchestrator::new(harness.runtime.clone());
    orchestrator.run().await.unwrap();
}

const STRUCTURED_HOME: &str = r#"
<html><head>
<script type="application/ld+json">
{
  "@context": "https://schema.org",
  "@type": "Organization",
  "legalName": "Example GmbH",
  "telephone": "+49 30 1234567",
  "address": {
    "@type": "PostalAddress",
    "streetAddress": "Musterstr. 1",
    "postalCode": "10115",
    "addressLocality": "Berlin"
  }
}
</script>
</head><body><p>Willkommen bei Example</p></body></html>
"#;

#[tokio::test]
async fn scenario_structured_data_happy_path() {
    let fetcher = ScriptedFetcher::default().with_page("https://example.de/", STRUCTURED_HOME);
    let h = harness(fetcher, &["example.de"], HashMap::new()).await;

    h.store.enqueue("example.de", "test").await.unwrap();
    crawl(&h).await;

    let entry = h.store.get_entry("example.de").await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Completed);

    let row = h.store.get_result("example.de").await.unwrap().unwrap();
    assert_eq!(row.legal_name.as_deref(), Some("Example GmbH"));
    assert_eq!(row.legal_name_source.as_deref(), Some(FieldSource::Structured.as_str()));
    assert_eq!(row.legal_form.as_deref(), Some("GmbH"));
    assert_eq!(row.street.as_deref(), Some("Musterstr. 1"));
    assert_eq!(row.postal_code.as_deref(), Some("10115"));
    assert_eq!(row.city.as_deref(), Some("Berlin"));
    assert_eq!(row.country.as_deref(), Some("Germany"));
    assert_eq!(row.phones.as_deref(), Some("+49 30 1234567"));
    assert!((row.confidence - 1.0).abs() < 1e-9);
}

const IMPRESSUM_HOME: &str = r#"
<html><body>
<main><h1>Beispiel</h1><p>Willkommen auf unserer Seite.</p></main>
<footer><a href="/impressum">Impressum</a></footer>
</body></html>
"#;

const IMPRESSUM_PAGE: &str = r#"
<html><body><main>
<h1>Impressum</h1>
<p>Beispiel GmbH<br>Musterweg 7<br>80333 München</p>
<p>Geschäftsführer: Max Mustermann</p>
<p>HRB 12345 Amtsgericht München</p>
</main></body></html>
"#;

#[tokio::test]
async fn scenario_anchor_and_expand_without_structured_data() {
    let fetcher = ScriptedFetcher::default()
        .with_page("https://beispiel.de/", IMPRESSUM_HOME)
        .with_page("https://beispiel.de/impressum", IMPRESSUM_PAGE);
    let h = harness(fetcher, &["beispiel.de"], HashMap::new()).await;

    h.store.enqueue("beispiel.de", "test").await.unwrap();
    crawl(&h).await;

    let entry = h.store.get_entry("beispiel.de").await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Completed);

    let row = h.store.get_result("beispiel.de").await.unwrap().unwrap();
    assert_eq!(row.legal_name.as_deref(), Some("Beispiel GmbH"));
    assert_eq!(row.legal_name_source.as_deref(), Some("pattern"));
    assert_eq!(row.legal_form.as_deref(), Some("GmbH"));
    assert_eq!(row.street.as_deref(), Some("Musterweg 7"));
    assert_eq!(row.postal_code.as_deref(), Some("80333"));
    assert_eq!(row.city.as_deref(), Some("München"));
    assert_eq!(row.registration_number.as_deref(), Some("HRB 12345"));
    assert_eq!(row.register_court.as_deref(), Some("Amtsgericht München"));
    assert_eq!(row.ceo.as_deref(), Some("Max Mustermann"));
    assert_eq!(row.legal_source_url, "https://beispiel.de/impressum");
    assert!((row.confidence - 0.8).abs() < 0.05);
}

#[tokio::test]
async fn scenario_robots_disallow_respected() {
    let fetcher = ScriptedFetcher::default().with_page("https://blocked.de/", IMPRESSUM_HOME);
    let robots =
        HashMap::from([("blocked.de".to_string(), "User-agent: *\nDisallow: /".to_string())]);
    let h = harness(fetcher, &["blocked.de"], robots).await;

    h.store.enqueue("blocked.de", "test").await.unwrap();
    crawl(&h).await;

    let entry = h.store.get_entry("blocked.de").await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::BlockedRobots);
    assert!(h.store.get_result("blocked.de").await.unwrap().is_none());
}

#[tokio::test]
async fn scenario_dns_www_fallback() {
    let fetcher = ScriptedFetcher::default()
        .with_page("https://www.example.at/", IMPRESSUM_HOME)
        .with_page("https://www.example.at/impressum", IMPRESSUM_PAGE);
    // Only the www label resolves
    let h = harness(fetcher, &["www.example.at"], HashMap::new()).await;

    h.store.enqueue("example.at", "test").await.unwrap();
    crawl(&h).await;

    let entry = h.store.get_entry("example.at").await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Completed);

    let row = h.store.get_result("example.at").await.unwrap().unwrap();
    assert!(row.legal_source_url.starts_with("https://www.example.at/"));
}

#[tokio::test]
async fn scenario_dns_failure_without_fallback() {
    let fetcher = ScriptedFetcher::default();
    let h = harness(fetcher, &[], HashMap::new()).await;

    h.store.enqueue("gone.at", "test").await.unwrap();
    crawl(&h).await;

    let entry = h.store.get_entry("gone.at").await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::FailedDns);
}

#[tokio::test]
async fn scenario_proxy_tier_keeps_full_confidence() {
    // The ladder resolved the block through a proxy: same confidence
    let fetcher = ScriptedFetcher::default()
        .with_page_via("https://example.de/", STRUCTURED_HOME, FetchTier::Proxy);
    let h = harness(fetcher, &["example.de"], HashMap::new()).await;

    h.store.enqueue("example.de", "test").await.unwrap();
    crawl(&h).await;

    let row = h.store.get_result("example.de").await.unwrap().unwrap();
    assert!((row.confidence - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn scenario_archive_fallback_reduces_confidence() {
    let fetcher = ScriptedFetcher::default()
        .with_page_via("https://example.de/", STRUCTURED_HOME, FetchTier::Archive);
    let h = harness(fetcher, &["example.de"], HashMap::new()).await;

    h.store.enqueue("example.de", "test").await.unwrap();
    crawl(&h).await;

    let entry = h.store.get_entry("example.de").await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Completed);

    let row = h.store.get_result("example.de").await.unwrap().unwrap();
    assert_eq!(row.legal_name_confidence, Some(0.9));
    assert!((row.confidence - 0.9).abs() < 1e-9);
}

const GARBAGE_PAGE: &str = r#"
<html><body><main>
<p>Kontakt · Menü · Warenkorb (0)</p>
<p>Irgendeine Straße 1</p>
<p>80333 Hausen</p>
</main></body></html>
"#;

#[tokio::test]
async fn scenario_garbage_is_rejected() {
    let fetcher = ScriptedFetcher::default().with_page("https://shop.de/", GARBAGE_PAGE);
    let h = harness(fetcher, &["shop.de"], HashMap::new()).await;

    h.store.enqueue("shop.de", "test").await.unwrap();
    crawl(&h).await;

    let entry = h.store.get_entry("shop.de").await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::FailedExtraction);
    assert!(h.store.get_result("shop.de").await.unwrap().is_none());
}

#[tokio::test]
async fn scenario_parked_domain() {
    let fetcher = ScriptedFetcher::default()
        .with_page("https://parked.de/", "<html><body>This domain is for sale!</body></html>");
    let h = harness(fetcher, &["parked.de"], HashMap::new()).await;

    h.store.enqueue("parked.de", "test").await.unwrap();
    crawl(&h).await;

    let entry = h.store.get_entry("parked.de").await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Parked);
}

#[tokio::test]
async fn scenario_blacklisted_domain() {
    let fetcher = ScriptedFetcher::default();
    let mut h = harness(fetcher, &["casino-spam.de"], HashMap::new()).await;

    // Rebuild the runtime with a blacklist entry
    let mut config = (*h.runtime.config).clone();
    config.crawl.blacklist = vec!["casino".to_string()];
    let config = Arc::new(config);
    let preflight = Arc::new(PreflightChecker::new(
        &config.crawl,
        Duration::from_millis(0),
        Arc::new(FakeResolver { resolvable: HashSet::new() }),
        Arc::new(StaticRobots { rules: HashMap::new() }),
        Arc::new(UserAgentPool::new()),
    ));
    h.runtime = Arc::new(Runtime::with_parts(
        config,
        h.store.clone(),
        Arc::new(ScriptedFetcher::default()),
        preflight,
        Arc::new(Validator::new(false, None, Vec::new())),
    ));

    h.store.enqueue("casino-spam.de", "test").await.unwrap();
    crawl(&h).await;

    let entry = h.store.get_entry("casino-spam.de").await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Blacklisted);
}

#[tokio::test]
async fn scenario_http_404_home() {
    let fetcher = ScriptedFetcher::default()
        .with_failure("https://missing.de/", CrawlError::HttpClientError(404));
    let h = harness(fetcher, &["missing.de"], HashMap::new()).await;

    h.store.enqueue("missing.de", "test").await.unwrap();
    crawl(&h).await;

    let entry = h.store.get_entry("missing.de").await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::FailedHttp4xx);
}

#[tokio::test]
async fn completed_domain_is_not_recrawled_without_reset() {
    let fetcher = ScriptedFetcher::default().with_page("https://example.de/", STRUCTURED_HOME);
    let h = harness(fetcher, &["example.de"], HashMap::new()).await;

    h.store.enqueue("example.de", "test").await.unwrap();
    crawl(&h).await;

    let first = h.store.get_result("example.de").await.unwrap().unwrap();

    // Second run: nothing leasable, result unchanged
    crawl(&h).await;
    let second = h.store.get_result("example.de").await.unwrap().unwrap();
    assert_eq!(first.run_id, second.run_id);
    assert_eq!(first.crawled_at, second.crawled_at);
}
