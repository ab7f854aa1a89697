//! Per-domain processing pipeline
//!
//! Pre-flight → home fetch → parked check → legal-link discovery → candidate
//! fetch → section isolation → extraction passes → assembly → validation.
//! Pure with respect to the store: the caller commits the outcome.

use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::runtime::Runtime;
use crate::domain::entities::{CrawlResult, QueueStatus};
use crate::domain::errors::CrawlError;
use crate::extraction::candidates::{ExtractionContext, ExtractionPass};
use crate::extraction::country::Country;
use crate::extraction::extractors::{french, generic, german, italian, spanish, uk};
use crate::extraction::{link_discoverer, parked, section_isolator, structured_data};
use crate::infrastructure::http_client::{FetchOutcome, FetchTier, FetchedPage};

/// Candidate legal URLs fetched per domain (K).
const MAX_LEGAL_CANDIDATES: usize = 3;

/// Shared slot for "most specific failure observed so far": read by the
/// worker when the per-entry deadline cancels this future mid-flight.
pub type ObservedFailure = Arc<Mutex<Option<QueueStatus>>>;

pub async fn process_entry(
    runtime: &Runtime,
    domain: &str,
    run_id: &str,
    cancel: &CancellationToken,
    observed: &ObservedFailure,
) -> Result<CrawlResult, CrawlError> {
    let note = |status: QueueStatus| {
        *observed.lock().unwrap() = Some(status);
    };

    // Gate: blacklist, DNS (with www fallback), robots
    let preflight = runtime.preflight.check(domain).await.inspect_err(|e| {
        if let Some(status) = e.terminal_status() {
            note(status);
        }
    })?;
    let mut policy = preflight.host_policy.clone();

    if cancel.is_cancelled() {
        return Err(CrawlError::Cancelled);
    }

    // Home page
    let home_url = format!("https://{}/", preflight.host);
    let home = match runtime.fetcher.fetch(&home_url, &mut policy, cancel).await {
        FetchOutcome::Ok(page) => page,
        FetchOutcome::Transient(e) | FetchOutcome::Permanent(e) => {
            if let Some(status) = e.terminal_status() {
                note(status);
            }
            return Err(e);
        }
    };

    if parked::is_parked(&home.body, domain) {
        info!("🅿️ {} looks parked", domain);
        note(QueueStatus::Parked);
        return Err(CrawlError::ParkedDomain);
    }

    // Candidate legal pages; the home page itself is the fallback source
    let candidates = link_discoverer::discover(&home.body, &home.final_url, MAX_LEGAL_CANDIDATES);
    debug!("{}: {} legal-link candidates", domain, candidates.len());

    let mut best: Option<CrawlResult> = None;
    let mut any_content = false;

    for url in &candidates {
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }
        let page = match runtime.fetcher.fetch(url, &mut policy, cancel).await {
            FetchOutcome::Ok(page) => page,
            FetchOutcome::Transient(e) | FetchOutcome::Permanent(e) => {
                if matches!(e, CrawlError::Cancelled) {
                    return Err(CrawlError::Cancelled);
                }
                if let Some(status) = e.terminal_status() {
                    note(status);
                }
                debug!("{}: candidate {} failed: {}", domain, url, e);
                continue;
            }
        };

        let result =
            extract_from_page(runtime, domain, run_id, &page, &preflight, true).await;
        if let Some(result) = result {
            any_content = true;
            if accept(&mut best, result) {
                break;
            }
        }
    }

    // No candidate produced a name: the home URL is the legal source
    if best.as_ref().map(|r| r.legal_name.is_none()).unwrap_or(true) {
        if let Some(result) =
            extract_from_page(runtime, domain, run_id, &home, &preflight, false).await
        {
            any_content = true;
            accept(&mut best, result);
        }
    }

    let best = match best {
        Some(result) => result,
        None => {
            note(QueueStatus::FailedExtraction);
            return Err(if any_content {
                CrawlError::ValidationRejected
            } else {
                CrawlError::ExtractionEmpty
            });
        }
    };

    if best.legal_name.is_none() {
        note(QueueStatus::FailedExtraction);
        return Err(CrawlError::ValidationRejected);
    }

    Ok(best)
}

/// Run all passes over one fetched page and validate the assembled record.
async fn extract_from_page(
    runtime: &Runtime,
    domain: &str,
    run_id: &str,
    page: &FetchedPage,
    preflight: &crate::infrastructure::preflight::PreflightOutcome,
    on_legal_page: bool,
) -> Option<CrawlResult> {
    let text = section_isolator::isolate(&page.body);
    if text.trim().is_empty() && !page.body.contains("ld+json") {
        return None;
    }

    let mut ctx = ExtractionContext::new(
        domain,
        Country::detect(domain, &text),
        page.tier == FetchTier::Archive,
    );
    ctx.extra_legal_forms = runtime.config.crawl.country_pattern_set.clone();

    let mut passes: Vec<ExtractionPass> = Vec::new();
    if let Some(pass) = structured_data::extract(&page.body) {
        passes.push(pass);
    }
    let country_fields = match ctx.country {
        Country::Germany | Country::Austria | Country::Switzerland => {
            Some(german::extract(&text, &ctx))
        }
        Country::UnitedKingdom => Some(uk::extract(&text, &ctx)),
        Country::France => Some(french::extract(&text, &ctx)),
        Country::Italy => Some(italian::extract(&text, &ctx)),
        Country::Spain => Some(spanish::extract(&text, &ctx)),
        Country::Unknown => None,
    };
    if let Some(fields) = country_fields {
        if !fields.is_empty() {
            passes.push(ExtractionPass::pattern(fields));
        }
    }
    let generic_fields = generic::extract(&text, &ctx);
    if !generic_fields.is_empty() {
        passes.push(ExtractionPass::generic(generic_fields));
    }

    if passes.is_empty() {
        return None;
    }

    let mut result =
        crate::extraction::assembler::assemble(domain, &page.final_url, run_id, &passes, &ctx);
    result.robots_allowed = preflight.robots_allowed;
    result.robots_reason = preflight.robots_reason.clone();

    runtime.validator.validate(&mut result, &ctx, on_legal_page).await;
    Some(result)
}

/// Keep the better record; true when the new one is good enough to stop
/// fetching further candidates.
fn accept(best: &mut Option<CrawlResult>, candidate: CrawlResult) -> bool {
    let candidate_named = candidate.legal_name.is_some();
    let replace = match best.as_ref() {
        None => true,
        Some(current) => {
            let current_named = current.legal_name.is_some();
            (candidate_named && !current_named)
                || (candidate_named == current_named && candidate.confidence > current.confidence)
        }
    };
    if replace {
        *best = Some(candidate);
    }
    candidate_named
}
