//! Domain entities for legal-entity crawling
//!
//! Contains the core business entities of the pipeline: queue entries with
//! their status lifecycle, extracted legal-entity records with per-field
//! provenance, and the per-lease host policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Lifecycle status of a domain in the crawl queue.
///
/// PENDING → PROCESSING → terminal; terminal → PENDING only via reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    FailedDns,
    BlockedRobots,
    Blacklisted,
    Parked,
    FailedHttp4xx,
    FailedHttp5xx,
    FailedConnection,
    FailedExtraction,
}

impl QueueStatus {
    /// Database/text representation (stable, used in the queue table).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::FailedDns => "FAILED_DNS",
            Self::BlockedRobots => "BLOCKED_ROBOTS",
            Self::Blacklisted => "BLACKLISTED",
            Self::Parked => "PARKED",
            Self::FailedHttp4xx => "FAILED_HTTP_4XX",
            Self::FailedHttp5xx => "FAILED_HTTP_5XX",
            Self::FailedConnection => "FAILED_CONNECTION",
            Self::FailedExtraction => "FAILED_EXTRACTION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => Self::Pending,
            "PROCESSING" => Self::Processing,
            "COMPLETED" => Self::Completed,
            "FAILED_DNS" => Self::FailedDns,
            "BLOCKED_ROBOTS" => Self::BlockedRobots,
            "BLACKLISTED" => Self::Blacklisted,
            "PARKED" => Self::Parked,
            "FAILED_HTTP_4XX" => Self::FailedHttp4xx,
            "FAILED_HTTP_5XX" => Self::FailedHttp5xx,
            "FAILED_CONNECTION" => Self::FailedConnection,
            "FAILED_EXTRACTION" => Self::FailedExtraction,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }

    /// Terminal statuses that `reset` may move back to PENDING.
    pub fn is_terminal_failure(&self) -> bool {
        self.is_terminal() && *self != Self::Completed
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the persistent domain queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub domain: String, // host label, unique key
    pub source: String, // discovery origin tag
    pub status: QueueStatus,
    pub attempts: u32,
    pub lease_expires_at: Option<DateTime<Utc>>, // non-null while PROCESSING
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which extraction pass produced a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldSource {
    /// Embedded machine-readable annotation (JSON-LD Organization etc.)
    Structured,
    /// Country-specific pattern set
    Pattern,
    /// Generic fallback heuristics
    Generic,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Pattern => "pattern",
            Self::Generic => "generic",
        }
    }

    /// Merge priority: lower wins (Structured > Pattern > Generic).
    pub fn priority(&self) -> u8 {
        match self {
            Self::Structured => 0,
            Self::Pattern => 1,
            Self::Generic => 2,
        }
    }
}

/// A single extracted value with provenance and confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: String,
    pub source: FieldSource,
    pub confidence: f64,
}

impl ExtractedField {
    pub fn new(value: impl Into<String>, source: FieldSource, confidence: f64) -> Self {
        Self { value: value.into(), source, confidence }
    }
}

/// A normalised, deduplicated set of contact values (emails or phones)
/// sharing one provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSet {
    pub values: Vec<String>, // sorted, no duplicates
    pub source: FieldSource,
    pub confidence: f64,
}

impl ContactSet {
    pub fn new(mut values: Vec<String>, source: FieldSource, confidence: f64) -> Self {
        values.sort();
        values.dedup();
        Self { values, source, confidence }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Validated legal-entity record, written at most once per successful lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    // Identification
    pub domain: String,
    pub legal_source_url: String,
    pub run_id: String,
    pub crawled_at: DateTime<Utc>,

    // Entity
    pub legal_name: Option<ExtractedField>,
    pub legal_form: Option<ExtractedField>,
    pub registration_number: Option<ExtractedField>,
    pub register_court: Option<ExtractedField>,
    pub register_type: Option<ExtractedField>,
    pub vat_id: Option<ExtractedField>,

    // Address
    pub street: Option<ExtractedField>,
    pub postal_code: Option<ExtractedField>,
    pub city: Option<ExtractedField>,
    pub country: Option<ExtractedField>,

    // People
    pub ceo: Option<ExtractedField>,
    pub directors: Vec<String>, // ordered as listed on the page

    // Contact
    pub emails: Option<ContactSet>,
    pub phones: Option<ContactSet>,
    pub fax: Option<ExtractedField>,

    // Compliance
    pub robots_allowed: bool,
    pub robots_reason: Option<String>,

    // Quality
    pub confidence: f64, // mean of present field confidences
}

impl CrawlResult {
    pub fn new(domain: &str, legal_source_url: &str, run_id: &str) -> Self {
        Self {
            domain: domain.to_string(),
            legal_source_url: legal_source_url.to_string(),
            run_id: run_id.to_string(),
            crawled_at: Utc::now(),
            legal_name: None,
            legal_form: None,
            registration_number: None,
            register_court: None,
            register_type: None,
            vat_id: None,
            street: None,
            postal_code: None,
            city: None,
            country: None,
            ceo: None,
            directors: Vec::new(),
            emails: None,
            phones: None,
            fax: None,
            robots_allowed: true,
            robots_reason: None,
            confidence: 0.0,
        }
    }

    /// Recompute the overall confidence as the arithmetic mean of the
    /// confidences of all present fields.
    pub fn recompute_confidence(&mut self) {
        let mut values = Vec::new();
        for field in [
            &self.legal_name,
            &self.legal_form,
            &self.registration_number,
            &self.register_court,
            &self.register_type,
            &self.vat_id,
            &self.street,
            &self.postal_code,
            &self.city,
            &self.country,
            &self.ceo,
            &self.fax,
        ]
        .into_iter()
        .flatten()
        {
            values.push(field.confidence);
        }
        for set in [&self.emails, &self.phones].into_iter().flatten() {
            if !set.is_empty() {
                values.push(set.confidence);
            }
        }
        self.confidence = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
    }
}

/// Ephemeral per-host state, held only while the domain is PROCESSING.
#[derive(Debug, Clone)]
pub struct HostPolicy {
    pub host: String,
    pub last_request_at: Option<Instant>,
    pub min_delay: Duration, // grows multiplicatively on 429/503
    pub robots_rules: Option<String>,
    pub user_agent: String,
    pub proxy_binding: Option<String>,
}

impl HostPolicy {
    pub fn new(host: &str, min_delay: Duration, user_agent: &str) -> Self {
        Self {
            host: host.to_string(),
            last_request_at: None,
            min_delay,
            robots_rules: None,
            user_agent: user_agent.to_string(),
            proxy_binding: None,
        }
    }
}

/// Strip a leading `www.` so host bookkeeping (mutexes, politeness) treats
/// apex and www as the same registered domain.
pub fn registered_domain(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Second-level label of a domain, used for fuzzy name matching
/// (`beispiel` for `www.beispiel.de`).
pub fn second_level_label(domain: &str) -> &str {
    let apex = registered_domain(domain);
    apex.split('.').next().unwrap_or(apex)
}
