//! Error taxonomy for the crawl pipeline
//!
//! Every failure a domain can run into maps onto exactly one terminal queue
//! status; transient errors are retried inside the fetcher and only surface
//! here once exhausted.

use thiserror::Error;

use crate::domain::entities::QueueStatus;

#[derive(Error, Debug, Clone)]
pub enum CrawlError {
    #[error("DNS resolution failed for {0}")]
    DnsFailure(String),

    #[error("blocked by robots.txt: {reason}")]
    BlockedByRobots { reason: String },

    #[error("domain matches blacklist pattern '{pattern}'")]
    BlockedByBlacklist { pattern: String },

    #[error("domain appears parked")]
    ParkedDomain,

    #[error("connection failed: {0}")]
    ConnectionFailure(String),

    #[error("HTTP client error {0}")]
    HttpClientError(u16),

    #[error("HTTP server error {0}")]
    HttpServerError(u16),

    #[error("request timed out")]
    Timeout,

    #[error("page render failed: {0}")]
    RenderFailure(String),

    #[error("no legal content could be extracted")]
    ExtractionEmpty,

    #[error("extraction produced no validated legal name")]
    ValidationRejected,

    #[error("storage backend unavailable: {0}")]
    StorageUnavailable(String),

    #[error("cancelled by stop signal or deadline")]
    Cancelled,
}

impl CrawlError {
    /// Retryable inside the fetch ladder. 429 counts as transient; other
    /// 4xx responses are permanent for the URL.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailure(_)
                | Self::HttpServerError(_)
                | Self::Timeout
                | Self::RenderFailure(_)
                | Self::HttpClientError(429)
        )
    }

    /// The terminal queue status this error maps to, if any.
    ///
    /// `Cancelled` and `StorageUnavailable` have no terminal status: the
    /// lease is released (or the process drains) instead.
    pub fn terminal_status(&self) -> Option<QueueStatus> {
        Some(match self {
            Self::DnsFailure(_) => QueueStatus::FailedDns,
            Self::BlockedByRobots { .. } => QueueStatus::BlockedRobots,
            Self::BlockedByBlacklist { .. } => QueueStatus::Blacklisted,
            Self::ParkedDomain => QueueStatus::Parked,
            Self::HttpClientError(_) => QueueStatus::FailedHttp4xx,
            Self::HttpServerError(_) => QueueStatus::FailedHttp5xx,
            Self::ConnectionFailure(_) | Self::Timeout | Self::RenderFailure(_) => {
                QueueStatus::FailedConnection
            }
            Self::ExtractionEmpty | Self::ValidationRejected => QueueStatus::FailedExtraction,
            Self::Cancelled | Self::StorageUnavailable(_) => return None,
        })
    }

    /// Whether this failure should count against the orchestrator's error
    /// budget. Policy outcomes (blacklist, robots, parked) are expected and
    /// do not indicate crawler trouble.
    pub fn counts_against_budget(&self) -> bool {
        matches!(
            self,
            Self::DnsFailure(_)
                | Self::ConnectionFailure(_)
                | Self::HttpClientError(_)
                | Self::HttpServerError(_)
                | Self::Timeout
                | Self::RenderFailure(_)
                | Self::ExtractionEmpty
                | Self::ValidationRejected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CrawlError::Timeout.is_transient());
        assert!(CrawlError::HttpServerError(503).is_transient());
        assert!(CrawlError::HttpClientError(429).is_transient());
        assert!(!CrawlError::HttpClientError(404).is_transient());
        assert!(!CrawlError::ParkedDomain.is_transient());
    }

    #[test]
    fn terminal_status_mapping() {
        assert_eq!(
            CrawlError::DnsFailure("x.de".into()).terminal_status(),
            Some(QueueStatus::FailedDns)
        );
        assert_eq!(
            CrawlError::ValidationRejected.terminal_status(),
            Some(QueueStatus::FailedExtraction)
        );
        assert_eq!(CrawlError::Cancelled.terminal_status(), None);
        assert_eq!(
            CrawlError::StorageUnavailable("gone".into()).terminal_status(),
            None
        );
    }

    #[test]
    fn policy_outcomes_spare_the_error_budget() {
        assert!(!CrawlError::BlockedByBlacklist { pattern: "casino".into() }.counts_against_budget());
        assert!(!CrawlError::BlockedByRobots { reason: "Disallow: /".into() }.counts_against_budget());
        assert!(!CrawlError::ParkedDomain.counts_against_budget());
        assert!(CrawlError::ConnectionFailure("refused".into()).counts_against_budget());
    }
}
