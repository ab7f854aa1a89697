//! Persistent domain queue and result store
//!
//! All status transitions run inside SQLite transactions so a crash never
//! leaves a half-committed lease or result. A worker that dies mid-lease
//! simply lets the lease expire; `lease` treats expired PROCESSING rows as
//! leaseable again.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::entities::{CrawlResult, QueueEntry, QueueStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("domain '{domain}' is not in PROCESSING (transition to {target} refused)")]
    InvalidTransition { domain: String, target: QueueStatus },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// Queue + result store backed by one SQLite database.
#[derive(Clone)]
pub struct QueueStore {
    pool: SqlitePool,
}

impl QueueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a domain with status PENDING if absent; otherwise a no-op.
    /// The source of record is the first insert.
    pub async fn enqueue(&self, domain: &str, source: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO queue (domain, source, status, attempts, created_at, updated_at)
            VALUES (?, ?, 'PENDING', 0, ?, ?)
            ON CONFLICT(domain) DO NOTHING
            "#,
        )
        .bind(domain)
        .bind(source)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Atomically lease up to `n` entries: PENDING rows, plus PROCESSING rows
    /// whose lease already expired. Leased rows move to PROCESSING with a
    /// fresh `lease_expires_at` and an incremented attempt counter. At most
    /// one active lease exists per domain.
    pub async fn lease(&self, n: u32, lease_ttl: Duration) -> Result<Vec<QueueEntry>, StoreError> {
        let now = Utc::now();
        let expires = now + chrono::Duration::from_std(lease_ttl).unwrap_or(chrono::Duration::seconds(300));

        let mut tx = self.pool.begin().await?;

        let candidates: Vec<String> = sqlx::query(
            r#"
            SELECT domain FROM queue
            WHERE status = 'PENDING'
               OR (status = 'PROCESSING' AND lease_expires_at < ?)
            ORDER BY updated_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(n)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|row| row.get::<String, _>("domain"))
        .collect();

        let mut leased = Vec::with_capacity(candidates.len());
        for domain in candidates {
            let updated = sqlx::query(
                r#"
                UPDATE queue
                SET status = 'PROCESSING', lease_expires_at = ?, attempts = attempts + 1, updated_at = ?
                WHERE domain = ?
                  AND (status = 'PENDING' OR (status = 'PROCESSING' AND lease_expires_at < ?))
                "#,
            )
            .bind(expires)
            .bind(now)
            .bind(&domain)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 1 {
                leased.push(domain);
            }
        }

        let mut entries = Vec::with_capacity(leased.len());
        for domain in &leased {
            let row = sqlx::query("SELECT * FROM queue WHERE domain = ?")
                .bind(domain)
                .fetch_one(&mut *tx)
                .await?;
            entries.push(entry_from_row(&row));
        }

        tx.commit().await?;

        if !entries.is_empty() {
            debug!("Leased {} entries until {}", entries.len(), expires);
        }
        Ok(entries)
    }

    /// In one atomic unit: upsert the crawl result and move the queue row to
    /// `terminal_status`. Refused unless the row is currently PROCESSING, so
    /// a completed domain is never overwritten without an explicit reset.
    pub async fn complete(
        &self,
        domain: &str,
        result: &CrawlResult,
        terminal_status: QueueStatus,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE queue SET status = ?, lease_expires_at = NULL, updated_at = ? \
             WHERE domain = ? AND status = 'PROCESSING'",
        )
        .bind(terminal_status.as_str())
        .bind(now)
        .bind(domain)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::InvalidTransition {
                domain: domain.to_string(),
                target: terminal_status,
            });
        }

        upsert_result(&mut tx, result).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Atomic status transition without a result. Refused unless PROCESSING.
    pub async fn fail(&self, domain: &str, terminal_status: QueueStatus) -> Result<(), StoreError> {
        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE queue SET status = ?, lease_expires_at = NULL, updated_at = ? \
             WHERE domain = ? AND status = 'PROCESSING'",
        )
        .bind(terminal_status.as_str())
        .bind(now)
        .bind(domain)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::InvalidTransition {
                domain: domain.to_string(),
                target: terminal_status,
            });
        }
        Ok(())
    }

    /// Release a lease (PROCESSING → PENDING) without touching `attempts`.
    /// Used when a worker defers a host-contended entry or is cancelled.
    pub async fn release(&self, domain: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE queue SET status = 'PENDING', lease_expires_at = NULL, updated_at = ? \
             WHERE domain = ? AND status = 'PROCESSING'",
        )
        .bind(Utc::now())
        .bind(domain)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Move terminal-failure rows back to PENDING. `attempts` is preserved.
    /// With `filter = None` every terminal failure is reset.
    pub async fn reset(&self, filter: Option<QueueStatus>) -> Result<u64, StoreError> {
        let now = Utc::now();
        let affected = match filter {
            Some(status) if status.is_terminal_failure() => {
                sqlx::query(
                    "UPDATE queue SET status = 'PENDING', lease_expires_at = NULL, updated_at = ? \
                     WHERE status = ?",
                )
                .bind(now)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
            Some(_) => 0,
            None => {
                sqlx::query(
                    "UPDATE queue SET status = 'PENDING', lease_expires_at = NULL, updated_at = ? \
                     WHERE status IN ('FAILED_DNS', 'BLOCKED_ROBOTS', 'BLACKLISTED', 'PARKED', \
                                      'FAILED_HTTP_4XX', 'FAILED_HTTP_5XX', 'FAILED_CONNECTION', \
                                      'FAILED_EXTRACTION')",
                )
                .bind(now)
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
        };

        if affected > 0 {
            info!("🔄 Reset {} entries back to PENDING", affected);
        }
        Ok(affected)
    }

    /// Counts per status.
    pub async fn snapshot_stats(&self) -> Result<HashMap<QueueStatus, u64>, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM queue GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = HashMap::new();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("n");
            if let Some(status) = QueueStatus::parse(&status) {
                stats.insert(status, count as u64);
            }
        }
        Ok(stats)
    }

    pub async fn get_entry(&self, domain: &str) -> Result<Option<QueueEntry>, StoreError> {
        let row = sqlx::query("SELECT * FROM queue WHERE domain = ?")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| entry_from_row(&row)))
    }

    /// Flat result rows in deterministic (domain) order, for export.
    pub async fn fetch_results(&self) -> Result<Vec<ResultRow>, StoreError> {
        let rows = sqlx::query("SELECT * FROM results ORDER BY domain ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(result_row_from_row).collect())
    }

    pub async fn get_result(&self, domain: &str) -> Result<Option<ResultRow>, StoreError> {
        let row = sqlx::query("SELECT * FROM results WHERE domain = ?")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(result_row_from_row))
    }
}

/// One stored result, flattened the way the results table and the export
/// schema see it.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub domain: String,
    pub run_id: String,
    pub crawled_at: String,
    pub legal_source_url: String,
    pub legal_name: Option<String>,
    pub legal_name_source: Option<String>,
    pub legal_name_confidence: Option<f64>,
    pub legal_form: Option<String>,
    pub legal_form_source: Option<String>,
    pub legal_form_confidence: Option<f64>,
    pub registration_number: Option<String>,
    pub register_court: Option<String>,
    pub register_type: Option<String>,
    pub vat_id: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub address_source: Option<String>,
    pub address_confidence: Option<f64>,
    pub ceo: Option<String>,
    pub directors: Option<String>,
    pub emails: Option<String>,
    pub emails_source: Option<String>,
    pub emails_confidence: Option<f64>,
    pub phones: Option<String>,
    pub phones_source: Option<String>,
    pub phones_confidence: Option<f64>,
    pub fax: Option<String>,
    pub robots_allowed: bool,
    pub robots_reason: Option<String>,
    pub confidence: f64,
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> QueueEntry {
    let status: String = row.get("status");
    QueueEntry {
        domain: row.get("domain"),
        source: row.get("source"),
        status: QueueStatus::parse(&status).unwrap_or(QueueStatus::Pending),
        attempts: row.get::<i64, _>("attempts") as u32,
        lease_expires_at: row.get::<Option<DateTime<Utc>>, _>("lease_expires_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn result_row_from_row(row: &sqlx::sqlite::SqliteRow) -> ResultRow {
    ResultRow {
        domain: row.get("domain"),
        run_id: row.get("run_id"),
        crawled_at: row.get("crawled_at"),
        legal_source_url: row.get("legal_source_url"),
        legal_name: row.get("legal_name"),
        legal_name_source: row.get("legal_name_source"),
        legal_name_confidence: row.get("legal_name_confidence"),
        legal_form: row.get("legal_form"),
        legal_form_source: row.get("legal_form_source"),
        legal_form_confidence: row.get("legal_form_confidence"),
        registration_number: row.get("registration_number"),
        register_court: row.get("register_court"),
        register_type: row.get("register_type"),
        vat_id: row.get("vat_id"),
        street: row.get("street"),
        postal_code: row.get("postal_code"),
        city: row.get("city"),
        country: row.get("country"),
        address_source: row.get("address_source"),
        address_confidence: row.get("address_confidence"),
        ceo: row.get("ceo"),
        directors: row.get("directors"),
        emails: row.get("emails"),
        emails_source: row.get("emails_source"),
        emails_confidence: row.get("emails_confidence"),
        phones: row.get("phones"),
        phones_source: row.get("phones_source"),
        phones_confidence: row.get("phones_confidence"),
        fax: row.get("fax"),
        robots_allowed: row.get::<i64, _>("robots_allowed") != 0,
        robots_reason: row.get("robots_reason"),
        confidence: row.get("confidence"),
    }
}

async fn upsert_result(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    result: &CrawlResult,
) -> Result<(), sqlx::Error> {
    // Address provenance: the first present address component speaks for the
    // group (all components of one pass share source and confidence).
    let address_field = result
        .street
        .as_ref()
        .or(result.postal_code.as_ref())
        .or(result.city.as_ref())
        .or(result.country.as_ref());

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO results
        (domain, run_id, crawled_at, legal_source_url,
         legal_name, legal_name_source, legal_name_confidence,
         legal_form, legal_form_source, legal_form_confidence,
         registration_number, register_court, register_type, vat_id,
         street, postal_code, city, country, address_source, address_confidence,
         ceo, directors,
         emails, emails_source, emails_confidence,
         phones, phones_source, phones_confidence,
         fax, robots_allowed, robots_reason, confidence)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&result.domain)
    .bind(&result.run_id)
    .bind(result.crawled_at.to_rfc3339())
    .bind(&result.legal_source_url)
    .bind(result.legal_name.as_ref().map(|f| f.value.as_str()))
    .bind(result.legal_name.as_ref().map(|f| f.source.as_str()))
    .bind(result.legal_name.as_ref().map(|f| f.confidence))
    .bind(result.legal_form.as_ref().map(|f| f.value.as_str()))
    .bind(result.legal_form.as_ref().map(|f| f.source.as_str()))
    .bind(result.legal_form.as_ref().map(|f| f.confidence))
    .bind(result.registration_number.as_ref().map(|f| f.value.as_str()))
    .bind(result.register_court.as_ref().map(|f| f.value.as_str()))
    .bind(result.register_type.as_ref().map(|f| f.value.as_str()))
    .bind(result.vat_id.as_ref().map(|f| f.value.as_str()))
    .bind(result.street.as_ref().map(|f| f.value.as_str()))
    .bind(result.postal_code.as_ref().map(|f| f.value.as_str()))
    .bind(result.city.as_ref().map(|f| f.value.as_str()))
    .bind(result.country.as_ref().map(|f| f.value.as_str()))
    .bind(address_field.map(|f| f.source.as_str()))
    .bind(address_field.map(|f| f.confidence))
    .bind(result.ceo.as_ref().map(|f| f.value.as_str()))
    .bind(if result.directors.is_empty() { None } else { Some(result.directors.join("; ")) })
    .bind(result.emails.as_ref().filter(|s| !s.is_empty()).map(|s| s.values.join(",")))
    .bind(result.emails.as_ref().filter(|s| !s.is_empty()).map(|s| s.source.as_str()))
    .bind(result.emails.as_ref().filter(|s| !s.is_empty()).map(|s| s.confidence))
    .bind(result.phones.as_ref().filter(|s| !s.is_empty()).map(|s| s.values.join(",")))
    .bind(result.phones.as_ref().filter(|s| !s.is_empty()).map(|s| s.source.as_str()))
    .bind(result.phones.as_ref().filter(|s| !s.is_empty()).map(|s| s.confidence))
    .bind(result.fax.as_ref().map(|f| f.value.as_str()))
    .bind(result.robots_allowed as i64)
    .bind(result.robots_reason.as_deref())
    .bind(result.confidence)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
