//! Schema-strict tabular export of stored results
//!
//! Fixed column order, timestamped filenames carrying a run-id fragment.
//! Strict profile keeps only rows whose mandatory field set is complete;
//! permissive emits everything. Exporting the same store snapshot twice
//! produces byte-identical files (only the filename timestamp differs).

use anyhow::{Context, Result};
use chrono::Utc;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::infrastructure::config::ExportProfile;
use crate::infrastructure::queue_store::{QueueStore, ResultRow};

/// Deterministic column order of the CSV and JSONL exports.
pub const COLUMNS: &[&str] = &[
    "domain",
    "legal_name",
    "legal_form",
    "street",
    "postal_code",
    "city",
    "country",
    "register_court",
    "register_type",
    "registration_number",
    "vat_id",
    "ceo",
    "directors",
    "phones",
    "emails",
    "fax",
    "robots_allowed",
    "robots_reason",
    "legal_source_url",
    "crawled_at",
    "run_id",
    "legal_name_source",
    "legal_name_confidence",
    "legal_form_source",
    "legal_form_confidence",
    "address_source",
    "address_confidence",
    "phones_source",
    "phones_confidence",
    "emails_source",
    "emails_confidence",
    "confidence",
];

/// Fields that must all be present for a row to pass the strict profile.
const MANDATORY: &[&str] = &["legal_name", "legal_form", "street", "postal_code", "city", "country"];

pub struct Exporter {
    store: QueueStore,
    profile: ExportProfile,
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(store: QueueStore, profile: ExportProfile, output_dir: impl Into<PathBuf>) -> Self {
        Self { store, profile, output_dir: output_dir.into() }
    }

    /// Write the CSV export; returns the created path.
    pub async fn export_csv(&self, run_id: &str) -> Result<PathBuf> {
        let rows = self.filtered_rows().await?;
        let path = self.output_path("csv", run_id);
        std::fs::create_dir_all(&self.output_dir)?;

        let mut file = std::io::BufWriter::new(
            std::fs::File::create(&path).with_context(|| format!("Failed to create {path:?}"))?,
        );

        write_csv_row(&mut file, &COLUMNS.iter().map(|c| c.to_string()).collect::<Vec<_>>())?;
        for row in &rows {
            write_csv_row(&mut file, &row_values(row))?;
        }
        file.flush()?;

        info!("📤 Exported {} rows ({:?} profile) to {:?}", rows.len(), self.profile, path);
        Ok(path)
    }

    /// Record-per-line JSON mirror of the same schema.
    pub async fn export_jsonl(&self, run_id: &str) -> Result<PathBuf> {
        let rows = self.filtered_rows().await?;
        let path = self.output_path("jsonl", run_id);
        std::fs::create_dir_all(&self.output_dir)?;

        let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
        for row in &rows {
            let object: serde_json::Map<String, serde_json::Value> = COLUMNS
                .iter()
                .map(|c| c.to_string())
                .zip(row_json_values(row))
                .collect();
            serde_json::to_writer(&mut file, &object)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;

        info!("📤 Exported {} rows to {:?}", rows.len(), path);
        Ok(path)
    }

    async fn filtered_rows(&self) -> Result<Vec<ResultRow>> {
        let rows = self.store.fetch_results().await?;
        Ok(match self.profile {
            ExportProfile::Permissive => rows,
            ExportProfile::Strict => rows.into_iter().filter(is_complete).collect(),
        })
    }

    fn output_path(&self, extension: &str, run_id: &str) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let run_fragment: String = run_id.chars().take(8).collect();
        let profile = match self.profile {
            ExportProfile::Strict => "strict",
            ExportProfile::Permissive => "permissive",
        };
        self.output_dir
            .join(format!("legal_entities_{profile}_{timestamp}_{run_fragment}.{extension}"))
    }
}

fn is_complete(row: &ResultRow) -> bool {
    MANDATORY.iter().all(|field| {
        let value = match *field {
            "legal_name" => &row.legal_name,
            "legal_form" => &row.legal_form,
            "street" => &row.street,
            "postal_code" => &row.postal_code,
            "city" => &row.city,
            "country" => &row.country,
            _ => return true,
        };
        value.as_deref().map(|v| !v.is_empty()).unwrap_or(false)
    })
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn opt_f64(value: &Option<f64>) -> String {
    value.map(|v| format!("{v:.3}")).unwrap_or_default()
}

fn row_values(row: &ResultRow) -> Vec<String> {
    vec![
        row.domain.clone(),
        opt(&row.legal_name),
        opt(&row.legal_form),
        opt(&row.street),
        opt(&row.postal_code),
        opt(&row.city),
        opt(&row.country),
        opt(&row.register_court),
        opt(&row.register_type),
        opt(&row.registration_number),
        opt(&row.vat_id),
        opt(&row.ceo),
        opt(&row.directors),
        opt(&row.phones),
        opt(&row.emails),
        opt(&row.fax),
        if row.robots_allowed { "true" } else { "false" }.to_string(),
        opt(&row.robots_reason),
        row.legal_source_url.clone(),
        row.crawled_at.clone(),
        row.run_id.clone(),
        opt(&row.legal_name_source),
        opt_f64(&row.legal_name_confidence),
        opt(&row.legal_form_source),
        opt_f64(&row.legal_form_confidence),
        opt(&row.address_source),
        opt_f64(&row.address_confidence),
        opt(&row.phones_source),
        opt_f64(&row.phones_confidence),
        opt(&row.emails_source),
        opt_f64(&row.emails_confidence),
        format!("{:.3}", row.confidence),
    ]
}

fn row_json_values(row: &ResultRow) -> Vec<serde_json::Value> {
    use serde_json::Value;
    row_values(row)
        .into_iter()
        .enumerate()
        .map(|(idx, value)| match COLUMNS[idx] {
            "robots_allowed" => Value::Bool(value == "true"),
            "confidence" | "legal_name_confidence" | "legal_form_confidence"
            | "address_confidence" | "phones_confidence" | "emails_confidence" => {
                value.parse::<f64>().map(|v| serde_json::json!(v)).unwrap_or(Value::Null)
            }
            _ if value.is_empty() => Value::Null,
            _ => Value::String(value),
        })
        .collect()
}

/// Minimal CSV quoting: only fields containing the delimiter, quotes or
/// newlines are wrapped, with embedded quotes doubled.
fn write_csv_row<W: Write>(writer: &mut W, row: &[String]) -> std::io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            write!(writer, ",")?;
        }
        first = false;
        if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
            write!(writer, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(writer, "{cell}")?;
        }
    }
    writeln!(writer)
}
