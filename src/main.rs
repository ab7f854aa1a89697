//! Process entry point
//!
//! Dispatches on the first argument (crawl | seed | export | stats | reset).
//! Exit codes: 0 normal, 2 configuration error, 3 storage unavailable,
//! 4 halted by the circuit breaker beyond its recovery budget.

use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use legal_certis::application::{Orchestrator, OrchestratorError, Runtime};
use legal_certis::domain::QueueStatus;
use legal_certis::infrastructure::config::{default_config_path, ConfigManager};
use legal_certis::infrastructure::logging::init_logging;
use legal_certis::infrastructure::{DatabaseConnection, Exporter, QueueStore};

const EXIT_CONFIG: u8 = 2;
const EXIT_STORAGE: u8 = 3;
const EXIT_BREAKER: u8 = 4;

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start async runtime: {e}");
            return ExitCode::from(EXIT_STORAGE);
        }
    };
    ExitCode::from(runtime.block_on(run()))
}

async fn run() -> u8 {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("crawl");

    // Configuration first; its errors have their own exit code
    let config_path = std::env::var("LEGAL_CERTIS_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path().to_path_buf());
    let config = match ConfigManager::new(config_path).load_or_init().await {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("⚠️ Configuration error: {e:#}");
            return EXIT_CONFIG;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("❌ Failed to initialize logging: {e}");
        return EXIT_CONFIG;
    }

    let db = match DatabaseConnection::new(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Storage unavailable: {:#}", e);
            return EXIT_STORAGE;
        }
    };
    if let Err(e) = db.migrate().await {
        error!("Migration failed: {:#}", e);
        return EXIT_STORAGE;
    }
    let store = QueueStore::new(db.pool().clone());

    match command {
        "crawl" => {
            let runtime = match Runtime::new(config.clone(), store, None) {
                Ok(runtime) => Arc::new(runtime),
                Err(e) => {
                    error!("Invalid crawl configuration: {:#}", e);
                    return EXIT_CONFIG;
                }
            };
            let orchestrator = Orchestrator::new(runtime);
            match orchestrator.run().await {
                Ok(()) => 0,
                Err(OrchestratorError::StorageUnavailable(reason)) => {
                    error!("{}", reason);
                    EXIT_STORAGE
                }
                Err(OrchestratorError::BreakerExhausted) => EXIT_BREAKER,
            }
        }
        "seed" => {
            let Some(path) = args.get(2) else {
                eprintln!("Usage: legal-certis seed <domains.txt> [source-tag]");
                return EXIT_CONFIG;
            };
            let source = args.get(3).map(String::as_str).unwrap_or("seed-file");
            match seed_from_file(&store, path, source).await {
                Ok(added) => {
                    info!("🌱 Enqueued {} new domains from {}", added, path);
                    0
                }
                Err(e) => {
                    error!("Seeding failed: {:#}", e);
                    EXIT_STORAGE
                }
            }
        }
        "export" => {
            let exporter =
                Exporter::new(store, config.export.profile, config.export.output_dir.clone());
            let run_id = args.get(2).cloned().unwrap_or_else(|| "all".to_string());
            let csv = exporter.export_csv(&run_id).await;
            let jsonl = exporter.export_jsonl(&run_id).await;
            match (csv, jsonl) {
                (Ok(_), Ok(_)) => 0,
                (Err(e), _) | (_, Err(e)) => {
                    error!("Export failed: {:#}", e);
                    EXIT_STORAGE
                }
            }
        }
        "stats" => match store.snapshot_stats().await {
            Ok(stats) => {
                let mut lines: Vec<String> =
                    stats.iter().map(|(status, n)| format!("  {status:<20} {n}")).collect();
                lines.sort();
                println!("Queue status:\n{}", lines.join("\n"));
                0
            }
            Err(e) => {
                error!("{}", e);
                EXIT_STORAGE
            }
        },
        "reset" => {
            let filter = args.get(2).and_then(|s| QueueStatus::parse(s));
            match store.reset(filter).await {
                Ok(n) => {
                    info!("Reset {} entries to PENDING", n);
                    0
                }
                Err(e) => {
                    error!("{}", e);
                    EXIT_STORAGE
                }
            }
        }
        other => {
            eprintln!("Unknown command '{other}'. Commands: crawl, seed, export, stats, reset");
            EXIT_CONFIG
        }
    }
}

/// Operator convenience: enqueue newline-delimited domains from a file.
async fn seed_from_file(store: &QueueStore, path: &str, source: &str) -> anyhow::Result<u64> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut added = 0;
    for line in content.lines() {
        let domain = line.trim().trim_start_matches("http://").trim_start_matches("https://");
        let domain = domain.trim_start_matches("www.").trim_end_matches('/');
        if domain.is_empty() || domain.starts_with('#') || !domain.contains('.') {
            continue;
        }
        if store.enqueue(&domain.to_lowercase(), source).await? {
            added += 1;
        }
    }
    Ok(added)
}
