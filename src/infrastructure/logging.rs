//! Logging system initialization
//!
//! Console output always; optional non-blocking file output in the
//! configured directory. The worker guard is parked in a static so the
//! appender keeps flushing for the process lifetime.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::infrastructure::config::LoggingConfig;

static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialize tracing from the logging config. `RUST_LOG` overrides the
/// configured level when set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("legal_certis={0},warn", config.level)));

    let console_layer = tracing_subscriber::fmt::layer().with_target(false);

    if config.file_enabled {
        std::fs::create_dir_all(&config.dir)?;
        let appender = tracing_appender::rolling::daily(&config.dir, "legal-certis.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);

        let file_layer =
            tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false).with_target(false);

        tracing_subscriber::registry().with(filter).with(console_layer).with(file_layer).init();
        info!("📝 Logging to console and {:?}", config.dir);
    } else {
        tracing_subscriber::registry().with(filter).with(console_layer).init();
    }

    Ok(())
}
