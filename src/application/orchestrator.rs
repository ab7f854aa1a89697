//! Crawl orchestrator: worker pool, per-host politeness, graceful stop
//!
//! Workers independently lease single entries, defer host-contended ones,
//! and run the pipeline under a per-entry deadline. Stop arrives via ctrl-c,
//! the sentinel file, or an exhausted error budget; workers finish their
//! current entry and exit, outstanding leases expire by TTL.

use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::pipeline::{self, ObservedFailure};
use crate::application::runtime::Runtime;
use crate::domain::entities::{registered_domain, QueueStatus};
use crate::domain::errors::CrawlError;
use crate::infrastructure::queue_store::StoreError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("storage backend unavailable: {0}")]
    StorageUnavailable(String),

    #[error("halted by circuit breaker beyond recovery budget")]
    BreakerExhausted,
}

/// In-memory host mutex map: at most one worker touches a registered
/// domain at any instant. No global lock is held while crawling.
#[derive(Clone, Default)]
pub struct HostMutexMap {
    inner: Arc<StdMutex<HashSet<String>>>,
}

impl HostMutexMap {
    pub fn try_acquire(&self, host: &str) -> Option<HostGuard> {
        let key = registered_domain(host).to_string();
        let mut held = self.inner.lock().unwrap();
        if held.insert(key.clone()) {
            Some(HostGuard { map: self.inner.clone(), key })
        } else {
            None
        }
    }
}

pub struct HostGuard {
    map: Arc<StdMutex<HashSet<String>>>,
    key: String,
}

impl Drop for HostGuard {
    fn drop(&mut self) {
        self.map.lock().unwrap().remove(&self.key);
    }
}

pub struct Orchestrator {
    runtime: Arc<Runtime>,
    breaker: Arc<CircuitBreaker>,
    hosts: HostMutexMap,
    cancel: CancellationToken,
    run_id: String,
}

impl Orchestrator {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(runtime.config.breaker.clone()));
        Self {
            runtime,
            breaker,
            hosts: HostMutexMap::default(),
            cancel: CancellationToken::new(),
            run_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the crawl until the queue drains or a stop signal arrives.
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        let workers = self.runtime.config.crawl.workers;
        info!("🚀 Starting crawl run {} with {} workers", self.run_id, workers);

        let storage_failed = Arc::new(StdMutex::new(false));

        let stop_watcher = tokio::spawn(stop_watcher(
            self.runtime.config.crawl.stop_sentinel_path.clone(),
            self.cancel.clone(),
        ));
        let reporter = tokio::spawn(progress_reporter(self.runtime.clone(), self.cancel.clone()));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let runtime = self.runtime.clone();
            let breaker = self.breaker.clone();
            let hosts = self.hosts.clone();
            let cancel = self.cancel.clone();
            let run_id = self.run_id.clone();
            let storage_failed = storage_failed.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, runtime, breaker, hosts, cancel, run_id, storage_failed)
                    .await
            }));
        }

        let mut breaker_exhausted = false;
        for handle in handles {
            match handle.await {
                Ok(WorkerExit::BreakerExhausted) => breaker_exhausted = true,
                Ok(_) => {}
                Err(e) => error!("Worker panicked: {}", e),
            }
        }

        self.cancel.cancel();
        stop_watcher.abort();
        reporter.abort();

        if let Ok(stats) = self.runtime.store.snapshot_stats().await {
            let mut summary: Vec<String> =
                stats.iter().map(|(status, n)| format!("{status}: {n}")).collect();
            summary.sort();
            info!("✅ Crawl run {} finished ({})", self.run_id, summary.join(", "));
        }

        if breaker_exhausted {
            return Err(OrchestratorError::BreakerExhausted);
        }
        if *storage_failed.lock().unwrap() {
            return Err(OrchestratorError::StorageUnavailable(
                "queue store became unreachable during the run".to_string(),
            ));
        }
        Ok(())
    }
}

enum WorkerExit {
    Normal,
    BreakerExhausted,
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    runtime: Arc<Runtime>,
    breaker: Arc<CircuitBreaker>,
    hosts: HostMutexMap,
    cancel: CancellationToken,
    run_id: String,
    storage_failed: Arc<StdMutex<bool>>,
) -> WorkerExit {
    debug!("👷 Worker {} started", worker_id);
    let lease_ttl = runtime.config.lease_ttl();
    let deadline = runtime.config.per_entry_deadline();
    let mut idle_polls: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let _permit = match breaker.acquire(&cancel).await {
            Ok(permit) => permit,
            Err(e) => {
                error!("🔌 {}", e);
                cancel.cancel();
                return WorkerExit::BreakerExhausted;
            }
        };
        if cancel.is_cancelled() {
            break;
        }

        let entries = match runtime.store.lease(1, lease_ttl).await {
            Ok(entries) => entries,
            Err(StoreError::Unavailable(reason)) => {
                error!("Storage unavailable, stopping new leases: {}", reason);
                *storage_failed.lock().unwrap() = true;
                cancel.cancel();
                break;
            }
            Err(e) => {
                warn!("Lease failed: {}", e);
                continue;
            }
        };

        let Some(entry) = entries.into_iter().next() else {
            // Empty queue: jittered backoff, capped exponential
            idle_polls = idle_polls.saturating_add(1);
            if idle_polls > 3 {
                debug!("👷 Worker {} found no leasable entries, exiting", worker_id);
                break;
            }
            let base = runtime.config.crawl.queue_poll_ms;
            let wait = base * u64::from(idle_polls) + rand::thread_rng().gen_range(0..=base / 2);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(wait)) => continue,
                _ = cancel.cancelled() => break,
            }
        };
        idle_polls = 0;

        // Per-host serialisation: defer instead of waiting
        let Some(_host_guard) = hosts.try_acquire(&entry.domain) else {
            debug!("Host busy, deferring {}", entry.domain);
            if let Err(e) = runtime.store.release(&entry.domain).await {
                warn!("Release of deferred {} failed: {}", entry.domain, e);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            continue;
        };

        process_one(&runtime, &breaker, &cancel, &run_id, &entry.domain, deadline, &storage_failed)
            .await;
    }

    debug!("👷 Worker {} stopped", worker_id);
    WorkerExit::Normal
}

async fn process_one(
    runtime: &Runtime,
    breaker: &CircuitBreaker,
    cancel: &CancellationToken,
    run_id: &str,
    domain: &str,
    deadline: Duration,
    storage_failed: &StdMutex<bool>,
) {
    let observed: ObservedFailure = Arc::new(StdMutex::new(None));

    let outcome = tokio::time::timeout(
        deadline,
        pipeline::process_entry(runtime, domain, run_id, cancel, &observed),
    )
    .await;

    let commit = match outcome {
        Err(_elapsed) => {
            let status =
                observed.lock().unwrap().take().unwrap_or(QueueStatus::FailedConnection);
            warn!("⏱️ {} hit the per-entry deadline, recording {}", domain, status);
            breaker.record(false);
            runtime.store.fail(domain, status).await
        }
        Ok(Ok(result)) => {
            info!(
                "✅ {} extracted '{}' (confidence {:.2})",
                domain,
                result.legal_name.as_ref().map(|f| f.value.as_str()).unwrap_or("?"),
                result.confidence
            );
            breaker.record(true);
            runtime.store.complete(domain, &result, QueueStatus::Completed).await
        }
        Ok(Err(CrawlError::Cancelled)) => {
            debug!("{} cancelled, releasing lease", domain);
            runtime.store.release(domain).await
        }
        Ok(Err(CrawlError::StorageUnavailable(reason))) => {
            *storage_failed.lock().unwrap() = true;
            cancel.cancel();
            error!("Storage unavailable while processing {}: {}", domain, reason);
            runtime.store.release(domain).await
        }
        Ok(Err(e)) => {
            let status = e.terminal_status().unwrap_or(QueueStatus::FailedConnection);
            info!("❌ {} → {} ({})", domain, status, e);
            if e.counts_against_budget() {
                breaker.record(false);
            }
            runtime.store.fail(domain, status).await
        }
    };

    match commit {
        Ok(()) => {}
        Err(StoreError::Unavailable(reason)) => {
            error!("Could not commit outcome for {}: {}", domain, reason);
            *storage_failed.lock().unwrap() = true;
            cancel.cancel();
        }
        Err(StoreError::InvalidTransition { .. }) => {
            // Lease must have expired and been re-taken; the other holder
            // owns the row now.
            warn!("Commit for {} refused, lease was lost", domain);
        }
    }
}

/// Watches for the stop sentinel file and ctrl-c.
async fn stop_watcher(sentinel: std::path::PathBuf, cancel: CancellationToken) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("🛑 Ctrl+C received, finishing current entries..."),
            Err(e) => {
                // No signal handling available; the sentinel still works
                warn!("Could not register Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    let sentinel_watch = async {
        loop {
            if sentinel.exists() {
                info!("🛑 Stop sentinel {:?} detected, finishing current entries...", sentinel);
                return;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    };

    tokio::select! {
        _ = ctrl_c => cancel.cancel(),
        _ = sentinel_watch => cancel.cancel(),
        _ = cancel.cancelled() => {}
    }
}

/// Logs per-status counts and throughput every 30 seconds.
async fn progress_reporter(runtime: Arc<Runtime>, cancel: CancellationToken) {
    let started = std::time::Instant::now();
    let mut last_done: u64 = 0;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(30)) => {}
            _ = cancel.cancelled() => return,
        }

        let Ok(stats) = runtime.store.snapshot_stats().await else { continue };
        let pending = stats.get(&QueueStatus::Pending).copied().unwrap_or(0);
        let processing = stats.get(&QueueStatus::Processing).copied().unwrap_or(0);
        let completed = stats.get(&QueueStatus::Completed).copied().unwrap_or(0);
        let failed: u64 = stats
            .iter()
            .filter(|(status, _)| status.is_terminal_failure())
            .map(|(_, n)| *n)
            .sum();

        let done = completed + failed;
        let rate = (done - last_done.min(done)) as f64 / 30.0 * 60.0;
        last_done = done;

        info!(
            "📊 PROGRESS: OK {} | FAIL {} | pending {} | in-flight {} | {:.1}/min | up {:.0}m",
            completed,
            failed,
            pending,
            processing,
            rate,
            started.elapsed().as_secs_f64() / 60.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_mutex_is_exclusive_per_registered_domain() {
        let map = HostMutexMap::default();

        let guard = map.try_acquire("example.de").unwrap();
        // www and apex are the same registered domain
        assert!(map.try_acquire("www.example.de").is_none());
        assert!(map.try_acquire("other.de").is_some());

        drop(guard);
        assert!(map.try_acquire("example.de").is_some());
    }
}
