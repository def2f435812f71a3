//! Continuous manager loop with idle back-off and graceful shutdown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::{CycleReport, IssuanceProcessManager};

/// Slice the idle sleep so shutdown is noticed promptly.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Sleep after a cycle that advanced nothing.
    pub poll_interval: Duration,
    /// Upper bound for the idle sleep, which doubles while idle.
    pub max_idle_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_idle_backoff: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub cycles: u64,
    /// Cycles whose batch could not be leased.
    pub failed_cycles: u64,
    pub totals: CycleReport,
}

pub struct Worker {
    manager: IssuanceProcessManager,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(manager: IssuanceProcessManager, config: WorkerConfig) -> Self {
        Self {
            manager,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle for requesting shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run cycles until shutdown is requested.
    ///
    /// A cycle that advanced a process is followed immediately by the next
    /// one; leased processes that were only skipped do not count.
    /// Otherwise the worker sleeps, doubling the sleep from `poll_interval`
    /// up to `max_idle_backoff` while nothing turns up.
    pub fn run(&self) -> WorkerSummary {
        let mut summary = WorkerSummary::default();
        let mut idle = self.config.poll_interval;

        info!(
            owner = %self.manager.config().owner,
            batch_size = self.manager.config().batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "issuance worker starting"
        );

        while !self.is_shutdown() {
            summary.cycles += 1;
            let busy = match self.manager.run_once() {
                Ok(report) => {
                    summary.totals.merge(&report);
                    report.advanced() > 0
                }
                Err(e) => {
                    summary.failed_cycles += 1;
                    warn!(error = %e, "failed to lease issuance processes");
                    false
                }
            };

            if busy {
                idle = self.config.poll_interval;
                continue;
            }

            self.sleep(idle);
            idle = (idle * 2).min(self.config.max_idle_backoff.max(self.config.poll_interval));
        }

        info!(
            cycles = summary.cycles,
            issued = summary.totals.issued,
            terminated = summary.totals.terminated,
            "issuance worker shutting down"
        );
        summary
    }

    fn sleep(&self, total: Duration) {
        let mut remaining = total;
        while !remaining.is_zero() && !self.is_shutdown() {
            let step = remaining.min(SHUTDOWN_CHECK_INTERVAL);
            thread::sleep(step);
            remaining -= step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{InMemoryCredentialDefinitionStore, LoggingCredentialWriter};
    use crate::manager::{ManagerConfig, RetryPolicy};
    use crate::process::IssuanceProcess;
    use crate::store::IssuanceProcessStore;
    use chrono::Utc;
    use crate::store::InMemoryIssuanceProcessStore;
    use std::time::Instant;
    use vci_attestation::{AttestationPipeline, AttestationSourceRegistry, InMemoryAttestationDefinitionStore};
    use vci_model::CredentialFormat;

    fn worker_over(store: InMemoryIssuanceProcessStore, retry: RetryPolicy) -> Worker {
        let manager = IssuanceProcessManager::new(
            Arc::new(store),
            AttestationPipeline::new(
                Arc::new(InMemoryAttestationDefinitionStore::new()),
                Arc::new(AttestationSourceRegistry::new()),
            ),
            Arc::new(InMemoryCredentialDefinitionStore::new()),
            Arc::new(LoggingCredentialWriter),
            ManagerConfig::new("worker-test").with_retry(retry),
        );
        Worker::new(
            manager,
            WorkerConfig {
                poll_interval: Duration::from_millis(10),
                max_idle_backoff: Duration::from_millis(40),
            },
        )
    }

    fn idle_worker() -> Worker {
        worker_over(InMemoryIssuanceProcessStore::with_defaults(), RetryPolicy::default())
    }

    #[test]
    fn test_shutdown_before_run() {
        let worker = idle_worker();
        worker.shutdown_handle().store(true, Ordering::SeqCst);

        let summary = worker.run();
        assert_eq!(summary.cycles, 0);
    }

    #[test]
    fn test_shutdown_stops_idle_loop() {
        let worker = Arc::new(idle_worker());
        let handle = worker.shutdown_handle();

        let runner = {
            let worker = Arc::clone(&worker);
            thread::spawn(move || worker.run())
        };

        thread::sleep(Duration::from_millis(150));
        let requested = Instant::now();
        handle.store(true, Ordering::SeqCst);
        let summary = runner.join().unwrap();

        assert!(summary.cycles >= 2);
        assert_eq!(summary.totals.leased, 0);
        assert!(requested.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_skipped_work_backs_off_like_idle() {
        let store = InMemoryIssuanceProcessStore::with_defaults();
        let now = Utc::now();
        store
            .create(
                IssuanceProcess::new("p1", "issuer", "did:web:alice", now)
                    .with_credential_definition("membership", CredentialFormat::Vc2Jose),
            )
            .unwrap();
        let mut leased = store.next_not_leased("other", 1, &[]).unwrap().remove(0);
        leased.transition_to_pending(now).unwrap();
        leased.transition_to_error("TRANSIENT: down", now).unwrap();
        store.save(&leased).unwrap();
        store.release("p1", "other").unwrap();

        let hour = Duration::from_secs(3600);
        let worker = Arc::new(worker_over(store, RetryPolicy::new(3, hour, hour)));
        let handle = worker.shutdown_handle();
        let runner = {
            let worker = Arc::clone(&worker);
            thread::spawn(move || worker.run())
        };

        thread::sleep(Duration::from_millis(150));
        handle.store(true, Ordering::SeqCst);
        let summary = runner.join().unwrap();

        assert!(summary.totals.skipped >= 1);
        assert_eq!(summary.totals.skipped, summary.totals.leased);
        assert!(summary.cycles < 20, "worker spun {} cycles", summary.cycles);
    }
}
