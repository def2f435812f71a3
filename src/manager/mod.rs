//! Issuance process manager
//!
//! Drives leased processes through the state machine:
//!
//! - CREATED → PENDING, then evaluated like PENDING
//! - PENDING: attestations, rules and mappings produce the final claims
//!   (→ APPROVED), then the credential is written (→ ISSUED)
//! - APPROVED: write the credential (→ ISSUED)
//! - ERROR: back off, then retry (→ PENDING) or give up (→ TERMINATED)
//!
//! Failures send the process to ERROR; non-retryable failures and exhausted
//! retries continue to TERMINATED in the same cycle. Every save happens under
//! the lease handed out by the store. Manager instances share nothing but the
//! store.

mod retry;
mod worker;

pub use retry::RetryPolicy;
pub use worker::{Worker, WorkerConfig, WorkerSummary};

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use vci_attestation::{AttestationContext, AttestationPipeline};
use vci_model::{Claims, CredentialDefinition, IssuanceError};

use crate::clock::{to_chrono, Clock, SystemClock};
use crate::credential::{CredentialDefinitionStore, CredentialWriter};
use crate::mapping;
use crate::process::IssuanceProcess;
use crate::rules;
use crate::state::IssuanceProcessState;
use crate::store::{Criterion, IssuanceProcessStore};

/// States the manager picks up.
pub const ACTIVE_STATES: [IssuanceProcessState; 4] = [
    IssuanceProcessState::Created,
    IssuanceProcessState::Pending,
    IssuanceProcessState::Approved,
    IssuanceProcessState::Error,
];

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Lease owner name; unique per manager instance.
    pub owner: String,
    /// Maximum processes leased per cycle.
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl ManagerConfig {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            batch_size: 10,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Counts for one [`IssuanceProcessManager::run_once`] cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub leased: usize,
    pub issued: usize,
    /// Processes that reached APPROVED this cycle, whether or not they were
    /// also issued.
    pub approved: usize,
    /// Processes left in ERROR awaiting a retry.
    pub errored: usize,
    pub terminated: usize,
    /// Leased but left untouched (retry back-off not yet elapsed). Stores
    /// hold scheduled retries back, so this only counts ERROR rows that
    /// carry no retry time.
    pub skipped: usize,
    pub lease_lost: usize,
    /// Store or state failures; the lease is left to expire.
    pub failed: usize,
}

impl CycleReport {
    /// Processes this cycle actually worked on.
    pub fn advanced(&self) -> usize {
        self.leased.saturating_sub(self.skipped)
    }

    pub fn merge(&mut self, other: &CycleReport) {
        self.leased += other.leased;
        self.issued += other.issued;
        self.approved += other.approved;
        self.errored += other.errored;
        self.terminated += other.terminated;
        self.skipped += other.skipped;
        self.lease_lost += other.lease_lost;
        self.failed += other.failed;
    }
}

/// Where a process ended up after one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Issued,
    Errored,
    Terminated,
    Skipped,
}

pub struct IssuanceProcessManager {
    store: Arc<dyn IssuanceProcessStore>,
    pipeline: AttestationPipeline,
    definitions: Arc<dyn CredentialDefinitionStore>,
    writer: Arc<dyn CredentialWriter>,
    clock: Arc<dyn Clock>,
    config: ManagerConfig,
}

impl IssuanceProcessManager {
    pub fn new(
        store: Arc<dyn IssuanceProcessStore>,
        pipeline: AttestationPipeline,
        definitions: Arc<dyn CredentialDefinitionStore>,
        writer: Arc<dyn CredentialWriter>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            definitions,
            writer,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Use `clock` for transition timestamps and retry back-off. Should be
    /// the clock the store uses.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Lease one batch of active processes and drive each as far as it goes.
    ///
    /// Fails only when the batch itself cannot be leased; per-process
    /// failures are logged and counted.
    pub fn run_once(&self) -> Result<CycleReport, IssuanceError> {
        let owner = &self.config.owner;
        let batch = self.store.next_not_leased(
            owner,
            self.config.batch_size,
            &[Criterion::StateIn(ACTIVE_STATES.to_vec())],
        )?;

        let mut report = CycleReport {
            leased: batch.len(),
            ..CycleReport::default()
        };

        for process in batch {
            let id = process.id().to_string();
            let from = process.state();

            match self.drive(process, &mut report) {
                Ok(outcome) => {
                    match outcome {
                        Outcome::Issued => report.issued += 1,
                        Outcome::Errored => report.errored += 1,
                        Outcome::Terminated => report.terminated += 1,
                        Outcome::Skipped => report.skipped += 1,
                    }
                    debug!(process_id = %id, from = %from, outcome = ?outcome, "process handled");
                    if let Err(e) = self.store.release(&id, owner) {
                        if e.is_concurrency() {
                            report.lease_lost += 1;
                        }
                        warn!(process_id = %id, owner = %owner, error = %e, "failed to release lease");
                    }
                }
                Err(e) if e.is_concurrency() => {
                    report.lease_lost += 1;
                    warn!(process_id = %id, owner = %owner, error = %e, "lease lost, abandoning process");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(process_id = %id, owner = %owner, error = %e, "failed to persist process, lease left to expire");
                }
            }
        }

        if report.leased > 0 {
            info!(
                owner = %owner,
                leased = report.leased,
                issued = report.issued,
                errored = report.errored,
                terminated = report.terminated,
                "issuance cycle complete"
            );
        }
        Ok(report)
    }

    fn drive(&self, mut process: IssuanceProcess, report: &mut CycleReport) -> Result<Outcome, IssuanceError> {
        match process.state() {
            IssuanceProcessState::Created => {
                process.transition_to_pending(self.clock.now())?;
                self.store.save(&process)?;
                self.evaluate_and_issue(process, report)
            }
            IssuanceProcessState::Pending => self.evaluate_and_issue(process, report),
            IssuanceProcessState::Approved => self.issue(process),
            IssuanceProcessState::Error => self.retry(process, report),
            IssuanceProcessState::Issued | IssuanceProcessState::Terminated => Ok(Outcome::Skipped),
        }
    }

    fn evaluate_and_issue(
        &self,
        mut process: IssuanceProcess,
        report: &mut CycleReport,
    ) -> Result<Outcome, IssuanceError> {
        self.store.renew_lease(process.id(), &self.config.owner)?;

        let claims = match self.evaluate(&process) {
            Ok(claims) => claims,
            Err(e) => return self.fail(process, e),
        };

        process.transition_to_approved(claims, self.clock.now())?;
        self.store.save(&process)?;
        report.approved += 1;
        self.issue(process)
    }

    /// Produce the final credential claims for a PENDING process.
    fn evaluate(&self, process: &IssuanceProcess) -> Result<Claims, IssuanceError> {
        let definitions = self.resolve_definitions(process)?;

        let mut seen = HashSet::new();
        let attestation_ids: Vec<&str> = definitions
            .iter()
            .flat_map(|d| d.attestations.iter().map(String::as_str))
            .filter(|id| seen.insert(*id))
            .collect();

        let context = AttestationContext::new(process.participant_context_id(), process.holder_id())
            .with_holder_pid(process.holder_pid())
            .with_claims(process.claims().clone());
        let attested = self.pipeline.evaluate(&attestation_ids, &context)?;

        let mut claims = process.claims().clone();
        claims.extend(attested);

        for definition in &definitions {
            rules::evaluate_rules(&definition.rules, &claims)?;
        }

        let mappings: Vec<_> = definitions
            .iter()
            .flat_map(|d| d.mappings.iter().cloned())
            .collect();
        if mappings.is_empty() {
            return Ok(claims);
        }
        mapping::apply_all(&mappings, &claims)
    }

    fn resolve_definitions(&self, process: &IssuanceProcess) -> Result<Vec<CredentialDefinition>, IssuanceError> {
        process
            .credential_definitions()
            .iter()
            .map(|id| {
                self.definitions
                    .resolve(id)?
                    .ok_or_else(|| IssuanceError::unknown_credential_definition(id))
            })
            .collect()
    }

    fn issue(&self, mut process: IssuanceProcess) -> Result<Outcome, IssuanceError> {
        let definitions = match self.resolve_definitions(&process) {
            Ok(definitions) => definitions,
            Err(e) => return self.fail(process, e),
        };

        self.store.renew_lease(process.id(), &self.config.owner)?;
        if let Err(e) = self.writer.write(&process, &definitions) {
            return self.fail(process, e);
        }

        process.transition_to_issued(self.clock.now())?;
        self.store.save(&process)?;
        info!(
            process_id = %process.id(),
            holder_id = %process.holder_id(),
            credentials = definitions.len(),
            "issuance process issued"
        );
        Ok(Outcome::Issued)
    }

    /// Record a failed attempt; terminate when it cannot or may not be retried.
    fn fail(&self, mut process: IssuanceProcess, failure: IssuanceError) -> Result<Outcome, IssuanceError> {
        let now = self.clock.now();
        process.transition_to_error(failure.to_string(), now)?;

        let retry = &self.config.retry;
        if !failure.is_retryable() || retry.is_exhausted(process.retry_count()) {
            self.store.save(&process)?;
            return self.terminate(process, &failure.to_string());
        }

        let next_attempt_at = now + to_chrono(retry.delay_for(process.retry_count()));
        process.schedule_retry(next_attempt_at)?;
        self.store.save(&process)?;
        warn!(
            process_id = %process.id(),
            retry_count = process.retry_count(),
            next_attempt_at = %next_attempt_at,
            error = %failure,
            "issuance attempt failed, will retry"
        );
        Ok(Outcome::Errored)
    }

    fn terminate(&self, mut process: IssuanceProcess, reason: &str) -> Result<Outcome, IssuanceError> {
        process.transition_to_terminated(None, self.clock.now())?;
        self.store.save(&process)?;
        warn!(
            process_id = %process.id(),
            retry_count = process.retry_count(),
            reason = %reason,
            "issuance process terminated"
        );
        Ok(Outcome::Terminated)
    }

    fn retry(&self, mut process: IssuanceProcess, report: &mut CycleReport) -> Result<Outcome, IssuanceError> {
        let retry = &self.config.retry;
        if retry.is_exhausted(process.retry_count()) {
            return self.terminate(process, "retries exhausted");
        }

        let now = self.clock.now();
        let due = process
            .next_attempt_at()
            .unwrap_or_else(|| process.state_timestamp() + to_chrono(retry.delay_for(process.retry_count())));
        if now < due {
            return Ok(Outcome::Skipped);
        }

        debug!(process_id = %process.id(), retry_count = process.retry_count(), "retrying issuance process");
        process.transition_to_pending(now)?;
        self.store.save(&process)?;
        self.evaluate_and_issue(process, report)
    }
}

impl std::fmt::Debug for IssuanceProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuanceProcessManager")
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .finish()
    }
}
