//! In-memory issuance process store.
//!
//! Reference implementation of the lease contract. Every lease decision runs
//! under a single write guard, so selection and leasing are atomic with
//! respect to other threads sharing the store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use vci_model::{validate_identifier, IssuanceError};

use super::{caller_lease, terminal_rejection, Criterion, IssuanceProcessStore, QuerySpec, StoreResult};
use crate::clock::{to_chrono, Clock, SystemClock};
use crate::process::{IssuanceProcess, Lease};

/// Thread-safe in-memory store. Clones share the same data.
#[derive(Debug, Clone)]
pub struct InMemoryIssuanceProcessStore {
    inner: Arc<RwLock<HashMap<String, IssuanceProcess>>>,
    clock: Arc<dyn Clock>,
    lease_duration: chrono::Duration,
}

impl InMemoryIssuanceProcessStore {
    pub fn new(clock: Arc<dyn Clock>, lease_duration: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            clock,
            lease_duration: to_chrono(lease_duration),
        }
    }

    /// System clock, 60 second leases.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(SystemClock), Duration::from_secs(60))
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, IssuanceProcess>>> {
        self.inner
            .read()
            .map_err(|_| IssuanceError::storage("process store lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, IssuanceProcess>>> {
        self.inner
            .write()
            .map_err(|_| IssuanceError::storage("process store lock poisoned"))
    }
}

fn is_available(process: &IssuanceProcess, now: chrono::DateTime<chrono::Utc>) -> bool {
    process.lease().map_or(true, |lease| lease.is_expired(now))
}

impl IssuanceProcessStore for InMemoryIssuanceProcessStore {
    fn create(&self, mut process: IssuanceProcess) -> StoreResult<()> {
        validate_identifier(process.id())
            .map_err(|e| IssuanceError::validation(format!("process id '{}': {}", process.id(), e)))?;

        let mut processes = self.write()?;
        if processes.contains_key(process.id()) {
            return Err(IssuanceError::already_exists(process.id()));
        }
        process.set_lease(None);
        processes.insert(process.id().to_string(), process);
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> StoreResult<Option<IssuanceProcess>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn query(&self, spec: &QuerySpec) -> StoreResult<Vec<IssuanceProcess>> {
        let processes = self.read()?;
        Ok(spec.apply(processes.values().cloned()))
    }

    fn next_not_leased(
        &self,
        owner: &str,
        max: usize,
        filter: &[Criterion],
    ) -> StoreResult<Vec<IssuanceProcess>> {
        let mut processes = self.write()?;
        let now = self.clock.now();

        let mut candidates: Vec<&mut IssuanceProcess> = processes
            .values_mut()
            .filter(|p| is_available(p, now) && p.is_due(now) && filter.iter().all(|c| c.matches(p)))
            .collect();
        candidates.sort_by(|a, b| {
            a.state_timestamp()
                .cmp(&b.state_timestamp())
                .then_with(|| a.id().cmp(b.id()))
        });

        Ok(candidates
            .into_iter()
            .take(max)
            .map(|process| {
                process.set_lease(Some(Lease::new(owner, now, self.lease_duration)));
                process.clone()
            })
            .collect())
    }

    fn find_by_id_and_lease(&self, id: &str, owner: &str) -> StoreResult<IssuanceProcess> {
        let mut processes = self.write()?;
        let now = self.clock.now();

        let process = processes
            .get_mut(id)
            .ok_or_else(|| IssuanceError::process_not_found(id))?;
        if let Some(lease) = process.lease() {
            if lease.owner != owner && !lease.is_expired(now) {
                return Err(IssuanceError::lease_conflict(id, &lease.owner));
            }
        }

        process.set_lease(Some(Lease::new(owner, now, self.lease_duration)));
        Ok(process.clone())
    }

    fn renew_lease(&self, id: &str, owner: &str) -> StoreResult<Lease> {
        let mut processes = self.write()?;
        let now = self.clock.now();

        let process = processes
            .get_mut(id)
            .ok_or_else(|| IssuanceError::process_not_found(id))?;
        let lease = match process.lease() {
            Some(lease) if lease.is_held_by(owner, now) => Lease {
                owner: lease.owner.clone(),
                acquired_at: lease.acquired_at,
                expires_at: now + self.lease_duration,
            },
            _ => return Err(IssuanceError::lease_lost(id, owner)),
        };

        process.set_lease(Some(lease.clone()));
        Ok(lease)
    }

    fn save(&self, process: &IssuanceProcess) -> StoreResult<()> {
        let owner = &caller_lease(process)?.owner;
        let mut processes = self.write()?;
        let now = self.clock.now();

        let stored = processes
            .get_mut(process.id())
            .ok_or_else(|| IssuanceError::process_not_found(process.id()))?;
        if stored.is_terminal() {
            return Err(terminal_rejection(stored));
        }
        if !stored.lease().is_some_and(|lease| lease.is_held_by(owner, now)) {
            return Err(IssuanceError::lease_lost(process.id(), owner));
        }

        let lease = stored.lease.take();
        *stored = IssuanceProcess {
            lease,
            ..process.clone()
        };
        Ok(())
    }

    fn release(&self, id: &str, owner: &str) -> StoreResult<()> {
        let mut processes = self.write()?;

        let process = processes
            .get_mut(id)
            .ok_or_else(|| IssuanceError::process_not_found(id))?;
        match process.lease() {
            Some(lease) if lease.owner == owner => {
                process.set_lease(None);
                Ok(())
            }
            _ => Err(IssuanceError::lease_lost(id, owner)),
        }
    }
}
