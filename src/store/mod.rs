//! Lease-aware persistence for issuance processes
//!
//! Every mutation of a stored process happens under a lease. A manager
//! obtains leases through [`IssuanceProcessStore::next_not_leased`] (or
//! [`IssuanceProcessStore::find_by_id_and_lease`]), saves transitions while
//! the lease is valid, and releases it when done. A lease held by one owner
//! blocks every other owner until it expires or is released.

mod memory;
mod query;
mod sqlite;

pub use memory::InMemoryIssuanceProcessStore;
pub use query::{state_restriction, Criterion, QuerySpec, SortField, SortOrder};
pub use sqlite::SqliteIssuanceProcessStore;

use vci_model::IssuanceError;

use crate::process::{IssuanceProcess, Lease};

pub type StoreResult<T> = Result<T, IssuanceError>;

/// Persistence for issuance processes with lease-based exclusive access.
pub trait IssuanceProcessStore: Send + Sync {
    /// Insert a new process. Duplicate ids and malformed ids are validation
    /// failures. Any lease on the argument is ignored.
    fn create(&self, process: IssuanceProcess) -> StoreResult<()>;

    fn find_by_id(&self, id: &str) -> StoreResult<Option<IssuanceProcess>>;

    fn query(&self, spec: &QuerySpec) -> StoreResult<Vec<IssuanceProcess>>;

    /// Atomically select up to `max` processes matching `filter` that have no
    /// lease or an expired one, oldest `state_timestamp` first, and lease them
    /// to `owner`. Concurrent callers never receive the same process while its
    /// lease is valid.
    fn next_not_leased(
        &self,
        owner: &str,
        max: usize,
        filter: &[Criterion],
    ) -> StoreResult<Vec<IssuanceProcess>>;

    /// Lease one specific process to `owner`.
    fn find_by_id_and_lease(&self, id: &str, owner: &str) -> StoreResult<IssuanceProcess>;

    /// Extend a valid lease held by `owner` by a full lease duration.
    fn renew_lease(&self, id: &str, owner: &str) -> StoreResult<Lease>;

    /// Persist the mutable fields of a leased process.
    ///
    /// The process must carry the lease it was handed and the stored lease
    /// must still be held by that owner and unexpired. The lease stays in
    /// place; call [`release`](Self::release) when done.
    fn save(&self, process: &IssuanceProcess) -> StoreResult<()>;

    /// Clear the lease if `owner` holds it.
    fn release(&self, id: &str, owner: &str) -> StoreResult<()>;
}

/// Owner named by the lease a caller attached to a process.
pub(crate) fn caller_lease(process: &IssuanceProcess) -> StoreResult<&Lease> {
    process.lease().ok_or_else(|| {
        IssuanceError::concurrency(format!(
            "issuance process '{}' was saved without a lease",
            process.id()
        ))
    })
}

pub(crate) fn terminal_rejection(process: &IssuanceProcess) -> IssuanceError {
    IssuanceError::validation(format!(
        "issuance process '{}' is {} and can no longer change",
        process.id(),
        process.state()
    ))
}
