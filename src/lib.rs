//! VCI Engine - credential issuance process engine
//!
//! Durable issuance processes are driven through attestation evaluation,
//! credential rules and claims mapping by managers that share a lease-aware
//! store. Credential serialization and signing stay behind
//! [`credential::CredentialWriter`].

pub mod clock;
pub mod config;
pub mod credential;
pub mod manager;
pub mod mapping;
pub mod process;
pub mod rules;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{CycleReport, IssuanceProcessManager, ManagerConfig, RetryPolicy, Worker, WorkerConfig};
pub use process::{IssuanceProcess, IssuanceRequest, Lease};
pub use state::IssuanceProcessState;
pub use store::{InMemoryIssuanceProcessStore, IssuanceProcessStore, QuerySpec, SqliteIssuanceProcessStore};
pub use vci_model::{FailureKind, IssuanceError};
