//! End-to-end issuance over SQLite-backed stores
//!
//! - Definitions loaded from a catalog file drive attestation, rules and
//!   mappings through to the credential writer
//! - Transient failures retry until `max_retries`, then terminate
//! - Several managers sharing one database file issue each process once
//! - A manager whose lease is taken over mid-cycle writes nothing
//! - State survives reopening the database

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use vci_attestation::{
    default_registry, AttestationContext, AttestationPipeline, AttestationSource, AttestationSourceRegistry,
    FnSource, InMemoryAttestationDefinitionStore,
};
use vci_engine::clock::{Clock, ManualClock, SystemClock};
use vci_engine::credential::{
    CredentialWriter, DefinitionCatalog, InMemoryCredentialDefinitionStore,
};
use vci_engine::manager::{IssuanceProcessManager, ManagerConfig, RetryPolicy};
use vci_engine::process::{IssuanceProcess, IssuanceRequest};
use vci_engine::state::IssuanceProcessState;
use vci_engine::store::{Criterion, IssuanceProcessStore, QuerySpec, SqliteIssuanceProcessStore};
use vci_model::{
    AttestationDefinition, Claims, CredentialDefinition, CredentialFormat, IssuanceError,
};

const LEASE: Duration = Duration::from_secs(60);
const BUSY: Duration = Duration::from_secs(5);

/// Counts writes per process id.
#[derive(Default)]
struct CountingWriter {
    writes: Mutex<HashMap<String, (usize, Claims)>>,
}

impl CredentialWriter for CountingWriter {
    fn write(&self, process: &IssuanceProcess, _: &[CredentialDefinition]) -> Result<(), IssuanceError> {
        let mut writes = self.writes.lock().unwrap();
        let entry = writes
            .entry(process.id().to_string())
            .or_insert_with(|| (0, process.claims().clone()));
        entry.0 += 1;
        Ok(())
    }
}

const CATALOG: &str = r#"{
  "attestations": [
    {
      "id": "membership-db",
      "attestation_type": "static",
      "participant_context_id": "issuer",
      "configuration": {"claims": {"member": {"tier": "gold", "since": 2019}}}
    }
  ],
  "credential_definitions": [
    {
      "id": "membership",
      "credential_type": "MembershipCredential",
      "participant_context_id": "issuer",
      "attestations": ["membership-db"],
      "rules": [
        {"rule_type": "expression", "configuration": {"claim": "member.since", "operator": "lt", "value": 2024}}
      ],
      "mappings": [
        {"input": "member.tier", "output": "credentialSubject.level"},
        {"input": "member.nickname", "output": "credentialSubject.nickname", "required": false}
      ],
      "format": "VC2_0_JOSE"
    }
  ]
}"#;

fn open(dir: &TempDir, clock: Arc<dyn Clock>) -> SqliteIssuanceProcessStore {
    SqliteIssuanceProcessStore::open(dir.path().join("vci.db"), clock, LEASE, BUSY).unwrap()
}

fn catalog_manager(
    dir: &TempDir,
    store: SqliteIssuanceProcessStore,
    owner: &str,
    writer: Arc<CountingWriter>,
) -> IssuanceProcessManager {
    let path = dir.path().join("definitions.json");
    if !path.exists() {
        fs::write(&path, CATALOG).unwrap();
    }
    let (attestations, credentials) = DefinitionCatalog::from_file(&path).unwrap().into_stores().unwrap();

    IssuanceProcessManager::new(
        Arc::new(store),
        AttestationPipeline::new(Arc::new(attestations), Arc::new(default_registry())),
        Arc::new(credentials),
        writer,
        ManagerConfig::new(owner).with_batch_size(4),
    )
}

fn submit(store: &dyn IssuanceProcessStore, id: &str) {
    let request: IssuanceRequest = serde_json::from_value(json!({
        "id": id,
        "participant_context_id": "issuer",
        "holder_id": format!("did:web:{}", id),
        "claims": {"requested_by": "portal"},
        "credential_definitions": ["membership"],
        "credential_formats": {"membership": "VC2_0_JOSE"}
    }))
    .unwrap();
    store.create(request.into_process(Utc::now()).unwrap()).unwrap();
}

#[test]
fn test_catalog_driven_issuance_maps_claims() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, Arc::new(SystemClock));
    submit(&store, "p1");

    let writer = Arc::new(CountingWriter::default());
    let manager = catalog_manager(&dir, store.clone(), "worker-a", Arc::clone(&writer));

    let report = manager.run_once().unwrap();
    assert_eq!(report.leased, 1);
    assert_eq!(report.issued, 1);

    let stored = store.find_by_id("p1").unwrap().unwrap();
    assert_eq!(stored.state(), IssuanceProcessState::Issued);
    assert!(stored.lease().is_none());
    assert_eq!(
        serde_json::Value::Object(stored.claims().clone()),
        json!({"credentialSubject": {"level": "gold"}})
    );

    let writes = writer.writes.lock().unwrap();
    assert_eq!(writes["p1"].0, 1);
    assert_eq!(writes["p1"].1["credentialSubject"]["level"], "gold");
}

#[test]
fn test_failing_rule_terminates_without_retry() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, Arc::new(SystemClock));
    let path = dir.path().join("definitions.json");
    fs::write(&path, CATALOG.replace("\"value\": 2024", "\"value\": 2000")).unwrap();
    submit(&store, "p1");

    let writer = Arc::new(CountingWriter::default());
    let manager = catalog_manager(&dir, store.clone(), "worker-a", Arc::clone(&writer));
    let report = manager.run_once().unwrap();
    assert_eq!(report.terminated, 1);

    let stored = store.find_by_id("p1").unwrap().unwrap();
    assert_eq!(stored.state(), IssuanceProcessState::Terminated);
    assert_eq!(stored.retry_count(), 1);
    assert!(stored.error_detail().unwrap().starts_with("VALIDATION"));
    assert!(writer.writes.lock().unwrap().is_empty());
}

#[test]
fn test_transient_failures_terminate_after_max_retries() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new(Utc::now());
    let store = open(&dir, Arc::new(clock.clone()));

    let attestations = InMemoryAttestationDefinitionStore::new();
    attestations
        .create(AttestationDefinition::new("registry", "flaky", "issuer"))
        .unwrap();
    let credentials = InMemoryCredentialDefinitionStore::new();
    credentials
        .create(
            CredentialDefinition::new("membership", "MembershipCredential", "issuer", CredentialFormat::Vc2Jose)
                .with_attestation("registry"),
        )
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = AttestationSourceRegistry::new();
    {
        let calls = Arc::clone(&calls);
        registry.register_factory(
            "flaky",
            Arc::new(move |_: &AttestationDefinition| {
                let calls = Arc::clone(&calls);
                Ok::<_, IssuanceError>(Box::new(FnSource(move |_: &AttestationContext| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Claims, _>(IssuanceError::transient("registry unavailable"))
                })) as Box<dyn AttestationSource>)
            }),
        );
    }

    let manager = IssuanceProcessManager::new(
        Arc::new(store.clone()),
        AttestationPipeline::new(Arc::new(attestations), Arc::new(registry)),
        Arc::new(credentials),
        Arc::new(CountingWriter::default()),
        ManagerConfig::new("worker-a").with_retry(RetryPolicy::new(
            2,
            Duration::from_secs(1),
            Duration::from_secs(4),
        )),
    )
    .with_clock(Arc::new(clock.clone()));

    submit(&store, "p1");

    let first = manager.run_once().unwrap();
    assert_eq!(first.errored, 1);
    let stored = store.find_by_id("p1").unwrap().unwrap();
    assert_eq!(stored.state(), IssuanceProcessState::Error);
    assert_eq!(stored.retry_count(), 1);

    // Back-off not yet elapsed: the store holds the process back
    assert!(stored.next_attempt_at().is_some());
    let waiting = manager.run_once().unwrap();
    assert_eq!(waiting.leased, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(2));
    let second = manager.run_once().unwrap();
    assert_eq!(second.terminated, 1);

    let stored = store.find_by_id("p1").unwrap().unwrap();
    assert_eq!(stored.state(), IssuanceProcessState::Terminated);
    assert_eq!(stored.retry_count(), 2);
    assert!(stored.error_detail().unwrap().contains("registry unavailable"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Terminal processes are never picked up again
    clock.advance(Duration::from_secs(60));
    assert_eq!(manager.run_once().unwrap().leased, 0);
}

#[test]
fn test_lease_taken_over_mid_cycle_is_abandoned() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new(Utc::now());
    let store = open(&dir, Arc::new(clock.clone()));

    let attestations = InMemoryAttestationDefinitionStore::new();
    attestations
        .create(AttestationDefinition::new("registry", "slow", "issuer"))
        .unwrap();
    let credentials = InMemoryCredentialDefinitionStore::new();
    credentials
        .create(
            CredentialDefinition::new("membership", "MembershipCredential", "issuer", CredentialFormat::Vc2Jose)
                .with_attestation("registry"),
        )
        .unwrap();

    // The first lookup outlives worker-a's lease and worker-b picks the
    // process up in the meantime.
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = AttestationSourceRegistry::new();
    {
        let calls = Arc::clone(&calls);
        let clock = clock.clone();
        let rival = store.clone();
        registry.register_factory(
            "slow",
            Arc::new(move |_: &AttestationDefinition| {
                let calls = Arc::clone(&calls);
                let clock = clock.clone();
                let rival = rival.clone();
                Ok::<_, IssuanceError>(Box::new(FnSource(move |_: &AttestationContext| -> Result<Claims, IssuanceError> {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        clock.advance(LEASE + Duration::from_secs(1));
                        let taken = rival.next_not_leased("worker-b", 10, &[])?;
                        assert_eq!(taken.len(), 1);
                    }
                    Ok(json!({"member": true}).as_object().cloned().unwrap_or_default())
                })) as Box<dyn AttestationSource>)
            }),
        );
    }

    let writer = Arc::new(CountingWriter::default());
    let manager = IssuanceProcessManager::new(
        Arc::new(store.clone()),
        AttestationPipeline::new(Arc::new(attestations), Arc::new(registry)),
        Arc::new(credentials),
        Arc::clone(&writer) as Arc<dyn CredentialWriter>,
        ManagerConfig::new("worker-a"),
    )
    .with_clock(Arc::new(clock.clone()));

    submit(&store, "p1");

    let report = manager.run_once().unwrap();
    assert_eq!(report.leased, 1);
    assert_eq!(report.lease_lost, 1);
    assert_eq!(report.issued, 0);
    assert!(writer.writes.lock().unwrap().is_empty());

    // worker-a's CREATED -> PENDING save landed before the takeover
    let stored = store.find_by_id("p1").unwrap().unwrap();
    assert_eq!(stored.state(), IssuanceProcessState::Pending);
    assert_eq!(stored.lease().map(|l| l.owner.as_str()), Some("worker-b"));

    store.release("p1", "worker-b").unwrap();
    let report = manager.run_once().unwrap();
    assert_eq!(report.issued, 1);
    assert_eq!(writer.writes.lock().unwrap()["p1"].0, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_managers_issue_each_process_once() {
    let dir = TempDir::new().unwrap();
    let seed = open(&dir, Arc::new(SystemClock));
    for i in 0..30 {
        submit(&seed, &format!("p{:02}", i));
    }

    let writer = Arc::new(CountingWriter::default());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = open(&dir, Arc::new(SystemClock));
            let manager = catalog_manager(&dir, store, &format!("worker-{}", t), Arc::clone(&writer));
            let seed = seed.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    let report = manager.run_once().unwrap();
                    if report.leased == 0 {
                        let remaining = seed
                            .query(&QuerySpec::all().with_criterion(Criterion::StateIn(vec![
                                IssuanceProcessState::Created,
                                IssuanceProcessState::Pending,
                                IssuanceProcessState::Approved,
                            ])))
                            .unwrap();
                        if remaining.is_empty() {
                            return;
                        }
                        thread::sleep(Duration::from_millis(5));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let writes = writer.writes.lock().unwrap();
    assert_eq!(writes.len(), 30);
    assert!(writes.values().all(|(count, _)| *count == 1));

    let issued = seed
        .query(&QuerySpec::all().with_criterion(Criterion::State(IssuanceProcessState::Issued)))
        .unwrap();
    assert_eq!(issued.len(), 30);
}

#[test]
fn test_processes_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir, Arc::new(SystemClock));
        submit(&store, "p1");
        let leased = store.next_not_leased("worker-a", 1, &[]).unwrap();
        assert_eq!(leased.len(), 1);
    }

    let reopened = open(&dir, Arc::new(SystemClock));
    let stored = reopened.find_by_id("p1").unwrap().unwrap();
    assert_eq!(stored.state(), IssuanceProcessState::Created);
    assert_eq!(stored.claims()["requested_by"], "portal");
    assert_eq!(stored.lease().map(|l| l.owner.as_str()), Some("worker-a"));

    // The lease outlives the connection that took it
    assert!(reopened.next_not_leased("worker-b", 1, &[]).unwrap().is_empty());
}
