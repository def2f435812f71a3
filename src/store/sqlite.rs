//! SQLite issuance process store.
//!
//! Durable backend shared by any number of manager threads or OS processes.
//! Lease decisions run inside `BEGIN IMMEDIATE` transactions, so SQLite's
//! database write lock serializes competing selectors; every lease-guarded
//! write is a conditional `UPDATE` checked by its affected-row count.
//! Timestamps are stored as Unix milliseconds; claims, definition ids and
//! formats as JSON text.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;
use vci_model::{validate_identifier, Claims, CredentialFormat, IssuanceError};

use super::{
    caller_lease, state_restriction, terminal_rejection, Criterion, IssuanceProcessStore,
    QuerySpec, StoreResult,
};
use crate::clock::{to_chrono, Clock};
use crate::process::{IssuanceProcess, Lease};
use crate::state::{IssuanceProcessState, TerminalState};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS issuance_process (
    id TEXT PRIMARY KEY NOT NULL,
    participant_context_id TEXT NOT NULL,
    holder_id TEXT NOT NULL,
    holder_pid TEXT NOT NULL,
    claims TEXT NOT NULL,
    credential_definitions TEXT NOT NULL,
    credential_formats TEXT NOT NULL,
    state TEXT NOT NULL,
    retry_count INTEGER NOT NULL,
    error_detail TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    state_timestamp INTEGER NOT NULL,
    lease_owner TEXT,
    lease_acquired_at INTEGER,
    lease_expires_at INTEGER,
    next_attempt_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_issuance_process_schedule
    ON issuance_process (state, state_timestamp);
CREATE INDEX IF NOT EXISTS idx_issuance_process_retry
    ON issuance_process (next_attempt_at);
";

const COLUMNS: &str = "id, participant_context_id, holder_id, holder_pid, claims, \
    credential_definitions, credential_formats, state, retry_count, error_detail, \
    created_at, updated_at, state_timestamp, lease_owner, lease_acquired_at, lease_expires_at, \
    next_attempt_at";

/// Raw column values of one `issuance_process` row.
struct ProcessRow {
    id: String,
    participant_context_id: String,
    holder_id: String,
    holder_pid: String,
    claims: String,
    credential_definitions: String,
    credential_formats: String,
    state: String,
    retry_count: i64,
    error_detail: Option<String>,
    created_at: i64,
    updated_at: i64,
    state_timestamp: i64,
    lease_owner: Option<String>,
    lease_acquired_at: Option<i64>,
    lease_expires_at: Option<i64>,
    next_attempt_at: Option<i64>,
}

impl ProcessRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            participant_context_id: row.get(1)?,
            holder_id: row.get(2)?,
            holder_pid: row.get(3)?,
            claims: row.get(4)?,
            credential_definitions: row.get(5)?,
            credential_formats: row.get(6)?,
            state: row.get(7)?,
            retry_count: row.get(8)?,
            error_detail: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            state_timestamp: row.get(12)?,
            lease_owner: row.get(13)?,
            lease_acquired_at: row.get(14)?,
            lease_expires_at: row.get(15)?,
            next_attempt_at: row.get(16)?,
        })
    }

    fn into_process(self) -> StoreResult<IssuanceProcess> {
        let corrupt = |field: &str, detail: String| {
            IssuanceError::storage(format!("process '{}' column {}: {}", self.id, field, detail))
        };

        let claims: Claims =
            serde_json::from_str(&self.claims).map_err(|e| corrupt("claims", e.to_string()))?;
        let credential_definitions: Vec<String> = serde_json::from_str(&self.credential_definitions)
            .map_err(|e| corrupt("credential_definitions", e.to_string()))?;
        let credential_formats: BTreeMap<String, CredentialFormat> =
            serde_json::from_str(&self.credential_formats)
                .map_err(|e| corrupt("credential_formats", e.to_string()))?;
        let state: IssuanceProcessState =
            self.state.parse().map_err(|e: crate::state::ProcessStateError| corrupt("state", e.to_string()))?;
        let retry_count =
            u32::try_from(self.retry_count).map_err(|e| corrupt("retry_count", e.to_string()))?;

        let lease = match (self.lease_owner, self.lease_acquired_at, self.lease_expires_at) {
            (Some(owner), Some(acquired_at), Some(expires_at)) => Some(Lease {
                owner,
                acquired_at: from_millis(acquired_at)?,
                expires_at: from_millis(expires_at)?,
            }),
            _ => None,
        };

        Ok(IssuanceProcess {
            participant_context_id: self.participant_context_id,
            holder_id: self.holder_id,
            holder_pid: self.holder_pid,
            claims,
            credential_definitions,
            credential_formats,
            state,
            retry_count,
            error_detail: self.error_detail,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
            state_timestamp: from_millis(self.state_timestamp)?,
            next_attempt_at: self.next_attempt_at.map(from_millis).transpose()?,
            lease,
            id: self.id,
        })
    }
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| IssuanceError::storage(format!("timestamp out of range: {}", ms)))
}

fn sql_err(e: rusqlite::Error) -> IssuanceError {
    IssuanceError::storage(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| IssuanceError::storage(e.to_string()))
}

/// Durable store over one SQLite connection.
#[derive(Debug, Clone)]
pub struct SqliteIssuanceProcessStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    lease_duration: chrono::Duration,
}

impl SqliteIssuanceProcessStore {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
        lease_duration: Duration,
        busy_timeout: Duration,
    ) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            IssuanceError::storage(format!(
                "failed to open database {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        conn.busy_timeout(busy_timeout).map_err(sql_err)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .map_err(sql_err)?;
        Self::with_connection(conn, clock, lease_duration)
    }

    /// Private in-memory database, for tests.
    pub fn in_memory(clock: Arc<dyn Clock>, lease_duration: Duration) -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::with_connection(conn, clock, lease_duration)
    }

    fn with_connection(
        conn: Connection,
        clock: Arc<dyn Clock>,
        lease_duration: Duration,
    ) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| IssuanceError::storage(format!("failed to create tables: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
            lease_duration: to_chrono(lease_duration),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| IssuanceError::storage(format!("lock poisoned: {}", e)))
    }

    /// Select rows, pushing any state restriction into SQL.
    fn select(
        conn: &Connection,
        states: Option<&[IssuanceProcessState]>,
        extra_where: &str,
        mut params: Vec<SqlValue>,
        order_by: &str,
    ) -> StoreResult<Vec<IssuanceProcess>> {
        let mut clauses = Vec::new();
        if !extra_where.is_empty() {
            clauses.push(extra_where.to_string());
        }
        if let Some(states) = states {
            if states.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = states
                .iter()
                .map(|state| {
                    params.push(SqlValue::Text(state.as_str().to_string()));
                    format!("?{}", params.len())
                })
                .collect();
            clauses.push(format!("state IN ({})", placeholders.join(", ")));
        }

        let mut sql = format!("SELECT {} FROM issuance_process", COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(order_by);

        let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), ProcessRow::from_row)
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;

        rows.into_iter().map(ProcessRow::into_process).collect()
    }

    fn select_one(conn: &Connection, id: &str) -> StoreResult<Option<IssuanceProcess>> {
        conn.query_row(
            &format!("SELECT {} FROM issuance_process WHERE id = ?1", COLUMNS),
            params![id],
            ProcessRow::from_row,
        )
        .optional()
        .map_err(sql_err)?
        .map(ProcessRow::into_process)
        .transpose()
    }

    fn take_lease(
        conn: &Connection,
        id: &str,
        lease: &Lease,
        now_ms: i64,
    ) -> StoreResult<bool> {
        let updated = conn
            .execute(
                "UPDATE issuance_process
                 SET lease_owner = ?1, lease_acquired_at = ?2, lease_expires_at = ?3
                 WHERE id = ?4 AND (lease_owner IS NULL OR lease_expires_at <= ?5)",
                params![
                    lease.owner,
                    lease.acquired_at.timestamp_millis(),
                    lease.expires_at.timestamp_millis(),
                    id,
                    now_ms
                ],
            )
            .map_err(sql_err)?;
        Ok(updated == 1)
    }
}

impl IssuanceProcessStore for SqliteIssuanceProcessStore {
    fn create(&self, process: IssuanceProcess) -> StoreResult<()> {
        validate_identifier(process.id())
            .map_err(|e| IssuanceError::validation(format!("process id '{}': {}", process.id(), e)))?;

        let conn = self.lock()?;
        let inserted = conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO issuance_process ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL, NULL, NULL, ?14)",
                    COLUMNS
                ),
                params![
                    process.id(),
                    process.participant_context_id(),
                    process.holder_id(),
                    process.holder_pid(),
                    to_json(process.claims())?,
                    to_json(&process.credential_definitions())?,
                    to_json(process.credential_formats())?,
                    process.state().as_str(),
                    process.retry_count(),
                    process.error_detail(),
                    process.created_at().timestamp_millis(),
                    process.updated_at().timestamp_millis(),
                    process.state_timestamp().timestamp_millis(),
                    process.next_attempt_at().map(|at| at.timestamp_millis()),
                ],
            )
            .map_err(sql_err)?;

        if inserted == 0 {
            return Err(IssuanceError::already_exists(process.id()));
        }
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> StoreResult<Option<IssuanceProcess>> {
        let conn = self.lock()?;
        Self::select_one(&conn, id)
    }

    fn query(&self, spec: &QuerySpec) -> StoreResult<Vec<IssuanceProcess>> {
        let conn = self.lock()?;
        let states = state_restriction(&spec.filter);
        let rows = Self::select(&conn, states.as_deref(), "", Vec::new(), "")?;
        Ok(spec.apply(rows))
    }

    fn next_not_leased(
        &self,
        owner: &str,
        max: usize,
        filter: &[Criterion],
    ) -> StoreResult<Vec<IssuanceProcess>> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_err)?;
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        let states = state_restriction(filter);
        let candidates = Self::select(
            &tx,
            states.as_deref(),
            "(lease_owner IS NULL OR lease_expires_at <= ?1) \
             AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)",
            vec![SqlValue::Integer(now_ms)],
            " ORDER BY state_timestamp ASC, id ASC",
        )?;

        let mut leased = Vec::new();
        for mut process in candidates {
            if leased.len() >= max {
                break;
            }
            if !filter.iter().all(|c| c.matches(&process)) {
                continue;
            }
            let lease = Lease::new(owner, now, self.lease_duration);
            if Self::take_lease(&tx, process.id(), &lease, now_ms)? {
                process.set_lease(Some(lease));
                leased.push(process);
            }
        }

        tx.commit().map_err(sql_err)?;
        if !leased.is_empty() {
            debug!(owner = %owner, count = leased.len(), "leased issuance processes");
        }
        Ok(leased)
    }

    fn find_by_id_and_lease(&self, id: &str, owner: &str) -> StoreResult<IssuanceProcess> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_err)?;
        let now = self.clock.now();

        let mut process =
            Self::select_one(&tx, id)?.ok_or_else(|| IssuanceError::process_not_found(id))?;
        if let Some(current) = process.lease() {
            if current.owner != owner && !current.is_expired(now) {
                return Err(IssuanceError::lease_conflict(id, &current.owner));
            }
        }

        let lease = Lease::new(owner, now, self.lease_duration);
        tx.execute(
            "UPDATE issuance_process
             SET lease_owner = ?1, lease_acquired_at = ?2, lease_expires_at = ?3
             WHERE id = ?4",
            params![
                lease.owner,
                lease.acquired_at.timestamp_millis(),
                lease.expires_at.timestamp_millis(),
                id
            ],
        )
        .map_err(sql_err)?;
        tx.commit().map_err(sql_err)?;

        process.set_lease(Some(lease));
        Ok(process)
    }

    fn renew_lease(&self, id: &str, owner: &str) -> StoreResult<Lease> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_err)?;
        let now = self.clock.now();
        let expires_at = now + self.lease_duration;

        let updated = tx
            .execute(
                "UPDATE issuance_process SET lease_expires_at = ?1
                 WHERE id = ?2 AND lease_owner = ?3 AND lease_expires_at > ?4",
                params![expires_at.timestamp_millis(), id, owner, now.timestamp_millis()],
            )
            .map_err(sql_err)?;
        if updated == 0 {
            return match Self::select_one(&tx, id)? {
                None => Err(IssuanceError::process_not_found(id)),
                Some(_) => Err(IssuanceError::lease_lost(id, owner)),
            };
        }

        let acquired_at: i64 = tx
            .query_row(
                "SELECT lease_acquired_at FROM issuance_process WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        tx.commit().map_err(sql_err)?;

        Ok(Lease {
            owner: owner.to_string(),
            acquired_at: from_millis(acquired_at)?,
            expires_at,
        })
    }

    fn save(&self, process: &IssuanceProcess) -> StoreResult<()> {
        let owner = &caller_lease(process)?.owner;
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_err)?;
        let now_ms = self.clock.now().timestamp_millis();

        let stored_state: Option<String> = tx
            .query_row(
                "SELECT state FROM issuance_process WHERE id = ?1",
                params![process.id()],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        let stored_state: IssuanceProcessState = match stored_state {
            None => return Err(IssuanceError::process_not_found(process.id())),
            Some(state) => state.parse()?,
        };
        if stored_state.is_terminal() {
            return Err(terminal_rejection(process));
        }

        let updated = tx
            .execute(
                "UPDATE issuance_process
                 SET claims = ?1, credential_definitions = ?2, credential_formats = ?3,
                     state = ?4, retry_count = ?5, error_detail = ?6,
                     updated_at = ?7, state_timestamp = ?8, next_attempt_at = ?9
                 WHERE id = ?10 AND lease_owner = ?11 AND lease_expires_at > ?12",
                params![
                    to_json(process.claims())?,
                    to_json(&process.credential_definitions())?,
                    to_json(process.credential_formats())?,
                    process.state().as_str(),
                    process.retry_count(),
                    process.error_detail(),
                    process.updated_at().timestamp_millis(),
                    process.state_timestamp().timestamp_millis(),
                    process.next_attempt_at().map(|at| at.timestamp_millis()),
                    process.id(),
                    owner,
                    now_ms,
                ],
            )
            .map_err(sql_err)?;
        if updated == 0 {
            return Err(IssuanceError::lease_lost(process.id(), owner));
        }

        tx.commit().map_err(sql_err)
    }

    fn release(&self, id: &str, owner: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE issuance_process
                 SET lease_owner = NULL, lease_acquired_at = NULL, lease_expires_at = NULL
                 WHERE id = ?1 AND lease_owner = ?2",
                params![id, owner],
            )
            .map_err(sql_err)?;
        if updated == 0 {
            return match Self::select_one(&conn, id)? {
                None => Err(IssuanceError::process_not_found(id)),
                Some(_) => Err(IssuanceError::lease_lost(id, owner)),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;
    use vci_model::FailureKind;

    fn store() -> (SqliteIssuanceProcessStore, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let store =
            SqliteIssuanceProcessStore::in_memory(Arc::new(clock.clone()), Duration::from_secs(30))
                .unwrap();
        (store, clock)
    }

    fn process(id: &str, clock: &ManualClock) -> IssuanceProcess {
        IssuanceProcess::new(id, "issuer", "did:web:alice", clock.now())
            .with_holder_pid("pid-1")
            .with_claims(json!({"email": "alice@example.com"}).as_object().cloned().unwrap())
            .with_credential_definition("membership", CredentialFormat::Vc2SdJwt)
    }

    #[test]
    fn test_row_round_trip() {
        let (store, clock) = store();
        let original = process("p1", &clock);
        store.create(original.clone()).unwrap();

        let found = store.find_by_id("p1").unwrap().unwrap();
        assert_eq!(found.claims(), original.claims());
        assert_eq!(found.holder_pid(), "pid-1");
        assert_eq!(found.credential_formats()["membership"], CredentialFormat::Vc2SdJwt);
        assert_eq!(
            found.created_at().timestamp_millis(),
            original.created_at().timestamp_millis()
        );
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let (store, clock) = store();
        store.create(process("p1", &clock)).unwrap();
        let err = store.create(process("p1", &clock)).unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
    }

    #[test]
    fn test_lease_save_release_cycle() {
        let (store, clock) = store();
        store.create(process("p1", &clock)).unwrap();

        let mut leased = store.next_not_leased("worker-a", 5, &[]).unwrap().remove(0);
        assert!(store.next_not_leased("worker-b", 5, &[]).unwrap().is_empty());

        leased.transition_to_pending(clock.now()).unwrap();
        store.save(&leased).unwrap();
        store.release("p1", "worker-a").unwrap();

        let stored = store.find_by_id("p1").unwrap().unwrap();
        assert_eq!(stored.state(), IssuanceProcessState::Pending);
        assert!(stored.lease().is_none());
    }

    #[test]
    fn test_retry_time_persisted_and_gates_leasing() {
        let (store, clock) = store();
        store.create(process("p1", &clock)).unwrap();

        let due = clock.now() + chrono::Duration::seconds(20);
        let mut leased = store.next_not_leased("worker-a", 1, &[]).unwrap().remove(0);
        leased.transition_to_pending(clock.now()).unwrap();
        leased.transition_to_error("TRANSIENT: down", clock.now()).unwrap();
        leased.schedule_retry(due).unwrap();
        store.save(&leased).unwrap();
        store.release("p1", "worker-a").unwrap();

        let stored = store.find_by_id("p1").unwrap().unwrap();
        assert_eq!(
            stored.next_attempt_at().map(|at| at.timestamp_millis()),
            Some(due.timestamp_millis())
        );
        assert!(store.next_not_leased("worker-b", 5, &[]).unwrap().is_empty());

        clock.advance(Duration::from_secs(20));
        let mut retried = store.next_not_leased("worker-b", 5, &[]).unwrap().remove(0);
        retried.transition_to_pending(clock.now()).unwrap();
        store.save(&retried).unwrap();
        assert_eq!(store.find_by_id("p1").unwrap().unwrap().next_attempt_at(), None);
    }

    #[test]
    fn test_state_filter_pushdown() {
        let (store, clock) = store();
        store.create(process("p1", &clock)).unwrap();

        let pending = [Criterion::State(IssuanceProcessState::Pending)];
        assert!(store.next_not_leased("worker-a", 5, &pending).unwrap().is_empty());

        let created = [
            Criterion::StateIn(vec![IssuanceProcessState::Created, IssuanceProcessState::Error]),
            Criterion::HolderId("did:web:alice".into()),
        ];
        assert_eq!(store.next_not_leased("worker-a", 5, &created).unwrap().len(), 1);
    }

    #[test]
    fn test_save_after_expiry_rejected() {
        let (store, clock) = store();
        store.create(process("p1", &clock)).unwrap();

        let mut leased = store.next_not_leased("worker-a", 1, &[]).unwrap().remove(0);
        clock.advance(Duration::from_secs(30));
        leased.transition_to_pending(clock.now()).unwrap();

        assert_eq!(store.save(&leased).unwrap_err().kind, FailureKind::Concurrency);
    }

    #[test]
    fn test_release_by_other_owner_rejected() {
        let (store, clock) = store();
        store.create(process("p1", &clock)).unwrap();
        store.next_not_leased("worker-a", 1, &[]).unwrap();

        assert!(store.release("p1", "worker-b").unwrap_err().is_concurrency());
        assert_eq!(
            store.release("missing", "worker-a").unwrap_err().kind,
            FailureKind::NotFound
        );
    }

    #[test]
    fn test_renew_lease() {
        let (store, clock) = store();
        store.create(process("p1", &clock)).unwrap();
        store.next_not_leased("worker-a", 1, &[]).unwrap();

        clock.advance(Duration::from_secs(20));
        let lease = store.renew_lease("p1", "worker-a").unwrap();
        assert_eq!(lease.expires_at, clock.now() + chrono::Duration::seconds(30));

        clock.advance(Duration::from_secs(30));
        assert!(store.renew_lease("p1", "worker-a").unwrap_err().is_concurrency());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processes.db");
        let clock = ManualClock::new(Utc::now());

        {
            let store = SqliteIssuanceProcessStore::open(
                &path,
                Arc::new(clock.clone()),
                Duration::from_secs(30),
                Duration::from_secs(5),
            )
            .unwrap();
            store.create(process("p1", &clock)).unwrap();
            let mut leased = store.next_not_leased("worker-a", 1, &[]).unwrap().remove(0);
            leased.transition_to_pending(clock.now()).unwrap();
            store.save(&leased).unwrap();
        }

        let reopened = SqliteIssuanceProcessStore::open(
            &path,
            Arc::new(clock.clone()),
            Duration::from_secs(30),
            Duration::from_secs(5),
        )
        .unwrap();
        let stored = reopened.find_by_id("p1").unwrap().unwrap();
        assert_eq!(stored.state(), IssuanceProcessState::Pending);
        assert_eq!(stored.lease().unwrap().owner, "worker-a");
    }
}
