//! Task queue storage - FIFO queue with an in-flight table.
//!
//! Pending entries use the composite key "{seq:020}:{task_id}" so that the
//! first key is always the oldest entry. In-flight entries are keyed by task id
//! and prefixed with the claim time and a claim id (8 bytes each, big endian).
//! The claim id changes every time an entry is claimed, so a worker whose
//! lease expired cannot complete or release a claim it no longer owns.
//!
//! The database file is opened for the duration of a single operation. redb
//! holds an exclusive file lock while a `Database` is alive, so short-lived
//! handles are what allow a listener process and several worker processes to
//! share one queue file.

use anyhow::{Context, Result, anyhow};
use redb::{
    Database, DatabaseError, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition, WriteTransaction,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const PENDING: TableDefinition<&str, &[u8]> = TableDefinition::new("pending");
const IN_FLIGHT: TableDefinition<&str, &[u8]> = TableDefinition::new("in_flight");
const QUEUE_META: TableDefinition<&str, u64> = TableDefinition::new("queue_meta");

const NEXT_SEQ_KEY: &str = "next_seq";
const NEXT_CLAIM_KEY: &str = "next_claim";
const CLAIM_HEADER_LEN: usize = 16;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);

/// An entry moved out of `pending` by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedEntry {
    pub task_id: String,
    pub data: Vec<u8>,
    /// Claim id for entries held in flight, `None` when popped outright
    pub claim: Option<u64>,
}

/// Pure storage layer for the offload queue - only handles data persistence
#[derive(Debug, Clone)]
pub struct TaskQueueStore {
    path: PathBuf,
    lock_wait: Duration,
}

impl TaskQueueStore {
    /// Open (or create) a queue file and make sure all tables exist.
    ///
    /// `lock_wait` bounds how long an operation waits for another process to
    /// release the database file.
    pub fn open(path: impl AsRef<Path>, lock_wait: Duration) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            lock_wait,
        };

        if let Some(parent) = store.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create queue directory {:?}", parent))?;
        }

        let db = store.database()?;
        let write_txn = db.begin_write()?;
        write_txn.open_table(PENDING)?;
        write_txn.open_table(IN_FLIGHT)?;
        write_txn.open_table(QUEUE_META)?;
        write_txn.commit()?;

        Ok(store)
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn database(&self) -> Result<Database> {
        let deadline = Instant::now() + self.lock_wait;
        loop {
            match Database::create(&self.path) {
                Ok(db) => return Ok(db),
                Err(DatabaseError::DatabaseAlreadyOpen) if Instant::now() < deadline => {
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to open queue database {:?}", self.path));
                }
            }
        }
    }

    /// Append an entry to the tail of the pending queue. Returns its sequence number.
    pub fn push(&self, task_id: &str, data: &[u8]) -> Result<u64> {
        if task_id.contains(':') {
            return Err(anyhow!("Task id must not contain ':': {}", task_id));
        }

        let db = self.database()?;
        let write_txn = db.begin_write()?;
        let seq = insert_pending(&write_txn, task_id, data)?;
        write_txn.commit()?;

        debug!(task_id, seq, "Queued entry");
        Ok(seq)
    }

    /// Remove and return the oldest pending entry.
    pub fn pop_front(&self) -> Result<Option<ClaimedEntry>> {
        let db = self.database()?;
        let write_txn = db.begin_write()?;

        let entry = {
            let mut pending = write_txn.open_table(PENDING)?;
            let first = match pending.first()? {
                Some((key, value)) => Some((key.value().to_string(), value.value().to_vec())),
                None => None,
            };
            if let Some((key, _)) = &first {
                pending.remove(key.as_str())?;
            }
            first
        };

        let Some((key, data)) = entry else {
            write_txn.abort()?;
            return Ok(None);
        };

        write_txn.commit()?;
        Ok(Some(ClaimedEntry {
            task_id: task_id_from_key(&key)?,
            data,
            claim: None,
        }))
    }

    /// Atomically move the oldest pending entry into `in_flight`, stamped with `now_ms`.
    pub fn claim_front(&self, now_ms: i64) -> Result<Option<ClaimedEntry>> {
        let db = self.database()?;
        let write_txn = db.begin_write()?;

        let entry = {
            let mut pending = write_txn.open_table(PENDING)?;
            let first = match pending.first()? {
                Some((key, value)) => Some((key.value().to_string(), value.value().to_vec())),
                None => None,
            };
            if let Some((key, _)) = &first {
                pending.remove(key.as_str())?;
            }
            first
        };

        let Some((key, data)) = entry else {
            write_txn.abort()?;
            return Ok(None);
        };

        let task_id = task_id_from_key(&key)?;
        let claim = next_counter(&write_txn, NEXT_CLAIM_KEY)?;
        {
            let mut in_flight = write_txn.open_table(IN_FLIGHT)?;
            let record = encode_claim(now_ms, claim, &data);
            in_flight.insert(task_id.as_str(), record.as_slice())?;
        }
        write_txn.commit()?;

        Ok(Some(ClaimedEntry {
            task_id,
            data,
            claim: Some(claim),
        }))
    }

    /// Delete an in-flight entry if `claim` still owns it.
    ///
    /// Returns false when the entry is gone or was reclaimed and claimed again.
    pub fn complete(&self, task_id: &str, claim: u64) -> Result<bool> {
        let db = self.database()?;
        let write_txn = db.begin_write()?;
        if !remove_owned(&write_txn, task_id, claim)? {
            write_txn.abort()?;
            debug!(task_id, claim, "Stale claim, nothing completed");
            return Ok(false);
        }
        write_txn.commit()?;
        Ok(true)
    }

    /// Move an in-flight entry owned by `claim` back to the tail of `pending`
    /// with new data, in one transaction.
    ///
    /// Returns the new sequence number, or `None` when the claim is stale; the
    /// entry then belongs to whoever holds it now and is left untouched.
    pub fn release(&self, task_id: &str, claim: u64, data: &[u8]) -> Result<Option<u64>> {
        let db = self.database()?;
        let write_txn = db.begin_write()?;
        if !remove_owned(&write_txn, task_id, claim)? {
            write_txn.abort()?;
            warn!(task_id, claim, "Stale claim, entry not released");
            return Ok(None);
        }
        let seq = insert_pending(&write_txn, task_id, data)?;
        write_txn.commit()?;
        Ok(Some(seq))
    }

    /// Return in-flight entries claimed at or before `now_ms - lease_ms` to `pending`.
    pub fn reclaim_expired(&self, now_ms: i64, lease_ms: i64) -> Result<usize> {
        let cutoff = now_ms.saturating_sub(lease_ms);
        let db = self.database()?;
        let write_txn = db.begin_write()?;

        let expired = {
            let in_flight = write_txn.open_table(IN_FLIGHT)?;
            let mut expired = Vec::new();
            for entry in in_flight.iter()? {
                let (key, value) = entry?;
                let (claimed_at, _claim, data) = decode_claim(value.value())?;
                if claimed_at <= cutoff {
                    expired.push((key.value().to_string(), data.to_vec()));
                }
            }
            expired
        };

        if expired.is_empty() {
            write_txn.abort()?;
            return Ok(0);
        }

        {
            let mut in_flight = write_txn.open_table(IN_FLIGHT)?;
            for (task_id, _) in &expired {
                in_flight.remove(task_id.as_str())?;
            }
        }
        for (task_id, data) in &expired {
            insert_pending(&write_txn, task_id, data)?;
        }
        write_txn.commit()?;

        Ok(expired.len())
    }

    /// Number of entries waiting in `pending`
    pub fn pending_len(&self) -> Result<usize> {
        let db = self.database()?;
        let read_txn = db.begin_read()?;
        let pending = read_txn.open_table(PENDING)?;
        Ok(pending.len()? as usize)
    }

    /// Number of entries currently claimed
    pub fn in_flight_len(&self) -> Result<usize> {
        let db = self.database()?;
        let read_txn = db.begin_read()?;
        let in_flight = read_txn.open_table(IN_FLIGHT)?;
        Ok(in_flight.len()? as usize)
    }
}

fn next_counter(write_txn: &WriteTransaction, key: &str) -> Result<u64> {
    let mut meta = write_txn.open_table(QUEUE_META)?;
    let value = meta.get(key)?.map(|v| v.value()).unwrap_or(0);
    meta.insert(key, value + 1)?;
    Ok(value)
}

/// Remove `task_id` from `in_flight` only when its record carries `claim`
fn remove_owned(write_txn: &WriteTransaction, task_id: &str, claim: u64) -> Result<bool> {
    let mut in_flight = write_txn.open_table(IN_FLIGHT)?;
    let owned = match in_flight.get(task_id)? {
        Some(record) => decode_claim(record.value())?.1 == claim,
        None => false,
    };
    if owned {
        in_flight.remove(task_id)?;
    }
    Ok(owned)
}

fn insert_pending(write_txn: &WriteTransaction, task_id: &str, data: &[u8]) -> Result<u64> {
    let seq = next_counter(write_txn, NEXT_SEQ_KEY)?;

    let mut pending = write_txn.open_table(PENDING)?;
    // Composite key: "{seq:020}:{task_id}" keeps FIFO order under lexicographic sort
    let key = format!("{:020}:{}", seq, task_id);
    pending.insert(key.as_str(), data)?;
    Ok(seq)
}

fn task_id_from_key(key: &str) -> Result<String> {
    key.split_once(':')
        .map(|(_, id)| id.to_string())
        .ok_or_else(|| anyhow!("Invalid composite key format: {}", key))
}

fn encode_claim(claimed_at_ms: i64, claim: u64, data: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(CLAIM_HEADER_LEN + data.len());
    record.extend_from_slice(&claimed_at_ms.to_be_bytes());
    record.extend_from_slice(&claim.to_be_bytes());
    record.extend_from_slice(data);
    record
}

fn decode_claim(record: &[u8]) -> Result<(i64, u64, &[u8])> {
    if record.len() < CLAIM_HEADER_LEN {
        return Err(anyhow!("In-flight record too short: {} bytes", record.len()));
    }
    let (stamp, rest) = record.split_at(8);
    let (claim, data) = rest.split_at(8);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(stamp);
    let claimed_at = i64::from_be_bytes(buf);
    buf.copy_from_slice(claim);
    Ok((claimed_at, u64::from_be_bytes(buf), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup_test_store() -> (TaskQueueStore, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("queue.redb");
        let store = TaskQueueStore::open(db_path, Duration::from_millis(200)).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_push_and_pop_fifo() {
        let (store, _temp_dir) = setup_test_store();

        store.push("task-b", b"first").unwrap();
        store.push("task-a", b"second").unwrap();
        store.push("task-c", b"third").unwrap();

        let first = store.pop_front().unwrap().unwrap();
        assert_eq!(first.task_id, "task-b");
        assert_eq!(first.data, b"first");

        let second = store.pop_front().unwrap().unwrap();
        assert_eq!(second.task_id, "task-a");

        let third = store.pop_front().unwrap().unwrap();
        assert_eq!(third.task_id, "task-c");

        assert!(store.pop_front().unwrap().is_none());
    }

    #[test]
    fn test_sequence_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("queue.redb");

        let store = TaskQueueStore::open(&db_path, Duration::from_millis(200)).unwrap();
        assert_eq!(store.push("task-1", b"one").unwrap(), 0);

        let reopened = TaskQueueStore::open(&db_path, Duration::from_millis(200)).unwrap();
        assert_eq!(reopened.push("task-2", b"two").unwrap(), 1);
        assert_eq!(reopened.pending_len().unwrap(), 2);
    }

    #[test]
    fn test_reject_task_id_with_separator() {
        let (store, _temp_dir) = setup_test_store();
        assert!(store.push("bad:id", b"data").is_err());
    }

    #[test]
    fn test_claim_and_complete() {
        let (store, _temp_dir) = setup_test_store();
        store.push("task-1", b"payload").unwrap();

        let claimed = store.claim_front(1_000).unwrap().unwrap();
        assert_eq!(claimed.task_id, "task-1");
        assert_eq!(claimed.data, b"payload");
        assert_eq!(store.pending_len().unwrap(), 0);
        assert_eq!(store.in_flight_len().unwrap(), 1);

        let claim = claimed.claim.unwrap();
        assert!(store.complete("task-1", claim).unwrap());
        assert!(!store.complete("task-1", claim).unwrap());
        assert_eq!(store.in_flight_len().unwrap(), 0);
    }

    #[test]
    fn test_release_moves_to_tail() {
        let (store, _temp_dir) = setup_test_store();
        store.push("task-1", b"v1").unwrap();
        store.push("task-2", b"other").unwrap();

        let claimed = store.claim_front(1_000).unwrap().unwrap();
        assert!(
            store
                .release(&claimed.task_id, claimed.claim.unwrap(), b"v2")
                .unwrap()
                .is_some()
        );
        assert_eq!(store.in_flight_len().unwrap(), 0);

        let next = store.pop_front().unwrap().unwrap();
        assert_eq!(next.task_id, "task-2");
        let retried = store.pop_front().unwrap().unwrap();
        assert_eq!(retried.task_id, "task-1");
        assert_eq!(retried.data, b"v2");
    }

    #[test]
    fn test_reclaim_expired_only() {
        let (store, _temp_dir) = setup_test_store();
        store.push("old", b"old").unwrap();
        store.push("fresh", b"fresh").unwrap();

        store.claim_front(1_000).unwrap().unwrap();
        store.claim_front(9_000).unwrap().unwrap();

        let reclaimed = store.reclaim_expired(10_000, 5_000).unwrap();
        assert_eq!(reclaimed, 1);
        assert_eq!(store.in_flight_len().unwrap(), 1);

        let redelivered = store.pop_front().unwrap().unwrap();
        assert_eq!(redelivered.task_id, "old");
        assert_eq!(redelivered.data, b"old");
    }

    #[test]
    fn test_stale_claim_cannot_touch_new_owner() {
        let (store, _temp_dir) = setup_test_store();
        store.push("task-1", b"payload").unwrap();

        let first = store.claim_front(1_000).unwrap().unwrap();
        assert_eq!(store.reclaim_expired(1_000, 0).unwrap(), 1);
        let second = store.claim_front(1_000).unwrap().unwrap();
        assert_ne!(first.claim, second.claim);

        assert!(!store.complete("task-1", first.claim.unwrap()).unwrap());
        assert!(
            store
                .release("task-1", first.claim.unwrap(), b"stale")
                .unwrap()
                .is_none()
        );
        assert_eq!(store.in_flight_len().unwrap(), 1);
        assert_eq!(store.pending_len().unwrap(), 0);

        assert!(store.complete("task-1", second.claim.unwrap()).unwrap());
        assert_eq!(store.in_flight_len().unwrap(), 0);
    }

    #[test]
    fn test_pop_front_has_no_claim() {
        let (store, _temp_dir) = setup_test_store();
        store.push("task-1", b"payload").unwrap();
        assert!(store.pop_front().unwrap().unwrap().claim.is_none());
    }

    #[test]
    fn test_empty_queue() {
        let (store, _temp_dir) = setup_test_store();
        assert!(store.pop_front().unwrap().is_none());
        assert!(store.claim_front(0).unwrap().is_none());
        assert_eq!(store.reclaim_expired(0, 0).unwrap(), 0);
    }

    #[test]
    fn test_claim_record_roundtrip() {
        let record = encode_claim(42, 7, b"abc");
        let (stamp, claim, data) = decode_claim(&record).unwrap();
        assert_eq!(stamp, 42);
        assert_eq!(claim, 7);
        assert_eq!(data, b"abc");
        assert!(decode_claim(b"short").is_err());
    }
}
