//! Redb-backed persistent session store.
//!
//! # Schema
//!
//! ```text
//! sessions: key (&str, prefix + token) -> 8-byte big-endian unix
//!           expiry seconds followed by the codec blob
//! ```
//!
//! Redb transactions are synchronous and short; calls block the
//! handling task for the duration of one file transaction. Expiry is
//! tracked inside the record and enforced on read.

use super::store::{CtxStore, IterableCtxStore, IterableStore, Store};
use super::SessionError;
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

/// Redb table for session records.
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

fn store_err(e: impl std::fmt::Display) -> SessionError {
    SessionError::Store(e.to_string())
}

fn unix_seconds(expiry: SystemTime) -> u64 {
    expiry
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

fn encode_record(data: &[u8], expiry: SystemTime) -> Vec<u8> {
    let mut record = Vec::with_capacity(8 + data.len());
    record.extend_from_slice(&unix_seconds(expiry).to_be_bytes());
    record.extend_from_slice(data);
    record
}

/// Split a stored record into its expiry and blob, or `None` for a
/// record too short to carry the expiry header.
fn decode_record(record: &[u8]) -> Option<(u64, &[u8])> {
    let header: [u8; 8] = record.get(..8)?.try_into().ok()?;
    Some((u64::from_be_bytes(header), &record[8..]))
}

fn live(expiry_secs: u64) -> bool {
    expiry_secs > unix_seconds(SystemTime::now())
}

/// File-backed session store.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the session database at `path`, creating the
    /// table so that later reads never race table creation.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let db = Database::create(path).map_err(store_err)?;
        let write_txn = db.begin_write().map_err(store_err)?;
        {
            let _ = write_txn.open_table(SESSIONS).map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)?;
        Ok(RedbStore { db })
    }

    fn cancelled(cancel: &CancellationToken) -> Result<(), SessionError> {
        if cancel.is_cancelled() {
            Err(SessionError::Store("operation cancelled".to_string()))
        } else {
            Ok(())
        }
    }

    fn read_record(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(SESSIONS).map_err(store_err)?;
        let Some(guard) = table.get(key).map_err(store_err)? else {
            return Ok(None);
        };
        match decode_record(guard.value()) {
            Some((expiry, blob)) if live(expiry) => Ok(Some(blob.to_vec())),
            _ => Ok(None),
        }
    }

    fn write_record(
        &self,
        key: &str,
        data: &[u8],
        expiry: SystemTime,
        modified: bool,
    ) -> Result<(), SessionError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = write_txn.open_table(SESSIONS).map_err(store_err)?;
            // An unmodified commit only refreshes the expiry of a live
            // record, keeping its stored blob.
            let carry_over = if !modified {
                match table.get(key).map_err(store_err)? {
                    Some(guard) => decode_record(guard.value())
                        .filter(|(old_expiry, _)| live(*old_expiry))
                        .map(|(_, blob)| blob.to_vec()),
                    None => None,
                }
            } else {
                None
            };
            let blob = carry_over.as_deref().unwrap_or(data);
            table
                .insert(key, encode_record(blob, expiry).as_slice())
                .map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)
    }

    fn remove_record(&self, key: &str) -> Result<(), SessionError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = write_txn.open_table(SESSIONS).map_err(store_err)?;
            table.remove(key).map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)
    }

    fn read_all(&self) -> Result<HashMap<String, Vec<u8>>, SessionError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(SESSIONS).map_err(store_err)?;
        let mut all = HashMap::new();
        for entry in table.iter().map_err(store_err)? {
            let (key, value) = entry.map_err(store_err)?;
            if let Some((expiry, blob)) = decode_record(value.value())
                && live(expiry)
            {
                all.insert(key.value().to_string(), blob.to_vec());
            }
        }
        Ok(all)
    }
}

#[async_trait]
impl Store for RedbStore {
    async fn find(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        self.read_record(key)
    }

    async fn commit(
        &self,
        key: &str,
        data: &[u8],
        expiry: SystemTime,
        modified: bool,
    ) -> Result<(), SessionError> {
        self.write_record(key, data, expiry, modified)
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.remove_record(key)
    }

    fn as_ctx(&self) -> Option<&dyn CtxStore> {
        Some(self)
    }

    fn as_iterable(&self) -> Option<&dyn IterableStore> {
        Some(self)
    }

    fn as_iterable_ctx(&self) -> Option<&dyn IterableCtxStore> {
        Some(self)
    }
}

#[async_trait]
impl CtxStore for RedbStore {
    async fn find_ctx(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Option<Vec<u8>>, SessionError> {
        Self::cancelled(cancel)?;
        self.read_record(key)
    }

    async fn commit_ctx(
        &self,
        cancel: &CancellationToken,
        key: &str,
        data: &[u8],
        expiry: SystemTime,
        modified: bool,
    ) -> Result<(), SessionError> {
        Self::cancelled(cancel)?;
        self.write_record(key, data, expiry, modified)
    }

    async fn delete_ctx(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<(), SessionError> {
        Self::cancelled(cancel)?;
        self.remove_record(key)
    }
}

#[async_trait]
impl IterableStore for RedbStore {
    async fn all(&self) -> Result<HashMap<String, Vec<u8>>, SessionError> {
        self.read_all()
    }
}

#[async_trait]
impl IterableCtxStore for RedbStore {
    async fn all_ctx(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Vec<u8>>, SessionError> {
        Self::cancelled(cancel)?;
        self.read_all()
    }
}
