//! Session store capability tiers and the in-memory store.
//!
//! The base [`Store`] contract is find/commit/delete. Richer
//! capabilities are separate named traits probed at call time through
//! the `as_*` hooks: [`CtxStore`] for cancellation-aware variants and
//! [`IterableStore`]/[`IterableCtxStore`] for bulk enumeration. The
//! manager prefers the richest capability available and falls back to
//! the base contract.

use super::SessionError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

/// Base session persistence contract, keyed by `prefix + token`.
#[async_trait]
pub trait Store: Send + Sync {
    /// The record for `key`, or `None` when absent or expired.
    async fn find(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError>;

    /// Write the record for `key` with an absolute expiry. When
    /// `modified` is false the session content is unchanged and a
    /// store may refresh the expiry of an existing record instead of
    /// rewriting it.
    async fn commit(
        &self,
        key: &str,
        data: &[u8],
        expiry: SystemTime,
        modified: bool,
    ) -> Result<(), SessionError>;

    /// Delete the record for `key`. Deleting an absent record is not
    /// an error.
    async fn delete(&self, key: &str) -> Result<(), SessionError>;

    /// The cancellation-aware capability, when supported.
    fn as_ctx(&self) -> Option<&dyn CtxStore> {
        None
    }

    /// The enumeration capability, when supported.
    fn as_iterable(&self) -> Option<&dyn IterableStore> {
        None
    }

    /// The cancellation-aware enumeration capability, when supported.
    fn as_iterable_ctx(&self) -> Option<&dyn IterableCtxStore> {
        None
    }
}

/// Cancellation-aware store variants. The cancellation handle is
/// supplied per call; the session core propagates it without imposing
/// a deadline of its own.
#[async_trait]
pub trait CtxStore: Store {
    async fn find_ctx(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Option<Vec<u8>>, SessionError>;

    async fn commit_ctx(
        &self,
        cancel: &CancellationToken,
        key: &str,
        data: &[u8],
        expiry: SystemTime,
        modified: bool,
    ) -> Result<(), SessionError>;

    async fn delete_ctx(&self, cancel: &CancellationToken, key: &str)
    -> Result<(), SessionError>;
}

/// Bulk enumeration of live (unexpired) records.
#[async_trait]
pub trait IterableStore: Store {
    async fn all(&self) -> Result<HashMap<String, Vec<u8>>, SessionError>;
}

/// Cancellation-aware bulk enumeration.
#[async_trait]
pub trait IterableCtxStore: CtxStore {
    async fn all_ctx(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Vec<u8>>, SessionError>;
}

struct Record {
    data: Vec<u8>,
    expiry: SystemTime,
}

impl Record {
    fn expired(&self) -> bool {
        self.expiry <= SystemTime::now()
    }
}

/// In-process session store. Expired records are invisible to reads
/// and pruned opportunistically during enumeration.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cancelled(cancel: &CancellationToken) -> Result<(), SessionError> {
        if cancel.is_cancelled() {
            Err(SessionError::Store("operation cancelled".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let expired = match self.records.get(key) {
            None => return Ok(None),
            Some(record) if record.expired() => true,
            Some(record) => return Ok(Some(record.data.clone())),
        };
        if expired {
            self.records.remove(key);
        }
        Ok(None)
    }

    async fn commit(
        &self,
        key: &str,
        data: &[u8],
        expiry: SystemTime,
        modified: bool,
    ) -> Result<(), SessionError> {
        if !modified {
            if let Some(mut record) = self.records.get_mut(key)
                && !record.expired()
            {
                record.expiry = expiry;
                return Ok(());
            }
        }
        self.records.insert(
            key.to_string(),
            Record {
                data: data.to_vec(),
                expiry,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.records.remove(key);
        Ok(())
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
impl CtxStore for MemoryStore {
    async fn find_ctx(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Option<Vec<u8>>, SessionError> {
        Self::cancelled(cancel)?;
        self.find(key).await
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
        self.commit(key, data, expiry, modified).await
    }

    async fn delete_ctx(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<(), SessionError> {
        Self::cancelled(cancel)?;
        self.delete(key).await
    }
}

#[async_trait]
impl IterableStore for MemoryStore {
    async fn all(&self) -> Result<HashMap<String, Vec<u8>>, SessionError> {
        let mut live = HashMap::new();
        let mut dead = Vec::new();
        for entry in self.records.iter() {
            if entry.expired() {
                dead.push(entry.key().clone());
            } else {
                live.insert(entry.key().clone(), entry.data.clone());
            }
        }
        for key in dead {
            self.records.remove(&key);
        }
        Ok(live)
    }
}

#[async_trait]
impl IterableCtxStore for MemoryStore {
    async fn all_ctx(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Vec<u8>>, SessionError> {
        Self::cancelled(cancel)?;
        self.all().await
    }
}
