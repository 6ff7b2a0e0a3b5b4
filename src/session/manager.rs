//! Session lifecycle orchestration.
//!
//! The manager owns the session configuration, store, codec and
//! checksum strategy, plus a pool of reusable [`SessionData`] objects.
//! It is stateless per request: all per-request state lives in the
//! pooled data object parked in the request context's bag.

use super::codec::{Codec, JsonCodec};
use super::data::{SessionData, SessionValue, Status};
use super::store::Store;
use super::token::{CSRF_TOKEN_LEN, Checksum, SimpleChecksum, generate_token, validate_token};
use super::{REMEMBER_KEY, SESSION_KEY, SessionError};
use crate::config::{CookieConfig, SessionConfig};
use crate::context::Ctx;
use crate::error::Error;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// Shared handle to the active request's session data.
pub type SharedData = Arc<Mutex<SessionData>>;

/// Pool of reusable session data objects.
struct DataPool {
    inner: Mutex<Vec<SharedData>>,
}

/// Holds the session configuration and orchestrates data lifecycle
/// against the store and codec.
pub struct Manager {
    lifetime: Duration,
    cookie: CookieConfig,
    id_len: usize,
    key_prefix: String,
    checksum: Arc<dyn Checksum>,
    store: Arc<dyn Store>,
    codec: Arc<dyn Codec>,
    pool: DataPool,
}

impl Manager {
    /// Create a manager over `store` with the given configuration, the
    /// JSON codec and the default checksum strategy.
    pub fn new(config: SessionConfig, store: Arc<dyn Store>) -> Self {
        Manager {
            lifetime: config.lifetime(),
            id_len: config.id_len,
            key_prefix: config.key_prefix,
            cookie: config.cookie,
            checksum: Arc::new(SimpleChecksum),
            store,
            codec: Arc::new(JsonCodec),
            pool: DataPool {
                inner: Mutex::new(Vec::new()),
            },
        }
    }

    /// Replace the codec.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the token checksum strategy.
    pub fn with_checksum(mut self, checksum: Arc<dyn Checksum>) -> Self {
        self.checksum = checksum;
        self
    }

    /// The configured session cookie settings.
    pub fn cookie_config(&self) -> &CookieConfig {
        &self.cookie
    }

    /// The configured session lifetime.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    // ------------------------------------------------------------------
    // Pool
    // ------------------------------------------------------------------

    pub(crate) fn acquire_data(&self) -> SharedData {
        self.pool
            .inner
            .lock()
            .pop()
            .unwrap_or_else(|| Arc::new(Mutex::new(SessionData::new(&self.key_prefix))))
    }

    pub(crate) fn release_data(&self, data: SharedData) {
        data.lock().reset();
        self.pool.inner.lock().push(data);
    }

    /// The active request's session data.
    ///
    /// Panics when the session middleware did not run for this
    /// request; that is a wiring bug upstream, not a runtime
    /// condition.
    pub fn data_from_ctx(&self, ctx: &Ctx) -> SharedData {
        match ctx.get::<Mutex<SessionData>>(SESSION_KEY) {
            Some(data) => data,
            None => panic!("no session data in request context (is the session middleware installed?)"),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Adopt a presented token when it passes checksum validation,
    /// otherwise generate a fresh one. Returns whether the token is
    /// new (no store load needed).
    pub fn prepare(&self, data: &SharedData, presented: Option<&str>) -> Result<bool, SessionError> {
        if let Some(token) = presented
            && !token.is_empty()
            && validate_token(token, &*self.checksum)
        {
            data.lock().set_token_value(token);
            return Ok(false);
        }
        let token = generate_token(self.id_len, &*self.checksum)?;
        data.lock().set_token_value(&token);
        Ok(true)
    }

    /// Start the session: load existing state for a presented token,
    /// and ensure a CSRF token exists.
    pub async fn start(
        &self,
        cancel: Option<&CancellationToken>,
        data: &SharedData,
        new_token: bool,
    ) -> Result<(), SessionError> {
        if !new_token {
            self.load_session(cancel, data).await?;
        }
        let needs_csrf = data.lock().csrf_token().is_empty();
        if needs_csrf {
            let csrf = generate_token(CSRF_TOKEN_LEN, &*self.checksum)?;
            data.lock().set_csrf_token(csrf);
        }
        data.lock().set_started();
        Ok(())
    }

    /// Load the session record for the data's token. A store miss is
    /// "no session". A decode failure is also "no session" and deletes
    /// the corrupt record so the next load does not fail again.
    async fn load_session(
        &self,
        cancel: Option<&CancellationToken>,
        data: &SharedData,
    ) -> Result<(), SessionError> {
        let key = data.lock().key().to_string();
        let Some(blob) = self.store_find(cancel, &key).await? else {
            return Ok(());
        };
        match self.codec.decode(&blob) {
            Ok((csrf, values)) => {
                data.lock().load(csrf, values);
            }
            Err(e) => {
                tracing::warn!(error = %e, "corrupt session record, starting fresh");
                if let Err(e) = self.store_delete(cancel, &key).await {
                    tracing::warn!(error = %e, "failed to delete corrupt session record");
                }
            }
        }
        Ok(())
    }

    /// Encode the session and write it to the store with expiry
    /// `now + lifetime`. Skipped for destroyed sessions. An encode
    /// failure is a hard [`SessionError::Encoding`]; a store failure a
    /// hard [`SessionError::Store`].
    pub async fn commit(
        &self,
        cancel: Option<&CancellationToken>,
        data: &SharedData,
    ) -> Result<(), SessionError> {
        let (key, blob, modified) = {
            let d = data.lock();
            if d.status() == Status::Destroyed {
                return Ok(());
            }
            let blob = self.codec.encode(d.csrf_token(), d.values())?;
            (d.key().to_string(), blob, d.status() == Status::Modified)
        };
        let expiry = SystemTime::now() + self.lifetime;
        self.store_commit(cancel, &key, &blob, expiry, modified).await
    }

    /// Delete the store record and park the data at `Destroyed`. Any
    /// further reads in the same request cycle see empty state.
    pub async fn destroy_data(
        &self,
        cancel: Option<&CancellationToken>,
        data: &SharedData,
    ) -> Result<(), SessionError> {
        let key = data.lock().key().to_string();
        self.store_delete(cancel, &key).await?;
        data.lock().destroy();
        Ok(())
    }

    /// Replace the session token, optionally deleting the old record
    /// first. Always marks the session modified.
    pub async fn migrate(
        &self,
        cancel: Option<&CancellationToken>,
        data: &SharedData,
        destroy: bool,
    ) -> Result<(), SessionError> {
        if destroy {
            let old_key = {
                let d = data.lock();
                (!d.token().is_empty()).then(|| d.key().to_string())
            };
            if let Some(key) = old_key
                && let Err(e) = self.store_delete(cancel, &key).await
            {
                tracing::error!(error = %e, "failed to delete old record during migrate");
            }
        }
        let token = generate_token(self.id_len, &*self.checksum)?;
        let mut d = data.lock();
        d.set_token_value(&token);
        d.mark_modified();
        Ok(())
    }

    /// [`Manager::migrate`] plus a fresh CSRF token. Call before
    /// privilege changes to mitigate session fixation.
    pub async fn regenerate(
        &self,
        cancel: Option<&CancellationToken>,
        data: &SharedData,
        destroy: bool,
    ) -> Result<(), SessionError> {
        self.migrate(cancel, data, destroy).await?;
        let csrf = generate_token(CSRF_TOKEN_LEN, &*self.checksum)?;
        data.lock().set_csrf_token(csrf);
        Ok(())
    }

    /// Clear all values and migrate to a fresh token, deleting the old
    /// record.
    pub async fn invalidate_data(
        &self,
        cancel: Option<&CancellationToken>,
        data: &SharedData,
    ) -> Result<(), SessionError> {
        data.lock().clear();
        self.migrate(cancel, data, true).await
    }

    /// Merge another session's values into this one, giving precedence
    /// to existing keys, then delete the other record. A no-op when
    /// the tokens are equal or the other session cannot be found.
    pub async fn merge_data(
        &self,
        cancel: Option<&CancellationToken>,
        data: &SharedData,
        other_token: &str,
    ) -> Result<(), SessionError> {
        if data.lock().token() == other_token {
            return Ok(());
        }
        let other_key = format!("{}{}", self.key_prefix, other_token);
        // A failed or missing lookup leaves the current session as-is.
        let Ok(Some(blob)) = self.store_find(cancel, &other_key).await else {
            return Ok(());
        };
        let (_, values) = self.codec.decode(&blob)?;
        data.lock().merge(values);
        self.store_delete(cancel, &other_key).await
    }

    /// Run `f` over every live session in the store, decoding each
    /// record into a pooled data object on loan. Stops at the first
    /// error from decoding or from `f`.
    ///
    /// Panics when the store does not support enumeration; choosing an
    /// iterable store is the caller's responsibility.
    pub async fn iterate<F>(
        &self,
        cancel: Option<&CancellationToken>,
        mut f: F,
    ) -> Result<(), Error>
    where
        F: FnMut(&SessionData) -> Result<(), Error>,
    {
        let all = self.store_all(cancel).await?;
        let data = self.acquire_data();
        let mut result = Ok(());
        for (key, blob) in all {
            let outcome = match self.codec.decode(&blob) {
                Ok((csrf, values)) => {
                    let mut d = data.lock();
                    d.set_full_key(&key);
                    d.load(csrf, values);
                    let r = f(&d);
                    d.reset();
                    r
                }
                Err(e) => Err(e.into()),
            };
            if let Err(e) = outcome {
                result = Err(e);
                break;
            }
        }
        self.release_data(data);
        result
    }

    // ------------------------------------------------------------------
    // Store dispatch: probe the richer capability when a cancellation
    // handle is present, fall back to the base contract.
    // ------------------------------------------------------------------

    async fn store_find(
        &self,
        cancel: Option<&CancellationToken>,
        key: &str,
    ) -> Result<Option<Vec<u8>>, SessionError> {
        let result = match (cancel, self.store.as_ctx()) {
            (Some(c), Some(store)) => store.find_ctx(c, key).await,
            _ => self.store.find(key).await,
        };
        if let Err(e) = &result {
            tracing::error!(error = %e, "session store find failed");
        }
        result
    }

    async fn store_commit(
        &self,
        cancel: Option<&CancellationToken>,
        key: &str,
        blob: &[u8],
        expiry: SystemTime,
        modified: bool,
    ) -> Result<(), SessionError> {
        let result = match (cancel, self.store.as_ctx()) {
            (Some(c), Some(store)) => store.commit_ctx(c, key, blob, expiry, modified).await,
            _ => self.store.commit(key, blob, expiry, modified).await,
        };
        if let Err(e) = &result {
            tracing::error!(error = %e, "session store commit failed");
        }
        result
    }

    async fn store_delete(
        &self,
        cancel: Option<&CancellationToken>,
        key: &str,
    ) -> Result<(), SessionError> {
        let result = match (cancel, self.store.as_ctx()) {
            (Some(c), Some(store)) => store.delete_ctx(c, key).await,
            _ => self.store.delete(key).await,
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "session store delete failed");
        }
        result
    }

    async fn store_all(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<HashMap<String, Vec<u8>>, SessionError> {
        if let Some(c) = cancel
            && let Some(store) = self.store.as_iterable_ctx()
        {
            return store.all_ctx(c).await;
        }
        match self.store.as_iterable() {
            Some(store) => store.all().await,
            None => panic!("session store does not support iteration"),
        }
    }

    // ------------------------------------------------------------------
    // Request-context surface: mirrors the data mutators, resolving
    // the active request's data from the context bag first.
    // ------------------------------------------------------------------

    /// Add a key/value pair to the active session.
    pub fn put(&self, ctx: &Ctx, key: &str, value: impl Into<SessionValue>) {
        self.data_from_ctx(ctx).lock().put(key, value);
    }

    /// The value for `key` in the active session.
    pub fn get(&self, ctx: &Ctx, key: &str) -> Option<SessionValue> {
        self.data_from_ctx(ctx).lock().get(key).cloned()
    }

    /// One-time get: return and delete the value for `key`.
    pub fn pop(&self, ctx: &Ctx, key: &str) -> Option<SessionValue> {
        self.data_from_ctx(ctx).lock().pop(key)
    }

    /// Delete `key` from the active session.
    pub fn remove(&self, ctx: &Ctx, key: &str) {
        self.data_from_ctx(ctx).lock().remove(key);
    }

    /// Remove all values from the active session.
    pub fn clear(&self, ctx: &Ctx) {
        self.data_from_ctx(ctx).lock().clear();
    }

    /// Whether `key` is present in the active session.
    pub fn exists(&self, ctx: &Ctx, key: &str) -> bool {
        self.data_from_ctx(ctx).lock().exists(key)
    }

    /// All value keys in the active session.
    pub fn keys(&self, ctx: &Ctx) -> Vec<String> {
        self.data_from_ctx(ctx).lock().keys()
    }

    /// The active session's status.
    pub fn status(&self, ctx: &Ctx) -> Status {
        self.data_from_ctx(ctx).lock().status()
    }

    /// The active session's token.
    pub fn token(&self, ctx: &Ctx) -> String {
        self.data_from_ctx(ctx).lock().token().to_string()
    }

    /// The active session's CSRF token.
    pub fn csrf_token(&self, ctx: &Ctx) -> String {
        self.data_from_ctx(ctx).lock().csrf_token().to_string()
    }

    /// Control cookie persistence for the active session.
    pub fn remember_me(&self, ctx: &Ctx, value: bool) {
        self.data_from_ctx(ctx).lock().put(REMEMBER_KEY, value);
    }

    /// Renew the active session's token, deleting the old record.
    /// Call before privilege changes to mitigate session fixation.
    pub async fn renew_token(&self, ctx: &Ctx) -> Result<(), SessionError> {
        let data = self.data_from_ctx(ctx);
        self.migrate(ctx.cancellation(), &data, true).await
    }

    /// Destroy the active session.
    pub async fn destroy(&self, ctx: &Ctx) -> Result<(), SessionError> {
        let data = self.data_from_ctx(ctx);
        self.destroy_data(ctx.cancellation(), &data).await
    }

    /// Clear and migrate the active session.
    pub async fn invalidate(&self, ctx: &Ctx) -> Result<(), SessionError> {
        let data = self.data_from_ctx(ctx);
        self.invalidate_data(ctx.cancellation(), &data).await
    }

    /// Merge values from `other_token`'s session into the active one.
    pub async fn merge_session(&self, ctx: &Ctx, other_token: &str) -> Result<(), SessionError> {
        let data = self.data_from_ctx(ctx);
        self.merge_data(ctx.cancellation(), &data, other_token).await
    }

    /// The string value for `key` in the active session.
    pub fn get_str(&self, ctx: &Ctx, key: &str) -> Option<String> {
        self.data_from_ctx(ctx).lock().get_str(key).map(str::to_string)
    }

    /// The bool value for `key` in the active session.
    pub fn get_bool(&self, ctx: &Ctx, key: &str) -> Option<bool> {
        self.data_from_ctx(ctx).lock().get_bool(key)
    }

    /// The integer value for `key` in the active session.
    pub fn get_int(&self, ctx: &Ctx, key: &str) -> Option<i64> {
        self.data_from_ctx(ctx).lock().get_int(key)
    }

    /// The float value for `key` in the active session.
    pub fn get_float(&self, ctx: &Ctx, key: &str) -> Option<f64> {
        self.data_from_ctx(ctx).lock().get_float(key)
    }

    /// The timestamp value for `key` in the active session.
    pub fn get_time(&self, ctx: &Ctx, key: &str) -> Option<DateTime<Utc>> {
        self.data_from_ctx(ctx).lock().get_time(key)
    }

    /// The byte value for `key` in the active session.
    pub fn get_bytes(&self, ctx: &Ctx, key: &str) -> Option<Vec<u8>> {
        self.data_from_ctx(ctx)
            .lock()
            .get_bytes(key)
            .map(<[u8]>::to_vec)
    }

    /// Pop the string value for `key` from the active session.
    pub fn pop_str(&self, ctx: &Ctx, key: &str) -> Option<String> {
        self.data_from_ctx(ctx).lock().pop_str(key)
    }

    /// Pop the bool value for `key` from the active session.
    pub fn pop_bool(&self, ctx: &Ctx, key: &str) -> Option<bool> {
        self.data_from_ctx(ctx).lock().pop_bool(key)
    }

    /// Pop the integer value for `key` from the active session.
    pub fn pop_int(&self, ctx: &Ctx, key: &str) -> Option<i64> {
        self.data_from_ctx(ctx).lock().pop_int(key)
    }

    /// Pop the float value for `key` from the active session.
    pub fn pop_float(&self, ctx: &Ctx, key: &str) -> Option<f64> {
        self.data_from_ctx(ctx).lock().pop_float(key)
    }

    /// Pop the timestamp value for `key` from the active session.
    pub fn pop_time(&self, ctx: &Ctx, key: &str) -> Option<DateTime<Utc>> {
        self.data_from_ctx(ctx).lock().pop_time(key)
    }

    /// Pop the byte value for `key` from the active session.
    pub fn pop_bytes(&self, ctx: &Ctx, key: &str) -> Option<Vec<u8>> {
        self.data_from_ctx(ctx).lock().pop_bytes(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;

    fn manager() -> Manager {
        Manager::new(SessionConfig::default(), Arc::new(MemoryStore::new()))
    }

    async fn started_session(manager: &Manager) -> SharedData {
        let data = manager.acquire_data();
        let new_token = manager.prepare(&data, None).expect("token");
        assert!(new_token);
        manager.start(None, &data, new_token).await.expect("start");
        data
    }

    #[tokio::test]
    async fn test_fresh_session_has_tokens() {
        let manager = manager();
        let data = started_session(&manager).await;
        let d = data.lock();
        assert!(!d.token().is_empty());
        assert!(!d.csrf_token().is_empty());
        assert!(d.started());
        assert_eq!(d.status(), Status::Unmodified);
    }

    #[tokio::test]
    async fn test_prepare_accepts_valid_token() {
        let manager = manager();
        let data = started_session(&manager).await;
        let token = data.lock().token().to_string();

        let other = manager.acquire_data();
        let new_token = manager.prepare(&other, Some(&token)).expect("token");
        assert!(!new_token);
        assert_eq!(other.lock().token(), token);
    }

    #[tokio::test]
    async fn test_prepare_rejects_tampered_token() {
        use base64::Engine as _;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let manager = manager();
        let data = started_session(&manager).await;
        // Corrupt the checksum suffix so validation fails regardless of
        // the random token bytes.
        let mut raw = URL_SAFE_NO_PAD
            .decode(data.lock().token())
            .expect("valid base64");
        let last = raw.len() - 1;
        raw[last] = raw[last].wrapping_add(1);
        raw[last - 1] = raw[last - 1].wrapping_add(1);
        let tampered = URL_SAFE_NO_PAD.encode(&raw);

        let other = manager.acquire_data();
        let new_token = manager.prepare(&other, Some(&tampered)).expect("token");
        assert!(new_token, "tampered token treated as absent");
        assert_ne!(other.lock().token(), tampered);
    }

    #[tokio::test]
    async fn test_commit_and_reload() {
        let manager = manager();
        let data = started_session(&manager).await;
        data.lock().put("user", "alice");
        let token = data.lock().token().to_string();
        let csrf = data.lock().csrf_token().to_string();
        manager.commit(None, &data).await.expect("commit");

        let reloaded = manager.acquire_data();
        let new_token = manager.prepare(&reloaded, Some(&token)).expect("token");
        assert!(!new_token);
        manager.start(None, &reloaded, new_token).await.expect("start");
        let d = reloaded.lock();
        assert_eq!(d.get_str("user"), Some("alice"));
        assert_eq!(d.csrf_token(), csrf, "csrf token round-trips");
    }

    #[tokio::test]
    async fn test_corrupt_record_self_heals() {
        let manager = manager();
        let data = started_session(&manager).await;
        data.lock().put("user", "alice");
        let token = data.lock().token().to_string();
        let key = data.lock().key().to_string();
        manager.commit(None, &data).await.expect("commit");

        // Clobber the stored record with undecodable bytes.
        manager
            .store
            .commit(&key, b"\xff not a record", SystemTime::now() + Duration::from_secs(60), true)
            .await
            .expect("clobber");

        let reloaded = manager.acquire_data();
        let new_token = manager.prepare(&reloaded, Some(&token)).expect("token");
        manager.start(None, &reloaded, new_token).await.expect("start");
        assert!(reloaded.lock().get("user").is_none(), "fresh session");

        // The corrupt record was deleted, not left to fail again.
        assert_eq!(manager.store.find(&key).await.expect("find"), None);
    }

    #[tokio::test]
    async fn test_destroy_then_commit_writes_nothing() {
        let manager = manager();
        let data = started_session(&manager).await;
        data.lock().put("user", "alice");
        let key = data.lock().key().to_string();
        manager.commit(None, &data).await.expect("commit");

        manager.destroy_data(None, &data).await.expect("destroy");
        assert_eq!(data.lock().status(), Status::Destroyed);
        assert!(data.lock().get("user").is_none());

        manager.commit(None, &data).await.expect("noop commit");
        assert_eq!(manager.store.find(&key).await.expect("find"), None);
    }

    #[tokio::test]
    async fn test_migrate_rotates_token_and_deletes_old() {
        let manager = manager();
        let data = started_session(&manager).await;
        data.lock().put("user", "alice");
        let old_token = data.lock().token().to_string();
        let old_key = data.lock().key().to_string();
        manager.commit(None, &data).await.expect("commit");

        manager.migrate(None, &data, true).await.expect("migrate");
        let d = data.lock();
        assert_ne!(d.token(), old_token);
        assert_eq!(d.status(), Status::Modified);
        assert_eq!(d.get_str("user"), Some("alice"), "values survive");
        drop(d);

        assert_eq!(manager.store.find(&old_key).await.expect("find"), None);
    }

    #[tokio::test]
    async fn test_regenerate_rotates_csrf() {
        let manager = manager();
        let data = started_session(&manager).await;
        let old_csrf = data.lock().csrf_token().to_string();
        manager.regenerate(None, &data, false).await.expect("regen");
        assert_ne!(data.lock().csrf_token(), old_csrf);
    }

    #[tokio::test]
    async fn test_merge_session_existing_keys_win() {
        let manager = manager();

        let other = started_session(&manager).await;
        other.lock().put("shared", "theirs");
        other.lock().put("extra", 1i64);
        let other_token = other.lock().token().to_string();
        let other_key = other.lock().key().to_string();
        manager.commit(None, &other).await.expect("commit other");

        let data = started_session(&manager).await;
        data.lock().put("shared", "mine");
        manager
            .merge_data(None, &data, &other_token)
            .await
            .expect("merge");

        let d = data.lock();
        assert_eq!(d.get_str("shared"), Some("mine"));
        assert_eq!(d.get_int("extra"), Some(1));
        drop(d);

        // The other record is gone.
        assert_eq!(manager.store.find(&other_key).await.expect("find"), None);

        // Merging with the own token is a no-op.
        let own = data.lock().token().to_string();
        manager.merge_data(None, &data, &own).await.expect("self merge");
    }

    #[tokio::test]
    async fn test_iterate_visits_all_sessions() {
        let manager = manager();
        for name in ["alice", "bob"] {
            let data = started_session(&manager).await;
            data.lock().put("user", name);
            manager.commit(None, &data).await.expect("commit");
            manager.release_data(data);
        }

        let mut seen = Vec::new();
        manager
            .iterate(None, |d| {
                seen.push(d.get_str("user").unwrap_or_default().to_string());
                Ok(())
            })
            .await
            .expect("iterate");
        seen.sort();
        assert_eq!(seen, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_iterate_stops_on_callback_error() {
        let manager = manager();
        for _ in 0..3 {
            let data = started_session(&manager).await;
            data.lock().put("k", 1i64);
            manager.commit(None, &data).await.expect("commit");
            manager.release_data(data);
        }

        let mut visits = 0;
        let result = manager
            .iterate(None, |_| {
                visits += 1;
                Err(Error::with_status(http::StatusCode::IM_A_TEAPOT, "stop"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(visits, 1);
    }

    #[tokio::test]
    async fn test_pooled_data_reset_on_release() {
        let manager = manager();
        let data = started_session(&manager).await;
        data.lock().put("secret", "hunter2");
        manager.release_data(data);

        let data = manager.acquire_data();
        let d = data.lock();
        assert!(d.token().is_empty());
        assert!(d.csrf_token().is_empty());
        assert!(d.get("secret").is_none());
        assert!(!d.started());
    }
}
