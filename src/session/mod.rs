//! Server-side sessions: token lifecycle, pluggable storage and codec,
//! and commit semantics tied to the request lifecycle.
//!
//! The [`Manager`] orchestrates pooled [`SessionData`] objects against
//! a [`Store`] (find/commit/delete, optionally cancellation-aware and
//! iterable) and a [`Codec`] (encode/decode the value bag plus CSRF
//! token to bytes). The [`SessionMiddleware`] loads or starts a session
//! before the rest of the handler chain runs and commits it after.

mod codec;
mod data;
mod manager;
mod middleware;
mod redb_store;
mod store;
mod token;

pub use codec::{Codec, JsonCodec, MsgPackCodec};
pub use data::{SessionData, SessionValue, Status};
pub use manager::{Manager, SharedData};
pub use middleware::{SessionMiddleware, Skipper};
pub use redb_store::RedbStore;
pub use store::{CtxStore, IterableCtxStore, IterableStore, MemoryStore, Store};
pub use token::{CSRF_TOKEN_LEN, Checksum, HmacChecksum, SimpleChecksum, TOKEN_LEN};
pub use token::{generate_token, validate_token};

use thiserror::Error;

/// Context-bag key under which the session middleware parks the active
/// request's session data.
pub const SESSION_KEY: &str = "waymark.session";

/// Session value key controlling cookie persistence for one session.
pub(crate) const REMEMBER_KEY: &str = "__remember_me";

/// Errors from the session subsystem.
///
/// Decode failures during load are soft (the session is treated as
/// absent); everything surfaced through this type is a hard error for
/// the current request.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The secure random source failed during token generation. Fails
    /// the single affected request.
    #[error("session token: {0}")]
    Token(String),

    /// Codec encode/decode failure.
    #[error("session encoding: {0}")]
    Encoding(String),

    /// Backing-store I/O failure. Never retried by the session core;
    /// retry policy belongs to the store implementation.
    #[error("session store: {0}")]
    Store(String),

    /// Inconsistent session data state.
    #[error("session data: {0}")]
    Data(String),
}
