//! Per-request session state.
//!
//! `SessionData` objects are pooled and reused across requests. The
//! store key is held as one owned `prefix + token` string with the
//! token tracked as a sub-range, so prefixed store lookups never
//! reallocate or alias.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// State of the session data during a request cycle.
///
/// Transitions only move forward within one request: `Unmodified` to
/// `Modified` is idempotent, and `Destroyed` is terminal for the
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The session data has not been changed in the current request
    /// cycle.
    Unmodified,
    /// The session data has been changed in the current request cycle.
    Modified,
    /// The session data has been destroyed in the current request
    /// cycle.
    Destroyed,
}

/// A session value: a tagged variant over the types sessions store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Time(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl From<&str> for SessionValue {
    fn from(v: &str) -> Self {
        SessionValue::Str(v.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(v: String) -> Self {
        SessionValue::Str(v)
    }
}

impl From<bool> for SessionValue {
    fn from(v: bool) -> Self {
        SessionValue::Bool(v)
    }
}

impl From<i64> for SessionValue {
    fn from(v: i64) -> Self {
        SessionValue::Int(v)
    }
}

impl From<i32> for SessionValue {
    fn from(v: i32) -> Self {
        SessionValue::Int(v.into())
    }
}

impl From<f64> for SessionValue {
    fn from(v: f64) -> Self {
        SessionValue::Float(v)
    }
}

impl From<DateTime<Utc>> for SessionValue {
    fn from(v: DateTime<Utc>) -> Self {
        SessionValue::Time(v)
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(v: Vec<u8>) -> Self {
        SessionValue::Bytes(v)
    }
}

/// Mutable session state for one request cycle.
pub struct SessionData {
    status: Status,
    /// Store key: the fixed prefix followed by the encoded token.
    key: String,
    prefix_len: usize,
    csrf_token: String,
    values: HashMap<String, SessionValue>,
    started: bool,
}

impl SessionData {
    pub(crate) fn new(key_prefix: &str) -> Self {
        SessionData {
            status: Status::Unmodified,
            key: key_prefix.to_string(),
            prefix_len: key_prefix.len(),
            csrf_token: String::new(),
            values: HashMap::new(),
            started: false,
        }
    }

    /// Zero all request-scoped state before pool release.
    pub(crate) fn reset(&mut self) {
        self.key.truncate(self.prefix_len);
        self.csrf_token.clear();
        self.values.clear();
        self.status = Status::Unmodified;
        self.started = false;
    }

    /// The full store key (`prefix + token`).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The encoded session token exposed to the client.
    pub fn token(&self) -> &str {
        &self.key[self.prefix_len..]
    }

    /// The CSRF token bound to this session.
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// The current status of the session data.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether `start` ran for this request.
    pub fn started(&self) -> bool {
        self.started
    }

    pub(crate) fn set_token_value(&mut self, token: &str) {
        self.key.truncate(self.prefix_len);
        self.key.push_str(token);
    }

    pub(crate) fn set_full_key(&mut self, key: &str) {
        self.key.clear();
        self.key.push_str(key);
    }

    pub(crate) fn set_csrf_token(&mut self, token: String) {
        self.csrf_token = token;
    }

    pub(crate) fn set_started(&mut self) {
        self.started = true;
    }

    /// Adopt decoded state from the store.
    pub(crate) fn load(&mut self, csrf_token: String, values: HashMap<String, SessionValue>) {
        self.csrf_token = csrf_token;
        self.values = values;
    }

    /// Clear values and token and park the status at `Destroyed`,
    /// terminal for this request cycle.
    pub(crate) fn destroy(&mut self) {
        self.values.clear();
        self.csrf_token.clear();
        self.key.truncate(self.prefix_len);
        self.status = Status::Destroyed;
    }

    pub(crate) fn mark_modified(&mut self) {
        if self.status != Status::Destroyed {
            self.status = Status::Modified;
        }
    }

    /// Add a key/value pair, replacing any existing value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<SessionValue>) {
        self.values.insert(key.into(), value.into());
        self.mark_modified();
    }

    /// The value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.values.get(key)
    }

    /// One-time get: returns and removes the value for `key`.
    pub fn pop(&mut self, key: &str) -> Option<SessionValue> {
        let value = self.values.remove(key)?;
        self.mark_modified();
        Some(value)
    }

    /// Delete `key`. A no-op when absent.
    pub fn remove(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.mark_modified();
        }
    }

    /// Remove all values. The token and lifetime are unaffected. A
    /// no-op on an empty value bag.
    pub fn clear(&mut self) {
        if self.values.is_empty() {
            return;
        }
        self.values.clear();
        self.mark_modified();
    }

    /// Remove all values without touching the status.
    pub(crate) fn flush(&mut self) {
        self.values.clear();
    }

    /// Whether `key` is present.
    pub fn exists(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// All value keys, in arbitrary order.
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub(crate) fn values(&self) -> &HashMap<String, SessionValue> {
        &self.values
    }

    /// Merge another session's values, giving precedence to existing
    /// keys on conflict.
    pub(crate) fn merge(&mut self, other: HashMap<String, SessionValue>) {
        for (key, value) in other {
            self.values.entry(key).or_insert(value);
        }
        self.mark_modified();
    }

    /// Control whether this session's cookie persists after the
    /// browser closes (only meaningful when the cookie configuration
    /// has `persist` off).
    pub fn remember_me(&mut self, value: bool) {
        self.put(super::REMEMBER_KEY, value);
    }

    /// The string value for `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            SessionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The bool value for `key`, if present and a bool.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            SessionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer value for `key`, if present and an integer.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            SessionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The float value for `key`, if present and a float.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            SessionValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The timestamp value for `key`, if present and a timestamp.
    pub fn get_time(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.values.get(key)? {
            SessionValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// The byte-slice value for `key`, if present and bytes.
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        match self.values.get(key)? {
            SessionValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Pop the string value for `key`, if present and a string.
    pub fn pop_str(&mut self, key: &str) -> Option<String> {
        match self.pop(key)? {
            SessionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Pop the bool value for `key`, if present and a bool.
    pub fn pop_bool(&mut self, key: &str) -> Option<bool> {
        match self.pop(key)? {
            SessionValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Pop the integer value for `key`, if present and an integer.
    pub fn pop_int(&mut self, key: &str) -> Option<i64> {
        match self.pop(key)? {
            SessionValue::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Pop the float value for `key`, if present and a float.
    pub fn pop_float(&mut self, key: &str) -> Option<f64> {
        match self.pop(key)? {
            SessionValue::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Pop the timestamp value for `key`, if present and a timestamp.
    pub fn pop_time(&mut self, key: &str) -> Option<DateTime<Utc>> {
        match self.pop(key)? {
            SessionValue::Time(t) => Some(t),
            _ => None,
        }
    }

    /// Pop the byte value for `key`, if present and bytes.
    pub fn pop_bytes(&mut self, key: &str) -> Option<Vec<u8>> {
        match self.pop(key)? {
            SessionValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}
