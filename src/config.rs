//! Configuration loading and management.
//!
//! Session and cookie settings are explicit structs constructed at
//! startup and passed into the session manager; there is no
//! process-wide mutable default. The structs deserialize from TOML for
//! applications that keep them in a config file.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Session manager configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum length of time a session is valid for, in seconds. An
    /// absolute expiry, set when the session is created.
    pub lifetime_secs: u64,
    /// Raw entropy length of generated session tokens, in bytes
    /// (before the checksum suffix and base64url encoding).
    pub id_len: usize,
    /// Fixed prefix prepended to the token when keying store records.
    pub key_prefix: String,
    /// Session cookie attributes.
    pub cookie: CookieConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            lifetime_secs: 7 * 24 * 60 * 60,
            id_len: 30,
            key_prefix: "waymark:session:".to_string(),
            cookie: CookieConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// The session lifetime as a duration.
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }
}

/// Session cookie attributes. These are configuration inputs; the
/// session middleware writes them onto every issued cookie.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Cookie name. Should not contain whitespace, commas, semicolons
    /// or control characters (RFC 6265).
    pub name: String,
    /// `Domain` attribute; empty means the domain the cookie was
    /// issued from.
    pub domain: String,
    /// `Path` attribute.
    pub path: String,
    /// `HttpOnly` attribute.
    pub http_only: bool,
    /// Whether the cookie persists after the browser closes. When
    /// false, only sessions marked remember-me carry a `Max-Age`.
    pub persist: bool,
    /// `Secure` attribute.
    pub secure: bool,
    /// `SameSite` attribute.
    pub same_site: SameSitePolicy,
}

impl Default for CookieConfig {
    fn default() -> Self {
        CookieConfig {
            name: "waymark_session".to_string(),
            domain: String::new(),
            path: "/".to_string(),
            http_only: true,
            persist: true,
            secure: false,
            same_site: SameSitePolicy::Lax,
        }
    }
}

/// `SameSite` cookie policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

impl From<SameSitePolicy> for cookie::SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Strict => cookie::SameSite::Strict,
            SameSitePolicy::Lax => cookie::SameSite::Lax,
            SameSitePolicy::None => cookie::SameSite::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.lifetime(), Duration::from_secs(604_800));
        assert_eq!(config.id_len, 30);
        assert_eq!(config.cookie.name, "waymark_session");
        assert!(config.cookie.http_only);
        assert_eq!(config.cookie.same_site, SameSitePolicy::Lax);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: SessionConfig = toml::from_str(
            r#"
            lifetime_secs = 3600

            [cookie]
            name = "sid"
            secure = true
            same_site = "strict"
            "#,
        )
        .expect("parses");
        assert_eq!(config.lifetime(), Duration::from_secs(3600));
        assert_eq!(config.cookie.name, "sid");
        assert!(config.cookie.secure);
        assert_eq!(config.cookie.same_site, SameSitePolicy::Strict);
        // Unspecified fields keep their defaults.
        assert_eq!(config.id_len, 30);
        assert_eq!(config.cookie.path, "/");
    }
}
