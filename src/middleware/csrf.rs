//! CSRF verification middleware.
//!
//! Compares the request-supplied token against the CSRF token bound to
//! the active session, in constant time. Reading methods (HEAD, GET,
//! OPTIONS) and configured exempt path prefixes pass without a check.
//! On success the session CSRF token is exposed to clients through the
//! `XSRF-TOKEN` cookie; a mismatch is surfaced as a plain error the
//! router maps to a 500 response.
//!
//! Requires the session middleware earlier in the chain.

use crate::config::SameSitePolicy;
use crate::context::Ctx;
use crate::error::Error;
use crate::handler::{Handler, HandlerResult};
use crate::session::{SESSION_KEY, SessionData};
use async_trait::async_trait;
use cookie::Cookie;
use http::{Method, header};
use parking_lot::Mutex;
use subtle::ConstantTimeEq;

/// Header carrying the token for AJAX requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Header carrying the token echoed from the `XSRF-TOKEN` cookie.
pub const XSRF_HEADER: &str = "x-xsrf-token";

/// Form field carrying the token for HTML form posts.
pub const FORM_FIELD: &str = "_token";

/// Cookie exposing the session CSRF token to client-side code.
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";

/// CSRF middleware configuration.
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    /// Path prefixes exempt from verification.
    pub except: Vec<String>,
    /// Suppress the `XSRF-TOKEN` response cookie.
    pub no_cookie: bool,
    /// `Max-Age` of the `XSRF-TOKEN` cookie, in seconds.
    pub cookie_lifetime_secs: u64,
    pub cookie_path: String,
    pub cookie_domain: String,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSitePolicy,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        CsrfConfig {
            except: Vec::new(),
            no_cookie: false,
            cookie_lifetime_secs: 7 * 24 * 60 * 60,
            cookie_path: String::new(),
            cookie_domain: String::new(),
            cookie_secure: false,
            cookie_same_site: SameSitePolicy::None,
        }
    }
}

/// The CSRF verification handler.
#[derive(Default)]
pub struct CsrfMiddleware {
    config: CsrfConfig,
}

impl CsrfMiddleware {
    pub fn new(config: CsrfConfig) -> Self {
        CsrfMiddleware { config }
    }

    fn is_reading(method: &Method) -> bool {
        *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
    }

    fn in_except(&self, path: &str) -> bool {
        self.config
            .except
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// The token supplied with the request: the `_token` form field,
    /// then the `X-CSRF-TOKEN` and `X-XSRF-TOKEN` headers.
    fn request_token(ctx: &Ctx) -> Option<String> {
        let request = ctx.request();
        let form_encoded = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
        if form_encoded {
            for (key, value) in url::form_urlencoded::parse(request.body()) {
                if key == FORM_FIELD && !value.is_empty() {
                    return Some(value.into_owned());
                }
            }
        }
        for name in [CSRF_HEADER, XSRF_HEADER] {
            if let Some(value) = request.headers().get(name).and_then(|v| v.to_str().ok())
                && !value.is_empty()
            {
                return Some(value.to_string());
            }
        }
        None
    }

    fn tokens_match(ctx: &Ctx, session_token: &str) -> bool {
        if session_token.is_empty() {
            return false;
        }
        match Self::request_token(ctx) {
            Some(token) => token.as_bytes().ct_eq(session_token.as_bytes()).into(),
            None => false,
        }
    }

    fn xsrf_cookie(&self, token: &str) -> Cookie<'static> {
        let cfg = &self.config;
        let mut cookie = Cookie::new(XSRF_COOKIE, token.to_string());
        if !cfg.cookie_path.is_empty() {
            cookie.set_path(cfg.cookie_path.clone());
        }
        if !cfg.cookie_domain.is_empty() {
            cookie.set_domain(cfg.cookie_domain.clone());
        }
        cookie.set_secure(cfg.cookie_secure);
        cookie.set_same_site(cookie::SameSite::from(cfg.cookie_same_site));
        let secs = cfg.cookie_lifetime_secs.min(i64::MAX as u64) as i64;
        cookie.set_max_age(cookie::time::Duration::seconds(secs));
        cookie
    }
}

#[async_trait]
impl Handler for CsrfMiddleware {
    async fn handle(&self, ctx: &mut Ctx) -> HandlerResult {
        let data = ctx
            .get::<Mutex<SessionData>>(SESSION_KEY)
            .expect("session middleware must run before the csrf middleware");
        let session_token = data.lock().csrf_token().to_string();

        let pass = Self::is_reading(ctx.method())
            || self.in_except(ctx.path())
            || Self::tokens_match(ctx, &session_token);
        if !pass {
            return Err(Error::CsrfMismatch);
        }

        let result = ctx.next().await;
        if !self.config.no_cookie && !session_token.is_empty() {
            ctx.set_cookie(&self.xsrf_cookie(&session_token));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_methods() {
        assert!(CsrfMiddleware::is_reading(&Method::GET));
        assert!(CsrfMiddleware::is_reading(&Method::HEAD));
        assert!(CsrfMiddleware::is_reading(&Method::OPTIONS));
        assert!(!CsrfMiddleware::is_reading(&Method::POST));
        assert!(!CsrfMiddleware::is_reading(&Method::DELETE));
    }

    #[test]
    fn test_except_prefixes() {
        let mw = CsrfMiddleware::new(CsrfConfig {
            except: vec!["/webhooks/".to_string()],
            ..CsrfConfig::default()
        });
        assert!(mw.in_except("/webhooks/github"));
        assert!(!mw.in_except("/api/users"));
    }
}
