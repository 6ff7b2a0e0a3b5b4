//! Load-and-save session middleware.
//!
//! Runs early in the handler chain: acquires pooled session data,
//! validates or mints the session token, loads existing state from the
//! store, parks the data in the request context, runs the rest of the
//! chain, then commits and issues the session cookie. When the session
//! could not be persisted no cookie is sent.

use super::data::Status;
use super::manager::{Manager, SharedData};
use super::{REMEMBER_KEY, SESSION_KEY};
use crate::context::Ctx;
use crate::handler::{Handler, HandlerResult};
use async_trait::async_trait;
use cookie::Cookie;
use std::sync::Arc;

/// Predicate deciding whether session handling is skipped for a
/// request.
pub type Skipper = Arc<dyn Fn(&Ctx) -> bool + Send + Sync>;

/// The session middleware handler.
pub struct SessionMiddleware {
    manager: Arc<Manager>,
    skip: Option<Skipper>,
}

impl SessionMiddleware {
    pub fn new(manager: Arc<Manager>) -> Self {
        SessionMiddleware { manager, skip: None }
    }

    /// Skip session handling for requests matching the predicate.
    pub fn with_skipper(mut self, skip: Skipper) -> Self {
        self.skip = Some(skip);
        self
    }

    async fn run(&self, ctx: &mut Ctx, data: &SharedData) -> HandlerResult {
        let cookie_name = &self.manager.cookie_config().name;
        let presented = ctx.cookie(cookie_name);
        let new_token = self.manager.prepare(data, presented.as_deref())?;
        let cancel = ctx.cancellation().cloned();

        self.manager.start(cancel.as_ref(), data, new_token).await?;
        ctx.set_any(SESSION_KEY, data.clone());

        let result = ctx.next().await;

        if let Err(commit_err) = self.manager.commit(cancel.as_ref(), data).await {
            tracing::error!(error = %commit_err, "failed to commit session data");
            // No cookie when the session was not persisted; a
            // downstream error still takes precedence.
            return result.and(Err(commit_err.into()));
        }

        let cookie = {
            let d = data.lock();
            if d.status() == Status::Destroyed {
                self.removal_cookie()
            } else {
                let remember = d.get_bool(REMEMBER_KEY).unwrap_or(false);
                self.session_cookie(d.token(), remember)
            }
        };
        ctx.set_cookie(&cookie);
        result
    }

    fn base_cookie(&self, value: String) -> Cookie<'static> {
        let cfg = self.manager.cookie_config();
        let mut cookie = Cookie::new(cfg.name.clone(), value);
        cookie.set_path(cfg.path.clone());
        if !cfg.domain.is_empty() {
            cookie.set_domain(cfg.domain.clone());
        }
        cookie.set_http_only(cfg.http_only);
        cookie.set_secure(cfg.secure);
        cookie.set_same_site(cookie::SameSite::from(cfg.same_site));
        cookie
    }

    fn session_cookie(&self, token: &str, remember: bool) -> Cookie<'static> {
        let cfg = self.manager.cookie_config();
        let mut cookie = self.base_cookie(token.to_string());
        if cfg.persist || remember {
            let secs = self.manager.lifetime().as_secs().min(i64::MAX as u64) as i64;
            cookie.set_max_age(cookie::time::Duration::seconds(secs));
        }
        cookie
    }

    /// An expiring cookie telling the browser to drop the session.
    fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.base_cookie(String::new());
        cookie.make_removal();
        cookie
    }
}

#[async_trait]
impl Handler for SessionMiddleware {
    async fn handle(&self, ctx: &mut Ctx) -> HandlerResult {
        if let Some(skip) = &self.skip
            && skip(ctx)
        {
            return ctx.next().await;
        }
        let data = self.manager.acquire_data();
        let result = self.run(ctx, &data).await;
        // Drop the bag reference before the data returns to the pool;
        // handlers running after this one must not observe a reused
        // object.
        ctx.remove(SESSION_KEY);
        self.manager.release_data(data);
        result
    }
}
