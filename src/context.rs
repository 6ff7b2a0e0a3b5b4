//! Per-request context.
//!
//! A `Ctx` is a pooled, reusable object carrying the matched route
//! parameters, the handler chain with its cursor, a lazily-allocated
//! user data bag, and the request/response pair delegated to the
//! hosting HTTP engine. Acquisition from the pool is exclusive per
//! request; `clear` drops every request-scoped reference before the
//! context returns to the pool so nothing leaks across reuse.

use crate::handler::{HandlerChain, HandlerResult, empty_chain};
use crate::router::{Route, Router};
use bytes::Bytes;
use http::{HeaderValue, Method, StatusCode, header};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The inbound request as handed over by the HTTP engine.
pub type Request = http::Request<Bytes>;

/// The outbound response handed back to the HTTP engine.
pub type Response = http::Response<Bytes>;

/// Contextual data and environment for one in-flight request.
pub struct Ctx {
    request: Request,
    response: http::Response<Vec<u8>>,
    /// Percent-decoded request path, the string routes match against.
    path: String,
    /// Matched parameter names, index-aligned with `pvalues`.
    pnames: Arc<[String]>,
    /// Captured parameter values; reused across requests.
    pvalues: Vec<String>,
    /// User data items managed by `get` and `set`.
    data: Option<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    /// Index of the currently executing handler; -1 before the first
    /// `next`, chain length once aborted.
    index: isize,
    handlers: HandlerChain,
    route: Option<usize>,
    router: Option<Arc<Router>>,
    cancel: Option<CancellationToken>,
    /// Scratch buffer for `Allow` header assembly.
    allow_buf: String,
}

impl Ctx {
    pub(crate) fn new() -> Self {
        Ctx {
            request: Request::default(),
            response: http::Response::new(Vec::new()),
            path: String::new(),
            pnames: Vec::new().into(),
            pvalues: Vec::new(),
            data: None,
            index: -1,
            handlers: empty_chain(),
            route: None,
            router: None,
            cancel: None,
            allow_buf: String::new(),
        }
    }

    /// Bind the context to an inbound request. Resets the handler
    /// cursor and decodes the request path.
    pub(crate) fn init(
        &mut self,
        request: Request,
        router: Arc<Router>,
        cancel: Option<CancellationToken>,
    ) {
        self.path = percent_decode_str(request.uri().path())
            .decode_utf8_lossy()
            .into_owned();
        self.request = request;
        self.router = Some(router);
        self.cancel = cancel;
        self.index = -1;
    }

    pub(crate) fn set_match(
        &mut self,
        handlers: HandlerChain,
        pnames: Arc<[String]>,
        route: Option<usize>,
    ) {
        self.handlers = handlers;
        self.pnames = pnames;
        self.route = route;
    }

    /// Drop all request-scoped state before returning to the pool.
    pub(crate) fn clear(&mut self) {
        self.request = Request::default();
        self.response = http::Response::new(Vec::new());
        self.path.clear();
        self.pnames = Vec::new().into();
        self.pvalues.clear();
        self.data = None;
        self.index = -1;
        self.handlers = empty_chain();
        self.route = None;
        self.router = None;
        self.cancel = None;
        self.allow_buf.clear();
    }

    pub(crate) fn match_parts(&mut self) -> (&str, &mut Vec<String>) {
        (&self.path, &mut self.pvalues)
    }

    pub(crate) fn pvalues_mut(&mut self) -> &mut Vec<String> {
        &mut self.pvalues
    }

    pub(crate) fn take_allow_buf(&mut self) -> String {
        std::mem::take(&mut self.allow_buf)
    }

    pub(crate) fn put_allow_buf(&mut self, buf: String) {
        self.allow_buf = buf;
    }

    pub(crate) fn take_response(&mut self) -> Response {
        std::mem::replace(&mut self.response, http::Response::new(Vec::new()))
            .map(Bytes::from)
    }

    /// The router handling this request.
    ///
    /// Panics on a context outside a dispatch cycle; that is a wiring
    /// bug, not a runtime condition.
    pub fn router(&self) -> Arc<Router> {
        self.router.clone().expect("context is not bound to a router")
    }

    /// The matched route, if any.
    pub fn route(&self) -> Option<&Route> {
        self.router.as_ref()?.route_at(self.route?)
    }

    /// The inbound request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// The percent-decoded request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The cancellation handle supplied by the caller, if any.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// The named parameter value matched in the URL path, or `""`.
    /// Lookup is a linear scan: parameter lists are short.
    pub fn param(&self, name: &str) -> &str {
        for (i, n) in self.pnames.iter().enumerate() {
            if n == name {
                return self.pvalues.get(i).map(String::as_str).unwrap_or("");
            }
        }
        ""
    }

    /// Matched `(name, value)` parameter pairs.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pnames
            .iter()
            .zip(self.pvalues.iter())
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Store a named data item scoped to this request.
    pub fn set<T: Any + Send + Sync>(&mut self, name: &str, value: T) {
        self.set_any(name, Arc::new(value));
    }

    /// Store a shared data item scoped to this request.
    pub fn set_any(&mut self, name: &str, value: Arc<dyn Any + Send + Sync>) {
        self.data
            .get_or_insert_with(HashMap::new)
            .insert(name.to_string(), value);
    }

    /// Retrieve a data item previously stored with `set`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let value = self.data.as_ref()?.get(name)?.clone();
        value.downcast::<T>().ok()
    }

    /// Remove a data item previously stored with `set`.
    pub fn remove(&mut self, name: &str) {
        if let Some(data) = self.data.as_mut() {
            data.remove(name);
        }
    }

    /// Call the rest of the handlers associated with the current
    /// route. If any handler returns an error, `next` returns that
    /// error immediately and the following handlers do not run.
    pub async fn next(&mut self) -> HandlerResult {
        self.index += 1;
        while (self.index as usize) < self.handlers.len() {
            let handler = Arc::clone(&self.handlers[self.index as usize]);
            handler.handle(self).await?;
            self.index += 1;
        }
        Ok(())
    }

    /// Skip the rest of the handler chain, including any subsequent
    /// `next` calls. Use when a handler answered the request normally;
    /// a handler signalling a failure should return an error instead.
    pub fn abort(&mut self) {
        self.index = self.handlers.len() as isize;
    }

    /// Build a URL from the named route and `(name, value)` pairs, or
    /// `""` when the route is unknown.
    pub fn url(&self, route: &str, pairs: &[(&str, &str)]) -> String {
        self.router
            .as_ref()
            .and_then(|r| r.url(route, pairs))
            .unwrap_or_default()
    }

    /// The response under construction.
    pub fn response_mut(&mut self) -> &mut http::Response<Vec<u8>> {
        &mut self.response
    }

    /// Set the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        *self.response.status_mut() = status;
    }

    /// Append bytes to the response body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.response.body_mut().extend_from_slice(bytes);
    }

    /// Append text to the response body.
    pub fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Replace the response with an error body and status. The content
    /// type defaults to plain text when unset.
    pub fn error(&mut self, message: &str, status: StatusCode) {
        self.response.body_mut().clear();
        *self.response.status_mut() = status;
        let headers = self.response.headers_mut();
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
        }
        self.response.body_mut().extend_from_slice(message.as_bytes());
    }

    /// The value of the named request cookie.
    pub fn cookie(&self, name: &str) -> Option<String> {
        for value in self.request.headers().get_all(header::COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            for parsed in cookie::Cookie::split_parse(raw).flatten() {
                if parsed.name() == name {
                    return Some(parsed.value().to_string());
                }
            }
        }
        None
    }

    /// Append a `Set-Cookie` header to the response.
    pub fn set_cookie(&mut self, cookie: &cookie::Cookie<'_>) {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                self.response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, cookie = cookie.name(), "unrepresentable cookie");
            }
        }
    }
}

/// Pool of reusable contexts. Acquire/release is exclusive per
/// request; contexts are cleared before release.
pub(crate) struct CtxPool {
    inner: Mutex<Vec<Box<Ctx>>>,
}

impl CtxPool {
    pub fn new() -> Self {
        CtxPool {
            inner: Mutex::new(Vec::new()),
        }
    }

    pub fn acquire(&self) -> Box<Ctx> {
        self.inner
            .lock()
            .pop()
            .unwrap_or_else(|| Box::new(Ctx::new()))
    }

    pub fn release(&self, ctx: Box<Ctx>) {
        self.inner.lock().push(ctx);
    }
}
