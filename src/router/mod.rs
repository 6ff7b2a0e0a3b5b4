//! HTTP routing: registration, dispatch and reverse-URL lookup.
//!
//! The router owns one route tree per HTTP method, a table of named
//! routes for reverse lookup, the global middleware list and the
//! not-found fallback chain. Registration runs in a single-threaded
//! setup phase; serving shares the router immutably (`Arc<Router>`)
//! with zero synchronization on the lookup path.

mod route;
mod tree;

pub use route::{Route, UrlBuildError};

use crate::context::{Ctx, CtxPool, Request, Response};
use crate::error::Error;
use crate::handler::{Handler, HandlerChain, HandlerResult, combine_handlers};
use async_trait::async_trait;
use http::{Method, StatusCode, header};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tree::{Payload, Tree};

/// Manages routes and dispatches requests to the handlers of the
/// matching route.
pub struct Router {
    stores: HashMap<Method, Tree>,
    routes: Vec<Route>,
    names: HashMap<String, usize>,
    /// Global middleware, shared with every route and the fallbacks.
    middleware: Vec<Arc<dyn Handler>>,
    /// The configurable tail of the fallback chain.
    not_found: Vec<Arc<dyn Handler>>,
    /// Global middleware + `not_found`, rebuilt on registration.
    not_found_chain: HandlerChain,
    max_params: usize,
    pool: CtxPool,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a router with the default fallback chain
    /// (method-not-allowed scan, then 404).
    pub fn new() -> Self {
        let not_found: Vec<Arc<dyn Handler>> = vec![
            Arc::new(MethodNotAllowedHandler),
            Arc::new(NotFoundHandler),
        ];
        let not_found_chain = combine_handlers(&[], &not_found);
        Router {
            stores: HashMap::new(),
            routes: Vec::new(),
            names: HashMap::new(),
            middleware: Vec::new(),
            not_found,
            not_found_chain,
            max_params: 0,
            pool: CtxPool::new(),
        }
    }

    /// Append global middleware, shared with all routes registered
    /// afterwards and with the fallback chain.
    pub fn use_middleware(&mut self, handlers: impl IntoIterator<Item = Arc<dyn Handler>>) {
        self.middleware.extend(handlers);
        self.not_found_chain = combine_handlers(&self.middleware, &self.not_found);
    }

    /// Replace the handlers invoked when no route matches a request.
    /// Global middleware still runs first.
    pub fn not_found(&mut self, handlers: Vec<Arc<dyn Handler>>) {
        self.not_found = handlers;
        self.not_found_chain = combine_handlers(&self.middleware, &self.not_found);
    }

    /// Open a prefix-scoped route group sharing the current global
    /// middleware.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        let handlers = self.middleware.clone();
        RouteGroup {
            prefix: join_paths("", prefix),
            handlers,
            router: self,
        }
    }

    /// Start registering a route at `path`.
    pub fn route(&mut self, path: &str) -> RouteBuilder<'_> {
        let handlers = self.middleware.clone();
        let route_id = self.register_route(path);
        RouteBuilder {
            router: self,
            route_id,
            group_handlers: handlers,
        }
    }

    /// Shorthand for `route(path).get(handlers)`.
    pub fn get(&mut self, path: &str, handlers: Vec<Arc<dyn Handler>>) -> RouteBuilder<'_> {
        self.route(path).get(handlers)
    }

    /// Shorthand for `route(path).post(handlers)`.
    pub fn post(&mut self, path: &str, handlers: Vec<Arc<dyn Handler>>) -> RouteBuilder<'_> {
        self.route(path).post(handlers)
    }

    /// The named route, if registered.
    pub fn named_route(&self, name: &str) -> Option<&Route> {
        self.names.get(name).map(|&i| &self.routes[i])
    }

    /// Build a URL from the named route and `(name, value)` pairs.
    /// Values are percent-encoded; parameters without a value keep
    /// their `<name>` token in the output.
    pub fn url(&self, name: &str, pairs: &[(&str, &str)]) -> Option<String> {
        self.named_route(name).map(|r| r.url(pairs))
    }

    /// Handle one request: acquire a pooled context, resolve the
    /// handler chain, run it, translate an escaped error into an HTTP
    /// error response, and release the context.
    pub async fn handle_request(self: &Arc<Self>, req: Request) -> Response {
        self.dispatch(req, None).await
    }

    /// As [`Router::handle_request`], threading a cancellation token
    /// through the context for cancellation-aware collaborators. The
    /// router itself imposes no deadline.
    pub async fn handle_request_cancellable(
        self: &Arc<Self>,
        req: Request,
        cancel: CancellationToken,
    ) -> Response {
        self.dispatch(req, Some(cancel)).await
    }

    async fn dispatch(self: &Arc<Self>, req: Request, cancel: Option<CancellationToken>) -> Response {
        let mut ctx = self.pool.acquire();
        ctx.init(req, Arc::clone(self), cancel);
        let method = ctx.request().method().clone();
        let (handlers, pnames, route) = {
            let (path, pvalues) = ctx.match_parts();
            self.find(&method, path, pvalues)
        };
        ctx.set_match(handlers, pnames, route);
        if let Err(err) = ctx.next().await {
            self.handle_error(&mut ctx, &err);
        }
        let response = ctx.take_response();
        ctx.clear();
        self.pool.release(ctx);
        response
    }

    /// Translate an unhandled error into an HTTP error response.
    fn handle_error(&self, ctx: &mut Ctx, err: &Error) {
        let status = err.status_code();
        if status.is_server_error() {
            tracing::error!(error = %err, path = ctx.path(), "request failed");
        }
        ctx.error(&err.to_string(), status);
    }

    /// Resolve a handler chain for `method` + `path`, falling back to
    /// the not-found chain.
    fn find(
        &self,
        method: &Method,
        path: &str,
        pvalues: &mut Vec<String>,
    ) -> (HandlerChain, Arc<[String]>, Option<usize>) {
        if let Some(tree) = self.stores.get(method)
            && let Some(payload) = tree.find(path, pvalues)
        {
            return (
                payload.handlers.clone(),
                payload.pnames.clone(),
                Some(payload.route),
            );
        }
        (self.not_found_chain.clone(), Vec::new().into(), None)
    }

    /// Collect (sorted) method names whose tree matches `path` into
    /// `allow`, comma-separated.
    pub(crate) fn find_allowed(&self, path: &str, pvalues: &mut Vec<String>, allow: &mut String) {
        let mut methods: Vec<&str> = self
            .stores
            .iter()
            .filter(|(_, tree)| tree.find(path, pvalues).is_some())
            .map(|(method, _)| method.as_str())
            .collect();
        methods.sort_unstable();
        for method in methods {
            allow.push_str(method);
            allow.push_str(", ");
        }
    }

    pub(crate) fn route_at(&self, id: usize) -> Option<&Route> {
        self.routes.get(id)
    }

    fn register_route(&mut self, path: &str) -> usize {
        let route = Route::new(path);
        let id = self.routes.len();
        self.names.insert(route.name.clone(), id);
        self.routes.push(route);
        id
    }

    fn rename_route(&mut self, id: usize, name: &str) {
        self.names.insert(name.to_string(), id);
        self.routes[id].name = name.to_string();
    }

    fn add(&mut self, method: Method, route_id: usize, handlers: HandlerChain) {
        let route = &mut self.routes[route_id];
        route.methods.push(method.clone());
        let payload = Payload {
            handlers,
            pnames: route.param_names.iter().cloned().collect(),
            route: route_id,
        };
        let path = route.path.clone();
        let tree = self.stores.entry(method).or_default();
        let count = tree.add(&path, payload);
        if count > self.max_params {
            self.max_params = count;
        }
    }
}

/// A prefix-scoped sub-router sharing the parent's middleware. Paths
/// are concatenated before compilation with at most one `/` at the
/// boundary.
pub struct RouteGroup<'r> {
    router: &'r mut Router,
    prefix: String,
    handlers: Vec<Arc<dyn Handler>>,
}

impl RouteGroup<'_> {
    /// Open a nested group.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            prefix: join_paths(&self.prefix, prefix),
            handlers: self.handlers.clone(),
            router: &mut *self.router,
        }
    }

    /// Append middleware scoped to routes registered through this
    /// group afterwards.
    pub fn use_middleware(&mut self, handlers: impl IntoIterator<Item = Arc<dyn Handler>>) {
        self.handlers.extend(handlers);
    }

    /// Start registering a route at `prefix + path`.
    pub fn route(&mut self, path: &str) -> RouteBuilder<'_> {
        let full = join_paths(&self.prefix, path);
        let route_id = self.router.register_route(&full);
        RouteBuilder {
            router: &mut *self.router,
            route_id,
            group_handlers: self.handlers.clone(),
        }
    }

    /// Shorthand for `route(path).get(handlers)`.
    pub fn get(&mut self, path: &str, handlers: Vec<Arc<dyn Handler>>) -> RouteBuilder<'_> {
        self.route(path).get(handlers)
    }

    /// Shorthand for `route(path).post(handlers)`.
    pub fn post(&mut self, path: &str, handlers: Vec<Arc<dyn Handler>>) -> RouteBuilder<'_> {
        self.route(path).post(handlers)
    }
}

/// Registers handler chains for one route, method by method. The group
/// middleware snapshot taken at creation is prepended to every chain.
pub struct RouteBuilder<'r> {
    router: &'r mut Router,
    route_id: usize,
    group_handlers: Vec<Arc<dyn Handler>>,
}

macro_rules! method_fn {
    ($(#[$doc:meta])* $fn_name:ident, $method:ident) => {
        $(#[$doc])*
        pub fn $fn_name(self, handlers: Vec<Arc<dyn Handler>>) -> Self {
            self.add(Method::$method, &handlers)
        }
    };
}

impl RouteBuilder<'_> {
    /// Set the route's registration name, used for reverse-URL lookup.
    pub fn name(self, name: &str) -> Self {
        self.router.rename_route(self.route_id, name);
        self
    }

    method_fn!(
        /// Register handlers for GET requests.
        get, GET
    );
    method_fn!(
        /// Register handlers for POST requests.
        post, POST
    );
    method_fn!(
        /// Register handlers for PUT requests.
        put, PUT
    );
    method_fn!(
        /// Register handlers for PATCH requests.
        patch, PATCH
    );
    method_fn!(
        /// Register handlers for DELETE requests.
        delete, DELETE
    );
    method_fn!(
        /// Register handlers for HEAD requests.
        head, HEAD
    );
    method_fn!(
        /// Register handlers for OPTIONS requests.
        options, OPTIONS
    );
    method_fn!(
        /// Register handlers for CONNECT requests.
        connect, CONNECT
    );
    method_fn!(
        /// Register handlers for TRACE requests.
        trace, TRACE
    );

    /// Register handlers for a comma-separated method list, e.g.
    /// `"GET,POST"`. Panics on an invalid method name (registration is
    /// the setup phase; a bad method is a programmer error).
    pub fn to(self, methods: &str, handlers: Vec<Arc<dyn Handler>>) -> Self {
        let mut this = self;
        for name in methods.split(',') {
            let method = match Method::from_bytes(name.as_bytes()) {
                Ok(m) => m,
                Err(e) => panic!("invalid HTTP method {name:?}: {e}"),
            };
            this = this.add(method, &handlers);
        }
        this
    }

    fn add(self, method: Method, handlers: &[Arc<dyn Handler>]) -> Self {
        let chain = combine_handlers(&self.group_handlers, handlers);
        self.router.add(method, self.route_id, chain);
        self
    }
}

/// Join a group prefix and a path with at most one `/` at the boundary.
fn join_paths(prefix: &str, path: &str) -> String {
    if path.is_empty() {
        return prefix.to_string();
    }
    let prefix = prefix.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{prefix}{path}")
    } else {
        format!("{prefix}/{path}")
    }
}

/// Terminal fallback: produces a 404 for requests with no matching
/// route.
pub struct NotFoundHandler;

#[async_trait]
impl Handler for NotFoundHandler {
    async fn handle(&self, _ctx: &mut Ctx) -> HandlerResult {
        Err(Error::not_found())
    }
}

/// Handles requests whose path matches a route under a different HTTP
/// method: responds 405 with an `Allow` header listing the matching
/// methods (200 for OPTIONS). Passes through to the next fallback when
/// no method matches at all.
pub struct MethodNotAllowedHandler;

#[async_trait]
impl Handler for MethodNotAllowedHandler {
    async fn handle(&self, ctx: &mut Ctx) -> HandlerResult {
        let router = ctx.router();
        let path = ctx.path().to_string();
        let mut allow = ctx.take_allow_buf();
        router.find_allowed(&path, ctx.pvalues_mut(), &mut allow);
        if allow.is_empty() {
            ctx.put_allow_buf(allow);
            return Ok(());
        }
        allow.push_str("OPTIONS");

        match allow.parse::<http::HeaderValue>() {
            Ok(value) => {
                ctx.response_mut().headers_mut().insert(header::ALLOW, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, "unrepresentable Allow header");
            }
        }
        if ctx.request().method() != Method::OPTIONS {
            ctx.set_status(StatusCode::METHOD_NOT_ALLOWED);
        }
        ctx.abort();
        ctx.put_allow_buf(allow);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_paths_single_slash_boundary() {
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("/api", "/users"), "/api/users");
        assert_eq!(join_paths("/api", "users"), "/api/users");
        assert_eq!(join_paths("", "/users"), "/users");
        assert_eq!(join_paths("/api", ""), "/api");
    }

    #[test]
    fn test_named_route_url() {
        let mut router = Router::new();
        router
            .route("/users/<id:\\d+>")
            .name("user.show")
            .get(vec![]);
        let url = router.url("user.show", &[("id", "42")]).expect("named");
        assert_eq!(url, "/users/42");
        assert!(router.url("missing", &[]).is_none());
    }

    #[test]
    fn test_route_name_defaults_to_path() {
        let mut router = Router::new();
        router.route("/ping").get(vec![]);
        assert!(router.named_route("/ping").is_some());
    }

    #[test]
    fn test_group_prefix_concatenation() {
        let mut router = Router::new();
        {
            let mut api = router.group("/api/");
            let mut v1 = api.group("v1");
            v1.route("/users/<id>").name("v1.user").get(vec![]);
        }
        let route = router.named_route("v1.user").expect("registered");
        assert_eq!(route.path(), "/api/v1/users/<id>");
    }
}
