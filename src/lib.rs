//! waymark: trie-based HTTP routing with pooled request contexts and
//! pluggable session storage.
//!
//! The router compiles path templates (`/users/<id:\d+>`) into
//! per-method trees, dispatches requests through composable handler
//! chains with explicit `next`/`abort` control flow, and builds
//! reverse URLs from named routes. The session subsystem layers
//! checksummed tokens, a pluggable store/codec pair and
//! request-scoped commit semantics on top of the same handler
//! contract. Wire-level HTTP stays with the hosting engine: the
//! boundary is `http::Request<Bytes>` in, `http::Response<Bytes>`
//! out.
//!
//! ```ignore
//! let mut router = Router::new();
//! let manager = Arc::new(Manager::new(
//!     SessionConfig::default(),
//!     Arc::new(MemoryStore::new()),
//! ));
//! router.use_middleware([
//!     Arc::new(SessionMiddleware::new(manager.clone())) as Arc<dyn Handler>,
//! ]);
//! router.get("/users/<id:\\d+>", vec![handler_fn(|c| {
//!     Box::pin(async move {
//!         let id = c.param("id").to_string();
//!         c.write_str(&id);
//!         Ok(())
//!     })
//! })]);
//! let router = Arc::new(router);
//! // engine glue: router.handle_request(request).await
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod router;
pub mod session;

pub use config::{CookieConfig, SameSitePolicy, SessionConfig};
pub use context::{Ctx, Request, Response};
pub use error::{Error, SessionError};
pub use handler::{Handler, HandlerChain, HandlerResult, handler_fn};
pub use router::{MethodNotAllowedHandler, NotFoundHandler, Route, RouteBuilder, RouteGroup, Router};
pub use session::{Manager, MemoryStore, SessionMiddleware};
