//! Handler trait and handler chain composition.
//!
//! A handler chain is the ordered sequence of request-processing
//! functions composed from global middleware, group middleware and
//! route-specific handlers. Chains are assembled once at registration
//! time and shared immutably across requests.

use crate::context::Ctx;
use crate::error::Error;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Result type for request handlers.
pub type HandlerResult = Result<(), Error>;

/// An immutable, shareable handler chain.
pub type HandlerChain = Arc<[Arc<dyn Handler>]>;

/// Trait implemented by all request handlers and middleware.
///
/// A handler may call [`Ctx::next`] to run the remainder of the chain
/// before doing post-processing, return early to end the chain cleanly,
/// call [`Ctx::abort`] to short-circuit without an error, or return an
/// error to stop the chain and let the router produce an error response.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle the request.
    async fn handle(&self, ctx: &mut Ctx) -> HandlerResult;
}

/// Adapter wrapping a boxed-future-returning function as a [`Handler`].
struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Ctx) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn handle(&self, ctx: &mut Ctx) -> HandlerResult {
        (self.0)(ctx).await
    }
}

/// Wrap a function as a shareable handler.
///
/// ```ignore
/// let hello = handler_fn(|c| {
///     Box::pin(async move {
///         c.write_str("hello");
///         Ok(())
///     })
/// });
/// ```
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: for<'a> Fn(&'a mut Ctx) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Merge two handler lists into a new chain.
pub(crate) fn combine_handlers(
    first: &[Arc<dyn Handler>],
    second: &[Arc<dyn Handler>],
) -> HandlerChain {
    first.iter().chain(second.iter()).cloned().collect()
}

/// The empty chain.
pub(crate) fn empty_chain() -> HandlerChain {
    Vec::<Arc<dyn Handler>>::new().into()
}
