//! Ordered middleware dispatch.
//!
//! # Responsibilities
//! - Store (predicate, handler) entries in registration order
//! - Find the first entry after a given index whose predicate holds
//! - Merge extracted path parameters into the request
//! - Hand each handler a [`Next`] that resumes after its own entry
//!
//! # Design Decisions
//! - First match wins; later overlapping entries run only via `Next`
//! - Continuation is an index, not a closure chain
//! - An exhausted chain is not an error
//! - Handler errors are returned to the caller untouched

use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::http::{Request, ResponseSink};
use crate::routing::matcher::{PathMatcher, PathSpec};
use crate::BoxError;

pub type HandlerFuture = BoxFuture<'static, Result<(), BoxError>>;

/// A request handler registered on a chain.
pub trait Handler<S>: Send + Sync + 'static {
    fn call(&self, req: Request, res: S, next: Next<S>) -> HandlerFuture;
}

impl<S, F, Fut> Handler<S> for F
where
    F: Fn(Request, S, Next<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn call(&self, req: Request, res: S, next: Next<S>) -> HandlerFuture {
        Box::pin((self)(req, res, next))
    }
}

pub type BoxHandler<S> = Arc<dyn Handler<S>>;

/// Box a closure or function as a [`BoxHandler`].
pub fn handler<S, F, Fut>(f: F) -> BoxHandler<S>
where
    S: ResponseSink,
    F: Fn(Request, S, Next<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(f)
}

struct ChainEntry<S> {
    matcher: Option<Arc<PathMatcher>>,
    method: Option<Method>,
    handler: BoxHandler<S>,
}

impl<S> ChainEntry<S> {
    /// Whether both filters accept the request.
    ///
    /// Params captured by a matching path are merged into `req` even when
    /// the method filter then rejects it.
    fn accepts(&self, req: &mut Request) -> bool {
        if let Some(matcher) = &self.matcher {
            match matcher.match_path(&req.path) {
                Some(params) => req.params.extend(params),
                None => return false,
            }
        }
        self.method.as_ref().map_or(true, |method| *method == req.method)
    }
}

/// Middleware chain; frozen behind an `Arc` once dispatching starts.
pub struct MiddlewareChain<S> {
    entries: Vec<ChainEntry<S>>,
}

impl<S: ResponseSink> MiddlewareChain<S> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append one entry per handler, all sharing the same filters.
    pub fn register(
        &mut self,
        path: Option<PathSpec>,
        method: Option<Method>,
        handlers: Vec<BoxHandler<S>>,
    ) {
        let matcher = path.map(|spec| Arc::new(PathMatcher::new(&spec)));
        for handler in handlers {
            self.entries.push(ChainEntry {
                matcher: matcher.clone(),
                method: method.clone(),
                handler,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The transition rule: index of the first entry after `after` accepting `req`.
    ///
    /// Parameters captured by every path tried on the way are merged into
    /// `req.params`.
    pub fn find_next(&self, req: &mut Request, after: Option<usize>) -> Option<usize> {
        let start = after.map_or(0, |idx| idx + 1);
        self.entries
            .iter()
            .enumerate()
            .skip(start)
            .find_map(|(index, entry)| entry.accepts(req).then_some(index))
    }

    /// Run `req` through the chain from the first entry.
    pub fn dispatch(self: &Arc<Self>, req: Request, res: S) -> HandlerFuture {
        self.dispatch_after(req, res, None)
    }

    pub fn dispatch_after(
        self: &Arc<Self>,
        mut req: Request,
        res: S,
        after: Option<usize>,
    ) -> HandlerFuture {
        let Some(index) = self.find_next(&mut req, after) else {
            tracing::trace!(path = %req.path, method = %req.method, "Middleware chain exhausted");
            return Box::pin(async { Ok(()) });
        };
        let next = Next {
            chain: Arc::clone(self),
            index,
        };
        self.entries[index].handler.call(req, res, next)
    }
}

impl<S: ResponseSink> Default for MiddlewareChain<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Continuation handed to a handler: resumes the chain after its entry.
pub struct Next<S> {
    chain: Arc<MiddlewareChain<S>>,
    index: usize,
}

impl<S: ResponseSink> Next<S> {
    /// Index of the entry this continuation was created for.
    pub fn index(&self) -> usize {
        self.index
    }

    pub async fn run(self, req: Request, res: S) -> Result<(), BoxError> {
        self.chain.dispatch_after(req, res, Some(self.index)).await
    }
}
