//! Registration facade.
//!
//! # Responsibilities
//! - Register unconditional middleware (`use_middleware`)
//! - Register path-scoped handlers for any method (`all`)
//! - Register path- and method-scoped handlers (`get`, `post`, ...)
//! - Host the lifecycle event emitter
//!
//! # Design Decisions
//! - Every call appends to the chain; order of calls is dispatch order
//! - The chain is frozen into an `Arc` when the app starts serving

use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;

use crate::http::{Request, ResponseSink};
use crate::routing::chain::{BoxHandler, MiddlewareChain, Next};
use crate::routing::events::EventEmitter;
use crate::routing::matcher::PathSpec;
use crate::BoxError;

/// Routing facade over a [`MiddlewareChain`].
pub struct App<S> {
    chain: MiddlewareChain<S>,
    events: EventEmitter,
}

macro_rules! method_routes {
    ($($name:ident => $method:expr),* $(,)?) => {
        $(
            pub fn $name<F, Fut>(&mut self, path: impl Into<PathSpec>, handler: F) -> &mut Self
            where
                F: Fn(Request, S, Next<S>) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
            {
                self.method($method, path, handler)
            }
        )*
    };
}

impl<S: ResponseSink> App<S> {
    pub fn new() -> Self {
        Self {
            chain: MiddlewareChain::new(),
            events: EventEmitter::new(),
        }
    }

    /// Middleware matching every path and method.
    pub fn use_middleware<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Request, S, Next<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let handler: BoxHandler<S> = Arc::new(handler);
        self.route(None, None, vec![handler])
    }

    /// Handler for `path` regardless of method.
    pub fn all<F, Fut>(&mut self, path: impl Into<PathSpec>, handler: F) -> &mut Self
    where
        F: Fn(Request, S, Next<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let handler: BoxHandler<S> = Arc::new(handler);
        self.route(Some(path.into()), None, vec![handler])
    }

    pub fn method<F, Fut>(
        &mut self,
        method: Method,
        path: impl Into<PathSpec>,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(Request, S, Next<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let handler: BoxHandler<S> = Arc::new(handler);
        self.route(Some(path.into()), Some(method), vec![handler])
    }

    method_routes! {
        get => Method::GET,
        post => Method::POST,
        put => Method::PUT,
        patch => Method::PATCH,
        delete => Method::DELETE,
        head => Method::HEAD,
        options => Method::OPTIONS,
    }

    /// Register several handlers under one path/method filter.
    pub fn route(
        &mut self,
        path: Option<PathSpec>,
        method: Option<Method>,
        handlers: Vec<BoxHandler<S>>,
    ) -> &mut Self {
        self.chain.register(path, method, handlers);
        self
    }

    pub fn on<F>(&mut self, event: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.events.on(event, handler);
        self
    }

    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        self.events.emit(event, args)
    }

    pub fn chain(&self) -> &MiddlewareChain<S> {
        &self.chain
    }

    /// Freeze the chain for dispatching.
    pub fn into_parts(self) -> (Arc<MiddlewareChain<S>>, EventEmitter) {
        (Arc::new(self.chain), self.events)
    }
}

impl<S: ResponseSink> Default for App<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpReply;
    use axum::body::Body;
    use axum::http::{Response, StatusCode};
    use bytes::Bytes;
    use tokio::sync::oneshot;

    async fn body_of(rx: oneshot::Receiver<Response<Body>>) -> String {
        let response = rx.await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn sample_app() -> Arc<MiddlewareChain<HttpReply>> {
        let mut app: App<HttpReply> = App::new();
        app.use_middleware(|mut req: Request, res: HttpReply, next: Next<HttpReply>| async move {
            req.session.insert("seen".into(), Value::Bool(true));
            next.run(req, res).await
        })
        .get("/users/:id", |req: Request, res: HttpReply, _next: Next<HttpReply>| async move {
            let body = format!("user {}", req.param("id").unwrap_or("?"));
            res.send(StatusCode::OK, Bytes::from(body)).await
        })
        .all(["/a", "/b"], |req: Request, res: HttpReply, _next: Next<HttpReply>| async move {
            res.send(StatusCode::OK, Bytes::from(format!("{} {}", req.method, req.path))).await
        })
        .use_middleware(|_req: Request, res: HttpReply, _next: Next<HttpReply>| async move {
            res.send(StatusCode::NOT_FOUND, Bytes::from_static(b"not found")).await
        });
        app.into_parts().0
    }

    #[tokio::test]
    async fn test_param_route() {
        let chain = sample_app();
        let (reply, rx) = HttpReply::channel();
        chain.dispatch(Request::new(Method::GET, "/users/42"), reply).await.unwrap();
        assert_eq!(body_of(rx).await, "user 42");
    }

    #[tokio::test]
    async fn test_method_filter_falls_to_catch_all() {
        let chain = sample_app();
        let (reply, rx) = HttpReply::channel();
        chain.dispatch(Request::new(Method::POST, "/users/42"), reply).await.unwrap();
        assert_eq!(body_of(rx).await, "not found");
    }

    #[tokio::test]
    async fn test_all_with_pattern_set() {
        let chain = sample_app();
        for path in ["/a", "/b"] {
            let (reply, rx) = HttpReply::channel();
            chain.dispatch(Request::new(Method::DELETE, path), reply).await.unwrap();
            assert_eq!(body_of(rx).await, format!("DELETE {}", path));
        }

        let (reply, rx) = HttpReply::channel();
        chain.dispatch(Request::new(Method::GET, "/c"), reply).await.unwrap();
        assert_eq!(body_of(rx).await, "not found");
    }

    #[test]
    fn test_registration_order_is_kept() {
        let mut app: App<HttpReply> = App::new();
        app.get("/one", |_req: Request, res: HttpReply, _next: Next<HttpReply>| async move {
            res.send(StatusCode::OK, Bytes::new()).await
        });
        app.post("/two", |_req: Request, res: HttpReply, _next: Next<HttpReply>| async move {
            res.send(StatusCode::OK, Bytes::new()).await
        });

        let mut req = Request::new(Method::POST, "/two");
        assert_eq!(app.chain().find_next(&mut req, None), Some(1));
    }

    #[test]
    fn test_app_events() {
        let mut app: App<HttpReply> = App::new();
        app.on("ready", |_| {});
        assert!(app.emit("ready", &[]));
        assert!(!app.emit("other", &[]));
    }
}
