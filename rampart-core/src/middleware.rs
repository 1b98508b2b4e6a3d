// Middleware system for request interception

use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

/// Boxed future returned by handlers and the remainder of a chain
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>;

/// The rest of the chain, handed to each middleware
pub type Next = Box<dyn FnOnce(HttpRequest) -> ResponseFuture + Send>;

/// Terminal request handler
pub type HandlerFn = Arc<dyn Fn(HttpRequest) -> ResponseFuture + Send + Sync>;

/// Middleware trait for processing requests before they reach the handler
///
/// A middleware either forwards the request by calling `next`, or
/// short-circuits by returning a response of its own.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

/// Wrap an async function as a [`HandlerFn`]
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// Middleware chain executor
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the end of the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        let mut mws = (*self.middlewares).clone();
        mws.push(Arc::new(middleware));
        self.middlewares = Arc::new(mws);
    }

    /// Number of middlewares in the chain
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler).await
    }

    fn execute_from(&self, index: usize, req: HttpRequest, handler: HandlerFn) -> ResponseFuture {
        if index >= self.middlewares.len() {
            trace!("Middleware chain complete, calling handler");
            return handler(req);
        }

        let middleware = self.middlewares[index].clone();
        let chain = self.clone();

        trace!(middleware_index = index, "Executing middleware");
        Box::pin(async move {
            middleware
                .handle(
                    req,
                    Box::new(move |req| chain.execute_from(index + 1, req, handler)),
                )
                .await
        })
    }
}
