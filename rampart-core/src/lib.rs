//! # Rampart Core
//!
//! The request-interception seam shared by Rampart crates: plain HTTP
//! request/response values, the framework error type, an async
//! [`Middleware`] trait with a [`MiddlewareChain`] executor, and the
//! `tracing` subscriber setup in [`logging`].
//!
//! ```
//! use rampart_core::{HttpRequest, HttpResponse, MiddlewareChain, handler};
//!
//! # tokio_test::block_on(async {
//! let chain = MiddlewareChain::new();
//! let response = chain
//!     .apply(
//!         HttpRequest::new("GET", "/health"),
//!         handler(|_req| async { Ok(HttpResponse::ok()) }),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(response.status, 200);
//! # });
//! ```

pub mod error;
pub mod http;
pub mod logging;
pub mod middleware;

pub use error::Error;
pub use http::{HttpRequest, HttpResponse};
pub use middleware::{HandlerFn, Middleware, MiddlewareChain, Next, ResponseFuture, handler};
