//! Middleware pipeline — composable before/after request handler logic.
//!
//! This module defines the core types for building an ordered middleware stack.
//! Each middleware wraps the next layer, enabling request inspection, short-circuit
//! responses, and response decoration without coupling handlers to infrastructure
//! concerns.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] — converts a [`Middleware`] trait object into a
//!   [`MiddlewareHandler`].
//! - [`Pipeline`] — an ordered stack of middleware ending in a handler, dispatched
//!   one request at a time.
//! - [`LoggerMiddleware`] — built-in request/response logger.
//! - [`HeartbeatMiddleware`] — built-in liveness endpoint.
//!
//! ## Planned Features
//!
//! - Per-stage timeouts with a configurable fallback response
//! - Error-recovery stage that maps panics to `500` responses

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Method, Request, Response, StatusCode, context::Context};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`] implementation.
/// Calling [`Next::run`] advances the cursor by one position and invokes the next
/// middleware (or returns a fallback `500` response when the chain is exhausted
/// without any middleware generating a response).
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation.
///
/// # Examples
///
/// ```rust,no_run
/// use std::pin::Pin;
/// use recache::{Response, context::Context, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
///
/// Construct one with [`from_middleware`] or by wrapping a closure directly:
///
/// ```rust,no_run
/// use std::{pin::Pin, sync::Arc};
/// use recache::{Response, context::Context, middleware::{MiddlewareHandler, Next}};
///
/// let handler: MiddlewareHandler = Arc::new(|ctx: Context, next: Next| {
///     Box::pin(async move { next.run(ctx).await })
/// });
/// ```
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Arguments
///
/// - `middleware` — a reference-counted [`Middleware`] to wrap.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use recache::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    ///
    /// # Arguments
    ///
    /// - `middlewares` — the ordered list of handlers that make up the pipeline.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use recache::middleware::Next;
    ///
    /// let next = Next::new(vec![]);
    /// ```
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// Advances the internal cursor by one, clones the handler at the current
    /// position, and awaits it. If no handler remains (i.e. the chain is
    /// exhausted without producing a response), a `500 Internal Server Error`
    /// response is returned as a safe fallback.
    ///
    /// # Arguments
    ///
    /// - `ctx` — the per-request [`Context`] to pass to the next middleware.
    ///
    /// # Returns
    ///
    /// The [`Response`] produced by the next middleware or handler in the chain.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// The core trait for all middleware stages.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(ctx).await` without modification.
/// - **Short-circuit** — return a [`Response`] directly without calling `next`.
/// - **Decorate** — call `next.run(ctx).await`, inspect the response, and return
///   a modified copy.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
/// - Implementations **should not** hold `&mut` references to shared state across
///   an `.await` point.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    ///
    /// # Arguments
    ///
    /// - `ctx` — the per-request [`Context`] carrying the HTTP method, headers,
    ///   path, and extensions.
    /// - `next` — cursor into the remainder of the middleware chain; call
    ///   [`Next::run`] to forward the request.
    ///
    /// # Returns
    ///
    /// A [`Response`] — either produced by this middleware directly (short-circuit)
    /// or forwarded from a downstream handler.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the blanket impl
/// below. [`Pipeline::handle`] accepts `impl IntoHandler` so the two-type-parameter
/// where-bound does not need to be repeated at every call site.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

/// An ordered middleware stack ending in a request handler.
///
/// Stages are executed in registration order: the first [`wrap`](Self::wrap)ed
/// middleware sees the request first and the response last. The terminal
/// [`handle`](Self::handle)r never receives a [`Next`]; anything it returns
/// travels back up through every wrapping stage.
///
/// # Examples
///
/// ```rust,no_run
/// use recache::{Request, Response, StatusCode};
/// use recache::middleware::{LoggerMiddleware, Pipeline};
///
/// # async fn example(request: Request) {
/// let pipeline = Pipeline::new()
///     .wrap(LoggerMiddleware)
///     .handle(|_ctx| async { Response::new(StatusCode::Ok).body("hello") });
///
/// let response = pipeline.dispatch(request).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    stack: Vec<MiddlewareHandler>,
}

impl Pipeline {
    /// Create a new, empty `Pipeline` with no registered stages.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use recache::middleware::Pipeline;
    ///
    /// let pipeline = Pipeline::new();
    /// assert!(pipeline.is_empty());
    /// ```
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Append a middleware stage to the end of the stack.
    ///
    /// # Arguments
    ///
    /// - `middleware` — the [`Middleware`] to append; it runs after every stage
    ///   registered before it.
    #[must_use]
    pub fn wrap<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.stack.push(from_middleware(Arc::new(middleware)));
        self
    }

    /// Append a terminal handler to the stack.
    ///
    /// The handler receives the [`Context`] but no [`Next`]; stages registered
    /// after it are never reached.
    ///
    /// # Arguments
    ///
    /// - `handler` — async function that receives a [`Context`] and returns a
    ///   [`Response`].
    #[must_use]
    pub fn handle<H>(mut self, handler: H) -> Self
    where
        H: IntoHandler,
    {
        let handler = Arc::new(handler);
        self.stack
            .push(Arc::new(move |ctx: Context, _next: Next| handler.call(ctx)));
        self
    }

    /// Return the number of stages registered in this pipeline.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Return `true` if no stages have been registered.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use recache::middleware::Pipeline;
    ///
    /// assert!(Pipeline::new().is_empty());
    /// ```
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Run `request` through every stage and return the final response.
    ///
    /// An empty pipeline (or one whose stages all delegate past the end of the
    /// stack) yields the `500` fallback from [`Next::run`].
    ///
    /// # Arguments
    ///
    /// - `request` — The incoming HTTP request to dispatch.
    pub async fn dispatch(&self, request: Request) -> Response {
        Next::new(self.stack.clone()).run(Context::new(request)).await
    }
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` line after the downstream handler completes,
/// in the format:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// `LoggerMiddleware` does not short-circuit; it always delegates to the next
/// middleware and decorates the response timing after the fact.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use recache::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    /// Log the request method, path, response status, and elapsed time.
    ///
    /// Captures the start time before delegating to the next middleware, then
    /// emits a `tracing::info!` record once the response is available.
    ///
    /// # Arguments
    ///
    /// - `ctx` — the per-request [`Context`]; method and path are extracted
    ///   before `next` consumes it.
    /// - `next` — the remainder of the middleware chain.
    ///
    /// # Returns
    ///
    /// The unmodified [`Response`] returned by the downstream handler.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            let duration = start.elapsed();
            let status = response.status().as_u16();

            tracing::info!("{} {} - {} ({:?})", method, path, status, duration);

            response
        })
    }
}

/// Built-in middleware that answers liveness probes without touching handlers.
///
/// A `GET` request whose path equals the configured endpoint (compared
/// case-insensitively) is answered immediately with `200 OK` and a one-byte
/// `"."` body. Every other request passes through untouched, so the probe
/// endpoint stays cheap even when the rest of the stack does real work.
///
/// # Examples
///
/// ```rust,no_run
/// use recache::middleware::{HeartbeatMiddleware, Pipeline};
///
/// let pipeline = Pipeline::new().wrap(HeartbeatMiddleware::new("/ping"));
/// ```
pub struct HeartbeatMiddleware {
    endpoint: String,
}

impl HeartbeatMiddleware {
    /// Create a heartbeat stage answering on `endpoint`.
    ///
    /// # Arguments
    ///
    /// - `endpoint` — the probe path, e.g. `"/ping"`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Middleware for HeartbeatMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            if ctx.request().method() == &Method::Get
                && ctx.request().path().eq_ignore_ascii_case(&endpoint)
            {
                return Response::new(StatusCode::Ok).body(".");
            }
            next.run(ctx).await
        })
    }
}
