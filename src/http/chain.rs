//! Handler and middleware composition.
//!
//! # Responsibilities
//! - Define the handler and middleware contracts
//! - Compose an ordered middleware list around one terminal handler
//!
//! # Design Decisions
//! - Onion order: `[m1, m2]` runs as `m1(ctx, m2(ctx, handler))`
//! - An empty list returns the handler itself, no wrapping
//! - No recovery: a panic unwinds to whoever polls the chain
//!
//! A middleware may call `next` before, after or instead of its own work,
//! but at most once. Calling `next` twice is a caller error.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::context::Context;

/// Terminal request handler. Output goes through the context's writer.
pub type HandlerFunc = Arc<dyn Fn(Context) -> BoxFuture<'static, ()> + Send + Sync>;

/// Interceptor wrapped around a [`HandlerFunc`].
pub type Middleware = Arc<dyn Fn(Context, HandlerFunc) -> BoxFuture<'static, ()> + Send + Sync>;

/// Adapt an async closure into a [`HandlerFunc`].
pub fn handler<F, Fut>(f: F) -> HandlerFunc
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx| -> BoxFuture<'static, ()> { Box::pin(f(ctx)) })
}

/// Adapt an async closure into a [`Middleware`].
pub fn middleware<F, Fut>(f: F) -> Middleware
where
    F: Fn(Context, HandlerFunc) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx, next| -> BoxFuture<'static, ()> { Box::pin(f(ctx, next)) })
}

/// Wrap `handler` in `middlewares`, first entry outermost.
pub fn chain(handler: HandlerFunc, middlewares: &[Middleware]) -> HandlerFunc {
    if middlewares.is_empty() {
        return handler;
    }

    middlewares.iter().rev().fold(handler, |next, mw| {
        let mw = Arc::clone(mw);
        let wrapped: HandlerFunc = Arc::new(move |ctx| mw(ctx, Arc::clone(&next)));
        wrapped
    })
}
