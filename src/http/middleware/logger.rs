//! Access logging.

use std::time::Instant;

use crate::http::chain::{middleware, Middleware};

/// Middleware emitting one structured log line per request.
pub fn logger() -> Middleware {
    middleware(|ctx, next| async move {
        let start = Instant::now();
        let method = ctx.method().clone();
        let path = ctx.path().to_string();

        next(ctx.clone()).await;

        let status = ctx.writer().status().map(|s| s.as_u16()).unwrap_or(200);
        tracing::info!(
            method = %method,
            path = %path,
            status,
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
    })
}
