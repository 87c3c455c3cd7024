//! Panic recovery.
//!
//! Install through `use_middleware` so it sits outermost. A panic anywhere
//! further in the chain is logged and, if the handler had not written a
//! status yet, answered with `500 Internal Server Error`.

use std::panic::AssertUnwindSafe;

use axum::http::StatusCode;
use futures_util::FutureExt;

use crate::http::chain::{middleware, Middleware};

/// Middleware turning panics into 500 responses.
pub fn recover() -> Middleware {
    middleware(|ctx, next| async move {
        let outcome = AssertUnwindSafe(next(ctx.clone())).catch_unwind().await;

        if let Err(panic) = outcome {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());

            tracing::error!(
                method = %ctx.method(),
                path = %ctx.path(),
                panic = %message,
                "Handler panicked"
            );

            if !ctx.writer().is_written() {
                ctx.writer().write_header(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    })
}
