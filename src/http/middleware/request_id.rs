//! Request ID propagation.
//!
//! Reuses an inbound `x-request-id` header when present, otherwise mints a
//! UUID v4, and echoes the value on the response.

use axum::http::{HeaderName, HeaderValue};
use uuid::Uuid;

use crate::http::chain::{middleware, Middleware};

/// Header carrying the request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Middleware that tags every response with a request ID.
pub fn request_id() -> Middleware {
    middleware(|ctx, next| async move {
        let id = ctx
            .headers()
            .get(&X_REQUEST_ID)
            .cloned()
            .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

        if let Some(id) = id {
            ctx.writer().set_header(X_REQUEST_ID, id);
        }
        next(ctx).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::chain::{chain, handler};
    use crate::http::context::Context;
    use axum::body::Bytes;
    use axum::http::Request;

    fn context(req: Request<()>) -> Context {
        let (parts, _) = req.into_parts();
        Context::new(parts, Bytes::new())
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let ctx = context(
            Request::builder()
                .header("x-request-id", "req-123")
                .body(())
                .unwrap(),
        );
        chain(handler(|_| async {}), &[request_id()])(ctx.clone()).await;

        assert_eq!(
            ctx.writer().header(&X_REQUEST_ID).unwrap(),
            HeaderValue::from_static("req-123")
        );
    }

    #[tokio::test]
    async fn test_request_id_is_generated() {
        let ctx = context(Request::builder().body(()).unwrap());
        chain(handler(|_| async {}), &[request_id()])(ctx.clone()).await;

        let id = ctx.writer().header(&X_REQUEST_ID).unwrap();
        assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }
}
