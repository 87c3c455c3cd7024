//! Listener seam.
//!
//! # Responsibilities
//! - Define the replaceable "bind and serve" step ([`ServeFn`])
//! - Provide the default TCP implementation with graceful shutdown
//!
//! # Design Decisions
//! - The seam receives the frozen router, so a test seam can drive it
//!   with `oneshot` instead of a socket
//! - Shutdown fires on Ctrl+C or on the application's [`Shutdown`](crate::lifecycle::Shutdown) broadcast

use std::future::Future;
use std::io;

use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Binds `address`, serves the router and resolves once `shutdown` fires.
pub type ServeFn = Box<
    dyn FnOnce(String, axum::Router, BoxFuture<'static, ()>) -> BoxFuture<'static, io::Result<()>>
        + Send,
>;

/// Wrap an async closure as a [`ServeFn`].
pub fn serve_fn<F, Fut>(f: F) -> ServeFn
where
    F: FnOnce(String, axum::Router, BoxFuture<'static, ()>) -> Fut + Send + 'static,
    Fut: Future<Output = io::Result<()>> + Send + 'static,
{
    Box::new(move |address, service, shutdown| -> BoxFuture<'static, io::Result<()>> {
        Box::pin(f(address, service, shutdown))
    })
}

/// Default seam: a Tokio TCP listener driven by `axum::serve`.
pub fn serve_tcp() -> ServeFn {
    serve_fn(|address, service, shutdown| async move {
        let listener = TcpListener::bind(&address).await?;
        tracing::info!(address = %listener.local_addr()?, "Listening for connections");

        axum::serve(listener, service)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Shutdown complete");
        Ok(())
    })
}

/// Resolves on Ctrl+C or when the subscribed [`Shutdown`](crate::lifecycle::Shutdown) is triggered.
pub(crate) fn shutdown_signal(
    shutdown: Option<broadcast::Receiver<()>>,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };
        let triggered = async {
            match shutdown {
                // A closed channel means the coordinator is gone; treat it as a trigger.
                Some(mut rx) => {
                    let _ = rx.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = ctrl_c => tracing::info!("Ctrl+C received, shutting down"),
            _ = triggered => tracing::info!("Shutdown triggered"),
        }
    })
}
