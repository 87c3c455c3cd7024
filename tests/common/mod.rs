//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use trellis::{App, Shutdown};

/// Run `app` on `addr` in the background and wait until it accepts.
pub async fn start_app(app: App, addr: SocketAddr) -> Shutdown {
    let shutdown = Shutdown::new();
    let app = app.with_address(&addr.to_string()).with_shutdown(&shutdown);

    tokio::spawn(async move {
        if let Err(e) = app.run().await {
            panic!("app failed: {e}");
        }
    });

    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown
}

/// Client that never goes through a proxy and never pools connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// A fresh directory under the system temp dir.
#[allow(dead_code)]
pub fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("trellis-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
