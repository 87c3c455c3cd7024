//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! default every field, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::routing::DEFAULT_BODY_LIMIT;

/// Root configuration for an application.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Log filter and format.
    pub logging: LoggingConfig,

    /// Directories served as static files.
    #[serde(rename = "static")]
    pub static_mounts: Vec<StaticMount>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080" or ":8080").
    pub bind_address: String,

    /// Largest request body buffered for a handler, in bytes.
    pub max_body_bytes: usize,
}

impl ListenerConfig {
    /// The bind address in `host:port` form.
    pub fn socket_address(&self) -> String {
        normalize_address(&self.bind_address)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: DEFAULT_BODY_LIMIT,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives. `RUST_LOG` takes precedence when set.
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "trellis=info,tower_http=info".to_string(),
            json: false,
        }
    }
}

/// A directory served under a URL prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticMount {
    /// URL prefix, e.g. "/assets".
    pub prefix: String,

    /// Directory on disk.
    pub dir: String,
}

/// Expand a port-only address such as `":8080"` to `"0.0.0.0:8080"`.
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.listener.max_body_bytes, DEFAULT_BODY_LIMIT);
        assert!(!config.logging.json);
        assert!(config.static_mounts.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [listener]
            bind_address = ":9000"
            max_body_bytes = 1024

            [logging]
            filter = "debug"
            json = true

            [[static]]
            prefix = "/assets"
            dir = "./public"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.socket_address(), "0.0.0.0:9000");
        assert_eq!(config.listener.max_body_bytes, 1024);
        assert_eq!(config.logging.filter, "debug");
        assert!(config.logging.json);
        assert_eq!(config.static_mounts.len(), 1);
        assert_eq!(config.static_mounts[0].prefix, "/assets");
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_address("127.0.0.1:80"), "127.0.0.1:80");
        assert_eq!(normalize_address(" :1 "), "0.0.0.0:1");
    }
}
