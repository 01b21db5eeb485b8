//! Gateway configuration
//!
//! Every field has a default, so a config only names what it changes:
//!
//! ```
//! use tiny_gateway::GatewayConfig;
//!
//! let config = GatewayConfig {
//!     port: 8080,
//!     root: "/www".into(),
//!     ..GatewayConfig::default()
//! };
//! # assert!(config.validate().is_ok());
//! ```
//!
//! The same structure can be read from TOML, with missing keys defaulted:
//!
//! ```
//! use tiny_gateway::GatewayConfig;
//!
//! let config = GatewayConfig::from_toml_str(r#"
//!     host = "127.0.0.1"
//!     port = 8080
//!     debug = true
//! "#).unwrap();
//!
//! assert_eq!(config.port, 8080);
//! assert_eq!(config.buffer_size, 1024);
//! ```

use crate::errors::Error;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

/// Settings for one [`Gateway`](crate::Gateway).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Address to bind, and the `SERVER_NAME` seen by environ handlers (default: `0.0.0.0`).
    pub host: String,

    /// Port to bind (default: `80`). `0` picks a free port.
    pub port: u16,

    /// Directory static files are served from (default: `.`).
    pub root: PathBuf,

    /// Debug mode (default: `false`).
    ///
    /// Parse and handler errors are returned to the caller of
    /// [`poll`](crate::Gateway::poll) instead of being answered with
    /// `500 Internal Server Error`.
    pub debug: bool,

    /// Size of the read buffer in bytes (default: `1024`).
    ///
    /// A request is read with a single receive. Anything past this size is
    /// silently cut off.
    pub buffer_size: usize,

    /// Listen backlog (default: `1`).
    pub backlog: i32,

    /// Non-blocking accept (default: `false`).
    ///
    /// With `true`, [`poll`](crate::Gateway::poll) returns
    /// [`Poll::Idle`](crate::Poll::Idle) instead of waiting for a client,
    /// so it can be called from an outer main loop.
    pub nonblocking: bool,

    /// Consecutive would-block results tolerated while sending (default: `None`).
    ///
    /// `None` retries until the peer accepts the bytes. With `Some(n)` the
    /// response is abandoned after `n` retries without progress.
    pub send_retry_limit: Option<usize>,

    /// Value of the `Server` response header (default: `tiny_gateway`).
    pub server_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 80,
            root: PathBuf::from("."),
            debug: false,
            buffer_size: 1024,
            backlog: 1,
            nonblocking: false,
            send_retry_limit: None,
            server_name: "tiny_gateway".to_owned(),
        }
    }
}

impl GatewayConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;

        Self::from_toml_str(&text)
    }

    /// Checks the values a gateway cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be greater than 0".into()));
        }
        if self.backlog <= 0 {
            return Err(Error::Config("backlog must be greater than 0".into()));
        }
        if self.server_name.trim().is_empty() {
            return Err(Error::Config("server_name must not be empty".into()));
        }
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }

        Ok(())
    }

    /// `host:port`, as used in bind errors and logs.
    #[inline]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
