//! Application configuration.
//!
//! Everything here has a sensible default, so most applications never touch
//! it. `Config` derives `Deserialize` with `#[serde(default)]`: load it from
//! whatever file format your deployment already uses and hand it to
//! [`Router::with_config`](crate::Router::with_config).
//!
//! ```rust
//! use roost::{Config, MB};
//!
//! let config = Config {
//!     name: "orders-api".into(),
//!     body_limit: Some(2 * MB),
//!     strict_json: true,
//!     ..Config::default()
//! };
//! # let _ = config;
//! ```

use serde::Deserialize;

pub const KB: usize = 1 << 10;
pub const MB: usize = 1 << 20;

/// Longest accepted query/form value, in bytes.
pub const MAX_FIELD_LENGTH: usize = 10_000;

/// Largest accepted uploaded file, in bytes.
pub const MAX_FILE_SIZE: u64 = 50 << 20;

/// Memory budget for ordinary multipart values when the caller gives none.
pub const DEFAULT_MULTIPART_MEMORY: u64 = 32 << 20;

/// Default ceiling on a whole request body.
pub const DEFAULT_BODY_LIMIT: usize = 10 * MB;

/// Application-wide settings shared by every request.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name reported in the startup log line.
    pub name: String,
    /// Version reported in the startup log line.
    pub version: String,
    /// Maximum request body size. `None` disables the limit.
    pub body_limit: Option<usize>,
    /// Reject JSON bodies carrying unknown fields or trailing data.
    pub strict_json: bool,
    /// Per-value ceilings enforced by the binder.
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "Roost".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            body_limit: Some(DEFAULT_BODY_LIMIT),
            strict_json: false,
            limits: Limits::default(),
        }
    }
}

/// Static size ceilings applied while binding.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    pub max_field_length: usize,
    pub max_file_size: u64,
    pub multipart_memory: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_field_length: MAX_FIELD_LENGTH,
            max_file_size: MAX_FILE_SIZE,
            multipart_memory: DEFAULT_MULTIPART_MEMORY,
        }
    }
}
