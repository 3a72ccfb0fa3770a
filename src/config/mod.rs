//! Flat key/value build configuration with `${var.NAME}` placeholder expansion.

mod request;

pub use request::{BuildConfig, ConfigError};
