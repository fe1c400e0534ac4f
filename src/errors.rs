//! Error types for the sidecar's components.
//!
//! Each concern gets its own `thiserror` enum rather than one
//! crate-wide catch-all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    MissingRequired(&'static str),
    #[error("SECRET_KEY must be a 64-character hex string")]
    InvalidSecretKey,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connect: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("listen: {0}")]
    Listen(sqlx::Error),
    #[error("prepare: {0}")]
    Prepare(sqlx::Error),
}
