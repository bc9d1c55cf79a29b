//! rectangle-bridge - drive the Rectangle window manager from another application
//!
//! The crate detects whether Rectangle is installed or running, keeps that
//! knowledge up to date on a single background loop, and exposes Rectangle's
//! window arrangements and tasks through its `rectangle://` URL scheme and its
//! `defaults` preference domain.

pub mod cli;
pub mod command;
pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod macos;
pub mod models;
pub mod retry;
pub mod services;

pub use models::*;
pub use services::*;

/// Result type alias for rectangle-bridge operations
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to rectangle-bridge operations
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("Failed to start process {program}: {source}")]
    ProcessStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process {program} failed (exit code: {exit_code:?}, timed out: {timed_out}): {stderr}")]
    ProcessFailure {
        program: String,
        exit_code: Option<i32>,
        timed_out: bool,
        stderr: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl BridgeError {
    /// Whether this error is a cancellation signal rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }
}
