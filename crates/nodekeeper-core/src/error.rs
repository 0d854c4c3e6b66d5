//! Unified error types for nodekeeper

use thiserror::Error;

/// Unified error type for all nodekeeper operations
#[derive(Error, Debug)]
pub enum NodeError {
    // Instance lock errors
    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Cannot verify lock ownership: {0}")]
    LockVerification(String),

    // Child process errors
    #[error("Process error: {0}")]
    Process(String),

    #[error("Failed to spawn {client}: {reason}")]
    Spawn { client: String, reason: String },

    #[error("Signal delivery failed: {0}")]
    Signal(String),

    // Metrics errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    // Log discovery errors
    #[error("Log locator error: {0}")]
    LogLocator(String),

    // Terminal UI errors
    #[error("Dashboard error: {0}")]
    Dashboard(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using NodeError
pub type Result<T> = std::result::Result<T, NodeError>;
