//! Error types for inbox triage.

use std::time::Duration;

/// Error that ends a triage pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox errors (IMAP retrieval and SMTP delivery).
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS setup failed for {host}: {reason}")]
    Tls { host: String, reason: String },

    #[error("Authentication failed for {user} on {host}")]
    AuthFailed { user: String, host: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Mailbox IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to send reply: {reason}")]
    Send { reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} returned HTTP {status}: {body}")]
    HttpStatus {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Model did not return valid JSON. Raw output:\n{excerpt}")]
    MalformedJson { excerpt: String },
}

/// Triage pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("Classification failed: {0}")]
    Llm(#[from] LlmError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
