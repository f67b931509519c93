//! Error types for rule-router
//!
//! Errors are categorized by subsystem: configuration loading and dialing.
//! Probe failures never surface as errors; the health checker turns them
//! into forwarder state transitions and log lines.

use std::io;

use thiserror::Error;

/// Configuration-load errors.
///
/// These surface while parsing rule files or forwarder specs. They are not
/// recoverable: the host is expected to abort and let the operator fix the
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Time window literal does not match `"DDD HH:MM HH:MM"`.
    #[error("malformed time window '{0}', expected 'DDD HH:MM HH:MM'")]
    MalformedTimeWindow(String),

    /// Forwarder spec could not be parsed.
    #[error("malformed forwarder url '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    /// Forwarder scheme has no dialer in this crate.
    ///
    /// The core only ships `direct://` and `reject://`; hosts provide other
    /// transports by constructing forwarders from their own [`Dialer`]
    /// implementations.
    ///
    /// [`Dialer`]: crate::dialer::Dialer
    #[error("unsupported forwarder scheme '{0}'")]
    UnsupportedScheme(String),

    /// Rule file is not valid TOML or does not match the expected shape.
    #[error("failed to parse rule file {path}: {reason}")]
    ParseError { path: String, reason: String },

    /// Semantic validation failed after parsing.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),

    /// I/O error while reading configuration.
    #[error("I/O error reading configuration: {0}")]
    Io(#[from] io::Error),
}

impl ConfigError {
    /// Create a malformed-url error.
    pub fn malformed_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Config errors are never recoverable without operator intervention.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }
}

/// Errors surfaced to connection handlers when dialing through a forwarder.
///
/// On any dial error the caller is expected to report
/// `record_outcome(forwarder, false)` so the failure counter advances; the
/// core itself never retries.
#[derive(Debug, Error)]
pub enum DialError {
    /// The pick was resolved to the reject forwarder by a time window.
    ///
    /// The caller should close the client connection cleanly; this is policy,
    /// not an outage.
    #[error("connection rejected by policy")]
    RejectedByPolicy,

    /// Connection establishment failed.
    #[error("failed to dial {addr}: {reason}")]
    Dial { addr: String, reason: String },

    /// Connection establishment exceeded the dial timeout.
    #[error("dial to {addr} timed out after {timeout_secs}s")]
    Timeout { addr: String, timeout_secs: u64 },

    /// Read error on an established forwarder connection.
    #[error("forwarder read error: {0}")]
    Read(String),

    /// Write error on an established forwarder connection.
    #[error("forwarder write error: {0}")]
    Write(String),

    /// I/O error not covered by the categories above.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DialError {
    /// Create a dial-failed error.
    pub fn dial(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dial {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Create a dial-timeout error.
    pub fn timeout(addr: impl Into<String>, timeout_secs: u64) -> Self {
        Self::Timeout {
            addr: addr.into(),
            timeout_secs,
        }
    }

    /// Check if this error is recoverable at the forwarder-failure level.
    ///
    /// Network errors are transient: the failure counter and health checker
    /// decide whether the forwarder stays in rotation. A policy rejection is
    /// not recoverable by retrying.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RejectedByPolicy => false,
            Self::Dial { .. } | Self::Timeout { .. } | Self::Read(_) | Self::Write(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
            ),
        }
    }
}
