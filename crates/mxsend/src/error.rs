//! Error types for SMTP submission.

use std::io;

use crate::types::Expect;

/// Result type alias for submission operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Submission error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Header field name is empty or not printable ASCII without `:`.
    #[error("Invalid header field name: {0:?}")]
    InvalidHeaderName(String),

    /// Remote identifier is not a `host:port` pair.
    #[error("Invalid remote address: {0}")]
    InvalidAddress(String),

    /// A command argument or header key contains CR or LF.
    #[error("A line must not contain CR or LF")]
    LineInjection,

    /// DNS kept failing temporarily until the attempt limit was reached.
    #[error("Temporary resolution failure for {host} after {attempts} attempts: {message}")]
    ResolutionTemporary {
        /// Host being resolved.
        host: String,
        /// Number of lookups made.
        attempts: u32,
        /// Last resolver message.
        message: String,
    },

    /// DNS failed permanently.
    #[error("Resolution failed for {host}: {message}")]
    ResolutionPermanent {
        /// Host being resolved.
        host: String,
        /// Resolver message.
        message: String,
    },

    /// DNS lookup timed out.
    #[error("Resolution timed out for {host}: {message}")]
    ResolutionTimeout {
        /// Host being resolved.
        host: String,
        /// Resolver message.
        message: String,
    },

    /// Every connect target failed to dial.
    #[error("Could not connect to {target}: {source}")]
    ConnectFailure {
        /// Last target tried.
        target: String,
        /// Dial error of the last target.
        #[source]
        source: io::Error,
    },

    /// Server replied with a code the command does not allow.
    #[error("Unexpected reply {code} (expected {expected}): {message}")]
    UnexpectedResponse {
        /// Code or code class the command required.
        expected: Expect,
        /// Reply code received (e.g., 550).
        code: u16,
        /// Reply text.
        message: String,
    },

    /// Malformed reply.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Host cannot be used as a TLS server name.
    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// An operation exceeded its time limit.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates an unexpected-response error.
    #[must_use]
    pub fn unexpected(expected: Expect, code: u16, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            expected,
            code,
            message: message.into(),
        }
    }

    /// Returns the reply code carried by this error, if any.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedResponse { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::UnexpectedResponse { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::UnexpectedResponse { code, .. } if *code >= 400 && *code < 500)
    }
}
