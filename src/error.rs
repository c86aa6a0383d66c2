//! Error types for certificate generation.
//!
//! Every failure the core can raise is one of these variants. None of them are
//! retried; they propagate to the caller unchanged.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for certerator operations.
#[derive(Error, Debug)]
pub enum CertError {
    /// Requested RSA modulus size is not supported
    #[error("Unsupported RSA key size: {0} bits")]
    KeySizeError(u32),

    /// Role outside {server, client}
    #[error("Invalid certificate role: {0:?} (expected \"server\" or \"client\")")]
    InvalidRoleError(String),

    /// Malformed or mismatched PEM material on the reuse path
    #[error("Failed to parse {}: {reason}", .path.display())]
    CertificateParseError { path: PathBuf, reason: String },

    /// Certificate, request or key construction failed inside OpenSSL
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Reading or writing certificate material failed
    #[error("Failed to access {}: {source}", .path.display())]
    PersistenceError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Profile holds a value that cannot be put into a certificate
    #[error("Invalid certificate profile: {0}")]
    ProfileError(String),
}

impl CertError {
    /// Create a signing error.
    #[inline]
    pub fn signing(error: impl Into<String>) -> Self {
        Self::SigningError(error.into())
    }

    /// Create a profile error.
    #[inline]
    pub fn profile(error: impl Into<String>) -> Self {
        Self::ProfileError(error.into())
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::CertificateParseError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PersistenceError {
            path: path.into(),
            source,
        }
    }
}

/// A specialized Result type for certerator operations.
pub type Result<T> = std::result::Result<T, CertError>;
