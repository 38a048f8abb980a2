//! Error types for the ESXi virtual switch crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EsxiErrorKind {
    /// Named portgroup / switch does not exist on the host
    NotFound,
    /// Session rejected, expired or lacking privileges
    Unauthorized,
    /// Transport-level failure talking to the host
    ConnectionError,
    /// Operation not available on this host / ESXi / NSX version
    Unsupported,
    /// Name rejected before anything was sent to the host
    InvalidName,
    /// Out-of-range or otherwise invalid argument
    InvalidParameter,
    /// Remote command exited non-zero for an unclassified reason
    CommandFailed(i32),
    /// Command output could not be parsed
    ParseError,
    /// Timeout
    Timeout,
    /// Generic
    Other,
}

/// Crate error type carrying a kind + human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsxiError {
    pub kind: EsxiErrorKind,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl EsxiError {
    pub fn new(kind: EsxiErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            details: None,
        }
    }

    pub fn with_details(
        kind: EsxiErrorKind,
        msg: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: msg.into(),
            details: Some(details.into()),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(EsxiErrorKind::NotFound, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(EsxiErrorKind::Unauthorized, msg)
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(EsxiErrorKind::ConnectionError, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(EsxiErrorKind::Unsupported, msg)
    }

    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::new(EsxiErrorKind::InvalidName, msg)
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::new(EsxiErrorKind::InvalidParameter, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(EsxiErrorKind::ParseError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(EsxiErrorKind::Timeout, msg)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == EsxiErrorKind::NotFound
    }
}

impl fmt::Display for EsxiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(ref d) = self.details {
            write!(f, " ({d})")?;
        }
        Ok(())
    }
}

impl std::error::Error for EsxiError {}

impl From<EsxiError> for String {
    fn from(e: EsxiError) -> String {
        e.to_string()
    }
}

impl From<ssh2::Error> for EsxiError {
    fn from(e: ssh2::Error) -> Self {
        match e.code() {
            // LIBSSH2_ERROR_TIMEOUT
            ssh2::ErrorCode::Session(-9) => Self::timeout(format!("SSH timeout: {e}")),
            // LIBSSH2_ERROR_AUTHENTICATION_FAILED / PUBLICKEY_UNVERIFIED
            ssh2::ErrorCode::Session(-18) | ssh2::ErrorCode::Session(-19) => {
                Self::unauthorized(format!("SSH authentication failed: {e}"))
            }
            _ => Self::connection(format!("SSH error: {e}")),
        }
    }
}

impl From<std::io::Error> for EsxiError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Self::timeout(format!("I/O timeout: {e}"))
            }
            std::io::ErrorKind::PermissionDenied => {
                Self::unauthorized(format!("Permission denied: {e}"))
            }
            _ => Self::connection(format!("I/O error: {e}")),
        }
    }
}

impl From<serde_yaml::Error> for EsxiError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::parse(format!("YAML parse error: {e}"))
    }
}

/// Convenience alias.
pub type EsxiResult<T> = Result<T, EsxiError>;
