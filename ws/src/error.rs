//! Error types for the `ws` crate.
//!
//! Follows the same pattern as the other layers: a root `Error` struct holding
//! an `error_kind` and an optional source for error chaining.
//!
//! Only failures the caller can act on are represented here. Per-connection
//! delivery failures and queue saturation are recovered inside the hub and
//! never surface to whoever triggered a broadcast.

use crate::connection::Connection;
use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    /// The protocol handshake could not complete. No connection was created.
    UpgradeFailure,
    /// A connection with the same id is already live.
    RegistrationConflict,
    /// Teardown has begun; the hub accepts no new work.
    ShutdownInProgress,
    /// An envelope could not be serialized.
    Serialization,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub fn with_source(
        error_kind: ErrorKind,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.error_kind {
            ErrorKind::UpgradeFailure => write!(f, "WebSocket upgrade failed"),
            ErrorKind::RegistrationConflict => write!(f, "Connection is already registered"),
            ErrorKind::ShutdownInProgress => write!(f, "Hub is shutting down"),
            ErrorKind::Serialization => write!(f, "Failed to serialize envelope"),
        }?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Serialization, err)
    }
}

/// Returned by `Hub::register` when a connection is rejected.
///
/// The rejected connection is handed back so the caller decides how to close
/// it; dropping it closes its queue as well.
#[derive(Debug)]
pub struct RegisterError {
    pub error_kind: ErrorKind,
    pub connection: Connection,
}

impl RegisterError {
    pub fn into_connection(self) -> Connection {
        self.connection
    }
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Failed to register connection {}: {}",
            self.connection.id(),
            Error::new(self.error_kind)
        )
    }
}

impl StdError for RegisterError {}

impl From<RegisterError> for Error {
    fn from(err: RegisterError) -> Self {
        Error::new(err.error_kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_source() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.error_kind, ErrorKind::Serialization);
        assert!(err.to_string().starts_with("Failed to serialize envelope: "));
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn test_display_without_source() {
        let err = Error::new(ErrorKind::ShutdownInProgress);
        assert_eq!(err.to_string(), "Hub is shutting down");
        assert!(StdError::source(&err).is_none());
    }
}
