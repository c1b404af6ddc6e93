//! Error types for pure-postgres.

use thiserror::Error;

/// Result type for pure-postgres operations.
pub type Result<T> = core::result::Result<T, Error>;

/// PostgreSQL error/notice field types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (same as severity but never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in query string (1-based)
    pub position: Option<u32>,
    /// Position in internal query
    pub internal_position: Option<u32>,
    /// Failed internal command text
    pub internal_query: Option<String>,
    /// Context/stack trace
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source file name
    pub file: Option<String>,
    /// Source line number
    pub line: Option<u32>,
    /// Source routine name
    pub routine: Option<String>,
}

impl ErrorFields {
    /// Severity, preferring the non-localized form.
    pub fn severity(&self) -> Option<&str> {
        self.severity_non_localized
            .as_deref()
            .or(self.severity.as_deref())
    }

    /// Returns true for FATAL and PANIC severities.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity(), Some("FATAL") | Some("PANIC"))
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for pure-postgres.
#[derive(Debug, Error)]
pub enum Error {
    /// Corrupt byte stream: bad length field or truncated payload
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Server asked for an authentication method this client does not speak
    #[error("Unsupported authentication method (code {0})")]
    UnsupportedAuth(i32),

    /// Server error with FATAL or PANIC severity
    #[error("PostgreSQL fatal error: {0}")]
    FatalServer(ErrorFields),

    /// Server error with ERROR severity; the connection stays usable
    #[error("PostgreSQL error: {0}")]
    Server(ErrorFields),

    /// Server sent a message the scheduler cannot place
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Connection is closed or closing
    #[error("Connection closed")]
    ConnectionClosed,

    /// Authentication failed on the client side
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid usage (bad connection string, too many arguments, ...)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// A column value could not be coerced
    #[error("Decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Build the matching variant for a server ErrorResponse.
    pub fn from_server(fields: ErrorFields) -> Self {
        if fields.is_fatal() {
            Error::FatalServer(fields)
        } else {
            Error::Server(fields)
        }
    }

    /// Returns true if the error means the connection cannot be used anymore.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MalformedFrame(_)
                | Error::UnsupportedAuth(_)
                | Error::FatalServer(_)
                | Error::ProtocolViolation(_)
                | Error::ConnectionClosed
                | Error::Auth(_)
                | Error::Io(_)
        )
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) | Error::FatalServer(fields) => fields.code.as_deref(),
            _ => None,
        }
    }

    /// Rebuild an equivalent error, used when one failure must reach many callbacks.
    ///
    /// I/O errors keep their kind and message.
    pub fn duplicate(&self) -> Self {
        match self {
            Error::MalformedFrame(msg) => Error::MalformedFrame(msg.clone()),
            Error::UnsupportedAuth(code) => Error::UnsupportedAuth(*code),
            Error::FatalServer(fields) => Error::FatalServer(fields.clone()),
            Error::Server(fields) => Error::Server(fields.clone()),
            Error::ProtocolViolation(msg) => Error::ProtocolViolation(msg.clone()),
            Error::ConnectionClosed => Error::ConnectionClosed,
            Error::Auth(msg) => Error::Auth(msg.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
            Error::InvalidUsage(msg) => Error::InvalidUsage(msg.clone()),
            Error::Decode(msg) => Error::Decode(msg.clone()),
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(severity: &str) -> ErrorFields {
        ErrorFields {
            severity: Some(severity.to_string()),
            message: Some("boom".to_string()),
            code: Some("XX000".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_server_classifies_severity() {
        assert!(matches!(Error::from_server(fields("FATAL")), Error::FatalServer(_)));
        assert!(matches!(Error::from_server(fields("PANIC")), Error::FatalServer(_)));
        assert!(matches!(Error::from_server(fields("ERROR")), Error::Server(_)));
    }

    #[test]
    fn test_non_localized_severity_wins() {
        let f = ErrorFields {
            severity: Some("FATAL".to_string()),
            severity_non_localized: Some("ERROR".to_string()),
            ..Default::default()
        };
        assert!(!f.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = Error::from_server(fields("ERROR"));
        assert_eq!(err.to_string(), "PostgreSQL error: ERROR: boom (SQLSTATE XX000)");
        assert_eq!(err.sqlstate(), Some("XX000"));
        assert!(!err.is_fatal());
    }
}
