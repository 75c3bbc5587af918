//! Error handling for the Comeback client

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// PostgREST code for "the single-row request matched no row"
pub const NOT_FOUND_CODE: &str = "PGRST116";

/// Message carried by the authorization error raised by the admin guard
pub const FORBIDDEN_MESSAGE: &str = "Accès refusé. Permissions administrateur requises.";

/// Unified error type for the Comeback client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Database errors reported by PostgREST
    #[error("Database error: {0}")]
    Database(DatabaseError),

    /// An operation exceeded its time bound
    #[error("Timeout: {0}")]
    Timeout(&'static str),

    /// Authenticated, but not allowed to access the resource
    #[error("{message}")]
    Forbidden { status: u16, message: String },

    /// Local persistent storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new authentication error
    pub fn auth<T: fmt::Display>(msg: T) -> Self {
        Error::Auth(msg.to_string())
    }

    /// Create a new storage error
    pub fn storage<T: fmt::Display>(msg: T) -> Self {
        Error::Storage(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// The 403 raised when a logged-in user lacks the admin role
    pub fn forbidden() -> Self {
        Error::Forbidden {
            status: 403,
            message: FORBIDDEN_MESSAGE.to_string(),
        }
    }

    /// Whether this is the "no row found" database error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Database(err) if err.kind() == DatabaseErrorKind::NotFound)
    }

    /// HTTP status to surface to the caller
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Forbidden { status, .. } => *status,
            Error::Database(err) => err.kind().http_status(),
            Error::Auth(_) => 401,
            Error::Timeout(_) => 504,
            _ => 500,
        }
    }
}

/// Error document returned by PostgREST
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseError {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
    /// HTTP status of the response, when there was one
    #[serde(skip)]
    pub status: Option<u16>,
}

impl DatabaseError {
    /// Classify the error by its PostgREST or Postgres code
    pub fn kind(&self) -> DatabaseErrorKind {
        match self.code.as_deref() {
            Some(NOT_FOUND_CODE) => DatabaseErrorKind::NotFound,
            Some("23505") => DatabaseErrorKind::UniqueViolation,
            Some("23503") => DatabaseErrorKind::ForeignKeyViolation,
            Some("42P01") => DatabaseErrorKind::UndefinedTable,
            Some("42703") => DatabaseErrorKind::UndefinedColumn,
            _ => DatabaseErrorKind::Unknown,
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        if let Some(status) = self.status {
            parts.push(format!("Status: {}", status));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Failure classes of a database call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    NotFound,
    UniqueViolation,
    ForeignKeyViolation,
    UndefinedTable,
    UndefinedColumn,
    Unknown,
}

impl DatabaseErrorKind {
    /// Map the class to the HTTP status an API would answer with
    pub fn http_status(self) -> u16 {
        match self {
            DatabaseErrorKind::NotFound => 404,
            DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::ForeignKeyViolation => 409,
            DatabaseErrorKind::UndefinedTable
            | DatabaseErrorKind::UndefinedColumn
            | DatabaseErrorKind::Unknown => 500,
        }
    }
}
