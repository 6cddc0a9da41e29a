//! Error types for MailWarden

use thiserror::Error;

/// Main error type for MailWarden
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence failure. Already-committed rows stay valid.
    #[error("Database error: {0}")]
    Database(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Health gate or daily limit rejection. Nothing was mutated.
    #[error("{0}")]
    PolicyBlocked(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed webhook payload: {0}")]
    MalformedWebhook(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for MailWarden
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Auth(_) => 401,
            Error::Validation(_) => 422,
            Error::NotFound(_) => 404,
            Error::PolicyBlocked(_) => 429,
            Error::Transport(_) => 502,
            Error::MalformedWebhook(_) => 400,
            Error::InvalidTransition(_) => 409,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Auth(_) => "UNAUTHORIZED",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::PolicyBlocked(_) => "POLICY_BLOCKED",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::MalformedWebhook(_) => "MALFORMED_WEBHOOK",
            Error::InvalidTransition(_) => "INVALID_TRANSITION",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error leaves state untouched and is safe to report to users verbatim
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_blocked_is_too_many_requests() {
        let err = Error::PolicyBlocked("Daily sending limit reached".to_string());
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.to_string(), "Daily sending limit reached");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_database_error_is_server_error() {
        let err = Error::Database("connection reset".to_string());
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.code(), "DATABASE_ERROR");
        assert!(!err.is_client_error());
    }
}
