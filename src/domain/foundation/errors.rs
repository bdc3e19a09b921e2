//! Error types for the domain layer.

use std::fmt;

/// Error codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation errors
    ValidationFailed,
    InvalidFormat,

    // Not found errors
    EntitlementNotFound,

    // Authorization errors
    Unauthorized,

    // Infrastructure errors
    DatabaseError,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::EntitlementNotFound => "ENTITLEMENT_NOT_FOUND",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard domain error with a code and message.
///
/// Port implementations (store, provider adapters) surface failures through
/// this type; operation-specific errors live in `domain::billing::BillingError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
}

impl DomainError {
    /// Creates a new domain error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a validation error for a specific field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ValidationFailed,
            format!("{}: {}", field.into(), message.into()),
        )
    }

    /// Creates a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.code, ErrorCode::DatabaseError | ErrorCode::InternalError)
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for DomainError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = DomainError::new(ErrorCode::DatabaseError, "connection refused");
        let s = err.to_string();
        assert!(s.contains("DATABASE_ERROR"));
        assert!(s.contains("connection refused"));
    }

    #[test]
    fn validation_prefixes_field() {
        let err = DomainError::validation("plan", "unknown value");
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.message.starts_with("plan:"));
    }

    #[test]
    fn infrastructure_errors_are_retryable() {
        assert!(DomainError::database("timeout").is_retryable());
        assert!(!DomainError::validation("x", "y").is_retryable());
    }
}
