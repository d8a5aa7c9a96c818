//! Error taxonomy shared by every gate.
//!
//! Gates never render user-facing text. They return an [`ErrorCode`] and the
//! presentation layer resolves [`ErrorCode::message_key`] through its own
//! translator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of error identifiers returned by the security layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Caller is not authenticated
    Unauthorized,
    /// Login credentials did not match
    InvalidCredentials,
    /// Sign-up attempted with an email already in use
    EmailAlreadyExists,
    /// Password does not meet the strength rules
    WeakPassword,
    /// Account exists but the email has not been confirmed
    EmailNotConfirmed,
    /// Input failed validation
    InvalidInput,
    /// A required field was missing or empty
    RequiredField,
    /// A field had the wrong shape
    InvalidFormat,
    /// Referenced entity does not exist
    NotFound,
    /// Request is not permitted (origin, ownership, secret mismatch)
    Forbidden,
    /// Concurrent modification or duplicate write
    Conflict,
    /// Rate limit exceeded for this action class
    RateLimited,
    /// Identity is temporarily locked after repeated failures
    AccountLocked,
    /// Unexpected internal failure
    InternalError,
    /// Backing store failure
    DatabaseError,
    /// Upstream network failure
    NetworkError,
    /// Uploaded file exceeds the size limit
    FileTooLarge,
    /// Uploaded file type is not allowed or content does not match it
    InvalidFileType,
    /// Upload could not be completed
    UploadFailed,
}

impl ErrorCode {
    /// All codes, in declaration order.
    pub const ALL: [ErrorCode; 19] = [
        ErrorCode::Unauthorized,
        ErrorCode::InvalidCredentials,
        ErrorCode::EmailAlreadyExists,
        ErrorCode::WeakPassword,
        ErrorCode::EmailNotConfirmed,
        ErrorCode::InvalidInput,
        ErrorCode::RequiredField,
        ErrorCode::InvalidFormat,
        ErrorCode::NotFound,
        ErrorCode::Forbidden,
        ErrorCode::Conflict,
        ErrorCode::RateLimited,
        ErrorCode::AccountLocked,
        ErrorCode::InternalError,
        ErrorCode::DatabaseError,
        ErrorCode::NetworkError,
        ErrorCode::FileTooLarge,
        ErrorCode::InvalidFileType,
        ErrorCode::UploadFailed,
    ];

    /// Stable wire identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            ErrorCode::WeakPassword => "WEAK_PASSWORD",
            ErrorCode::EmailNotConfirmed => "EMAIL_NOT_CONFIRMED",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::RequiredField => "REQUIRED_FIELD",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::AccountLocked => "ACCOUNT_LOCKED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::InvalidFileType => "INVALID_FILE_TYPE",
            ErrorCode::UploadFailed => "UPLOAD_FAILED",
        }
    }

    /// Translation key the presentation layer renders for this code.
    ///
    /// Several codes intentionally share a key so that the client cannot tell
    /// which specific check failed.
    pub fn message_key(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "errors.unauthorized",
            ErrorCode::InvalidCredentials => "auth.invalidCredentials",
            ErrorCode::EmailAlreadyExists => "auth.emailAlreadyExists",
            ErrorCode::WeakPassword => "auth.passwordMinLength",
            ErrorCode::EmailNotConfirmed => "auth.confirmationEmailSent",
            ErrorCode::InvalidInput | ErrorCode::RequiredField | ErrorCode::InvalidFormat => {
                "errors.invalidInput"
            }
            ErrorCode::NotFound => "errors.notFound",
            ErrorCode::Forbidden => "errors.forbidden",
            ErrorCode::Conflict => "errors.saveFailed",
            ErrorCode::RateLimited => "errors.rateLimited",
            ErrorCode::AccountLocked => "errors.accountLocked",
            ErrorCode::InternalError | ErrorCode::DatabaseError => "errors.serverError",
            ErrorCode::NetworkError => "errors.networkError",
            ErrorCode::FileTooLarge => "errors.fileTooLarge",
            ErrorCode::InvalidFileType => "errors.invalidFileType",
            ErrorCode::UploadFailed => "errors.uploadFailed",
        }
    }

    /// Whether the caller may retry after waiting (throttling and lockout).
    pub fn is_soft(&self) -> bool {
        matches!(self, ErrorCode::RateLimited | ErrorCode::AccountLocked)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ErrorCode {}

/// Outcome of a validator: the cleaned value or the first violated rule.
pub type ValidationResult<T> = Result<T, ErrorCode>;

/// A schema violation tied to the field that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldError {
    /// Name of the offending field
    pub field: &'static str,
    /// Error code to report
    pub code: ErrorCode,
}

impl FieldError {
    /// Create a field error.
    pub fn new(field: &'static str, code: ErrorCode) -> Self {
        Self { field, code }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.code)
    }
}

impl std::error::Error for FieldError {}

impl From<FieldError> for ErrorCode {
    fn from(e: FieldError) -> Self {
        e.code
    }
}
