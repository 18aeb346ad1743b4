//! The two error kinds surfaced to callers.
//!
//! Operations return `anyhow::Result`; these enums travel inside it and can be
//! recovered with `downcast_ref`.

use crate::types::ApprovalStatus;

/// Raised before any call is made. Local state is untouched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("quantity {0} is not valid")]
    InvalidQuantity(i64),
    #[error("{0} must be greater than zero")]
    InvalidPrice(&'static str),
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Please enter a valid 10-digit phone number")]
    InvalidContact,
    #[error("Password must be at least {0} characters long")]
    PasswordTooShort(usize),
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Please login first")]
    NotLoggedIn,
    #[error("a request for {0} is already in flight")]
    RequestInFlight(String),
}

/// A failed call against the store, whether embedded or over HTTP.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Your account is pending approval from admin")]
    PendingApproval,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("cannot move from {from} to {to}")]
    InvalidTransition {
        from: ApprovalStatus,
        to: ApprovalStatus,
    },
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("server responded {code}: {message}")]
    Status { code: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("network failure: {0}")]
    Transport(String),
}

impl RemoteError {
    /// HTTP status this error corresponds to, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Unauthorized(_) => Some(401),
            RemoteError::PendingApproval | RemoteError::Forbidden(_) => Some(403),
            RemoteError::NotFound(_) => Some(404),
            RemoteError::Conflict(_) | RemoteError::InvalidTransition { .. } => Some(409),
            RemoteError::Status { code, .. } => Some(*code),
            RemoteError::Rejected(_) | RemoteError::Malformed(_) | RemoteError::Transport(_) => None,
        }
    }

    /// Build an error from a non-2xx response.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            401 => RemoteError::Unauthorized(message),
            403 if message.to_lowercase().contains("pending") => RemoteError::PendingApproval,
            403 => RemoteError::Forbidden(message),
            404 => RemoteError::NotFound(message),
            409 => RemoteError::Conflict(message),
            _ => RemoteError::Status { code, message },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_))
    }
}

/// True when an error chain carries a 401, which ends the session.
pub fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RemoteError>()
        .is_some_and(RemoteError::is_unauthorized)
}
