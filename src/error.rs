//! Error types for cla-ledger

use hyper::StatusCode;
use thiserror::Error;

use crate::reconciler::ReconcileError;
use crate::webhook::WebhookError;

/// Errors raised by the agreement store
#[derive(Error, Debug)]
pub enum StoreError {
    /// A named collection (sled tree) the caller expected does not exist.
    ///
    /// This is a configuration problem, distinct from a record that is absent.
    #[error("Missing collection: {0}")]
    MissingCollection(String),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid key in {collection}: {key}")]
    InvalidKey { collection: String, key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this error marks a missing collection rather than an I/O failure
    pub fn is_missing_collection(&self) -> bool {
        matches!(self, Self::MissingCollection(_))
    }
}

impl From<sled::transaction::TransactionError<StoreError>> for StoreError {
    fn from(err: sled::transaction::TransactionError<StoreError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => Self::Database(e),
        }
    }
}

/// Service-level error returned by request handlers
#[derive(Error, Debug)]
pub enum ClaError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("Status update failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClaError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Webhook(e) => e.status_code(),
            Self::Reconcile(ReconcileError::IncompleteEvent(_)) => StatusCode::BAD_REQUEST,
            Self::Reconcile(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller
    ///
    /// Store and internal failures are reported generically; details go to the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Webhook(e) => e.public_message().to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ClaError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias for handler operations
pub type Result<T> = std::result::Result<T, ClaError>;
