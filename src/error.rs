use serde_json::json;

/// Every failure the daemon can report back to the host UI.
///
/// None of these are fatal: the IPC loop turns each one into an error
/// response and keeps serving.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    /// Credential failures are passed through verbatim from the backend.
    #[error("{0}")]
    Auth(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("malformed document: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("sign in first")]
    NoSession,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Auth(_) => "auth",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::Transport(_) => "transport",
            AppError::Timeout(_) => "timeout",
            AppError::Storage(_) => "storage",
            AppError::Serde(_) => "storage",
            AppError::NoSession => "no_session",
        }
    }

    /// Transport-level failures are worth retrying; everything else would
    /// fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport(_) | AppError::Timeout(_))
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        if self.is_retryable() {
            Some(json!({ "retryable": true }))
        } else {
            None
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
