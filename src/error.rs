use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy for one execution. A user-code error is *not* in here:
/// code that ran and raised still yields a complete
/// [`ExecutionOutcome`](crate::models::ExecutionOutcome); these variants
/// cover everything that prevented the code from producing one.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("execution timed out")]
    Timeout,
    #[error("execution failed: {0}")]
    Orchestration(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ExecError {
    fn into_response(self) -> Response {
        let status = match self {
            ExecError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
            ExecError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ExecError::Orchestration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
