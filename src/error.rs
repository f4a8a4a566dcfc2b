// Gateway error taxonomy.
//
// Every failure a request can hit is converted to a `GatewayError` at the
// boundary that detects it and rendered as the JSON response envelope; no
// handler failure propagates far enough to take down the listener.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Request-scoped failures and their HTTP mapping.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing or malformed request parameter. Surfaced before any process
    /// is spawned.
    #[error("{0}")]
    Validation(String),

    /// Missing or incorrect PIN.
    #[error("Authentication required. Provide a valid PIN in the X-Device-PIN header.")]
    Unauthorized,

    /// Read-only mode rejected the request.
    #[error("Server is in read-only mode. State-changing and privileged operations are disabled.")]
    ReadOnly,

    /// Unknown route, module, or saved-code key.
    #[error("{0}")]
    NotFound(String),

    /// Known path, wrong HTTP method.
    #[error("method not allowed for this route")]
    MethodNotAllowed,

    /// The spawned process exited non-zero, was killed by a signal, or
    /// failed to start. Never retried: commands may have side effects.
    #[error("{message}")]
    Execution {
        message: String,
        stdout: String,
        stderr: String,
    },

    /// The process exceeded its allotted duration and was killed.
    #[error("Command timed out after {timeout_ms} ms and was terminated.")]
    Timeout { timeout_ms: u64 },

    /// Unexpected internal failure (e.g. the signal store could not be
    /// read or rewritten).
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::ReadOnly => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Execution { .. } | GatewayError::Timeout { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            // Denials use the bare `{error}` shape so clients can show the
            // message before they know the envelope contract.
            GatewayError::Unauthorized | GatewayError::ReadOnly => {
                json!({ "error": self.to_string() })
            }
            GatewayError::Execution {
                message,
                stdout,
                stderr,
            } => json!({
                "success": false,
                "message": message,
                "stdout": stdout,
                "stderr": stderr,
            }),
            _ => json!({ "success": false, "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
