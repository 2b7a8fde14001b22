use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Upload exceeds {limit} bytes")]
    FileTooLarge { limit: u64 },

    #[error("Image decode error: {0}")]
    DecodeError(String),

    #[error("Image encode error: {0}")]
    EncodeError(String),

    #[error("Model load error: {0}")]
    ModelLoadError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Bottleneck shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },

    #[error("Style transfer exceeded {0}s")]
    ComputeTimeout(u64),

    #[error("Cleanup error: {0}")]
    CleanupError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ComputeTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::DecodeError(_)
            | AppError::EncodeError(_)
            | AppError::ModelLoadError(_)
            | AppError::InferenceError(_)
            | AppError::ShapeMismatch { .. }
            | AppError::CleanupError(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client. Server-side detail stays in the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(detail) => detail.clone(),
            AppError::FileTooLarge { limit } => {
                format!("Upload exceeds the maximum allowed size of {} bytes", limit)
            }
            AppError::ComputeTimeout(_) => "Style transfer timed out".to_string(),
            AppError::CleanupError(_) => "Error during cleanup".to_string(),
            _ => "Error processing style transfer".to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            // A contract break between the two networks, never a user problem.
            AppError::ShapeMismatch { .. } => {
                tracing::error!(error = %self, "Invariant violation in bottleneck blending");
            }
            _ if status.is_server_error() => {
                tracing::error!(error = %self, status = status.as_u16(), "Request failed");
            }
            _ => {
                tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
            }
        }

        (status, self.public_message()).into_response()
    }
}
