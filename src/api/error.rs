use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::DomainError;

/// Error returned by handlers; maps the domain taxonomy onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Validation(_) => StatusCode::BAD_REQUEST,
            DomainError::Superseded(_) | DomainError::Cancelled(_) => StatusCode::CONFLICT,
            DomainError::GenerationUnavailable(_)
            | DomainError::ExternalService(_)
            | DomainError::Notification(_) => StatusCode::BAD_GATEWAY,
            DomainError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DomainError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::Configuration(_)
            | DomainError::DimensionMismatch { .. }
            | DomainError::IngestionRun(_)
            | DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (DomainError::not_found("x"), StatusCode::NOT_FOUND),
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (
                DomainError::generation_unavailable("x"),
                StatusCode::BAD_GATEWAY,
            ),
            (DomainError::timeout("x"), StatusCode::GATEWAY_TIMEOUT),
            (
                DomainError::unavailable("ingestion queue full"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                DomainError::internal("queue full"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                DomainError::dimension_mismatch(3, 4),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError(error).status_code(), expected);
        }
    }
}
