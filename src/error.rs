use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::analysis::AnalysisError;
use crate::pipeline::normalize::ParseError;
use crate::render::RenderError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unreadable artifact: {0}")]
    UnreadableArtifact(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Unreadable { .. } => AppError::UnreadableArtifact(err.to_string()),
            AnalysisError::Upstream(msg) => AppError::UpstreamUnavailable(msg),
            AnalysisError::Task(msg) => AppError::Internal(msg),
        }
    }
}

fn get_trace_id() -> Option<String> {
    let span = Span::current();
    let context = span.context();
    let span_ref = context.span();
    let span_context = span_ref.span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::UnreadableArtifact(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::UpstreamUnavailable(msg) => {
                tracing::error!(error = %msg, "Upstream dependency failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Upstream service unavailable, retry later".to_string(),
                )
            }
            AppError::Parse(e) => {
                tracing::error!(error = %e, "Model output could not be parsed");
                (
                    StatusCode::BAD_GATEWAY,
                    format!("Report generation failed: {e}"),
                )
            }
            AppError::Render(e) => {
                tracing::error!(error = %e, "Document rendering failed");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("Report generation failed: {e}"),
                )
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();

        let body = if let Some(trace_id) = get_trace_id() {
            json!({
                "error": error_message,
                "status": status.as_u16(),
                "trace_id": trace_id,
            })
        } else {
            json!({
                "error": error_message,
                "status": status.as_u16(),
            })
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validation_error() {
        let error = AppError::Validation("no artifacts supplied".to_string());
        assert_eq!(error.to_string(), "Validation error: no artifacts supplied");
    }

    #[test]
    fn test_parse_error_is_transparent() {
        let error = AppError::from(ParseError::NoObjectBoundaries);
        assert_eq!(
            error.to_string(),
            ParseError::NoObjectBoundaries.to_string()
        );
    }

    #[test]
    fn test_analysis_error_mapping() {
        let unreadable = AppError::from(AnalysisError::Unreadable {
            path: PathBuf::from("/tmp/missing.csv"),
            reason: "No such file or directory".to_string(),
        });
        assert!(matches!(unreadable, AppError::UnreadableArtifact(ref m) if m.contains("missing.csv")));

        let upstream = AppError::from(AnalysisError::Upstream("429 rate limit".to_string()));
        assert!(matches!(upstream, AppError::UpstreamUnavailable(ref m) if m == "429 rate limit"));
    }

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (
                AppError::Validation("test".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::UnreadableArtifact("test".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::NotFound("test".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::UpstreamUnavailable("test".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Parse(ParseError::NotAnObject),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::Render(RenderError::NotAnObject),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::Internal("test".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected_status) in test_cases {
            let (status, _) = error.status_and_message();
            assert_eq!(status, expected_status, "status for {error}");
        }
    }

    #[test]
    fn test_generation_failures_share_message_prefix() {
        let (_, parse_msg) = AppError::Parse(ParseError::NoObjectBoundaries).status_and_message();
        let (_, render_msg) = AppError::Render(RenderError::NotAnObject).status_and_message();
        assert!(parse_msg.starts_with("Report generation failed"));
        assert!(render_msg.starts_with("Report generation failed"));
    }

    #[test]
    fn test_internal_details_not_leaked() {
        let (_, msg) = AppError::Internal("join handle panicked".to_string()).status_and_message();
        assert_eq!(msg, "Internal server error");
    }
}
