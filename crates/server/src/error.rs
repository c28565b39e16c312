use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::validation::ValidationErrors;
use services::services::{
    pipelines::PipelineError, tasks::TaskError, webhooks::WebhookError, wiki::WikiError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Wiki(#[from] WikiError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error("Unauthenticated.")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Malformed or unreadable request body
    #[error("{1}")]
    Rejected(StatusCode, String),
}

impl ApiError {
    pub fn forbidden() -> Self {
        ApiError::Forbidden("This action is unauthorized.".to_string())
    }

    pub fn not_found(resource: &str) -> Self {
        ApiError::NotFound(format!("{resource} not found."))
    }
}

fn database_response(err: &sqlx::Error) -> (StatusCode, ApiResponse<()>) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            ApiResponse::error("Resource not found."),
        ),
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => (
            StatusCode::CONFLICT,
            ApiResponse::error("A record with the same unique value already exists."),
        ),
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => (
            StatusCode::CONFLICT,
            ApiResponse::error("The record is still referenced by other records."),
        ),
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::error("Server Error"),
            )
        }
    }
}

fn validation_response(errors: ValidationErrors) -> (StatusCode, ApiResponse<()>) {
    let message = errors
        .messages()
        .values()
        .flatten()
        .next()
        .cloned()
        .unwrap_or_else(|| "The given data was invalid.".to_string());
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        ApiResponse::validation(&message, errors.into_messages()),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Database(e)
            | ApiError::Pipeline(PipelineError::Database(e))
            | ApiError::Task(TaskError::Database(e))
            | ApiError::Wiki(WikiError::Database(e))
            | ApiError::Webhook(WebhookError::Database(e)) => database_response(&e),
            ApiError::Validation(errors)
            | ApiError::Pipeline(PipelineError::Validation(errors))
            | ApiError::Task(TaskError::Validation(errors))
            | ApiError::Wiki(WikiError::Validation(errors))
            | ApiError::Webhook(WebhookError::Validation(errors)) => validation_response(errors),
            ApiError::Wiki(e @ WikiError::RevisionNotFound(_)) => {
                (StatusCode::NOT_FOUND, ApiResponse::error(&e.to_string()))
            }
            ApiError::Webhook(e @ WebhookError::NotRetryable(_)) => {
                (StatusCode::CONFLICT, ApiResponse::error(&e.to_string()))
            }
            ApiError::Webhook(e @ WebhookError::Serialization(_)) => {
                tracing::error!(error = %e, "Failed to serialize webhook payload");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::error("Server Error"),
                )
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiResponse::error("Unauthenticated."),
            ),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, ApiResponse::error(&message)),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, ApiResponse::error(&message)),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, ApiResponse::error(&message)),
            ApiError::Rejected(status, message) => (status, ApiResponse::error(&message)),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::forbidden(), StatusCode::FORBIDDEN),
            (ApiError::not_found("Task"), StatusCode::NOT_FOUND),
            (ApiError::Database(sqlx::Error::RowNotFound), StatusCode::NOT_FOUND),
            (
                ApiError::Validation(ValidationErrors::single("name", "The name field is required.")),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::Wiki(WikiError::RevisionNotFound(4)),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Database(sqlx::Error::PoolTimedOut),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Rejected(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected JSON".to_string()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
