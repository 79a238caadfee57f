use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::core::time::format_optional;
use crate::services::errors::AttemptError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Value>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict { detail: String, context: Option<Value> },
    Gone { detail: String, context: Value },
    UnprocessableEntity { detail: String, context: Value },
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn parts(self) -> (StatusCode, String, Option<Value>) {
        match self {
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.to_string(), None),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message.to_string(), None),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            ApiError::Conflict { detail, context } => (StatusCode::CONFLICT, detail, context),
            ApiError::Gone { detail, context } => (StatusCode::GONE, detail, Some(context)),
            ApiError::UnprocessableEntity { detail, context } => {
                (StatusCode::UNPROCESSABLE_ENTITY, detail, Some(context))
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message, None)
            }
        }
    }
}

impl From<AttemptError> for ApiError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::Validation(message) => ApiError::BadRequest(message),
            AttemptError::NotFound(message) => ApiError::NotFound(message),
            AttemptError::StateConflict { message, prior } => ApiError::Conflict {
                detail: message,
                context: prior.map(|prior| {
                    json!({
                        "attempt_number": prior.attempt_number,
                        "existing_score": prior.existing_score,
                        "submitted_at": format_optional(prior.submitted_at),
                    })
                }),
            },
            AttemptError::Expired { auto_submitted } => ApiError::Gone {
                detail: "Exam time has expired".to_string(),
                context: json!({ "auto_submitted": auto_submitted }),
            },
            AttemptError::OutOfRange { question_number, requested, max } => {
                ApiError::UnprocessableEntity {
                    detail: format!(
                        "Marks {requested} exceed the maximum of {max} for question {question_number}"
                    ),
                    context: json!({
                        "question_number": question_number,
                        "requested": requested,
                        "max": max,
                    }),
                }
            }
            AttemptError::Conflict { exam_id, retries } => ApiError::Conflict {
                detail: "The exam was modified concurrently; please retry".to_string(),
                context: Some(json!({ "exam_id": exam_id, "retries": retries })),
            },
            AttemptError::Store(err) => ApiError::internal(err, "Exam store failure"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let unauthorized = matches!(self, ApiError::Unauthorized(_));
        let (status, detail, context) = self.parts();
        let mut response =
            (status, Json(ErrorResponse { status: status.as_u16(), detail, context }))
                .into_response();
        if unauthorized {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
