//! Maps intake failures onto HTTP responses.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use transit_core::IntakeError;
use transit_types::ErrorResponse;

/// Error returned by every handler. Renders as `{code, message}`.
#[derive(Debug)]
pub struct ApiError(IntakeError);

impl ApiError {
	pub fn status(&self) -> StatusCode {
		match &self.0 {
			IntakeError::Validation(_) | IntakeError::Conflict(_) => StatusCode::BAD_REQUEST,
			IntakeError::Dependency(_) => StatusCode::FAILED_DEPENDENCY,
			IntakeError::NotFound(_) => StatusCode::NOT_FOUND,
			IntakeError::Persistence(_) | IntakeError::Internal(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		}
	}
}

impl From<IntakeError> for ApiError {
	fn from(error: IntakeError) -> Self {
		Self(error)
	}
}

impl From<PathRejection> for ApiError {
	fn from(rejection: PathRejection) -> Self {
		if rejection.status().is_server_error() {
			return Self(IntakeError::Internal(rejection.body_text()));
		}
		Self(IntakeError::Validation(rejection.body_text()))
	}
}

impl From<QueryRejection> for ApiError {
	fn from(rejection: QueryRejection) -> Self {
		Self(IntakeError::Validation(rejection.body_text()))
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		let body = ErrorResponse {
			code: status.as_u16(),
			message: self.0.to_string(),
		};
		(status, Json(body)).into_response()
	}
}
