//! Data item endpoints under /tx.

use super::ApiError;
use crate::server::AppState;
use axum::body::{self, Body};
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use tracing::instrument;
use transit_core::IntakeError;
use transit_types::{DataItemPostResponse, PaymentResponse};

#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
	#[serde(rename = "mime-type")]
	pub mime_type: Option<String>,
}

fn header<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
	headers.get(name).and_then(|value| value.to_str().ok())
}

/// Handles POST /tx.
///
/// Headers are checked before the body is read, and the body is never read
/// past the declared length.
#[instrument(skip_all)]
pub async fn post_tx(
	State(state): State<AppState>,
	headers: HeaderMap,
	body: Body,
) -> Result<(StatusCode, Json<DataItemPostResponse>), ApiError> {
	let content_type = header(&headers, &CONTENT_TYPE);
	let content_length = header(&headers, &CONTENT_LENGTH);
	let declared = state.intake.validate_headers(content_type, content_length)?;

	let limit = usize::try_from(declared).unwrap_or(usize::MAX);
	let body = body::to_bytes(body, limit).await.map_err(|e| {
		tracing::debug!(error = %e, declared, "failed to read upload body");
		IntakeError::Validation(format!(
			"content-length, body: length mismatch ({}, >{})",
			declared, declared
		))
	})?;

	let ack = state
		.intake
		.upload(content_type, content_length, body)
		.await?;
	Ok((StatusCode::CREATED, Json(ack)))
}

/// Handles GET /tx/{id}.
pub async fn get_tx(
	State(state): State<AppState>,
	path: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
	let Path(id) = path?;
	let raw: Bytes = state.intake.get_item(&id).await?;
	Ok(([(CONTENT_TYPE, transit_core::media::OCTET_STREAM)], raw))
}

/// Handles GET /tx/{id}/status.
pub async fn get_status(
	State(state): State<AppState>,
	path: Result<Path<String>, PathRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let Path(id) = path?;
	Ok(Json(state.intake.get_status(&id).await?))
}

/// Handles GET /tx/{id}/data.
pub async fn get_data(
	State(state): State<AppState>,
	path: Result<Path<String>, PathRejection>,
	query: Result<Query<DataQuery>, QueryRejection>,
	headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
	let Path(id) = path?;
	let Query(query) = query?;
	let (content_type, data) = state
		.intake
		.get_data(&id, query.mime_type.as_deref(), header(&headers, &ACCEPT))
		.await?;
	Ok(([(CONTENT_TYPE, content_type)], data))
}

/// Handles GET /tx/{id}/{field}.
pub async fn get_field(
	State(state): State<AppState>,
	path: Result<Path<(String, String)>, PathRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let Path((id, field)) = path?;
	Ok(Json(state.intake.get_field(&id, &field).await?))
}

/// Handles PUT /tx/{id}/{payment_id}.
#[instrument(skip(state))]
pub async fn put_payment(
	State(state): State<AppState>,
	path: Result<Path<(String, String)>, PathRejection>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
	let Path((id, payment_id)) = path?;
	let response = state.intake.record_payment(&id, &payment_id).await?;
	Ok((StatusCode::ACCEPTED, Json(response)))
}
