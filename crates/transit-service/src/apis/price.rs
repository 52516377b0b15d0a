use super::ApiError;
use crate::server::AppState;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::Json;
use tracing::instrument;
use transit_types::PriceResponse;

/// Handles GET /price/{bytes}.
///
/// The size stays a string until intake validates it, so negative and
/// non-numeric values get the same error as out of range ones.
#[instrument(skip(state))]
pub async fn get_price(
	State(state): State<AppState>,
	path: Result<Path<String>, PathRejection>,
) -> Result<Json<PriceResponse>, ApiError> {
	let Path(bytes) = path?;
	Ok(Json(state.intake.price(&bytes).await?))
}
