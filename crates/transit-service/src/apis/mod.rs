//! Handlers of the public HTTP API.

pub mod error;
pub mod price;
pub mod tx;

pub use error::ApiError;

use crate::server::AppState;
use axum::extract::State;
use axum::Json;
use transit_types::StatusResponse;

/// Handles GET /.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
	Json(StatusResponse {
		name: state.name.clone(),
		version: env!("CARGO_PKG_VERSION").to_string(),
	})
}
