//! HTTP server for the transit API.

use crate::apis;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use transit_config::ServiceConfig;
use transit_core::Intake;

/// Shared application state for the API handlers.
#[derive(Clone)]
pub struct AppState {
	pub intake: Arc<Intake>,
	/// Service name reported by GET /.
	pub name: String,
}

pub fn router(state: AppState) -> Router {
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([
			Method::GET,
			Method::POST,
			Method::PUT,
			Method::OPTIONS,
			Method::HEAD,
		])
		.allow_headers(Any);

	Router::new()
		.route("/", get(apis::status))
		.route("/price/{bytes}", get(apis::price::get_price))
		.route("/tx", post(apis::tx::post_tx))
		.route("/tx/{id}", get(apis::tx::get_tx))
		.route("/tx/{id}/status", get(apis::tx::get_status))
		.route("/tx/{id}/data", get(apis::tx::get_data))
		// The second segment is a field name on GET and a payment id on PUT.
		.route(
			"/tx/{id}/{field}",
			get(apis::tx::get_field).put(apis::tx::put_payment),
		)
		.with_state(state)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors),
		)
}

/// Serves the API until `shutdown` changes.
pub async fn start_server(
	config: ServiceConfig,
	state: AppState,
	mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
	let bind_address = format!("{}:{}", config.host, config.port);
	let listener = tokio::net::TcpListener::bind(&bind_address).await?;

	info!("Transit API server listening on {}", bind_address);

	axum::serve(listener, router(state))
		.with_graceful_shutdown(async move {
			let _ = shutdown.changed().await;
		})
		.await?;

	Ok(())
}
