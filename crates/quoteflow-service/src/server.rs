//! HTTP server for the quoteflow API.
//!
//! Customers place orders and follow their checkpoints; operators answer
//! parked decisions when the queue oracle is configured.

use crate::apis::{decision, order};
use axum::{
	extract::{Path, State},
	response::Json,
	routing::{get, post},
	Router,
};
use quoteflow_config::ApiConfig;
use quoteflow_core::{Checkpoint, WorkflowEngine};
use quoteflow_types::{
	APIError, Order, PendingDecisionsResponse, PlaceOrderRequest, PlaceOrderResponse,
	QuoteResponse, StatusResponse, SubmitDecisionRequest, SubmitDecisionResponse,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the workflow engine for processing requests.
	pub engine: Arc<WorkflowEngine>,
}

/// Builds the router with every endpoint nested under `/api`.
pub fn router(engine: Arc<WorkflowEngine>) -> Router {
	let app_state = AppState { engine };

	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(handle_place_order))
				.route("/orders/{id}", get(handle_get_order_by_id))
				.route("/orders/{id}/validation", get(handle_validation_status))
				.route("/orders/{id}/quote-status", get(handle_quote_status))
				.route("/orders/{id}/realization", get(handle_realization_status))
				.route("/orders/{id}/quote", get(handle_get_quote))
				.route("/orders/{id}/decisions/{stage}", post(handle_submit_decision))
				.route("/decisions", get(handle_pending_decisions)),
		)
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(app_state)
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<WorkflowEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Quoteflow API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles POST /api/orders requests.
async fn handle_place_order(
	State(state): State<AppState>,
	Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<PlaceOrderResponse>, APIError> {
	match order::place_order(request, &state.engine).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Order placement failed: {}", e);
			Err(APIError::from(e))
		},
	}
}

/// Handles GET /api/orders/{id} requests.
async fn handle_get_order_by_id(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Order>, APIError> {
	match order::get_order_by_id(&id, &state.engine).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Order retrieval failed: {}", e);
			Err(APIError::from(e))
		},
	}
}

async fn checkpoint_status(
	id: String,
	checkpoint: Checkpoint,
	state: AppState,
) -> Result<Json<StatusResponse>, APIError> {
	match order::get_checkpoint_status(&id, checkpoint, &state.engine).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!(checkpoint = %checkpoint, "Status query failed: {}", e);
			Err(APIError::from(e))
		},
	}
}

/// Handles GET /api/orders/{id}/validation requests.
async fn handle_validation_status(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<StatusResponse>, APIError> {
	checkpoint_status(id, Checkpoint::Validation, state).await
}

/// Handles GET /api/orders/{id}/quote-status requests.
async fn handle_quote_status(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<StatusResponse>, APIError> {
	checkpoint_status(id, Checkpoint::Quote, state).await
}

/// Handles GET /api/orders/{id}/realization requests.
async fn handle_realization_status(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<StatusResponse>, APIError> {
	checkpoint_status(id, Checkpoint::Realization, state).await
}

/// Handles GET /api/orders/{id}/quote requests.
async fn handle_get_quote(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<QuoteResponse>, APIError> {
	match order::get_quote(&id, &state.engine).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Quote retrieval failed: {}", e);
			Err(APIError::from(e))
		},
	}
}

/// Handles GET /api/decisions requests.
async fn handle_pending_decisions(State(state): State<AppState>) -> Json<PendingDecisionsResponse> {
	Json(decision::list_pending(&state.engine))
}

/// Handles POST /api/orders/{id}/decisions/{stage} requests.
async fn handle_submit_decision(
	Path((id, stage)): Path<(String, String)>,
	State(state): State<AppState>,
	Json(request): Json<SubmitDecisionRequest>,
) -> Result<Json<SubmitDecisionResponse>, APIError> {
	match decision::submit_decision(&id, &stage, request, &state.engine) {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Decision submission failed: {}", e);
			Err(APIError::from(e))
		},
	}
}
