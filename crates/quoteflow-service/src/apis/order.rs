//! Order endpoints of the quoteflow API.
//!
//! Placing an order only schedules the pipeline; everything else here is a
//! read over stored orders, tombstones and quote files.

use quoteflow_core::{Checkpoint, EngineError, OrderLookup, WorkflowEngine};
use quoteflow_quote::{QuoteArtifact, QuoteError};
use quoteflow_types::{
	APIError, Order, OrderId, PlaceOrderRequest, PlaceOrderResponse, QuoteResponse, Stage,
	StatusResponse,
};
use thiserror::Error;
use tracing::info;

/// Errors that can occur while serving order requests.
#[derive(Debug, Error)]
pub enum OrderError {
	#[error("Order not found: {0}")]
	NotFound(OrderId),
	#[error("Order {order_id} was rejected at stage {stage}")]
	Rejected { order_id: OrderId, stage: Stage },
	#[error("Invalid order ID: {0}")]
	InvalidId(String),
	#[error("No quote available for order {0}")]
	QuoteUnavailable(OrderId),
	#[error("Internal error: {0}")]
	Internal(String),
}

impl From<EngineError> for OrderError {
	fn from(err: EngineError) -> Self {
		OrderError::Internal(err.to_string())
	}
}

impl From<OrderError> for APIError {
	fn from(err: OrderError) -> Self {
		let message = err.to_string();
		match err {
			OrderError::NotFound(_) => APIError::NotFound {
				error_type: "ORDER_NOT_FOUND".to_string(),
				message,
			},
			OrderError::Rejected { .. } => APIError::NotFound {
				error_type: "ORDER_REJECTED".to_string(),
				message,
			},
			OrderError::QuoteUnavailable(_) => APIError::NotFound {
				error_type: "QUOTE_NOT_AVAILABLE".to_string(),
				message,
			},
			OrderError::InvalidId(_) => APIError::BadRequest {
				error_type: "INVALID_ORDER_ID".to_string(),
				message,
			},
			OrderError::Internal(_) => APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message,
			},
		}
	}
}

/// Parses the numeric order id of a request path.
pub fn parse_order_id(id: &str) -> Result<OrderId, OrderError> {
	id.trim().parse::<OrderId>().map_err(|_| {
		OrderError::InvalidId(format!("Order ID must be an unsigned integer: {}", id))
	})
}

/// Handles POST /orders requests.
pub async fn place_order(
	request: PlaceOrderRequest,
	engine: &WorkflowEngine,
) -> Result<PlaceOrderResponse, OrderError> {
	let order = engine.place_order(request.name, request.email).await?;
	info!(order_id = order.id, "Accepted order request");

	Ok(PlaceOrderResponse {
		order_id: order.id,
		message: format!("Order {} has been placed and is awaiting validation", order.id),
	})
}

/// Handles GET /orders/{id} requests.
pub async fn get_order_by_id(id: &str, engine: &WorkflowEngine) -> Result<Order, OrderError> {
	let order_id = parse_order_id(id)?;

	match engine.lookup_order(order_id).await? {
		OrderLookup::Active(order) => Ok(order),
		OrderLookup::Rejected(rejection) => Err(OrderError::Rejected {
			order_id,
			stage: rejection.stage,
		}),
		OrderLookup::NotFound => Err(OrderError::NotFound(order_id)),
	}
}

/// Handles the three checkpoint status requests.
///
/// Unknown and rejected orders are both reported as invalidated.
pub async fn get_checkpoint_status(
	id: &str,
	checkpoint: Checkpoint,
	engine: &WorkflowEngine,
) -> Result<StatusResponse, OrderError> {
	let order_id = parse_order_id(id)?;
	let status = engine.checkpoint_status(order_id, checkpoint).await?;
	Ok(StatusResponse::from(status))
}

/// Handles GET /orders/{id}/quote requests.
pub async fn get_quote(id: &str, engine: &WorkflowEngine) -> Result<QuoteResponse, OrderError> {
	let order = get_order_by_id(id, engine).await?;
	let Some(file_name) = order.quote_file_name else {
		return Err(OrderError::QuoteUnavailable(order.id));
	};

	let artifact = engine.quotes().load(&file_name).await.map_err(|e| match e {
		QuoteError::NotFound(_) => OrderError::QuoteUnavailable(order.id),
		e => OrderError::Internal(e.to_string()),
	})?;

	Ok(to_response(file_name, artifact))
}

fn to_response(file_name: String, artifact: QuoteArtifact) -> QuoteResponse {
	QuoteResponse {
		file_name,
		order_id: artifact.order_id,
		name: artifact.name,
		email: artifact.email,
		cost: artifact.cost,
	}
}
