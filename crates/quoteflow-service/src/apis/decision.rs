//! Decision endpoints of the quoteflow API.
//!
//! Only meaningful with the queue oracle: stages park their consultation
//! and an operator resumes it here instead of typing at the console.

use crate::apis::order::{parse_order_id, OrderError};
use quoteflow_core::WorkflowEngine;
use quoteflow_oracle::OracleError;
use quoteflow_types::{
	APIError, Decision, PendingDecisionsResponse, Stage, SubmitDecisionRequest,
	SubmitDecisionResponse,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecisionError {
	#[error("{0}")]
	InvalidRequest(String),
	#[error("{0}")]
	NotAwaited(String),
	#[error("{0}")]
	Unsupported(String),
	#[error("Internal error: {0}")]
	Internal(String),
}

impl From<OrderError> for DecisionError {
	fn from(err: OrderError) -> Self {
		DecisionError::InvalidRequest(err.to_string())
	}
}

impl From<OracleError> for DecisionError {
	fn from(err: OracleError) -> Self {
		match err {
			OracleError::NoPendingDecision { .. } => DecisionError::NotAwaited(err.to_string()),
			OracleError::Unsupported(_) => DecisionError::Unsupported(err.to_string()),
			e => DecisionError::Internal(e.to_string()),
		}
	}
}

impl From<DecisionError> for APIError {
	fn from(err: DecisionError) -> Self {
		let message = err.to_string();
		match err {
			DecisionError::InvalidRequest(_) => APIError::BadRequest {
				error_type: "INVALID_REQUEST".to_string(),
				message,
			},
			DecisionError::NotAwaited(_) => APIError::Conflict {
				error_type: "NO_PENDING_DECISION".to_string(),
				message,
			},
			DecisionError::Unsupported(_) => APIError::BadRequest {
				error_type: "DECISIONS_NOT_SUPPORTED".to_string(),
				message,
			},
			DecisionError::Internal(_) => APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message,
			},
		}
	}
}

/// Handles GET /decisions requests.
pub fn list_pending(engine: &WorkflowEngine) -> PendingDecisionsResponse {
	PendingDecisionsResponse {
		pending: engine.oracle().pending(),
	}
}

/// Handles POST /orders/{id}/decisions/{stage} requests.
pub fn submit_decision(
	id: &str,
	stage: &str,
	request: SubmitDecisionRequest,
	engine: &WorkflowEngine,
) -> Result<SubmitDecisionResponse, DecisionError> {
	let order_id = parse_order_id(id)?;
	let stage = stage.parse::<Stage>().map_err(DecisionError::InvalidRequest)?;
	let decision = Decision::from_input(&request.input);

	engine.oracle().submit(order_id, stage, decision)?;
	tracing::info!(order_id, stage = %stage, decision = ?decision, "Decision submitted");

	Ok(SubmitDecisionResponse { decision })
}
